use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use sprint_planner::{Broadcaster, Envelope};

// ============================================================================
// Mock Infrastructure
// ============================================================================

/// Broadcaster that records every fan-out per room instead of delivering
/// it, so workflows can assert on the exact event sequence.
#[derive(Clone, Default)]
pub struct RecordingBroadcaster {
    messages: Arc<RwLock<HashMap<String, Vec<String>>>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages_for(&self, room_id: &str) -> Vec<String> {
        self.messages
            .read()
            .await
            .get(room_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn envelopes_for(&self, room_id: &str) -> Vec<Envelope> {
        self.messages_for(room_id)
            .await
            .iter()
            .map(|m| serde_json::from_str(m).expect("broadcast was not a valid envelope"))
            .collect()
    }

    pub async fn clear(&self) {
        self.messages.write().await.clear();
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn register_connection(
        &self,
        _room_id: &str,
        _voter_id: &str,
        _sender: mpsc::UnboundedSender<String>,
    ) {
    }

    async fn remove_connection(&self, _room_id: &str, _voter_id: &str) {}

    async fn deregister_connection(
        &self,
        _room_id: &str,
        _voter_id: &str,
        _sender: &mpsc::WeakUnboundedSender<String>,
    ) {
    }

    async fn broadcast_to_room(&self, room_id: &str, message: &str) {
        self.messages
            .write()
            .await
            .entry(room_id.to_string())
            .or_default()
            .push(message.to_string());
    }

    // Recorded traffic survives room teardown so tests can inspect the
    // closing events.
    async fn remove_room(&self, _room_id: &str) {}
}
