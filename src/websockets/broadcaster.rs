use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use super::messages::Envelope;

/// Live connection registry and fan-out primitive.
///
/// Owns the transport handles, keyed by (room id, voter id); the room
/// state itself never holds a connection. Delivery is best-effort,
/// at-most-once per broadcast call.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Stores the outbound channel for a (room, voter) pair. A voter
    /// reconnecting replaces the prior handle; dropping the old sender
    /// closes the old connection's outbound loop.
    async fn register_connection(
        &self,
        room_id: &str,
        voter_id: &str,
        sender: mpsc::UnboundedSender<String>,
    );

    /// Drops the registry entry for a (room, voter) pair. Used by the
    /// leave operation, which wants the entry gone regardless of which
    /// connection owns it.
    async fn remove_connection(&self, room_id: &str, voter_id: &str);

    /// Drops the registry entry for a (room, voter) pair only if it still
    /// belongs to the caller's channel. A connection task tears itself
    /// down with this so a stale teardown cannot delete the entry of a
    /// reconnect that already replaced it. The weak handle keeps the
    /// channel's close semantics intact: a replaced sender still closes.
    async fn deregister_connection(
        &self,
        room_id: &str,
        voter_id: &str,
        sender: &mpsc::WeakUnboundedSender<String>,
    );

    /// Delivers `message` to every registered connection of the room.
    /// Entries whose channel is gone are pruned as part of the walk.
    async fn broadcast_to_room(&self, room_id: &str, message: &str);

    /// Drops all registry entries of a room, after the room closed or was
    /// evicted.
    async fn remove_room(&self, room_id: &str);
}

/// Serializes an envelope and fans it out to the room.
pub async fn send_event(broadcaster: &dyn Broadcaster, room_id: &str, envelope: Envelope) {
    match serde_json::to_string(&envelope) {
        Ok(json) => broadcaster.broadcast_to_room(room_id, &json).await,
        Err(e) => {
            warn!(room_id = %room_id, error = %e, "Failed to encode broadcast event");
        }
    }
}

/// In-memory [`Broadcaster`] over per-connection unbounded channels.
///
/// Sending never blocks on a slow client: the queued message is written to
/// the socket by that connection's own task.
pub struct InMemoryBroadcaster {
    // room_id -> voter_id -> outbound sender
    connections: RwLock<HashMap<String, HashMap<String, mpsc::UnboundedSender<String>>>>,
}

impl Default for InMemoryBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroadcaster {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Number of registered connections for a room.
    pub async fn connection_count(&self, room_id: &str) -> usize {
        let connections = self.connections.read().await;
        connections.get(room_id).map_or(0, HashMap::len)
    }
}

#[async_trait]
impl Broadcaster for InMemoryBroadcaster {
    async fn register_connection(
        &self,
        room_id: &str,
        voter_id: &str,
        sender: mpsc::UnboundedSender<String>,
    ) {
        let mut connections = self.connections.write().await;
        let replaced = connections
            .entry(room_id.to_string())
            .or_default()
            .insert(voter_id.to_string(), sender)
            .is_some();

        info!(
            room_id = %room_id,
            voter_id = %voter_id,
            replaced = replaced,
            "Connection registered"
        );
    }

    async fn remove_connection(&self, room_id: &str, voter_id: &str) {
        let mut connections = self.connections.write().await;
        if let Some(room) = connections.get_mut(room_id) {
            room.remove(voter_id);
            if room.is_empty() {
                connections.remove(room_id);
            }
        }
        debug!(room_id = %room_id, voter_id = %voter_id, "Connection removed");
    }

    async fn deregister_connection(
        &self,
        room_id: &str,
        voter_id: &str,
        sender: &mpsc::WeakUnboundedSender<String>,
    ) {
        // A failed upgrade means the registry already dropped this sender
        // on replacement; the entry now belongs to the reconnect.
        let Some(sender) = sender.upgrade() else {
            debug!(
                room_id = %room_id,
                voter_id = %voter_id,
                "Stale teardown ignored, connection was replaced"
            );
            return;
        };

        let mut connections = self.connections.write().await;
        if let Some(room) = connections.get_mut(room_id) {
            if room
                .get(voter_id)
                .is_some_and(|current| current.same_channel(&sender))
            {
                room.remove(voter_id);
                debug!(room_id = %room_id, voter_id = %voter_id, "Connection deregistered");
            }
            if room.is_empty() {
                connections.remove(room_id);
            }
        }
    }

    async fn broadcast_to_room(&self, room_id: &str, message: &str) {
        let mut connections = self.connections.write().await;
        let Some(room) = connections.get_mut(room_id) else {
            debug!(room_id = %room_id, "Broadcast to room with no connections");
            return;
        };

        let mut dead: Vec<String> = Vec::new();
        for (voter_id, sender) in room.iter() {
            if sender.send(message.to_string()).is_err() {
                dead.push(voter_id.clone());
            }
        }

        // Pruning on send failure is the only mechanism removing stale
        // connections from the registry.
        for voter_id in &dead {
            room.remove(voter_id);
            info!(room_id = %room_id, voter_id = %voter_id, "Pruned dead connection");
        }
        if room.is_empty() {
            connections.remove(room_id);
        }
    }

    async fn remove_room(&self, room_id: &str) {
        let mut connections = self.connections.write().await;
        if let Some(room) = connections.remove(room_id) {
            debug!(
                room_id = %room_id,
                dropped = room.len(),
                "Dropped room connection registry"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn register(
        broadcaster: &InMemoryBroadcaster,
        room: &str,
        voter: &str,
    ) -> UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        broadcaster.register_connection(room, voter, tx).await;
        rx
    }

    #[tokio::test]
    async fn broadcast_reaches_every_connection_of_the_room() {
        let broadcaster = InMemoryBroadcaster::new();
        let mut rx1 = register(&broadcaster, "room-1", "v1").await;
        let mut rx2 = register(&broadcaster, "room-1", "v2").await;
        let mut other = register(&broadcaster, "room-2", "v3").await;

        broadcaster.broadcast_to_room("room-1", "hello").await;

        assert_eq!(rx1.recv().await.unwrap(), "hello");
        assert_eq!(rx2.recv().await.unwrap(), "hello");
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_prunes_exactly_the_dead_connections() {
        let broadcaster = InMemoryBroadcaster::new();
        let mut live1 = register(&broadcaster, "room-1", "v1").await;
        let mut live2 = register(&broadcaster, "room-1", "v2").await;
        let dead1 = register(&broadcaster, "room-1", "v3").await;
        let dead2 = register(&broadcaster, "room-1", "v4").await;
        drop(dead1);
        drop(dead2);

        broadcaster.broadcast_to_room("room-1", "ping").await;

        assert_eq!(live1.recv().await.unwrap(), "ping");
        assert_eq!(live2.recv().await.unwrap(), "ping");
        assert_eq!(broadcaster.connection_count("room-1").await, 2);
    }

    #[tokio::test]
    async fn broadcast_to_unknown_room_is_a_noop() {
        let broadcaster = InMemoryBroadcaster::new();
        broadcaster.broadcast_to_room("nope", "ping").await;
        assert_eq!(broadcaster.connection_count("nope").await, 0);
    }

    #[tokio::test]
    async fn reregistration_releases_the_prior_handle() {
        let broadcaster = InMemoryBroadcaster::new();
        let mut old_rx = register(&broadcaster, "room-1", "v1").await;
        let mut new_rx = register(&broadcaster, "room-1", "v1").await;

        // Old sender was dropped on replacement, so its channel reports
        // closure to the old connection task.
        assert!(old_rx.recv().await.is_none());

        broadcaster.broadcast_to_room("room-1", "ping").await;
        assert_eq!(new_rx.recv().await.unwrap(), "ping");
        assert_eq!(broadcaster.connection_count("room-1").await, 1);
    }

    #[tokio::test]
    async fn stale_teardown_leaves_the_reconnected_entry_alone() {
        let broadcaster = InMemoryBroadcaster::new();

        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        let old_registration = old_tx.downgrade();
        broadcaster.register_connection("room-1", "v1", old_tx).await;

        // Reconnect replaces and drops the old sender.
        let mut new_rx = register(&broadcaster, "room-1", "v1").await;

        // The replaced connection's task tears itself down afterwards;
        // the new registration must survive it.
        broadcaster
            .deregister_connection("room-1", "v1", &old_registration)
            .await;
        assert_eq!(broadcaster.connection_count("room-1").await, 1);

        broadcaster.broadcast_to_room("room-1", "ping").await;
        assert_eq!(new_rx.recv().await.unwrap(), "ping");
    }

    #[tokio::test]
    async fn deregistration_by_the_owning_connection_removes_its_entry() {
        let broadcaster = InMemoryBroadcaster::new();

        let (tx, _rx) = mpsc::unbounded_channel();
        let registration = tx.downgrade();
        broadcaster.register_connection("room-1", "v1", tx).await;

        broadcaster
            .deregister_connection("room-1", "v1", &registration)
            .await;
        assert_eq!(broadcaster.connection_count("room-1").await, 0);
    }

    #[tokio::test]
    async fn remove_connection_and_room_clear_entries() {
        let broadcaster = InMemoryBroadcaster::new();
        let _rx1 = register(&broadcaster, "room-1", "v1").await;
        let _rx2 = register(&broadcaster, "room-1", "v2").await;

        broadcaster.remove_connection("room-1", "v1").await;
        assert_eq!(broadcaster.connection_count("room-1").await, 1);

        broadcaster.remove_room("room-1").await;
        assert_eq!(broadcaster.connection_count("room-1").await, 0);
    }
}
