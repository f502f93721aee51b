use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, instrument};

use super::store::RoomStore;
use crate::websockets::broadcaster::{send_event, Broadcaster};
use crate::websockets::messages::Envelope;

/// Configuration for the idle-room eviction task.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// How often to sweep for idle rooms.
    pub sweep_interval: Duration,
    /// How long a room may sit without a mutating call before eviction.
    pub idle_threshold: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            idle_threshold: Duration::from_secs(10 * 60),
        }
    }
}

/// Periodically evicts idle rooms, notifying any connected participants
/// before their registry entries are dropped.
#[instrument(skip(store, broadcaster))]
pub async fn run_cleanup(
    store: Arc<dyn RoomStore>,
    broadcaster: Arc<dyn Broadcaster>,
    config: CleanupConfig,
) {
    info!(
        sweep_interval_secs = config.sweep_interval.as_secs(),
        idle_threshold_secs = config.idle_threshold.as_secs(),
        "Starting idle-room eviction task"
    );

    let mut sweep = interval(config.sweep_interval);
    // The interval's first tick completes immediately.
    sweep.tick().await;

    loop {
        sweep.tick().await;
        sweep_idle_rooms(&store, &broadcaster, config.idle_threshold).await;
    }
}

/// One eviction pass. Returns the number of rooms removed.
async fn sweep_idle_rooms(
    store: &Arc<dyn RoomStore>,
    broadcaster: &Arc<dyn Broadcaster>,
    idle_threshold: Duration,
) -> usize {
    let evicted = store.evict_idle(idle_threshold).await;

    for room_id in &evicted {
        send_event(&**broadcaster, room_id, Envelope::room_closed()).await;
        broadcaster.remove_room(room_id).await;
    }

    if !evicted.is_empty() {
        info!(evicted = evicted.len(), "Idle rooms evicted");
    }
    evicted.len()
}
