use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, instrument, warn};

use super::store::RoomStore;
use crate::websockets::broadcaster::{send_event, Broadcaster};
use crate::websockets::messages::Envelope;

/// Drives one room countdown: ticks the store once per second and
/// broadcasts a `timerUpdate` with each post-tick snapshot, racing a
/// one-shot watchdog set to the configured duration.
///
/// Exits when the tick reports `running == false` (the single terminal
/// broadcast), when the store reports the generation stale (a reveal,
/// reset or restart superseded this countdown and already broadcast its
/// terminal event), or when the watchdog fires.
#[instrument(skip(store, broadcaster))]
pub async fn run_countdown(
    store: Arc<dyn RoomStore>,
    broadcaster: Arc<dyn Broadcaster>,
    room_id: String,
    generation: u64,
    total_seconds: i64,
) {
    let start = Instant::now();
    let mut ticker = interval_at(start + Duration::from_secs(1), Duration::from_secs(1));
    // Matches the store's clamp: the watchdog never fires before the
    // first tick has had its chance.
    let watchdog = sleep(Duration::from_secs(total_seconds.max(1) as u64));
    tokio::pin!(watchdog);

    loop {
        tokio::select! {
            // Ticker first: the terminal tick wins the race against the
            // watchdog when both are due at the full duration.
            biased;

            _ = ticker.tick() => {
                let Some(timer) = store.tick(&room_id, generation).await else {
                    debug!(room_id = %room_id, generation, "Countdown superseded");
                    return;
                };
                let running = timer.running;
                send_event(&*broadcaster, &room_id, Envelope::timer_update(timer)).await;
                if !running {
                    debug!(room_id = %room_id, "Countdown finished");
                    return;
                }
            }

            _ = &mut watchdog => {
                warn!(room_id = %room_id, "Countdown watchdog fired before terminal tick");
                return;
            }
        }
    }
}
