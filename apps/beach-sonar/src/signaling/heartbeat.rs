use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{SignalingChannel, SignalingKey};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Diagnostic traffic: one `dev` frame per tick carrying a counter that
/// starts at zero. Runs until the channel reports closed.
pub fn spawn(
    signaling: Arc<SignalingChannel>,
    period: Duration,
    session_id: Uuid,
) -> JoinHandle<u64> {
    tokio::spawn(async move { run(&signaling, period, session_id).await })
}

/// Returns the number of ticks taken before the channel closed.
pub async fn run(signaling: &SignalingChannel, period: Duration, session_id: Uuid) -> u64 {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut counter: u64 = 0;
    loop {
        ticker.tick().await;
        if signaling.is_closed() {
            debug!(session_id = %session_id, ticks = counter, "dev heartbeat stopped");
            return counter;
        }
        match signaling.send(SignalingKey::Dev, &counter.to_string()).await {
            Ok(_) => debug!(session_id = %session_id, counter, "dev heartbeat sent"),
            Err(err) => warn!(
                session_id = %session_id,
                counter,
                error = %err,
                "dev heartbeat send failed"
            ),
        }
        counter += 1;
    }
}
