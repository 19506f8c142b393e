use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::manager::SessionManager;

/// Periodically evict sessions idle for at least `max_idle`.
///
/// The first sweep runs one `interval` after start. Abort the handle to stop.
pub fn spawn_idle_sweeper(
    manager: Arc<SessionManager>,
    interval: Duration,
    max_idle: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        tracing::info!(
            interval_secs = interval.as_secs(),
            max_idle_secs = max_idle.as_secs(),
            "idle session sweeper started"
        );

        loop {
            ticker.tick().await;
            let evicted = manager.evict_idle(max_idle);
            if !evicted.is_empty() {
                tracing::info!(
                    count = evicted.len(),
                    users = ?evicted,
                    remaining = manager.session_count(),
                    "evicted idle sessions"
                );
            }
        }
    })
}
