//! Background task that periodically drops idle clients from a limiter.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::clock::Clock;
use super::limiter::SlidingWindowLimiter;

/// Spawn a task that calls [`SlidingWindowLimiter::sweep`] every `interval`.
///
/// The task runs until the returned handle is aborted or the runtime shuts
/// down. Must be called from within a tokio runtime.
pub fn spawn_sweeper<K>(
    limiter: Arc<SlidingWindowLimiter<K>>,
    clock: Arc<dyn Clock>,
    interval: Duration,
) -> JoinHandle<()>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
{
    info!(interval_secs = interval.as_secs_f64(), "Starting idle client sweeper");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = limiter.sweep(clock.now());
            debug!(
                removed,
                tracked = limiter.tracked_clients(),
                "Sweep pass complete"
            );
        }
    })
}
