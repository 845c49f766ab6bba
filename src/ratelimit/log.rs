//! Per-client log of admitted request timestamps.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Timestamps of admitted requests for one client, oldest first.
///
/// The log is kept sorted, so every timestamp that has aged out of the
/// window sits at the front.
#[derive(Debug, Clone, Default)]
pub struct RequestLog {
    timestamps: VecDeque<Instant>,
}

impl RequestLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every timestamp that is at least `window` older than `now`.
    ///
    /// Timestamps later than `now` count as age zero and are kept.
    pub fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record an admitted request at `now`.
    pub fn record(&mut self, now: Instant) {
        match self.timestamps.back() {
            Some(&last) if now < last => {
                let idx = self.timestamps.partition_point(|&ts| ts <= now);
                self.timestamps.insert(idx, now);
            }
            _ => self.timestamps.push_back(now),
        }
    }

    /// Time until enough entries leave the window for one more request to
    /// fit under `max_requests`.
    ///
    /// Returns `Duration::ZERO` if the log already has room. Assumes the log
    /// was pruned against `now`.
    pub fn retry_after(&self, now: Instant, window: Duration, max_requests: u64) -> Duration {
        let len = self.timestamps.len() as u64;
        if len < max_requests {
            return Duration::ZERO;
        }
        let idx = (len - max_requests) as usize;
        match self.timestamps.get(idx) {
            Some(&blocking) => match blocking.checked_add(window) {
                Some(deadline) => deadline.saturating_duration_since(now),
                None => window,
            },
            None => window,
        }
    }

    /// Number of timestamps currently held.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Most recent admitted timestamp.
    pub fn last(&self) -> Option<Instant> {
        self.timestamps.back().copied()
    }
}
