//! Core sliding-window rate limiter implementation.

use std::fmt;
use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::key::ClientKey;
use super::log::RequestLog;
use super::policy::Policy;

/// Minimum spacing between full sweeps triggered by reaching capacity.
const CAPACITY_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of a rate limit check for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed and has been recorded.
    Admit {
        /// Requests still available in the current window.
        remaining: u64,
    },
    /// The request exceeds the cap and was not recorded.
    Reject {
        /// Time until the client's window has room again.
        retry_after: Duration,
    },
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admit { .. })
    }

    /// Retry hint, present only on rejection.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Decision::Admit { .. } => None,
            Decision::Reject { retry_after } => Some(*retry_after),
        }
    }

    /// Remaining quota after this decision.
    pub fn remaining(&self) -> u64 {
        match self {
            Decision::Admit { remaining } => *remaining,
            Decision::Reject { .. } => 0,
        }
    }
}

/// A per-client sliding-window rate limiter.
///
/// Each client key owns a log of admitted request timestamps. A request is
/// admitted when fewer than `max_requests` timestamps lie strictly within
/// `window` of the check time. Logs live in a sharded concurrent map; the
/// prune-decide-record cycle for one key runs under that key's entry lock,
/// so concurrent checks on the same key never lose updates while checks on
/// unrelated keys proceed in parallel.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct SlidingWindowLimiter<K = ClientKey> {
    policy: Policy,
    /// Upper bound on tracked keys, if any
    max_clients: Option<usize>,
    /// Request logs indexed by client key
    logs: DashMap<K, RequestLog>,
    /// When capacity pressure last triggered a sweep
    last_capacity_sweep: Mutex<Option<Instant>>,
}

impl<K> SlidingWindowLimiter<K>
where
    K: Eq + Hash + Clone + fmt::Display,
{
    /// Create a new limiter enforcing `policy`.
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            max_clients: None,
            logs: DashMap::new(),
            last_capacity_sweep: Mutex::new(None),
        }
    }

    /// Bound the number of tracked client keys.
    ///
    /// When a new key arrives at capacity, keys with empty logs are swept and,
    /// if that is not enough, the key idle for the longest time is evicted.
    /// The bound may be briefly exceeded while distinct new keys race in.
    ///
    /// Admitting an unseen key at capacity costs a scan over every tracked
    /// key to find the idlest one. The full sweep runs at most once per
    /// second of `now`; in between, expired keys are only reclaimed through
    /// eviction.
    pub fn with_max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = Some(max_clients.max(1));
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Decide whether a request from `key` at `now` may proceed.
    ///
    /// Admitted requests are recorded; rejected ones are not. The key's log is
    /// pruned on every call either way.
    pub fn admit(&self, key: &K, now: Instant) -> Decision {
        if let Some(max_clients) = self.max_clients {
            if self.logs.len() >= max_clients && !self.logs.contains_key(key) {
                self.make_room(now, max_clients);
            }
        }

        let window = self.policy.window();
        let max_requests = self.policy.max_requests();

        let mut log = self.logs.entry(key.clone()).or_default();
        log.prune(now, window);

        let in_window = log.len() as u64;
        if in_window >= max_requests {
            let retry_after = log.retry_after(now, window, max_requests);
            debug!(
                key = %key,
                in_window,
                limit = max_requests,
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limit exceeded"
            );
            return Decision::Reject { retry_after };
        }

        log.record(now);
        let remaining = max_requests - (in_window + 1);
        trace!(key = %key, remaining, "Request admitted");
        Decision::Admit { remaining }
    }

    /// Prune every log against `now` and drop keys left with no requests.
    ///
    /// Returns the number of keys removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let window = self.policy.window();
        let mut removed = 0;

        self.logs.retain(|_, log| {
            log.prune(now, window);
            if log.is_empty() {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            debug!(removed, remaining = self.logs.len(), "Swept idle clients");
        }
        removed
    }

    /// Number of requests from `key` currently counted against its cap.
    pub fn request_count(&self, key: &K, now: Instant) -> usize {
        match self.logs.get_mut(key) {
            Some(mut log) => {
                log.prune(now, self.policy.window());
                log.len()
            }
            None => 0,
        }
    }

    /// Number of client keys currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.logs.len()
    }

    /// Forget all clients.
    pub fn clear(&self) {
        self.logs.clear();
    }

    fn make_room(&self, now: Instant, max_clients: usize) {
        if self.capacity_sweep_due(now) {
            self.sweep(now);
            if self.logs.len() < max_clients {
                return;
            }
        }

        // Empty logs order first since `None < Some(_)`.
        let idlest = self
            .logs
            .iter()
            .min_by_key(|entry| entry.value().last())
            .map(|entry| (entry.key().clone(), entry.value().last()));

        if let Some((key, last_seen)) = idlest {
            if self
                .logs
                .remove_if(&key, |_, log| log.last() == last_seen)
                .is_some()
            {
                warn!(key = %key, max_clients, "Evicted idle client at capacity");
            }
        }
    }

    fn capacity_sweep_due(&self, now: Instant) -> bool {
        let mut last = self.last_capacity_sweep.lock();
        match *last {
            Some(prev) if now.saturating_duration_since(prev) < CAPACITY_SWEEP_INTERVAL => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}
