//! Rate limit policy: window length and request cap.

use std::time::Duration;

use crate::config::RateLimitingConfig;
use crate::error::{Result, WindowGateError};

/// Default window when none is configured (one hour).
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(3600);
/// Default cap when none is configured.
pub const DEFAULT_MAX_REQUESTS: u64 = 100;

/// An immutable sliding-window policy.
///
/// At most `max_requests` requests per client are admitted within any
/// interval of length `window` ending at the time of the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    window: Duration,
    max_requests: u64,
}

impl Policy {
    /// Create a policy, rejecting a zero window or a zero cap.
    pub fn new(window: Duration, max_requests: u64) -> Result<Self> {
        if window.is_zero() {
            return Err(WindowGateError::Config(
                "rate limit window must be greater than zero".to_string(),
            ));
        }
        if max_requests == 0 {
            return Err(WindowGateError::Config(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            window,
            max_requests,
        })
    }

    /// `max_requests` per second.
    pub fn per_second(max_requests: u64) -> Result<Self> {
        Self::new(Duration::from_secs(1), max_requests)
    }

    /// `max_requests` per minute.
    pub fn per_minute(max_requests: u64) -> Result<Self> {
        Self::new(Duration::from_secs(60), max_requests)
    }

    /// `max_requests` per hour.
    pub fn per_hour(max_requests: u64) -> Result<Self> {
        Self::new(Duration::from_secs(3600), max_requests)
    }

    /// Length of the sliding window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Maximum number of admitted requests within one window.
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            max_requests: DEFAULT_MAX_REQUESTS,
        }
    }
}

impl TryFrom<&RateLimitingConfig> for Policy {
    type Error = WindowGateError;

    fn try_from(config: &RateLimitingConfig) -> Result<Self> {
        Policy::new(Duration::from_secs(config.window_secs), config.max_requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_hundred_per_hour() {
        let policy = Policy::default();
        assert_eq!(policy.window(), Duration::from_secs(3600));
        assert_eq!(policy.max_requests(), 100);
        assert_eq!(policy, Policy::per_hour(100).unwrap());
    }

    #[test]
    fn test_zero_window_rejected() {
        let result = Policy::new(Duration::ZERO, 10);
        assert!(matches!(result, Err(WindowGateError::Config(_))));
    }

    #[test]
    fn test_zero_cap_rejected() {
        let result = Policy::per_second(0);
        assert!(matches!(result, Err(WindowGateError::Config(_))));
    }

    #[test]
    fn test_policy_from_config() {
        let config = RateLimitingConfig {
            window_secs: 10,
            max_requests: 3,
            ..RateLimitingConfig::default()
        };
        let policy = Policy::try_from(&config).unwrap();
        assert_eq!(policy.window(), Duration::from_secs(10));
        assert_eq!(policy.max_requests(), 3);
    }
}
