use std::time::Duration;

use crate::config::{DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_BASE_DELAY};

/// Linear backoff with a hard attempt cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            base_delay: DEFAULT_RECONNECT_BASE_DELAY,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// `base_delay * attempt`
    #[inline]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    #[inline]
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Retry bookkeeping for one caller-initiated connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectContext {
    pub attempt: u32,
    pub policy: ReconnectPolicy,
}

impl ReconnectContext {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { attempt: 0, policy }
    }

    /// Only an explicit connect request from a caller resets the counter.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Record a failure. Returns the delay before the next attempt, or `None`
    /// once the cap is reached.
    pub fn next_retry(&mut self) -> Option<Duration> {
        if !self.policy.should_retry(self.attempt) {
            return None;
        }
        self.attempt += 1;
        Some(self.policy.delay(self.attempt))
    }
}
