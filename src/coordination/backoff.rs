//! Capped exponential backoff for (re)connecting to the coordination service.

use serde::Serialize;
use std::time::Duration;

/// Base delay before the second connection attempt.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for any single delay.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

const DEFAULT_FACTOR: f64 = 2.0;

/// Parameters of the reconnect delay curve.
///
/// `delay(attempt) = min(max_delay, base_delay * factor^attempt)`. There is no
/// attempt limit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            factor: DEFAULT_FACTOR,
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = if self.factor.is_finite() && self.factor >= 1.0 {
            self.factor
        } else {
            1.0
        };
        let max = self.max_delay.as_secs_f64();
        // powi saturates to inf for large attempts; min() clamps it back to the cap
        let scaled = self.base_delay.as_secs_f64() * factor.powi(attempt.min(i32::MAX as u32) as i32);
        Duration::from_secs_f64(scaled.min(max))
    }

    pub fn start(&self) -> Backoff {
        Backoff {
            policy: *self,
            attempt: 0,
        }
    }
}

/// Running backoff state: one instance per connect loop.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff {
    /// Returns the delay to wait before the next attempt and advances.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Number of failed attempts recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
#[path = "tests/backoff_tests.rs"]
mod tests;
