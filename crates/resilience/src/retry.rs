//! Bounded retry with exponential backoff.

use std::time::Duration;

use crate::config::ResilienceSettings;

/// Retry policy: a bounded number of attempts with exponentially growing
/// waits between them.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    wait_duration: Duration,
    multiplier: f64,
}

impl RetryPolicy {
    /// Creates a policy from explicit values.
    pub fn new(max_attempts: u32, wait_duration: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            wait_duration,
            multiplier,
        }
    }

    /// Creates a policy from resilience settings.
    pub fn from_settings(settings: &ResilienceSettings) -> Self {
        Self::new(
            settings.max_attempts,
            settings.wait_duration,
            settings.exponential_backoff_multiplier,
        )
    }

    /// Total attempts per call, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the wait before the attempt following `attempt` (1-based).
    ///
    /// The first retry waits `wait_duration`, each one after that grows by
    /// the multiplier.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30);
        let factor = self.multiplier.powi(exponent as i32);
        self.wait_duration.mul_f64(factor)
    }
}
