//! Exponential backoff.
//!
//! Used twice: by [`HttpTransport`](crate::HttpTransport) between attempts of
//! one request, and by the ingestion scheduler between failed cycles.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Stateless policy: delay as a function of the attempt number.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Backoff before the `attempt`-th retry (1-based), capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let base_ms =
            self.config.initial_backoff.as_millis() as f64 * self.config.multiplier.powi(exponent);
        let cap_ms = self.config.max_backoff.as_millis() as f64;
        Duration::from_millis(base_ms.min(cap_ms) as u64)
    }

    /// Like [`backoff`](Self::backoff), `None` once retries are exhausted.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        self.should_retry(attempt).then(|| self.backoff(attempt))
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.config.max_retries
    }
}
