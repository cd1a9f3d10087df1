//! Retry policy.
//!
//! # Responsibilities
//! - Decide whether a failed attempt may be re-attempted
//! - Supply the delay before the next attempt
//!
//! # Design Decisions
//! - Stateless and applied per call; attempt counting lives in the pipeline
//! - `CircuitOpen` and `Saturated` are never retried here: the breaker or
//!   bulkhead already decided to shed load
//! - Brokered retries never republish a correlation id; each attempt goes
//!   back through the strategy, which generates a fresh one

use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::CallError;
use crate::resilience::backoff::BackoffSchedule;

/// Bounded attempts with a backoff schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: BackoffSchedule,
    retry_publish_failures: bool,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: BackoffSchedule::from(&config.backoff),
            retry_publish_failures: config.retry_publish_failures,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether attempt number `attempt` (1-based) that failed with `error`
    /// should be followed by another.
    pub fn should_retry(&self, attempt: u32, error: &CallError) -> bool {
        attempt < self.max_attempts && error.is_retryable(self.retry_publish_failures)
    }

    /// Delay to wait after failed attempt number `attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}
