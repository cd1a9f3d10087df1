//! Backoff schedules between retry attempts.

use rand::Rng;
use std::time::Duration;

use crate::config::BackoffConfig;

/// Calculate exponential backoff delay with jitter.
///
/// `retry` is 1 for the delay before the second attempt.
pub fn calculate_backoff(retry: u32, base_ms: u64, max_ms: u64) -> Duration {
    if retry == 0 {
        return Duration::ZERO;
    }

    let exponential_base = 2u64.saturating_pow(retry - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Delay schedule derived from configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffSchedule {
    Fixed(Duration),
    Exponential { base_ms: u64, max_ms: u64 },
}

impl BackoffSchedule {
    /// Delay to sleep before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        match self {
            BackoffSchedule::Fixed(delay) => *delay,
            BackoffSchedule::Exponential { base_ms, max_ms } => calculate_backoff(retry, *base_ms, *max_ms),
        }
    }
}

impl From<&BackoffConfig> for BackoffSchedule {
    fn from(config: &BackoffConfig) -> Self {
        match config {
            BackoffConfig::Fixed { delay_ms } => BackoffSchedule::Fixed(Duration::from_millis(*delay_ms)),
            BackoffConfig::Exponential { base_delay_ms, max_delay_ms } => BackoffSchedule::Exponential {
                base_ms: *base_delay_ms,
                max_ms: *max_delay_ms,
            },
        }
    }
}
