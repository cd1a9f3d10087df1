//! Bulkhead (per-dependency concurrency limit).
//!
//! # Responsibilities
//! - Bound in-flight attempts against one dependency
//! - Fail fast with `Saturated` when no permit frees up within the acquire timeout
//! - Release the permit on every exit path (RAII)

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::BulkheadConfig;
use crate::error::{CallError, CallResult};
use crate::observability::metrics;

/// Counting admission gate for one dependency.
#[derive(Debug, Clone)]
pub struct Bulkhead {
    dependency: String,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    acquire_timeout: Duration,
}

/// Held for the duration of one attempt.
#[derive(Debug)]
pub struct BulkheadPermit {
    _permit: OwnedSemaphorePermit,
}

impl Bulkhead {
    pub fn new(dependency: &str, config: &BulkheadConfig) -> Self {
        Self {
            dependency: dependency.to_string(),
            permits: Arc::new(Semaphore::new(config.max_concurrent)),
            max_concurrent: config.max_concurrent,
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
        }
    }

    /// Acquire a permit, waiting at most the acquire timeout.
    pub async fn acquire(&self) -> CallResult<BulkheadPermit> {
        if let Ok(permit) = self.permits.clone().try_acquire_owned() {
            return Ok(BulkheadPermit { _permit: permit });
        }

        if !self.acquire_timeout.is_zero() {
            if let Ok(Ok(permit)) =
                tokio::time::timeout(self.acquire_timeout, self.permits.clone().acquire_owned()).await
            {
                return Ok(BulkheadPermit { _permit: permit });
            }
        }

        tracing::warn!(
            dependency = %self.dependency,
            max_concurrent = self.max_concurrent,
            "Bulkhead saturated, rejecting attempt"
        );
        metrics::record_bulkhead_rejection(&self.dependency);
        Err(CallError::Saturated(self.dependency.clone()))
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}
