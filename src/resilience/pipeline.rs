//! Resilience pipeline for one dependency.
//!
//! # Data Flow
//! ```text
//! execute(op)
//!     → attempt 1..=max_attempts:
//!         → bulkhead.acquire()        (Saturated, never retried)
//!         → breaker.try_acquire()     (CircuitOpen, never retried)
//!         → op(attempt)               (strategy call with deadline)
//!         → permit.record(outcome)    (breaker accounting)
//!         → drop permits
//!     → retryable failure: sleep backoff, holding no permit
//! ```

use std::future::Future;
use std::sync::Arc;

use crate::config::DependencyConfig;
use crate::error::CallResult;
use crate::observability::metrics;
use crate::resilience::bulkhead::{Bulkhead, BulkheadPermit};
use crate::resilience::circuit_breaker::{BreakerPermit, CircuitBreaker};
use crate::resilience::retry::RetryPolicy;

/// Final result of a pipelined call and how many attempts reached the strategy.
#[derive(Debug)]
pub struct PipelineOutcome<T> {
    pub result: CallResult<T>,
    pub attempts: u32,
}

/// Bulkhead, circuit breaker and retry for one dependency.
#[derive(Debug)]
pub struct ResiliencePipeline {
    dependency: String,
    bulkhead: Bulkhead,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl ResiliencePipeline {
    pub fn new(config: &DependencyConfig) -> Self {
        Self {
            dependency: config.name.clone(),
            bulkhead: Bulkhead::new(&config.name, &config.bulkhead),
            breaker: Arc::new(CircuitBreaker::new(&config.name, &config.circuit_breaker)),
            retry: RetryPolicy::new(&config.retry),
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn bulkhead(&self) -> &Bulkhead {
        &self.bulkhead
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run `op` under every policy. `op` receives the 1-based attempt number
    /// and must start a fresh remote attempt each time it is called.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> PipelineOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = CallResult<T>>,
    {
        let mut attempts = 0;
        let mut attempt = 1;

        loop {
            let result = match self.admit().await {
                Ok((bulkhead_permit, breaker_permit)) => {
                    attempts += 1;
                    let result = op(attempt).await;
                    breaker_permit.record(&result);
                    drop(bulkhead_permit);
                    result
                }
                Err(e) => Err(e),
            };

            let error = match result {
                Ok(value) => return PipelineOutcome { result: Ok(value), attempts },
                Err(e) => e,
            };

            if !self.retry.should_retry(attempt, &error) {
                if attempt > 1 {
                    tracing::warn!(
                        dependency = %self.dependency,
                        attempt,
                        error = %error,
                        "Giving up on call"
                    );
                }
                return PipelineOutcome { result: Err(error), attempts };
            }

            let delay = self.retry.delay_after(attempt);
            tracing::warn!(
                dependency = %self.dependency,
                attempt,
                error = %error,
                delay_ms = delay.as_millis() as u64,
                "Attempt failed, retrying after backoff"
            );
            metrics::record_retry(&self.dependency);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn admit(&self) -> CallResult<(BulkheadPermit, BreakerPermit)> {
        let bulkhead_permit = self.bulkhead.acquire().await?;
        let breaker_permit = self.breaker.try_acquire()?;
        Ok((bulkhead_permit, breaker_permit))
    }
}
