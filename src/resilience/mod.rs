//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to dependency:
//!     → pipeline.rs (per attempt: bulkhead.rs admission, circuit_breaker.rs gate)
//!     → strategy attempt bounded by timeouts.rs
//!     → On failure: retry.rs (check if retryable, retry with backoff.rs delay)
//!     → On final failure: fallback.rs (degraded result with the error attached)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every remote attempt has a deadline
//! - Bulkhead and breaker are scoped per dependency, never global
//! - Permits are released before the backoff sleep and reacquired per attempt
//! - Load-shedding errors (`CircuitOpen`, `Saturated`) are never retried

pub mod backoff;
pub mod bulkhead;
pub mod circuit_breaker;
pub mod fallback;
pub mod pipeline;
pub mod retry;
pub mod timeouts;

pub use bulkhead::{Bulkhead, BulkheadPermit};
pub use circuit_breaker::{BreakerPermit, CircuitBreaker, CircuitState};
pub use fallback::{CallResponse, Degradation, FallbackContext, FallbackSupplier, StaticFallback};
pub use pipeline::{PipelineOutcome, ResiliencePipeline};
pub use retry::RetryPolicy;
