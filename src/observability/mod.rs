//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Every event carries `dependency` and, where known, `correlation_id`
//! - Metric updates are no-ops until a recorder is installed, so library
//!   users and tests pay nothing by default

pub mod logging;
pub mod metrics;
