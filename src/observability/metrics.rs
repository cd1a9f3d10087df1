//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_calls_total` (counter): calls by dependency, mode, outcome
//! - `bridge_call_duration_seconds` (histogram): end-to-end call latency
//! - `bridge_pending_replies` (gauge): open correlation slots per dependency
//! - `bridge_unknown_replies_total` (counter): replies for ids not in the table
//! - `bridge_malformed_replies_total` (counter): replies that failed to decode
//! - `bridge_circuit_transitions_total` (counter): breaker state changes by target state
//! - `bridge_bulkhead_rejections_total` (counter): attempts refused by the bulkhead
//! - `bridge_retries_total` (counter): re-attempts scheduled
//! - `bridge_fallbacks_total` (counter): degraded results served

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_call(dependency: &str, mode: &str, outcome: &str, elapsed: Duration) {
    counter!(
        "bridge_calls_total",
        "dependency" => dependency.to_string(),
        "mode" => mode.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!(
        "bridge_call_duration_seconds",
        "dependency" => dependency.to_string(),
        "mode" => mode.to_string()
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_pending(dependency: &str, pending: usize) {
    gauge!("bridge_pending_replies", "dependency" => dependency.to_string()).set(pending as f64);
}

pub fn record_unknown_reply(dependency: &str) {
    counter!("bridge_unknown_replies_total", "dependency" => dependency.to_string()).increment(1);
}

pub fn record_malformed_reply(dependency: &str) {
    counter!("bridge_malformed_replies_total", "dependency" => dependency.to_string()).increment(1);
}

pub fn record_circuit_transition(dependency: &str, to: &'static str) {
    counter!(
        "bridge_circuit_transitions_total",
        "dependency" => dependency.to_string(),
        "to" => to
    )
    .increment(1);
}

pub fn record_bulkhead_rejection(dependency: &str) {
    counter!("bridge_bulkhead_rejections_total", "dependency" => dependency.to_string()).increment(1);
}

pub fn record_retry(dependency: &str) {
    counter!("bridge_retries_total", "dependency" => dependency.to_string()).increment(1);
}

pub fn record_fallback(dependency: &str, reason: &'static str) {
    counter!(
        "bridge_fallbacks_total",
        "dependency" => dependency.to_string(),
        "reason" => reason
    )
    .increment(1);
}
