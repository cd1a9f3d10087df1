//! Call error taxonomy.
//!
//! Every failure a dependency call can end in is one of these variants.
//! Replies that reference an unknown correlation id never reach a caller;
//! they are reported by the correlation table and logged by the listener.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by a dependency call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    /// The request envelope could not be handed to the broker.
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// No reply (or response) arrived before the deadline.
    #[error("Deadline of {}ms elapsed before a reply arrived", .0.as_millis())]
    Timeout(Duration),

    /// The callee explicitly reported a failure.
    #[error("Remote error{}: {message}", .status.map(|s| format!(" (status {})", s)).unwrap_or_default())]
    RemoteError {
        /// HTTP status for direct calls, `None` for brokered error markers.
        status: Option<u16>,
        /// Callee-supplied description.
        message: String,
        /// Whether the failure is worth retrying.
        transient: bool,
    },

    /// The callee could not be reached at all (connection refused, DNS, IO).
    #[error("Dependency unreachable: {0}")]
    Unreachable(String),

    /// Fast-fail: the dependency's circuit breaker is open.
    #[error("Circuit open for dependency '{0}'")]
    CircuitOpen(String),

    /// The dependency's bulkhead had no free permit.
    #[error("Bulkhead saturated for dependency '{0}'")]
    Saturated(String),

    /// The pending slot was released before a reply arrived (reaped or shut down).
    #[error("Call cancelled before a reply arrived")]
    Cancelled,

    /// No dependency with that name is configured.
    #[error("Unknown dependency '{0}'")]
    UnknownDependency(String),

    /// The dependency cannot be called as configured.
    #[error("Dependency misconfigured: {0}")]
    Misconfigured(String),
}

impl CallError {
    /// Whether the retry layer may re-attempt after this error.
    ///
    /// `CircuitOpen` and `Saturated` are load-shedding decisions and are never
    /// retried here. `PublishFailed` is retried only on explicit opt-in.
    pub fn is_retryable(&self, retry_publish_failures: bool) -> bool {
        match self {
            CallError::Timeout(_) | CallError::Unreachable(_) => true,
            CallError::RemoteError { transient, .. } => *transient,
            CallError::PublishFailed(_) => retry_publish_failures,
            CallError::CircuitOpen(_)
            | CallError::Saturated(_)
            | CallError::Cancelled
            | CallError::UnknownDependency(_)
            | CallError::Misconfigured(_) => false,
        }
    }

    /// Whether this outcome counts against the dependency's health.
    ///
    /// A non-transient remote error means the callee answered; it does not
    /// indicate an unhealthy dependency.
    pub fn counts_as_failure(&self) -> bool {
        match self {
            CallError::Timeout(_) | CallError::Unreachable(_) | CallError::PublishFailed(_) => true,
            CallError::RemoteError { transient, .. } => *transient,
            _ => false,
        }
    }

    /// Short stable label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::PublishFailed(_) => "publish_failed",
            CallError::Timeout(_) => "timeout",
            CallError::RemoteError { .. } => "remote_error",
            CallError::Unreachable(_) => "unreachable",
            CallError::CircuitOpen(_) => "circuit_open",
            CallError::Saturated(_) => "saturated",
            CallError::Cancelled => "cancelled",
            CallError::UnknownDependency(_) => "unknown_dependency",
            CallError::Misconfigured(_) => "misconfigured",
        }
    }
}

/// Result type for dependency calls.
pub type CallResult<T> = Result<T, CallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(CallError::Timeout(Duration::from_secs(1)).is_retryable(false));
        assert!(CallError::Unreachable("refused".into()).is_retryable(false));
        assert!(!CallError::CircuitOpen("customer".into()).is_retryable(true));
        assert!(!CallError::Saturated("customer".into()).is_retryable(true));

        let publish = CallError::PublishFailed("broker down".into());
        assert!(!publish.is_retryable(false));
        assert!(publish.is_retryable(true));

        let permanent = CallError::RemoteError { status: Some(404), message: "nope".into(), transient: false };
        assert!(!permanent.is_retryable(true));
        assert!(!permanent.counts_as_failure());
    }

    #[test]
    fn test_error_display() {
        let err = CallError::Timeout(Duration::from_millis(2000));
        assert_eq!(err.to_string(), "Deadline of 2000ms elapsed before a reply arrived");

        let err = CallError::RemoteError { status: Some(503), message: "busy".into(), transient: true };
        assert_eq!(err.to_string(), "Remote error (status 503): busy");

        let err = CallError::RemoteError { status: None, message: "no customer".into(), transient: true };
        assert_eq!(err.to_string(), "Remote error: no customer");
    }
}
