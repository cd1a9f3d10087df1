//! Fallback supplier and degraded results.
//!
//! When a call cannot complete, a caller-supplied function produces a
//! conservative substitute payload. The result is always marked degraded and
//! carries the error that caused it, so it can never be mistaken for a
//! genuine reply.

use bytes::Bytes;
use std::fmt;

use crate::error::CallError;

/// What the fallback is told about the failed call.
#[derive(Debug, Clone)]
pub struct FallbackContext {
    pub dependency: String,
    pub capability: String,
    pub error: CallError,
    pub attempts: u32,
}

/// Produces a degraded payload for a failed call.
pub trait FallbackSupplier: Send + Sync {
    fn fallback(&self, context: &FallbackContext) -> Bytes;
}

impl<F> FallbackSupplier for F
where
    F: Fn(&FallbackContext) -> Bytes + Send + Sync,
{
    fn fallback(&self, context: &FallbackContext) -> Bytes {
        self(context)
    }
}

/// Always answers with the same payload.
#[derive(Debug, Clone)]
pub struct StaticFallback(pub Bytes);

impl FallbackSupplier for StaticFallback {
    fn fallback(&self, _context: &FallbackContext) -> Bytes {
        self.0.clone()
    }
}

/// Why a response is degraded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Degradation {
    /// Error that ended the last attempt.
    pub error: CallError,
    /// Attempts made before giving up (0 if none was admitted).
    pub attempts: u32,
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} after {} attempt(s)", self.error, self.attempts)
    }
}

/// Result of a call: a genuine reply, or a fallback marked degraded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResponse {
    pub payload: Bytes,
    pub degraded: Option<Degradation>,
}

impl CallResponse {
    pub fn genuine(payload: Bytes) -> Self {
        Self {
            payload,
            degraded: None,
        }
    }

    pub fn degraded(payload: Bytes, error: CallError, attempts: u32) -> Self {
        Self {
            payload,
            degraded: Some(Degradation { error, attempts }),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    /// Strict view: the genuine payload, or the error behind the fallback.
    pub fn into_strict(self) -> Result<Bytes, CallError> {
        match self.degraded {
            None => Ok(self.payload),
            Some(degradation) => Err(degradation.error),
        }
    }
}
