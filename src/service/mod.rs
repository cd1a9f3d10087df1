//! Callee side: capabilities served to other services.
//!
//! # Data Flow
//! ```text
//! Direct:   POST /capabilities/{capability} → http.rs → registry → handler
//! Brokered: request topic → responder.rs → registry → handler
//!               → reply envelope (payload or error marker) → reply topic
//! ```
//!
//! # Design Decisions
//! - Handlers see opaque bytes in and out; business rules live behind them
//! - A handler failure is always answered (HTTP status or error marker), never dropped
//! - Client-side mistakes are reported as permanent so callers do not retry them

pub mod http;
pub mod responder;

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::broker::PERMANENT_MARKER_PREFIX;

/// Failures a capability handler can report.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("Unknown capability '{0}'")]
    UnknownCapability(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Handler failed: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Whether retrying the same request can never succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            HandlerError::UnknownCapability(_) | HandlerError::InvalidRequest(_) | HandlerError::NotFound(_)
        )
    }

    /// Error marker carried in a reply envelope.
    pub fn to_marker(&self) -> String {
        if self.is_permanent() {
            format!("{} {}", PERMANENT_MARKER_PREFIX, self)
        } else {
            self.to_string()
        }
    }
}

/// A capability served by this process.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn handle(&self, payload: Bytes) -> Result<Bytes, HandlerError>;
}

/// Adapts a plain function into a handler.
struct FnHandler<F>(F);

#[async_trait]
impl<F> CapabilityHandler for FnHandler<F>
where
    F: Fn(Bytes) -> Result<Bytes, HandlerError> + Send + Sync,
{
    async fn handle(&self, payload: Bytes) -> Result<Bytes, HandlerError> {
        (self.0)(payload)
    }
}

/// Capability name → handler.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    handlers: HashMap<String, Arc<dyn CapabilityHandler>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry serving only the built-in `echo` capability.
    pub fn with_echo() -> Self {
        let mut registry = Self::new();
        registry.register_fn("echo", Ok);
        registry
    }

    pub fn register(&mut self, capability: impl Into<String>, handler: impl CapabilityHandler + 'static) -> &mut Self {
        self.handlers.insert(capability.into(), Arc::new(handler));
        self
    }

    /// Register a synchronous function as a capability.
    pub fn register_fn<F>(&mut self, capability: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(Bytes) -> Result<Bytes, HandlerError> + Send + Sync + 'static,
    {
        self.register(capability, FnHandler(handler))
    }

    pub fn contains(&self, capability: &str) -> bool {
        self.handlers.contains_key(capability)
    }

    /// Registered capability names, sorted.
    pub fn capabilities(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Invoke the handler for `capability`.
    pub async fn dispatch(&self, capability: &str, payload: Bytes) -> Result<Bytes, HandlerError> {
        let handler = self
            .handlers
            .get(capability)
            .ok_or_else(|| HandlerError::UnknownCapability(capability.to_string()))?;
        handler.handle(payload).await
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.capabilities())
            .finish()
    }
}
