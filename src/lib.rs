//! Dual-mode inter-service call client.
//!
//! Business code calls a named dependency through [`Bridge::call`]. Each
//! dependency is reached either directly (HTTP) or through a broker
//! (publish a request, wait for the reply with the same correlation id),
//! wrapped in bulkhead, circuit breaker, retry and timeout policies, with an
//! optional fallback producing a clearly degraded result.

// Core
pub mod bridge;
pub mod error;
pub mod selector;

// Transports
pub mod broker;
pub mod correlation;
pub mod listener;
pub mod transport;

// Callee side
pub mod service;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use bridge::{Bridge, BridgeBuilder, BridgeError};
pub use config::BridgeConfig;
pub use error::{CallError, CallResult};
pub use lifecycle::Shutdown;
pub use resilience::{CallResponse, Degradation, FallbackContext, FallbackSupplier, StaticFallback};
pub use selector::Selector;
