//! Broker boundary.
//!
//! # Data Flow
//! ```text
//! BrokeredStrategy
//!     → envelope.rs (RequestEnvelope → JSON bytes)
//!     → Broker::publish(request_topic, key = correlation id, bytes)
//!
//! Broker::subscribe(reply_topic) → Subscription (stream of raw bytes)
//!     → ReplyListener decodes ReplyEnvelope and resolves the table
//! ```
//!
//! # Design Decisions
//! - The bridge only needs publish + subscribe; delivery guarantees are the
//!   backend's business (assumed at-least-once, unordered across keys)
//! - Payloads stay raw bytes end to end; only envelopes are serialized
//! - `MemoryBroker` is the in-process backend for standalone mode and tests

pub mod envelope;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

pub use envelope::{EnvelopeError, ReplyEnvelope, RequestEnvelope, PERMANENT_MARKER_PREFIX};
pub use memory::MemoryBroker;

/// Errors that can occur at the broker boundary.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),
}

/// Stream of raw messages delivered on a subscribed topic.
///
/// The stream ends when the broker shuts the topic down.
pub type Subscription = BoxStream<'static, Bytes>;

/// Minimal publish/subscribe contract the bridge needs from a broker.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish one message to `topic`, partitioned by `key`.
    async fn publish(&self, topic: &str, key: &str, payload: Bytes) -> Result<(), BrokerError>;

    /// Subscribe to every message subsequently published on `topic`.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, BrokerError>;
}
