//! Brokered (publish / correlated reply) transport.
//!
//! # Responsibilities
//! - Register a pending slot under a fresh correlation id per attempt
//! - Publish the request envelope keyed by that correlation id
//! - Wait for the reply listener to resolve the slot, bounded by the deadline
//!
//! The slot is owned by a `PendingHandle` for the whole attempt, so it is
//! removed from the table on every exit path, including the caller dropping
//! the call future.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

use crate::broker::{Broker, RequestEnvelope};
use crate::correlation::{CorrelationId, CorrelationTable};
use crate::error::{CallError, CallResult};

/// Request/reply over a message broker.
pub struct BrokeredStrategy {
    broker: Arc<dyn Broker>,
    table: Arc<CorrelationTable>,
    request_topic: String,
}

impl std::fmt::Debug for BrokeredStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokeredStrategy")
            .field("dependency", &self.table.dependency())
            .field("request_topic", &self.request_topic)
            .field("pending", &self.table.len())
            .finish()
    }
}

impl BrokeredStrategy {
    /// Create a brokered strategy publishing to `request_topic`.
    ///
    /// The table must be the one the dependency's reply listener resolves.
    pub fn new(broker: Arc<dyn Broker>, table: Arc<CorrelationTable>, request_topic: impl Into<String>) -> Self {
        Self {
            broker,
            table,
            request_topic: request_topic.into(),
        }
    }

    pub fn table(&self) -> &Arc<CorrelationTable> {
        &self.table
    }

    pub fn request_topic(&self) -> &str {
        &self.request_topic
    }

    /// Perform one brokered attempt.
    pub async fn call(&self, capability: &str, payload: Bytes, deadline: Duration) -> CallResult<Bytes> {
        let dependency = self.table.dependency();
        let id = CorrelationId::generate(dependency);

        // Registered before publishing so a fast reply always finds its slot.
        let mut pending = self
            .table
            .register(id.clone(), capability, deadline)
            .map_err(|e| CallError::Misconfigured(e.to_string()))?;

        let envelope = RequestEnvelope::new(id.clone(), capability, payload)
            .to_bytes()
            .map_err(|e| CallError::PublishFailed(e.to_string()))?;

        if let Err(e) = self
            .broker
            .publish(&self.request_topic, id.as_str(), envelope)
            .await
        {
            tracing::warn!(
                dependency = %dependency,
                correlation_id = %id,
                topic = %self.request_topic,
                error = %e,
                "Failed to publish request"
            );
            return Err(CallError::PublishFailed(e.to_string()));
        }

        tracing::debug!(
            dependency = %dependency,
            correlation_id = %id,
            capability = %capability,
            topic = %self.request_topic,
            "Published request, awaiting reply"
        );

        let result = pending.wait(deadline).await;
        if let Err(CallError::Timeout(_)) = &result {
            tracing::warn!(
                dependency = %dependency,
                correlation_id = %id,
                deadline_ms = deadline.as_millis() as u64,
                "No reply before deadline"
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{MemoryBroker, ReplyEnvelope};
    use futures_util::StreamExt;

    fn strategy(broker: &Arc<MemoryBroker>) -> BrokeredStrategy {
        BrokeredStrategy::new(
            broker.clone(),
            Arc::new(CorrelationTable::new("customer")),
            "customer-request-topic",
        )
    }

    #[tokio::test]
    async fn test_publishes_envelope_keyed_by_correlation_id() {
        let broker = Arc::new(MemoryBroker::new());
        let strategy = strategy(&broker);
        let mut requests = broker.subscribe("customer-request-topic").await.unwrap();
        let table = strategy.table().clone();

        let call = tokio::spawn(async move {
            strategy
                .call("get-customer", Bytes::from_static(b"7"), Duration::from_secs(5))
                .await
        });

        let raw = requests.next().await.unwrap();
        let request = RequestEnvelope::from_slice(&raw).unwrap();
        assert_eq!(request.capability, "get-customer");
        assert_eq!(request.payload, Bytes::from_static(b"7"));
        assert!(request.correlation_id.as_str().starts_with("customer-request-"));
        assert!(table.contains(&request.correlation_id));

        table.resolve(&request.correlation_id, Ok(Bytes::from_static(b"{\"name\":\"Ada\"}")));
        let reply = call.await.unwrap().unwrap();
        assert_eq!(reply, Bytes::from_static(b"{\"name\":\"Ada\"}"));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_releases_slot() {
        let broker = Arc::new(MemoryBroker::new());
        broker.disconnect();
        let strategy = strategy(&broker);

        let err = strategy
            .call("get-customer", Bytes::new(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::PublishFailed(_)));
        assert!(strategy.table().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_releases_slot_and_ignores_late_reply() {
        let broker = Arc::new(MemoryBroker::new());
        let strategy = strategy(&broker);
        let mut requests = broker.subscribe("customer-request-topic").await.unwrap();

        let err = strategy
            .call("get-customer", Bytes::new(), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err, CallError::Timeout(Duration::from_millis(200)));
        assert!(strategy.table().is_empty());

        let request = RequestEnvelope::from_slice(&requests.next().await.unwrap()).unwrap();
        let late = ReplyEnvelope::success(request.correlation_id, Bytes::from_static(b"late"));
        let (id, result) = late.into_result();
        assert!(!strategy.table().resolve(&id, result));
    }
}
