//! Broker-side responder for brokered callers.
//!
//! # Responsibilities
//! - Consume request envelopes from a request topic
//! - Dispatch each to the capability registry concurrently
//! - Publish a reply envelope, keyed by correlation id, for every decodable request
//! - Drop undecodable requests with a warning (there is no id to reply to)

use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::CapabilityRegistry;
use crate::broker::{Broker, BrokerError, ReplyEnvelope, RequestEnvelope, Subscription};

/// Answers brokered requests for one request/reply topic pair.
pub struct Responder {
    broker: Arc<dyn Broker>,
    registry: Arc<CapabilityRegistry>,
    request_topic: String,
    reply_topic: String,
}

impl Responder {
    pub fn new(
        broker: Arc<dyn Broker>,
        registry: Arc<CapabilityRegistry>,
        request_topic: impl Into<String>,
        reply_topic: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            registry,
            request_topic: request_topic.into(),
            reply_topic: reply_topic.into(),
        }
    }

    /// Subscribe to the request topic, then serve it on a background task.
    ///
    /// Requests published after this returns are guaranteed to be seen.
    pub async fn spawn(self, shutdown: broadcast::Receiver<()>) -> Result<JoinHandle<()>, BrokerError> {
        let subscription = self.broker.subscribe(&self.request_topic).await?;
        let responder = Arc::new(self);
        Ok(tokio::spawn(responder.run(subscription, shutdown)))
    }

    async fn run(self: Arc<Self>, mut subscription: Subscription, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            request_topic = %self.request_topic,
            reply_topic = %self.reply_topic,
            "Responder starting"
        );

        loop {
            tokio::select! {
                message = subscription.next() => {
                    let Some(raw) = message else {
                        tracing::warn!(request_topic = %self.request_topic, "Request subscription ended");
                        break;
                    };
                    let responder = self.clone();
                    tokio::spawn(async move {
                        responder.respond(&raw).await;
                    });
                }
                _ = shutdown.recv() => {
                    tracing::info!(request_topic = %self.request_topic, "Responder received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Handle one raw request. Returns whether a reply was published.
    pub async fn respond(&self, raw: &[u8]) -> bool {
        let request = match RequestEnvelope::from_slice(raw) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(
                    request_topic = %self.request_topic,
                    error = %e,
                    bytes = raw.len(),
                    "Dropping malformed request"
                );
                return false;
            }
        };

        let correlation_id = request.correlation_id;
        let reply = match self.registry.dispatch(&request.capability, request.payload).await {
            Ok(payload) => ReplyEnvelope::success(correlation_id.clone(), payload),
            Err(e) => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    capability = %request.capability,
                    error = %e,
                    "Capability failed, replying with error marker"
                );
                ReplyEnvelope::failure(correlation_id.clone(), e.to_marker())
            }
        };

        let encoded = match reply.to_bytes() {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!(correlation_id = %correlation_id, error = %e, "Failed to encode reply");
                return false;
            }
        };

        match self
            .broker
            .publish(&self.reply_topic, correlation_id.as_str(), encoded)
            .await
        {
            Ok(()) => {
                tracing::debug!(correlation_id = %correlation_id, "Reply published");
                true
            }
            Err(e) => {
                tracing::error!(correlation_id = %correlation_id, error = %e, "Failed to publish reply");
                false
            }
        }
    }
}
