//! In-memory broker for standalone mode.
//!
//! Uses one tokio broadcast channel per topic for pub/sub within a single
//! process. Ideal for local development and testing without external
//! dependencies.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

use super::{Broker, BrokerError, Subscription};

/// Channel capacity per topic.
const CHANNEL_CAPACITY: usize = 1024;

/// In-process broker backed by broadcast channels.
#[derive(Debug)]
pub struct MemoryBroker {
    topics: DashMap<String, broadcast::Sender<Bytes>>,
    available: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate losing the broker connection: publishes and subscribes fail.
    pub fn disconnect(&self) {
        self.available.store(false, Ordering::SeqCst);
        tracing::warn!("Memory broker disconnected");
    }

    /// Restore the broker connection.
    pub fn reconnect(&self) {
        self.available.store(true, Ordering::SeqCst);
        tracing::info!("Memory broker reconnected");
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Close a topic, ending every subscription on it.
    pub fn close_topic(&self, topic: &str) {
        if self.topics.remove(topic).is_some() {
            tracing::info!(topic = %topic, "Memory broker topic closed");
        }
    }

    /// Number of live subscriptions on a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Bytes> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, topic: &str, key: &str, payload: Bytes) -> Result<(), BrokerError> {
        if !self.is_available() {
            return Err(BrokerError::Unavailable("memory broker disconnected".to_string()));
        }

        // Send fails only when nobody is subscribed; the message is simply dropped.
        match self.sender(topic).send(payload) {
            Ok(receivers) => {
                tracing::trace!(topic = %topic, key = %key, receivers, "Published message");
            }
            Err(_) => {
                tracing::debug!(topic = %topic, key = %key, "Published message with no subscribers");
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BrokerError> {
        if !self.is_available() {
            return Err(BrokerError::Unavailable("memory broker disconnected".to_string()));
        }

        let receiver = self.sender(topic).subscribe();
        let topic = topic.to_string();
        tracing::debug!(topic = %topic, "Subscribed to topic");

        let messages = stream::unfold((receiver, topic), |(mut receiver, topic)| async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => return Some((message, (receiver, topic))),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::error!(topic = %topic, skipped, "Subscriber lagged, skipped messages");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!(topic = %topic, "Topic closed, ending subscription");
                        return None;
                    }
                }
            }
        });

        Ok(messages.boxed())
    }
}
