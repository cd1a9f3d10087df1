//! Reply listener.
//!
//! # Responsibilities
//! - Consume reply envelopes from a dependency's reply topic for the process lifetime
//! - Resolve the matching pending slot by correlation id (never by arrival order)
//! - Drop malformed and unknown replies with structured logging, never exit on them
//! - Re-subscribe with backoff when the reply subscription ends
//! - Periodically reap slots that outlived their deadline
//!
//! # Design Decisions
//! - Resolution is a non-blocking oneshot handoff; a slow caller never stalls the loop
//! - One listener task per subscribed reply topic
//! - Pending slots survive a re-subscribe gap; the reaper keeps running during it
//! - On exit every remaining slot is released so no caller waits on a dead listener

use std::sync::Arc;
use std::time::Duration;
use futures_util::StreamExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Interval, MissedTickBehavior};

use crate::broker::{Broker, ReplyEnvelope, Subscription};
use crate::config::BrokerConfig;
use crate::correlation::CorrelationTable;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

/// Shortest reaper period; `tokio::time::interval` rejects zero.
const MIN_REAPER_INTERVAL: Duration = Duration::from_millis(1);

/// Long-running task resolving pending slots from a reply subscription.
pub struct ReplyListener {
    table: Arc<CorrelationTable>,
    broker: Arc<dyn Broker>,
    reply_topic: String,
    subscription: Subscription,
    reaper_interval: Duration,
    reaper_slack: Duration,
    resubscribe_base_ms: u64,
    resubscribe_max_ms: u64,
}

impl ReplyListener {
    /// Create a listener over an existing subscription to `reply_topic`.
    ///
    /// Slots more than `reaper_slack` past their deadline are reaped every
    /// `reaper_interval`. If the subscription ends, `broker` is asked for a
    /// new one.
    pub fn new(
        table: Arc<CorrelationTable>,
        broker: Arc<dyn Broker>,
        reply_topic: impl Into<String>,
        subscription: Subscription,
        config: &BrokerConfig,
    ) -> Self {
        Self {
            table,
            broker,
            reply_topic: reply_topic.into(),
            subscription,
            reaper_interval: config.reaper_interval().max(MIN_REAPER_INTERVAL),
            reaper_slack: config.reaper_slack(),
            resubscribe_base_ms: config.resubscribe_base_ms.max(1),
            resubscribe_max_ms: config.resubscribe_max_ms.max(1),
        }
    }

    /// Spawn the listener onto the runtime.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Run until shutdown is signalled.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let dependency = self.table.dependency().to_string();
        tracing::info!(
            dependency = %dependency,
            topic = %self.reply_topic,
            reaper_interval_ms = self.reaper_interval.as_millis() as u64,
            "Reply listener starting"
        );

        let mut reaper = time::interval_at(
            time::Instant::now() + self.reaper_interval,
            self.reaper_interval,
        );
        reaper.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                message = self.subscription.next() => {
                    match message {
                        Some(raw) => {
                            self.handle_message(&raw);
                        }
                        None => {
                            tracing::warn!(
                                dependency = %dependency,
                                topic = %self.reply_topic,
                                "Reply subscription ended, re-subscribing"
                            );
                            if !self.resubscribe(&mut reaper, &mut shutdown).await {
                                break;
                            }
                        }
                    }
                }
                _ = reaper.tick() => {
                    self.reap();
                }
                _ = shutdown.recv() => {
                    tracing::info!(dependency = %dependency, "Reply listener received shutdown signal, exiting loop");
                    break;
                }
            }
        }

        let released = self.table.cancel_all();
        tracing::info!(dependency = %dependency, released, "Reply listener stopped");
    }

    /// Re-subscribe to the reply topic until it works or shutdown fires.
    ///
    /// Returns `false` on shutdown.
    async fn resubscribe(
        &mut self,
        reaper: &mut Interval,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> bool {
        let mut attempt = 0u32;
        loop {
            attempt = attempt.saturating_add(1);
            let delay = calculate_backoff(attempt, self.resubscribe_base_ms, self.resubscribe_max_ms);
            let sleep = time::sleep(delay);
            tokio::pin!(sleep);

            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    _ = reaper.tick() => self.reap(),
                    _ = shutdown.recv() => {
                        tracing::info!(
                            dependency = %self.table.dependency(),
                            "Reply listener received shutdown signal while re-subscribing"
                        );
                        return false;
                    }
                }
            }

            match self.broker.subscribe(&self.reply_topic).await {
                Ok(subscription) => {
                    self.subscription = subscription;
                    tracing::info!(
                        dependency = %self.table.dependency(),
                        topic = %self.reply_topic,
                        attempt,
                        "Reply subscription restored"
                    );
                    return true;
                }
                Err(e) => {
                    tracing::warn!(
                        dependency = %self.table.dependency(),
                        topic = %self.reply_topic,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Re-subscribe failed"
                    );
                }
            }
        }
    }

    fn reap(&self) {
        let reaped = self.table.reap_expired(self.reaper_slack);
        if reaped > 0 {
            tracing::warn!(dependency = %self.table.dependency(), reaped, "Reaped expired pending slots");
        }
    }

    /// Decode one raw reply and resolve its slot. Returns whether a caller was woken.
    pub fn handle_message(&self, raw: &[u8]) -> bool {
        let envelope = match ReplyEnvelope::from_slice(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(
                    dependency = %self.table.dependency(),
                    error = %e,
                    bytes = raw.len(),
                    "Dropping malformed reply"
                );
                metrics::record_malformed_reply(self.table.dependency());
                return false;
            }
        };

        let (correlation_id, result) = envelope.into_result();
        tracing::debug!(
            dependency = %self.table.dependency(),
            correlation_id = %correlation_id,
            success = result.is_ok(),
            "Received reply"
        );
        self.table.resolve(&correlation_id, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use crate::error::CallError;
    use bytes::Bytes;

    const REPLIES: &str = "replies";

    async fn listener(
        broker: &Arc<MemoryBroker>,
        table: &Arc<CorrelationTable>,
        config: &BrokerConfig,
    ) -> ReplyListener {
        let subscription = broker.subscribe(REPLIES).await.unwrap();
        let shared: Arc<dyn Broker> = broker.clone();
        ReplyListener::new(table.clone(), shared, REPLIES, subscription, config)
    }

    async fn publish_reply(broker: &MemoryBroker, id: &str, payload: &'static [u8]) {
        let reply = ReplyEnvelope::success(id.into(), Bytes::from_static(payload));
        broker.publish(REPLIES, id, reply.to_bytes().unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_reply_does_not_stop_listener() {
        let broker = Arc::new(MemoryBroker::new());
        let table = Arc::new(CorrelationTable::new("customer"));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = listener(&broker, &table, &BrokerConfig::default()).await.spawn(shutdown_rx);

        let mut handle = table.register("good".into(), "get-customer", Duration::from_secs(5)).unwrap();

        broker.publish(REPLIES, "x", Bytes::from_static(b"{ not json")).await.unwrap();
        publish_reply(&broker, "good", b"payload").await;

        let result = handle.wait(Duration::from_secs(5)).await;
        assert_eq!(result.unwrap(), Bytes::from_static(b"payload"));

        let _ = shutdown_tx.send(());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_reply_leaves_table_untouched() {
        let broker = Arc::new(MemoryBroker::new());
        let table = Arc::new(CorrelationTable::new("customer"));
        let listener = listener(&broker, &table, &BrokerConfig::default()).await;

        let _pending = table.register("mine".into(), "get-customer", Duration::from_secs(5)).unwrap();
        let stray = ReplyEnvelope::success("someone-else".into(), Bytes::from_static(b"x"));

        assert!(!listener.handle_message(&stray.to_bytes().unwrap()));
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_releases_pending_callers() {
        let broker = Arc::new(MemoryBroker::new());
        let table = Arc::new(CorrelationTable::new("customer"));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = listener(&broker, &table, &BrokerConfig::default()).await.spawn(shutdown_rx);

        let mut handle = table.register("waiting".into(), "get-customer", Duration::from_secs(5)).unwrap();
        let _ = shutdown_tx.send(());
        task.await.unwrap();

        assert_eq!(handle.wait(Duration::from_secs(5)).await, Err(CallError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_reaper_interval_keeps_listener_alive() {
        let broker = Arc::new(MemoryBroker::new());
        let table = Arc::new(CorrelationTable::new("customer"));
        let config = BrokerConfig {
            reaper_interval_ms: 0,
            ..BrokerConfig::default()
        };
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = listener(&broker, &table, &config).await.spawn(shutdown_rx);

        let mut handle = table.register("alive".into(), "get-customer", Duration::from_secs(5)).unwrap();
        publish_reply(&broker, "alive", b"ok").await;
        assert_eq!(handle.wait(Duration::from_secs(5)).await.unwrap(), Bytes::from_static(b"ok"));

        let _ = shutdown_tx.send(());
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribes_after_topic_closed() {
        let broker = Arc::new(MemoryBroker::new());
        let table = Arc::new(CorrelationTable::new("customer"));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = listener(&broker, &table, &BrokerConfig::default()).await.spawn(shutdown_rx);

        let mut waiting = table.register("before".into(), "get-customer", Duration::from_secs(30)).unwrap();

        broker.close_topic(REPLIES);
        assert_eq!(broker.subscriber_count(REPLIES), 0);
        while broker.subscriber_count(REPLIES) == 0 {
            time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!task.is_finished());

        // The slot registered before the gap is still resolvable.
        publish_reply(&broker, "before", b"restored").await;
        assert_eq!(
            waiting.wait(Duration::from_secs(5)).await.unwrap(),
            Bytes::from_static(b"restored")
        );

        let _ = shutdown_tx.send(());
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribe_retries_while_broker_down() {
        let broker = Arc::new(MemoryBroker::new());
        let table = Arc::new(CorrelationTable::new("customer"));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = listener(&broker, &table, &BrokerConfig::default()).await.spawn(shutdown_rx);

        broker.disconnect();
        broker.close_topic(REPLIES);
        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(broker.subscriber_count(REPLIES), 0);
        assert!(!task.is_finished());

        broker.reconnect();
        while broker.subscriber_count(REPLIES) == 0 {
            time::sleep(Duration::from_millis(10)).await;
        }

        let _ = shutdown_tx.send(());
        task.await.unwrap();
    }
}
