//! Strategy selector.
//!
//! # Responsibilities
//! - Build the strategy for one dependency from configuration, once
//! - Own the dependency's correlation table, reply listener, breaker and bulkhead
//! - Expose the single call contract, substituting the fallback on failure
//!
//! # Design Decisions
//! - Mode is fixed at construction; there is no runtime switching
//! - A brokered selector subscribes to its reply topic before the first call,
//!   so no reply can be published before someone is listening

use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::broker::Broker;
use crate::config::{BrokerConfig, CallMode, DependencyConfig};
use crate::correlation::CorrelationTable;
use crate::error::{CallError, CallResult};
use crate::lifecycle::Shutdown;
use crate::listener::ReplyListener;
use crate::observability::metrics;
use crate::resilience::{
    CallResponse, CircuitState, FallbackContext, FallbackSupplier, ResiliencePipeline,
};
use crate::transport::{BrokeredStrategy, DirectStrategy, Strategy};

/// The resilience-wrapped call contract for one dependency.
pub struct Selector {
    dependency: String,
    deadline: Duration,
    strategy: Strategy,
    pipeline: ResiliencePipeline,
    fallback: Option<Arc<dyn FallbackSupplier>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selector")
            .field("dependency", &self.dependency)
            .field("mode", &self.strategy.mode())
            .field("deadline", &self.deadline)
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl Selector {
    /// Build the selector for `config`.
    ///
    /// `broker` is only used in brokered mode. The reply listener subscribes
    /// to `shutdown` and stops when it fires.
    pub async fn new(
        config: &DependencyConfig,
        broker: &Arc<dyn Broker>,
        broker_config: &BrokerConfig,
        fallback: Option<Arc<dyn FallbackSupplier>>,
        shutdown: &Shutdown,
    ) -> CallResult<Self> {
        let (strategy, listener) = match config.mode {
            CallMode::Direct => (Strategy::Direct(DirectStrategy::new(&config.name, &config.direct)?), None),
            CallMode::Brokered => {
                let table = Arc::new(CorrelationTable::new(config.name.clone()));
                let reply_topic = config.reply_topic();
                let subscription = broker.subscribe(&reply_topic).await.map_err(|e| {
                    CallError::Unreachable(format!("subscribe to '{}' failed: {}", reply_topic, e))
                })?;

                let listener = ReplyListener::new(
                    table.clone(),
                    broker.clone(),
                    reply_topic,
                    subscription,
                    broker_config,
                )
                .spawn(shutdown.subscribe());

                let strategy = BrokeredStrategy::new(broker.clone(), table, config.request_topic());
                (Strategy::Brokered(strategy), Some(listener))
            }
        };

        tracing::info!(
            dependency = %config.name,
            mode = %config.mode,
            deadline_ms = config.deadline_ms,
            max_attempts = config.retry.max_attempts,
            max_concurrent = config.bulkhead.max_concurrent,
            "Dependency ready"
        );

        Ok(Self {
            dependency: config.name.clone(),
            deadline: config.deadline(),
            strategy,
            pipeline: ResiliencePipeline::new(config),
            fallback,
            listener: Mutex::new(listener),
        })
    }

    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    pub fn mode(&self) -> CallMode {
        self.strategy.mode()
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.pipeline.breaker().state()
    }

    pub fn available_permits(&self) -> usize {
        self.pipeline.bulkhead().available()
    }

    /// Open correlation slots (always 0 for direct dependencies).
    pub fn pending(&self) -> usize {
        match &self.strategy {
            Strategy::Brokered(brokered) => brokered.table().len(),
            Strategy::Direct(_) => 0,
        }
    }

    /// Call with the configured deadline.
    pub async fn call(&self, capability: &str, payload: Bytes) -> CallResult<CallResponse> {
        self.call_with_deadline(capability, payload, self.deadline).await
    }

    /// Call with an explicit per-attempt deadline.
    ///
    /// Returns `Ok` with a degraded response when a fallback is configured,
    /// otherwise the final error.
    pub async fn call_with_deadline(
        &self,
        capability: &str,
        payload: Bytes,
        deadline: Duration,
    ) -> CallResult<CallResponse> {
        let start = Instant::now();
        let mode = self.strategy.mode().to_string();

        let outcome = self
            .pipeline
            .execute(|attempt| {
                tracing::debug!(
                    dependency = %self.dependency,
                    capability = %capability,
                    attempt,
                    "Starting attempt"
                );
                self.strategy.call(capability, payload.clone(), deadline)
            })
            .await;

        let elapsed = start.elapsed();
        let error = match outcome.result {
            Ok(reply) => {
                metrics::record_call(&self.dependency, &mode, "success", elapsed);
                return Ok(CallResponse::genuine(reply));
            }
            Err(error) => error,
        };
        metrics::record_call(&self.dependency, &mode, error.kind(), elapsed);

        let Some(fallback) = &self.fallback else {
            return Err(error);
        };

        let context = FallbackContext {
            dependency: self.dependency.clone(),
            capability: capability.to_string(),
            error: error.clone(),
            attempts: outcome.attempts,
        };
        let degraded = fallback.fallback(&context);
        tracing::warn!(
            dependency = %self.dependency,
            capability = %capability,
            error = %error,
            attempts = outcome.attempts,
            "Serving fallback response"
        );
        metrics::record_fallback(&self.dependency, error.kind());

        Ok(CallResponse::degraded(degraded, error, outcome.attempts))
    }

    /// Wait for the reply listener to finish after shutdown was triggered.
    pub async fn join_listener(&self) {
        let handle = self.listener.lock().expect("selector listener mutex poisoned").take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(dependency = %self.dependency, error = %e, "Reply listener task failed");
            }
        }
    }
}

impl Drop for Selector {
    fn drop(&mut self) {
        if let Ok(mut listener) = self.listener.lock() {
            if let Some(handle) = listener.take() {
                handle.abort();
            }
        }
    }
}
