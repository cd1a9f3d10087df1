//! Bridge facade.
//!
//! # Data Flow
//! ```text
//! Bridge::call(dependency, capability, payload, deadline)
//!     → selector for `dependency` (UnknownDependency if none)
//!     → Selector::call_with_deadline
//!     → CallResponse { payload, degraded }
//! ```
//!
//! # Responsibilities
//! - Validate configuration and build one selector per dependency
//! - Share one broker and one shutdown coordinator across selectors
//! - Stop every reply listener on shutdown

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::broker::{Broker, MemoryBroker};
use crate::config::validation::{validate_config, ValidationError};
use crate::config::{BridgeConfig, BrokerKind};
use crate::error::{CallError, CallResult};
use crate::lifecycle::Shutdown;
use crate::resilience::{CallResponse, FallbackSupplier};
use crate::selector::Selector;

/// Errors raised while building a bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Invalid configuration: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Invalid(Vec<ValidationError>),

    #[error("Dependency '{dependency}' could not be initialized: {source}")]
    Dependency {
        dependency: String,
        source: CallError,
    },
}

/// Builder for [`Bridge`].
pub struct BridgeBuilder {
    config: BridgeConfig,
    broker: Option<Arc<dyn Broker>>,
    fallbacks: HashMap<String, Arc<dyn FallbackSupplier>>,
    default_fallback: Option<Arc<dyn FallbackSupplier>>,
}

impl BridgeBuilder {
    /// Use a specific broker instead of the one named in configuration.
    pub fn broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Fallback for one dependency.
    pub fn fallback(mut self, dependency: impl Into<String>, supplier: impl FallbackSupplier + 'static) -> Self {
        self.fallbacks.insert(dependency.into(), Arc::new(supplier));
        self
    }

    /// Fallback for dependencies without their own.
    pub fn default_fallback(mut self, supplier: impl FallbackSupplier + 'static) -> Self {
        self.default_fallback = Some(Arc::new(supplier));
        self
    }

    pub async fn build(self) -> Result<Bridge, BridgeError> {
        validate_config(&self.config).map_err(BridgeError::Invalid)?;

        let broker = match self.broker {
            Some(broker) => broker,
            None => match self.config.broker.kind {
                BrokerKind::Memory => Arc::new(MemoryBroker::new()) as Arc<dyn Broker>,
            },
        };

        let shutdown = Shutdown::new();
        let mut selectors = HashMap::with_capacity(self.config.dependencies.len());
        for dependency in &self.config.dependencies {
            let fallback = self
                .fallbacks
                .get(&dependency.name)
                .or(self.default_fallback.as_ref())
                .cloned();

            let selector = Selector::new(dependency, &broker, &self.config.broker, fallback, &shutdown)
                .await
                .map_err(|source| BridgeError::Dependency {
                    dependency: dependency.name.clone(),
                    source,
                })?;
            selectors.insert(dependency.name.clone(), selector);
        }

        tracing::info!(dependencies = selectors.len(), "Bridge ready");

        Ok(Bridge {
            selectors,
            broker,
            shutdown,
        })
    }
}

/// Entry point for business code: one call contract over every configured dependency.
pub struct Bridge {
    selectors: HashMap<String, Selector>,
    broker: Arc<dyn Broker>,
    shutdown: Shutdown,
}

impl Bridge {
    pub fn builder(config: BridgeConfig) -> BridgeBuilder {
        BridgeBuilder {
            config,
            broker: None,
            fallbacks: HashMap::new(),
            default_fallback: None,
        }
    }

    /// Call `capability` on `dependency`.
    ///
    /// `deadline` overrides the dependency's configured per-attempt deadline.
    pub async fn call(
        &self,
        dependency: &str,
        capability: &str,
        payload: Bytes,
        deadline: Option<Duration>,
    ) -> CallResult<CallResponse> {
        let selector = self
            .selectors
            .get(dependency)
            .ok_or_else(|| CallError::UnknownDependency(dependency.to_string()))?;

        let deadline = deadline.unwrap_or_else(|| selector.deadline());
        selector.call_with_deadline(capability, payload, deadline).await
    }

    pub fn selector(&self, dependency: &str) -> Option<&Selector> {
        self.selectors.get(dependency)
    }

    /// The broker shared by brokered dependencies.
    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    /// Subscribe to this bridge's shutdown signal (for tasks sharing its lifetime).
    pub fn shutdown_signal(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Stop every reply listener. Pending brokered calls fail with `Cancelled`.
    pub async fn shutdown(&self) {
        self.shutdown.trigger();
        for selector in self.selectors.values() {
            selector.join_listener().await;
        }
        tracing::info!("Bridge shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CallMode, DependencyConfig};
    use crate::resilience::FallbackContext;

    fn config() -> BridgeConfig {
        let mut customer = DependencyConfig::new("customer", CallMode::Brokered);
        customer.deadline_ms = 50;
        customer.retry.max_attempts = 1;
        BridgeConfig {
            dependencies: vec![customer],
            ..BridgeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_unknown_dependency() {
        let bridge = Bridge::builder(config()).build().await.unwrap();
        let err = bridge
            .call("inventory", "get-item", Bytes::new(), None)
            .await
            .unwrap_err();
        assert_eq!(err, CallError::UnknownDependency("inventory".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = config();
        config.dependencies.push(config.dependencies[0].clone());
        assert!(matches!(
            Bridge::builder(config).build().await,
            Err(BridgeError::Invalid(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_dependency_fallback_wins_over_default() {
        let bridge = Bridge::builder(config())
            .default_fallback(|_: &FallbackContext| Bytes::from_static(b"default"))
            .fallback("customer", |_: &FallbackContext| {
                Bytes::from_static(b"Unknown Customer")
            })
            .build()
            .await
            .unwrap();

        let response = bridge
            .call("customer", "get-customer", Bytes::from_static(b"1"), None)
            .await
            .unwrap();
        assert!(response.is_degraded());
        assert_eq!(response.payload, Bytes::from_static(b"Unknown Customer"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_calls() {
        let bridge = Arc::new(Bridge::builder(config()).build().await.unwrap());

        let caller = {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                bridge
                    .call("customer", "get-customer", Bytes::new(), Some(Duration::from_secs(30)))
                    .await
            })
        };
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        bridge.shutdown().await;
        assert_eq!(caller.await.unwrap(), Err(CallError::Cancelled));
        assert_eq!(bridge.selector("customer").unwrap().pending(), 0);
    }
}
