//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the service bridge.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Broker used by brokered dependencies.
    pub broker: BrokerConfig,

    /// Callee-side settings used by `service-bridge serve`.
    pub server: ServerConfig,

    /// Remote dependencies this process calls.
    pub dependencies: Vec<DependencyConfig>,
}

impl BridgeConfig {
    /// Look up a dependency by name.
    pub fn dependency(&self, name: &str) -> Option<&DependencyConfig> {
        self.dependencies.iter().find(|d| d.name == name)
    }
}

/// How a dependency is reached. Fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CallMode {
    /// Synchronous remote call over HTTP.
    #[default]
    Direct,
    /// Publish a request envelope and wait for a correlated reply.
    Brokered,
}

impl std::fmt::Display for CallMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallMode::Direct => write!(f, "direct"),
            CallMode::Brokered => write!(f, "brokered"),
        }
    }
}

/// Per-dependency configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DependencyConfig {
    /// Unique dependency identifier (e.g. "customer").
    pub name: String,

    /// Direct or brokered.
    #[serde(default)]
    pub mode: CallMode,

    /// Per-attempt deadline in milliseconds.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,

    /// Direct-mode endpoint.
    #[serde(default)]
    pub direct: DirectConfig,

    /// Brokered-mode topics. Empty topics default from the dependency name.
    #[serde(default)]
    pub brokered: BrokeredConfig,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub bulkhead: BulkheadConfig,
}

fn default_deadline_ms() -> u64 {
    30_000
}

impl DependencyConfig {
    /// A dependency with every policy at its default.
    pub fn new(name: impl Into<String>, mode: CallMode) -> Self {
        Self {
            name: name.into(),
            mode,
            deadline_ms: default_deadline_ms(),
            direct: DirectConfig::default(),
            brokered: BrokeredConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            bulkhead: BulkheadConfig::default(),
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    /// Topic request envelopes are published to.
    pub fn request_topic(&self) -> String {
        self.brokered
            .request_topic
            .clone()
            .unwrap_or_else(|| format!("{}-request-topic", self.name))
    }

    /// Topic replies are consumed from.
    pub fn reply_topic(&self) -> String {
        self.brokered
            .reply_topic
            .clone()
            .unwrap_or_else(|| format!("{}-response-topic", self.name))
    }
}

/// Direct-mode endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DirectConfig {
    /// Base URL of the callee (capabilities live under `/capabilities/{name}`).
    pub base_url: String,

    /// Connection establishment timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for DirectConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            connect_timeout_ms: 2_000,
        }
    }
}

/// Brokered-mode topic configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BrokeredConfig {
    pub request_topic: Option<String>,
    pub reply_topic: Option<String>,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failure ratio (0.0, 1.0] over the window that opens the breaker.
    pub failure_ratio_threshold: f64,

    /// Number of most recent outcomes kept in the rolling window.
    pub window_size: usize,

    /// Outcomes required in the window before the ratio is evaluated.
    pub minimum_calls: usize,

    /// Time the breaker stays open before allowing a trial call.
    pub cooldown_ms: u64,

    /// Trial calls admitted while half-open.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_ratio_threshold: 0.5,
            window_size: 10,
            minimum_calls: 5,
            cooldown_ms: 10_000,
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Delay schedule between attempts.
    pub backoff: BackoffConfig,

    /// Opt in to retrying when the broker refuses a publish.
    pub retry_publish_failures: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffConfig::default(),
            retry_publish_failures: false,
        }
    }
}

/// Backoff schedule between retry attempts.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackoffConfig {
    /// Same delay before every retry.
    Fixed { delay_ms: u64 },
    /// Doubling delay with jitter, capped at `max_delay_ms`.
    Exponential { base_delay_ms: u64, max_delay_ms: u64 },
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig::Exponential {
            base_delay_ms: 100,
            max_delay_ms: 2_000,
        }
    }
}

/// Bulkhead configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BulkheadConfig {
    /// Maximum in-flight attempts against the dependency.
    pub max_concurrent: usize,

    /// How long an attempt may wait for a permit before failing `Saturated`.
    pub acquire_timeout_ms: u64,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 25,
            acquire_timeout_ms: 10,
        }
    }
}

/// Broker backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    /// In-process broadcast broker.
    #[default]
    Memory,
}

/// Broker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub kind: BrokerKind,

    /// How often reply listeners sweep expired pending slots.
    pub reaper_interval_ms: u64,

    /// Extra time a slot may outlive its deadline before it is reaped.
    pub reaper_slack_ms: u64,

    /// First delay before re-subscribing a reply topic that ended.
    pub resubscribe_base_ms: u64,

    /// Cap on the re-subscribe delay.
    pub resubscribe_max_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            kind: BrokerKind::Memory,
            reaper_interval_ms: 1_000,
            reaper_slack_ms: 1_000,
            resubscribe_base_ms: 100,
            resubscribe_max_ms: 5_000,
        }
    }
}

impl BrokerConfig {
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }

    pub fn reaper_slack(&self) -> Duration {
        Duration::from_millis(self.reaper_slack_ms)
    }
}

/// Callee-side HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8081").
    pub bind_address: String,

    /// Request timeout for capability handlers in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8081".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
