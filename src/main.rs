//! `service-bridge` command line.
//!
//! ```text
//! service-bridge validate --config bridge.toml
//! service-bridge serve    --config bridge.toml [--bind 0.0.0.0:8081]
//! service-bridge call     --config bridge.toml customer get-customer '{"id":1}' [--deadline-ms 2000]
//! ```
//!
//! The in-memory broker only reaches its own process, so `serve` answers over
//! HTTP alone. `call` attaches an echo responder to every brokered dependency
//! so the brokered path can be exercised end to end.

use bytes::Bytes;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use service_bridge::broker::Broker;
use service_bridge::config::{load_config, BridgeConfig, BrokerKind, CallMode, ObservabilityConfig};
use service_bridge::lifecycle::{signals, Shutdown};
use service_bridge::observability::{logging, metrics};
use service_bridge::service::{http, responder::Responder, CapabilityRegistry};
use service_bridge::{Bridge, StaticFallback};

#[derive(Parser)]
#[command(name = "service-bridge")]
#[command(about = "Direct or brokered calls between services", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Serve the built-in capabilities over HTTP
    Serve {
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override `server.bind_address`
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Perform one call and print the result as JSON
    Call {
        #[arg(short, long)]
        config: PathBuf,

        dependency: String,
        capability: String,
        payload: String,

        /// Per-attempt deadline; defaults to the dependency's `deadline_ms`
        #[arg(long)]
        deadline_ms: Option<u64>,

        /// Payload returned (marked degraded) when the call fails
        #[arg(long)]
        fallback: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => validate(&config),
        Commands::Serve { config, bind } => {
            let config = match config {
                Some(path) => load_config(&path)?,
                None => BridgeConfig::default(),
            };
            serve(config, bind).await
        }
        Commands::Call {
            config,
            dependency,
            capability,
            payload,
            deadline_ms,
            fallback,
        } => {
            let config = load_config(&config)?;
            call(config, &dependency, &capability, payload, deadline_ms, fallback).await
        }
    }
}

fn validate(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    println!("{}: ok", path.display());
    for dependency in &config.dependencies {
        match dependency.mode {
            CallMode::Direct => println!(
                "  {} (direct) → {} deadline={}ms attempts={}",
                dependency.name, dependency.direct.base_url, dependency.deadline_ms, dependency.retry.max_attempts
            ),
            CallMode::Brokered => println!(
                "  {} (brokered) → {} / {} deadline={}ms attempts={}",
                dependency.name,
                dependency.request_topic(),
                dependency.reply_topic(),
                dependency.deadline_ms,
                dependency.retry.max_attempts
            ),
        }
    }
    Ok(())
}

fn init_observability(config: &ObservabilityConfig) {
    if let Err(e) = logging::init_logging(config) {
        eprintln!("failed to initialize logging: {}", e);
    }

    if config.metrics_enabled {
        match config.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }
}

/// Attach an echo responder to every brokered dependency.
async fn attach_echo_responders(
    config: &BridgeConfig,
    broker: &Arc<dyn Broker>,
    registry: &Arc<CapabilityRegistry>,
    shutdown: &Shutdown,
) -> Result<(), Box<dyn std::error::Error>> {
    if config.broker.kind != BrokerKind::Memory {
        return Ok(());
    }
    for dependency in config.dependencies.iter().filter(|d| d.mode == CallMode::Brokered) {
        Responder::new(
            broker.clone(),
            registry.clone(),
            dependency.request_topic(),
            dependency.reply_topic(),
        )
        .spawn(shutdown.subscribe())
        .await?;
    }
    Ok(())
}

async fn serve(config: BridgeConfig, bind: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    init_observability(&config.observability);
    tracing::info!("service-bridge v{} starting", env!("CARGO_PKG_VERSION"));

    let shutdown = Arc::new(Shutdown::new());
    let registry = Arc::new(CapabilityRegistry::with_echo());

    let bind_address = bind.unwrap_or_else(|| config.server.bind_address.clone());
    let listener = TcpListener::bind(&bind_address).await?;
    let router = http::router(
        registry,
        Duration::from_secs(config.server.request_timeout_secs),
    );

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        signals::shutdown_on_signal(&signal_shutdown).await;
    });

    http::serve(listener, router, shutdown.subscribe()).await?;
    shutdown.trigger();

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn call(
    config: BridgeConfig,
    dependency: &str,
    capability: &str,
    payload: String,
    deadline_ms: Option<u64>,
    fallback: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    init_observability(&config.observability);

    let mut builder = Bridge::builder(config.clone());
    if let Some(fallback) = fallback {
        builder = builder.default_fallback(StaticFallback(Bytes::from(fallback)));
    }
    let bridge = builder.build().await?;

    let registry = Arc::new(CapabilityRegistry::with_echo());
    let responders = Shutdown::new();
    attach_echo_responders(&config, bridge.broker(), &registry, &responders).await?;

    let result = bridge
        .call(
            dependency,
            capability,
            Bytes::from(payload),
            deadline_ms.map(Duration::from_millis),
        )
        .await;

    responders.trigger();
    bridge.shutdown().await;

    let response = result?;
    let output = serde_json::json!({
        "dependency": dependency,
        "capability": capability,
        "payload": String::from_utf8_lossy(&response.payload),
        "degraded": response.is_degraded(),
        "reason": response.degraded.as_ref().map(|d| d.error.to_string()),
        "attempts": response.degraded.as_ref().map(|d| d.attempts),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_bridge::config::DependencyConfig;

    #[tokio::test]
    async fn test_echo_responders_cover_brokered_dependencies_only() {
        let mut config = BridgeConfig::default();
        let mut customer = DependencyConfig::new("customer", CallMode::Brokered);
        customer.deadline_ms = 2_000;
        config.dependencies.push(customer);
        config.dependencies.push(DependencyConfig::new("eligibility", CallMode::Direct));

        let memory = Arc::new(service_bridge::broker::MemoryBroker::new());
        let bridge = Bridge::builder(config.clone())
            .broker(memory.clone())
            .build()
            .await
            .unwrap();
        let responders = Shutdown::new();
        let registry = Arc::new(CapabilityRegistry::with_echo());
        attach_echo_responders(&config, bridge.broker(), &registry, &responders)
            .await
            .unwrap();

        assert_eq!(memory.subscriber_count("customer-request-topic"), 1);
        assert_eq!(memory.subscriber_count("eligibility-request-topic"), 0);

        let response = bridge
            .call("customer", "echo", Bytes::from_static(b"ping"), None)
            .await
            .unwrap();
        assert_eq!(response.payload, Bytes::from_static(b"ping"));

        responders.trigger();
        bridge.shutdown().await;
    }
}
