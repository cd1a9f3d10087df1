//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BridgeConfig (validated, immutable)
//!     → one Selector per dependency, built once at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a dependency's call mode never changes at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::BackoffConfig;
pub use schema::BridgeConfig;
pub use schema::BrokerConfig;
pub use schema::BrokeredConfig;
pub use schema::BrokerKind;
pub use schema::BulkheadConfig;
pub use schema::CallMode;
pub use schema::CircuitBreakerConfig;
pub use schema::DependencyConfig;
pub use schema::DirectConfig;
pub use schema::ObservabilityConfig;
pub use schema::RetryConfig;
pub use schema::ServerConfig;
pub use validation::{validate_config, ValidationError};
