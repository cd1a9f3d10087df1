//! Configuration validation.
//!
//! Returns every semantic error at once rather than stopping at the first.
//! Pure function: `&BridgeConfig → Result<(), Vec<ValidationError>>`.

use std::collections::HashSet;
use thiserror::Error;
use url::Url;

use crate::config::schema::{BackoffConfig, BridgeConfig, BrokerConfig, CallMode, DependencyConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dependency '{dependency}': {message}")]
pub struct ValidationError {
    pub dependency: String,
    pub message: String,
}

impl ValidationError {
    fn new(dependency: &str, message: impl Into<String>) -> Self {
        Self {
            dependency: dependency.to_string(),
            message: message.into(),
        }
    }
}

/// Validate the whole configuration.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for dep in &config.dependencies {
        if dep.name.trim().is_empty() {
            errors.push(ValidationError::new("<unnamed>", "name must not be empty"));
        } else if !seen.insert(dep.name.as_str()) {
            errors.push(ValidationError::new(&dep.name, "duplicate dependency name"));
        }
        validate_dependency(dep, &mut errors);
    }

    if config.dependencies.iter().any(|dep| dep.mode == CallMode::Brokered) {
        validate_broker(&config.broker, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_broker(broker: &BrokerConfig, errors: &mut Vec<ValidationError>) {
    const SCOPE: &str = "<broker>";

    if broker.reaper_interval_ms == 0 {
        errors.push(ValidationError::new(SCOPE, "reaper_interval_ms must be greater than 0"));
    }
    if broker.resubscribe_base_ms == 0 {
        errors.push(ValidationError::new(SCOPE, "resubscribe_base_ms must be greater than 0"));
    }
    if broker.resubscribe_base_ms > broker.resubscribe_max_ms {
        errors.push(ValidationError::new(
            SCOPE,
            "resubscribe_base_ms must not exceed resubscribe_max_ms",
        ));
    }
}

fn validate_dependency(dep: &DependencyConfig, errors: &mut Vec<ValidationError>) {
    let name = dep.name.as_str();

    if dep.deadline_ms == 0 {
        errors.push(ValidationError::new(name, "deadline_ms must be greater than 0"));
    }

    match dep.mode {
        CallMode::Direct => {
            if let Err(e) = Url::parse(&dep.direct.base_url) {
                errors.push(ValidationError::new(
                    name,
                    format!("direct.base_url '{}' is not a valid URL: {}", dep.direct.base_url, e),
                ));
            }
        }
        CallMode::Brokered => {
            if dep.request_topic() == dep.reply_topic() {
                errors.push(ValidationError::new(name, "request and reply topics must differ"));
            }
        }
    }

    let cb = &dep.circuit_breaker;
    if !(cb.failure_ratio_threshold > 0.0 && cb.failure_ratio_threshold <= 1.0) {
        errors.push(ValidationError::new(
            name,
            format!("circuit_breaker.failure_ratio_threshold {} must be in (0, 1]", cb.failure_ratio_threshold),
        ));
    }
    if cb.window_size == 0 {
        errors.push(ValidationError::new(name, "circuit_breaker.window_size must be greater than 0"));
    }
    if cb.minimum_calls > cb.window_size {
        errors.push(ValidationError::new(
            name,
            "circuit_breaker.minimum_calls must not exceed window_size",
        ));
    }
    if cb.half_open_max_calls == 0 {
        errors.push(ValidationError::new(
            name,
            "circuit_breaker.half_open_max_calls must be greater than 0",
        ));
    }

    if dep.retry.max_attempts == 0 {
        errors.push(ValidationError::new(name, "retry.max_attempts must be at least 1"));
    }
    if let BackoffConfig::Exponential { base_delay_ms, max_delay_ms } = dep.retry.backoff {
        if base_delay_ms > max_delay_ms {
            errors.push(ValidationError::new(
                name,
                "retry.backoff.base_delay_ms must not exceed max_delay_ms",
            ));
        }
    }

    if dep.bulkhead.max_concurrent == 0 {
        errors.push(ValidationError::new(name, "bulkhead.max_concurrent must be greater than 0"));
    }
}
