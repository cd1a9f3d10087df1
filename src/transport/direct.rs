//! Direct (synchronous HTTP) transport.
//!
//! # Responsibilities
//! - POST the raw payload to `{base_url}/capabilities/{capability}`
//! - Enforce the per-attempt deadline
//! - Map connection failures, 4xx/5xx statuses and timeouts to typed errors

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::time::Duration;
use url::Url;

use crate::config::DirectConfig;
use crate::error::{CallError, CallResult};
use crate::resilience::timeouts::with_deadline;

/// Synchronous remote invocation over HTTP.
#[derive(Debug, Clone)]
pub struct DirectStrategy {
    dependency: String,
    client: reqwest::Client,
    base_url: Url,
}

impl DirectStrategy {
    /// Create a direct strategy from configuration.
    pub fn new(dependency: &str, config: &DirectConfig) -> CallResult<Self> {
        let mut base_url = Url::parse(&config.base_url).map_err(|e| {
            CallError::Misconfigured(format!("invalid base_url '{}': {}", config.base_url, e))
        })?;
        // Url::join replaces the last segment unless the base ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| CallError::Misconfigured(format!("failed to build HTTP client: {}", e)))?;

        tracing::debug!(dependency = %dependency, base_url = %base_url, "Direct strategy ready");

        Ok(Self {
            dependency: dependency.to_string(),
            client,
            base_url,
        })
    }

    /// The URL a capability is served at.
    pub fn endpoint(&self, capability: &str) -> CallResult<Url> {
        self.base_url
            .join(&format!("capabilities/{}", capability))
            .map_err(|e| CallError::Misconfigured(format!("invalid capability '{}': {}", capability, e)))
    }

    /// Perform one direct call.
    pub async fn call(&self, capability: &str, payload: Bytes, deadline: Duration) -> CallResult<Bytes> {
        let url = self.endpoint(capability)?;
        tracing::debug!(
            dependency = %self.dependency,
            capability = %capability,
            url = %url,
            "Direct call"
        );

        with_deadline(deadline, async {
            let response = self
                .client
                .post(url)
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(payload)
                .send()
                .await
                .map_err(|e| classify_transport_error(e, deadline))?;

            let status = response.status();
            let body = response
                .bytes()
                .await
                .map_err(|e| classify_transport_error(e, deadline))?;

            if status.is_success() {
                return Ok(body);
            }

            let message = String::from_utf8_lossy(&body).into_owned();
            tracing::warn!(
                dependency = %self.dependency,
                capability = %capability,
                status = %status,
                "Direct call returned error status"
            );
            Err(CallError::RemoteError {
                status: Some(status.as_u16()),
                message,
                transient: is_transient_status(status),
            })
        })
        .await
    }
}

/// 5xx and 429 are worth retrying; other 4xx mean the request itself is wrong.
pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn classify_transport_error(e: reqwest::Error, deadline: Duration) -> CallError {
    if e.is_timeout() {
        CallError::Timeout(deadline)
    } else {
        CallError::Unreachable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> DirectConfig {
        DirectConfig {
            base_url: base_url.to_string(),
            connect_timeout_ms: 500,
        }
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let strategy = DirectStrategy::new("customer", &config("http://localhost:8081/api")).unwrap();
        assert_eq!(
            strategy.endpoint("get-customer").unwrap().as_str(),
            "http://localhost:8081/api/capabilities/get-customer"
        );

        let strategy = DirectStrategy::new("customer", &config("http://localhost:8081")).unwrap();
        assert_eq!(
            strategy.endpoint("get-customer").unwrap().as_str(),
            "http://localhost:8081/capabilities/get-customer"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = DirectStrategy::new("customer", &config("::nope::")).unwrap_err();
        assert!(matches!(err, CallError::Misconfigured(_)));
    }

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::UNPROCESSABLE_ENTITY));
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        // Port 1 on localhost is never listening in test environments.
        let strategy = DirectStrategy::new("customer", &config("http://127.0.0.1:1")).unwrap();
        let err = strategy
            .call("get-customer", Bytes::from_static(b"{}"), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Unreachable(_)), "got {:?}", err);
    }
}
