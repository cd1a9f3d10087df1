//! HTTP surface for direct-mode callers.
//!
//! # Responsibilities
//! - `POST /capabilities/{capability}`: raw body in, raw body out
//! - `GET /health`: liveness plus the served capability list
//! - Map handler failures to statuses direct callers classify
//!   (404/422 permanent, 500/503 transient)

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use super::{CapabilityRegistry, HandlerError};

/// Build the router serving `registry`.
#[allow(deprecated)]
pub fn router(registry: Arc<CapabilityRegistry>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/capabilities/{capability}", post(invoke_handler))
        .route("/health", get(health_handler))
        .with_state(registry)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout)),
        )
}

/// Serve until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Capability server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("Capability server stopped");
    Ok(())
}

async fn invoke_handler(
    State(registry): State<Arc<CapabilityRegistry>>,
    Path(capability): Path<String>,
    body: Bytes,
) -> Response {
    tracing::debug!(capability = %capability, bytes = body.len(), "Capability request");

    match registry.dispatch(&capability, body).await {
        Ok(reply) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            reply,
        )
            .into_response(),
        Err(e) => {
            let status = status_for(&e);
            tracing::warn!(capability = %capability, status = %status, error = %e, "Capability failed");
            (status, e.to_string()).into_response()
        }
    }
}

async fn health_handler(State(registry): State<Arc<CapabilityRegistry>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "capabilities": registry.capabilities(),
    }))
}

fn status_for(error: &HandlerError) -> StatusCode {
    match error {
        HandlerError::UnknownCapability(_) | HandlerError::NotFound(_) => StatusCode::NOT_FOUND,
        HandlerError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
        HandlerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        HandlerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirectConfig;
    use crate::error::CallError;
    use crate::transport::DirectStrategy;

    async fn spawn_server() -> (String, broadcast::Sender<()>) {
        let mut registry = CapabilityRegistry::with_echo();
        registry.register_fn("flaky", |_| Err(HandlerError::Unavailable("warming up".into())));
        registry.register_fn("strict", |_| Err(HandlerError::InvalidRequest("bad id".into())));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = broadcast::channel(1);
        let app = router(Arc::new(registry), Duration::from_secs(5));
        tokio::spawn(serve(listener, app, rx));
        (base_url, tx)
    }

    #[tokio::test]
    async fn test_direct_strategy_against_router() {
        let (base_url, _shutdown) = spawn_server().await;
        let strategy = DirectStrategy::new(
            "callee",
            &DirectConfig {
                base_url,
                connect_timeout_ms: 1_000,
            },
        )
        .unwrap();
        let deadline = Duration::from_secs(5);

        let payload = Bytes::from(vec![0u8, 1, 2, 254, 255]);
        assert_eq!(strategy.call("echo", payload.clone(), deadline).await.unwrap(), payload);

        let transient = strategy.call("flaky", Bytes::new(), deadline).await.unwrap_err();
        assert!(matches!(
            transient,
            CallError::RemoteError { status: Some(503), transient: true, .. }
        ));

        let permanent = strategy.call("strict", Bytes::new(), deadline).await.unwrap_err();
        assert!(matches!(
            permanent,
            CallError::RemoteError { status: Some(422), transient: false, .. }
        ));

        let missing = strategy.call("nope", Bytes::new(), deadline).await.unwrap_err();
        assert!(matches!(missing, CallError::RemoteError { status: Some(404), .. }));
    }

    #[tokio::test]
    async fn test_health_lists_capabilities() {
        let (base_url, _shutdown) = spawn_server().await;
        let body: serde_json::Value = reqwest::get(format!("{}/health", base_url))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["capabilities"], serde_json::json!(["echo", "flaky", "strict"]));
    }
}
