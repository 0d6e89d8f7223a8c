use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use toolhost_mcp::Plugin;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// State shared by the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub service: String,
    pub version: String,
    pub plugin: Arc<dyn Plugin>,
}

/// Serve the HTTP endpoints until `shutdown` is cancelled
pub async fn serve(listener: TcpListener, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let addr = listener.local_addr().context("Listener has no local address")?;
    tracing::info!("HTTP server listening on {}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed")?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .fallback(not_found)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Liveness: answers as long as the process serves HTTP
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": state.service,
        "version": state.version,
    }))
}

/// Readiness: 200 only while the plugin's background task runs
async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.plugin.is_running().await {
        (StatusCode::OK, Json(serde_json::json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "not_ready" })),
        )
    }
}

async fn not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::with_details("Not found", uri.path())),
    )
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use toolhost_mcp::ExamplePlugin;
    use tower::ServiceExt;

    fn state(plugin: Arc<ExamplePlugin>) -> AppState {
        AppState {
            service: "toolhost".to_string(),
            version: "0.1.0".to_string(),
            plugin,
        }
    }

    fn plugin() -> Arc<ExamplePlugin> {
        Arc::new(ExamplePlugin::default().with_env_lookup(|_| None))
    }

    async fn get_json(router: Router, path: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(create_router(state(plugin())), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "toolhost");
        assert_eq!(body["version"], "0.1.0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_follows_plugin_state() {
        let plugin = plugin();
        let router = create_router(state(plugin.clone()));

        let (status, body) = get_json(router.clone(), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "not_ready");

        plugin.setup().await.unwrap();
        plugin.start().await.unwrap();
        let (status, body) = get_json(router.clone(), "/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");

        plugin.stop().await;
        let (status, _) = get_json(router, "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (status, body) = get_json(create_router(state(plugin())), "/nope").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not found");
        assert_eq!(body["details"], "/nope");
    }
}
