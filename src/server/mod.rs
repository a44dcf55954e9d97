//! HTTP 接口模块：基于 axum 暴露 /generate、/health 与 /stats。
//!
//! # HTTP Surface
//!
//! | Route | Handler | Body |
//! |-------|---------|------|
//! | `POST /generate` | [`handlers::generate`] | `{response, metadata}` |
//! | `GET /health` | [`handlers::health`] | [`HealthReport`](crate::facade::HealthReport) |
//! | `GET /stats` | [`handlers::stats`] | [`ServiceStats`](crate::facade::ServiceStats) |
//!
//! Failures use the envelope `{"error": "<code>", "message": "..."}`; 503
//! responses carry `Retry-After`.

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::facade::AdaptiveAiService;
use crate::{Error, ErrorContext, Result};

pub use handlers::ApiError;

pub fn router(service: Arc<AdaptiveAiService>) -> Router {
    Router::new()
        .route("/generate", post(handlers::generate))
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(service)
}

/// Bind `addr` and serve until `stop` is cancelled.
pub async fn serve(
    service: Arc<AdaptiveAiService>,
    addr: SocketAddr,
    stop: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        Error::runtime_with_context(
            format!("cannot bind {}: {}", addr, e),
            ErrorContext::new().with_source("http_server"),
        )
    })?;
    info!(%addr, "HTTP server listening");
    axum::serve(listener, router(service))
        .with_graceful_shutdown(stop.cancelled_owned())
        .await
        .map_err(|e| {
            Error::runtime_with_context(
                format!("server error: {}", e),
                ErrorContext::new().with_source("http_server"),
            )
        })
}
