//! Request handlers and the JSON error envelope.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::facade::{AdaptiveAiService, HealthReport, ServiceStats};
use crate::types::{CacheType, ComplexityTier, CompletionRequest, CompletionResponse, ProviderKind};
use crate::{Error, ErrorContext};

/// `{error, message}` envelope with the status and `Retry-After` taken from
/// the error.
#[derive(Debug)]
pub struct ApiError(pub Error);

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status =
            StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(code = code.name(), error = %self.0, "request failed");
        }
        let body = ErrorBody {
            error: code.name(),
            message: self.0.to_string(),
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = self.0.retry_after_secs() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub complexity: ComplexityTier,
    /// Milliseconds.
    pub processing_time: u64,
    pub model_used: String,
    pub provider: ProviderKind,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_type: Option<CacheType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    pub queued: bool,
}

#[derive(Debug, Serialize)]
pub struct GenerateReply {
    pub response: String,
    pub metadata: ResponseMetadata,
}

impl From<CompletionResponse> for GenerateReply {
    fn from(r: CompletionResponse) -> Self {
        Self {
            response: r.content,
            metadata: ResponseMetadata {
                complexity: r.complexity,
                processing_time: r.processing_time_ms,
                model_used: r.model,
                provider: r.provider,
                cached: r.cached,
                cache_type: r.cache_type,
                similarity: r.similarity,
                queued: r.queued,
            },
        }
    }
}

/// `POST /generate`. Queued requests hold the connection; if the client
/// disconnects, the dropped handle cancels the queued item.
pub async fn generate(
    State(service): State<Arc<AdaptiveAiService>>,
    payload: Result<Json<CompletionRequest>, JsonRejection>,
) -> Result<Json<GenerateReply>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        Error::validation_with_context(
            rejection.body_text(),
            ErrorContext::new().with_source("request_body"),
        )
    })?;
    let user = request.user_id.clone();
    let response = service
        .generate_completion(request)
        .await?
        .into_response()
        .await?;
    info!(
        user = %user,
        provider = %response.provider,
        cached = response.cached,
        queued = response.queued,
        elapsed_ms = response.processing_time_ms,
        "generate completed"
    );
    Ok(Json(GenerateReply::from(response)))
}

/// `GET /health`: 200 when healthy, 503 when degraded.
pub async fn health(State(service): State<Arc<AdaptiveAiService>>) -> (StatusCode, Json<HealthReport>) {
    let report = service.health();
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

pub async fn stats(State(service): State<Arc<AdaptiveAiService>>) -> Json<ServiceStats> {
    Json(service.stats())
}
