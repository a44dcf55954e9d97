//! HTTP surface tests driven through `tower::ServiceExt::oneshot`.

mod common;

use adaptive_ai_service::drivers::MockDriver;
use adaptive_ai_service::{server, ProviderKind};
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use common::{fast_config, service};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app(driver: Arc<MockDriver>) -> Router {
    server::router(Arc::new(service(fast_config(), &[driver])))
}

fn post_json(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_generate_returns_response_and_metadata() {
    let app = app(Arc::new(MockDriver::new(ProviderKind::OpenAi).with_reply("Greek yogurt")));
    let body = json!({
        "userId": "user-1",
        "messages": [{"role": "user", "content": "What are some healthy snacks?"}],
        "priority": "critical"
    });

    let response = app.oneshot(post_json("/generate", body.to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = read_json(response).await;
    assert_eq!(json["response"], "Greek yogurt");
    let meta = &json["metadata"];
    assert_eq!(meta["complexity"], "low");
    assert_eq!(meta["modelUsed"], "gpt-3.5-turbo");
    assert_eq!(meta["provider"], "openai");
    assert_eq!(meta["cached"], false);
    assert_eq!(meta["queued"], false);
    assert!(meta["processingTime"].is_u64());
    assert!(meta.get("cacheType").is_none());
}

#[tokio::test]
async fn test_generate_default_priority_is_queued() {
    let app = app(Arc::new(MockDriver::new(ProviderKind::OpenAi)));
    let body = json!({
        "userId": "user-1",
        "messages": [{"role": "user", "content": "Plan a light dinner"}]
    });

    let response = app.oneshot(post_json("/generate", body.to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["metadata"]["queued"], true);
}

#[tokio::test]
async fn test_malformed_json_is_400() {
    let app = app(Arc::new(MockDriver::new(ProviderKind::OpenAi)));
    let response = app
        .oneshot(post_json("/generate", "{\"userId\": ".to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["error"], "validation_error");
}

#[tokio::test]
async fn test_missing_user_id_is_400() {
    let app = app(Arc::new(MockDriver::new(ProviderKind::OpenAi)));
    let body = json!({"messages": [{"role": "user", "content": "hi"}]});
    let response = app.oneshot(post_json("/generate", body.to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = read_json(response).await;
    assert_eq!(json["error"], "validation_error");
    assert!(json["message"].as_str().unwrap().contains("userId"));
}

#[tokio::test]
async fn test_empty_messages_is_400() {
    let app = app(Arc::new(MockDriver::new(ProviderKind::OpenAi)));
    let body = json!({"userId": "u1", "messages": []});
    let response = app.oneshot(post_json("/generate", body.to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_all_providers_down_is_503_with_retry_after() {
    let app = app(Arc::new(MockDriver::new(ProviderKind::OpenAi).always_failing("refused")));
    let body = json!({
        "userId": "u1",
        "messages": [{"role": "user", "content": "hello"}],
        "priority": "critical"
    });
    let response = app.oneshot(post_json("/generate", body.to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()[header::RETRY_AFTER], "30");
    assert_eq!(read_json(response).await["error"], "all_providers_unavailable");
}

#[tokio::test]
async fn test_health_lists_services() {
    let app = app(Arc::new(MockDriver::new(ProviderKind::OpenAi)));
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = read_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["services"]["openai"], "available");
    assert_eq!(json["services"]["gemini"], "not_configured");
}

#[tokio::test]
async fn test_health_without_providers_is_degraded() {
    let app = server::router(Arc::new(service(fast_config(), &[])));
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(read_json(response).await["status"], "degraded");
}

#[tokio::test]
async fn test_stats_shape() {
    let app = app(Arc::new(MockDriver::new(ProviderKind::OpenAi)));
    let response = app.oneshot(get("/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = read_json(response).await;
    for tier in ["critical", "high", "normal", "low"] {
        assert_eq!(json["queues"][tier], 0, "{tier}");
    }
    for key in ["hits", "similarityHits", "misses", "size"] {
        assert!(json["cache"][key].is_number(), "{key}");
    }
    assert_eq!(json["processingBatch"], false);
    assert_eq!(json["inFlight"], 0);
    assert_eq!(json["providers"]["openai"], 0);
    assert_eq!(json["fallbacks"], 0);
}
