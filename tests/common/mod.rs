//! Shared fixtures for integration tests.
#![allow(dead_code)]

use adaptive_ai_service::drivers::MockDriver;
use adaptive_ai_service::{AdaptiveAiService, CompletionRequest, Message, ServiceConfig};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Config with a long flush tick, so queued items only move when a test
/// drains them (or on the worker's first, immediate tick).
pub fn quiet_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.batching.flush_interval_ms = 60_000;
    config.batching.batch_size = 10;
    config
}

pub fn fast_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.batching.flush_interval_ms = 20;
    config
}

pub fn service(config: ServiceConfig, drivers: &[Arc<MockDriver>]) -> AdaptiveAiService {
    drivers
        .iter()
        .fold(AdaptiveAiService::builder(config), |b, d| b.with_driver(d.clone()))
        .build()
        .expect("service builds")
}

/// Let the flush worker take its first tick before anything is queued.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

pub fn ask(user: &str, text: &str) -> CompletionRequest {
    CompletionRequest::new(user, vec![Message::user(text)])
}

pub fn snack(user: &str) -> CompletionRequest {
    ask(user, "What are some healthy snacks?")
}

/// mockito server standing in for both upstream APIs.
pub struct UpstreamFixture {
    pub server: ServerGuard,
}

impl UpstreamFixture {
    pub async fn new() -> Self {
        Self {
            server: Server::new_async().await,
        }
    }

    pub fn url(&self) -> String {
        self.server.url()
    }

    /// Config pointing both providers at this server, with test keys.
    pub fn config(&self) -> ServiceConfig {
        let mut config = quiet_config();
        config.providers.openai.base_url = self.url();
        config.providers.openai.api_key = Some("sk-test".into());
        config.providers.gemini.base_url = self.url();
        config.providers.gemini.api_key = Some("g-test".into());
        config
    }

    pub async fn openai_reply(&mut self, content: &str) -> Mock {
        self.server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "model": "gpt-3.5-turbo",
                    "choices": [{
                        "index": 0,
                        "message": {"role": "assistant", "content": content},
                        "finish_reason": "stop"
                    }],
                    "usage": {"prompt_tokens": 9, "completion_tokens": 12, "total_tokens": 21}
                })
                .to_string(),
            )
            .create_async()
            .await
    }

    pub async fn openai_status(&mut self, status: usize) -> Mock {
        self.server
            .mock("POST", "/chat/completions")
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"message":"upstream exploded"}}"#)
            .create_async()
            .await
    }

    pub async fn gemini_reply(&mut self, model: &str, content: &str) -> Mock {
        self.server
            .mock(
                "POST",
                format!("/v1beta/models/{}:generateContent", model).as_str(),
            )
            .match_query(Matcher::UrlEncoded("key".into(), "g-test".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "candidates": [{
                        "content": {"role": "model", "parts": [{"text": content}]},
                        "finishReason": "STOP"
                    }],
                    "usageMetadata": {"promptTokenCount": 7, "candidatesTokenCount": 11, "totalTokenCount": 18}
                })
                .to_string(),
            )
            .create_async()
            .await
    }
}
