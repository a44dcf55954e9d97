//! Gemini Generate API 驱动 — 实现 Google Gemini 特有的请求/响应格式转换
//!
//! Google Gemini generateContent API driver. Key differences:
//! - Uses `contents` instead of `messages`, with `parts` instead of `content`.
//! - Roles: `user` and `model` (not `assistant`). System uses `system_instruction`.
//! - JSON output is requested through `generationConfig.responseMimeType`.
//! - Response: `candidates[0].content.parts[0].text`.
//! - API key is passed as `?key=` query parameter, not in headers.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ProviderDriver, ProviderReply, ProviderRequest, UsageInfo};
use crate::transport::{AuthStyle, HttpTransport};
use crate::types::{Message, MessageRole, ProviderKind, ResponseFormat};
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini generateContent API driver.
pub struct GeminiDriver {
    transport: HttpTransport,
}

impl GeminiDriver {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }

    pub fn path_for(model: &str) -> String {
        format!("/v1beta/models/{}:generateContent", model)
    }

    /// Separate system instructions from conversation contents.
    fn split_messages(messages: &[Message]) -> (Option<Value>, Vec<Value>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut contents: Vec<Value> = Vec::new();

        for m in messages {
            let role = match m.role {
                MessageRole::System => {
                    system_parts.push(&m.content);
                    continue;
                }
                MessageRole::User => "user",
                MessageRole::Assistant => "model",
            };
            contents.push(json!({
                "role": role,
                "parts": [{ "text": m.content }],
            }));
        }

        let system_instruction = if system_parts.is_empty() {
            None
        } else {
            Some(json!({ "parts": [{ "text": system_parts.join("\n\n") }] }))
        };

        (system_instruction, contents)
    }

    pub fn build_request(&self, request: &ProviderRequest) -> Value {
        let (system_instruction, contents) = Self::split_messages(&request.messages);

        let mut body = json!({ "contents": contents });
        if let Some(sys) = system_instruction {
            body["system_instruction"] = sys;
        }
        if request.response_format == ResponseFormat::Json {
            body["generationConfig"] = json!({ "responseMimeType": "application/json" });
        }
        body
    }

    pub fn parse_response(&self, requested_model: &str, body: &Value) -> Result<ProviderReply> {
        let content = body
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                Error::provider(
                    ProviderKind::Gemini.id(),
                    "malformed payload: missing candidates[0].content.parts[0].text",
                )
            })?;

        let finish_reason = body
            .pointer("/candidates/0/finishReason")
            .and_then(|v| v.as_str())
            .map(|r| match r {
                "STOP" => "stop".to_string(),
                "MAX_TOKENS" => "length".to_string(),
                "SAFETY" | "RECITATION" => "content_filter".to_string(),
                other => other.to_lowercase(),
            });

        let usage = body.get("usageMetadata").map(|u| UsageInfo {
            prompt_tokens: u["promptTokenCount"].as_u64().unwrap_or(0),
            completion_tokens: u["candidatesTokenCount"].as_u64().unwrap_or(0),
            total_tokens: u["totalTokenCount"].as_u64().unwrap_or(0),
        });

        let model = body
            .get("modelVersion")
            .and_then(|v| v.as_str())
            .unwrap_or(requested_model)
            .to_string();

        Ok(ProviderReply {
            content: content.to_string(),
            model,
            finish_reason,
            usage,
        })
    }
}

impl std::fmt::Debug for GeminiDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiDriver")
            .field("base_url", &self.transport.base_url())
            .finish()
    }
}

#[async_trait]
impl ProviderDriver for GeminiDriver {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn complete(&self, request: &ProviderRequest) -> Result<ProviderReply> {
        let body = self.build_request(request);
        let reply = self
            .transport
            .post_json(&Self::path_for(&request.model), &body, AuthStyle::QueryKey)
            .await?;
        self.parse_response(&request.model, &reply)
    }
}
