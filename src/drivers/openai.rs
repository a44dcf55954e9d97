//! OpenAI chat completions driver.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ProviderDriver, ProviderReply, ProviderRequest, UsageInfo};
use crate::transport::{AuthStyle, HttpTransport};
use crate::types::{ProviderKind, ResponseFormat};
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const CHAT_PATH: &str = "/chat/completions";

pub struct OpenAiDriver {
    transport: HttpTransport,
}

impl OpenAiDriver {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }

    pub fn build_request(&self, request: &ProviderRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut body = json!({
            "model": request.model,
            "messages": messages,
        });
        if request.response_format == ResponseFormat::Json {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }

    pub fn parse_response(&self, requested_model: &str, body: &Value) -> Result<ProviderReply> {
        let content = body
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                Error::provider(ProviderKind::OpenAi.id(), "malformed payload: missing choices[0].message.content")
            })?;
        let model = body
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or(requested_model)
            .to_string();
        let finish_reason = body
            .pointer("/choices/0/finish_reason")
            .and_then(|v| v.as_str())
            .map(String::from);
        let usage = body.get("usage").map(|u| UsageInfo {
            prompt_tokens: u["prompt_tokens"].as_u64().unwrap_or(0),
            completion_tokens: u["completion_tokens"].as_u64().unwrap_or(0),
            total_tokens: u["total_tokens"].as_u64().unwrap_or(0),
        });

        Ok(ProviderReply {
            content: content.to_string(),
            model,
            finish_reason,
            usage,
        })
    }
}

impl std::fmt::Debug for OpenAiDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiDriver")
            .field("base_url", &self.transport.base_url())
            .finish()
    }
}

#[async_trait]
impl ProviderDriver for OpenAiDriver {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn complete(&self, request: &ProviderRequest) -> Result<ProviderReply> {
        let body = self.build_request(request);
        let reply = self.transport.post_json(CHAT_PATH, &body, AuthStyle::Bearer).await?;
        self.parse_response(&request.model, &reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportConfig;
    use crate::types::Message;

    fn driver() -> OpenAiDriver {
        let transport = HttpTransport::new(
            ProviderKind::OpenAi,
            TransportConfig::new("http://localhost:1"),
        )
        .unwrap();
        OpenAiDriver::new(transport)
    }

    fn request(format: ResponseFormat) -> ProviderRequest {
        ProviderRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![Message::system("Be brief."), Message::user("Hello")],
            response_format: format,
        }
    }

    #[test]
    fn test_build_request() {
        let body = driver().build_request(&request(ResponseFormat::Text));
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hello");
        assert!(body.get("response_format").is_none());

        let json_body = driver().build_request(&request(ResponseFormat::Json));
        assert_eq!(json_body["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_parse_response() {
        let body = serde_json::json!({
            "model": "gpt-4o-mini-2024-07-18",
            "choices": [{"message": {"content": "Hi there!"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let reply = driver().parse_response("gpt-4o-mini", &body).unwrap();
        assert_eq!(reply.content, "Hi there!");
        assert_eq!(reply.model, "gpt-4o-mini-2024-07-18");
        assert_eq!(reply.finish_reason.as_deref(), Some("stop"));
        assert_eq!(reply.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_parse_response_missing_content() {
        let err = driver()
            .parse_response("gpt-4o", &serde_json::json!({"choices": []}))
            .unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
    }
}
