//! Provider 驱动抽象层 — 通过 trait 适配不同厂商的补全接口
//!
//! Provider driver abstraction layer. Each upstream API (OpenAI chat
//! completions, Gemini generateContent) has a concrete driver that converts the
//! unified [`ProviderRequest`] into the provider's wire format and extracts the
//! completion text from its reply. The orchestrator holds drivers as
//! `Arc<dyn ProviderDriver>`, so tests substitute [`MockDriver`].

pub mod gemini;
pub mod mock;
pub mod openai;

use async_trait::async_trait;

use crate::types::{Message, ProviderKind, ResponseFormat};
use crate::Result;

pub use gemini::GeminiDriver;
pub use mock::{MockDriver, MockOutcome};
pub use openai::OpenAiDriver;

/// Unified upstream request: a resolved model plus the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub response_format: ResponseFormat,
}

/// Text extracted from a provider reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReply {
    pub content: String,
    /// Model reported by the provider; falls back to the requested one.
    pub model: String,
    pub finish_reason: Option<String>,
    pub usage: Option<UsageInfo>,
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageInfo {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Core trait for an upstream completion provider.
#[async_trait]
pub trait ProviderDriver: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> ProviderKind;

    /// Perform one completion call. Any failure is an [`crate::Error::Provider`].
    async fn complete(&self, request: &ProviderRequest) -> Result<ProviderReply>;
}
