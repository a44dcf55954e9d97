//! Request-side types: the caller's completion request and its scheduling knobs.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::message::Message;

/// Queue scheduling tier.
///
/// `Critical` is processed synchronously and never enters a queue; the other
/// tiers are drained strictly in `High > Normal > Low` order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl Priority {
    /// Tiers that own a queue, in drain order.
    pub const QUEUED: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    /// Parse a priority level from a name string. Returns `None` for unrecognised names.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "normal" => Some(Priority::Normal),
            "high" => Some(Priority::High),
            "critical" => Some(Priority::Critical),
            _ => None,
        }
    }

    pub fn is_queued(&self) -> bool {
        !matches!(self, Priority::Critical)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complexity tier assigned by the classifier; drives model selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ComplexityTier {
    pub const ALL: [ComplexityTier; 4] = [
        ComplexityTier::Low,
        ComplexityTier::Medium,
        ComplexityTier::High,
        ComplexityTier::VeryHigh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityTier::Low => "low",
            ComplexityTier::Medium => "medium",
            ComplexityTier::High => "high",
            ComplexityTier::VeryHigh => "very_high",
        }
    }

    /// Map a heuristic score onto a tier.
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=1 => ComplexityTier::Low,
            2..=3 => ComplexityTier::Medium,
            4..=6 => ComplexityTier::High,
            _ => ComplexityTier::VeryHigh,
        }
    }
}

impl fmt::Display for ComplexityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested shape of the completion text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
    Markdown,
}

impl ResponseFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseFormat::Text => "text",
            ResponseFormat::Json => "json",
            ResponseFormat::Markdown => "markdown",
        }
    }
}

/// Upstream AI providers known to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::OpenAi, ProviderKind::Gemini];

    pub fn id(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
        }
    }

    pub fn from_id(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Some(ProviderKind::OpenAi),
            "gemini" | "google" => Some(ProviderKind::Gemini),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// A chat-style completion request.
///
/// Owned by the caller and treated as immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub user_id: String,
    pub messages: Vec<Message>,
    /// Explicit complexity override; skips the classifier when set.
    #[serde(default)]
    pub complexity: Option<ComplexityTier>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub response_format: ResponseFormat,
    #[serde(default)]
    pub force_fresh: bool,
    #[serde(default)]
    pub preferred_provider: Option<ProviderKind>,
}

impl CompletionRequest {
    pub fn new(user_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            user_id: user_id.into(),
            messages,
            complexity: None,
            priority: Priority::default(),
            response_format: ResponseFormat::default(),
            force_fresh: false,
            preferred_provider: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_complexity(mut self, complexity: ComplexityTier) -> Self {
        self.complexity = Some(complexity);
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }

    pub fn with_force_fresh(mut self, force_fresh: bool) -> Self {
        self.force_fresh = force_fresh;
        self
    }

    pub fn with_preferred_provider(mut self, provider: ProviderKind) -> Self {
        self.preferred_provider = Some(provider);
        self
    }
}
