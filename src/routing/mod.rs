//! 路由模块：按复杂度选择模型，并在服务商之间按顺序降级。
//!
//! # Provider Routing Module
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ModelCatalog`] | Per-provider `ComplexityTier -> model` table |
//! | [`ProviderOrchestrator`] | Ordered fallback chain with health, usage and fallback counters |
//! | [`candidate_order`] | Preferred provider first, then configured order |
//!
//! The chain never load-balances: the first available candidate always gets
//! the call, and later candidates are only tried after it fails or while it
//! is cooling down.

mod fallback;
mod orchestrator;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{ComplexityTier, ProviderKind};

pub use fallback::candidate_order;
pub use orchestrator::{OrchestratorConfig, ProviderOrchestrator};

/// Model names for each complexity tier of one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierModels {
    pub low: String,
    pub medium: String,
    pub high: String,
    pub very_high: String,
}

impl TierModels {
    pub fn new(
        low: impl Into<String>,
        medium: impl Into<String>,
        high: impl Into<String>,
        very_high: impl Into<String>,
    ) -> Self {
        Self {
            low: low.into(),
            medium: medium.into(),
            high: high.into(),
            very_high: very_high.into(),
        }
    }

    pub fn for_tier(&self, tier: ComplexityTier) -> &str {
        match tier {
            ComplexityTier::Low => &self.low,
            ComplexityTier::Medium => &self.medium,
            ComplexityTier::High => &self.high,
            ComplexityTier::VeryHigh => &self.very_high,
        }
    }

    pub fn openai_defaults() -> Self {
        Self::new("gpt-3.5-turbo", "gpt-4o-mini", "gpt-4o", "gpt-4o")
    }

    pub fn gemini_defaults() -> Self {
        Self::new(
            "gemini-1.5-flash-8b",
            "gemini-1.5-flash",
            "gemini-1.5-pro",
            "gemini-1.5-pro",
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalog {
    models: HashMap<ProviderKind, TierModels>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        let mut models = HashMap::new();
        models.insert(ProviderKind::OpenAi, TierModels::openai_defaults());
        models.insert(ProviderKind::Gemini, TierModels::gemini_defaults());
        Self { models }
    }
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_models(mut self, provider: ProviderKind, models: TierModels) -> Self {
        self.models.insert(provider, models);
        self
    }

    pub fn model_for(&self, provider: ProviderKind, tier: ComplexityTier) -> &str {
        match self.models.get(&provider) {
            Some(m) => m.for_tier(tier),
            None => match provider {
                ProviderKind::OpenAi => "gpt-4o-mini",
                ProviderKind::Gemini => "gemini-1.5-flash",
            },
        }
    }
}
