//! Completion response returned by the service facade.

use serde::{Deserialize, Serialize};

use super::request::{ComplexityTier, ProviderKind};

/// How a cached response was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    Exact,
    Similarity,
}

/// A completion, either freshly computed by a provider or served from cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub provider: ProviderKind,
    pub complexity: ComplexityTier,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_type: Option<CacheType>,
    /// Similarity score when `cache_type` is `Similarity`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    /// True when the request waited in a priority queue.
    #[serde(default)]
    pub queued: bool,
    pub processing_time_ms: u64,
    pub fingerprint: String,
}

impl CompletionResponse {
    /// Re-tag a stored response as a cache hit.
    pub fn as_cache_hit(&self, cache_type: CacheType, similarity: Option<f64>) -> Self {
        Self {
            cached: true,
            cache_type: Some(cache_type),
            similarity,
            queued: false,
            ..self.clone()
        }
    }
}
