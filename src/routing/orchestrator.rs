//! Ordered provider fallback chain.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::fallback::candidate_order;
use super::ModelCatalog;
use crate::cache::Fingerprint;
use crate::drivers::{ProviderDriver, ProviderRequest};
use crate::resilience::{CircuitBreakerConfig, ProviderHealth, ProviderHealthSnapshot};
use crate::types::{ComplexityTier, CompletionRequest, CompletionResponse, ProviderKind};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub request_timeout: Duration,
    /// How long a failed provider is skipped.
    pub cooldown: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            cooldown: Duration::from_secs(30),
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_request_timeout(mut self, d: Duration) -> Self {
        self.request_timeout = d;
        self
    }
    pub fn with_cooldown(mut self, d: Duration) -> Self {
        self.cooldown = d;
        self
    }
}

struct ProviderSlot {
    driver: Arc<dyn ProviderDriver>,
    health: ProviderHealth,
}

pub struct ProviderOrchestrator {
    config: OrchestratorConfig,
    catalog: ModelCatalog,
    slots: Vec<ProviderSlot>,
    fallbacks: AtomicU64,
}

impl ProviderOrchestrator {
    pub fn new(catalog: ModelCatalog, config: OrchestratorConfig) -> Self {
        Self {
            config,
            catalog,
            slots: Vec::new(),
            fallbacks: AtomicU64::new(0),
        }
    }

    /// Append a provider to the chain. Registering the same kind twice
    /// replaces the earlier driver in place.
    pub fn with_driver(mut self, driver: Arc<dyn ProviderDriver>) -> Self {
        let health = ProviderHealth::new(
            driver.kind(),
            CircuitBreakerConfig::new()
                .with_failure_threshold(1)
                .with_cooldown(self.config.cooldown),
        );
        let slot = ProviderSlot { driver, health };
        match self.slots.iter().position(|s| s.driver.kind() == slot.driver.kind()) {
            Some(i) => self.slots[i] = slot,
            None => self.slots.push(slot),
        }
        self
    }

    /// Configured providers in chain order.
    pub fn providers(&self) -> Vec<ProviderKind> {
        self.slots.iter().map(|s| s.driver.kind()).collect()
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    fn slot(&self, kind: ProviderKind) -> Option<&ProviderSlot> {
        self.slots.iter().find(|s| s.driver.kind() == kind)
    }

    /// Serve `request` from the first candidate that succeeds.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
        tier: ComplexityTier,
        fingerprint: &Fingerprint,
    ) -> Result<CompletionResponse> {
        let start = Instant::now();
        let order = candidate_order(request.preferred_provider, &self.providers());
        let mut attempts: Vec<String> = Vec::new();

        for kind in order {
            let Some(slot) = self.slot(kind) else { continue };

            if let Some(remaining) = slot.health.cooldown_remaining() {
                debug!(provider = %kind, remaining_ms = remaining.as_millis() as u64, "skipping degraded provider");
                attempts.push(format!("{}: cooling down ({}s left)", kind, remaining.as_secs().max(1)));
                continue;
            }

            let model = self.catalog.model_for(kind, tier).to_string();
            let upstream = ProviderRequest {
                model: model.clone(),
                messages: request.messages.clone(),
                response_format: request.response_format,
            };

            let outcome = match tokio::time::timeout(self.config.request_timeout, slot.driver.complete(&upstream)).await {
                Ok(r) => r,
                Err(_) => Err(Error::provider(
                    kind.id(),
                    format!("timed out after {}ms", self.config.request_timeout.as_millis()),
                )),
            };

            match outcome {
                Ok(reply) => {
                    slot.health.record_success();
                    if !attempts.is_empty() {
                        self.fallbacks.fetch_add(1, Ordering::Relaxed);
                        info!(provider = %kind, skipped = attempts.len(), "served by fallback provider");
                    }
                    return Ok(CompletionResponse {
                        content: reply.content,
                        model: if reply.model.is_empty() { model } else { reply.model },
                        provider: kind,
                        complexity: tier,
                        cached: false,
                        cache_type: None,
                        similarity: None,
                        queued: false,
                        processing_time_ms: start.elapsed().as_millis() as u64,
                        fingerprint: fingerprint.to_string(),
                    });
                }
                Err(e) => {
                    warn!(provider = %kind, model = %model, error = %e, "provider call failed, marking degraded");
                    slot.health.record_failure(e.to_string());
                    attempts.push(format!("{}: {}", kind, e));
                }
            }
        }

        if attempts.is_empty() {
            attempts.push("no providers configured".to_string());
        }
        Err(Error::AllProvidersUnavailable {
            attempts,
            retry_after_secs: self.retry_after_secs(),
        })
    }

    /// Seconds until the first degraded provider leaves its cool-down.
    fn retry_after_secs(&self) -> u64 {
        self.slots
            .iter()
            .filter_map(|s| s.health.cooldown_remaining())
            .min()
            .map(|d| (d.as_millis() as u64).div_ceil(1000).max(1))
            .unwrap_or_else(|| self.config.cooldown.as_secs().max(1))
    }

    pub fn health(&self) -> Vec<ProviderHealthSnapshot> {
        self.slots.iter().map(|s| s.health.snapshot()).collect()
    }

    /// True when at least one provider is outside its cool-down.
    pub fn is_healthy(&self) -> bool {
        self.slots.iter().any(|s| s.health.is_available())
    }

    pub fn usage(&self) -> BTreeMap<String, u64> {
        self.slots
            .iter()
            .map(|s| (s.driver.kind().id().to_string(), s.health.usage_count()))
            .collect()
    }

    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{MockDriver, MockOutcome};
    use crate::types::Message;

    fn request() -> CompletionRequest {
        CompletionRequest::new("u1", vec![Message::user("What are some healthy snacks?")])
    }

    fn fp() -> Fingerprint {
        Fingerprint::from("fp")
    }

    #[tokio::test]
    async fn test_primary_serves_and_model_follows_tier() {
        let openai = Arc::new(MockDriver::new(ProviderKind::OpenAi).with_reply("almonds"));
        let orch = ProviderOrchestrator::new(ModelCatalog::default(), OrchestratorConfig::new())
            .with_driver(openai.clone());

        let resp = orch.complete(&request(), ComplexityTier::High, &fp()).await.unwrap();
        assert_eq!(resp.content, "almonds");
        assert_eq!(resp.model, "gpt-4o");
        assert!(!resp.cached);
        assert_eq!(orch.fallback_count(), 0);
        assert_eq!(orch.usage()["openai"], 1);
    }

    #[tokio::test]
    async fn test_fallback_counted_once_per_request() {
        let openai = Arc::new(MockDriver::new(ProviderKind::OpenAi).always_failing("boom"));
        let gemini = Arc::new(MockDriver::new(ProviderKind::Gemini).with_reply("from gemini"));
        let orch = ProviderOrchestrator::new(
            ModelCatalog::default(),
            OrchestratorConfig::new().with_cooldown(Duration::ZERO),
        )
        .with_driver(openai.clone())
        .with_driver(gemini.clone());

        for n in 1..=3 {
            let resp = orch.complete(&request(), ComplexityTier::Low, &fp()).await.unwrap();
            assert_eq!(resp.provider, ProviderKind::Gemini);
            assert_eq!(orch.fallback_count(), n);
        }
        assert_eq!(openai.calls(), 3);
        assert_eq!(gemini.requests()[0].model, "gemini-1.5-flash-8b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_provider_skipped_during_cooldown() {
        let openai = Arc::new(
            MockDriver::new(ProviderKind::OpenAi)
                .with_reply("back")
                .then(MockOutcome::Status(500)),
        );
        let gemini = Arc::new(MockDriver::new(ProviderKind::Gemini));
        let orch = ProviderOrchestrator::new(
            ModelCatalog::default(),
            OrchestratorConfig::new().with_cooldown(Duration::from_secs(30)),
        )
        .with_driver(openai.clone())
        .with_driver(gemini.clone());

        orch.complete(&request(), ComplexityTier::Low, &fp()).await.unwrap();
        orch.complete(&request(), ComplexityTier::Low, &fp()).await.unwrap();
        assert_eq!(openai.calls(), 1);
        assert_eq!(orch.fallback_count(), 2);

        let health = orch.health();
        assert!(!health[0].available);
        assert!(health[0].last_error.as_deref().unwrap().contains("HTTP 500"));

        tokio::time::advance(Duration::from_secs(31)).await;
        let resp = orch.complete(&request(), ComplexityTier::Low, &fp()).await.unwrap();
        assert_eq!(resp.content, "back");
        assert!(orch.health()[0].available);
    }

    #[tokio::test]
    async fn test_preferred_provider_goes_first() {
        let openai = Arc::new(MockDriver::new(ProviderKind::OpenAi));
        let gemini = Arc::new(MockDriver::new(ProviderKind::Gemini));
        let orch = ProviderOrchestrator::new(ModelCatalog::default(), OrchestratorConfig::new())
            .with_driver(openai.clone())
            .with_driver(gemini.clone());

        let req = request().with_preferred_provider(ProviderKind::Gemini);
        let resp = orch.complete(&req, ComplexityTier::Low, &fp()).await.unwrap();
        assert_eq!(resp.provider, ProviderKind::Gemini);
        assert_eq!(openai.calls(), 0);
        assert_eq!(orch.fallback_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_exhaustion() {
        let slow = Arc::new(MockDriver::new(ProviderKind::OpenAi).with_delay(Duration::from_secs(60)));
        let broken = Arc::new(MockDriver::new(ProviderKind::Gemini).then(MockOutcome::Fail("refused".into())));
        let orch = ProviderOrchestrator::new(
            ModelCatalog::default(),
            OrchestratorConfig::new()
                .with_request_timeout(Duration::from_secs(2))
                .with_cooldown(Duration::from_secs(30)),
        )
        .with_driver(slow)
        .with_driver(broken);

        let err = orch.complete(&request(), ComplexityTier::Low, &fp()).await.unwrap_err();
        match err {
            Error::AllProvidersUnavailable { attempts, retry_after_secs } => {
                assert_eq!(attempts.len(), 2);
                assert!(attempts[0].contains("timed out"));
                assert!(attempts[1].contains("refused"));
                assert_eq!(retry_after_secs, 30);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(!orch.is_healthy());
    }

    #[tokio::test]
    async fn test_no_providers() {
        let orch = ProviderOrchestrator::new(ModelCatalog::default(), OrchestratorConfig::new());
        let err = orch.complete(&request(), ComplexityTier::Low, &fp()).await.unwrap_err();
        assert_eq!(err.code(), crate::error_code::ErrorCode::AllProvidersUnavailable);
    }
}
