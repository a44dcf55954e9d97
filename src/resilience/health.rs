//! Per-provider health: availability, usage and failure bookkeeping.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig};
use crate::types::ProviderKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealthSnapshot {
    pub provider: ProviderKind,
    pub available: bool,
    pub usage_count: u64,
    pub failure_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub cooldown_remaining_secs: u64,
}

pub struct ProviderHealth {
    provider: ProviderKind,
    breaker: CircuitBreaker,
    usage: AtomicU64,
}

impl ProviderHealth {
    pub fn new(provider: ProviderKind, config: CircuitBreakerConfig) -> Self {
        Self {
            provider,
            breaker: CircuitBreaker::new(config),
            usage: AtomicU64::new(0),
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    /// `Some(remaining)` while the provider is cooling down.
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        match self.breaker.state() {
            BreakerState::Open { remaining } => Some(remaining),
            BreakerState::Closed => None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.breaker.allow()
    }

    pub fn record_success(&self) {
        self.usage.fetch_add(1, Ordering::Relaxed);
        self.breaker.on_success();
    }

    pub fn record_failure(&self, reason: impl Into<String>) {
        self.breaker.on_failure(reason);
    }

    pub fn usage_count(&self) -> u64 {
        self.usage.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ProviderHealthSnapshot {
        let cb = self.breaker.snapshot();
        let cooldown_remaining_secs = cb.open_remaining_ms.map(|ms| ms.div_ceil(1000)).unwrap_or(0);
        ProviderHealthSnapshot {
            provider: self.provider,
            available: cb.open_remaining_ms.is_none(),
            usage_count: self.usage_count(),
            failure_count: cb.total_failures,
            last_error: cb.last_error,
            cooldown_remaining_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_failure_degrades_until_cooldown_passes() {
        let health = ProviderHealth::new(
            ProviderKind::Gemini,
            CircuitBreakerConfig::new().with_cooldown(Duration::from_secs(30)),
        );
        assert!(health.is_available());
        health.record_failure("HTTP 503");

        let snap = health.snapshot();
        assert!(!snap.available);
        assert_eq!(snap.failure_count, 1);
        assert_eq!(snap.cooldown_remaining_secs, 30);
        assert_eq!(snap.last_error.as_deref(), Some("HTTP 503"));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(health.is_available());
        health.record_success();
        let snap = health.snapshot();
        assert!(snap.available);
        assert_eq!(snap.usage_count, 1);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let health = ProviderHealth::new(ProviderKind::OpenAi, CircuitBreakerConfig::new());
        let v = serde_json::to_value(health.snapshot()).unwrap();
        assert_eq!(v["provider"], "openai");
        assert_eq!(v["usageCount"], 0);
        assert!(v.get("lastError").is_none());
    }
}
