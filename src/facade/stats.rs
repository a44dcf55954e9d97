//! Service-level statistics and health reports.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::batch::QueueSizes;
use crate::cache::CacheStats;
use crate::resilience::ProviderHealthSnapshot;
use crate::supervisor::SupervisorState;
use crate::types::ProviderKind;

/// Point-in-time counters, served by `GET /stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub queues: QueueSizes,
    pub cache: CacheStats,
    pub processing_batch: bool,
    /// Distinct computations currently running.
    pub in_flight: usize,
    /// Requests that joined an already-running computation.
    pub coalesced: u64,
    pub batches_processed: u64,
    /// Successful calls per provider id.
    pub providers: BTreeMap<String, u64>,
    pub fallbacks: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Available,
    Degraded,
    NotConfigured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
}

/// Served by `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: OverallStatus,
    pub services: BTreeMap<String, ServiceStatus>,
    pub providers: Vec<ProviderHealthSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flush_worker: Option<SupervisorState>,
    pub shutting_down: bool,
}

impl HealthReport {
    pub(crate) fn build(
        providers: Vec<ProviderHealthSnapshot>,
        flush_worker: Option<SupervisorState>,
        shutting_down: bool,
    ) -> Self {
        let mut services: BTreeMap<String, ServiceStatus> = ProviderKind::ALL
            .iter()
            .map(|k| (k.id().to_string(), ServiceStatus::NotConfigured))
            .collect();
        for snap in &providers {
            let status = if snap.available {
                ServiceStatus::Available
            } else {
                ServiceStatus::Degraded
            };
            services.insert(snap.provider.id().to_string(), status);
        }

        let any_available = providers.iter().any(|p| p.available);
        let worker_ok = !matches!(flush_worker, Some(SupervisorState::Stopped));
        let status = if any_available && worker_ok && !shutting_down {
            OverallStatus::Healthy
        } else {
            OverallStatus::Degraded
        };

        Self {
            status,
            services,
            providers,
            flush_worker,
            shutting_down,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == OverallStatus::Healthy
    }
}
