//! The orchestration service.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, OnceCell};
use tracing::{debug, error, info, warn};

use super::stats::{HealthReport, ServiceStats};
use crate::batch::{
    BatchExecutor, BatchItem, FlushWorker, ItemHandler, PriorityQueue, QueuedCompletion,
};
use crate::cache::{CacheBackend, Coalescer, Fingerprint, FingerprintCache};
use crate::classifier::classify;
use crate::config::ServiceConfig;
use crate::drivers::{GeminiDriver, OpenAiDriver, ProviderDriver};
use crate::routing::ProviderOrchestrator;
use crate::supervisor::{RestartPolicy, Supervisor};
use crate::transport::{HttpTransport, TransportConfig};
use crate::types::{ComplexityTier, CompletionRequest, CompletionResponse, Priority, ProviderKind};
use crate::{Error, ErrorContext, Result};

const JANITOR_INTERVAL: Duration = Duration::from_secs(60);

/// Result of [`AdaptiveAiService::generate_completion`].
#[derive(Debug)]
pub enum GenerateOutcome {
    /// Served from cache or computed directly.
    Completed(CompletionResponse),
    /// Waiting in a priority queue; await the handle for the result.
    Queued(QueuedCompletion),
}

impl GenerateOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, GenerateOutcome::Queued(_))
    }

    /// Wait for the final response.
    pub async fn into_response(self) -> Result<CompletionResponse> {
        match self {
            GenerateOutcome::Completed(response) => Ok(response),
            GenerateOutcome::Queued(handle) => handle.wait().await,
        }
    }
}

/// Cache, coalescer and provider chain shared by the direct and queued paths.
struct Engine {
    cache: Arc<FingerprintCache>,
    coalescer: Coalescer,
    orchestrator: Arc<ProviderOrchestrator>,
}

impl Engine {
    /// Compute through the provider chain, joining any in-flight computation
    /// for the same fingerprint, and store the result.
    ///
    /// Unless `force_fresh` is set, the cache is checked again first: an
    /// identical request that finished while this one waited (in a queue,
    /// or on the disk tier) has already stored the answer.
    async fn compute(
        &self,
        request: &CompletionRequest,
        fingerprint: &Fingerprint,
        tier: ComplexityTier,
    ) -> Result<CompletionResponse> {
        let cache = Arc::clone(&self.cache);
        let orchestrator = Arc::clone(&self.orchestrator);
        let request = request.clone();
        let key = fingerprint.clone();
        self.coalescer
            .run(fingerprint.clone(), async move {
                if !request.force_fresh {
                    if let Some(hit) = cache.recheck(&key, &request).await {
                        debug!(fingerprint = %key.short(), "answered by an earlier identical request");
                        return Ok(hit.response);
                    }
                }
                let response = orchestrator.complete(&request, tier, &key).await?;
                cache.store(&key, &request, &response).await;
                Ok(response)
            })
            .await
    }
}

struct QueuedWork {
    request: CompletionRequest,
    fingerprint: Fingerprint,
    tier: ComplexityTier,
    responder: Mutex<Option<oneshot::Sender<Result<CompletionResponse>>>>,
}

struct CompletionHandler {
    engine: Arc<Engine>,
}

#[async_trait]
impl ItemHandler<QueuedWork> for CompletionHandler {
    type Output = CompletionResponse;

    async fn attempt(&self, item: &BatchItem<QueuedWork>) -> Result<CompletionResponse> {
        let work = &item.data;
        self.engine
            .compute(&work.request, &work.fingerprint, work.tier)
            .await
    }

    fn finish(&self, item: BatchItem<QueuedWork>, outcome: Result<CompletionResponse>) {
        let waited = item.waited();
        let outcome = outcome.map(|mut response| {
            response.queued = true;
            response.processing_time_ms = waited.as_millis() as u64;
            response
        });
        let responder = item.data.responder.lock().ok().and_then(|mut r| r.take());
        match responder {
            Some(tx) => {
                if tx.send(outcome).is_err() {
                    debug!(id = %item.id, "caller went away before the result arrived");
                }
            }
            None => warn!(id = %item.id, "queued item finished twice"),
        }
    }
}

fn validate(request: &CompletionRequest) -> Result<()> {
    let invalid = |msg: String, field: &str| {
        Err(Error::validation_with_context(
            msg,
            ErrorContext::new()
                .with_field_path(field)
                .with_source("request_validator"),
        ))
    };
    if request.user_id.trim().is_empty() {
        return invalid("userId is required".into(), "userId");
    }
    if request.messages.is_empty() {
        return invalid("messages must not be empty".into(), "messages");
    }
    if let Some(i) = request.messages.iter().position(|m| m.is_blank()) {
        return invalid(
            format!("message {} has no content", i),
            &format!("messages[{}].content", i),
        );
    }
    Ok(())
}

/// Builder for [`AdaptiveAiService`].
///
/// Drivers are registered in chain order. [`with_configured_drivers`]
/// adds an HTTP driver for every provider whose API key resolved.
///
/// [`with_configured_drivers`]: ServiceBuilder::with_configured_drivers
pub struct ServiceBuilder {
    config: ServiceConfig,
    drivers: Vec<Arc<dyn ProviderDriver>>,
    disk: Option<Arc<dyn CacheBackend>>,
}

impl ServiceBuilder {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            drivers: Vec::new(),
            disk: None,
        }
    }

    pub fn with_driver(mut self, driver: Arc<dyn ProviderDriver>) -> Self {
        self.drivers.push(driver);
        self
    }

    pub fn with_disk_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.disk = Some(backend);
        self
    }

    pub fn with_configured_drivers(mut self) -> Result<Self> {
        let timeout = Duration::from_secs(self.config.routing.request_timeout_secs);
        for kind in self.config.configured_providers() {
            let provider = self.config.providers.get(kind);
            let mut transport = TransportConfig::new(provider.base_url.clone()).with_timeout(timeout);
            if let Some(key) = &provider.api_key {
                transport = transport.with_api_key(key.clone());
            }
            let transport = HttpTransport::new(kind, transport)?;
            let driver: Arc<dyn ProviderDriver> = match kind {
                ProviderKind::OpenAi => Arc::new(OpenAiDriver::new(transport)),
                ProviderKind::Gemini => Arc::new(GeminiDriver::new(transport)),
            };
            self.drivers.push(driver);
        }
        Ok(self)
    }

    /// Assemble the service and start its background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<AdaptiveAiService> {
        self.config.validate()?;
        let config = self.config;

        let mut cache = FingerprintCache::new(config.cache_config());
        if let Some(disk) = self.disk {
            cache = cache.with_disk_backend(disk);
        }
        let cache = Arc::new(cache);

        let orchestrator = self
            .drivers
            .into_iter()
            .fold(
                ProviderOrchestrator::new(config.catalog(), config.orchestrator_config()),
                |orch, driver| orch.with_driver(driver),
            );
        if orchestrator.providers().is_empty() {
            warn!("no providers configured; every computation will fail");
        }
        let orchestrator = Arc::new(orchestrator);

        let engine = Arc::new(Engine {
            cache: Arc::clone(&cache),
            coalescer: Coalescer::new(),
            orchestrator: Arc::clone(&orchestrator),
        });

        let queue = Arc::new(PriorityQueue::new(config.batch_config()));
        let worker = Arc::new(FlushWorker::new(
            Arc::clone(&queue),
            BatchExecutor::with_config(config.executor_config()),
            Arc::new(CompletionHandler {
                engine: Arc::clone(&engine),
            }),
        ));

        let flush_supervisor = config.batching.enabled.then(|| {
            let worker = Arc::clone(&worker);
            Supervisor::spawn("flush-worker", RestartPolicy::default(), move |token| {
                Arc::clone(&worker).run(token)
            })
        });

        let janitor_cache = Arc::clone(&cache);
        let janitor = Supervisor::spawn("cache-janitor", RestartPolicy::default(), move |token| {
            let cache = Arc::clone(&janitor_cache);
            async move {
                let mut ticker = tokio::time::interval(JANITOR_INTERVAL);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => return Ok(()),
                        _ = ticker.tick() => {
                            let purged = cache.purge_expired();
                            if purged > 0 {
                                debug!(purged, "purged expired cache entries");
                            }
                        }
                    }
                }
            }
        });

        info!(
            providers = ?orchestrator.providers(),
            batching = config.batching.enabled,
            cache = config.cache.enabled,
            "adaptive AI service ready"
        );

        Ok(AdaptiveAiService {
            config,
            engine,
            queue,
            worker,
            flush_supervisor,
            janitor,
            intake_open: RwLock::new(true),
            shutdown: OnceCell::new(),
        })
    }
}

/// Request-facing entry point: cache, classifier, priority queue and
/// provider chain behind one call.
pub struct AdaptiveAiService {
    config: ServiceConfig,
    engine: Arc<Engine>,
    queue: Arc<PriorityQueue<QueuedWork>>,
    worker: Arc<FlushWorker<QueuedWork, CompletionHandler>>,
    flush_supervisor: Option<Supervisor>,
    janitor: Supervisor,
    intake_open: RwLock<bool>,
    shutdown: OnceCell<()>,
}

impl AdaptiveAiService {
    pub fn builder(config: ServiceConfig) -> ServiceBuilder {
        ServiceBuilder::new(config)
    }

    /// Build with HTTP drivers for every configured provider.
    pub fn from_config(config: ServiceConfig) -> Result<Self> {
        ServiceBuilder::new(config).with_configured_drivers()?.build()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn cache(&self) -> &FingerprintCache {
        &self.engine.cache
    }

    pub fn orchestrator(&self) -> &ProviderOrchestrator {
        &self.engine.orchestrator
    }

    pub fn is_shutting_down(&self) -> bool {
        self.intake_open.read().map(|open| !*open).unwrap_or(true)
    }

    pub async fn generate_completion(&self, request: CompletionRequest) -> Result<GenerateOutcome> {
        if self.is_shutting_down() {
            return Err(Error::ShuttingDown);
        }
        validate(&request)?;

        let start = Instant::now();
        let fingerprint = self.engine.cache.fingerprint(&request);

        if !request.force_fresh {
            if let Some(hit) = self.engine.cache.lookup(&fingerprint, &request).await {
                let mut response = hit.response;
                response.processing_time_ms = start.elapsed().as_millis() as u64;
                info!(
                    user = %request.user_id,
                    fingerprint = %fingerprint.short(),
                    cache_type = ?hit.cache_type,
                    "served from cache"
                );
                return Ok(GenerateOutcome::Completed(response));
            }
        }

        let tier = request
            .complexity
            .unwrap_or_else(|| classify(&request.messages));

        if request.priority == Priority::Critical || !self.config.batching.enabled {
            let mut response = self.engine.compute(&request, &fingerprint, tier).await?;
            response.processing_time_ms = start.elapsed().as_millis() as u64;
            info!(
                user = %request.user_id,
                provider = %response.provider,
                model = %response.model,
                complexity = %tier,
                elapsed_ms = response.processing_time_ms,
                "completion served directly"
            );
            return Ok(GenerateOutcome::Completed(response));
        }

        self.enqueue(request, fingerprint, tier)
    }

    fn enqueue(
        &self,
        request: CompletionRequest,
        fingerprint: Fingerprint,
        tier: ComplexityTier,
    ) -> Result<GenerateOutcome> {
        // Held across the enqueue so shutdown cannot drain between the
        // intake check and the push.
        let open = self.intake_open.read().map_err(|_| {
            Error::runtime_with_context("intake lock poisoned", ErrorContext::new().with_source("facade"))
        })?;
        if !*open {
            return Err(Error::ShuttingDown);
        }

        let priority = request.priority;
        let user = request.user_id.clone();
        let (tx, rx) = oneshot::channel();
        let item = BatchItem::new(
            priority,
            QueuedWork {
                request,
                fingerprint,
                tier,
                responder: Mutex::new(Some(tx)),
            },
        );
        let id = item.id.clone();
        let cancel = item.cancel_flag();
        let outcome = self.queue.enqueue(item)?;
        drop(open);

        let handle = QueuedCompletion::new(id, priority, &outcome, rx, cancel);
        debug!(
            user = %user,
            id = %handle.id,
            priority = %priority,
            position = handle.position,
            estimated_wait_seconds = handle.estimated_wait_seconds,
            "request queued"
        );
        Ok(GenerateOutcome::Queued(handle))
    }

    /// Like [`generate_completion`](Self::generate_completion), but waits for
    /// queued results.
    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.generate_completion(request).await?.into_response().await
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            queues: self.queue.sizes(),
            cache: self.engine.cache.stats(),
            processing_batch: self.worker.is_processing(),
            in_flight: self.engine.coalescer.in_flight(),
            coalesced: self.engine.coalescer.joined(),
            batches_processed: self.worker.batches_processed(),
            providers: self.engine.orchestrator.usage(),
            fallbacks: self.engine.orchestrator.fallback_count(),
        }
    }

    pub fn health(&self) -> HealthReport {
        HealthReport::build(
            self.engine.orchestrator.health(),
            self.flush_supervisor.as_ref().map(|s| s.state()),
            self.is_shutting_down(),
        )
    }

    /// Stop intake, stop the flush tick, process everything still queued and
    /// wait for pending cache writes. Safe to call more than once; later
    /// calls wait for the first to finish.
    pub async fn shutdown(&self) {
        self.shutdown.get_or_init(|| self.shutdown_inner()).await;
    }

    async fn shutdown_inner(&self) {
        match self.intake_open.write() {
            Ok(mut open) => *open = false,
            Err(poisoned) => *poisoned.into_inner() = false,
        }
        info!("shutdown requested, intake closed");

        if let Some(supervisor) = &self.flush_supervisor {
            supervisor.shutdown().await;
        }
        self.janitor.shutdown().await;

        match self.worker.drain_remaining().await {
            Ok(drained) => info!(drained, "queued requests drained"),
            Err(e) => error!(error = %e, "failed to drain queued requests"),
        }
        self.engine.cache.flush_pending().await;
        info!("shutdown complete");
    }
}
