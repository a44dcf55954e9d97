//! Cache manager.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::backend::{CacheBackend, CacheEntry, DiskCache, MemoryCache};
use super::key::{Fingerprint, FingerprintGenerator};
use super::similarity::tokenize;
use crate::types::{CacheType, CompletionRequest, CompletionResponse};
use crate::Result;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub max_entries: usize,
    /// Minimum Jaccard score for a similarity hit. `1.0` effectively disables it.
    pub similarity_threshold: f64,
    pub disk_dir: Option<PathBuf>,
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_entries: 1000,
            similarity_threshold: 0.85,
            disk_dir: None,
            enabled: true,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }
    pub fn with_disk_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.disk_dir = Some(dir.into());
        self
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub similarity_hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub evictions: u64,
    pub errors: u64,
    pub size: usize,
}

impl CacheStats {
    /// Exact and similarity hits over all lookups.
    pub fn hit_ratio(&self) -> f64 {
        let served = self.hits + self.similarity_hits;
        let total = served + self.misses;
        if total == 0 {
            0.0
        } else {
            served as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    similarity_hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    evictions: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self, size: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            similarity_hits: self.similarity_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            size,
        }
    }
}

/// A response served from cache, already tagged with how it matched.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub response: CompletionResponse,
    pub cache_type: CacheType,
    pub similarity: Option<f64>,
}

/// Two-tier response cache keyed by request fingerprint.
///
/// Lookups never fail: disk problems are logged, counted in
/// [`CacheStats::errors`], and the cache carries on from memory.
pub struct FingerprintCache {
    config: CacheConfig,
    generator: FingerprintGenerator,
    memory: MemoryCache,
    disk: Option<Arc<dyn CacheBackend>>,
    stats: Arc<AtomicStats>,
    pending: TaskTracker,
}

impl FingerprintCache {
    pub fn new(config: CacheConfig) -> Self {
        let disk = config
            .disk_dir
            .clone()
            .map(|dir| Arc::new(DiskCache::new(dir)) as Arc<dyn CacheBackend>);
        Self {
            memory: MemoryCache::new(config.max_entries),
            generator: FingerprintGenerator::new(),
            disk,
            config,
            stats: Arc::new(AtomicStats::default()),
            pending: TaskTracker::new(),
        }
    }

    pub fn with_generator(mut self, generator: FingerprintGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Replace the durable tier, e.g. with a custom backend.
    pub fn with_disk_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.disk = Some(backend);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn fingerprint(&self, request: &CompletionRequest) -> Fingerprint {
        self.generator.fingerprint(request)
    }

    /// Exact memory match, then the disk tier, then the similarity index.
    pub async fn lookup(&self, fp: &Fingerprint, request: &CompletionRequest) -> Option<CacheHit> {
        let hit = self.find(fp, request).await;
        if hit.is_none() && self.config.enabled {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    /// Second look right before computing: picks up a result stored after
    /// this request's [`lookup`](Self::lookup) missed. Hits count as usual;
    /// a miss is not counted again.
    pub async fn recheck(&self, fp: &Fingerprint, request: &CompletionRequest) -> Option<CacheHit> {
        self.find(fp, request).await
    }

    async fn find(&self, fp: &Fingerprint, request: &CompletionRequest) -> Option<CacheHit> {
        if !self.config.enabled {
            return None;
        }

        match self.memory.get_entry(fp) {
            Ok(Some(entry)) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                debug!(fingerprint = %fp.short(), "exact cache hit (memory)");
                return Some(Self::exact_hit(&entry));
            }
            Ok(None) => {}
            Err(e) => self.record_error("memory lookup", &e),
        }

        if let Some(disk) = &self.disk {
            match disk.get(fp).await {
                Ok(Some(entry)) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(fingerprint = %fp.short(), "exact cache hit (disk), promoting");
                    let hit = Self::exact_hit(&entry);
                    self.put_memory(entry);
                    return Some(hit);
                }
                Ok(None) => {}
                Err(e) => self.record_error("disk lookup", &e),
            }
        }

        if self.config.similarity_threshold < 1.0 {
            let tokens = tokenize(&self.generator.canonical_text(&request.messages));
            match self.memory.find_similar(
                &tokens,
                request.response_format,
                self.config.similarity_threshold,
                self.config.max_entries,
            ) {
                Ok(Some((entry, score))) => {
                    self.stats.similarity_hits.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        fingerprint = %fp.short(),
                        matched = %entry.fingerprint.short(),
                        score,
                        "similarity cache hit"
                    );
                    return Some(CacheHit {
                        response: entry.response.as_cache_hit(CacheType::Similarity, Some(score)),
                        cache_type: CacheType::Similarity,
                        similarity: Some(score),
                    });
                }
                Ok(None) => {}
                Err(e) => self.record_error("similarity scan", &e),
            }
        }

        None
    }

    /// Store (always overwriting) a freshly computed response.
    ///
    /// The memory write is immediate; the disk write runs in the background
    /// and can be awaited with [`flush_pending`](Self::flush_pending).
    pub async fn store(
        &self,
        fp: &Fingerprint,
        request: &CompletionRequest,
        response: &CompletionResponse,
    ) {
        if !self.config.enabled {
            return;
        }
        let stored = CompletionResponse {
            cached: false,
            cache_type: None,
            similarity: None,
            queued: false,
            ..response.clone()
        };
        let entry = CacheEntry::new(
            fp.clone(),
            stored,
            request.response_format,
            self.generator.canonical_text(&request.messages),
            self.config.ttl,
        );
        self.stats.stores.fetch_add(1, Ordering::Relaxed);

        if let Some(disk) = &self.disk {
            let disk = Arc::clone(disk);
            let stats = Arc::clone(&self.stats);
            let disk_entry = entry.clone();
            self.pending.spawn(async move {
                if let Err(e) = disk.set(disk_entry).await {
                    stats.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, backend = disk.name(), "cache write failed, continuing memory-only");
                }
            });
        }
        self.put_memory(entry);
    }

    /// Wait for background disk writes issued so far.
    pub async fn flush_pending(&self) {
        self.pending.close();
        self.pending.wait().await;
        self.pending.reopen();
    }

    pub fn purge_expired(&self) -> usize {
        match self.memory.purge_expired() {
            Ok(n) => {
                if n > 0 {
                    debug!(removed = n, "purged expired cache entries");
                }
                n
            }
            Err(e) => {
                self.record_error("purge", &e);
                0
            }
        }
    }

    pub async fn clear(&self) -> Result<()> {
        self.memory.clear().await?;
        if let Some(disk) = &self.disk {
            self.flush_pending().await;
            disk.clear().await?;
        }
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats(self.memory.size())
    }

    fn exact_hit(entry: &CacheEntry) -> CacheHit {
        CacheHit {
            response: entry.response.as_cache_hit(CacheType::Exact, None),
            cache_type: CacheType::Exact,
            similarity: None,
        }
    }

    fn put_memory(&self, entry: CacheEntry) {
        match self.memory.put_entry(entry) {
            Ok(Some(evicted)) => {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(evicted = %evicted.short(), "cache at capacity, evicted LRU entry");
            }
            Ok(None) => {}
            Err(e) => self.record_error("memory store", &e),
        }
    }

    fn record_error(&self, op: &str, e: &crate::Error) {
        self.stats.errors.fetch_add(1, Ordering::Relaxed);
        warn!(op, error = %e, "cache error");
    }
}
