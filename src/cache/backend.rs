//! Cache backend implementations.

use super::key::Fingerprint;
use crate::types::{CompletionResponse, ResponseFormat};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A stored completion keyed by fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub response: CompletionResponse,
    pub format: ResponseFormat,
    /// Normalized request text. The memory tier tokenizes it into the
    /// similarity index on insert, including promotion from disk; entries
    /// that only live on disk are not similarity candidates.
    pub normalized: String,
    pub created_at_ms: u64,
    pub ttl_ms: u64,
    pub hit_count: u64,
}

impl CacheEntry {
    pub fn new(
        fingerprint: Fingerprint,
        response: CompletionResponse,
        format: ResponseFormat,
        normalized: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            fingerprint,
            response,
            format,
            normalized: normalized.into(),
            created_at_ms: now_ms(),
            ttl_ms: ttl.as_millis() as u64,
            hit_count: 0,
        }
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) > self.ttl_ms
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_ms())
    }

    pub fn age(&self) -> Duration {
        Duration::from_millis(now_ms().saturating_sub(self.created_at_ms))
    }
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &Fingerprint) -> Result<Option<CacheEntry>>;
    /// Insert or overwrite.
    async fn set(&self, entry: CacheEntry) -> Result<()>;
    async fn delete(&self, key: &Fingerprint) -> Result<bool>;
    async fn clear(&self) -> Result<()>;
    async fn len(&self) -> Result<usize>;
    fn name(&self) -> &'static str;
}

struct MemorySlot {
    entry: CacheEntry,
    tokens: BTreeSet<String>,
}

/// In-memory tier: bounded LRU, expired entries dropped on access.
pub struct MemoryCache {
    entries: Mutex<LruCache<Fingerprint, MemorySlot>>,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LruCache<Fingerprint, MemorySlot>>> {
        self.entries.lock().map_err(|_| {
            Error::runtime_with_context(
                "memory cache poisoned",
                ErrorContext::new().with_source("memory_cache"),
            )
        })
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn size(&self) -> usize {
        self.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn capacity(&self) -> usize {
        self.lock().map(|e| e.cap().get()).unwrap_or(0)
    }

    /// Exact lookup; bumps recency and hit count.
    pub fn get_entry(&self, key: &Fingerprint) -> Result<Option<CacheEntry>> {
        let mut entries = self.lock()?;
        let expired = match entries.get_mut(key) {
            Some(slot) if !slot.entry.is_expired() => {
                slot.entry.hit_count += 1;
                return Ok(Some(slot.entry.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    /// Inserts the entry, evicting the least recently used one when full.
    pub fn put_entry(&self, entry: CacheEntry) -> Result<Option<Fingerprint>> {
        let tokens = super::similarity::tokenize(&entry.normalized);
        let mut entries = self.lock()?;
        let key = entry.fingerprint.clone();
        let evicted = entries
            .push(key.clone(), MemorySlot { entry, tokens })
            .and_then(|(k, _)| if k != key { Some(k) } else { None });
        Ok(evicted)
    }

    /// Best non-expired entry whose token set overlaps `tokens` by at least `threshold`.
    pub fn find_similar(
        &self,
        tokens: &BTreeSet<String>,
        format: ResponseFormat,
        threshold: f64,
        scan_limit: usize,
    ) -> Result<Option<(CacheEntry, f64)>> {
        let mut entries = self.lock()?;
        let now = now_ms();
        let best = entries
            .iter()
            .take(scan_limit)
            .filter(|(_, slot)| slot.entry.format == format && !slot.entry.is_expired_at(now))
            .map(|(k, slot)| (k.clone(), super::similarity::jaccard(tokens, &slot.tokens)))
            .filter(|(_, score)| *score >= threshold)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(best.and_then(|(key, score)| {
            entries.get_mut(&key).map(|slot| {
                slot.entry.hit_count += 1;
                (slot.entry.clone(), score)
            })
        }))
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let mut entries = self.lock()?;
        let now = now_ms();
        let expired: Vec<Fingerprint> = entries
            .iter()
            .filter(|(_, slot)| slot.entry.is_expired_at(now))
            .map(|(k, _)| k.clone())
            .collect();
        for k in &expired {
            entries.pop(k);
        }
        Ok(expired.len())
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &Fingerprint) -> Result<Option<CacheEntry>> {
        self.get_entry(key)
    }
    async fn set(&self, entry: CacheEntry) -> Result<()> {
        self.put_entry(entry).map(|_| ())
    }
    async fn delete(&self, key: &Fingerprint) -> Result<bool> {
        Ok(self.lock()?.pop(key).is_some())
    }
    async fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
    async fn len(&self) -> Result<usize> {
        let now = now_ms();
        Ok(self
            .lock()?
            .iter()
            .filter(|(_, slot)| !slot.entry.is_expired_at(now))
            .count())
    }
    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Durable tier: one JSON file per fingerprint under a directory.
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.json", key.as_str()))
    }

    fn io_error(&self, op: &str, path: &Path, e: impl std::fmt::Display) -> Error {
        Error::cache_io_with_context(
            format!("{} failed: {}", op, e),
            ErrorContext::new()
                .with_details(path.display().to_string())
                .with_source("disk_cache"),
        )
    }
}

#[async_trait]
impl CacheBackend for DiskCache {
    async fn get(&self, key: &Fingerprint) -> Result<Option<CacheEntry>> {
        let path = self.path_for(key);
        let data = match tokio::fs::read(&path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error("read", &path, e)),
        };
        let entry: CacheEntry =
            serde_json::from_slice(&data).map_err(|e| self.io_error("decode", &path, e))?;
        if entry.is_expired() {
            let _ = tokio::fs::remove_file(&path).await;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    async fn set(&self, entry: CacheEntry) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| self.io_error("create_dir", &self.dir, e))?;
        let path = self.path_for(&entry.fingerprint);
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec(&entry)?;
        tokio::fs::write(&tmp, &data)
            .await
            .map_err(|e| self.io_error("write", &tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| self.io_error("rename", &path, e))
    }

    async fn delete(&self, key: &Fingerprint) -> Result<bool> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_error("delete", &path, e)),
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(self.io_error("read_dir", &self.dir, e)),
        };
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| self.io_error("read_dir", &self.dir, e))?
        {
            let path = item.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| self.io_error("delete", &path, e))?;
            }
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(self.io_error("read_dir", &self.dir, e)),
        };
        let mut count = 0;
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| self.io_error("read_dir", &self.dir, e))?
        {
            if item.path().extension().and_then(|s| s.to_str()) == Some("json") {
                count += 1;
            }
        }
        Ok(count)
    }

    fn name(&self) -> &'static str {
        "disk"
    }
}

pub struct NullCache;
impl NullCache {
    pub fn new() -> Self {
        Self
    }
}
impl Default for NullCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for NullCache {
    async fn get(&self, _: &Fingerprint) -> Result<Option<CacheEntry>> {
        Ok(None)
    }
    async fn set(&self, _: CacheEntry) -> Result<()> {
        Ok(())
    }
    async fn delete(&self, _: &Fingerprint) -> Result<bool> {
        Ok(false)
    }
    async fn clear(&self) -> Result<()> {
        Ok(())
    }
    async fn len(&self) -> Result<usize> {
        Ok(0)
    }
    fn name(&self) -> &'static str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ComplexityTier, ProviderKind};

    fn entry(fp: &str, text: &str, ttl: Duration) -> CacheEntry {
        let response = CompletionResponse {
            content: format!("answer for {text}"),
            model: "gpt-4o-mini".into(),
            provider: ProviderKind::OpenAi,
            complexity: ComplexityTier::Low,
            cached: false,
            cache_type: None,
            similarity: None,
            queued: false,
            processing_time_ms: 10,
            fingerprint: fp.into(),
        };
        CacheEntry::new(fp.into(), response, ResponseFormat::Text, text, ttl)
    }

    #[test]
    fn test_memory_lru_eviction() {
        let cache = MemoryCache::new(2);
        cache.put_entry(entry("a", "one", Duration::from_secs(60))).unwrap();
        cache.put_entry(entry("b", "two", Duration::from_secs(60))).unwrap();
        // touch "a" so "b" becomes least recently used
        assert!(cache.get_entry(&"a".into()).unwrap().is_some());
        let evicted = cache.put_entry(entry("c", "three", Duration::from_secs(60))).unwrap();
        assert_eq!(evicted, Some(Fingerprint::from("b")));
        assert!(cache.get_entry(&"b".into()).unwrap().is_none());
    }

    #[test]
    fn test_memory_overwrite_is_not_eviction() {
        let cache = MemoryCache::new(2);
        cache.put_entry(entry("a", "one", Duration::from_secs(60))).unwrap();
        let evicted = cache.put_entry(entry("a", "uno", Duration::from_secs(60))).unwrap();
        assert!(evicted.is_none());
        assert_eq!(cache.get_entry(&"a".into()).unwrap().unwrap().normalized, "uno");
    }

    #[test]
    fn test_memory_expired_entry_is_miss() {
        let cache = MemoryCache::new(4);
        let mut e = entry("a", "one", Duration::from_millis(1));
        e.created_at_ms -= 10;
        cache.put_entry(e).unwrap();
        assert!(cache.get_entry(&"a".into()).unwrap().is_none());
    }

    #[test]
    fn test_memory_hit_count_increments() {
        let cache = MemoryCache::new(4);
        cache.put_entry(entry("a", "one", Duration::from_secs(60))).unwrap();
        cache.get_entry(&"a".into()).unwrap();
        let second = cache.get_entry(&"a".into()).unwrap().unwrap();
        assert_eq!(second.hit_count, 2);
    }

    #[test]
    fn test_find_similar_respects_threshold_and_format() {
        let cache = MemoryCache::new(8);
        cache
            .put_entry(entry("a", "what are some healthy snacks?", Duration::from_secs(60)))
            .unwrap();
        let probe = super::super::similarity::tokenize("what are some healthy snacks");
        let (hit, score) = cache
            .find_similar(&probe, ResponseFormat::Text, 0.85, 100)
            .unwrap()
            .unwrap();
        assert_eq!(hit.fingerprint, Fingerprint::from("a"));
        assert!(score > 0.99);

        assert!(cache
            .find_similar(&probe, ResponseFormat::Json, 0.85, 100)
            .unwrap()
            .is_none());
        let far = super::super::similarity::tokenize("lower my cholesterol");
        assert!(cache
            .find_similar(&far, ResponseFormat::Text, 0.85, 100)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_disk_cache_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskCache::new(dir.path().join("cache"));
        assert_eq!(disk.len().await.unwrap(), 0);

        disk.set(entry("abc", "one", Duration::from_secs(60))).await.unwrap();
        let got = disk.get(&"abc".into()).await.unwrap().unwrap();
        assert_eq!(got.response.content, "answer for one");
        assert_eq!(disk.len().await.unwrap(), 1);

        assert!(disk.delete(&"abc".into()).await.unwrap());
        assert!(!disk.delete(&"abc".into()).await.unwrap());

        disk.set(entry("x", "two", Duration::from_secs(60))).await.unwrap();
        disk.clear().await.unwrap();
        assert_eq!(disk.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disk_cache_corrupt_file_is_cache_io_error() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("bad.json"), b"{not json").await.unwrap();
        let disk = DiskCache::new(dir.path());
        let err = disk.get(&"bad".into()).await.unwrap_err();
        assert_eq!(err.code(), crate::error_code::ErrorCode::CacheIoError);
    }

    #[tokio::test]
    async fn test_null_cache_never_stores() {
        let null = NullCache::new();
        null.set(entry("a", "one", Duration::from_secs(60))).await.unwrap();
        assert!(null.get(&"a".into()).await.unwrap().is_none());
        assert_eq!(null.name(), "null");
    }
}
