//! 响应缓存模块：基于请求指纹的精确/相似缓存与并发请求合并。
//!
//! # Fingerprint Cache Module
//!
//! This module caches computed completions under a *fingerprint* of the
//! normalized request content, so repeated questions skip the upstream call.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`FingerprintCache`] | Memory + optional disk tiers, exact and similarity lookups, statistics |
//! | [`CacheConfig`] | TTL, capacity, similarity threshold and disk directory |
//! | [`CacheBackend`] | Trait for cache tiers |
//! | [`MemoryCache`] | In-memory LRU tier |
//! | [`DiskCache`] | Durable JSON-file tier |
//! | [`NullCache`] | No-op tier |
//! | [`Fingerprint`] / [`FingerprintGenerator`] | Normalized request hashing |
//! | [`Coalescer`] | Merges concurrent computations for the same fingerprint |
//!
//! ## Example
//!
//! ```rust
//! use adaptive_ai_service::cache::{CacheConfig, FingerprintCache};
//! use std::time::Duration;
//!
//! let config = CacheConfig::new()
//!     .with_ttl(Duration::from_secs(600))
//!     .with_max_entries(500);
//! let cache = FingerprintCache::new(config);
//! assert_eq!(cache.stats().size, 0);
//! ```
//!
//! ## Fingerprints
//!
//! Message content is case-folded and whitespace-collapsed before hashing, so
//! `"What are  some Healthy snacks?"` and `"what are some healthy snacks?"` share a
//! fingerprint. Near-duplicates that differ in punctuation or a word or two are
//! caught by the similarity index instead.

mod backend;
mod coalesce;
mod key;
mod manager;
mod similarity;

pub use backend::{CacheBackend, CacheEntry, DiskCache, MemoryCache, NullCache};
pub use coalesce::Coalescer;
pub use key::{normalize, Fingerprint, FingerprintGenerator};
pub use manager::{CacheConfig, CacheHit, CacheStats, FingerprintCache};
pub use similarity::{jaccard, tokenize};
