//! Service configuration.
//!
//! Built from defaults, an optional YAML file, then environment overrides, in
//! that order. Provider API keys are only ever read from the environment (or
//! the OS keyring when `ADAPTIVE_AI_USE_KEYRING` is set), never from the file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::batch::{BatchConfig, BatchExecutorConfig, BatchStrategy, QueueLimits};
use crate::cache::CacheConfig;
use crate::routing::{ModelCatalog, OrchestratorConfig, TierModels};
use crate::transport::keyring_api_key;
use crate::types::ProviderKind;
use crate::{Error, ErrorContext, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub base_url: String,
}

impl ProviderConfig {
    fn with_base_url(base_url: &str) -> Self {
        Self {
            api_key: None,
            base_url: base_url.to_string(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::with_base_url("")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai: ProviderConfig,
    pub gemini: ProviderConfig,
    /// Fallback chain order.
    pub order: Vec<ProviderKind>,
    pub use_keyring: bool,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai: ProviderConfig::with_base_url(crate::drivers::openai::DEFAULT_BASE_URL),
            gemini: ProviderConfig::with_base_url(crate::drivers::gemini::DEFAULT_BASE_URL),
            order: ProviderKind::ALL.to_vec(),
            use_keyring: false,
        }
    }
}

impl ProvidersConfig {
    pub fn get(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Gemini => &self.gemini,
        }
    }

    fn get_mut(&mut self, kind: ProviderKind) -> &mut ProviderConfig {
        match kind {
            ProviderKind::OpenAi => &mut self.openai,
            ProviderKind::Gemini => &mut self.gemini,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: usize,
    pub similarity_threshold: f64,
    pub dir: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            max_entries: 1000,
            similarity_threshold: 0.85,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingSettings {
    pub enabled: bool,
    pub flush_interval_ms: u64,
    pub batch_size: usize,
    pub queue_limit_high: usize,
    pub queue_limit_normal: usize,
    pub queue_limit_low: usize,
    pub max_item_retries: u32,
    pub retry_backoff_ms: u64,
    /// Process a drained batch with bounded parallelism instead of one by one.
    pub max_concurrency: Option<usize>,
}

impl Default for BatchingSettings {
    fn default() -> Self {
        let limits = QueueLimits::default();
        Self {
            enabled: true,
            flush_interval_ms: 1000,
            batch_size: 5,
            queue_limit_high: limits.high,
            queue_limit_normal: limits.normal,
            queue_limit_low: limits.low,
            max_item_retries: 2,
            retry_backoff_ms: 200,
            max_concurrency: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSettings {
    pub request_timeout_secs: u64,
    pub cooldown_secs: u64,
    /// Per-provider model overrides.
    pub models: HashMap<ProviderKind, TierModels>,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            cooldown_secs: 30,
            models: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub providers: ProvidersConfig,
    pub cache: CacheSettings,
    pub batching: BatchingSettings,
    pub routing: RoutingSettings,
}

fn parse_env<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| {
        Error::configuration_with_context(
            format!("invalid value {:?}", raw),
            ErrorContext::new()
                .with_field_path(name)
                .with_source("environment"),
        )
    })
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::configuration_with_context(
            format!("invalid boolean {:?}", raw),
            ErrorContext::new()
                .with_field_path(name)
                .with_source("environment"),
        )),
    }
}

impl ServiceConfig {
    /// Defaults plus process environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_with(|k| std::env::var(k).ok())?;
        config.resolve_keyring();
        config.validate()?;
        Ok(config)
    }

    /// YAML file plus process environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("cannot read config file: {}", e),
                ErrorContext::new().with_details(path.display().to_string()),
            )
        })?;
        let mut config = Self::from_yaml_str(&text)?;
        config.apply_env_with(|k| std::env::var(k).ok())?;
        config.resolve_keyring();
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Self::from_env(),
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid YAML: {}", e),
                ErrorContext::new().with_source("config_file"),
            )
        })
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        for kind in ProviderKind::ALL {
            let prefix = kind.id().to_uppercase();
            if let Some(key) = var(&format!("{}_API_KEY", prefix)) {
                self.providers.get_mut(kind).api_key = Some(key.trim().to_string());
            }
            if let Some(url) = var(&format!("{}_BASE_URL", prefix)) {
                self.providers.get_mut(kind).base_url = url.trim().to_string();
            }
        }
        if let Some(v) = var("ADAPTIVE_AI_USE_KEYRING") {
            self.providers.use_keyring = parse_bool("ADAPTIVE_AI_USE_KEYRING", &v)?;
        }

        if let Some(v) = var("ADAPTIVE_AI_PORT") {
            self.server.port = parse_env("ADAPTIVE_AI_PORT", &v)?;
        } else if let Some(v) = var("PORT") {
            self.server.port = parse_env("PORT", &v)?;
        }

        if let Some(v) = var("ADAPTIVE_AI_CACHE_TTL_SECS") {
            self.cache.ttl_secs = parse_env("ADAPTIVE_AI_CACHE_TTL_SECS", &v)?;
        }
        if let Some(v) = var("ADAPTIVE_AI_CACHE_MAX_ENTRIES") {
            self.cache.max_entries = parse_env("ADAPTIVE_AI_CACHE_MAX_ENTRIES", &v)?;
        }
        if let Some(v) = var("ADAPTIVE_AI_CACHE_DIR") {
            self.cache.dir = Some(PathBuf::from(v.trim()));
        }
        if let Some(v) = var("ADAPTIVE_AI_SIMILARITY_THRESHOLD") {
            self.cache.similarity_threshold = parse_env("ADAPTIVE_AI_SIMILARITY_THRESHOLD", &v)?;
        }

        if let Some(v) = var("ADAPTIVE_AI_BATCHING") {
            self.batching.enabled = parse_bool("ADAPTIVE_AI_BATCHING", &v)?;
        }
        if let Some(v) = var("ADAPTIVE_AI_FLUSH_INTERVAL_MS") {
            self.batching.flush_interval_ms = parse_env("ADAPTIVE_AI_FLUSH_INTERVAL_MS", &v)?;
        }
        if let Some(v) = var("ADAPTIVE_AI_BATCH_SIZE") {
            self.batching.batch_size = parse_env("ADAPTIVE_AI_BATCH_SIZE", &v)?;
        }
        if let Some(v) = var("ADAPTIVE_AI_QUEUE_LIMIT_HIGH") {
            self.batching.queue_limit_high = parse_env("ADAPTIVE_AI_QUEUE_LIMIT_HIGH", &v)?;
        }
        if let Some(v) = var("ADAPTIVE_AI_QUEUE_LIMIT_NORMAL") {
            self.batching.queue_limit_normal = parse_env("ADAPTIVE_AI_QUEUE_LIMIT_NORMAL", &v)?;
        }
        if let Some(v) = var("ADAPTIVE_AI_QUEUE_LIMIT_LOW") {
            self.batching.queue_limit_low = parse_env("ADAPTIVE_AI_QUEUE_LIMIT_LOW", &v)?;
        }
        if let Some(v) = var("ADAPTIVE_AI_MAX_ITEM_RETRIES") {
            self.batching.max_item_retries = parse_env("ADAPTIVE_AI_MAX_ITEM_RETRIES", &v)?;
        }

        if let Some(v) = var("ADAPTIVE_AI_REQUEST_TIMEOUT_SECS") {
            self.routing.request_timeout_secs = parse_env("ADAPTIVE_AI_REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("ADAPTIVE_AI_PROVIDER_COOLDOWN_SECS") {
            self.routing.cooldown_secs = parse_env("ADAPTIVE_AI_PROVIDER_COOLDOWN_SECS", &v)?;
        }
        Ok(())
    }

    /// Fill missing API keys from the OS keyring when enabled.
    pub fn resolve_keyring(&mut self) {
        if !self.providers.use_keyring {
            return;
        }
        for kind in ProviderKind::ALL {
            let provider = self.providers.get_mut(kind);
            if provider.api_key.is_none() {
                provider.api_key = keyring_api_key(kind);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, msg: String| {
            Err(Error::configuration_with_context(
                msg,
                ErrorContext::new().with_field_path(field),
            ))
        };

        if self.batching.batch_size == 0 {
            return invalid("batching.batch_size", "batch size must be at least 1".into());
        }
        if self.batching.flush_interval_ms == 0 {
            return invalid("batching.flush_interval_ms", "flush interval must be positive".into());
        }
        if self.cache.max_entries == 0 {
            return invalid("cache.max_entries", "cache capacity must be at least 1".into());
        }
        let t = self.cache.similarity_threshold;
        if !(t > 0.0 && t <= 1.0) {
            return invalid(
                "cache.similarity_threshold",
                format!("similarity threshold {} outside (0, 1]", t),
            );
        }
        if self.routing.request_timeout_secs == 0 {
            return invalid("routing.request_timeout_secs", "request timeout must be positive".into());
        }
        for kind in ProviderKind::ALL {
            let base = &self.providers.get(kind).base_url;
            if let Err(e) = url::Url::parse(base) {
                return invalid(
                    &format!("providers.{}.base_url", kind.id()),
                    format!("malformed base URL {:?}: {}", base, e),
                );
            }
        }
        Ok(())
    }

    /// Providers with a resolved API key, in chain order.
    pub fn configured_providers(&self) -> Vec<ProviderKind> {
        self.providers
            .order
            .iter()
            .copied()
            .filter(|k| self.providers.get(*k).api_key.is_some())
            .collect()
    }

    pub fn cache_config(&self) -> CacheConfig {
        let mut config = CacheConfig::new()
            .with_enabled(self.cache.enabled)
            .with_ttl(Duration::from_secs(self.cache.ttl_secs))
            .with_max_entries(self.cache.max_entries)
            .with_similarity_threshold(self.cache.similarity_threshold);
        if let Some(dir) = &self.cache.dir {
            config = config.with_disk_dir(dir);
        }
        config
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig::new()
            .with_batch_size(self.batching.batch_size)
            .with_flush_interval(Duration::from_millis(self.batching.flush_interval_ms))
            .with_limits(QueueLimits {
                high: self.batching.queue_limit_high,
                normal: self.batching.queue_limit_normal,
                low: self.batching.queue_limit_low,
            })
    }

    pub fn executor_config(&self) -> BatchExecutorConfig {
        let strategy = match self.batching.max_concurrency {
            Some(n) if n > 1 => BatchStrategy::Concurrent { max_concurrency: n },
            _ => BatchStrategy::Sequential,
        };
        BatchExecutorConfig::new()
            .with_strategy(strategy)
            .with_max_retries(self.batching.max_item_retries)
            .with_retry_backoff(Duration::from_millis(self.batching.retry_backoff_ms))
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::new()
            .with_request_timeout(Duration::from_secs(self.routing.request_timeout_secs))
            .with_cooldown(Duration::from_secs(self.routing.cooldown_secs))
    }

    pub fn catalog(&self) -> ModelCatalog {
        self.routing
            .models
            .iter()
            .fold(ModelCatalog::default(), |catalog, (kind, models)| {
                catalog.with_models(*kind, models.clone())
            })
    }
}
