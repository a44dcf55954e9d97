use keyring::Entry;
use reqwest::Proxy;
use serde_json::Value;
use std::env;
use std::time::Duration;
use tracing::debug;

use crate::types::ProviderKind;
use crate::{Error, ErrorContext, Result};

const KEYRING_SERVICE: &str = "adaptive-ai-service";
const MAX_ERROR_BODY: usize = 300;

/// How the API key is attached to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `?key=<key>` query parameter
    QueryKey,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
    provider: ProviderKind,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(provider: ProviderKind, config: TransportConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(
                env::var("ADAPTIVE_AI_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Ok(proxy_url) = env::var("ADAPTIVE_AI_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder.build().map_err(|e| {
            Error::configuration_with_context(
                format!("failed to build HTTP client: {}", e),
                ErrorContext::new().with_source(provider.id()),
            )
        })?;

        Ok(Self {
            client,
            provider,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// POST a JSON body and decode a JSON reply.
    ///
    /// Transport failures, non-2xx statuses and undecodable bodies all surface
    /// as [`Error::Provider`].
    pub async fn post_json(&self, path: &str, body: &Value, auth: AuthStyle) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);

        if let Some(key) = &self.api_key {
            request = match auth {
                AuthStyle::Bearer => request.bearer_auth(key),
                AuthStyle::QueryKey => request.query(&[("key", key)]),
            };
        }

        debug!(provider = %self.provider, %url, "sending upstream request");
        let response = request.send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                "request timed out".to_string()
            } else {
                format!("transport error: {}", e)
            };
            Error::provider(self.provider.id(), reason)
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(MAX_ERROR_BODY).collect();
            return Err(Error::provider_status(
                self.provider.id(),
                status.as_u16(),
                format!("HTTP {}: {}", status.as_u16(), snippet),
            ));
        }

        response.json::<Value>().await.map_err(|e| {
            Error::provider(self.provider.id(), format!("malformed payload: {}", e))
        })
    }
}

/// Look up a provider API key in the OS keyring.
pub fn keyring_api_key(provider: ProviderKind) -> Option<String> {
    Entry::new(KEYRING_SERVICE, provider.id())
        .ok()
        .and_then(|entry| entry.get_password().ok())
        .filter(|key| !key.trim().is_empty())
}
