//! # adaptive-ai-service
//!
//! 自适应 AI 请求编排服务：指纹缓存、复杂度路由、优先级批处理与多服务商降级。
//!
//! Adaptive AI request orchestration. Sits between client applications and
//! upstream LLM providers and decides, per request, whether to answer from
//! cache, how capable a model the request needs, when to run it, and which
//! provider serves it.
//!
//! ## Core Behaviour
//!
//! - **Fingerprint caching**: normalized request hashing with exact and similarity hits
//! - **Coalescing**: concurrent identical requests share one upstream call
//! - **Complexity routing**: a deterministic classifier picks the model tier
//! - **Priority batching**: `high`/`normal`/`low` queues flushed on a fixed tick; `critical` bypasses them
//! - **Provider fallback**: an ordered chain with per-provider cool-down after failures
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use adaptive_ai_service::{AdaptiveAiService, CompletionRequest, Message, Priority, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> adaptive_ai_service::Result<()> {
//!     let service = AdaptiveAiService::from_config(ServiceConfig::from_env()?)?;
//!
//!     let request = CompletionRequest::new(
//!         "user-42",
//!         vec![Message::user("What are some healthy snacks?")],
//!     )
//!     .with_priority(Priority::High);
//!
//!     let response = service.complete(request).await?;
//!     println!("[{} / {}] {}", response.provider, response.model, response.content);
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`facade`] | [`AdaptiveAiService`]: the single request entry point |
//! | [`cache`] | Fingerprints, memory/disk tiers, similarity index, coalescing |
//! | [`classifier`] | Heuristic complexity scoring |
//! | [`batch`] | Priority queues, batch executor, flush worker |
//! | [`routing`] | Model catalog and provider fallback chain |
//! | [`drivers`] | OpenAI and Gemini wire formats |
//! | [`transport`] | Shared HTTP client and credential lookup |
//! | [`resilience`] | Cool-down breaker and provider health |
//! | [`supervisor`] | Restart policy for background tasks |
//! | [`server`] | axum HTTP surface |
//! | [`config`] | YAML + environment configuration |
//! | [`types`] | Requests, messages, responses |

pub mod batch;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod drivers;
pub mod error_code;
pub mod facade;
pub mod resilience;
pub mod routing;
pub mod server;
pub mod supervisor;
pub mod transport;
pub mod types;

pub use config::ServiceConfig;
pub use facade::{AdaptiveAiService, GenerateOutcome, HealthReport, ServiceBuilder, ServiceStats};
pub use types::{
    CacheType, ComplexityTier, CompletionRequest, CompletionResponse, Message, MessageRole,
    Priority, ProviderKind, ResponseFormat,
};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
