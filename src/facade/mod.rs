//! 服务门面模块：把缓存、复杂度分类、优先级队列和服务商降级链组合成一个调用入口。
//!
//! # Service Facade
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`AdaptiveAiService`] | `generate_completion`, `complete`, `stats`, `health`, `shutdown` |
//! | [`ServiceBuilder`] | Registers drivers and an optional durable cache tier |
//! | [`GenerateOutcome`] | Either a finished response or a queued handle |
//! | [`ServiceStats`] / [`HealthReport`] | Bodies of `GET /stats` and `GET /health` |
//!
//! ## Request flow
//!
//! 1. Validate (`userId`, non-empty `messages`, no blank content)
//! 2. Unless `force_fresh`, try the cache (exact, then similarity)
//! 3. Classify, unless the request carries an explicit complexity
//! 4. `critical` priority, or batching disabled: compute now. Otherwise enqueue
//! 5. Computations for the same fingerprint are coalesced and stored on success
//!
//! ```rust,no_run
//! use adaptive_ai_service::{AdaptiveAiService, CompletionRequest, Message, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> adaptive_ai_service::Result<()> {
//!     let service = AdaptiveAiService::from_config(ServiceConfig::from_env()?)?;
//!     let request = CompletionRequest::new("user-1", vec![Message::user("What are some healthy snacks?")]);
//!     let response = service.complete(request).await?;
//!     println!("{} via {}", response.content, response.provider);
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```

mod service;
mod stats;

pub use service::{AdaptiveAiService, GenerateOutcome, ServiceBuilder};
pub use stats::{HealthReport, OverallStatus, ServiceStats, ServiceStatus};
