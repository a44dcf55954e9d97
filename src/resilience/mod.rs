//! 弹性模式模块：熔断冷却与服务商健康状态跟踪。
//!
//! # Resilience Primitives Module
//!
//! Bookkeeping the orchestrator uses to keep failing providers out of the
//! fallback chain for a while.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`circuit_breaker`] | Failure counter that opens for a cool-down window |
//! | [`health`] | Per-provider availability, usage count and last error |
//!
//! ## Circuit Breaker
//!
//! - **Closed**: calls pass through
//! - **Open**: the provider is degraded and skipped until the cool-down ends
//! - After the cool-down the breaker closes and the next call acts as a probe
//!
//! ```rust
//! use adaptive_ai_service::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::new(
//!     CircuitBreakerConfig::new()
//!         .with_failure_threshold(1)
//!         .with_cooldown(Duration::from_secs(30)),
//! );
//! assert!(breaker.allow());
//! breaker.on_failure("HTTP 503");
//! assert!(!breaker.allow());
//! ```

pub mod circuit_breaker;
pub mod health;

pub use circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot};
pub use health::{ProviderHealth, ProviderHealthSnapshot};
