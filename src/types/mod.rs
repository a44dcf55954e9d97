//! 类型系统模块：定义请求、消息与响应等核心数据类型。
//!
//! # Types Module
//!
//! Core data types shared by the cache, classifier, queue, orchestrator and facade.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Message`] | Chat message with role and content |
//! | [`CompletionRequest`] | Caller-owned request submitted to the service |
//! | [`Priority`] | Queue scheduling tier (critical, high, normal, low) |
//! | [`ComplexityTier`] | Model-selection tier (low .. very_high) |
//! | [`CompletionResponse`] | Computed or cached completion with metadata |
//!
//! ## Submodules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`message`] | Chat messages and roles |
//! | [`request`] | Request, priority, complexity and provider identifiers |
//! | [`response`] | Completion response and cache tagging |

pub mod message;
pub mod request;
pub mod response;

pub use message::{Message, MessageRole};
pub use request::{ComplexityTier, CompletionRequest, Priority, ProviderKind, ResponseFormat};
pub use response::{CacheType, CompletionResponse};
