//! 稳定错误码：定义对外暴露的错误码及其 HTTP 状态与重试语义。
//!
//! Stable error codes exposed in the JSON error envelope.
//!
//! Every [`crate::Error`] maps onto exactly one [`ErrorCode`]. The code string is
//! part of the public HTTP contract (`{"error": "<code>", "message": "..."}`) and
//! must not change between releases.
//!
//! | Code                        | HTTP | Retryable |
//! |-----------------------------|------|-----------|
//! | `validation_error`          | 400  | no        |
//! | `cancelled`                 | 408  | no        |
//! | `queue_full`                | 429  | yes       |
//! | `internal_error`            | 500  | no        |
//! | `configuration_error`       | 500  | no        |
//! | `cache_io_error`            | 500  | no        |
//! | `provider_error`            | 502  | yes       |
//! | `all_providers_unavailable` | 503  | yes       |
//! | `shutting_down`             | 503  | no        |
//!
//! ## Example
//!
//! ```rust
//! use adaptive_ai_service::error_code::ErrorCode;
//!
//! let code = ErrorCode::from_name("queue_full").unwrap();
//! assert_eq!(code.http_status(), 429);
//! assert!(code.retryable());
//! ```

use std::fmt;

/// Stable, client-facing error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Malformed request: missing user id, empty messages, bad JSON.
    ValidationError,
    /// A single upstream provider failed.
    ProviderError,
    /// Every configured provider failed or is cooling down.
    AllProvidersUnavailable,
    /// Durable cache tier failure.
    CacheIoError,
    /// The priority tier's queue is at its configured limit.
    QueueFull,
    /// The caller cancelled a queued request before it was flushed.
    Cancelled,
    /// The service no longer accepts work.
    ShuttingDown,
    /// Invalid service configuration.
    ConfigurationError,
    /// Anything else.
    InternalError,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 9] = [
        Self::ValidationError,
        Self::ProviderError,
        Self::AllProvidersUnavailable,
        Self::CacheIoError,
        Self::QueueFull,
        Self::Cancelled,
        Self::ShuttingDown,
        Self::ConfigurationError,
        Self::InternalError,
    ];

    /// Returns the wire name (e.g., `"validation_error"`).
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::ProviderError => "provider_error",
            Self::AllProvidersUnavailable => "all_providers_unavailable",
            Self::CacheIoError => "cache_io_error",
            Self::QueueFull => "queue_full",
            Self::Cancelled => "cancelled",
            Self::ShuttingDown => "shutting_down",
            Self::ConfigurationError => "configuration_error",
            Self::InternalError => "internal_error",
        }
    }

    /// HTTP status used when this code is returned by the server.
    #[inline]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ValidationError => 400,
            Self::Cancelled => 408,
            Self::QueueFull => 429,
            Self::CacheIoError | Self::ConfigurationError | Self::InternalError => 500,
            Self::ProviderError => 502,
            Self::AllProvidersUnavailable | Self::ShuttingDown => 503,
        }
    }

    /// Whether the same request may succeed if submitted again later.
    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderError | Self::AllProvidersUnavailable | Self::QueueFull
        )
    }

    /// Parse a wire name back into a code.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name() == name)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
