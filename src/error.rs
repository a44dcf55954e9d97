use crate::error_code::ErrorCode;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path that caused the error (e.g., "request.messages[0].content")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "disk_cache", "request_validator")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the orchestration service.
///
/// The type is `Clone` so that one computation's outcome can be handed to every
/// coalesced waiter.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Provider error ({provider}): {message}")]
    Provider {
        provider: String,
        message: String,
        status: Option<u16>,
    },

    #[error("All providers unavailable: {}", .attempts.join("; "))]
    AllProvidersUnavailable {
        attempts: Vec<String>,
        retry_after_secs: u64,
    },

    #[error("Cache I/O error: {message}{}", format_context(.context))]
    CacheIo {
        message: String,
        context: ErrorContext,
    },

    #[error("Queue for tier '{tier}' is full ({limit} items)")]
    QueueFull { tier: String, limit: usize },

    #[error("Request cancelled before processing")]
    Cancelled,

    #[error("Service is shutting down")]
    ShuttingDown,

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Create a new durable-cache error with structured context
    pub fn cache_io_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::CacheIo {
            message: msg.into(),
            context,
        }
    }

    pub fn provider(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            message: msg.into(),
            status: None,
        }
    }

    pub fn provider_status(provider: impl Into<String>, status: u16, msg: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            message: msg.into(),
            status: Some(status),
        }
    }

    /// Stable code for the JSON error envelope.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Validation { .. } => ErrorCode::ValidationError,
            Error::Provider { .. } => ErrorCode::ProviderError,
            Error::AllProvidersUnavailable { .. } => ErrorCode::AllProvidersUnavailable,
            Error::CacheIo { .. } => ErrorCode::CacheIoError,
            Error::QueueFull { .. } => ErrorCode::QueueFull,
            Error::Cancelled => ErrorCode::Cancelled,
            Error::ShuttingDown => ErrorCode::ShuttingDown,
            Error::Configuration { .. } => ErrorCode::ConfigurationError,
            Error::Serialization(_) | Error::Runtime { .. } => ErrorCode::InternalError,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.code().retryable()
    }

    /// Suggested `Retry-After` in seconds, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Error::AllProvidersUnavailable {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            Error::ShuttingDown => Some(5),
            _ => None,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Validation { context, .. }
            | Error::CacheIo { context, .. }
            | Error::Configuration { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::cache_io_with_context(e.to_string(), ErrorContext::new().with_source("io"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_rendered_in_display() {
        let err = Error::validation_with_context(
            "userId is required",
            ErrorContext::new()
                .with_field_path("userId")
                .with_source("request_validator"),
        );
        let s = err.to_string();
        assert!(s.contains("userId is required"));
        assert!(s.contains("field: userId"));
        assert!(s.contains("source: request_validator"));
    }

    #[test]
    fn test_codes_and_retry_after() {
        let err = Error::AllProvidersUnavailable {
            attempts: vec!["openai: timeout".into(), "gemini: HTTP 500".into()],
            retry_after_secs: 30,
        };
        assert_eq!(err.code(), ErrorCode::AllProvidersUnavailable);
        assert_eq!(err.retry_after_secs(), Some(30));
        assert!(err.to_string().contains("openai: timeout; gemini: HTTP 500"));

        assert_eq!(Error::Cancelled.code().http_status(), 408);
        assert!(Error::provider("openai", "boom").is_retryable());
    }

    #[test]
    fn test_io_error_maps_to_cache_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io.into();
        assert_eq!(err.code(), ErrorCode::CacheIoError);
    }
}
