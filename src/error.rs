use std::time::Duration;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "request.temperature", "config.max_retries")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected range, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "openai_transport", "request_validator")
    pub source: Option<String>,
    /// HTTP status reported by the remote side, when there was one.
    pub status_code: Option<u16>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
            status_code: None,
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

    pub fn with_status_code(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a single retriable attempt failed.
///
/// Only the last one survives into [`Error::ExhaustedRetries`]; callers never
/// see these while retries remain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptFailure {
    #[error("attempt timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    #[error("transient failure{}: {message}", format_status(.status))]
    Transient {
        status: Option<u16>,
        message: String,
    },

    #[error("throttled by upstream{}: {message}", format_retry_after(.retry_after))]
    Throttled {
        retry_after: Option<Duration>,
        message: String,
    },
}

/// Unified error type for the invocation layer.
///
/// Only `Fatal` and `ExhaustedRetries` come out of a network attempt; the
/// remaining variants cover request/config validation and local plumbing.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Fatal API error: {message}{}", format_context(.context))]
    Fatal {
        message: String,
        context: ErrorContext,
    },

    #[error("Exhausted retries after {attempts} attempts; last failure: {last}")]
    ExhaustedRetries { attempts: u32, last: AttemptFailure },

    #[error("Generation cancelled by caller")]
    Cancelled,

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(status) = ctx.status_code {
        parts.push(format!("status: {}", status));
    }
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

fn format_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

fn format_retry_after(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(" (retry after {}s)", d.as_secs_f64()))
        .unwrap_or_default()
}

impl Error {
    /// Create a fatal (never retried) error with structured context
    pub fn fatal_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Fatal {
            message: msg.into(),
            context,
        }
    }

    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
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

    /// Whether repeating the same `generate()` later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ExhaustedRetries { .. } | Error::Cancelled)
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Fatal { context, .. }
            | Error::Configuration { context, .. }
            | Error::Validation { context, .. } => Some(context),
            _ => None,
        }
    }
}
