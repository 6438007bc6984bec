//! # Network Boundary
//!
//! The invoker never talks HTTP itself. It calls an injected [`ExternalApi`],
//! which reports every attempt as a tagged [`CallOutcome`]; retry policy is
//! then a pure function of that tag.
//!
//! | Outcome | Invoker reaction |
//! |---------|------------------|
//! | `Success` | account usage, cache, return |
//! | `Throttled` | record the shared deadline, wait, retry |
//! | `Transient` | back off, retry |
//! | `Fatal` | fail immediately |

pub mod http;

use async_trait::async_trait;
use std::time::Duration;

use crate::structured::JsonMode;
use crate::types::{GenerationRequest, Message, TokenUsage};

pub use http::{OpenAiTransport, TransportError};

/// Everything one network attempt needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    pub messages: Vec<Message>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Deadline the transport should apply on its side as well.
    pub timeout: Duration,
    pub json_mode: JsonMode,
}

impl ApiCall {
    pub fn from_request(request: &GenerationRequest, timeout: Duration) -> Self {
        Self {
            messages: request.messages(),
            model: request.model().to_string(),
            temperature: request.temperature(),
            max_tokens: request.max_tokens(),
            timeout,
            json_mode: JsonMode::from(request.is_structured()),
        }
    }
}

/// Text and token counts from a successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// Result of one network attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Success(Completion),
    Throttled {
        retry_after: Option<Duration>,
        message: String,
    },
    Transient {
        status: Option<u16>,
        message: String,
    },
    Fatal {
        status: Option<u16>,
        message: String,
    },
}

impl CallOutcome {
    pub fn success(text: impl Into<String>, usage: TokenUsage) -> Self {
        CallOutcome::Success(Completion {
            text: text.into(),
            usage,
        })
    }

    pub fn transient(message: impl Into<String>) -> Self {
        CallOutcome::Transient {
            status: None,
            message: message.into(),
        }
    }

    pub fn throttled(retry_after: Option<Duration>) -> Self {
        CallOutcome::Throttled {
            retry_after,
            message: "rate limited".to_string(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        CallOutcome::Fatal {
            status: None,
            message: message.into(),
        }
    }
}

/// The single external call primitive.
///
/// Dropping the returned future must abandon the call; the invoker relies on
/// this for per-attempt timeouts and caller cancellation.
#[async_trait]
pub trait ExternalApi: Send + Sync {
    async fn call(&self, call: &ApiCall) -> CallOutcome;
}

/// Map a non-success HTTP status onto an outcome tag.
///
/// - 429 is throttling.
/// - 408, 409, 425 and every 5xx are worth retrying.
/// - Anything else (401, 403, 400, 404, 422, ...) will not improve on retry.
pub fn classify_status(status: u16, retry_after: Option<Duration>, message: String) -> CallOutcome {
    match status {
        429 => CallOutcome::Throttled {
            retry_after,
            message,
        },
        408 | 409 | 425 | 500..=599 => CallOutcome::Transient {
            status: Some(status),
            message,
        },
        _ => CallOutcome::Fatal {
            status: Some(status),
            message,
        },
    }
}
