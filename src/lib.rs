//! # resilient-llm
//!
//! A cached, retrying, rate-limit-aware client for LLM text generation.
//!
//! ## Overview
//!
//! Every `generate()` call goes through one pipeline:
//!
//! - **Cache**: identical requests are answered from a TTL cache (memory or
//!   disk) without touching the network.
//! - **Retries**: transient failures and timeouts back off exponentially, up
//!   to a bounded number of attempts.
//! - **Rate limiting**: a throttle response with a retry-after hint makes every
//!   call sharing the same [`UsageTracker`](usage::UsageTracker) wait until the
//!   deadline passes.
//! - **Accounting**: token usage from genuine network calls is aggregated.
//! - **Structured output**: JSON requests come back parsed, or flagged invalid.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resilient_llm::{GenerationRequest, ResilientInvoker};
//!
//! #[tokio::main]
//! async fn main() -> resilient_llm::Result<()> {
//!     resilient_llm::telemetry::init_tracing();
//!     let invoker = ResilientInvoker::from_env()?;
//!
//!     let req = GenerationRequest::new("List three primes as a JSON array under \"primes\"")
//!         .structured(true);
//!     let result = invoker.generate(&req).await?;
//!     println!("{:?} (valid: {})", result.parsed, result.valid);
//!     println!("{:?}", invoker.usage_snapshot());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`invoker`] | The resilient invoker, its builder and retry policy |
//! | [`cache`] | Cache keys, store trait, memory and disk backends |
//! | [`transport`] | External API trait, outcome tags, OpenAI transport |
//! | [`usage`] | Shared usage counters and rate-limit deadline |
//! | [`structured`] | JSON-mode handling and lenient JSON extraction |
//! | [`config`] | Invoker configuration (defaults, YAML, environment) |
//! | [`types`] | Requests, messages and results |
//! | [`telemetry`] | `tracing` subscriber setup |

pub mod cache;
pub mod config;
pub mod invoker;
pub mod structured;
pub mod telemetry;
pub mod transport;
pub mod types;
pub mod usage;

// Re-export main types for convenience
pub use cache::{CacheKey, CacheStats, CacheStore};
pub use config::InvokerConfig;
pub use invoker::{InvokerBuilder, ResilientInvoker};
pub use transport::{ApiCall, CallOutcome, ExternalApi};
pub use types::{GenerationRequest, GenerationResult, Message, MessageRole, ResultSource, TokenUsage};
pub use usage::{UsageSnapshot, UsageTracker};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{AttemptFailure, Error, ErrorContext};
