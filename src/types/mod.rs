//! # Types Module
//!
//! Core data types shared by the cache, the invoker and the transport.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`GenerationRequest`] | Immutable description of one generation call |
//! | [`GenerationResult`] | Raw text, optional parsed payload, usage and provenance |
//! | [`TokenUsage`] | Prompt/completion token counts for one network call |
//! | [`ResultSource`] | `cache` or `api` |
//! | [`Message`] | Chat message sent to the external API |
//!
//! ## Example
//!
//! ```rust
//! use resilient_llm::types::GenerationRequest;
//!
//! let req = GenerationRequest::new("List three login test cases")
//!     .with_temperature(0.0)
//!     .structured(true);
//! assert!(req.validate().is_ok());
//! ```

pub mod message;
pub mod request;
pub mod result;

pub use message::{Message, MessageRole};
pub use request::GenerationRequest;
pub use result::{GenerationResult, ResultSource, TokenUsage};
