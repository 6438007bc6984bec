//! Structured output module.
//!
//! - `JsonMode`: whether the external API is asked for JSON
//! - `StructuredOutput`: raw text plus the JSON recovered from it
//!
//! A parse failure is data, not an error: the invoker reports it through
//! `GenerationResult::valid`.

pub mod json_mode;

pub use json_mode::{JsonMode, StructuredOutput};
