//! Generation request and its builder-style constructors.

use serde::{Deserialize, Serialize};

use super::message::Message;
use crate::{Error, ErrorContext, Result};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f64 = 0.2;
pub const DEFAULT_MAX_TOKENS: u32 = 800;

/// One text-generation request.
///
/// Fields are private so a request cannot change after it has been
/// fingerprinted; use the `with_*` constructors to derive variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    prompt: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    structured: bool,
    cache_enabled: bool,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            structured: false,
            cache_enabled: true,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Ask for machine-parseable (JSON) output and enable the validation path.
    pub fn structured(mut self, structured: bool) -> Self {
        self.structured = structured;
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn is_structured(&self) -> bool {
        self.structured
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    /// Messages sent to the external API for this request.
    pub fn messages(&self) -> Vec<Message> {
        vec![Message::user(self.prompt.clone())]
    }

    /// Pre-flight guard: reject requests the API would refuse anyway.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(Error::validation_with_context(
                "prompt must not be empty",
                ErrorContext::new()
                    .with_field_path("request.prompt")
                    .with_source("request_validator"),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(Error::validation_with_context(
                "model must not be empty",
                ErrorContext::new()
                    .with_field_path("request.model")
                    .with_source("request_validator"),
            ));
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::validation_with_context(
                "temperature must be within 0.0..=2.0",
                ErrorContext::new()
                    .with_field_path("request.temperature")
                    .with_details(format!("got {}", self.temperature))
                    .with_source("request_validator"),
            ));
        }
        if self.max_tokens == 0 {
            return Err(Error::validation_with_context(
                "max_tokens must be positive",
                ErrorContext::new()
                    .with_field_path("request.max_tokens")
                    .with_source("request_validator"),
            ));
        }
        Ok(())
    }
}
