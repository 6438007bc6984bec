use serde::{Deserialize, Serialize};

/// Tokens consumed by one network call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Cache,
    Api,
}

/// Outcome of a successful `generate()`.
///
/// `valid` is only ever false for structured requests whose output did not
/// parse; `raw` is always preserved so callers can fall back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub raw: String,
    pub parsed: Option<serde_json::Value>,
    pub valid: bool,
    /// Zero when served from cache.
    pub usage: TokenUsage,
    pub source: ResultSource,
    /// Network attempts made; zero for cache hits.
    pub attempts: u32,
}

impl GenerationResult {
    pub fn is_cached(&self) -> bool {
        self.source == ResultSource::Cache
    }
}
