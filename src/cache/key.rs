//! Cache key generation.
//!
//! The fingerprint is part of the on-disk format, so the canonical encoding
//! is fixed:
//!
//! 1. the version tag `resilient-llm/v1`
//! 2. model, then prompt, each as `u64` LE byte length followed by UTF-8 bytes
//! 3. structured flag as one byte (`0`/`1`)
//! 4. temperature as the IEEE-754 bits of the `f64` as `u64` LE (`-0.0` folded to `0.0`)
//! 5. max tokens as `u32` LE
//!
//! The SHA-256 digest of that byte stream, lower-case hex, is the key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::GenerationRequest;

const KEY_VERSION: &str = "resilient-llm/v1";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub hash: String,
    pub model: Option<String>,
}

impl CacheKey {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Fingerprint a request. Pure; identical fields give identical keys on any run.
    pub fn from_request(request: &GenerationRequest) -> Self {
        let digest = fingerprint(
            request.model(),
            request.prompt(),
            request.is_structured(),
            request.temperature(),
            request.max_tokens(),
        );
        Self::new(digest).with_model(request.model())
    }

    pub fn as_str(&self) -> &str {
        &self.hash
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        self.hash.get(..12).unwrap_or(&self.hash)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hash)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

fn update_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

fn fingerprint(
    model: &str,
    prompt: &str,
    structured: bool,
    temperature: f64,
    max_tokens: u32,
) -> String {
    let temperature = if temperature == 0.0 { 0.0 } else { temperature };

    let mut hasher = Sha256::new();
    update_str(&mut hasher, KEY_VERSION);
    update_str(&mut hasher, model);
    update_str(&mut hasher, prompt);
    hasher.update([structured as u8]);
    hasher.update(temperature.to_bits().to_le_bytes());
    hasher.update(max_tokens.to_le_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
