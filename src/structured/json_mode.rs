//! JSON mode support for structured output.
//!
//! Requests JSON from OpenAI-compatible APIs and tolerantly extracts it from
//! what comes back.

use once_cell::sync::Lazy;
use regex::Regex;

/// JSON mode options for structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsonMode {
    /// Standard JSON mode - asks the API for a JSON object
    Json,

    /// Disabled - no JSON mode enforcement
    Off,
}

impl JsonMode {
    /// Get the string representation for API requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            JsonMode::Json => "json_object",
            JsonMode::Off => "",
        }
    }

    /// `response_format` body fragment for the Chat Completions API.
    pub fn to_openai_format(&self) -> Option<serde_json::Value> {
        match self {
            JsonMode::Json => Some(serde_json::json!({ "type": self.as_str() })),
            JsonMode::Off => None,
        }
    }
}

impl From<bool> for JsonMode {
    fn from(structured: bool) -> Self {
        if structured {
            JsonMode::Json
        } else {
            JsonMode::Off
        }
    }
}

impl std::fmt::Display for JsonMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JsonMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json_object" => Ok(JsonMode::Json),
            "off" | "" => Ok(JsonMode::Off),
            _ => Err(format!("Unknown JSON mode: {}", s)),
        }
    }
}

// Tried in order after a direct parse fails.
static EXTRACTORS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"```json\s*([\s\S]*?)\s*```",
        r"```\s*([\s\S]*?)\s*```",
        r"\{[\s\S]*\}",
        r"\[[\s\S]*\]",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Raw model output plus whatever JSON could be recovered from it.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredOutput {
    raw: String,
    parsed: Option<serde_json::Value>,
}

impl StructuredOutput {
    /// Parse a response; never fails, an unparsable body just has no `parsed` value.
    ///
    /// ```
    /// use resilient_llm::structured::StructuredOutput;
    ///
    /// let out = StructuredOutput::parse("not json");
    /// assert!(!out.is_valid());
    /// assert_eq!(out.raw(), "not json");
    /// ```
    pub fn parse(content: impl Into<String>) -> Self {
        let raw = content.into();
        let parsed = Self::parse_json(raw.trim());
        Self { raw, parsed }
    }

    /// Parse JSON from text, with support for markdown code blocks.
    ///
    /// Extracts JSON from common formats:
    /// - Raw JSON value
    /// - ```json ... ``` code blocks
    /// - ``` ... ``` code blocks
    /// - Text containing JSON objects/arrays
    fn parse_json(text: &str) -> Option<serde_json::Value> {
        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(text) {
            return Some(parsed);
        }

        for re in EXTRACTORS.iter() {
            if let Some(captures) = re.captures(text) {
                let candidate = match captures.get(1) {
                    Some(inner) => inner.as_str(),
                    None => captures.get(0).map(|c| c.as_str()).unwrap_or(text),
                };

                if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(candidate.trim()) {
                    return Some(parsed);
                }
            }
        }

        None
    }

    pub fn is_valid(&self) -> bool {
        self.parsed.is_some()
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn parsed(&self) -> Option<&serde_json::Value> {
        self.parsed.as_ref()
    }

    pub fn into_parts(self) -> (String, Option<serde_json::Value>) {
        (self.raw, self.parsed)
    }
}
