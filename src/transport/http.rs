use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Proxy;
use serde::Deserialize;
use std::env;
use std::time::Duration;
use tracing::debug;

use super::{classify_status, ApiCall, CallOutcome, ExternalApi};
use crate::types::TokenUsage;
use crate::{Error, ErrorContext, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible Chat Completions client.
///
/// Env:
/// - `OPENAI_API_KEY` (required by [`OpenAiTransport::from_env`])
/// - `OPENAI_BASE_URL` (default `https://api.openai.com/v1`)
/// - `AI_PROXY_URL` (optional proxy for all traffic)
pub struct OpenAiTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl OpenAiTransport {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::configuration_with_context(
                "API key must not be empty",
                ErrorContext::new()
                    .with_field_path("OPENAI_API_KEY")
                    .with_source("openai_transport"),
            ));
        }

        let mut builder = reqwest::Client::builder().pool_idle_timeout(Some(Duration::from_secs(90)));
        if let Ok(proxy_url) = env::var("AI_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }
        let client = builder
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Build from `OPENAI_API_KEY` / `OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| {
            Error::configuration_with_context(
                "Set OPENAI_API_KEY in environment to use LLM features",
                ErrorContext::new()
                    .with_field_path("OPENAI_API_KEY")
                    .with_source("openai_transport"),
            )
        })?;
        let base_url = env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(api_key, base_url)
    }

    fn request_body(call: &ApiCall) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": call.model,
            "messages": call.messages,
            "temperature": call.temperature,
            "max_tokens": call.max_tokens,
        });
        if let Some(format) = call.json_mode.to_openai_format() {
            body["response_format"] = format;
        }
        body
    }

    fn header_first(headers: &HeaderMap, names: &[&str]) -> Option<String> {
        for name in names {
            if let Some(v) = headers.get(*name) {
                if let Ok(s) = v.to_str() {
                    let s = s.trim();
                    if !s.is_empty() {
                        return Some(s.to_string());
                    }
                }
            }
        }
        None
    }

    /// Server wait hint, in order of preference: `retry-after-ms`, then
    /// `Retry-After` as delta-seconds or as an HTTP-date. A date in the past
    /// means "now". Values that do not fit a `Duration` are ignored.
    fn retry_after(headers: &HeaderMap) -> Option<Duration> {
        if let Some(ms) = Self::header_first(headers, &["retry-after-ms"])
            .and_then(|v| v.parse::<u64>().ok())
        {
            return Some(Duration::from_millis(ms));
        }
        let raw = Self::header_first(headers, &["retry-after"])?;
        if let Ok(secs) = raw.parse::<f64>() {
            return Duration::try_from_secs_f64(secs).ok();
        }
        let at = chrono::DateTime::parse_from_rfc2822(&raw).ok()?;
        Some(
            (at.with_timezone(&chrono::Utc) - chrono::Utc::now())
                .to_std()
                .unwrap_or_default(),
        )
    }

    /// Prefer the OpenAI-style `error.message`; fall back to the raw body.
    fn error_message(body: &str) -> String {
        serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .map(|s| s.to_string())
            })
            .unwrap_or_else(|| body.to_string())
    }

    fn from_reqwest_error(e: reqwest::Error) -> CallOutcome {
        if e.is_builder() {
            return CallOutcome::fatal(format!("invalid request: {}", e));
        }
        let status = e.status().map(|s| s.as_u16());
        let message = if e.is_timeout() {
            format!("request timed out: {}", e)
        } else if e.is_connect() {
            format!("connection failed: {}", e)
        } else {
            e.to_string()
        };
        CallOutcome::Transient { status, message }
    }

    fn parse_completion(body: &str) -> CallOutcome {
        let parsed: ChatCompletionResponse = match serde_json::from_str(body) {
            Ok(p) => p,
            Err(e) => return CallOutcome::transient(format!("unparsable completion body: {}", e)),
        };
        let text = parsed
            .choices
            .into_iter()
            .filter_map(|c| c.message.and_then(|m| m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let usage = parsed
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();
        CallOutcome::success(text, usage)
    }
}

#[async_trait]
impl ExternalApi for OpenAiTransport {
    async fn call(&self, call: &ApiCall) -> CallOutcome {
        let url = format!("{}/chat/completions", self.base_url);
        let resp = match self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(call.timeout)
            .json(&Self::request_body(call))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return Self::from_reqwest_error(e),
        };

        let status = resp.status().as_u16();
        let retry_after = Self::retry_after(resp.headers());
        let request_id = Self::header_first(resp.headers(), &["x-request-id", "request-id"]);
        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => return Self::from_reqwest_error(e),
        };

        debug!(
            http_status = status,
            request_id = request_id.as_deref().unwrap_or(""),
            model = call.model.as_str(),
            "chat completion response"
        );

        if (200..300).contains(&status) {
            Self::parse_completion(&body)
        } else {
            classify_status(status, retry_after, Self::error_message(&body))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport error: {0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structured::JsonMode;
    use crate::types::Message;
    use reqwest::header::HeaderValue;

    fn call(json_mode: JsonMode) -> ApiCall {
        ApiCall {
            messages: vec![Message::user("hi")],
            model: "gpt-4o-mini".into(),
            temperature: 0.2,
            max_tokens: 16,
            timeout: Duration::from_secs(5),
            json_mode,
        }
    }

    #[test]
    fn test_request_body_json_mode() {
        let body = OpenAiTransport::request_body(&call(JsonMode::Json));
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "user");

        let body = OpenAiTransport::request_body(&call(JsonMode::Off));
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_retry_after_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(OpenAiTransport::retry_after(&headers), None);

        headers.insert("retry-after", HeaderValue::from_static("5"));
        assert_eq!(
            OpenAiTransport::retry_after(&headers),
            Some(Duration::from_secs(5))
        );

        headers.insert("retry-after-ms", HeaderValue::from_static("1500"));
        assert_eq!(
            OpenAiTransport::retry_after(&headers),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_retry_after_out_of_range_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("99999999999999999999"));
        assert_eq!(OpenAiTransport::retry_after(&headers), None);

        headers.insert("retry-after", HeaderValue::from_static("1e300"));
        assert_eq!(OpenAiTransport::retry_after(&headers), None);

        headers.insert("retry-after", HeaderValue::from_static("-3"));
        assert_eq!(OpenAiTransport::retry_after(&headers), None);

        headers.insert("retry-after", HeaderValue::from_static("NaN"));
        assert_eq!(OpenAiTransport::retry_after(&headers), None);

        headers.insert("retry-after", HeaderValue::from_static("0.25"));
        assert_eq!(
            OpenAiTransport::retry_after(&headers),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_retry_after_http_date() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "retry-after",
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(OpenAiTransport::retry_after(&headers), Some(Duration::ZERO));

        let later = (chrono::Utc::now() + chrono::Duration::seconds(120))
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();
        headers.insert("retry-after", HeaderValue::from_str(&later).unwrap());
        let wait = OpenAiTransport::retry_after(&headers).unwrap();
        assert!(wait > Duration::from_secs(100) && wait <= Duration::from_secs(120));

        headers.insert("retry-after", HeaderValue::from_static("soon"));
        assert_eq!(OpenAiTransport::retry_after(&headers), None);
    }

    #[test]
    fn test_parse_completion_joins_choices() {
        let body = r#"{
            "choices": [
                {"message": {"role": "assistant", "content": "a"}},
                {"message": {"role": "assistant", "content": "b"}}
            ],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        assert_eq!(
            OpenAiTransport::parse_completion(body),
            CallOutcome::success("a\nb", TokenUsage::new(10, 5))
        );
    }

    #[test]
    fn test_parse_completion_garbage_is_transient() {
        assert!(matches!(
            OpenAiTransport::parse_completion("<html>bad gateway</html>"),
            CallOutcome::Transient { .. }
        ));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            OpenAiTransport::error_message(r#"{"error": {"message": "Incorrect API key"}}"#),
            "Incorrect API key"
        );
        assert_eq!(OpenAiTransport::error_message("plain"), "plain");
    }

    #[test]
    fn test_client_build_failure_is_a_transport_error() {
        let err: Error = TransportError::Other("tls backend unavailable".into()).into();
        assert!(matches!(err, Error::Transport(TransportError::Other(_))));
        assert!(err.to_string().contains("tls backend unavailable"));
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(
            OpenAiTransport::new("  ", DEFAULT_BASE_URL),
            Err(Error::Configuration { .. })
        ));
    }
}
