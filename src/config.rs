//! Invoker configuration.
//!
//! Sources, lowest precedence first: [`InvokerConfig::default`], a YAML file
//! ([`InvokerConfig::from_file`]), then `RESILIENT_LLM_*` environment
//! variables ([`InvokerConfig::with_env_overrides`]).
//!
//! ```yaml
//! cache_enabled: true
//! cache_ttl_secs: 86400
//! cache_dir: .cache
//! max_retries: 3
//! backoff_base_secs: 2
//! timeout_secs: 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, ErrorContext, Result};

const ENV_PREFIX: &str = "RESILIENT_LLM_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokerConfig {
    /// Bypass the cache store entirely when false.
    pub cache_enabled: bool,
    #[serde(rename = "cache_ttl_secs", with = "duration_secs")]
    pub cache_ttl: Duration,
    /// Directory for the disk cache; `None` keeps entries in memory.
    pub cache_dir: Option<PathBuf>,
    /// Capacity of the in-memory cache.
    pub cache_max_entries: usize,
    /// Total network attempts per `generate()` call.
    pub max_retries: u32,
    #[serde(rename = "backoff_base_secs", with = "duration_secs")]
    pub backoff_base: Duration,
    /// Cap on computed backoff; an explicit server retry-after is not capped.
    #[serde(rename = "max_backoff_secs", with = "duration_secs")]
    pub max_backoff: Duration,
    /// Per-attempt network deadline.
    #[serde(rename = "timeout_secs", with = "duration_secs")]
    pub timeout: Duration,
    /// Collapse concurrent identical requests onto one network call.
    pub dedupe_inflight: bool,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            cache_dir: None,
            cache_max_entries: 1000,
            max_retries: 3,
            backoff_base: Duration::from_secs(2),
            max_backoff: Duration::from_secs(120),
            timeout: Duration::from_secs(30),
            dedupe_inflight: false,
        }
    }
}

impl InvokerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn with_max_backoff(mut self, cap: Duration) -> Self {
        self.max_backoff = cap;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_dedupe_inflight(mut self, enabled: bool) -> Self {
        self.dedupe_inflight = enabled;
        self
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(yaml)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides(|k| std::env::var(k).ok())
    }

    /// Overlay `RESILIENT_LLM_*` values from `lookup`.
    ///
    /// Recognized: `CACHE_ENABLED`, `CACHE_TTL_SECS`, `CACHE_DIR`,
    /// `CACHE_MAX_ENTRIES`, `MAX_RETRIES`, `BACKOFF_BASE_MS`,
    /// `MAX_BACKOFF_SECS`, `TIMEOUT_SECS`, `DEDUPE_INFLIGHT`.
    /// Values that fail to parse are ignored.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = get("CACHE_ENABLED").and_then(|s| parse_bool(&s)) {
            self.cache_enabled = v;
        }
        if let Some(v) = get("CACHE_TTL_SECS").and_then(|s| s.parse::<u64>().ok()) {
            self.cache_ttl = Duration::from_secs(v);
        }
        if let Some(v) = get("CACHE_DIR").filter(|s| !s.trim().is_empty()) {
            self.cache_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("CACHE_MAX_ENTRIES").and_then(|s| s.parse::<usize>().ok()) {
            self.cache_max_entries = v;
        }
        if let Some(v) = get("MAX_RETRIES").and_then(|s| s.parse::<u32>().ok()) {
            self.max_retries = v;
        }
        if let Some(v) = get("BACKOFF_BASE_MS").and_then(|s| s.parse::<u64>().ok()) {
            self.backoff_base = Duration::from_millis(v);
        }
        if let Some(v) = get("MAX_BACKOFF_SECS").and_then(|s| s.parse::<u64>().ok()) {
            self.max_backoff = Duration::from_secs(v);
        }
        if let Some(v) = get("TIMEOUT_SECS").and_then(|s| s.parse::<u64>().ok()) {
            self.timeout = Duration::from_secs(v);
        }
        if let Some(v) = get("DEDUPE_INFLIGHT").and_then(|s| parse_bool(&s)) {
            self.dedupe_inflight = v;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |field: &str, msg: &str| -> Result<()> {
            Err(Error::configuration_with_context(
                msg.to_string(),
                ErrorContext::new()
                    .with_field_path(format!("config.{}", field))
                    .with_source("invoker_config"),
            ))
        };
        if self.max_retries == 0 {
            return fail("max_retries", "max_retries must allow at least one attempt");
        }
        if self.timeout.is_zero() {
            return fail("timeout_secs", "timeout must be positive");
        }
        if self.cache_enabled && self.cache_ttl.is_zero() {
            return fail("cache_ttl_secs", "cache ttl must be positive when caching is enabled");
        }
        if self.cache_max_entries == 0 {
            return fail("cache_max_entries", "cache_max_entries must be positive");
        }
        Ok(())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
