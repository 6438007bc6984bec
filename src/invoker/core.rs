use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::builder::InvokerBuilder;
use super::policy::{Decision, RetryPolicy};
use crate::cache::{CacheKey, CacheStats, ResponseCache};
use crate::config::InvokerConfig;
use crate::error::AttemptFailure;
use crate::structured::StructuredOutput;
use crate::transport::{ApiCall, CallOutcome, Completion, ExternalApi};
use crate::types::{GenerationRequest, GenerationResult, ResultSource, TokenUsage};
use crate::usage::{UsageSnapshot, UsageTracker};
use crate::{Error, ErrorContext, Result};

/// Per-key lock plus the number of live slots (holder and waiters) on it.
#[derive(Default)]
pub(crate) struct InflightEntry {
    lock: Arc<tokio::sync::Mutex<()>>,
    users: usize,
}

type InflightMap = HashMap<String, InflightEntry>;

/// Cached, retrying, throttle-aware front end to an [`ExternalApi`].
///
/// Cheap to share behind an `Arc`; every `generate()` runs as its own task
/// and only ever suspends itself while waiting.
pub struct ResilientInvoker {
    pub(crate) api: Arc<dyn ExternalApi>,
    pub(crate) cache: Arc<ResponseCache>,
    pub(crate) usage: Arc<UsageTracker>,
    pub(crate) config: ArcSwap<InvokerConfig>,
    pub(crate) inflight: Mutex<InflightMap>,
}

/// A caller's claim on a per-key lock, held or awaited.
///
/// The slot exists before the lock is awaited, so a caller dropped while
/// waiting still gives its claim back.
struct InflightSlot<'a> {
    owner: &'a ResilientInvoker,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut map = self.owner.lock_inflight();
        let idle = match map.get_mut(&self.key) {
            Some(entry) => {
                entry.users = entry.users.saturating_sub(1);
                entry.users == 0
            }
            None => false,
        };
        if idle {
            map.remove(&self.key);
        }
    }
}

impl ResilientInvoker {
    pub fn builder(api: Arc<dyn ExternalApi>) -> InvokerBuilder {
        InvokerBuilder::new(api)
    }

    /// Invoker over the OpenAI transport, configured from the environment.
    pub fn from_env() -> Result<Self> {
        let api = Arc::new(crate::transport::OpenAiTransport::from_env()?);
        InvokerBuilder::new(api)
            .config(InvokerConfig::from_env()?)
            .build()
    }

    /// Generate text for `request`.
    ///
    /// Fails only with [`Error::Fatal`] (credentials, malformed request),
    /// [`Error::ExhaustedRetries`], or [`Error::Validation`] for a request
    /// that never left the process. Structured-output parse failures come
    /// back as `valid == false`.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        request.validate()?;
        let cfg = self.config.load_full();
        let use_cache = cfg.cache_enabled && request.cache_enabled();
        let key = CacheKey::from_request(request);

        if use_cache {
            if let Some(raw) = self.cache.get(&key).await {
                return Ok(Self::finish(request, raw, TokenUsage::default(), ResultSource::Cache, 0));
            }
        }

        let _slot = if use_cache && cfg.dedupe_inflight {
            let slot = self.acquire_slot(&key).await;
            // Whoever held the slot before us may have filled the cache.
            if let Some(raw) = self.cache.get(&key).await {
                return Ok(Self::finish(request, raw, TokenUsage::default(), ResultSource::Cache, 0));
            }
            Some(slot)
        } else {
            None
        };

        let (completion, attempts) = self.call_with_retries(request, &cfg, &key).await?;

        // Account before caching so usage reflects only genuine network calls.
        self.usage.record_call(&completion.usage);
        let result = Self::finish(
            request,
            completion.text,
            completion.usage,
            ResultSource::Api,
            attempts,
        );

        if use_cache {
            self.cache.set(&key, &result.raw, cfg.cache_ttl).await;
        }

        info!(
            key = key.short(),
            attempts,
            total_tokens = completion.usage.total(),
            valid = result.valid,
            "generation completed"
        );
        Ok(result)
    }

    /// [`generate`](Self::generate), abandoned as soon as `cancel` fires.
    ///
    /// A cancelled call returns [`Error::Cancelled`] and never writes the cache.
    pub async fn generate_with_cancel(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<GenerationResult> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("generation cancelled by caller");
                Err(Error::Cancelled)
            }
            res = self.generate(request) => res,
        }
    }

    /// Usage counters plus the derived throttle state.
    pub fn usage_snapshot(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }

    /// The shared tracker, for handing to sibling invokers.
    pub fn usage(&self) -> Arc<UsageTracker> {
        self.usage.clone()
    }

    /// Drop every cached response. Usage counters are untouched.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        info!(backend = self.cache.backend_name(), "response cache cleared");
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn config(&self) -> Arc<InvokerConfig> {
        self.config.load_full()
    }

    /// Swap in a new configuration and lift any recorded throttle.
    ///
    /// Calls already in flight finish under the config they started with.
    pub fn reload_config(&self, config: InvokerConfig) -> Result<()> {
        config.validate()?;
        self.config.store(Arc::new(config));
        self.usage.clear_rate_limit();
        info!("invoker configuration reloaded");
        Ok(())
    }

    fn finish(
        request: &GenerationRequest,
        raw: String,
        usage: TokenUsage,
        source: ResultSource,
        attempts: u32,
    ) -> GenerationResult {
        let (raw, parsed, valid) = if request.is_structured() {
            let out = StructuredOutput::parse(raw);
            let valid = out.is_valid();
            let (raw, parsed) = out.into_parts();
            (raw, parsed, valid)
        } else {
            (raw, None, true)
        };
        GenerationResult {
            raw,
            parsed,
            valid,
            usage,
            source,
            attempts,
        }
    }

    fn lock_inflight(&self) -> MutexGuard<'_, InflightMap> {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn acquire_slot(&self, key: &CacheKey) -> InflightSlot<'_> {
        let lock = {
            let mut map = self.lock_inflight();
            let entry = map.entry(key.hash.clone()).or_default();
            entry.users += 1;
            entry.lock.clone()
        };
        let mut slot = InflightSlot {
            owner: self,
            key: key.hash.clone(),
            guard: None,
        };
        slot.guard = Some(lock.lock_owned().await);
        slot
    }

    /// Suspend until the shared throttle deadline has passed.
    async fn wait_for_rate_limit(&self, key: &CacheKey) {
        while let Some(until) = self.usage.rate_limited_until() {
            let wait = until.saturating_duration_since(tokio::time::Instant::now());
            info!(
                key = key.short(),
                wait_ms = wait.as_millis() as u64,
                "waiting for upstream rate limit to reset"
            );
            tokio::time::sleep_until(until).await;
        }
    }

    async fn call_with_retries(
        &self,
        request: &GenerationRequest,
        cfg: &InvokerConfig,
        key: &CacheKey,
    ) -> Result<(Completion, u32)> {
        let policy = RetryPolicy::from_config(cfg);
        let call = ApiCall::from_request(request, cfg.timeout);
        let mut attempt: u32 = 1;

        loop {
            // Throttle waits do not consume an attempt.
            self.wait_for_rate_limit(key).await;

            let outcome = tokio::time::timeout(cfg.timeout, self.api.call(&call)).await;
            let failure = match outcome {
                Ok(CallOutcome::Success(completion)) => return Ok((completion, attempt)),
                Ok(CallOutcome::Fatal { status, message }) => {
                    warn!(key = key.short(), attempt, status, error = %message, "fatal API error, not retrying");
                    let mut context = ErrorContext::new().with_source("resilient_invoker");
                    if let Some(s) = status {
                        context = context.with_status_code(s);
                    }
                    return Err(Error::fatal_with_context(message, context));
                }
                Ok(CallOutcome::Throttled {
                    retry_after,
                    message,
                }) => {
                    if let Some(wait) = retry_after {
                        self.usage.note_throttled(wait);
                    }
                    AttemptFailure::Throttled {
                        retry_after,
                        message,
                    }
                }
                Ok(CallOutcome::Transient { status, message }) => {
                    AttemptFailure::Transient { status, message }
                }
                Err(_) => AttemptFailure::Timeout { after: cfg.timeout },
            };

            match policy.decide(&failure, attempt) {
                Decision::Retry { delay } => {
                    info!(
                        key = key.short(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
                Decision::Fail => {
                    warn!(key = key.short(), attempts = attempt, error = %failure, "retries exhausted");
                    return Err(Error::ExhaustedRetries {
                        attempts: attempt,
                        last: failure,
                    });
                }
            }
        }
    }
}
