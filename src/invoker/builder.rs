use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::core::ResilientInvoker;
use crate::cache::{CacheStore, DiskCache, MemoryCache, ResponseCache};
use crate::config::InvokerConfig;
use crate::transport::ExternalApi;
use crate::usage::UsageTracker;
use crate::Result;

/// Builder for [`ResilientInvoker`].
///
/// The cache backend defaults to a [`DiskCache`] when `cache_dir` is set and a
/// [`MemoryCache`] otherwise. Share one [`UsageTracker`] between invokers to
/// make them honor each other's rate-limit deadlines.
pub struct InvokerBuilder {
    api: Arc<dyn ExternalApi>,
    config: InvokerConfig,
    store: Option<Arc<dyn CacheStore>>,
    usage: Option<Arc<UsageTracker>>,
}

impl InvokerBuilder {
    pub fn new(api: Arc<dyn ExternalApi>) -> Self {
        Self {
            api,
            config: InvokerConfig::default(),
            store: None,
            usage: None,
        }
    }

    pub fn config(mut self, config: InvokerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an explicit cache backend instead of the one derived from config.
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn usage(mut self, usage: Arc<UsageTracker>) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn build(self) -> Result<ResilientInvoker> {
        self.config.validate()?;

        let store: Arc<dyn CacheStore> = match (self.store, &self.config.cache_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => Arc::new(DiskCache::with_dir(dir.clone())),
            (None, None) => Arc::new(MemoryCache::new(self.config.cache_max_entries)),
        };
        debug!(
            backend = store.name(),
            cache_enabled = self.config.cache_enabled,
            max_retries = self.config.max_retries,
            "building resilient invoker"
        );

        Ok(ResilientInvoker {
            api: self.api,
            cache: Arc::new(ResponseCache::new(store)),
            usage: self.usage.unwrap_or_default(),
            config: ArcSwap::from_pointee(self.config),
            inflight: Mutex::new(HashMap::new()),
        })
    }
}
