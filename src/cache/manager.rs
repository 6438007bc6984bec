//! Cache manager.
//!
//! Fronts a [`CacheStore`] for the invoker: applies the configured TTL and
//! turns every backend fault into a miss, so a broken cache degrades to
//! "no cache" instead of failing the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::backend::CacheStore;
use super::key::CacheKey;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

pub struct ResponseCache {
    backend: Arc<dyn CacheStore>,
    stats: AtomicStats,
}

impl ResponseCache {
    pub fn new(backend: Arc<dyn CacheStore>) -> Self {
        Self {
            backend,
            stats: AtomicStats::default(),
        }
    }

    /// Cached payload for `key`, or `None` on miss, expiry or any backend fault.
    pub async fn get(&self, key: &CacheKey) -> Option<String> {
        match self.backend.get(key).await {
            Ok(Some(entry)) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = key.short(), backend = self.backend.name(), "cache hit");
                Some(entry.payload)
            }
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = key.short(), backend = self.backend.name(), "cache miss");
                None
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                warn!(key = key.short(), backend = self.backend.name(), error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store `payload`; failures are logged and swallowed.
    pub async fn set(&self, key: &CacheKey, payload: &str, ttl: Duration) {
        match self.backend.set(key, payload, ttl).await {
            Ok(()) => {
                self.stats.sets.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = key.short(), backend = self.backend.name(), error = %e, "cache write failed");
            }
        }
    }

    pub async fn clear(&self) {
        if let Err(e) = self.backend.clear().await {
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
            warn!(backend = self.backend.name(), error = %e, "cache clear failed");
        }
    }

    pub async fn len(&self) -> usize {
        self.backend.len().await.unwrap_or(0)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}
