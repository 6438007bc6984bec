//! Cache backend implementations.

use super::key::CacheKey;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// A stored response. Never mutated in place; `set` replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: String,
    /// Unix timestamp in milliseconds.
    pub created_at: u64,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(key: &CacheKey, payload: impl Into<String>, ttl: Duration) -> Self {
        Self {
            key: key.hash.clone(),
            payload: payload.into(),
            created_at: unix_millis(),
            ttl,
        }
    }

    /// Expired once strictly more than `ttl` has elapsed since creation.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at) > self.ttl.as_millis() as u64
    }
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Key/value persistence behind the response cache.
///
/// Implementations expire lazily: `get` on a stale entry removes it and
/// reports a miss.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;
    async fn set(&self, key: &CacheKey, payload: &str, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &CacheKey) -> Result<bool>;
    async fn clear(&self) -> Result<()>;
    async fn len(&self) -> Result<usize>;
    fn name(&self) -> &'static str;
}

struct MemoryEntry {
    entry: CacheEntry,
    // Monotonic clock from tokio so paused-time tests drive expiry.
    inserted: Instant,
    last_accessed: Instant,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        self.inserted.elapsed() > self.entry.ttl
    }
}

/// In-process store with lazy expiry and least-recently-used eviction.
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, MemoryEntry>>>,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            max_entries: max_entries.max(1),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, MemoryEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    fn evict_if_needed(&self, entries: &mut HashMap<String, MemoryEntry>) {
        entries.retain(|_, e| !e.is_expired());
        while entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone());
            if let Some(k) = oldest {
                entries.remove(&k);
            } else {
                break;
            }
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let mut entries = self.write();
        if let Some(e) = entries.get_mut(&key.hash) {
            if e.is_expired() {
                entries.remove(&key.hash);
                return Ok(None);
            }
            e.last_accessed = Instant::now();
            return Ok(Some(e.entry.clone()));
        }
        Ok(None)
    }

    async fn set(&self, key: &CacheKey, payload: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.write();
        // Overwrites keep their slot; only new keys can push out others.
        if !entries.contains_key(&key.hash) {
            self.evict_if_needed(&mut entries);
        }
        let now = Instant::now();
        entries.insert(
            key.hash.clone(),
            MemoryEntry {
                entry: CacheEntry::new(key, payload, ttl),
                inserted: now,
                last_accessed: now,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.write().remove(&key.hash).is_some())
    }

    async fn clear(&self) -> Result<()> {
        self.write().clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|e| !e.is_expired())
            .count())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

pub struct NullCache;

impl NullCache {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for NullCache {
    async fn get(&self, _: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(None)
    }
    async fn set(&self, _: &CacheKey, _: &str, _: Duration) -> Result<()> {
        Ok(())
    }
    async fn delete(&self, _: &CacheKey) -> Result<bool> {
        Ok(false)
    }
    async fn clear(&self) -> Result<()> {
        Ok(())
    }
    async fn len(&self) -> Result<usize> {
        Ok(0)
    }
    fn name(&self) -> &'static str {
        "null"
    }
}
