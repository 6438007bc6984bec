//! File-per-entry JSON cache.
//!
//! Layout: `<dir>/<sha256>.json`, each holding one [`DiskRecord`]. Writes go
//! through a uniquely named temp file and a rename, so a reader sees either
//! the previous entry or the new one, never a torn write. Temp files left by
//! a crashed writer are swept once they are older than [`STALE_TMP_AGE`].

use super::backend::{unix_millis, CacheEntry, CacheStore};
use super::key::CacheKey;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Age after which an orphaned `*.tmp` file is assumed abandoned.
pub const STALE_TMP_AGE: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Serialize, Deserialize)]
struct DiskRecord {
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    payload: String,
    created_at: u64,
    ttl_ms: u64,
}

impl DiskRecord {
    fn into_entry(self) -> CacheEntry {
        CacheEntry {
            key: self.key,
            payload: self.payload,
            created_at: self.created_at,
            ttl: Duration::from_millis(self.ttl_ms),
        }
    }
}

pub struct DiskCache {
    dir: PathBuf,
    tmp_seq: AtomicU64,
    swept: AtomicBool,
}

impl DiskCache {
    /// Open (and create if needed) a cache directory, sweeping stale temp files.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        let cache = Self::with_dir(dir);
        cache.swept.store(true, Ordering::Relaxed);
        cache.sweep_stale_tmp(STALE_TMP_AGE).await?;
        Ok(cache)
    }

    /// Use `dir` without touching the filesystem; it is created on first write
    /// and swept of stale temp files just before it.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tmp_seq: AtomicU64::new(0),
            swept: AtomicBool::new(false),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey) -> Result<PathBuf> {
        // Keys become file names; only accept what the fingerprint produces.
        let ok = !key.hash.is_empty() && key.hash.chars().all(|c| c.is_ascii_hexdigit());
        if !ok {
            return Err(Error::validation_with_context(
                "cache key is not a hex digest",
                ErrorContext::new()
                    .with_field_path("cache.key")
                    .with_details(key.hash.clone())
                    .with_source("disk_cache"),
            ));
        }
        Ok(self.dir.join(format!("{}.json", key.hash)))
    }

    fn tmp_path(&self, key: &CacheKey) -> PathBuf {
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!(".{}.{}-{}.tmp", key.hash, std::process::id(), seq))
    }

    /// Remove `*.tmp` files not modified within `max_age`. Returns how many went.
    pub async fn sweep_stale_tmp(&self, max_age: Duration) -> Result<usize> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().map(|ext| ext != "tmp").unwrap_or(true) {
                continue;
            }
            let age = match item.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => now.duration_since(modified).unwrap_or_default(),
                Err(_) => continue,
            };
            if age >= max_age {
                Self::remove_quietly(&path).await;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(dir = %self.dir.display(), removed, "swept stale cache temp files");
        }
        Ok(removed)
    }

    async fn remove_quietly(path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "failed to remove cache file");
            }
        }
    }
}

#[async_trait]
impl CacheStore for DiskCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: DiskRecord = match serde_json::from_slice(&bytes) {
            Ok(r) => r,
            Err(e) => {
                warn!(key = key.short(), error = %e, "corrupt cache entry, treating as miss");
                return Ok(None);
            }
        };
        if record.key != key.hash {
            warn!(key = key.short(), "cache entry key mismatch, treating as miss");
            return Ok(None);
        }

        let entry = record.into_entry();
        if entry.is_expired_at(unix_millis()) {
            debug!(key = key.short(), "cache entry expired, removing");
            Self::remove_quietly(&path).await;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    async fn set(&self, key: &CacheKey, payload: &str, ttl: Duration) -> Result<()> {
        let path = self.entry_path(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        if !self.swept.swap(true, Ordering::Relaxed) {
            if let Err(e) = self.sweep_stale_tmp(STALE_TMP_AGE).await {
                warn!(dir = %self.dir.display(), error = %e, "temp file sweep failed");
            }
        }

        let record = DiskRecord {
            key: key.hash.clone(),
            model: key.model.clone(),
            payload: payload.to_string(),
            created_at: unix_millis(),
            ttl_ms: ttl.as_millis() as u64,
        };
        let body = serde_json::to_vec_pretty(&record)?;

        let tmp = self.tmp_path(key);
        if let Err(e) = tokio::fs::write(&tmp, &body).await {
            Self::remove_quietly(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            Self::remove_quietly(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        let path = self.entry_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            let is_cache_file = path
                .extension()
                .map(|ext| ext == "json" || ext == "tmp")
                .unwrap_or(false);
            if is_cache_file {
                Self::remove_quietly(&path).await;
            }
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let now = unix_millis();
        let mut count = 0;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().map(|ext| ext != "json").unwrap_or(true) {
                continue;
            }
            let live = tokio::fs::read(&path)
                .await
                .ok()
                .and_then(|b| serde_json::from_slice::<DiskRecord>(&b).ok())
                .map(|r| !r.into_entry().is_expired_at(now))
                .unwrap_or(false);
            if live {
                count += 1;
            }
        }
        Ok(count)
    }

    fn name(&self) -> &'static str {
        "disk"
    }
}
