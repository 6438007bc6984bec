//! # Response Caching Module
//!
//! Keyed, TTL-bounded storage of raw API responses so identical requests are
//! not billed twice.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheKey`] | Deterministic SHA-256 fingerprint of a request |
//! | [`CacheStore`] | Trait for pluggable backends |
//! | [`MemoryCache`] | In-process store with LRU eviction |
//! | [`DiskCache`] | One JSON file per entry, survives restarts |
//! | [`NullCache`] | No-op store; every lookup misses |
//! | [`ResponseCache`] | Fault-absorbing front end with hit/miss statistics |
//!
//! Expiry is lazy: a stale entry is removed when it is read.
//!
//! ## Example
//!
//! ```rust
//! use resilient_llm::cache::{CacheKey, MemoryCache, ResponseCache};
//! use resilient_llm::types::GenerationRequest;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let cache = ResponseCache::new(Arc::new(MemoryCache::new(100)));
//! let key = CacheKey::from_request(&GenerationRequest::new("hello"));
//! cache.set(&key, "world", Duration::from_secs(60)).await;
//! assert_eq!(cache.get(&key).await.as_deref(), Some("world"));
//! # });
//! ```

mod backend;
mod disk;
mod key;
mod manager;

pub use backend::{CacheEntry, CacheStore, MemoryCache, NullCache};
pub use disk::DiskCache;
pub use key::CacheKey;
pub use manager::{CacheStats, ResponseCache};
