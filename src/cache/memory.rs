//! In-process cache store.
//!
//! [`MemoryStore`] is a bounded moka cache with per-entry expiry. It is the
//! default store for single-process deployments and for tests. Entries are
//! not shared across processes; use [`RedisStore`](super::RedisStore) when
//! several workers must see the same cache.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;

use super::CacheStore;
use crate::Result;

/// Default maximum number of entries held in memory.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

#[derive(Clone)]
struct StoredValue {
    data: String,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<String, StoredValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Thread-safe in-memory [`CacheStore`] with LRU eviction and per-key TTL.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Cache<String, StoredValue>,
}

impl MemoryStore {
    /// Create a store with the default capacity (10,000 entries).
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    /// Create a store with a custom capacity.
    pub fn with_max_entries(max: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max)
            .expire_after(PerEntryTtl)
            .build();
        Self { entries }
    }

    /// Number of live entries (approximate, as reported by moka).
    pub fn len(&self) -> u64 {
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).await.map(|v| v.data))
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.entries
            .insert(key.to_string(), StoredValue { data: value, ttl })
            .await;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
