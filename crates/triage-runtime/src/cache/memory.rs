//! In-process cache backend using moka.

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};

use super::{CacheBackend, CacheError};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    ttl: Duration,
}

/// Expires each entry after its own TTL.
struct PerEntryTtl;

impl Expiry<String, StoredValue> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &StoredValue, _created_at: Instant) -> Option<Duration> {
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

/// Bounded in-memory backend. Never returns an error.
pub struct MemoryBackend {
    cache: Cache<String, StoredValue>,
}

impl MemoryBackend {
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();

        Self { cache }
    }

    /// Approximate number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Clear everything.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("entries", &self.entry_count())
            .finish()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.cache.get(key).await.map(|stored| stored.value))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.cache.insert(key.to_string(), StoredValue { value, ttl }).await;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: String, ttl: Duration) -> Result<bool, CacheError> {
        let entry = self
            .cache
            .entry(key.to_string())
            .or_insert(StoredValue { value, ttl })
            .await;
        Ok(entry.is_fresh())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
