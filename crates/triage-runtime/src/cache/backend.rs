//! Storage behind the response cache.

use async_trait::async_trait;
use std::time::Duration;

use super::CacheError;

/// Key/value store with per-entry TTL and set-if-not-exists.
///
/// Values are opaque strings, so a network store can implement this with
/// plain `GET`, `SET EX` and `SET NX EX`.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Store `value` only if `key` is absent. Returns whether it was stored.
    async fn set_nx(&self, key: &str, value: String, ttl: Duration) -> Result<bool, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Backend name for logs.
    fn name(&self) -> &str;
}
