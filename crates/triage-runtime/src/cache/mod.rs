//! Response cache for triage-runtime.
//!
//! Stores finished classifications keyed by normalized text and the
//! configuration version, and coalesces concurrent misses for the same key
//! into a single computation.
//!
//! Cache failures never fail a request: every backend error is logged and
//! treated as a miss (reads) or ignored (writes).

mod backend;
mod memory;

pub use backend::CacheBackend;
pub use memory::MemoryBackend;

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OnceCell;

use triage_core::{normalize, ClassificationResult};

use crate::config::CacheConfig;
use crate::resilience::Deadline;

/// Errors from a cache backend. Logged, never surfaced to callers.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Stable cache key for a piece of text under one configuration version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// BLAKE3 over the normalized text and the version tag.
    pub fn new(text: &str, version: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(normalize(text).as_bytes());
        hasher.update(b"\n");
        hasher.update(version.as_bytes());
        Self(format!("triage:{}", hasher.finalize().to_hex()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn lock_key(&self) -> String {
        format!("{}:lock", self.0)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What is stored under a [`CacheKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: ClassificationResult,
    pub created_at: DateTime<Utc>,
    pub ttl_ms: u64,
}

impl CacheEntry {
    pub fn new(key: &CacheKey, value: ClassificationResult, ttl: Duration) -> Self {
        Self {
            key: key.as_str().to_string(),
            value,
            created_at: Utc::now(),
            ttl_ms: ttl.as_millis() as u64,
        }
    }

    /// Checked on read, independent of the backend's own expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        age.num_milliseconds() >= self.ttl_ms as i64
    }
}

/// How a result was obtained by [`ResponseCache::get_or_compute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOutcome {
    /// Served from the backend
    Hit,
    /// Computed by this caller
    Miss,
    /// Shared from a concurrent caller's computation
    Coalesced,
    /// Caching is disabled
    Bypass,
}

impl CacheOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Miss => "miss",
            CacheOutcome::Coalesced => "coalesced",
            CacheOutcome::Bypass => "bypass",
        }
    }
}

/// Result of [`ResponseCache::get_or_compute`].
#[derive(Debug)]
pub enum Computed<M> {
    Ready {
        result: ClassificationResult,
        outcome: CacheOutcome,

        /// What `compute` returned alongside the result. `Some` only for
        /// the caller whose `compute` ran.
        meta: Option<M>,
    },

    /// The caller's deadline lapsed while it waited on another caller's
    /// computation for the same key.
    TimedOut,
}

#[derive(Debug, Clone)]
struct Flight {
    result: ClassificationResult,
    from_cache: bool,
}

struct FlightSlot {
    cell: Arc<OnceCell<Flight>>,
    participants: usize,
}

type InFlight = Mutex<HashMap<String, FlightSlot>>;

/// One caller's membership in a flight.
///
/// The flight leaves the in-flight map once it has a result or its last
/// participant is gone. A cancelled waiter never evicts a flight that is
/// still computing.
struct FlightGuard<'a> {
    in_flight: &'a InFlight,
    key: &'a str,
    cell: Arc<OnceCell<Flight>>,
}

impl<'a> FlightGuard<'a> {
    fn join(in_flight: &'a InFlight, key: &'a str) -> Self {
        let mut map = in_flight.lock();
        let slot = map.entry(key.to_string()).or_insert_with(|| FlightSlot {
            cell: Arc::new(OnceCell::new()),
            participants: 0,
        });
        slot.participants += 1;
        let cell = slot.cell.clone();
        Self { in_flight, key, cell }
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut map = self.in_flight.lock();
        let finished = match map.get_mut(self.key) {
            Some(slot) if Arc::ptr_eq(&slot.cell, &self.cell) => {
                slot.participants -= 1;
                slot.participants == 0 || slot.cell.initialized()
            }
            _ => false,
        };
        if finished {
            map.remove(self.key);
        }
    }
}

/// Classification cache with single-flight misses.
pub struct ResponseCache {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
    in_flight: InFlight,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("in_flight", &self.in_flight.lock().len())
            .finish()
    }
}

impl ResponseCache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self {
            backend,
            config,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// In-memory cache sized from `config`.
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(Arc::new(MemoryBackend::new(config.max_entries)), config)
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Number of keys with a computation in progress.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Look up a stored result. Errors and expired entries are misses.
    pub async fn get(&self, key: &CacheKey) -> Option<ClassificationResult> {
        if !self.config.enabled {
            return None;
        }

        let raw = match self.backend.get(key.as_str()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %key, backend = self.backend.name(), error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding unreadable cache entry");
                return None;
            }
        };

        if entry.is_expired(Utc::now()) {
            tracing::debug!(key = %key, "Cache entry expired");
            return None;
        }
        Some(entry.value)
    }

    /// Store a result. Degraded results are not stored. Returns whether the
    /// write happened.
    pub async fn set(&self, key: &CacheKey, result: &ClassificationResult) -> bool {
        if !self.config.enabled {
            return false;
        }
        if result.degraded {
            tracing::debug!(key = %key, "Not caching degraded result");
            return false;
        }

        let entry = CacheEntry::new(key, result.clone(), self.config.ttl);
        let write = match serde_json::to_string(&entry) {
            Ok(raw) => self.backend.set(key.as_str(), raw, self.config.ttl).await,
            Err(e) => Err(CacheError::from(e)),
        };
        match write {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key = %key, backend = self.backend.name(), error = %e, "Cache write failed");
                false
            }
        }
    }

    /// Return the cached result for `key`, or run `compute` to produce it.
    ///
    /// Concurrent callers with the same key share one `compute`; the others
    /// wait and receive a clone of its result. If the computing caller
    /// fails or is cancelled, a waiting caller takes over with its own
    /// `compute`. A waiter whose deadline lapses first gets
    /// [`Computed::TimedOut`]; the computing caller is bounded by
    /// `compute` itself.
    pub async fn get_or_compute<F, Fut, M, E>(
        &self,
        key: &CacheKey,
        deadline: &Deadline,
        compute: F,
    ) -> Result<Computed<M>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(ClassificationResult, M), E>>,
    {
        let guard = FlightGuard::join(&self.in_flight, key.as_str());
        let led = AtomicBool::new(false);
        let meta = Mutex::new(None);

        let init = guard.cell.get_or_try_init(|| {
            led.store(true, Ordering::Release);
            self.lead(key, deadline, compute, &meta)
        });
        let expiry = async {
            tokio::time::sleep(deadline.remaining()).await;
            if led.load(Ordering::Acquire) {
                std::future::pending::<()>().await;
            }
        };

        let flight = tokio::select! {
            biased;
            flight = init => flight?.clone(),
            () = expiry => {
                tracing::debug!(key = %key, "Deadline lapsed waiting on in-flight classification");
                return Ok(Computed::TimedOut);
            }
        };

        let led = led.load(Ordering::Acquire);
        let outcome = match (flight.from_cache, led) {
            (true, _) => CacheOutcome::Hit,
            (false, _) if !self.config.enabled => CacheOutcome::Bypass,
            (false, true) => CacheOutcome::Miss,
            (false, false) => CacheOutcome::Coalesced,
        };
        Ok(Computed::Ready {
            result: flight.result,
            outcome,
            meta: meta.into_inner(),
        })
    }

    async fn lead<F, Fut, M, E>(
        &self,
        key: &CacheKey,
        deadline: &Deadline,
        compute: F,
        meta: &Mutex<Option<M>>,
    ) -> Result<Flight, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(ClassificationResult, M), E>>,
    {
        // A flight that finished just before this one started may have
        // written the result already.
        if let Some(result) = self.get(key).await {
            return Ok(Flight {
                result,
                from_cache: true,
            });
        }

        let lock = if self.config.enabled && self.config.distributed_lock {
            self.acquire_distributed(key, deadline).await
        } else {
            DistributedLock::NotUsed
        };

        let held = match lock {
            DistributedLock::Resolved(result) => {
                return Ok(Flight {
                    result,
                    from_cache: true,
                });
            }
            DistributedLock::Held => true,
            DistributedLock::NotUsed => false,
        };

        let result = match compute().await {
            Ok((result, computed)) => {
                *meta.lock() = Some(computed);
                self.set(key, &result).await;
                Ok(result)
            }
            Err(e) => Err(e),
        };
        if held {
            if let Err(e) = self.backend.delete(&key.lock_key()).await {
                tracing::warn!(key = %key, error = %e, "Failed to release cache lock");
            }
        }

        result.map(|result| Flight {
            result,
            from_cache: false,
        })
    }

    /// Take the cross-process lock for `key`, or wait for its holder's
    /// result until the lock TTL or the deadline runs out.
    async fn acquire_distributed(&self, key: &CacheKey, deadline: &Deadline) -> DistributedLock {
        let lock_key = key.lock_key();
        let token = format!("{}", Utc::now().timestamp_micros());

        match self.backend.set_nx(&lock_key, token, self.config.lock_ttl).await {
            Ok(true) => return DistributedLock::Held,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache lock unavailable, computing locally");
                return DistributedLock::NotUsed;
            }
        }

        let wait = deadline.tightened(self.config.lock_ttl);
        tracing::debug!(key = %key, wait = ?wait.remaining(), "Cache lock held elsewhere, polling");
        while !wait.is_expired() {
            tokio::time::sleep(wait.clamp(self.config.lock_poll_interval)).await;
            if let Some(result) = self.get(key).await {
                return DistributedLock::Resolved(result);
            }
        }

        tracing::debug!(key = %key, "Cache lock wait lapsed, computing locally");
        DistributedLock::NotUsed
    }
}

enum DistributedLock {
    NotUsed,
    Held,
    Resolved(ClassificationResult),
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use triage_core::classify_with_rules;

    struct FailingBackend;

    #[async_trait]
    impl CacheBackend for FailingBackend {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        async fn set_nx(&self, _key: &str, _value: String, _ttl: Duration) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn config() -> CacheConfig {
        CacheConfig::default()
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    fn ready<M>(computed: Computed<M>) -> (ClassificationResult, CacheOutcome) {
        match computed {
            Computed::Ready { result, outcome, .. } => (result, outcome),
            Computed::TimedOut => panic!("expected a result"),
        }
    }

    /// Joins the flight for `key`; a computation takes 200ms and returns
    /// the number of the call that produced it.
    fn slow_caller(
        cache: &Arc<ResponseCache>,
        key: &CacheKey,
        calls: &Arc<AtomicU32>,
        budget: Duration,
    ) -> tokio::task::JoinHandle<Result<Computed<u32>, ()>> {
        let cache = cache.clone();
        let key = key.clone();
        let calls = calls.clone();
        tokio::spawn(async move {
            cache
                .get_or_compute(&key, &Deadline::after(budget), || async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok((classify_with_rules("draft a project plan"), n))
                })
                .await
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_waiter_keeps_flight() {
        let cache = Arc::new(ResponseCache::in_memory(config()));
        let key = CacheKey::new("draft a project plan", "v1");
        let calls = Arc::new(AtomicU32::new(0));

        let leader = slow_caller(&cache, &key, &calls, Duration::from_secs(5));
        tokio::time::sleep(Duration::from_millis(10)).await;
        let waiter = slow_caller(&cache, &key, &calls, Duration::from_secs(5));
        tokio::time::sleep(Duration::from_millis(10)).await;

        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());
        assert_eq!(cache.in_flight_count(), 1);

        let late = slow_caller(&cache, &key, &calls, Duration::from_secs(5));
        let leader = leader.await.unwrap().unwrap();
        let late = late.await.unwrap().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            leader,
            Computed::Ready {
                outcome: CacheOutcome::Miss,
                meta: Some(1),
                ..
            }
        ));
        assert!(matches!(
            late,
            Computed::Ready {
                outcome: CacheOutcome::Coalesced,
                meta: None,
                ..
            }
        ));
        assert_eq!(cache.in_flight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_gives_up_at_its_deadline() {
        let cache = Arc::new(ResponseCache::in_memory(config()));
        let key = CacheKey::new("draft a project plan", "v1");
        let calls = Arc::new(AtomicU32::new(0));

        let leader = slow_caller(&cache, &key, &calls, Duration::from_secs(5));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let started = tokio::time::Instant::now();
        let waiter = slow_caller(&cache, &key, &calls, Duration::from_millis(50));
        let waited = waiter.await.unwrap().unwrap();
        assert!(matches!(waited, Computed::TimedOut));
        assert!(started.elapsed() <= Duration::from_millis(60));

        // The leader is unaffected and still publishes its result.
        let (_, outcome) = ready(leader.await.unwrap().unwrap());
        assert_eq!(outcome, CacheOutcome::Miss);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.get(&key).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_leader_ignores_own_deadline_timer() {
        let cache = Arc::new(ResponseCache::in_memory(config()));
        let key = CacheKey::new("draft a project plan", "v1");
        let calls = Arc::new(AtomicU32::new(0));

        // The computation outlives the budget; bounding it is up to `compute`.
        let leader = slow_caller(&cache, &key, &calls, Duration::from_millis(50));
        let (_, outcome) = ready(leader.await.unwrap().unwrap());
        assert_eq!(outcome, CacheOutcome::Miss);
    }

    #[test]
    fn test_key_normalizes_text() {
        let a = CacheKey::new("  Write a Python   function ", "v1");
        let b = CacheKey::new("write a python function", "v1");
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("triage:"));
        assert_ne!(a, CacheKey::new("write a python function", "v2"));
        assert_ne!(a, CacheKey::new("write a rust function", "v1"));
    }

    proptest::proptest! {
        #[test]
        fn prop_key_ignores_case_and_spacing(words in proptest::collection::vec("[a-zA-Z]{1,8}", 1..8)) {
            let tight = words.join(" ");
            let loose = format!("  {}  ", words.join("   ").to_uppercase());
            proptest::prop_assert_eq!(CacheKey::new(&tight, "v1"), CacheKey::new(&loose, "v1"));
        }
    }

    #[test]
    fn test_entry_expiry() {
        let key = CacheKey::new("text", "v1");
        let entry = CacheEntry::new(&key, classify_with_rules("text"), Duration::from_secs(60));
        assert!(!entry.is_expired(entry.created_at + chrono::Duration::seconds(59)));
        assert!(entry.is_expired(entry.created_at + chrono::Duration::seconds(60)));
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = ResponseCache::in_memory(config());
        let key = CacheKey::new("summarize this report", "v1");
        let result = classify_with_rules("summarize this report");

        assert!(cache.get(&key).await.is_none());
        assert!(cache.set(&key, &result).await);
        assert_eq!(cache.get(&key).await, Some(result));
    }

    #[tokio::test]
    async fn test_degraded_not_stored() {
        let cache = ResponseCache::in_memory(config());
        let key = CacheKey::new("hello", "v1");
        let mut result = classify_with_rules("hello");
        result.degraded = true;

        assert!(!cache.set(&key, &result).await);
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_passive_expiry() {
        let cache = ResponseCache::in_memory(CacheConfig {
            ttl: Duration::from_millis(40),
            ..config()
        });
        let key = CacheKey::new("translate this", "v1");
        cache.set(&key, &classify_with_rules("translate this")).await;
        assert!(cache.get(&key).await.is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_backend_errors_are_misses() {
        let cache = ResponseCache::new(Arc::new(FailingBackend), config());
        let key = CacheKey::new("debug this crash", "v1");
        let result = classify_with_rules("debug this crash");

        assert!(cache.get(&key).await.is_none());
        assert!(!cache.set(&key, &result).await);

        let (computed, outcome) = cache
            .get_or_compute(&key, &deadline(), || async { Ok::<_, ()>((result.clone(), ())) })
            .await
            .map(ready)
            .unwrap();
        assert_eq!(computed, result);
        assert_eq!(outcome, CacheOutcome::Miss);
    }

    #[tokio::test]
    async fn test_get_or_compute_miss_then_hit() {
        let cache = ResponseCache::in_memory(config());
        let key = CacheKey::new("explain recursion", "v1");
        let calls = AtomicU32::new(0);

        for expected in [CacheOutcome::Miss, CacheOutcome::Hit] {
            let (_, outcome) = cache
                .get_or_compute(&key, &deadline(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>((classify_with_rules("explain recursion"), ()))
                })
                .await
                .map(ready)
                .unwrap();
            assert_eq!(outcome, expected);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_computation() {
        let cache = Arc::new(ResponseCache::in_memory(config()));
        let key = CacheKey::new("write a sorting algorithm", "v1");
        let calls = Arc::new(AtomicU32::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let key = key.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_compute(&key, &Deadline::after(Duration::from_secs(5)), || async {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok::<_, ()>((classify_with_rules("write a sorting algorithm"), ()))
                        })
                        .await
                })
            })
            .collect();

        let results: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| ready(r.unwrap().unwrap()))
            .collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let first = &results[0].0;
        assert!(results.iter().all(|(r, _)| r == first));
        assert_eq!(
            results.iter().filter(|(_, o)| *o == CacheOutcome::Miss).count(),
            1
        );
        assert_eq!(cache.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_leader_lets_waiter_compute() {
        let cache = ResponseCache::in_memory(config());
        let key = CacheKey::new("plan a trip", "v1");

        let err = cache
            .get_or_compute(&key, &deadline(), || async { Err::<(ClassificationResult, ()), _>("rejected") })
            .await
            .unwrap_err();
        assert_eq!(err, "rejected");
        assert_eq!(cache.in_flight_count(), 0);

        let (_, outcome) = cache
            .get_or_compute(&key, &deadline(), || async {
                Ok::<_, &str>((classify_with_rules("plan a trip"), ()))
            })
            .await
            .map(ready)
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Miss);
    }

    #[tokio::test]
    async fn test_disabled_cache_bypasses_backend() {
        let cache = ResponseCache::in_memory(CacheConfig {
            enabled: false,
            ..config()
        });
        let key = CacheKey::new("hello world", "v1");

        for _ in 0..2 {
            let (_, outcome) = cache
                .get_or_compute(&key, &deadline(), || async {
                    Ok::<_, ()>((classify_with_rules("hello world"), ()))
                })
                .await
                .map(ready)
                .unwrap();
            assert_eq!(outcome, CacheOutcome::Bypass);
        }
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_distributed_lock_waits_for_holder() {
        let backend = Arc::new(MemoryBackend::default());
        let config = CacheConfig {
            distributed_lock: true,
            lock_ttl: Duration::from_secs(2),
            lock_poll_interval: Duration::from_millis(5),
            ..config()
        };
        let key = CacheKey::new("compare two datasets", "v1");

        // Another process holds the lock and publishes its result shortly.
        backend
            .set_nx(&key.lock_key(), "other".into(), Duration::from_secs(2))
            .await
            .unwrap();
        let publisher = ResponseCache::new(backend.clone(), config.clone());
        let published = classify_with_rules("compare two datasets");
        let expected = published.clone();
        let key_clone = key.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            publisher.set(&key_clone, &published).await;
        });

        let cache = ResponseCache::new(backend, config);
        let calls = AtomicU32::new(0);
        let (result, outcome) = cache
            .get_or_compute(&key, &deadline(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>((classify_with_rules("compare two datasets"), ()))
            })
            .await
            .map(ready)
            .unwrap();

        assert_eq!(outcome, CacheOutcome::Hit);
        assert_eq!(result, expected);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_distributed_lock_released_after_compute() {
        let backend = Arc::new(MemoryBackend::default());
        let cache = ResponseCache::new(
            backend.clone(),
            CacheConfig {
                distributed_lock: true,
                ..config()
            },
        );
        let key = CacheKey::new("refactor this module", "v1");

        cache
            .get_or_compute(&key, &deadline(), || async {
                Ok::<_, ()>((classify_with_rules("refactor this module"), ()))
            })
            .await
            .unwrap();
        assert!(backend.get(&key.lock_key()).await.unwrap().is_none());
    }
}
