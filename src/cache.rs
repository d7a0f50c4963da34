//! Time-based memoization of upstream fetches.
//!
//! Both upstream datasets change slowly, so a successful fetch is kept for a
//! fixed TTL (one hour by default) and shared by every pipeline run inside that
//! window. Entries are keyed so one cache can hold results for several request
//! shapes (e.g. different recency windows).
//!
//! The lock is never held across the fetch itself. Two callers that find the
//! same entry stale at the same moment may both fetch; the later write wins.
//! Upstream fetches are idempotent, so this costs at most one extra request.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::RwLock;

/// Source of the current time, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<std::sync::RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(std::sync::RwLock::new(start)),
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// A memoized value and the time it was fetched.
#[derive(Debug)]
pub struct CacheEntry<V> {
    pub value: Arc<V>,
    pub fetched_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        now - self.fetched_at < ttl
    }
}

/// Keyed TTL cache shared across clones via `Arc<RwLock<>>`.
pub struct TtlCache<K, V> {
    name: &'static str,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
    inner: Arc<RwLock<HashMap<K, CacheEntry<V>>>>,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            ttl: self.ttl,
            clock: Arc::clone(&self.clock),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    pub fn new(name: &'static str, ttl: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            ttl,
            clock,
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    /// Cached value for `key` if it has not expired (read lock only).
    pub async fn get_fresh(&self, key: &K) -> Option<Arc<V>> {
        let now = self.clock.now();
        let cache = self.inner.read().await;
        cache
            .get(key)
            .filter(|entry| entry.is_fresh(now, self.ttl))
            .map(|entry| Arc::clone(&entry.value))
    }

    /// Return the cached value for `key`, or run `fetch` and memoize its result.
    ///
    /// Errors are passed through and never cached, so the next call retries.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, fetch: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get_fresh(&key).await {
            tracing::debug!(cache = self.name, ?key, "cache hit");
            return Ok(value);
        }

        tracing::debug!(cache = self.name, ?key, "cache miss, fetching");
        let value = Arc::new(fetch().await?);

        let mut cache = self.inner.write().await;
        cache.insert(
            key,
            CacheEntry {
                value: Arc::clone(&value),
                fetched_at: self.clock.now(),
            },
        );
        Ok(value)
    }

    /// Time the entry for `key` was fetched, fresh or not.
    pub async fn fetched_at(&self, key: &K) -> Option<DateTime<Utc>> {
        self.inner.read().await.get(key).map(|e| e.fetched_at)
    }

    /// Drop every entry.
    pub async fn invalidate(&self) {
        let mut cache = self.inner.write().await;
        tracing::info!(cache = self.name, entries = cache.len(), "invalidating cache");
        cache.clear();
    }
}
