//! Read-through TTL cache over the authoritative identity store.
//!
//! [`ValidationCache`] answers "does this entity exist and is it active?"
//! without a store round-trip on every request. Entries are fresh for the
//! cache's TTL; anything older is treated as a miss at read time and
//! refetched. Fetch failures and timeouts fail closed and are never cached.

use std::fmt::Display;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tenancy_core::{
    CachedIdentity, ClockSource, IdentityStore, SystemClock, TenantId, TenantIdentity, UserId,
    UserIdentity,
};
use tracing::{debug, warn};

use super::entry::CacheEntry;
use crate::traits::Sweepable;

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// Source of truth consulted on a cache miss.
#[async_trait]
pub trait EntityFetcher<K, V>: Send + Sync
where
    K: Send + Sync,
    V: Send,
{
    /// Fetch one entity. `Ok(None)` means it does not exist.
    async fn fetch(&self, key: &K) -> anyhow::Result<Option<V>>;
}

/// Fetches users from an [`IdentityStore`].
pub struct UserFetcher(pub Arc<dyn IdentityStore>);

#[async_trait]
impl EntityFetcher<UserId, UserIdentity> for UserFetcher {
    async fn fetch(&self, key: &UserId) -> anyhow::Result<Option<UserIdentity>> {
        self.0.fetch_user(key).await
    }
}

/// Fetches tenants from an [`IdentityStore`].
pub struct TenantFetcher(pub Arc<dyn IdentityStore>);

#[async_trait]
impl EntityFetcher<TenantId, TenantIdentity> for TenantFetcher {
    async fn fetch(&self, key: &TenantId) -> anyhow::Result<Option<TenantIdentity>> {
        self.0.fetch_tenant(key).await
    }
}

/// Why a fetch produced no answer.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{kind} fetch timed out after {timeout_ms}ms")]
    Timeout { kind: &'static str, timeout_ms: u64 },
    #[error("identity store error: {0}")]
    Store(#[from] anyhow::Error),
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Point-in-time counters for one cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub kind: &'static str,
    /// Entries currently held, including stale ones not yet swept.
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub fetch_failures: u64,
    pub ttl_secs: u64,
}

// ---------------------------------------------------------------------------
// ValidationCache
// ---------------------------------------------------------------------------

/// TTL-governed cache from entity key to entity record.
///
/// Concurrency:
/// - the map is sharded (`DashMap`), so reads and writes for distinct keys
///   proceed in parallel;
/// - no shard lock is held across the store fetch;
/// - concurrent misses for the same key each fetch and the last insert wins.
///   There is no request coalescing.
pub struct ValidationCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    fetcher: Arc<dyn EntityFetcher<K, V>>,
    clock: Arc<dyn ClockSource>,
    ttl: Duration,
    fetch_timeout: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    fetch_failures: AtomicU64,
}

impl<K, V> ValidationCache<K, V>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: CachedIdentity,
{
    /// Creates a cache reading wall-clock time from the system clock.
    #[must_use]
    pub fn new(fetcher: Arc<dyn EntityFetcher<K, V>>, ttl: Duration, fetch_timeout: Duration) -> Self {
        Self::with_clock(fetcher, ttl, fetch_timeout, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(
        fetcher: Arc<dyn EntityFetcher<K, V>>,
        ttl: Duration,
        fetch_timeout: Duration,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            fetcher,
            clock,
            ttl,
            fetch_timeout,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        V::KIND
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached record if a fresh entry exists. Never fetches.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let found = self
            .entries
            .get(key)
            .filter(|entry| entry.is_fresh(now, self.ttl))
            .map(|entry| entry.data.clone());

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("tenancy_cache_hits_total", "kind" => V::KIND).increment(1);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("tenancy_cache_misses_total", "kind" => V::KIND).increment(1);
        }
        found
    }

    /// Inserts a record as fresh at the current time, replacing any entry.
    pub fn insert(&self, key: K, value: V) {
        let now = self.clock.now();
        self.entries.insert(key, CacheEntry::new(value, now));
    }

    /// Returns the record, fetching it on a miss with the default timeout.
    ///
    /// `None` covers "does not exist", "store unreachable" and "timed out";
    /// only successful fetches of existing entities are cached.
    pub async fn load(&self, key: &K) -> Option<V> {
        self.load_within(key, self.fetch_timeout).await
    }

    /// Like [`load`](Self::load) with a caller-supplied fetch timeout.
    pub async fn load_within(&self, key: &K, timeout: Duration) -> Option<V> {
        if let Some(hit) = self.get(key) {
            return Some(hit);
        }

        match self.fetch(key, timeout).await {
            Ok(Some(value)) => {
                self.insert(key.clone(), value.clone());
                Some(value)
            }
            Ok(None) => {
                debug!(kind = V::KIND, key = %key, "identity not found");
                None
            }
            Err(err) => {
                self.fetch_failures.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("tenancy_cache_fetch_failures_total", "kind" => V::KIND)
                    .increment(1);
                warn!(kind = V::KIND, key = %key, error = %err, "identity fetch failed, treating as not found");
                None
            }
        }
    }

    /// Returns `true` iff the entity exists and is active.
    pub async fn validate(&self, key: &K) -> bool {
        self.validate_within(key, self.fetch_timeout).await
    }

    /// Like [`validate`](Self::validate) with a caller-supplied fetch timeout.
    pub async fn validate_within(&self, key: &K, timeout: Duration) -> bool {
        self.load_within(key, timeout)
            .await
            .is_some_and(|value| value.is_valid())
    }

    /// Issues one store fetch bounded by `timeout`. Does not touch the cache.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Timeout`] if the store did not answer in time and
    /// [`FetchError::Store`] if it answered with an error.
    pub async fn fetch(&self, key: &K, timeout: Duration) -> Result<Option<V>, FetchError> {
        match tokio::time::timeout(timeout, self.fetcher.fetch(key)).await {
            Ok(result) => Ok(result?),
            Err(_elapsed) => Err(FetchError::Timeout {
                kind: V::KIND,
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Removes the entry for `key` regardless of freshness.
    ///
    /// Must be called after any write to the authoritative store that could
    /// change the entity. Returns `true` if an entry was removed.
    pub fn invalidate(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            kind: V::KIND,
            size: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            ttl_secs: self.ttl.as_secs(),
        }
    }

    /// Removes stale entries. Returns how many were removed.
    ///
    /// Stale keys are collected first and then removed one by one with a
    /// conditional remove, so an entry refreshed between the scan and the
    /// removal survives.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let stale: Vec<K> = self
            .entries
            .iter()
            .filter(|entry| !entry.is_fresh(now, self.ttl))
            .map(|entry| entry.key().clone())
            .collect();

        stale
            .iter()
            .filter(|key| {
                self.entries
                    .remove_if(*key, |_, entry| !entry.is_fresh(now, self.ttl))
                    .is_some()
            })
            .count()
    }
}

impl<K, V> Sweepable for ValidationCache<K, V>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: CachedIdentity,
{
    fn kind(&self) -> &'static str {
        V::KIND
    }

    fn purge_expired(&self) -> usize {
        ValidationCache::purge_expired(self)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Cache of users keyed by user id.
pub type UserCache = ValidationCache<UserId, UserIdentity>;

/// Cache of tenants keyed by tenant id or slug.
pub type TenantCache = ValidationCache<TenantId, TenantIdentity>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
