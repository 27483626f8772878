//! Timestamped cache entries.

use std::time::Duration;

/// A cached record and the wall-clock time it was inserted.
///
/// Freshness is a read-time predicate: an entry is fresh iff
/// `now - inserted_at_ms <= ttl`. Nothing mutates an entry after insertion;
/// a refetch replaces it.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    /// Milliseconds since epoch, read from the cache's clock source.
    pub inserted_at_ms: u64,
}

impl<T> CacheEntry<T> {
    #[must_use]
    pub fn new(data: T, now_ms: u64) -> Self {
        Self {
            data,
            inserted_at_ms: now_ms,
        }
    }

    /// Age of the entry at `now_ms`. Never negative, even if the clock moved back.
    #[must_use]
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.inserted_at_ms)
    }

    #[must_use]
    pub fn is_fresh(&self, now_ms: u64, ttl: Duration) -> bool {
        u128::from(self.age_ms(now_ms)) <= ttl.as_millis()
    }
}
