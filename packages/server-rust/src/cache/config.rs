use std::time::Duration;

use tenancy_core::ConfigSnapshot;

/// TTLs and timing for the identity validation caches.
///
/// TTLs are per entity type and fixed for the lifetime of a cache; they are
/// never set per entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Users change role and active status often, so they expire quickly.
    pub user_ttl: Duration,
    /// Tenants change plan and status rarely.
    pub tenant_ttl: Duration,
    /// Interval between background sweeps of expired entries.
    pub sweep_interval: Duration,
    /// Default upper bound on a single authoritative-store fetch.
    pub fetch_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            user_ttl: Duration::from_secs(5 * 60),
            tenant_ttl: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> Self {
        Self {
            user_ttl: snapshot.user_cache_ttl,
            tenant_ttl: snapshot.tenant_cache_ttl,
            sweep_interval: snapshot.sweep_interval,
            fetch_timeout: snapshot.fetch_timeout,
        }
    }
}
