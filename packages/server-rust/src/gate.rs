//! Composition root for per-request identity decisions.
//!
//! [`IdentityGate`] owns the current configuration snapshot, the derived
//! tenancy optimizations, the resolver, both validation caches and the
//! sweeper that bounds their memory. Decision state is swapped atomically on
//! [`apply_snapshot`](IdentityGate::apply_snapshot); caches survive swaps.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Serialize;
use tenancy_core::{
    derive_optimizations, ClockSource, ConfigSnapshot, IdentitySignals, IdentityStore,
    Resolution, ResolverConfig, SystemClock, TenancyMode, TenantId, TenantOptimizations,
    TenantResolver, TenantSource, UserId,
};
use tracing::info;

use crate::cache::{
    CacheConfig, CacheStats, CacheSweeper, TenantCache, TenantFetcher, UserCache, UserFetcher,
    ValidationCache,
};
use crate::traits::Sweepable;

/// Decision state replaced as a unit when configuration changes.
struct GateState {
    snapshot: Arc<ConfigSnapshot>,
    optimizations: TenantOptimizations,
    resolver: TenantResolver,
}

impl GateState {
    fn new(snapshot: Arc<ConfigSnapshot>) -> Self {
        Self {
            optimizations: derive_optimizations(&snapshot),
            resolver: TenantResolver::new(ResolverConfig::from_snapshot(&snapshot)),
            snapshot,
        }
    }
}

/// Identity decision for one request.
///
/// The gate never rejects on its own; callers act on [`is_authorized`](Self::is_authorized).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestScope {
    pub tenant: Option<TenantId>,
    pub source: TenantSource,
    /// Whether the resolved tenant exists and is active.
    pub tenant_valid: bool,
    /// Whether the acting user exists and is active.
    pub user_valid: bool,
    pub optimizations: TenantOptimizations,
}

impl RequestScope {
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.tenant_valid && self.user_valid
    }
}

/// Cache counters for both entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateCacheStats {
    pub users: CacheStats,
    pub tenants: CacheStats,
}

/// Owner of the identity caches and the current tenancy decision state.
pub struct IdentityGate {
    state: ArcSwap<GateState>,
    users: Arc<UserCache>,
    tenants: Arc<TenantCache>,
    sweeper: Mutex<Option<CacheSweeper>>,
}

impl IdentityGate {
    /// Builds a gate over `store` and starts the cache sweeper.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn new(snapshot: Arc<ConfigSnapshot>, store: Arc<dyn IdentityStore>) -> Self {
        Self::with_clock(snapshot, store, Arc::new(SystemClock))
    }

    /// Like [`new`](Self::new), with cache freshness measured by `clock`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn with_clock(
        snapshot: Arc<ConfigSnapshot>,
        store: Arc<dyn IdentityStore>,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        let config = CacheConfig::from_snapshot(&snapshot);
        let users: Arc<UserCache> = Arc::new(ValidationCache::with_clock(
            Arc::new(UserFetcher(Arc::clone(&store))),
            config.user_ttl,
            config.fetch_timeout,
            Arc::clone(&clock),
        ));
        let tenants: Arc<TenantCache> = Arc::new(ValidationCache::with_clock(
            Arc::new(TenantFetcher(store)),
            config.tenant_ttl,
            config.fetch_timeout,
            clock,
        ));

        let managed: Vec<Arc<dyn Sweepable>> = vec![
            Arc::clone(&users) as Arc<dyn Sweepable>,
            Arc::clone(&tenants) as Arc<dyn Sweepable>,
        ];
        let sweeper = CacheSweeper::start(managed, config.sweep_interval);

        info!(
            mode = ?snapshot.mode(),
            env = snapshot.deployment_env.as_str(),
            isolation = snapshot.isolation_level.as_str(),
            user_ttl_secs = config.user_ttl.as_secs(),
            tenant_ttl_secs = config.tenant_ttl.as_secs(),
            "identity gate started"
        );

        Self {
            state: ArcSwap::from_pointee(GateState::new(snapshot)),
            users,
            tenants,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.state.load().snapshot)
    }

    #[must_use]
    pub fn optimizations(&self) -> TenantOptimizations {
        self.state.load().optimizations
    }

    #[must_use]
    pub fn mode(&self) -> TenancyMode {
        self.state.load().snapshot.mode()
    }

    /// Supersedes the decision state. Cached identities are kept.
    pub fn apply_snapshot(&self, snapshot: Arc<ConfigSnapshot>) {
        let previous = self.state.load().snapshot.mode();
        let next = GateState::new(snapshot);
        info!(
            from = ?previous,
            to = ?next.snapshot.mode(),
            "configuration snapshot applied"
        );
        self.state.store(Arc::new(next));
    }

    /// Resolves the tenant for a request without touching the caches.
    #[must_use]
    pub fn resolve_tenant(&self, signals: &IdentitySignals) -> Resolution {
        resolve_with(&self.state.load(), signals)
    }

    /// Resolves and validates using the configured fetch timeout.
    pub async fn authorize(&self, signals: &IdentitySignals, user: Option<&UserId>) -> RequestScope {
        let timeout = self.state.load().snapshot.fetch_timeout;
        self.authorize_within(signals, user, timeout).await
    }

    /// Resolves the tenant and validates it and the acting user.
    ///
    /// Single-tenant deployments never consult the caches or the store.
    /// Absent entities are invalid.
    pub async fn authorize_within(
        &self,
        signals: &IdentitySignals,
        user: Option<&UserId>,
        timeout: Duration,
    ) -> RequestScope {
        let state = self.state.load_full();
        let resolution = resolve_with(&state, signals);

        if state.optimizations.skip_tenant_validation {
            return RequestScope {
                tenant: resolution.tenant,
                source: resolution.source,
                tenant_valid: true,
                user_valid: true,
                optimizations: state.optimizations,
            };
        }

        let tenant_check = async {
            match &resolution.tenant {
                Some(id) => self.tenants.validate_within(id, timeout).await,
                None => false,
            }
        };
        let user_check = async {
            match user {
                Some(id) => self.users.validate_within(id, timeout).await,
                None => false,
            }
        };
        let (tenant_valid, user_valid) = tokio::join!(tenant_check, user_check);

        RequestScope {
            tenant: resolution.tenant,
            source: resolution.source,
            tenant_valid,
            user_valid,
            optimizations: state.optimizations,
        }
    }

    pub fn invalidate_user(&self, id: &UserId) -> bool {
        self.users.invalidate(id)
    }

    pub fn invalidate_tenant(&self, id: &TenantId) -> bool {
        self.tenants.invalidate(id)
    }

    pub fn clear_caches(&self) {
        self.users.clear();
        self.tenants.clear();
    }

    #[must_use]
    pub fn cache_stats(&self) -> GateCacheStats {
        GateCacheStats {
            users: self.users.stats(),
            tenants: self.tenants.stats(),
        }
    }

    #[must_use]
    pub fn users(&self) -> &Arc<UserCache> {
        &self.users
    }

    #[must_use]
    pub fn tenants(&self) -> &Arc<TenantCache> {
        &self.tenants
    }

    /// Runs a sweep pass now. `None` once the gate has been destroyed.
    pub async fn sweep_now(&self) -> Option<usize> {
        // Guard must not be held across the await.
        let handle = self.sweeper.lock().as_ref().and_then(CacheSweeper::request_handle)?;
        handle.sweep().await
    }

    /// Stops background sweeping. Idempotent.
    pub async fn destroy(&self) {
        let sweeper = self.sweeper.lock().take();
        if let Some(mut sweeper) = sweeper {
            sweeper.destroy().await;
            info!("identity gate destroyed");
        }
    }
}

fn resolve_with(state: &GateState, signals: &IdentitySignals) -> Resolution {
    let default_tenant = state.snapshot.default_tenant_id.clone();

    if state.optimizations.bypasses_tenancy() {
        return Resolution {
            tenant: default_tenant,
            source: TenantSource::SingleTenant,
        };
    }

    let resolution = state.resolver.resolve(signals);
    if resolution.tenant.is_some() {
        return resolution;
    }
    match default_tenant {
        Some(tenant) => Resolution {
            tenant: Some(tenant),
            source: TenantSource::Default,
        },
        None => Resolution::none(),
    }
}
