//! In-memory [`IdentityStore`] backed by [`DashMap`].
//!
//! Used by the probe binary and tests. Fault injection (outage and latency)
//! lets callers exercise fail-closed and timeout paths without a database.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tenancy_core::{IdentityStore, TenantId, TenantIdentity, UserId, UserIdentity};
use tracing::warn;

/// Identity store holding users and tenants in process memory.
///
/// Tenants are addressable by id or by slug.
pub struct MemoryIdentityStore {
    users: DashMap<UserId, UserIdentity>,
    tenants: DashMap<TenantId, TenantIdentity>,
    slugs: DashMap<String, TenantId>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
    user_fetches: AtomicU64,
    tenant_fetches: AtomicU64,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            tenants: DashMap::new(),
            slugs: DashMap::new(),
            unavailable: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
            user_fetches: AtomicU64::new(0),
            tenant_fetches: AtomicU64::new(0),
        }
    }

    /// Inserts or replaces a user.
    pub fn upsert_user(&self, user: UserIdentity) -> Option<UserIdentity> {
        self.users.insert(user.id.clone(), user)
    }

    /// Inserts or replaces a tenant, re-pointing its slug.
    ///
    /// A slug already owned by a different tenant stays with its owner; the
    /// new tenant is then reachable by id only.
    pub fn upsert_tenant(&self, tenant: TenantIdentity) -> Option<TenantIdentity> {
        let previous = self.tenants.insert(tenant.id.clone(), tenant.clone());
        if let Some(old) = &previous {
            self.slugs.remove_if(&old.slug, |_, id| *id == old.id);
        }
        match self.slugs.entry(tenant.slug.clone()) {
            Entry::Occupied(owner) if *owner.get() != tenant.id => {
                warn!(
                    slug = %tenant.slug,
                    owner = %owner.get(),
                    tenant = %tenant.id,
                    "slug already owned by another tenant, keeping existing owner"
                );
            }
            Entry::Occupied(mut owner) => {
                owner.insert(tenant.id);
            }
            Entry::Vacant(slot) => {
                slot.insert(tenant.id);
            }
        }
        previous
    }

    /// Tenant id currently owning `slug`.
    #[must_use]
    pub fn slug_owner(&self, slug: &str) -> Option<TenantId> {
        self.slugs.get(slug).map(|id| id.clone())
    }

    pub fn remove_user(&self, id: &UserId) -> Option<UserIdentity> {
        self.users.remove(id).map(|(_, u)| u)
    }

    pub fn remove_tenant(&self, id: &TenantId) -> Option<TenantIdentity> {
        let (_, tenant) = self.tenants.remove(id)?;
        self.slugs.remove_if(&tenant.slug, |_, mapped| mapped == id);
        Some(tenant)
    }

    /// Makes every subsequent fetch fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delays every fetch by `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Number of user fetches served, including failed ones.
    #[must_use]
    pub fn user_fetches(&self) -> u64 {
        self.user_fetches.load(Ordering::SeqCst)
    }

    /// Number of tenant fetches served, including failed ones.
    #[must_use]
    pub fn tenant_fetches(&self) -> u64 {
        self.tenant_fetches.load(Ordering::SeqCst)
    }

    async fn simulate_io(&self) -> anyhow::Result<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            anyhow::bail!("identity store unavailable");
        }
        Ok(())
    }
}

impl Default for MemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn fetch_user(&self, id: &UserId) -> anyhow::Result<Option<UserIdentity>> {
        self.user_fetches.fetch_add(1, Ordering::SeqCst);
        self.simulate_io().await?;
        Ok(self.users.get(id).map(|u| u.clone()))
    }

    async fn fetch_tenant(&self, id: &TenantId) -> anyhow::Result<Option<TenantIdentity>> {
        self.tenant_fetches.fetch_add(1, Ordering::SeqCst);
        self.simulate_io().await?;
        if let Some(tenant) = self.tenants.get(id) {
            return Ok(Some(tenant.clone()));
        }
        let Some(resolved) = self.slugs.get(id.as_str()).map(|r| r.clone()) else {
            return Ok(None);
        };
        Ok(self.tenants.get(&resolved).map(|t| t.clone()))
    }
}

#[cfg(test)]
mod tests {
    use tenancy_core::{TenantPlan, TenantStatus, UserRole};

    use super::*;

    fn tenant(id: &str, slug: &str) -> TenantIdentity {
        TenantIdentity {
            id: TenantId::new(id),
            slug: slug.to_string(),
            name: slug.to_uppercase(),
            plan: TenantPlan::Free,
            status: TenantStatus::Active,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn tenant_found_by_id_or_slug() {
        let store = MemoryIdentityStore::new();
        store.upsert_tenant(tenant("t-1", "acme"));

        let by_id = store.fetch_tenant(&TenantId::new("t-1")).await.unwrap();
        let by_slug = store.fetch_tenant(&TenantId::new("acme")).await.unwrap();
        assert_eq!(by_id, by_slug);
        assert!(by_id.is_some());
        assert_eq!(store.tenant_fetches(), 2);
    }

    #[tokio::test]
    async fn renamed_slug_stops_resolving() {
        let store = MemoryIdentityStore::new();
        store.upsert_tenant(tenant("t-1", "acme"));
        store.upsert_tenant(tenant("t-1", "acme-corp"));

        assert!(store.fetch_tenant(&TenantId::new("acme")).await.unwrap().is_none());
        assert!(store
            .fetch_tenant(&TenantId::new("acme-corp"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn duplicate_slug_keeps_its_first_owner() {
        let store = MemoryIdentityStore::new();
        store.upsert_tenant(tenant("t-1", "acme"));
        store.upsert_tenant(tenant("t-2", "acme"));

        assert_eq!(store.slug_owner("acme"), Some(TenantId::new("t-1")));
        let by_slug = store.fetch_tenant(&TenantId::new("acme")).await.unwrap();
        assert_eq!(by_slug.map(|t| t.id), Some(TenantId::new("t-1")));
        assert!(store.fetch_tenant(&TenantId::new("t-2")).await.unwrap().is_some());

        // Once the owner is gone the slug can be claimed.
        store.remove_tenant(&TenantId::new("t-1"));
        store.upsert_tenant(tenant("t-2", "acme"));
        assert_eq!(store.slug_owner("acme"), Some(TenantId::new("t-2")));
    }

    #[tokio::test]
    async fn removal_drops_slug() {
        let store = MemoryIdentityStore::new();
        store.upsert_tenant(tenant("t-1", "acme"));
        assert!(store.remove_tenant(&TenantId::new("t-1")).is_some());
        assert!(store.fetch_tenant(&TenantId::new("acme")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unavailable_store_errors() {
        let store = MemoryIdentityStore::new();
        store.upsert_user(UserIdentity {
            id: UserId::new("u-1"),
            email: "ada@acme.test".to_string(),
            role: UserRole::Member,
            tenant_id: None,
            is_active: true,
        });
        store.set_unavailable(true);

        let err = store.fetch_user(&UserId::new("u-1")).await.unwrap_err();
        assert!(err.to_string().contains("unavailable"));
        assert_eq!(store.user_fetches(), 1);

        store.set_unavailable(false);
        assert!(store.fetch_user(&UserId::new("u-1")).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn latency_is_applied_before_answering() {
        let store = MemoryIdentityStore::new();
        store.set_latency(Duration::from_secs(2));

        let start = tokio::time::Instant::now();
        store.fetch_user(&UserId::new("missing")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
