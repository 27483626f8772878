use async_trait::async_trait;

use crate::types::{TenantId, TenantIdentity, UserId, UserIdentity};

/// Read-only access to the authoritative identity store.
///
/// The store lives in a different database or service than the caller, so
/// every call is a potentially slow, fallible I/O operation. Implementations
/// return `Ok(None)` for entities that do not exist and `Err` for anything
/// that prevented an answer (unreachable store, malformed row).
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Fetch a user by id.
    async fn fetch_user(&self, id: &UserId) -> anyhow::Result<Option<UserIdentity>>;

    /// Fetch a tenant by id or slug.
    async fn fetch_tenant(&self, id: &TenantId) -> anyhow::Result<Option<TenantIdentity>>;
}
