use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a tenant: either its UUID or its URL-safe slug.
///
/// The authoritative store accepts both forms, so resolution signals
/// (subdomain, path segment) and session-provided ids share one key type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of an acting user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Billing plan attached to a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantPlan {
    Free,
    Pro,
    Enterprise,
    /// Plan name the store knows but this layer does not interpret.
    #[serde(untagged)]
    Other(String),
}

/// Lifecycle status of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Suspended,
    Archived,
}

/// Role of a user within its tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Owner,
    Admin,
    Member,
    Viewer,
}

/// Tenant record as fetched from the authoritative store.
///
/// Immutable once fetched: a refetch replaces the whole record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantIdentity {
    pub id: TenantId,
    pub slug: String,
    pub name: String,
    pub plan: TenantPlan,
    pub status: TenantStatus,
    pub is_active: bool,
}

/// User record as fetched from the authoritative store.
///
/// `tenant_id` is an unenforced association: invalidating a tenant does not
/// touch cached users that point at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: UserId,
    pub email: String,
    pub role: UserRole,
    pub tenant_id: Option<TenantId>,
    pub is_active: bool,
}

/// Record that can be held by a validation cache.
///
/// `KIND` labels logs and metrics; `is_valid` decides what `validate()` reports
/// for an entity that exists.
pub trait CachedIdentity: Clone + Send + Sync + 'static {
    /// Short lowercase label for this entity type (e.g. `"user"`).
    const KIND: &'static str;

    /// Returns `true` if the entity counts as valid for request processing.
    fn is_valid(&self) -> bool;
}

impl CachedIdentity for TenantIdentity {
    const KIND: &'static str = "tenant";

    /// A tenant is valid only when flagged active and not suspended or archived.
    fn is_valid(&self) -> bool {
        self.is_active && self.status == TenantStatus::Active
    }
}

impl CachedIdentity for UserIdentity {
    const KIND: &'static str = "user";

    fn is_valid(&self) -> bool {
        self.is_active
    }
}
