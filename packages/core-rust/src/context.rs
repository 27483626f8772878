use crate::types::TenantId;

/// Identity signals carried by a single inbound request.
///
/// Built by whatever transport delivers the request; consumed by
/// [`TenantResolver`](crate::resolver::TenantResolver). All fields are optional
/// because any of them may be missing on a given request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentitySignals {
    /// Tenant set earlier in the flow (session or service-level context).
    pub explicit_tenant: Option<TenantId>,
    /// Request hostname, possibly with a `:port` suffix.
    pub host: Option<String>,
    /// Request URL path.
    pub path: Option<String>,
}

impl IdentitySignals {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_explicit_tenant(mut self, tenant: impl Into<TenantId>) -> Self {
        self.explicit_tenant = Some(tenant.into());
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}
