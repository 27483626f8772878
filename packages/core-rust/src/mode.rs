//! Single-tenant / multi-tenant decision flags.
//!
//! [`derive_optimizations`] is the single source of truth for whether
//! tenant-aware code paths run at all. In single-tenant deployments every
//! flag is set and callers bypass tenant resolution and validation entirely.

use serde::{Deserialize, Serialize};

use crate::schema::ConfigSnapshot;

/// Feature-disable flags derived from a [`ConfigSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct TenantOptimizations {
    /// Skip validating the resolved tenant against the identity store.
    pub skip_tenant_validation: bool,
    /// Do not add tenant predicates to queries.
    pub disable_tenant_queries: bool,
    /// Do not bind issued tokens to a tenant.
    pub skip_tenant_tokens: bool,
    /// Do not write tenant-scoped audit records.
    pub disable_tenant_audit: bool,
    /// Use the single-tenant query shapes.
    pub use_simplified_queries: bool,
}

impl TenantOptimizations {
    /// Every tenant-aware path disabled (single-tenant deployments).
    #[must_use]
    pub fn all_enabled() -> Self {
        Self {
            skip_tenant_validation: true,
            disable_tenant_queries: true,
            skip_tenant_tokens: true,
            disable_tenant_audit: true,
            use_simplified_queries: true,
        }
    }

    /// Returns `true` when tenant resolution and validation should be bypassed.
    #[must_use]
    pub fn bypasses_tenancy(&self) -> bool {
        self.skip_tenant_validation && self.disable_tenant_queries
    }
}

/// Maps a configuration snapshot to its optimization flags. Pure.
#[must_use]
pub fn derive_optimizations(config: &ConfigSnapshot) -> TenantOptimizations {
    if !config.multi_tenancy_enabled {
        return TenantOptimizations::all_enabled();
    }

    TenantOptimizations {
        skip_tenant_validation: false,
        disable_tenant_queries: false,
        skip_tenant_tokens: !config.token_isolation,
        disable_tenant_audit: !config.audit_logging,
        use_simplified_queries: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multi_tenant(token_isolation: bool, audit_logging: bool) -> ConfigSnapshot {
        ConfigSnapshot {
            multi_tenancy_enabled: true,
            token_isolation,
            audit_logging,
            ..ConfigSnapshot::default()
        }
    }

    #[test]
    fn single_tenant_sets_every_flag() {
        // Isolation knobs are irrelevant once multi-tenancy is off.
        let config = ConfigSnapshot {
            multi_tenancy_enabled: false,
            token_isolation: true,
            audit_logging: true,
            ..ConfigSnapshot::default()
        };
        let flags = derive_optimizations(&config);
        assert_eq!(flags, TenantOptimizations::all_enabled());
        assert!(flags.bypasses_tenancy());
    }

    #[test]
    fn multi_tenant_with_everything_on() {
        let flags = derive_optimizations(&multi_tenant(true, true));
        assert!(!flags.skip_tenant_validation);
        assert!(!flags.disable_tenant_queries);
        assert!(!flags.skip_tenant_tokens);
        assert!(!flags.disable_tenant_audit);
        assert!(!flags.use_simplified_queries);
        assert!(!flags.bypasses_tenancy());
    }

    #[test]
    fn token_isolation_off_only_skips_tokens() {
        let flags = derive_optimizations(&multi_tenant(false, true));
        assert!(flags.skip_tenant_tokens);
        assert!(!flags.disable_tenant_audit);
        assert!(!flags.skip_tenant_validation);
    }

    #[test]
    fn audit_off_only_disables_audit() {
        let flags = derive_optimizations(&multi_tenant(true, false));
        assert!(!flags.skip_tenant_tokens);
        assert!(flags.disable_tenant_audit);
        assert!(!flags.use_simplified_queries);
    }
}
