//! Validated deployment configuration.
//!
//! A [`ConfigSnapshot`] is the output of one configuration validation cycle.
//! It is never mutated: the next cycle produces a new snapshot that
//! supersedes it.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::TenantId;

/// Path prefix that scopes a URL to a tenant (`/api/v1/t/<slug>/...`).
pub const DEFAULT_TENANT_PATH_PREFIX: &str = "/api/v1/t/";

/// Subdomains that never name a tenant.
pub const DEFAULT_RESERVED_SUBDOMAINS: &[&str] = &["www", "api", "admin", "app", "localhost"];

/// Tenant used unconditionally when multi-tenancy is disabled and no
/// `DEFAULT_TENANT_ID` is configured.
pub const DEFAULT_SINGLE_TENANT_ID: &str = "00000000-0000-0000-0000-000000000001";

/// Deployment environment the process runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentEnv {
    Development,
    Staging,
    Production,
    Test,
}

impl DeploymentEnv {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// How strictly tenant data is separated at the database level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Every query is tenant-scoped and row-level security is enforced.
    Strict,
    /// Tenants share tables; scoping is applied by the application only.
    Shared,
}

impl IsolationLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Shared => "shared",
        }
    }
}

/// Deployment-wide tenancy switch, derived from a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenancyMode {
    SingleTenant,
    MultiTenant,
}

/// Immutable, validated view of the deployment configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub deployment_env: DeploymentEnv,
    /// Connection string of the application database.
    pub database_url: String,
    /// Location of the authoritative identity store (database or service).
    pub identity_store_url: String,
    pub multi_tenancy_enabled: bool,
    pub isolation_level: IsolationLevel,
    /// Tenant used when no signal resolves one. Always set in single-tenant mode.
    pub default_tenant_id: Option<TenantId>,
    /// Whether issued tokens are bound to a tenant.
    pub token_isolation: bool,
    /// Whether tenant-scoped audit logging is on.
    pub audit_logging: bool,
    pub tenant_path_prefix: String,
    pub reserved_subdomains: Vec<String>,
    pub user_cache_ttl: Duration,
    pub tenant_cache_ttl: Duration,
    pub sweep_interval: Duration,
    /// Upper bound on a single authoritative-store fetch.
    pub fetch_timeout: Duration,
    /// Keys outside the schema, carried through unexamined.
    pub passthrough: BTreeMap<String, String>,
}

impl ConfigSnapshot {
    #[must_use]
    pub fn mode(&self) -> TenancyMode {
        if self.multi_tenancy_enabled {
            TenancyMode::MultiTenant
        } else {
            TenancyMode::SingleTenant
        }
    }
}

impl Default for ConfigSnapshot {
    /// Local development defaults: single-tenant, strict isolation.
    fn default() -> Self {
        let database_url = "postgres://localhost:5432/postgres".to_string();
        Self {
            deployment_env: DeploymentEnv::Development,
            identity_store_url: database_url.clone(),
            database_url,
            multi_tenancy_enabled: false,
            isolation_level: IsolationLevel::Strict,
            default_tenant_id: Some(TenantId::new(DEFAULT_SINGLE_TENANT_ID)),
            token_isolation: true,
            audit_logging: true,
            tenant_path_prefix: DEFAULT_TENANT_PATH_PREFIX.to_string(),
            reserved_subdomains: DEFAULT_RESERVED_SUBDOMAINS
                .iter()
                .map(ToString::to_string)
                .collect(),
            user_cache_ttl: Duration::from_secs(5 * 60),
            tenant_cache_ttl: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
            fetch_timeout: Duration::from_secs(5),
            passthrough: BTreeMap::new(),
        }
    }
}
