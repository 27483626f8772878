//! Tenant resolution from request-carried identity signals.
//!
//! Signals are consulted in a fixed priority order and the first one that
//! yields a tenant wins:
//!
//! 1. explicit tenant set earlier in the flow (used verbatim)
//! 2. subdomain of a hostname with more than two labels, unless reserved
//! 3. slug segment following the tenant path prefix (`/api/v1/t/<slug>`)
//!
//! Resolution is a pure function of the signals. Whether the resolved tenant
//! exists or is active is decided later by the validation cache.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::context::IdentitySignals;
use crate::schema::{ConfigSnapshot, DEFAULT_RESERVED_SUBDOMAINS, DEFAULT_TENANT_PATH_PREFIX};
use crate::types::TenantId;

/// DNS label length limit, also applied to path slugs.
const MAX_SLUG_LEN: usize = 63;

/// Which signal produced the tenant for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantSource {
    /// Set by an upstream session or service context.
    Explicit,
    /// First label of the request hostname.
    Subdomain,
    /// Tenant-scoping segment of the URL path.
    Path,
    /// No signal matched; the deployment's default tenant was applied.
    Default,
    /// Multi-tenancy is off; the configured tenant is used unconditionally.
    SingleTenant,
    /// Nothing resolved.
    None,
}

impl TenantSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Subdomain => "subdomain",
            Self::Path => "path",
            Self::Default => "default",
            Self::SingleTenant => "single_tenant",
            Self::None => "none",
        }
    }
}

/// Outcome of resolving one request's signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub tenant: Option<TenantId>,
    pub source: TenantSource,
}

impl Resolution {
    #[must_use]
    pub fn none() -> Self {
        Self {
            tenant: None,
            source: TenantSource::None,
        }
    }

    fn found(tenant: impl Into<TenantId>, source: TenantSource) -> Self {
        Self {
            tenant: Some(tenant.into()),
            source,
        }
    }
}

/// Configuration for [`TenantResolver`].
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Subdomains that never name a tenant. Compared case-insensitively.
    pub reserved_subdomains: Vec<String>,
    /// Path prefix preceding the tenant slug. Must start and end with `/`.
    pub path_prefix: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            reserved_subdomains: DEFAULT_RESERVED_SUBDOMAINS
                .iter()
                .map(ToString::to_string)
                .collect(),
            path_prefix: DEFAULT_TENANT_PATH_PREFIX.to_string(),
        }
    }
}

impl ResolverConfig {
    #[must_use]
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> Self {
        Self {
            reserved_subdomains: snapshot.reserved_subdomains.clone(),
            path_prefix: snapshot.tenant_path_prefix.clone(),
        }
    }
}

/// Combines explicit context, hostname and path into one tenant identifier.
#[derive(Debug, Clone)]
pub struct TenantResolver {
    reserved: HashSet<String>,
    path_prefix: String,
}

impl TenantResolver {
    #[must_use]
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            reserved: config
                .reserved_subdomains
                .iter()
                .map(|s| s.trim().to_ascii_lowercase())
                .collect(),
            path_prefix: config.path_prefix,
        }
    }

    /// Resolves the tenant for a request. First matching signal wins.
    #[must_use]
    pub fn resolve(&self, signals: &IdentitySignals) -> Resolution {
        let resolution = self.first_match(signals);
        trace!(
            tenant = resolution.tenant.as_ref().map(TenantId::as_str),
            source = resolution.source.as_str(),
            "tenant resolved"
        );
        resolution
    }

    fn first_match(&self, signals: &IdentitySignals) -> Resolution {
        if let Some(explicit) = &signals.explicit_tenant {
            // Verbatim, even if it later fails validation.
            if !explicit.as_str().trim().is_empty() {
                return Resolution::found(explicit.clone(), TenantSource::Explicit);
            }
        }

        if let Some(slug) = signals.host.as_deref().and_then(|h| self.subdomain_slug(h)) {
            return Resolution::found(slug, TenantSource::Subdomain);
        }

        if let Some(slug) = signals.path.as_deref().and_then(|p| self.path_slug(p)) {
            return Resolution::found(slug, TenantSource::Path);
        }

        Resolution::none()
    }

    /// Extracts a tenant slug from the first label of `host`.
    ///
    /// Only hostnames with more than two labels qualify. Reserved labels and
    /// labels that are not valid slugs yield `None`.
    #[must_use]
    pub fn subdomain_slug(&self, host: &str) -> Option<String> {
        let host = normalize_host(host)?;
        let labels: Vec<&str> = host.split('.').collect();
        if labels.len() <= 2 || labels.iter().any(|l| l.is_empty()) {
            return None;
        }

        let candidate = labels[0];
        if self.reserved.contains(candidate) || !is_valid_slug(candidate) {
            return None;
        }
        Some(candidate.to_string())
    }

    /// Extracts the slug segment when the path starts with the tenant prefix.
    #[must_use]
    pub fn path_slug(&self, path: &str) -> Option<String> {
        if self.path_prefix.is_empty() {
            return None;
        }
        let rest = path.strip_prefix(self.path_prefix.as_str())?;
        let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let segment = &rest[..end];

        is_valid_slug(segment).then(|| segment.to_string())
    }
}

impl Default for TenantResolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

/// Lowercases, strips `:port` and a trailing dot. IP literals yield `None`.
fn normalize_host(host: &str) -> Option<String> {
    let host = host.trim();
    if host.is_empty() || host.starts_with('[') {
        return None;
    }

    let host = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        Some(_) => return None,
        None => host,
    };
    let host = host.strip_suffix('.').unwrap_or(host).to_ascii_lowercase();

    if host.parse::<Ipv4Addr>().is_ok() {
        return None;
    }
    Some(host)
}

/// `[a-z0-9][a-z0-9-]*`, at most 63 characters.
fn is_valid_slug(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    s.len() <= MAX_SLUG_LEN
        && (first.is_ascii_lowercase() || first.is_ascii_digit())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
