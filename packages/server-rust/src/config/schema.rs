//! Schema validation: raw key/value configuration to [`ConfigSnapshot`].
//!
//! Validation always rebuilds the whole snapshot. A malformed value aborts
//! the cycle with an error naming the key; there is no partially valid
//! snapshot.

use std::collections::BTreeMap;
use std::time::Duration;

use tenancy_core::schema::{
    DEFAULT_RESERVED_SUBDOMAINS, DEFAULT_SINGLE_TENANT_ID, DEFAULT_TENANT_PATH_PREFIX,
};
use tenancy_core::{ConfigSnapshot, DeploymentEnv, IsolationLevel, TenantId};
use tracing::warn;
use url::Url;
use uuid::Uuid;

/// Environment-like configuration source.
pub type RawConfig = BTreeMap<String, String>;

/// Recognised configuration keys.
pub mod keys {
    pub const DEPLOYMENT_ENV: &str = "DEPLOYMENT_ENV";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    pub const IDENTITY_STORE_URL: &str = "IDENTITY_STORE_URL";
    pub const MULTI_TENANCY_ENABLED: &str = "MULTI_TENANCY_ENABLED";
    pub const TENANT_ISOLATION_LEVEL: &str = "TENANT_ISOLATION_LEVEL";
    pub const DEFAULT_TENANT_ID: &str = "DEFAULT_TENANT_ID";
    pub const TENANT_TOKEN_ISOLATION: &str = "TENANT_TOKEN_ISOLATION";
    pub const TENANT_AUDIT_LOGGING: &str = "TENANT_AUDIT_LOGGING";
    pub const TENANT_PATH_PREFIX: &str = "TENANT_PATH_PREFIX";
    pub const RESERVED_SUBDOMAINS: &str = "RESERVED_SUBDOMAINS";
    pub const USER_CACHE_TTL_SECS: &str = "USER_CACHE_TTL_SECS";
    pub const TENANT_CACHE_TTL_SECS: &str = "TENANT_CACHE_TTL_SECS";
    pub const CACHE_SWEEP_INTERVAL_SECS: &str = "CACHE_SWEEP_INTERVAL_SECS";
    pub const IDENTITY_FETCH_TIMEOUT_MS: &str = "IDENTITY_FETCH_TIMEOUT_MS";

    /// Every key the schema validates. Anything else is passed through.
    pub const ALL: &[&str] = &[
        DEPLOYMENT_ENV,
        DATABASE_URL,
        IDENTITY_STORE_URL,
        MULTI_TENANCY_ENABLED,
        TENANT_ISOLATION_LEVEL,
        DEFAULT_TENANT_ID,
        TENANT_TOKEN_ISOLATION,
        TENANT_AUDIT_LOGGING,
        TENANT_PATH_PREFIX,
        RESERVED_SUBDOMAINS,
        USER_CACHE_TTL_SECS,
        TENANT_CACHE_TTL_SECS,
        CACHE_SWEEP_INTERVAL_SECS,
        IDENTITY_FETCH_TIMEOUT_MS,
    ];

    /// Keys whose values affect correctness. Only these feed the memo fingerprint.
    pub const CRITICAL: &[&str] = &[
        DEPLOYMENT_ENV,
        DATABASE_URL,
        IDENTITY_STORE_URL,
        MULTI_TENANCY_ENABLED,
        TENANT_ISOLATION_LEVEL,
        DEFAULT_TENANT_ID,
    ];
}

/// Malformed configuration. Fatal: callers must not proceed without a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration key {key}")]
    Missing { key: &'static str },
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    /// The configuration key that failed validation.
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            Self::Missing { key } | Self::Invalid { key, .. } => key,
        }
    }

    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Reads the process environment into a [`RawConfig`].
///
/// Variables whose name or value is not valid UTF-8 are skipped.
#[must_use]
pub fn from_env() -> RawConfig {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// Runs full schema validation and defaulting over `raw`.
///
/// # Errors
///
/// Returns [`ConfigError`] for the first missing or malformed key.
pub fn validate_config(raw: &RawConfig) -> Result<ConfigSnapshot, ConfigError> {
    let deployment_env = match value(raw, keys::DEPLOYMENT_ENV) {
        None => DeploymentEnv::Development,
        Some(v) => parse_deployment_env(v)?,
    };

    let database_url = value(raw, keys::DATABASE_URL).ok_or(ConfigError::Missing {
        key: keys::DATABASE_URL,
    })?;
    parse_url(keys::DATABASE_URL, database_url, &["postgres", "postgresql"])?;

    let identity_store_url = match value(raw, keys::IDENTITY_STORE_URL) {
        None => database_url,
        Some(v) => {
            parse_url(
                keys::IDENTITY_STORE_URL,
                v,
                &["postgres", "postgresql", "http", "https"],
            )?;
            v
        }
    };

    let multi_tenancy_enabled = bool_or(raw, keys::MULTI_TENANCY_ENABLED, false)?;

    let isolation_level = match value(raw, keys::TENANT_ISOLATION_LEVEL) {
        None => IsolationLevel::Strict,
        Some(v) => parse_isolation_level(v)?,
    };

    let default_tenant_id = match value(raw, keys::DEFAULT_TENANT_ID) {
        Some(v) => Some(parse_tenant_uuid(v)?),
        None if multi_tenancy_enabled => None,
        None => Some(TenantId::new(DEFAULT_SINGLE_TENANT_ID)),
    };

    let tenant_path_prefix = match value(raw, keys::TENANT_PATH_PREFIX) {
        None => DEFAULT_TENANT_PATH_PREFIX.to_string(),
        Some(v) => parse_path_prefix(v)?,
    };

    let reserved_subdomains = match value(raw, keys::RESERVED_SUBDOMAINS) {
        None => DEFAULT_RESERVED_SUBDOMAINS
            .iter()
            .map(ToString::to_string)
            .collect(),
        Some(v) => parse_reserved_subdomains(v)?,
    };

    if multi_tenancy_enabled
        && isolation_level == IsolationLevel::Shared
        && deployment_env == DeploymentEnv::Production
    {
        warn!("multi-tenant production deployment is running with shared isolation");
    }

    let passthrough = raw
        .iter()
        .filter(|(k, _)| !keys::ALL.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(ConfigSnapshot {
        deployment_env,
        database_url: database_url.to_string(),
        identity_store_url: identity_store_url.to_string(),
        multi_tenancy_enabled,
        isolation_level,
        default_tenant_id,
        token_isolation: bool_or(raw, keys::TENANT_TOKEN_ISOLATION, true)?,
        audit_logging: bool_or(raw, keys::TENANT_AUDIT_LOGGING, true)?,
        tenant_path_prefix,
        reserved_subdomains,
        user_cache_ttl: Duration::from_secs(positive_or(raw, keys::USER_CACHE_TTL_SECS, 300)?),
        tenant_cache_ttl: Duration::from_secs(positive_or(raw, keys::TENANT_CACHE_TTL_SECS, 3600)?),
        sweep_interval: Duration::from_secs(positive_or(raw, keys::CACHE_SWEEP_INTERVAL_SECS, 600)?),
        fetch_timeout: Duration::from_millis(positive_or(raw, keys::IDENTITY_FETCH_TIMEOUT_MS, 5000)?),
        passthrough,
    })
}

/// Trimmed value for `key`; empty strings count as absent.
fn value<'a>(raw: &'a RawConfig, key: &str) -> Option<&'a str> {
    raw.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn parse_deployment_env(v: &str) -> Result<DeploymentEnv, ConfigError> {
    match v.to_ascii_lowercase().as_str() {
        "development" | "dev" => Ok(DeploymentEnv::Development),
        "staging" => Ok(DeploymentEnv::Staging),
        "production" | "prod" => Ok(DeploymentEnv::Production),
        "test" => Ok(DeploymentEnv::Test),
        other => Err(ConfigError::invalid(
            keys::DEPLOYMENT_ENV,
            format!("unknown environment '{other}'"),
        )),
    }
}

fn parse_isolation_level(v: &str) -> Result<IsolationLevel, ConfigError> {
    match v.to_ascii_lowercase().as_str() {
        "strict" => Ok(IsolationLevel::Strict),
        "shared" => Ok(IsolationLevel::Shared),
        other => Err(ConfigError::invalid(
            keys::TENANT_ISOLATION_LEVEL,
            format!("expected 'strict' or 'shared', got '{other}'"),
        )),
    }
}

fn parse_bool(key: &'static str, v: &str) -> Result<bool, ConfigError> {
    match v.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::invalid(
            key,
            format!("expected a boolean, got '{other}'"),
        )),
    }
}

fn bool_or(raw: &RawConfig, key: &'static str, default: bool) -> Result<bool, ConfigError> {
    value(raw, key).map_or(Ok(default), |v| parse_bool(key, v))
}

fn positive_or(raw: &RawConfig, key: &'static str, default: u64) -> Result<u64, ConfigError> {
    let Some(v) = value(raw, key) else {
        return Ok(default);
    };
    match v.parse::<u64>() {
        Ok(0) => Err(ConfigError::invalid(key, "must be greater than zero")),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigError::invalid(key, format!("'{v}' is not an integer: {e}"))),
    }
}

/// Parses `v` as a URL with an allowed scheme and a non-empty host.
fn parse_url(key: &'static str, v: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let url = Url::parse(v).map_err(|e| ConfigError::invalid(key, format!("malformed URL: {e}")))?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::invalid(
            key,
            format!(
                "unsupported scheme '{}', expected one of {}",
                url.scheme(),
                schemes.join(", ")
            ),
        ));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::invalid(key, "URL has no host"));
    }
    Ok(())
}

fn parse_tenant_uuid(v: &str) -> Result<TenantId, ConfigError> {
    Uuid::parse_str(v)
        .map(|id| TenantId::new(id.hyphenated().to_string()))
        .map_err(|e| ConfigError::invalid(keys::DEFAULT_TENANT_ID, format!("not a UUID: {e}")))
}

fn parse_path_prefix(v: &str) -> Result<String, ConfigError> {
    if v.len() < 3 || !v.starts_with('/') || !v.ends_with('/') {
        return Err(ConfigError::invalid(
            keys::TENANT_PATH_PREFIX,
            "must start and end with '/' and contain at least one segment",
        ));
    }
    Ok(v.to_string())
}

fn parse_reserved_subdomains(v: &str) -> Result<Vec<String>, ConfigError> {
    v.split(',')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(|label| {
            let label = label.to_ascii_lowercase();
            if label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            {
                Ok(label)
            } else {
                Err(ConfigError::invalid(
                    keys::RESERVED_SUBDOMAINS,
                    format!("'{label}' is not a DNS label"),
                ))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use tenancy_core::TenancyMode;

    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> RawConfig {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn minimal() -> RawConfig {
        raw(&[(keys::DATABASE_URL, "postgres://db.internal:5432/forms")])
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let snapshot = validate_config(&minimal()).unwrap();
        assert_eq!(snapshot.deployment_env, DeploymentEnv::Development);
        assert_eq!(snapshot.mode(), TenancyMode::SingleTenant);
        assert_eq!(snapshot.isolation_level, IsolationLevel::Strict);
        assert_eq!(snapshot.identity_store_url, snapshot.database_url);
        assert_eq!(
            snapshot.default_tenant_id,
            Some(TenantId::new(DEFAULT_SINGLE_TENANT_ID))
        );
        assert!(snapshot.token_isolation);
        assert!(snapshot.audit_logging);
        assert_eq!(snapshot.tenant_path_prefix, "/api/v1/t/");
        assert_eq!(snapshot.user_cache_ttl, Duration::from_secs(300));
        assert_eq!(snapshot.tenant_cache_ttl, Duration::from_secs(3600));
        assert_eq!(snapshot.sweep_interval, Duration::from_secs(600));
        assert_eq!(snapshot.fetch_timeout, Duration::from_millis(5000));
        assert!(snapshot.passthrough.is_empty());
    }

    #[test]
    fn full_multi_tenant_config() {
        let config = raw(&[
            (keys::DEPLOYMENT_ENV, "Production"),
            (keys::DATABASE_URL, "postgresql://db:5432/app"),
            (keys::IDENTITY_STORE_URL, "https://identity.internal"),
            (keys::MULTI_TENANCY_ENABLED, "yes"),
            (keys::TENANT_ISOLATION_LEVEL, "strict"),
            (keys::TENANT_TOKEN_ISOLATION, "off"),
            (keys::TENANT_AUDIT_LOGGING, "0"),
            (keys::TENANT_PATH_PREFIX, "/orgs/"),
            (keys::RESERVED_SUBDOMAINS, "www, Status ,,docs"),
            (keys::USER_CACHE_TTL_SECS, "60"),
            (keys::IDENTITY_FETCH_TIMEOUT_MS, "750"),
        ]);
        let snapshot = validate_config(&config).unwrap();
        assert_eq!(snapshot.deployment_env, DeploymentEnv::Production);
        assert_eq!(snapshot.mode(), TenancyMode::MultiTenant);
        assert_eq!(snapshot.identity_store_url, "https://identity.internal");
        assert_eq!(snapshot.default_tenant_id, None);
        assert!(!snapshot.token_isolation);
        assert!(!snapshot.audit_logging);
        assert_eq!(snapshot.tenant_path_prefix, "/orgs/");
        assert_eq!(snapshot.reserved_subdomains, vec!["www", "status", "docs"]);
        assert_eq!(snapshot.user_cache_ttl, Duration::from_secs(60));
        assert_eq!(snapshot.fetch_timeout, Duration::from_millis(750));
    }

    #[test]
    fn unknown_keys_pass_through() {
        let mut config = minimal();
        config.insert("RUST_LOG".to_string(), "debug".to_string());
        config.insert("SMTP_HOST".to_string(), "mail".to_string());

        let snapshot = validate_config(&config).unwrap();
        assert_eq!(snapshot.passthrough.len(), 2);
        assert_eq!(snapshot.passthrough["SMTP_HOST"], "mail");
    }

    #[test]
    fn default_tenant_is_normalized() {
        let mut config = minimal();
        config.insert(
            keys::DEFAULT_TENANT_ID.to_string(),
            "7D9F0C52-1B7E-4C59-9F43-1D2F6F0F6A10".to_string(),
        );
        let snapshot = validate_config(&config).unwrap();
        assert_eq!(
            snapshot.default_tenant_id,
            Some(TenantId::new("7d9f0c52-1b7e-4c59-9f43-1d2f6f0f6a10"))
        );
    }

    #[test]
    fn empty_values_count_as_absent() {
        let mut config = minimal();
        config.insert(keys::MULTI_TENANCY_ENABLED.to_string(), "  ".to_string());
        let snapshot = validate_config(&config).unwrap();
        assert!(!snapshot.multi_tenancy_enabled);
    }

    #[test]
    fn missing_database_url_is_fatal() {
        let err = validate_config(&RawConfig::new()).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Missing {
                key: keys::DATABASE_URL
            }
        );
        assert_eq!(err.to_string(), "missing required configuration key DATABASE_URL");
    }

    #[test]
    fn malformed_values_name_the_offending_key() {
        let cases: &[(&str, &str)] = &[
            (keys::DATABASE_URL, "mysql://db/app"),
            (keys::DATABASE_URL, "not a url"),
            (keys::DATABASE_URL, "postgres://db host/app"),
            (keys::DATABASE_URL, "postgres://@"),
            (keys::DATABASE_URL, "postgres://:::::/x"),
            (keys::DATABASE_URL, "postgres://db:notaport/app"),
            (keys::DATABASE_URL, "postgres:///app"),
            (keys::IDENTITY_STORE_URL, "ftp://identity"),
            (keys::DEPLOYMENT_ENV, "qa"),
            (keys::MULTI_TENANCY_ENABLED, "maybe"),
            (keys::TENANT_ISOLATION_LEVEL, "loose"),
            (keys::DEFAULT_TENANT_ID, "acme"),
            (keys::TENANT_PATH_PREFIX, "api/t"),
            (keys::RESERVED_SUBDOMAINS, "www,bad_label"),
            (keys::USER_CACHE_TTL_SECS, "0"),
            (keys::TENANT_CACHE_TTL_SECS, "-5"),
            (keys::CACHE_SWEEP_INTERVAL_SECS, "ten"),
        ];

        for (key, bad) in cases {
            let mut config = minimal();
            config.insert((*key).to_string(), (*bad).to_string());
            let err = validate_config(&config).unwrap_err();
            assert_eq!(err.key(), *key, "value {bad:?}");
            assert!(err.to_string().contains(key));
        }
    }
}
