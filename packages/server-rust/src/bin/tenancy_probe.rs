//! # tenancy-probe
//!
//! Validates the deployment configuration from the environment and shows how
//! a request would be scoped.
//!
//! ```bash
//! DATABASE_URL=postgres://db/app MULTI_TENANCY_ENABLED=true \
//!     tenancy-probe --host acme.app.example.com --demo --user demo-user
//! ```
//!
//! Exits non-zero when the configuration is malformed.

use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tenancy_core::{
    IdentitySignals, TenantId, TenantIdentity, TenantPlan, TenantStatus, UserId, UserIdentity,
    UserRole,
};
use tenancy_server::config::from_env;
use tenancy_server::{ConfigValidationMemo, IdentityGate, MemoryIdentityStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tenancy-probe")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Request hostname to resolve
    #[arg(long)]
    host: Option<String>,

    /// Request path to resolve
    #[arg(long)]
    path: Option<String>,

    /// Explicit tenant id, as set by an upstream session
    #[arg(long)]
    tenant: Option<String>,

    /// Acting user id to validate
    #[arg(long)]
    user: Option<String>,

    /// Seed the in-memory store with a demo tenant (`acme`) and user (`demo-user`)
    #[arg(long)]
    demo: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "TENANCY_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let memo = ConfigValidationMemo::new();
    let snapshot = memo.validate(&from_env())?;
    info!(mode = ?snapshot.mode(), "configuration valid");

    let store = Arc::new(MemoryIdentityStore::new());
    if args.demo {
        seed_demo(&store);
    }
    let gate = IdentityGate::new(Arc::clone(&snapshot), store);

    let mut signals = IdentitySignals::new();
    if let Some(host) = args.host {
        signals = signals.with_host(host);
    }
    if let Some(path) = args.path {
        signals = signals.with_path(path);
    }
    if let Some(tenant) = args.tenant {
        signals = signals.with_explicit_tenant(tenant);
    }
    let user = args.user.map(UserId::from);

    let resolution = gate.resolve_tenant(&signals);
    let scope = gate.authorize(&signals, user.as_ref()).await;

    let report = json!({
        "config": {
            "deployment_env": snapshot.deployment_env,
            "mode": snapshot.mode(),
            "isolation_level": snapshot.isolation_level,
            "default_tenant_id": snapshot.default_tenant_id,
            "tenant_path_prefix": snapshot.tenant_path_prefix,
            "reserved_subdomains": snapshot.reserved_subdomains,
            "user_cache_ttl_secs": snapshot.user_cache_ttl.as_secs(),
            "tenant_cache_ttl_secs": snapshot.tenant_cache_ttl.as_secs(),
            "sweep_interval_secs": snapshot.sweep_interval.as_secs(),
            "passthrough_keys": snapshot.passthrough.len(),
        },
        "optimizations": gate.optimizations(),
        "resolution": {
            "tenant": resolution.tenant,
            "source": resolution.source,
        },
        "scope": scope,
        "caches": gate.cache_stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    gate.destroy().await;
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn seed_demo(store: &MemoryIdentityStore) {
    let tenant = TenantId::new("2f1c9a4e-6d0b-4c7e-9a55-3b8e1f0d7c21");
    store.upsert_tenant(TenantIdentity {
        id: tenant.clone(),
        slug: "acme".to_string(),
        name: "Acme Corp".to_string(),
        plan: TenantPlan::Pro,
        status: TenantStatus::Active,
        is_active: true,
    });
    store.upsert_user(UserIdentity {
        id: UserId::new("demo-user"),
        email: "demo@acme.test".to_string(),
        role: UserRole::Owner,
        tenant_id: Some(tenant),
        is_active: true,
    });
}
