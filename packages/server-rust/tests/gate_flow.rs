//! End-to-end identity decisions through the gate and the tower layer.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use http::header::HOST;
use http::Request;
use tenancy_core::{
    IdentitySignals, ManualClock, TenantId, TenantIdentity, TenantPlan, TenantSource,
    TenantStatus, UserId, UserIdentity, UserRole,
};
use tenancy_server::config::keys;
use tenancy_server::{
    ActingUser, ConfigValidationMemo, ExplicitTenant, IdentityGate, MemoryIdentityStore,
    RawConfig, RequestScope, TenantScopeLayer,
};
use tower::{Layer, ServiceExt};

const ACME_ID: &str = "5b0c3f7e-2a41-4d8e-b1a6-0c9e7d3f2a18";

fn raw(pairs: &[(&str, &str)]) -> RawConfig {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn multi_tenant_config() -> RawConfig {
    raw(&[
        (keys::DATABASE_URL, "postgres://db.internal/app"),
        (keys::MULTI_TENANCY_ENABLED, "true"),
        (keys::DEPLOYMENT_ENV, "test"),
    ])
}

fn seeded_store() -> Arc<MemoryIdentityStore> {
    let store = Arc::new(MemoryIdentityStore::new());
    store.upsert_tenant(TenantIdentity {
        id: TenantId::new(ACME_ID),
        slug: "acme".to_string(),
        name: "Acme Corp".to_string(),
        plan: TenantPlan::Enterprise,
        status: TenantStatus::Active,
        is_active: true,
    });
    store.upsert_user(UserIdentity {
        id: UserId::new("u-ada"),
        email: "ada@acme.test".to_string(),
        role: UserRole::Owner,
        tenant_id: Some(TenantId::new(ACME_ID)),
        is_active: true,
    });
    store
}

#[tokio::test]
async fn single_tenant_deployment_never_touches_the_store() {
    let memo = ConfigValidationMemo::new();
    let snapshot = memo
        .validate(&raw(&[(keys::DATABASE_URL, "postgres://db.internal/app")]))
        .unwrap();
    let store = seeded_store();
    let gate = IdentityGate::new(snapshot, store.clone());

    for host in ["acme.app.example.com", "www.example.com", "example.com"] {
        let scope = gate
            .authorize(
                &IdentitySignals::new().with_host(host),
                Some(&UserId::new("anyone")),
            )
            .await;
        assert_eq!(scope.source, TenantSource::SingleTenant);
        assert!(scope.is_authorized());
    }

    assert_eq!(store.tenant_fetches(), 0);
    assert_eq!(store.user_fetches(), 0);
    assert_eq!(gate.cache_stats().tenants.misses, 0);

    gate.destroy().await;
}

#[tokio::test]
async fn suspended_tenant_is_rejected_after_invalidation() {
    let memo = ConfigValidationMemo::new();
    let store = seeded_store();
    let gate = IdentityGate::new(memo.validate(&multi_tenant_config()).unwrap(), store.clone());
    let signals = IdentitySignals::new().with_explicit_tenant(ACME_ID);
    let user = UserId::new("u-ada");

    assert!(gate.authorize(&signals, Some(&user)).await.is_authorized());

    store.upsert_tenant(TenantIdentity {
        id: TenantId::new(ACME_ID),
        slug: "acme".to_string(),
        name: "Acme Corp".to_string(),
        plan: TenantPlan::Enterprise,
        status: TenantStatus::Suspended,
        is_active: true,
    });

    // Still served from cache until the write is followed by an invalidation.
    assert!(gate.authorize(&signals, Some(&user)).await.tenant_valid);

    gate.invalidate_tenant(&TenantId::new(ACME_ID));
    let scope = gate.authorize(&signals, Some(&user)).await;
    assert!(!scope.tenant_valid);
    assert!(scope.user_valid);

    gate.destroy().await;
}

#[tokio::test]
async fn store_outage_fails_closed_and_recovers() {
    let memo = ConfigValidationMemo::new();
    let store = seeded_store();
    let gate = IdentityGate::new(memo.validate(&multi_tenant_config()).unwrap(), store.clone());
    let signals = IdentitySignals::new().with_host("acme.app.example.com");
    let user = UserId::new("u-ada");

    store.set_unavailable(true);
    let scope = gate.authorize(&signals, Some(&user)).await;
    assert_eq!(scope.tenant, Some(TenantId::new("acme")));
    assert!(!scope.tenant_valid);
    assert!(!scope.user_valid);
    assert_eq!(gate.cache_stats().tenants.size, 0);
    assert_eq!(gate.cache_stats().tenants.fetch_failures, 1);

    store.set_unavailable(false);
    assert!(gate.authorize(&signals, Some(&user)).await.is_authorized());
    assert_eq!(store.tenant_fetches(), 2);

    gate.destroy().await;
}

#[tokio::test(start_paused = true)]
async fn slow_store_times_out_and_is_not_cached() {
    let memo = ConfigValidationMemo::new();
    let mut config = multi_tenant_config();
    config.insert(keys::IDENTITY_FETCH_TIMEOUT_MS.to_string(), "100".to_string());
    let store = seeded_store();
    let gate = IdentityGate::new(memo.validate(&config).unwrap(), store.clone());
    let signals = IdentitySignals::new().with_path("/api/v1/t/acme/forms");

    store.set_latency(Duration::from_millis(500));
    let scope = gate.authorize(&signals, None).await;
    assert_eq!(scope.source, TenantSource::Path);
    assert!(!scope.tenant_valid);
    assert_eq!(gate.cache_stats().tenants.size, 0);

    store.set_latency(Duration::ZERO);
    assert!(gate.authorize(&signals, None).await.tenant_valid);

    gate.destroy().await;
}

#[tokio::test]
async fn tenant_entries_expire_after_their_ttl() {
    let clock = Arc::new(ManualClock::new(0));
    let memo = ConfigValidationMemo::new();
    let store = seeded_store();
    let gate = IdentityGate::with_clock(
        memo.validate(&multi_tenant_config()).unwrap(),
        store.clone(),
        clock.clone(),
    );
    let signals = IdentitySignals::new().with_explicit_tenant("acme");

    gate.authorize(&signals, None).await;
    clock.advance(Duration::from_secs(3599));
    gate.authorize(&signals, None).await;
    assert_eq!(store.tenant_fetches(), 1);

    clock.advance(Duration::from_secs(2));
    gate.authorize(&signals, None).await;
    assert_eq!(store.tenant_fetches(), 2);

    gate.destroy().await;
}

#[tokio::test]
async fn layer_scopes_requests_from_extensions_and_host() {
    let memo = ConfigValidationMemo::new();
    let gate = Arc::new(IdentityGate::new(
        memo.validate(&multi_tenant_config()).unwrap(),
        seeded_store(),
    ));
    let layer = TenantScopeLayer::new(Arc::clone(&gate));
    let echo = tower::service_fn(|req: Request<()>| async move {
        Ok::<_, Infallible>(req.extensions().get::<RequestScope>().cloned())
    });

    let mut by_host = Request::builder()
        .uri("/api/v1/users")
        .header(HOST, "acme.app.example.com:8443")
        .body(())
        .unwrap();
    by_host
        .extensions_mut()
        .insert(ActingUser(UserId::new("u-ada")));
    let scope = layer.layer(echo.clone()).oneshot(by_host).await.unwrap().unwrap();
    assert_eq!(scope.tenant, Some(TenantId::new("acme")));
    assert_eq!(scope.source, TenantSource::Subdomain);
    assert!(scope.is_authorized());

    let mut explicit = Request::builder()
        .uri("/api/v1/t/acme/forms")
        .header(HOST, "globex.app.example.com")
        .body(())
        .unwrap();
    explicit
        .extensions_mut()
        .insert(ExplicitTenant(TenantId::new("initech")));
    let scope = layer.layer(echo).oneshot(explicit).await.unwrap().unwrap();
    assert_eq!(scope.tenant, Some(TenantId::new("initech")));
    assert_eq!(scope.source, TenantSource::Explicit);
    assert!(!scope.tenant_valid);
    assert!(!scope.user_valid);

    gate.destroy().await;
}
