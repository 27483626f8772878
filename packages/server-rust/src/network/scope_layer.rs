//! Tower layer that attaches a [`RequestScope`] to every HTTP request.
//!
//! Upstream authentication is expected to insert [`ExplicitTenant`] and
//! [`ActingUser`] extensions. The layer reads those together with the host
//! and path, asks the [`IdentityGate`] for a decision, and stores the result
//! in the request extensions. Requests are never rejected here.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::header::HOST;
use http::Request;
use tenancy_core::{IdentitySignals, TenantId, UserId};
use tower::{Layer, Service};
use tracing::debug;

use crate::gate::{IdentityGate, RequestScope};

/// Tenant chosen by an upstream session or service context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplicitTenant(pub TenantId);

/// Authenticated user making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActingUser(pub UserId);

/// Extracts resolution signals from a request.
///
/// The `Host` header wins over the URI authority.
#[must_use]
pub fn signals_from_request<B>(req: &Request<B>) -> IdentitySignals {
    let mut signals = IdentitySignals::new().with_path(req.uri().path());

    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().host().map(str::to_string));
    if let Some(host) = host {
        signals = signals.with_host(host);
    }

    if let Some(ExplicitTenant(tenant)) = req.extensions().get::<ExplicitTenant>() {
        signals = signals.with_explicit_tenant(tenant.clone());
    }
    signals
}

// ---------------------------------------------------------------------------
// TenantScopeLayer
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct TenantScopeLayer {
    gate: Arc<IdentityGate>,
}

impl TenantScopeLayer {
    #[must_use]
    pub fn new(gate: Arc<IdentityGate>) -> Self {
        Self { gate }
    }
}

impl<S> Layer<S> for TenantScopeLayer {
    type Service = TenantScopeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TenantScopeService {
            inner,
            gate: Arc::clone(&self.gate),
        }
    }
}

// ---------------------------------------------------------------------------
// TenantScopeService
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct TenantScopeService<S> {
    inner: S,
    gate: Arc<IdentityGate>,
}

impl<S, B> Service<Request<B>> for TenantScopeService<S>
where
    S: Service<Request<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        // Keep the instance that was driven to readiness.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let gate = Arc::clone(&self.gate);

        Box::pin(async move {
            let signals = signals_from_request(&req);
            let user = req.extensions().get::<ActingUser>().map(|u| u.0.clone());
            let scope: RequestScope = gate.authorize(&signals, user.as_ref()).await;

            debug!(
                tenant = scope.tenant.as_ref().map(TenantId::as_str),
                source = scope.source.as_str(),
                tenant_valid = scope.tenant_valid,
                user_valid = scope.user_valid,
                "request scope"
            );

            req.extensions_mut().insert(scope);
            inner.call(req).await
        })
    }
}
