//! HTTP integration: request-scope middleware.

pub mod scope_layer;

pub use scope_layer::{
    signals_from_request, ActingUser, ExplicitTenant, TenantScopeLayer, TenantScopeService,
};
