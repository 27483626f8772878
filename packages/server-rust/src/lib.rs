//! Tenancy server: identity validation caches, cache sweeper, configuration
//! memo, and the request-scope tower layer.

pub mod cache;
pub mod config;
pub mod gate;
pub mod network;
pub mod store;
pub mod traits;

pub use cache::{CacheConfig, CacheStats, CacheSweeper, TenantCache, UserCache, ValidationCache};
pub use config::{validate_config, ConfigError, ConfigValidationMemo, RawConfig};
pub use gate::{GateCacheStats, IdentityGate, RequestScope};
pub use network::{ActingUser, ExplicitTenant, TenantScopeLayer};
pub use store::MemoryIdentityStore;
pub use traits::Sweepable;
