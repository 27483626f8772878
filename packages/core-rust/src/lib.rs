//! Tenancy core: identity model, tenant resolution and tenancy mode decisions.

pub mod clock;
pub mod context;
pub mod mode;
pub mod resolver;
pub mod schema;
pub mod traits;
pub mod types;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use context::IdentitySignals;
pub use mode::{derive_optimizations, TenantOptimizations};
pub use resolver::{Resolution, ResolverConfig, TenantResolver, TenantSource};
pub use schema::{ConfigSnapshot, DeploymentEnv, IsolationLevel, TenancyMode};
pub use traits::IdentityStore;
pub use types::{
    CachedIdentity, TenantId, TenantIdentity, TenantPlan, TenantStatus, UserId, UserIdentity,
    UserRole,
};
