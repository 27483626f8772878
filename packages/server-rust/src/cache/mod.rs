//! Identity validation caches and their background sweeper.

pub mod config;
pub mod entry;
pub mod sweeper;
pub mod validation;

pub use config::CacheConfig;
pub use entry::CacheEntry;
pub use sweeper::{CacheSweeper, SweepHandle};
pub use validation::{
    CacheStats, EntityFetcher, FetchError, TenantCache, TenantFetcher, UserCache, UserFetcher,
    ValidationCache,
};
