//! Deployment configuration: schema validation and its memo.

pub mod memo;
pub mod schema;

pub use memo::{ConfigValidationMemo, MemoStats, MEMO_CAPACITY, MEMO_TTL};
pub use schema::{from_env, keys, validate_config, ConfigError, RawConfig};
