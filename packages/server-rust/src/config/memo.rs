//! Memoization of configuration validation.
//!
//! Validation is cheap but runs on every request in some deployments. The
//! memo keys results by a fingerprint of the critical keys only, so changes
//! to non-critical settings within the TTL are served from the memo.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tenancy_core::{ClockSource, ConfigSnapshot, SystemClock};
use tracing::debug;

use super::schema::{keys, validate_config, ConfigError, RawConfig};

/// How long a validated snapshot is reused for an unchanged fingerprint.
pub const MEMO_TTL: Duration = Duration::from_secs(5);

/// Maximum number of fingerprints remembered at once.
pub const MEMO_CAPACITY: usize = 10;

struct MemoEntry {
    fingerprint: String,
    snapshot: Arc<ConfigSnapshot>,
    timestamp_ms: u64,
}

/// Counters for [`ConfigValidationMemo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Full validation cycles actually run.
    pub validations: u64,
}

/// Short-TTL memo in front of [`validate_config`].
///
/// Only successful validations are stored. Eviction is FIFO by insertion.
pub struct ConfigValidationMemo {
    entries: Mutex<VecDeque<MemoEntry>>,
    clock: Arc<dyn ClockSource>,
    ttl: Duration,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    validations: AtomicU64,
}

impl Default for ConfigValidationMemo {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidationMemo {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(clock: Arc<dyn ClockSource>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(MEMO_CAPACITY)),
            clock,
            ttl: MEMO_TTL,
            capacity: MEMO_CAPACITY,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            validations: AtomicU64::new(0),
        }
    }

    /// Returns the memoized snapshot for `raw` or runs a full validation.
    ///
    /// # Errors
    ///
    /// Propagates [`ConfigError`] from validation. Failures are not memoized.
    pub fn validate(&self, raw: &RawConfig) -> Result<Arc<ConfigSnapshot>, ConfigError> {
        let fingerprint = Self::fingerprint(raw);
        let now = self.clock.now();
        let ttl_ms = u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX);

        {
            let entries = self.entries.lock();
            let hit = entries.iter().find(|e| {
                e.fingerprint == fingerprint && now.saturating_sub(e.timestamp_ms) <= ttl_ms
            });
            if let Some(entry) = hit {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(&entry.snapshot));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.validations.fetch_add(1, Ordering::Relaxed);
        let snapshot = Arc::new(validate_config(raw)?);
        debug!(fingerprint = %&fingerprint[..12], "configuration validated");

        let mut entries = self.entries.lock();
        entries.retain(|e| e.fingerprint != fingerprint);
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(MemoEntry {
            fingerprint,
            snapshot: Arc::clone(&snapshot),
            timestamp_ms: self.clock.now(),
        });

        Ok(snapshot)
    }

    /// Forgets every memoized result. Counters are kept.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    #[must_use]
    pub fn stats(&self) -> MemoStats {
        MemoStats {
            entries: self.entries.lock().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            validations: self.validations.load(Ordering::Relaxed),
        }
    }

    /// SHA-256 hex digest over the critical keys, in declaration order.
    ///
    /// Absent keys and empty values hash the same, matching how validation
    /// treats them.
    #[must_use]
    pub fn fingerprint(raw: &RawConfig) -> String {
        let mut hasher = Sha256::new();
        for key in keys::CRITICAL {
            let value = raw.get(*key).map_or("", |v| v.trim());
            hasher.update(key.as_bytes());
            hasher.update([0x1f]);
            hasher.update(value.as_bytes());
            hasher.update([0x1e]);
        }
        hex::encode(hasher.finalize())
    }
}
