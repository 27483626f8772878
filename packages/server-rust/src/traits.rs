/// A cache whose expired entries can be reclaimed by the background sweeper.
///
/// Purging is advisory: caches already treat stale entries as misses at read
/// time, so a sweep only bounds memory and never changes what callers see.
pub trait Sweepable: Send + Sync {
    /// Label used in sweep logs and metrics (e.g. `"user"`).
    fn kind(&self) -> &'static str;

    /// Removes every entry older than the cache's TTL. Returns how many were removed.
    fn purge_expired(&self) -> usize;

    /// Number of entries currently held, fresh or stale.
    fn len(&self) -> usize;

    /// Returns `true` if the cache holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
