//! Cache usage statistics.

/// Counters accumulated by a [`CacheStore`](super::CacheStore).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requested ids served from the cache file.
    pub hits: u64,
    /// Requested ids that had to be backfilled.
    pub misses: u64,
    /// Rows persisted by upserts (incoming rows, not the merged total).
    pub rows_written: u64,
    /// Reads that found an unreadable cache file and fell back to empty.
    pub corrupt_reads: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
