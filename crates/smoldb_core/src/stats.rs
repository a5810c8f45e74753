//! Per-collection operation counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters updated by the storage engine and coordinator.
///
/// All counters are monotonically increasing and can be read while
/// operations are in progress. `document_reads` counts every slot/blob
/// payload read — index-covered queries leave it untouched, which is how
/// callers can verify a query never hit the data file.
#[derive(Debug, Default)]
pub struct EngineStats {
    document_reads: AtomicU64,
    bytes_read: AtomicU64,
    writes: AtomicU64,
    bytes_written: AtomicU64,
    deletes: AtomicU64,
    compactions: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl EngineStats {
    /// Creates a zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self, bytes: u64) {
        self.document_reads.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, bytes: u64) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_compaction(&self) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a consistent-enough snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            document_reads: self.document_reads.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
    /// Slot/blob payload reads.
    pub document_reads: u64,
    /// Payload bytes read.
    pub bytes_read: u64,
    /// Slot writes (inserts, updates, relocations).
    pub writes: u64,
    /// Payload bytes written.
    pub bytes_written: u64,
    /// Document deletions.
    pub deletes: u64,
    /// Compaction runs.
    pub compactions: u64,
    /// Read-cache hits.
    pub cache_hits: u64,
    /// Read-cache misses.
    pub cache_misses: u64,
}
