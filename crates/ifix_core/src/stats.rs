//! Store-wide operation counters.
//!
//! These are process-local and complement the per-table `stats` block
//! persisted inside each envelope.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic operation counters shared by every table of a database.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    index_lookups: AtomicU64,
    scans: AtomicU64,
    bytes_written: AtomicU64,
    recoveries: AtomicU64,
    backups_created: AtomicU64,
    restores: AtomicU64,
    evictions: AtomicU64,
    quota_rejections: AtomicU64,
}

impl StoreMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, bytes: u64) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_index_lookup(&self) {
        self.index_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_recovery(&self) {
        self.recoveries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_backup(&self) {
        self.backups_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_restore(&self) {
        self.restores.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_quota_rejection(&self) {
        self.quota_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            index_lookups: self.index_lookups.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            recoveries: self.recoveries.load(Ordering::Relaxed),
            backups_created: self.backups_created.load(Ordering::Relaxed),
            restores: self.restores.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            quota_rejections: self.quota_rejections.load(Ordering::Relaxed),
        }
    }
}

/// A plain copy of [`StoreMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Read operations (find/count).
    pub reads: u64,
    /// Persisted writes.
    pub writes: u64,
    /// Records deleted.
    pub deletes: u64,
    /// Point lookups served by `byId` or `byStatus`.
    pub index_lookups: u64,
    /// Lookups that fell back to a linear scan.
    pub scans: u64,
    /// Serialized bytes written.
    pub bytes_written: u64,
    /// Loads that had to repair persisted state.
    pub recoveries: u64,
    /// Snapshots written.
    pub backups_created: u64,
    /// Tables replaced from a snapshot.
    pub restores: u64,
    /// Records evicted under storage pressure.
    pub evictions: u64,
    /// Writes the backend rejected for quota.
    pub quota_rejections: u64,
}
