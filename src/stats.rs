//! Replication statistics
//!
//! Counters updated by the protocol coordinator on both roles. All counters
//! are relaxed atomics; a `summary()` snapshot is not a consistent cut.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-coordinator replication counters
#[derive(Debug, Default)]
pub struct ReplicationStats {
    /// Epochs committed
    pub epochs_committed: AtomicU64,
    /// Dirty descriptors sent by the primary
    pub dirty_pages_sent: AtomicU64,
    /// Dirty descriptors received by the standby
    pub dirty_pages_received: AtomicU64,
    /// Pages staged speculatively (standby) or served (primary)
    pub pages_prefetched: AtomicU64,
    /// Content bytes moved during prefetch
    pub prefetch_bytes: AtomicU64,
    /// Checkpoint entries accepted without content
    pub validation_hits: AtomicU64,
    /// Checkpoint entries that failed validation
    pub validation_misses: AtomicU64,
    /// Abandoned prefetch cycles
    pub rollbacks: AtomicU64,
    /// Guest ranges written back during rollback
    pub pages_restored: AtomicU64,
    /// Checkpoint content bytes carried on the wire
    pub content_bytes_sent: AtomicU64,
    /// Checkpoint content bytes omitted because the standby already held them
    pub content_bytes_skipped: AtomicU64,
}

impl ReplicationStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a committed epoch
    pub fn record_epoch(&self) {
        self.epochs_committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record dirty descriptors leaving the primary
    pub fn record_dirty_sent(&self, count: u64) {
        self.dirty_pages_sent.fetch_add(count, Ordering::Relaxed);
    }

    /// Record dirty descriptors arriving at the standby
    pub fn record_dirty_received(&self, count: u64) {
        self.dirty_pages_received.fetch_add(count, Ordering::Relaxed);
    }

    /// Record one prefetched page of `bytes` bytes
    pub fn record_prefetch(&self, bytes: u64) {
        self.pages_prefetched.fetch_add(1, Ordering::Relaxed);
        self.prefetch_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record the outcome of one validation check
    pub fn record_validation(&self, matched: bool) {
        if matched {
            self.validation_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.validation_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a rollback that restored `pages` ranges
    pub fn record_rollback(&self, pages: u64) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        self.pages_restored.fetch_add(pages, Ordering::Relaxed);
    }

    /// Record checkpoint content carried on the wire
    pub fn record_content_sent(&self, bytes: u64) {
        self.content_bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record checkpoint content omitted from the wire
    pub fn record_content_skipped(&self, bytes: u64) {
        self.content_bytes_skipped.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Fraction of checkpoint content bytes that never crossed the wire
    pub fn transfer_savings(&self) -> f64 {
        let sent = self.content_bytes_sent.load(Ordering::Relaxed);
        let skipped = self.content_bytes_skipped.load(Ordering::Relaxed);
        let total = sent + skipped;
        if total == 0 {
            0.0
        } else {
            skipped as f64 / total as f64
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.epochs_committed.store(0, Ordering::Relaxed);
        self.dirty_pages_sent.store(0, Ordering::Relaxed);
        self.dirty_pages_received.store(0, Ordering::Relaxed);
        self.pages_prefetched.store(0, Ordering::Relaxed);
        self.prefetch_bytes.store(0, Ordering::Relaxed);
        self.validation_hits.store(0, Ordering::Relaxed);
        self.validation_misses.store(0, Ordering::Relaxed);
        self.rollbacks.store(0, Ordering::Relaxed);
        self.pages_restored.store(0, Ordering::Relaxed);
        self.content_bytes_sent.store(0, Ordering::Relaxed);
        self.content_bytes_skipped.store(0, Ordering::Relaxed);
    }

    /// Snapshot of every counter
    pub fn summary(&self) -> ReplicationStatsSummary {
        ReplicationStatsSummary {
            epochs_committed: self.epochs_committed.load(Ordering::Relaxed),
            dirty_pages_sent: self.dirty_pages_sent.load(Ordering::Relaxed),
            dirty_pages_received: self.dirty_pages_received.load(Ordering::Relaxed),
            pages_prefetched: self.pages_prefetched.load(Ordering::Relaxed),
            prefetch_bytes: self.prefetch_bytes.load(Ordering::Relaxed),
            validation_hits: self.validation_hits.load(Ordering::Relaxed),
            validation_misses: self.validation_misses.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            pages_restored: self.pages_restored.load(Ordering::Relaxed),
            content_bytes_sent: self.content_bytes_sent.load(Ordering::Relaxed),
            content_bytes_skipped: self.content_bytes_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ReplicationStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicationStatsSummary {
    /// Epochs committed
    pub epochs_committed: u64,
    /// Dirty descriptors sent
    pub dirty_pages_sent: u64,
    /// Dirty descriptors received
    pub dirty_pages_received: u64,
    /// Pages prefetched
    pub pages_prefetched: u64,
    /// Prefetch content bytes
    pub prefetch_bytes: u64,
    /// Entries accepted without content
    pub validation_hits: u64,
    /// Entries that failed validation
    pub validation_misses: u64,
    /// Abandoned prefetch cycles
    pub rollbacks: u64,
    /// Ranges restored by rollback
    pub pages_restored: u64,
    /// Checkpoint content bytes sent
    pub content_bytes_sent: u64,
    /// Checkpoint content bytes skipped
    pub content_bytes_skipped: u64,
}
