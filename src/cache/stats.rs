//! Fingerprint cache statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for fingerprint cache operations
#[derive(Debug, Default)]
pub struct FingerprintCacheStats {
    /// Number of validation checks
    checks: AtomicU64,
    /// Checks answered by the current prefetch cycle
    prefetch_hits: AtomicU64,
    /// Checks answered by the persistent cache
    cache_hits: AtomicU64,
    /// Checks that found nothing or a different fingerprint
    misses: AtomicU64,
    /// New entries
    inserts: AtomicU64,
    /// Entries overwritten in place
    refreshes: AtomicU64,
    /// Entries dropped to stay within capacity
    evictions: AtomicU64,
}

impl FingerprintCacheStats {
    /// Create new statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a check call
    pub fn record_check(&self) {
        self.checks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a check satisfied by the prefetch index
    pub fn record_prefetch_hit(&self) {
        self.prefetch_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a check satisfied by the persistent cache
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed check
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a new entry
    pub fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an in-place update
    pub fn record_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an eviction
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the number of checks
    pub fn checks(&self) -> u64 {
        self.checks.load(Ordering::Relaxed)
    }

    /// Get the number of prefetch-index hits
    pub fn prefetch_hits(&self) -> u64 {
        self.prefetch_hits.load(Ordering::Relaxed)
    }

    /// Get the number of persistent-cache hits
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Get the number of misses
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get the number of evictions
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Get the hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let checks = self.checks();
        if checks == 0 {
            return 0.0;
        }
        (self.prefetch_hits() + self.cache_hits()) as f64 / checks as f64
    }

    /// Reset all statistics
    pub fn reset(&self) {
        self.checks.store(0, Ordering::Relaxed);
        self.prefetch_hits.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.inserts.store(0, Ordering::Relaxed);
        self.refreshes.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }

    /// Get a summary of all statistics
    pub fn summary(&self) -> FingerprintCacheStatsSummary {
        FingerprintCacheStatsSummary {
            checks: self.checks(),
            prefetch_hits: self.prefetch_hits(),
            cache_hits: self.cache_hits(),
            misses: self.misses(),
            inserts: self.inserts.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            evictions: self.evictions(),
            hit_rate: self.hit_rate(),
        }
    }
}

/// Summary of fingerprint cache statistics
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintCacheStatsSummary {
    /// Number of checks
    pub checks: u64,
    /// Checks answered by the prefetch index
    pub prefetch_hits: u64,
    /// Checks answered by the persistent cache
    pub cache_hits: u64,
    /// Failed checks
    pub misses: u64,
    /// New entries
    pub inserts: u64,
    /// In-place updates
    pub refreshes: u64,
    /// Evictions
    pub evictions: u64,
    /// Combined hit rate
    pub hit_rate: f64,
}
