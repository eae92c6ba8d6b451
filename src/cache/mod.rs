//! Cross-checkpoint fingerprint cache
//!
//! This module remembers the last known content fingerprint of guest pages
//! across epochs, so that the standby can recognise unchanged pages without
//! a network round trip.
//!
//! Eviction is least-recently-used. A miss is always safe: it only means the
//! page must be validated the hard way.

mod config;
mod fingerprint_cache;
mod stats;

pub use config::{FingerprintCacheConfig, FINGERPRINT_CACHE_CAPACITY};
pub use fingerprint_cache::{CachedFingerprint, FingerprintCache};
pub use stats::{FingerprintCacheStats, FingerprintCacheStatsSummary};
