//! Content fingerprints for guest pages.
//!
//! The fingerprint must be deterministic across hosts and runs: the primary
//! and the standby compare values computed on different machines.
//! We do not use `DefaultHasher`.

/// 32-bit content digest. Cheap equality check, not integrity protection.
pub type Fingerprint = u32;

/// Seed shared by both ends of a replication pair.
pub const FINGERPRINT_SEED: u32 = 1_824_115_964;

/// Fingerprint page bytes (deterministic).
#[inline]
pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    xxhash_rust::xxh32::xxh32(bytes, FINGERPRINT_SEED)
}
