//! Fingerprint cache configuration

/// Default number of pages remembered across epochs.
pub const FINGERPRINT_CACHE_CAPACITY: usize = 20_000;

/// Configuration for the fingerprint cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintCacheConfig {
    /// Maximum number of entries
    pub capacity: usize,
    /// Whether the cache records anything at all
    pub enabled: bool,
}

impl Default for FingerprintCacheConfig {
    fn default() -> Self {
        Self {
            capacity: FINGERPRINT_CACHE_CAPACITY,
            enabled: true,
        }
    }
}

impl FingerprintCacheConfig {
    /// Create a configuration with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Enable or disable the cache
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Capacity actually usable (zero when disabled)
    pub fn effective_capacity(&self) -> usize {
        if self.enabled {
            self.capacity
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FingerprintCacheConfig::default();
        assert_eq!(config.capacity, 20_000);
        assert!(config.enabled);
        assert_eq!(config.effective_capacity(), 20_000);
    }

    #[test]
    fn test_disabled_has_no_capacity() {
        let config = FingerprintCacheConfig::new(64).with_enabled(false);
        assert_eq!(config.effective_capacity(), 0);
    }
}
