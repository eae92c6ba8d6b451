//! Prefetch configuration

use std::fmt;
use std::str::FromStr;

/// Which speculative selection strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyKind {
    /// Prefetch every candidate
    All,
    /// Prefetch candidates in dirty order until a page or byte budget is spent
    #[default]
    Budget,
    /// Prefetch a seeded random sample of candidates
    Sampled,
    /// Never prefetch
    None,
}

impl PolicyKind {
    /// Get the policy name as used in configuration files
    pub const fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::All => "all",
            PolicyKind::Budget => "budget",
            PolicyKind::Sampled => "sampled",
            PolicyKind::None => "none",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(PolicyKind::All),
            "budget" => Ok(PolicyKind::Budget),
            "sampled" => Ok(PolicyKind::Sampled),
            "none" => Ok(PolicyKind::None),
            other => Err(format!("unknown prefetch policy: {other}")),
        }
    }
}

/// Configuration for speculative prefetch on the standby
#[derive(Debug, Clone, PartialEq)]
pub struct PrefetchConfig {
    /// Whether the standby speculates at all
    pub enabled: bool,
    /// Selection strategy
    pub policy: PolicyKind,
    /// Upper bound on pages prefetched per epoch
    pub max_pages: usize,
    /// Upper bound on bytes prefetched per epoch
    pub max_bytes: u64,
    /// Pages requested per `PrefetchRequest` frame
    pub batch_pages: usize,
    /// Fraction of candidates kept by the sampled policy (0.0 to 1.0)
    pub sample_ratio: f64,
    /// Seed for the sampled policy
    pub seed: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: PolicyKind::Budget,
            max_pages: 1024,
            max_bytes: 64 * 1024 * 1024, // 64 MB
            batch_pages: 64,
            sample_ratio: 0.5,
            seed: 0x5EED_CAFE,
        }
    }
}

impl PrefetchConfig {
    /// Create a configuration with the given policy
    pub fn new(policy: PolicyKind) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    /// Enable or disable speculation
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the per-epoch page budget
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Set the per-epoch byte budget
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Set the request batch size (at least one page)
    pub fn with_batch_pages(mut self, batch_pages: usize) -> Self {
        self.batch_pages = batch_pages.max(1);
        self
    }

    /// Set the sampled-policy ratio
    pub fn with_sample_ratio(mut self, ratio: f64) -> Self {
        self.sample_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Set the sampled-policy seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}
