//! Pluggable selection of pages to speculate on.
//!
//! The coordinator hands a policy the de-duplicated dirty pages of the
//! checkpoint being committed; the policy returns the subset to prefetch.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::prefetch::{PolicyKind, PrefetchConfig};
use crate::record::DirtyPage;

/// Chooses which dirty pages the standby fetches ahead of the checkpoint.
pub trait PrefetchPolicy: Send {
    /// Select the pages to prefetch from `candidates`.
    ///
    /// The returned pages must be a subset of `candidates`.
    fn select(&mut self, candidates: &[DirtyPage]) -> Vec<DirtyPage>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Prefetch every candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrefetchAll;

impl PrefetchPolicy for PrefetchAll {
    fn select(&mut self, candidates: &[DirtyPage]) -> Vec<DirtyPage> {
        candidates.to_vec()
    }

    fn name(&self) -> &'static str {
        "all"
    }
}

/// Never prefetch.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrefetchNone;

impl PrefetchPolicy for PrefetchNone {
    fn select(&mut self, _candidates: &[DirtyPage]) -> Vec<DirtyPage> {
        Vec::new()
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Take candidates in dirty order until either budget would be exceeded.
#[derive(Debug, Clone, Copy)]
pub struct BudgetPolicy {
    max_pages: usize,
    max_bytes: u64,
}

impl BudgetPolicy {
    /// Create a budget policy
    pub fn new(max_pages: usize, max_bytes: u64) -> Self {
        Self {
            max_pages,
            max_bytes,
        }
    }
}

impl PrefetchPolicy for BudgetPolicy {
    fn select(&mut self, candidates: &[DirtyPage]) -> Vec<DirtyPage> {
        let mut bytes = 0u64;
        let mut selected = Vec::new();
        for page in candidates {
            if selected.len() >= self.max_pages {
                break;
            }
            let next = bytes + page.size as u64;
            if next > self.max_bytes {
                break;
            }
            bytes = next;
            selected.push(*page);
        }
        selected
    }

    fn name(&self) -> &'static str {
        "budget"
    }
}

/// Keep each candidate with probability `ratio`, up to `max_pages`.
#[derive(Debug, Clone)]
pub struct SampledPolicy {
    ratio: f64,
    max_pages: usize,
    rng: StdRng,
}

impl SampledPolicy {
    /// Create a sampled policy with a fixed seed
    pub fn new(ratio: f64, max_pages: usize, seed: u64) -> Self {
        Self {
            ratio: ratio.clamp(0.0, 1.0),
            max_pages,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl PrefetchPolicy for SampledPolicy {
    fn select(&mut self, candidates: &[DirtyPage]) -> Vec<DirtyPage> {
        let mut selected = Vec::new();
        for page in candidates {
            if selected.len() >= self.max_pages {
                break;
            }
            if self.rng.gen_bool(self.ratio) {
                selected.push(*page);
            }
        }
        selected
    }

    fn name(&self) -> &'static str {
        "sampled"
    }
}

/// Build the policy described by `config`.
pub fn policy_from_config(config: &PrefetchConfig) -> Box<dyn PrefetchPolicy> {
    if !config.enabled {
        return Box::new(PrefetchNone);
    }
    match config.policy {
        PolicyKind::All => Box::new(PrefetchAll),
        PolicyKind::Budget => Box::new(BudgetPolicy::new(config.max_pages, config.max_bytes)),
        PolicyKind::Sampled => Box::new(SampledPolicy::new(
            config.sample_ratio,
            config.max_pages,
            config.seed,
        )),
        PolicyKind::None => Box::new(PrefetchNone),
    }
}
