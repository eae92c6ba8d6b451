#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy)]
pub struct FuzzParams {
    pub seed: u64,
    pub steps: usize,
    // Number of distinct pages the generators draw addresses from.
    pub page_space: u64,
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse::<u64>().ok()
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok()?.trim().parse::<usize>().ok()
}

fn mix_seed(mut seed: u64, tag: &str) -> u64 {
    // Each test gets its own deterministic stream from the shared base seed.
    for (i, b) in tag.as_bytes().iter().enumerate() {
        seed ^= (*b as u64) << ((i % 8) * 8);
        seed = seed.rotate_left(13).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    }
    seed
}

pub fn params(test_tag: &str, default_steps: usize, default_page_space: u64) -> FuzzParams {
    let base_seed = env_u64("SMC_FUZZ_SEED").unwrap_or(0xA1B2_C3D4_E5F6_0708);
    let steps = env_usize("SMC_FUZZ_STEPS").unwrap_or(default_steps);
    let page_space = env_u64("SMC_FUZZ_PAGE_SPACE").unwrap_or(default_page_space);

    FuzzParams {
        seed: mix_seed(base_seed, test_tag),
        steps,
        page_space: page_space.max(1),
    }
}

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn choose_page(rng: &mut StdRng, page_space: u64) -> u64 {
    rng.gen_range(0..page_space)
}

pub fn choose_bytes(rng: &mut StdRng, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rng.fill(&mut buf[..]);
    buf
}
