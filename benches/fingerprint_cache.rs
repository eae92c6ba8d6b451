//! Microbenchmarks for the fingerprint cache.
//!
//! - `update`: absorbing a prefetch cycle into a full cache (eviction path)
//! - `check`: validating pages through the cache with a live recompute

use std::time::Duration;

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};

use smc_replica::cache::{FingerprintCache, FINGERPRINT_CACHE_CAPACITY};
use smc_replica::codec::fingerprint;
use smc_replica::memory::GuestMemory;
use smc_replica::prefetch::PrefetchSet;
use smc_replica::PageAddr;

const PAGE: u32 = 4096;

fn prefetch_cycle(first_page: u64, pages: u64) -> PrefetchSet {
    let mut set = PrefetchSet::new();
    for n in first_page..first_page + pages {
        set.insert(1, n * PAGE as u64, PAGE, n as u32);
    }
    set
}

fn full_cache() -> FingerprintCache {
    let mut cache = FingerprintCache::default();
    cache.update(&prefetch_cycle(0, FINGERPRINT_CACHE_CAPACITY as u64));
    cache
}

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint_cache/update");
    group.measurement_time(Duration::from_secs(5));

    for pages in [64u64, 1024, 8192] {
        let cycle = prefetch_cycle(FINGERPRINT_CACHE_CAPACITY as u64, pages);
        group.throughput(Throughput::Elements(pages));
        group.bench_function(BenchmarkId::new("evicting", pages), |b| {
            b.iter_batched(
                full_cache,
                |mut cache| {
                    cache.update(black_box(&cycle));
                    black_box(cache.len());
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn bench_check(c: &mut Criterion) {
    const PAGES: u64 = 1024;

    let memory = GuestMemory::with_regions(&[(1, PAGES as usize * PAGE as usize)]);
    let mut cache = FingerprintCache::default();
    let empty = PrefetchSet::new();
    let zero = fingerprint(&vec![0u8; PAGE as usize]);
    for n in 0..PAGES {
        cache.insert(PageAddr::new(1, n * PAGE as u64), PAGE, zero);
    }

    let mut group = c.benchmark_group("fingerprint_cache/check");
    group.throughput(Throughput::Elements(PAGES));
    group.bench_function("cache_hit", |b| {
        b.iter(|| {
            for n in 0..PAGES {
                let hit = cache
                    .check(&empty, &memory, PageAddr::new(1, n * PAGE as u64), PAGE, zero)
                    .unwrap_or(false);
                black_box(hit);
            }
        })
    });
    group.bench_function("miss", |b| {
        b.iter(|| {
            for n in 0..PAGES {
                let hit = cache
                    .check(&empty, &memory, PageAddr::new(2, n * PAGE as u64), PAGE, zero)
                    .unwrap_or(false);
                black_box(hit);
            }
        })
    });
    group.finish();
}

criterion_group!(benches, bench_update, bench_check);
criterion_main!(benches);
