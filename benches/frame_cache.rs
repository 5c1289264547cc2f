// SPDX-License-Identifier: MPL-2.0
//! Benchmarks for the rolling frame cache.
//!
//! Measures the performance of:
//! - Nearest-frame lookups at different capacities
//! - The reserve/commit cycle the decode loop runs per frame

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use seekframe::application::port::MediaFrame;
use seekframe::application::FrameCache;
use seekframe::domain::TimeBase;
use std::hint::black_box;

#[derive(Debug, Default)]
struct BenchFrame {
    pts: Option<i64>,
}

impl MediaFrame for BenchFrame {
    fn pts(&self) -> Option<i64> {
        self.pts
    }

    fn is_hardware(&self) -> bool {
        false
    }
}

fn filled_cache(capacity: usize) -> FrameCache<BenchFrame> {
    let mut cache = FrameCache::new(capacity, TimeBase::new(1, 30), BenchFrame::default);
    for pts in 0..capacity as i64 {
        cache.reserve().pts = Some(pts);
        cache.commit();
    }
    cache
}

/// Benchmark nearest-frame lookup for hits, near misses and far misses.
fn bench_find_nearest(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_cache_find_nearest");

    for capacity in [8usize, 32, 64] {
        let cache = filled_cache(capacity);
        #[allow(clippy::cast_precision_loss)]
        let middle = capacity as f64 / 60.0;

        group.bench_with_input(BenchmarkId::new("hit", capacity), &cache, |b, cache| {
            b.iter(|| black_box(cache.find_nearest(black_box(middle)).map(|n| n.id)));
        });
        group.bench_with_input(BenchmarkId::new("far_miss", capacity), &cache, |b, cache| {
            b.iter(|| black_box(cache.find_nearest(black_box(100.0)).map(|n| n.id)));
        });
    }

    group.finish();
}

/// Benchmark the per-frame write path, including eviction of old frames.
fn bench_reserve_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_cache_write");

    group.bench_function("reserve_commit_8", |b| {
        let mut cache = filled_cache(8);
        let mut pts = 8i64;
        b.iter(|| {
            cache.reserve().pts = Some(pts);
            pts += 1;
            black_box(cache.commit());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_find_nearest, bench_reserve_commit);
criterion_main!(benches);
