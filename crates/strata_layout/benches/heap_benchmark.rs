//! # Heap Performance Benchmark
//!
//! Allocation churn through the TLSF free lists: steady-state
//! allocate/free cycles and mixed-size splitting/coalescing.
//!
//! Run with: `cargo bench --package strata_layout`

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strata_layout::Heap;

/// Backing buffer used for every benchmark heap.
const HEAP_BYTES: usize = 16 * 1024 * 1024;

/// Benchmark: allocate/free pairs of one size class.
fn bench_alloc_free_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_free_cycle");

    for size in [16usize, 64, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut heap = Heap::new(HEAP_BYTES);
            b.iter(|| {
                let p = heap.allocate(size, "bench");
                heap.free(black_box(p));
            });
        });
    }

    group.finish();
}

/// Benchmark: mixed-size churn forcing splits and merges.
fn bench_mixed_churn(c: &mut Criterion) {
    c.bench_function("mixed_churn_1k_live", |b| {
        let mut heap = Heap::new(HEAP_BYTES);
        let mut live = Vec::with_capacity(1024);
        b.iter(|| {
            for i in 0..1024usize {
                live.push(heap.allocate(8 + (i * 37) % 500, "bench"));
            }
            for p in live.drain(..) {
                heap.free(p);
            }
            black_box(heap.live_allocations())
        });
    });
}

criterion_group!(benches, bench_alloc_free_cycle, bench_mixed_churn);
criterion_main!(benches);
