//! # Container Performance Benchmark
//!
//! Dynamic array growth and hash map insert/lookup across rehashes,
//! all through the raw-buffer views.
//!
//! Run with: `cargo bench --package strata_layout`

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strata_layout::{DynArray, DynMap, ElementType, Heap, Primitive, Value};

const HEAP_BYTES: usize = 32 * 1024 * 1024;

/// Benchmark: push N u64 elements through every doubling boundary.
fn bench_array_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_push");

    for count in [100u64, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let mut heap = Heap::new(HEAP_BYTES);
                let slot = heap.allocate(4, "bench");
                let arr = DynArray::new(slot, ElementType::Primitive(Primitive::U64));
                for i in 0..count {
                    arr.push(&mut heap, &Value::U64(i)).unwrap();
                }
                black_box(arr.len(&heap))
            });
        });
    }

    group.finish();
}

/// Benchmark: map insertion including rehashes, then full lookup.
fn bench_map_insert_lookup(c: &mut Criterion) {
    c.bench_function("map_insert_lookup_1k", |b| {
        b.iter(|| {
            let mut heap = Heap::new(HEAP_BYTES);
            let slot = heap.allocate(4, "bench");
            let map = DynMap::new(
                slot,
                ElementType::Primitive(Primitive::U32),
                ElementType::Primitive(Primitive::U64),
            );
            for i in 0..1_000u32 {
                map.set(&mut heap, &Value::U32(i), &Value::U64(u64::from(i) * 7))
                    .unwrap();
            }
            let mut hits = 0u32;
            for i in 0..1_000u32 {
                if map.get(&heap, &Value::U32(i)).unwrap().is_some() {
                    hits += 1;
                }
            }
            black_box(hits)
        });
    });
}

criterion_group!(benches, bench_array_push, bench_map_insert_lookup);
criterion_main!(benches);
