//! Basic benchmarks for the `chunk_pool` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::iter;
use std::num::NonZero;
use std::time::Instant;

use criterion::{Criterion, criterion_group, criterion_main};
use chunk_pool::{Pool, PoolRegistry, TypedPool};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

type TestItem = usize;
const TEST_VALUE: TestItem = 1024;

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_basic");

    group.bench_function("build_empty", |b| {
        b.iter(|| drop(black_box(TypedPool::<TestItem>::new())));
    });

    group.bench_function("construct_first", |b| {
        b.iter_custom(|iters| {
            let mut pools = iter::repeat_with(TypedPool::<TestItem>::new)
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let start = Instant::now();

            for pool in &mut pools {
                _ = black_box(pool.construct(black_box(TEST_VALUE)));
            }

            start.elapsed()
        });
    });

    group.bench_function("construct_destroy_recycled", |b| {
        let mut pool = TypedPool::<TestItem>::new();

        // Keep a few values live so the recycled slot is not the only one.
        let warm = (0..8).map(|_| pool.construct(TEST_VALUE)).collect::<Vec<_>>();

        b.iter(|| {
            let ptr = pool.construct(black_box(TEST_VALUE));
            pool.destroy(black_box(ptr));
        });

        for ptr in warm {
            pool.destroy(ptr);
        }
    });

    group.bench_function("construct_10k_with_growth", |b| {
        b.iter_custom(|iters| {
            let mut pools = iter::repeat_with(|| {
                TypedPool::<TestItem>::with_capacity(NonZero::new(16).unwrap())
            })
            .take(usize::try_from(iters).unwrap())
            .collect::<Vec<_>>();

            let start = Instant::now();

            for pool in &mut pools {
                for _ in 0..10_000 {
                    _ = black_box(pool.construct(black_box(TEST_VALUE)));
                }
            }

            start.elapsed()
        });
    });

    group.bench_function("iterate_10k", |b| {
        let mut pool = TypedPool::<TestItem>::new();

        for value in 0..10_000 {
            _ = pool.construct(value);
        }

        b.iter(|| black_box(pool.iter().sum::<TestItem>()));
    });

    group.bench_function("registry_lookup", |b| {
        let mut registry = PoolRegistry::new();
        _ = registry.pool::<TestItem>();

        b.iter(|| black_box(registry.pool::<TestItem>().len()));
    });

    group.bench_function("erased_insert_destroy", |b| {
        let mut pool: Box<dyn Pool> = Box::new(TypedPool::<TestItem>::new());

        b.iter(|| {
            let item = pool
                .insert_erased(Box::new(black_box(TEST_VALUE)))
                .unwrap();
            pool.destroy_erased(black_box(item)).unwrap();
        });
    });

    group.finish();
}
