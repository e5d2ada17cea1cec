//! Basic benchmarks for the `sparse_pool` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use sparse_pool::{HashIndices, LocalSparsePool, SparseHandles, SparsePool};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

type TestItem = usize;
const TEST_VALUE: TestItem = 1024;

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("sparse_basic");

    group.bench_function("insert_destroy_recycled", |b| {
        let mut pool = SparsePool::<TestItem>::new();

        // Keep a few values live so destroying moves one of them.
        let warm = (0..8).map(|_| pool.insert(TEST_VALUE)).collect::<Vec<_>>();

        b.iter(|| {
            let handle = pool.insert(black_box(TEST_VALUE));
            pool.destroy(black_box(handle));
        });

        for handle in warm {
            pool.destroy(handle);
        }
    });

    group.bench_function("lookup", |b| {
        let mut pool = SparsePool::<TestItem>::builder().capacity(1024).build();
        let handles = (0..1024).map(|value| pool.insert(value)).collect::<Vec<_>>();

        b.iter(|| {
            for handle in &handles {
                black_box(pool.get(black_box(*handle)));
            }
        });
    });

    group.bench_function("iterate_10k", |b| {
        let mut pool = SparsePool::<TestItem>::new();

        for value in 0..10_000 {
            _ = pool.insert(value);
        }

        b.iter(|| black_box(pool.values().iter().sum::<TestItem>()));
    });

    group.bench_function("table_add_release_vector", |b| {
        let mut table = SparseHandles::new();
        _ = table.create();
        let handle = table.allocate();

        b.iter(|| {
            black_box(table.add(black_box(handle)));
            black_box(table.release(black_box(handle)));
        });
    });

    group.bench_function("table_add_release_hash", |b| {
        let mut table = SparseHandles::<HashIndices>::with_backing();
        _ = table.create();
        let handle = table.allocate();

        b.iter(|| {
            black_box(table.add(black_box(handle)));
            black_box(table.release(black_box(handle)));
        });
    });

    group.bench_function("owned_handle_create_drop", |b| {
        let pool = LocalSparsePool::<TestItem>::new();

        b.iter(|| drop(black_box(pool.create(black_box(TEST_VALUE)))));
    });

    group.finish();
}
