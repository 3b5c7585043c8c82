//! Backup and load benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kvbatch_bench::populated_store;
use kvbatch_core::{Store, Version};

/// Benchmark streaming a full backup into memory.
fn bench_backup(c: &mut Criterion) {
    let mut group = c.benchmark_group("backup");

    for count in [1_000usize, 10_000] {
        let store = populated_store(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &store, |b, store| {
            b.iter(|| {
                let mut out = Vec::new();
                let metadata = store.backup(&mut out, Version::ZERO).unwrap();
                black_box((out, metadata));
            });
        });
    }

    group.finish();
}

/// Benchmark loading a backup into a fresh store.
fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");
    group.sample_size(20);

    for count in [1_000usize, 10_000] {
        let mut data = Vec::new();
        populated_store(count)
            .backup(&mut data, Version::ZERO)
            .unwrap();
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &data, |b, data| {
            b.iter(|| {
                let store = Store::open_in_memory().unwrap();
                let stats = store.load(data.as_slice()).unwrap();
                black_box(stats);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_backup, bench_load);
criterion_main!(benches);
