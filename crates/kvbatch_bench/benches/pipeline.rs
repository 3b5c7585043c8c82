//! Batched write pipeline benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kvbatch_bench::{csv_input, csv_mapper};
use kvbatch_core::pipeline::{encode_line, BatchWriter, PipelineConfig};
use kvbatch_core::{Store, StoreConfig};

const RECORDS: usize = 20_000;

/// Benchmark line encoding on its own.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_line");

    for width in [32usize, 256, 1024] {
        let line = csv_input(1, width);
        let line = line.trim_end();
        group.throughput(Throughput::Bytes(line.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), &line, |b, line| {
            b.iter(|| {
                let pair = encode_line(&csv_mapper, 1, black_box(line)).unwrap();
                black_box(pair);
            });
        });
    }

    group.finish();
}

/// Benchmark whole-stream throughput across batch sizes.
fn bench_batch_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_stream/batch_size");
    group.sample_size(10);
    let input = csv_input(RECORDS, 64);

    for batch_size in [10usize, 100, 1000, 10_000] {
        group.throughput(Throughput::Elements(RECORDS as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &batch_size| {
                b.iter(|| {
                    let store = Store::open_in_memory().unwrap();
                    let config = PipelineConfig::new().batch_size(batch_size);
                    let summary = BatchWriter::new(&store, csv_mapper, config)
                        .write_stream(input.as_bytes())
                        .unwrap();
                    black_box(summary);
                });
            },
        );
    }

    group.finish();
}

/// Benchmark whole-stream throughput across worker counts.
fn bench_workers(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_stream/max_in_flight");
    group.sample_size(10);
    let input = csv_input(RECORDS, 64);

    for workers in [1usize, 2, 4, 8] {
        group.throughput(Throughput::Elements(RECORDS as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(workers),
            &workers,
            |b, &workers| {
                b.iter(|| {
                    let store = Store::open_in_memory().unwrap();
                    let config = PipelineConfig::new().batch_size(500).max_in_flight(workers);
                    let summary = BatchWriter::new(&store, csv_mapper, config)
                        .write_stream(input.as_bytes())
                        .unwrap();
                    black_box(summary);
                });
            },
        );
    }

    group.finish();
}

/// Benchmark writing to an on-disk store, with and without fsync per commit.
fn bench_durable(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_stream/file");
    group.sample_size(10);
    let input = csv_input(5_000, 64);

    for sync in [false, true] {
        group.throughput(Throughput::Elements(5_000));
        group.bench_with_input(
            BenchmarkId::new("sync_on_commit", sync),
            &sync,
            |b, &sync| {
                b.iter_batched(
                    || tempfile::tempdir().unwrap(),
                    |dir| {
                        let config = StoreConfig::new().sync_on_commit(sync);
                        let store = Store::open_with_config(dir.path(), config).unwrap();
                        let summary =
                            BatchWriter::new(&store, csv_mapper, PipelineConfig::new().batch_size(250))
                                .write_stream(input.as_bytes())
                                .unwrap();
                        black_box(summary);
                    },
                    criterion::BatchSize::PerIteration,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_encode,
    bench_batch_size,
    bench_workers,
    bench_durable
);
criterion_main!(benches);
