//! Table store benchmarks.
//!
//! Measures positioned field access (sequential and random), appends and
//! inserts that force block splits, and range deletes.

#![allow(clippy::expect_used, missing_docs)]

use std::{hint::black_box, time::Duration};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use pretable_store::{FileBackend, InMemoryBackend, TableConfig, TableStore};
use tempfile::TempDir;

const RECORD_SIZE: usize = 16;

// =============================================================================
// Helpers
// =============================================================================

fn config() -> TableConfig {
    TableConfig::builder().record_size(RECORD_SIZE).build()
}

/// Appends `count` records in batches of 1000.
fn populate<B: pretable_store::BlockBackend>(table: &TableStore<B>, count: usize) {
    let batch = vec![0xA5u8; 1000 * RECORD_SIZE];
    let mut done = 0;
    while done < count {
        let n = (count - done).min(1000);
        table.insert(done as u64, &batch[..n * RECORD_SIZE]).expect("insert");
        done += n;
    }
}

// =============================================================================
// Field Access
// =============================================================================

/// Sequential reads stay on the cursor block; random reads exercise the
/// index search and buffer replacement.
fn bench_field_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("table/field_read");
    group.throughput(Throughput::Elements(1));

    for count in [10_000usize, 100_000] {
        let table = TableStore::open_in_memory(config()).expect("open");
        populate(&table, count);

        group.bench_with_input(BenchmarkId::new("sequential", count), &count, |b, &count| {
            let mut pre = 0u64;
            b.iter(|| {
                pre = (pre + 1) % count as u64;
                black_box(table.read4(pre, 4).expect("read"))
            });
        });

        group.bench_with_input(BenchmarkId::new("random", count), &count, |b, &count| {
            let mut pre = 0u64;
            b.iter(|| {
                pre = (pre.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1)) % count as u64;
                black_box(table.read5(pre, 8).expect("read"))
            });
        });
    }
    group.finish();
}

fn bench_field_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("table/field_write");
    group.throughput(Throughput::Elements(1));

    let table = TableStore::open_in_memory(config()).expect("open");
    populate(&table, 100_000);
    group.bench_function("sequential", |b| {
        let mut pre = 0u64;
        b.iter(|| {
            pre = (pre + 1) % 100_000;
            table.write4(pre, 0, pre as u32).expect("write");
        });
    });
    group.finish();
}

// =============================================================================
// Structural Updates
// =============================================================================

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("table/insert");
    group.measurement_time(Duration::from_secs(5));

    for batch in [1usize, 64, 1024] {
        group.throughput(Throughput::Elements(batch as u64));
        let records = vec![0x5Au8; batch * RECORD_SIZE];

        group.bench_with_input(BenchmarkId::new("append", batch), &batch, |b, _| {
            let table = TableStore::open_in_memory(config()).expect("open");
            b.iter(|| {
                let size = table.size().expect("size");
                table.insert(size, &records).expect("insert");
            });
        });

        group.bench_with_input(BenchmarkId::new("middle", batch), &batch, |b, _| {
            let table = TableStore::open_in_memory(config()).expect("open");
            populate(&table, 10_000);
            b.iter(|| {
                let size = table.size().expect("size");
                table.insert(size / 2, &records).expect("insert");
            });
        });
    }
    group.finish();
}

fn bench_delete(c: &mut Criterion) {
    let mut group = c.benchmark_group("table/delete");

    for n in [1u64, 256, 4096] {
        group.throughput(Throughput::Elements(n));
        group.bench_with_input(BenchmarkId::new("range", n), &n, |b, &n| {
            b.iter_batched(
                || {
                    let table = TableStore::open_in_memory(config()).expect("open");
                    populate(&table, 20_000);
                    table
                },
                |table: TableStore<InMemoryBackend>| table.delete(5_000, n).expect("delete"),
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

// =============================================================================
// Persistence
// =============================================================================

fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("table/flush");
    group.sample_size(20);

    group.bench_function("file_10k_dirty", |b| {
        let temp_dir = TempDir::new().expect("create temp dir");
        let table: TableStore<FileBackend> =
            TableStore::create(temp_dir.path(), "bench", config()).expect("create");
        populate(&table, 10_000);
        b.iter(|| {
            for pre in 0..10_000u64 {
                table.write2(pre, 2, pre as u16).expect("write");
            }
            table.flush().expect("flush");
        });
    });
    group.finish();
}

criterion_group!(benches, bench_field_read, bench_field_write, bench_insert, bench_delete, bench_flush);
criterion_main!(benches);
