//! Benchmarks for the Tracedex index engine
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::tempdir;
use tracedex::{IndexConfig, IndexState, LogIndex, LogStrata, LruCache, MemoryLogReader, Transfer};

const MEM_SIZE: u64 = 16 * 1024 * 1024;

fn create_test_log(count: u64) -> MemoryLogReader {
    MemoryLogReader::new("/bench/trace.log", MEM_SIZE)
        .modified_at(SystemTime::UNIX_EPOCH)
        .with_transfers((0..count).map(|i| {
            let address = (i * 4099) % MEM_SIZE;
            if i % 3 == 0 {
                Transfer::read(address, 64, 2)
            } else {
                Transfer::write(address, vec![(i % 7) as u8; 64], 3)
            }
        }))
}

fn bench_strata(c: &mut Criterion) {
    let mut group = c.benchmark_group("strata");

    for count in [16, 256, 4096] {
        let strata = LogStrata::from_counters((0..count as u64).map(|i| i * i * 977).collect());

        group.throughput(Throughput::Elements(count as u64));

        group.bench_function(format!("pack_{}", count), |b| {
            b.iter(|| black_box(&strata).pack())
        });

        let packed = strata.pack();

        group.bench_function(format!("unpack_{}", count), |b| {
            b.iter(|| LogStrata::unpack(black_box(&packed)).unwrap())
        });
    }

    group.finish();
}

fn bench_lru(c: &mut Criterion) {
    let mut group = c.benchmark_group("lru");

    group.bench_function("hit", |b| {
        let mut cache = LruCache::new(1024, |k: &u64| k * 2);
        for k in 0..1024 {
            cache.get(&k);
        }

        let mut k = 0u64;
        b.iter(|| {
            k = (k + 1) % 1024;
            *cache.get(black_box(&k))
        });
    });

    group.bench_function("miss", |b| {
        let mut cache = LruCache::new(1024, |k: &u64| k * 2);

        let mut k = 0u64;
        b.iter(|| {
            k += 1;
            *cache.get(black_box(&k))
        });
    });

    group.finish();
}

fn bench_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("index");
    group.sample_size(10);

    let reader = Arc::new(create_test_log(100_000));

    group.bench_function("build_100k", |b| {
        b.iter_custom(|iters| {
            let mut total = Duration::ZERO;
            for _ in 0..iters {
                let dir = tempdir().unwrap();
                let config = IndexConfig::new(dir.path());

                let start = std::time::Instant::now();
                let index = LogIndex::open(reader.clone(), &config).unwrap();
                assert_eq!(index.wait(Duration::from_secs(300)), IndexState::Complete);
                total += start.elapsed();
            }
            total
        });
    });

    group.bench_function("get_instant_100k", |b| {
        let dir = tempdir().unwrap();
        let index = LogIndex::open(reader.clone(), &IndexConfig::new(dir.path())).unwrap();
        assert_eq!(index.wait(Duration::from_secs(300)), IndexState::Complete);
        let duration = index.duration();

        let mut t = 0u64;
        b.iter(|| {
            t = (t + 7919) % duration.max(1);
            index.get_instant(black_box(t), 500).unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_strata, bench_lru, bench_index);
criterion_main!(benches);
