//! Performance benchmarks for change-kit
//!
//! This benchmark suite measures:
//! - ChangeAwareCache operations (add, update, add-then-remove cancellation)
//! - ExpiryCache batch application with and without a size limit
//! - Full engine throughput from push source to subscriber
//!
//! Run with: cargo bench
//! View results: open target/criterion/report/index.html

use change_kit::expiry::ExpirySelector;
use change_kit::source;
use change_kit::{ChangeAwareCache, ChangeSetBuilder, ExpiryCache, SourceStrategy};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::StreamExt;
use rand::Rng;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// Benchmark Fixtures
// ============================================================================

#[derive(Clone)]
struct Quote {
    symbol: u32,
    price: f64,
}

fn quotes(count: usize) -> Vec<Quote> {
    let mut rng = rand::rng();
    (0..count as u32)
        .map(|symbol| Quote {
            symbol,
            price: rng.random_range(1.0..1_000.0),
        })
        .collect()
}

fn expiry_cache() -> ExpiryCache<u32, Quote> {
    ExpiryCache::new(Arc::new(|q: &Quote| q.symbol))
}

// ============================================================================
// ChangeAwareCache
// ============================================================================

fn change_cache_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("change_aware_cache");

    for size in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("add_capture", size), size, |b, &size| {
            b.iter(|| {
                let mut cache = ChangeAwareCache::new();
                for i in 0..size {
                    cache.add_or_update(i, i);
                }
                black_box(cache.capture_changes())
            });
        });

        group.bench_with_input(BenchmarkId::new("update_capture", size), size, |b, &size| {
            let mut cache = ChangeAwareCache::new();
            for i in 0..size {
                cache.add_or_update(i, i);
            }
            cache.capture_changes();

            b.iter(|| {
                for i in 0..size {
                    cache.add_or_update(i + 1, i);
                }
                black_box(cache.capture_changes())
            });
        });

        group.bench_with_input(
            BenchmarkId::new("add_remove_cancelled", size),
            size,
            |b, &size| {
                b.iter(|| {
                    let mut cache = ChangeAwareCache::new();
                    for i in 0..size {
                        cache.add_or_update(i, i);
                    }
                    cache.remove_many(0..size);
                    black_box(cache.capture_changes())
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// ExpiryCache
// ============================================================================

fn expiry_cache_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("expiry_cache");
    let now = Instant::now();

    for size in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        let batch = quotes(*size);

        group.bench_with_input(BenchmarkId::new("merge", size), &batch, |b, batch| {
            b.iter(|| {
                let mut cache = expiry_cache();
                black_box(cache.apply_batch(batch.clone(), now))
            });
        });

        group.bench_with_input(BenchmarkId::new("replace", size), &batch, |b, batch| {
            let mut cache = expiry_cache().with_strategy(SourceStrategy::Replace);
            cache.apply_batch(batch.clone(), now);
            let half = batch[..batch.len() / 2].to_vec();

            b.iter(|| {
                black_box(cache.apply_batch(half.clone(), now));
                black_box(cache.apply_batch(batch.clone(), now))
            });
        });

        group.bench_with_input(BenchmarkId::new("evict_half", size), &batch, |b, batch| {
            b.iter(|| {
                let mut cache = expiry_cache().with_limit(batch.len() / 2);
                black_box(cache.apply_batch(batch.clone(), now))
            });
        });

        group.bench_with_input(BenchmarkId::new("with_expiry", size), &batch, |b, batch| {
            let ttl: ExpirySelector<Quote> =
                Arc::new(|q: &Quote| Some(Duration::from_millis(q.price as u64)));
            b.iter(|| {
                let mut cache = expiry_cache().with_expiry(Some(ttl.clone()));
                black_box(cache.apply_batch(batch.clone(), now))
            });
        });
    }

    group.finish();
}

// ============================================================================
// Engine
// ============================================================================

fn engine_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");
    let rt = tokio::runtime::Runtime::new().expect("Failed to build runtime");

    for batches in [10, 100].iter() {
        group.throughput(Throughput::Elements(*batches as u64 * 100));

        group.bench_with_input(
            BenchmarkId::new("push_to_subscriber", batches),
            batches,
            |b, &batches| {
                let input: Vec<Vec<Quote>> = (0..batches).map(|_| quotes(100)).collect();
                b.to_async(&rt).iter(|| async {
                    let (sender, receiver) = source::channel();
                    let mut changes = ChangeSetBuilder::new()
                        .key_selector(|q: &Quote| q.symbol)
                        .limit_size_to(50)
                        .observe(receiver)
                        .expect("Failed to observe");

                    for batch in &input {
                        sender.send(batch.clone()).expect("Failed to send");
                    }
                    sender.close();

                    let mut total = 0;
                    while let Some(set) = changes.next().await {
                        total += set.map(|s| s.len()).unwrap_or(0);
                    }
                    black_box(total)
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    change_cache_benchmarks,
    expiry_cache_benchmarks,
    engine_benchmarks
);
criterion_main!(benches);
