use std::time::Duration;

use common::Retryable;
use criterion::{Criterion, criterion_group, criterion_main};
use idempotency::IdempotencyManager;

#[derive(Debug, Clone)]
struct BenchError;

impl Retryable for BenchError {
    fn is_retryable(&self) -> bool {
        false
    }
}

const TTL: Duration = Duration::from_secs(3600);

fn bench_cache_hit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let manager: IdempotencyManager<u64, BenchError> = IdempotencyManager::default();
    rt.block_on(async {
        manager
            .execute("booking-create:hot", TTL, || async { Ok(42) })
            .await
            .unwrap();
    });

    c.bench_function("idempotency/cache_hit", |b| {
        b.iter(|| {
            rt.block_on(async {
                manager
                    .execute("booking-create:hot", TTL, || async { Ok(0) })
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_cache_miss(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let manager: IdempotencyManager<u64, BenchError> = IdempotencyManager::default();
    let mut n: u64 = 0;

    c.bench_function("idempotency/cache_miss", |b| {
        b.iter(|| {
            n += 1;
            let key = format!("booking-create:{n}");
            rt.block_on(async {
                manager.execute(&key, TTL, || async { Ok(n) }).await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_cache_hit, bench_cache_miss);
criterion_main!(benches);
