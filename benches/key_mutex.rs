use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use keymutex::{CancelToken, HashedKeyMutex, KeyMutexTraits};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

fn key_mutex_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_mutex_uncontended");
    let keys: Vec<String> = (0..1024).map(|i| format!("vol-{i}")).collect();
    for shard_count in [0, 1, 16, 256] {
        let key_mutex = HashedKeyMutex::new(shard_count);
        group.throughput(Throughput::Elements(keys.len() as u64));
        group.bench_function(BenchmarkId::new("lock_unlock", shard_count), |b| {
            b.iter(|| {
                for key in &keys {
                    key_mutex.lock_key(key);
                    key_mutex.unlock_key(key).unwrap();
                }
            });
        });
        let cancel = CancelToken::new();
        group.bench_function(
            BenchmarkId::new("lock_with_cancel_unlock", shard_count),
            |b| {
                b.iter(|| {
                    for key in &keys {
                        assert!(key_mutex.lock_key_with_cancel(key, &cancel));
                        key_mutex.unlock_key(key).unwrap();
                    }
                });
            },
        );
    }
    group.finish();
}

fn key_mutex_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_mutex_contended");
    let keys: Vec<String> = (0..64).map(|i| format!("vol-{i}")).collect();
    for shard_count in [0, 1, 16, 256] {
        let key_mutex = HashedKeyMutex::new(shard_count);
        group.throughput(Throughput::Elements(keys.len() as u64 * 16));
        group.bench_function(BenchmarkId::new("lock_unlock", shard_count), |b| {
            b.iter(|| {
                (0..16).into_par_iter().for_each(|_| {
                    for key in &keys {
                        let _guard = key_mutex.lock(key);
                    }
                });
            });
        });
    }
    group.finish();
}

criterion_group!(benches, key_mutex_uncontended, key_mutex_contended);
criterion_main!(benches);
