use criterion::{black_box, criterion_group, criterion_main, Criterion};
use keyed_lock::KeyedLock;
use rand::Rng;

/// Uncontended acquire/release round-trips on a single key.
fn bench_uncontended_round_trip(c: &mut Criterion) {
    let locks: KeyedLock<u64> = KeyedLock::new();

    c.bench_function("try_acquire_uncontended", |b| {
        b.iter(|| {
            let guard = locks.try_acquire(black_box(42));
            drop(guard);
        });
    });
}

/// Rejection cost while another holder owns the key.
fn bench_rejected_acquire(c: &mut Criterion) {
    let locks: KeyedLock<u64> = KeyedLock::new();
    let _holder = locks.try_acquire(42).expect("key free at start");

    c.bench_function("try_acquire_rejected", |b| {
        b.iter(|| {
            let attempt = locks.try_acquire(black_box(42));
            assert!(attempt.is_none());
        });
    });
}

/// Acquire/release across a spread of keys, approximating live traffic where
/// most mutations land on different rows.
fn bench_spread_keys(c: &mut Criterion) {
    let locks: KeyedLock<u64> = KeyedLock::new();
    let mut rng = rand::thread_rng();

    c.bench_function("try_acquire_spread_1024_keys", |b| {
        b.iter(|| {
            let key = rng.gen_range(0..1024u64);
            let guard = locks.try_acquire(black_box(key));
            drop(guard);
        });
    });
}

criterion_group!(
    benches,
    bench_uncontended_round_trip,
    bench_rejected_acquire,
    bench_spread_keys
);
criterion_main!(benches);
