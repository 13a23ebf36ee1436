use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gamesman_core::bitset::ConcurrentBitset;
use std::sync::atomic::Ordering;

pub fn set_bench(c: &mut Criterion) {
    let bs = ConcurrentBitset::create(1 << 20).unwrap();
    c.bench_function("concurrent bitset set", |b| {
        b.iter(|| {
            for i in 0..10_000u64 {
                black_box(bs.set(i, Ordering::AcqRel));
            }
        });
    });
}

pub fn test_bench(c: &mut Criterion) {
    let bs = ConcurrentBitset::create(1 << 20).unwrap();
    for i in (0..(1 << 20u64)).step_by(3) {
        bs.set(i, Ordering::Relaxed);
    }
    c.bench_function("concurrent bitset test", |b| {
        b.iter(|| {
            for i in 0..10_000u64 {
                black_box(bs.test(i, Ordering::Acquire));
            }
        });
    });
}

criterion_group!(bitset_benches, set_bench, test_bench);
criterion_main!(bitset_benches);
