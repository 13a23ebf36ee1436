use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gamesman_core::packed_array::BitPackedArray;

fn fill(len: u64, distinct: u64) -> BitPackedArray {
    let mut arr = BitPackedArray::new(len).unwrap();
    for i in 0..len {
        arr.set(i, i % distinct).unwrap();
    }
    arr
}

pub fn get_bench(c: &mut Criterion) {
    let arr = fill(1 << 16, 200);
    c.bench_function("bitpacked get", |b| {
        b.iter(|| {
            for i in 0..1000u64 {
                black_box(arr.get(i).unwrap());
            }
        });
    });
}

pub fn set_bench(c: &mut Criterion) {
    c.bench_function("bitpacked set", |b| {
        b.iter(|| {
            let mut arr = BitPackedArray::new(1 << 12).unwrap();
            for i in 0..(1 << 12u64) {
                arr.set(i, i % 200).unwrap();
            }
            black_box(&arr);
        });
    });
}

criterion_group!(packed_array_benches, get_bench, set_bench);
criterion_main!(packed_array_benches);
