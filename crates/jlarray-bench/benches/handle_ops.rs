//! Criterion micro-benchmarks for wrap, borrow, and element access.

use std::hint::black_box;
use std::thread;

use criterion::{criterion_group, criterion_main, Criterion};
use jlarray_bench::{matrix_fixture, REFERENCE_SHAPE};
use jlarray_core::ElementKind;
use jlarray_handle::{ArrayDescriptor, HandleConfig, RawArrayHandle};
use jlarray_test_utils::MockRuntime;

fn bench_acquire_release(c: &mut Criterion) {
    let rt = MockRuntime::new();
    let (rows, cols) = REFERENCE_SHAPE;
    let h = matrix_fixture(&rt, rows, cols).unwrap();

    c.bench_function("acquire_release", |b| {
        b.iter(|| {
            let address = h.acquire().unwrap();
            black_box(h.release(black_box(address)).unwrap());
        });
    });
}

fn bench_acquire_release_contended(c: &mut Criterion) {
    let rt = MockRuntime::new();
    let h = matrix_fixture(&rt, 4, 4).unwrap();

    c.bench_function("acquire_release_4_threads_x1k", |b| {
        b.iter(|| {
            thread::scope(|s| {
                for _ in 0..4 {
                    s.spawn(|| {
                        for _ in 0..1_000 {
                            let address = h.acquire().unwrap();
                            h.release(address).unwrap();
                        }
                    });
                }
            });
        });
    });
}

#[allow(unsafe_code)]
fn bench_wrap(c: &mut Criterion) {
    let rt = MockRuntime::new();
    let address = rt.alloc(ElementKind::Float64, &[100, 100]);

    c.bench_function("descriptor_decode", |b| {
        b.iter(|| {
            // SAFETY: the runtime keeps the header live for the bench.
            black_box(unsafe { ArrayDescriptor::decode(black_box(address)) }.unwrap())
        });
    });

    c.bench_function("wrap_raw", |b| {
        b.iter(|| {
            // SAFETY: as above.
            black_box(unsafe { RawArrayHandle::wrap(black_box(address), HandleConfig::default()) }.unwrap())
        });
    });
}

fn bench_borrow_sum_10k(c: &mut Criterion) {
    let rt = MockRuntime::new();
    let (rows, cols) = REFERENCE_SHAPE;
    let h = matrix_fixture(&rt, rows, cols).unwrap();

    c.bench_function("borrow_sum_10k", |b| {
        b.iter(|| {
            let guard = h.borrow().unwrap();
            black_box(guard.view().iter().sum::<f64>())
        });
    });
}

fn bench_indexed_get_10k(c: &mut Criterion) {
    let rt = MockRuntime::new();
    let (rows, cols) = REFERENCE_SHAPE;
    let h = matrix_fixture(&rt, rows, cols).unwrap();

    c.bench_function("indexed_get_10k", |b| {
        b.iter(|| {
            let guard = h.borrow().unwrap();
            let mut total = 0.0;
            for i in 0..rows {
                for j in 0..cols {
                    total += guard.get(i, j).unwrap();
                }
            }
            black_box(total)
        });
    });
}

fn bench_rows_10k(c: &mut Criterion) {
    let rt = MockRuntime::new();
    let (rows, cols) = REFERENCE_SHAPE;
    let h = matrix_fixture(&rt, rows, cols).unwrap();

    c.bench_function("rows_sum_10k", |b| {
        b.iter(|| {
            let guard = h.borrow().unwrap();
            let total: f64 = guard.rows().unwrap().map(|r| r.iter().sum::<f64>()).sum();
            black_box(total)
        });
    });
}

criterion_group!(
    benches,
    bench_acquire_release,
    bench_acquire_release_contended,
    bench_wrap,
    bench_borrow_sum_10k,
    bench_indexed_get_10k,
    bench_rows_10k
);
criterion_main!(benches);
