use std::hint::black_box;

use criterion::*;
use archetable::engine::sparse::SparseSet;

mod common;

fn sparse_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("sparse");

    group.bench_function("add_100k", |b| {
        b.iter(|| {
            let mut set: SparseSet<u64> = SparseSet::new();
            for i in 0..common::AGENTS_MED as u64 {
                let (_, value) = set.add();
                *value = i;
            }
            black_box(set.count())
        })
    });

    group.bench_function("churn_100k", |b| {
        b.iter_batched(
            || {
                let mut set: SparseSet<u64> = SparseSet::with_capacity(common::AGENTS_MED);
                for _ in 0..common::AGENTS_MED {
                    set.add();
                }
                set
            },
            |mut set| {
                for index in (0..common::AGENTS_MED as u32).step_by(2) {
                    set.remove(index);
                }
                for _ in 0..common::AGENTS_MED / 2 {
                    set.add();
                }
                black_box(set.count())
            },
            BatchSize::LargeInput,
        )
    });

    group.bench_function("dense_scan_100k", |b| {
        let mut set: SparseSet<u64> = SparseSet::new();
        for i in 0..common::AGENTS_MED as u64 {
            *set.add().1 = i;
        }
        b.iter(|| {
            let sum: u64 = set.iter().map(|(_, v)| *v).sum();
            black_box(sum)
        })
    });

    group.finish();
}

criterion_group!(benches, sparse_benchmark);
criterion_main!(benches);
