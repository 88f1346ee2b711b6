use std::hint::black_box;

use criterion::*;

mod common;
use common::*;

fn bulk_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk");

    group.bench_function("bulk_add_tag_100k", |b| {
        b.iter_batched(
            || setup_world(AGENTS_MED).expect("world setup failed"),
            |(mut world, ids)| {
                let migrated = world
                    .bulk_add(&[ids.employed], None)
                    .expect("bulk add failed");
                black_box(migrated)
            },
            BatchSize::LargeInput,
        )
    });

    group.bench_function("per_entity_add_tag_10k", |b| {
        b.iter_batched(
            || {
                let (world, ids) = setup_world(AGENTS_SMALL).expect("world setup failed");
                let entities: Vec<_> = world.entities().iter().map(|(e, _)| e).collect();
                (world, ids, entities)
            },
            |(mut world, ids, entities)| {
                for e in entities {
                    world.add(e, ids.employed).expect("add failed");
                }
                black_box(world.entity_count())
            },
            BatchSize::LargeInput,
        )
    });

    group.bench_function("bulk_delete_100k", |b| {
        b.iter_batched(
            || setup_world(AGENTS_MED).expect("world setup failed"),
            |(mut world, _)| black_box(world.bulk_delete(None).expect("bulk delete failed")),
            BatchSize::LargeInput,
        )
    });

    group.finish();
}

criterion_group!(benches, bulk_benchmark);
criterion_main!(benches);
