use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use archetable::engine::attribute::Bundle;
use archetable::engine::error::ECSError;
use archetable::engine::pipeline::{build_schedule, run_frame, Pipeline, PipelineOp};
use archetable::engine::systems::{
    is_active, matched_tables, FnSystem, InOutKind, OperKind, PipelinePhase, SourceKind, System,
    SystemColumn,
};
use archetable::engine::world::{Phase, World, WorldConfig};

mod common;
use common::{CrowdedTables, Health, Position};

fn noop(id: u32) -> FnSystem<impl Fn(&mut archetable::SystemContext<'_>) + Send + Sync + 'static> {
    FnSystem::new(id, "noop", |_| {})
}

fn counts(systems: &[&dyn System]) -> Vec<u32> {
    build_schedule(systems, 0).ops.iter().map(|op| op.system_count).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Hazard analysis
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn staged_write_then_own_read_needs_a_merge() {
    let writer = noop(1).with_column(SystemColumn::write(0).from(SourceKind::Empty));
    let reader = noop(2).with_column(SystemColumn::read(0));
    assert_eq!(counts(&[&writer, &reader]), vec![1, 1]);
}

#[test]
fn readers_share_an_op() {
    let a = noop(1).with_column(SystemColumn::read(0));
    let b = noop(2).with_column(SystemColumn::read(0)).with_column(SystemColumn::read(1));
    assert_eq!(counts(&[&a, &b]), vec![2]);
}

#[test]
fn in_place_writes_need_no_merge() {
    let writer = noop(1).with_column(SystemColumn::read_write(0));
    let reader = noop(2).with_column(SystemColumn::read(0));
    assert_eq!(counts(&[&writer, &reader]), vec![2]);
}

#[test]
fn read_before_staged_write_needs_no_merge() {
    let reader = noop(1).with_column(SystemColumn::read(0));
    let writer = noop(2).with_column(SystemColumn::write(0).from(SourceKind::Empty));
    assert_eq!(counts(&[&reader, &writer]), vec![2]);
}

#[test]
fn not_columns_stage_their_writes() {
    let excluded_writer = noop(1)
        .with_column(SystemColumn::read(1))
        .with_column(SystemColumn::write(0).oper(OperKind::Not));
    let reader = noop(2).with_column(SystemColumn::read_write(0));
    assert_eq!(counts(&[&excluded_writer, &reader]), vec![1, 1]);
}

#[test]
fn empty_and_not_reads_of_staged_writes_need_a_merge() {
    let writer = noop(1).with_column(SystemColumn::write(0).from(SourceKind::Empty));
    let empty_reader = noop(2).with_column(
        SystemColumn::new(SourceKind::Empty, 0, InOutKind::In, OperKind::And),
    );
    assert_eq!(counts(&[&writer, &empty_reader]), vec![1, 1]);

    let not_reader = noop(3)
        .with_column(SystemColumn::read(1))
        .with_column(SystemColumn::new(SourceKind::SelfTable, 0, InOutKind::InOut, OperKind::Not));
    assert_eq!(counts(&[&writer, &not_reader]), vec![1, 1]);

    let blind_writer = noop(4).with_column(SystemColumn::write(0).from(SourceKind::Empty));
    assert_eq!(counts(&[&writer, &blind_writer]), vec![2]);
}

#[test]
fn or_and_entity_sources_are_ignored() {
    let fixed = archetable::engine::entity::Entity::new(0, 0);
    let or_writer = noop(1).with_column(
        SystemColumn::new(SourceKind::Empty, 0, InOutKind::Out, OperKind::Or),
    );
    let entity_writer = noop(2).with_column(SystemColumn::write(1).from(SourceKind::Entity(fixed)));
    let reader = noop(3)
        .with_column(SystemColumn::read(0))
        .with_column(SystemColumn::read(1));
    assert_eq!(counts(&[&or_writer, &entity_writer, &reader]), vec![3]);
}

#[test]
fn merge_resets_every_attribute() {
    let stage_a = noop(1).with_column(SystemColumn::write(0).from(SourceKind::Empty));
    let stage_b = noop(2).with_column(SystemColumn::write(1).from(SourceKind::Empty));
    let read_a = noop(3).with_column(SystemColumn::read(0));
    let read_b = noop(4).with_column(SystemColumn::read(1));
    assert_eq!(counts(&[&stage_a, &stage_b, &read_a, &read_b]), vec![2, 2]);
}

#[test]
fn op_counts_cover_every_system() {
    let systems: Vec<FnSystem<_>> = (0..12)
        .map(|i| {
            let column = if i % 3 == 0 {
                SystemColumn::write(i % 4).from(SourceKind::Empty)
            } else {
                SystemColumn::read(i % 4)
            };
            noop(i).with_column(column)
        })
        .collect();
    let refs: Vec<&dyn System> = systems.iter().map(|s| s as &dyn System).collect();

    let schedule = build_schedule(&refs, 7);
    assert_eq!(schedule.system_count(), 12);
    assert_eq!(schedule.match_generation, 7);
    assert!(schedule.ops.iter().all(|op| op.system_count > 0));
}

#[test]
fn no_systems_no_ops() {
    let schedule = build_schedule(&[], 0);
    assert!(schedule.ops.is_empty());
    assert_eq!(schedule.merges_between_ops(), 0);
}

#[test]
#[should_panic]
fn system_reading_what_it_stages_is_rejected() {
    let broken = noop(1)
        .with_column(SystemColumn::write(0).from(SourceKind::Empty))
        .with_column(SystemColumn::read(0));
    build_schedule(&[&broken], 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Frame execution
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn staged_write_is_visible_to_the_next_op() {
    let (mut world, ids) = common::setup_world();
    let agent = world.spawn(Bundle::new().with(ids.position, Position { x: 1.0, y: 0.0 })).unwrap();
    let position = ids.position;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let mut pipeline = Pipeline::new();
    pipeline.add_system(
        FnSystem::new(1, "teleport", move |ctx| {
            ctx.set(agent, position, Position { x: 100.0, y: 0.0 });
        })
        .with_column(SystemColumn::write(position).from(SourceKind::Empty)),
    );
    pipeline.add_system(
        FnSystem::new(2, "observe", move |ctx| {
            for &table in ctx.matched_tables() {
                if let Some(column) = ctx.column::<Position>(table, position) {
                    sink.lock().unwrap().extend(column.iter().map(|p| p.x));
                }
            }
        })
        .with_column(SystemColumn::read(position)),
    );

    let report = run_frame(&mut world, &mut pipeline, 0.016).unwrap();
    assert_eq!(report.systems_ran, 2);
    assert_eq!(report.merges, 2);
    assert_eq!(pipeline.schedule().unwrap().ops, vec![PipelineOp { system_count: 1 }, PipelineOp { system_count: 1 }]);
    assert_eq!(*seen.lock().unwrap(), vec![100.0]);
    assert_eq!(world.phase(), Phase::Primary);
    assert_eq!(world.stats().merge_count_total, 2);
}

#[test]
fn last_op_writes_wait_for_the_next_frame() {
    let (mut world, ids) = common::setup_world();
    common::spawn_movers(&mut world, &ids, 1).unwrap();
    let health = ids.health;

    let mut pipeline = Pipeline::new();
    pipeline.add_system(
        FnSystem::new(1, "breed", move |ctx| {
            ctx.spawn(Bundle::new().with(health, Health(1)));
        })
        .with_column(SystemColumn::write(health).from(SourceKind::Empty)),
    );

    let report = run_frame(&mut world, &mut pipeline, 0.1).unwrap();
    assert_eq!(report.merges, 1);
    assert_eq!(world.pending_commands(), 1);
    assert_eq!(world.entity_count(), 1);

    run_frame(&mut world, &mut pipeline, 0.1).unwrap();
    assert_eq!(world.entity_count(), 2);
    assert_eq!(world.pending_commands(), 1);

    assert_eq!(world.merge().unwrap(), 1);
    assert_eq!(world.entity_count(), 3);
}

#[test]
fn in_place_writes_are_seen_within_the_op() {
    let (mut world, ids) = common::setup_world();
    let movers = common::spawn_movers(&mut world, &ids, 4).unwrap();
    let (position, velocity) = (ids.position, ids.velocity);

    let mut pipeline = Pipeline::new();
    pipeline.add_system(
        FnSystem::new(1, "integrate", move |ctx| {
            let dt = ctx.delta_time();
            ctx.for_each_table(|ctx, table| {
                let steps: Vec<f32> = ctx
                    .column::<common::Velocity>(table, velocity)
                    .map(|c| c.iter().map(|v| v.dx * dt).collect())
                    .unwrap_or_default();
                if let Ok(column) = ctx.column_mut::<Position>(table, position) {
                    for (p, step) in column.iter_mut().zip(steps) {
                        p.x += step;
                    }
                }
            });
        })
        .with_column(SystemColumn::read_write(position))
        .with_column(SystemColumn::read(velocity)),
    );

    let report = run_frame(&mut world, &mut pipeline, 2.0).unwrap();
    assert_eq!(report.merges, 1);
    for (i, e) in movers.iter().enumerate() {
        assert_eq!(world.get::<Position>(*e, position).unwrap().x, i as f32 + 2.0);
    }
}

#[test]
fn undeclared_writes_are_refused() {
    let (mut world, ids) = common::setup_world();
    common::spawn_movers(&mut world, &ids, 1).unwrap();
    let position = ids.position;

    let refused = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&refused);

    let mut pipeline = Pipeline::new();
    pipeline.add_system(
        FnSystem::new(1, "sneaky", move |ctx| {
            let table = ctx.matched_tables()[0];
            let result = ctx.column_mut::<Position>(table, position);
            flag.store(matches!(result, Err(ECSError::Unsupported(_))), Ordering::SeqCst);
        })
        .with_column(SystemColumn::read(position)),
    );

    run_frame(&mut world, &mut pipeline, 0.1).unwrap();
    assert!(refused.load(Ordering::SeqCst));
}

#[test]
fn systems_run_in_phase_then_id_order() {
    let (mut world, _) = common::setup_world();
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut pipeline = Pipeline::new();
    for (id, phase) in [(1, PipelinePhase::OnUpdate), (3, PipelinePhase::PreUpdate), (2, PipelinePhase::OnUpdate)] {
        let sink = Arc::clone(&order);
        pipeline.add_system(
            FnSystem::new(id, "tick", move |ctx| sink.lock().unwrap().push(ctx.system_id()))
                .in_phase(phase),
        );
    }
    assert_eq!(pipeline.system_ids(), vec![3, 1, 2]);

    run_frame(&mut world, &mut pipeline, 0.1).unwrap();
    assert_eq!(*order.lock().unwrap(), vec![3, 1, 2]);
}

#[test]
fn rate_limited_systems_skip_frames() {
    let (mut world, _) = common::setup_world();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);

    let mut pipeline = Pipeline::new();
    pipeline.add_system(
        FnSystem::new(1, "slow", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .with_interval(1.0),
    );

    let mut skipped = 0;
    for _ in 0..3 {
        skipped += run_frame(&mut world, &mut pipeline, 0.4).unwrap().systems_skipped;
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(skipped, 2);
    assert_eq!(world.stats().systems_ran_total, 1);
    assert_eq!(world.stats().frame_count, 3);
}

#[test]
fn interrupt_stops_table_iteration() {
    let (mut world, ids) = common::setup_world();
    common::spawn_movers(&mut world, &ids, 2).unwrap();
    world.spawn(Bundle::new().with(ids.position, Position::default())).unwrap();
    let position = ids.position;

    let visited = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&visited);

    let mut pipeline = Pipeline::new();
    pipeline.add_system(
        FnSystem::new(1, "first-only", move |ctx| {
            assert_eq!(ctx.matched_tables().len(), 2);
            ctx.for_each_table(|ctx, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                ctx.interrupt();
            });
        })
        .with_column(SystemColumn::read(position)),
    );

    run_frame(&mut world, &mut pipeline, 0.1).unwrap();
    assert_eq!(visited.load(Ordering::SeqCst), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Matching and rebuilds
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn schedule_is_rebuilt_when_tables_appear() {
    let (mut world, ids) = common::setup_world();
    common::spawn_movers(&mut world, &ids, 1).unwrap();
    let health = ids.health;

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);

    let mut pipeline = Pipeline::new();
    pipeline.add_system(
        FnSystem::new(1, "heal", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .with_column(SystemColumn::read(health)),
    );

    run_frame(&mut world, &mut pipeline, 0.1).unwrap();
    run_frame(&mut world, &mut pipeline, 0.1).unwrap();
    assert_eq!(world.stats().pipeline_build_count_total, 1);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(pipeline.schedule().unwrap().ops.is_empty());

    let patient = world.spawn(Bundle::new().with(health, Health(1))).unwrap();
    assert!(pipeline.needs_rebuild(&world));

    run_frame(&mut world, &mut pipeline, 0.1).unwrap();
    assert_eq!(world.stats().pipeline_build_count_total, 2);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let table = world.table_of(patient).unwrap();
    assert_eq!(world.tables().get(table).unwrap().queries_matched(), 1);
}

#[test]
fn system_matching_goes_through_the_world_matcher() {
    let (world, ids) = common::setup_world();
    let mut world = world.with_matcher(CrowdedTables { min_rows: 2 });
    let movers = common::spawn_movers(&mut world, &ids, 3).unwrap();
    world.spawn(Bundle::new().with(ids.position, Position::default())).unwrap();
    world.spawn(Bundle::new().with(ids.health, Health(1))).unwrap();

    let crowded = world.table_of(movers[0]).unwrap();
    assert_eq!(matched_tables(&world, &[SystemColumn::read(ids.position)]), vec![crowded]);
    assert!(!is_active(&world, &[SystemColumn::read(ids.health)]));

    let mut pipeline = Pipeline::new();
    pipeline.add_system(noop(1).with_column(SystemColumn::read(ids.position)));
    pipeline.add_system(noop(2).with_column(SystemColumn::read(ids.health)));
    pipeline.rebuild(&mut world);
    assert_eq!(pipeline.matched_systems(&world), vec![0]);
    assert_eq!(world.tables().get(crowded).unwrap().queries_matched(), 1);
}

#[test]
fn fixed_entity_sources_are_watched() {
    let (mut world, ids) = common::setup_world();
    let anchor = common::spawn_movers(&mut world, &ids, 2).unwrap()[0];

    let mut pipeline = Pipeline::new();
    pipeline.add_system(
        noop(1).with_column(SystemColumn::read(ids.position).from(SourceKind::Entity(anchor))),
    );
    run_frame(&mut world, &mut pipeline, 0.1).unwrap();

    assert!(world.entities().get(anchor).unwrap().is_watched);
}

#[test]
fn disabling_a_system_forces_a_rebuild() {
    let (mut world, _) = common::setup_world();
    let mut pipeline = Pipeline::new();
    pipeline.add_system(noop(1));
    pipeline.add_system(noop(2));

    assert_eq!(run_frame(&mut world, &mut pipeline, 0.1).unwrap().systems_ran, 2);
    assert!(pipeline.set_enabled(2, false));
    assert!(!pipeline.set_enabled(9, false));
    assert!(pipeline.needs_rebuild(&world));

    assert_eq!(run_frame(&mut world, &mut pipeline, 0.1).unwrap().systems_ran, 1);
    assert_eq!(world.stats().systems_ran_frame, 1);

    assert!(pipeline.remove_system(1).is_some());
    assert_eq!(run_frame(&mut world, &mut pipeline, 0.1).unwrap().systems_ran, 0);
}

#[test]
fn frame_is_refused_while_staged() {
    let (mut world, _) = common::setup_world();
    let mut pipeline = Pipeline::new();
    world.begin_staging().unwrap();
    assert!(matches!(
        run_frame(&mut world, &mut pipeline, 0.1),
        Err(ECSError::Unsupported(_))
    ));
}

#[test]
fn frame_time_is_optional() {
    common::init_logging();
    let mut world = World::new(WorldConfig::default().with_measure_frame_time(false));
    let mut pipeline = Pipeline::new();
    pipeline.add_system(noop(1));

    let report = run_frame(&mut world, &mut pipeline, 0.1).unwrap();
    assert!(report.frame_time.is_zero());
    assert!(world.stats().frame_time_total.is_zero());
}
