//! Pipeline scheduling and frame execution.
//!
//! This module is responsible for:
//! * ordering systems by phase and id,
//! * partitioning them into ops: runs of systems that need no merge in
//!   between,
//! * driving a frame: merge, run each op, merge between ops.
//!
//! ## Hazard analysis
//!
//! Each attribute carries a [`WriteState`] during a build pass. Walking the
//! systems in order:
//! * a write from the system's own tables (`Out`/`InOut`) marks the attribute
//!   `WriteToMain`: later systems see it directly;
//! * a write from an empty source, or through a `Not` column, marks it
//!   `WriteToStage`: it only lands at the next merge;
//! * a read (`In`/`InOut`) of an attribute in `WriteToStage` is a
//!   **hazard**, whether it comes from the system's own tables, an empty
//!   source or a `Not` column. The current op is closed, every state is
//!   reset (a merge publishes everything) and the system is re-scanned to
//!   seed the new op.
//!
//! `Or` columns and columns with a fixed entity source do not take part.
//!
//! ## Rebuilds
//!
//! A schedule records the match generation it was built for: the pipeline's
//! own revision (systems added, removed, toggled) plus the table registry
//! generation (tables created or invalidated). A differing generation forces
//! a full rebuild; schedules are never patched.

use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::engine::error::ECSResult;
use crate::engine::systems::{
    is_active, matched_tables, run_system, InOutKind, OperKind, RateLimit, SourceKind, System,
    SystemColumn,
};
use crate::engine::types::SystemID;
use crate::engine::world::{Phase, World};


/// Per-attribute write state during a build pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WriteState {
    /// No pending write.
    #[default]
    NotWritten,
    /// Written in place; visible to later systems.
    WriteToMain,
    /// Written to the stage; visible after the next merge.
    WriteToStage,
}

/// A run of systems executed without an intervening merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineOp {
    /// Number of systems in the run.
    pub system_count: u32,
}

/// Ordered ops plus the generation they were built for.
///
/// ## Invariants
/// - No op has a zero `system_count`.
/// - The counts sum to the number of systems the schedule was built from.

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Schedule {
    /// Ops in execution order.
    pub ops: Vec<PipelineOp>,
    /// Match generation at build time.
    pub match_generation: u64,
}

impl Schedule {
    /// Total number of systems covered by the ops.
    pub fn system_count(&self) -> usize {
        self.ops.iter().map(|op| op.system_count as usize).sum()
    }

    /// Number of merges a frame performs between ops.
    pub fn merges_between_ops(&self) -> usize {
        self.ops.len().saturating_sub(1)
    }
}

fn check_column(column: &SystemColumn, states: &mut [WriteState]) -> bool {
    if column.oper == OperKind::Or {
        return false;
    }
    let state = &mut states[column.attribute as usize];

    if column.source == SourceKind::SelfTable && column.oper != OperKind::Not {
        if column.inout != InOutKind::Out && *state == WriteState::WriteToStage {
            return true;
        }
        if column.inout != InOutKind::In {
            *state = WriteState::WriteToMain;
        }
    } else if column.source == SourceKind::Empty || column.oper == OperKind::Not {
        let needs_merge = column.inout != InOutKind::Out && *state == WriteState::WriteToStage;
        if column.inout != InOutKind::In {
            *state = WriteState::WriteToStage;
        }
        return needs_merge;
    }
    false
}

fn scan_system(columns: &[SystemColumn], states: &mut [WriteState]) -> bool {
    let mut hazard = false;
    for column in columns {
        hazard |= check_column(column, states);
    }
    hazard
}

/// Partitions `systems` (already in pipeline order) into ops.
///
/// ## Panics
/// If a system raises a hazard against the freshly reset state. This means
/// the system both stages and reads the same attribute, which a system
/// declaration must not do.

pub fn build_schedule(systems: &[&dyn System], match_generation: u64) -> Schedule {
    let size = systems
        .iter()
        .flat_map(|s| s.columns())
        .map(|c| c.attribute as usize + 1)
        .max()
        .unwrap_or(0);
    let mut states = vec![WriteState::NotWritten; size];
    let mut ops: Vec<PipelineOp> = Vec::new();
    let mut open = false;

    for system in systems {
        if scan_system(system.columns(), &mut states) {
            states.fill(WriteState::NotWritten);
            open = false;
            let again = scan_system(system.columns(), &mut states);
            assert!(
                !again,
                "system {} ({}) raised a hazard right after a merge; \
                 it reads an attribute it also stages",
                system.id(),
                system.name()
            );
        }
        if !open {
            ops.push(PipelineOp { system_count: 0 });
            open = true;
        }
        if let Some(op) = ops.last_mut() {
            op.system_count += 1;
        }
    }

    let schedule = Schedule { ops, match_generation };
    assert_eq!(
        schedule.system_count(),
        systems.len(),
        "schedule op counts do not cover every system"
    );
    schedule
}

struct PipelineEntry {
    system: Box<dyn System>,
    enabled: bool,
    rate: RateLimit,
}

/// Ordered system list with its cached schedule.

#[derive(Default)]
pub struct Pipeline {
    entries: Vec<PipelineEntry>,
    matched: Vec<usize>,
    schedule: Option<Schedule>,
    revision: u64,
}

impl Pipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a system in `(phase, id)` order.
    pub fn add_system<S: System + 'static>(&mut self, system: S) {
        self.add_boxed(Box::new(system));
    }

    /// Boxed form of [`Pipeline::add_system`].
    pub fn add_boxed(&mut self, system: Box<dyn System>) {
        let key = (system.phase(), system.id());
        let at = self
            .entries
            .partition_point(|e| (e.system.phase(), e.system.id()) <= key);
        let rate = RateLimit::new(system.interval());
        self.entries.insert(at, PipelineEntry { system, enabled: true, rate });
        self.revision += 1;
    }

    /// Removes the system with `id`.
    pub fn remove_system(&mut self, id: SystemID) -> Option<Box<dyn System>> {
        let at = self.entries.iter().position(|e| e.system.id() == id)?;
        self.revision += 1;
        Some(self.entries.remove(at).system)
    }

    /// Enables or disables a system. Disabled systems are not matched.
    ///
    /// Returns `false` if no system has `id`.

    pub fn set_enabled(&mut self, id: SystemID, enabled: bool) -> bool {
        match self.entries.iter_mut().find(|e| e.system.id() == id) {
            Some(entry) => {
                if entry.enabled != enabled {
                    entry.enabled = enabled;
                    self.revision += 1;
                }
                true
            }
            None => false,
        }
    }

    /// Number of systems, enabled or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the pipeline holds no system.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of all systems in pipeline order.
    pub fn system_ids(&self) -> Vec<SystemID> {
        self.entries.iter().map(|e| e.system.id()).collect()
    }

    /// Current match generation against `world`.
    pub fn match_generation(&self, world: &World) -> u64 {
        self.revision + world.tables().generation()
    }

    /// Indices of the systems taking part in the pipeline: enabled and
    /// active, in pipeline order.
    pub fn matched_systems(&self, world: &World) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.enabled && is_active(world, e.system.columns()))
            .map(|(i, _)| i)
            .collect()
    }

    /// Last built schedule.
    pub fn schedule(&self) -> Option<&Schedule> {
        self.schedule.as_ref()
    }

    /// Returns `true` if the schedule is missing or stale.
    pub fn needs_rebuild(&self, world: &World) -> bool {
        self.schedule
            .as_ref()
            .map_or(true, |s| s.match_generation != self.match_generation(world))
    }

    /// Rebuilds the schedule from the currently matched systems.
    ///
    /// Also refreshes each table's count of matching systems and watches the
    /// entities used as fixed column sources.

    pub fn rebuild(&mut self, world: &mut World) -> &Schedule {
        let generation = self.match_generation(world);
        self.matched = self.matched_systems(world);

        let systems: Vec<&dyn System> = self
            .matched
            .iter()
            .map(|&i| self.entries[i].system.as_ref())
            .collect();
        let schedule = build_schedule(&systems, generation);

        let table_ids = world.tables.ids();
        let slots = table_ids.iter().max().map_or(0, |&m| m as usize + 1);
        let mut counts = vec![0u32; slots];
        for system in &systems {
            for table in matched_tables(world, system.columns()) {
                counts[table as usize] += 1;
            }
            for column in system.columns() {
                if let SourceKind::Entity(entity) = column.source {
                    world.entities.watch(entity);
                }
            }
        }
        for id in table_ids {
            if let Some(table) = world.tables.get_mut(id) {
                table.set_queries_matched(counts[id as usize]);
            }
        }

        world.stats.pipeline_build_count_total += 1;
        debug!(
            "built schedule for {} systems at generation {generation}: {:?}",
            systems.len(),
            schedule.ops.iter().map(|op| op.system_count).collect::<Vec<_>>()
        );
        self.schedule.insert(schedule)
    }
}

/// What a [`run_frame`] call did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Systems run.
    pub systems_ran: u32,
    /// Systems skipped by their rate limit.
    pub systems_skipped: u32,
    /// Merges performed, the frame-start merge included.
    pub merges: u32,
    /// Wall-clock frame time, zero if not measured.
    pub frame_time: Duration,
}

/// Runs one frame of `pipeline` against `world`.
///
/// ## Behavior
/// 1. Merges, so the frame starts from a consistent primary view.
/// 2. Rebuilds the schedule if its generation is stale.
/// 3. Runs the matched systems in order while the world is staged. A system
///    whose rate limit has not elapsed is skipped but still counts toward
///    its op.
/// 4. Merges whenever an op completes and another op follows.
/// 5. Records the frame time.
///
/// The writes staged by the last op stay pending until the next frame's
/// opening merge or an explicit [`World::merge`].
///
/// ## Errors
/// [`crate::engine::error::UnsupportedOperationError`] unless the world is
/// in its primary phase.
///
/// ## Panics
/// If the op counts of the schedule drift from the matched system list.

pub fn run_frame(world: &mut World, pipeline: &mut Pipeline, delta_time: f32) -> ECSResult<FrameReport> {
    world.ensure_primary("run_frame")?;
    let start = world.config.measure_frame_time.then(Instant::now);
    let mut report = FrameReport::default();

    world.merge()?;
    report.merges += 1;

    if pipeline.needs_rebuild(world) {
        pipeline.rebuild(world);
    }
    let ops = pipeline.schedule().map(|s| s.ops.clone()).unwrap_or_default();
    let matched = pipeline.matched.clone();

    world.begin_staging()?;
    let mut next = 0;
    for (op_index, op) in ops.iter().enumerate() {
        for _ in 0..op.system_count {
            let entry = &mut pipeline.entries[matched[next]];
            next += 1;

            if !entry.rate.tick(delta_time) {
                report.systems_skipped += 1;
                continue;
            }
            let run = run_system(world, entry.system.as_ref(), delta_time);
            trace!(
                "ran system {} ({}) over {} tables",
                entry.system.id(),
                entry.system.name(),
                run.tables
            );
            world.stats.system_time_total += run.elapsed;
            report.systems_ran += 1;
        }

        if op_index + 1 < ops.len() {
            world.merge()?;
            report.merges += 1;
            world.begin_staging()?;
        }
    }
    assert_eq!(next, matched.len(), "pipeline op bookkeeping out of sync");
    world.phase = Phase::Primary;

    report.frame_time = start.map_or(Duration::ZERO, |s| s.elapsed());
    let stats = &mut world.stats;
    stats.frame_count += 1;
    stats.systems_ran_frame = report.systems_ran;
    stats.systems_ran_total += report.systems_ran as u64;
    stats.frame_time_total += report.frame_time;
    stats.last_frame_time = report.frame_time;
    Ok(report)
}
