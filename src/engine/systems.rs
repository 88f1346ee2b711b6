//! System declarations and the system execution entry point.
//!
//! A **system** is a unit of logic run once per frame by the pipeline. It
//! declares, per attribute, where it reads or writes ([`SystemColumn`]). The
//! scheduler uses those declarations to decide where merges are needed, and
//! the [`SystemContext`] uses them to decide which writes may go straight to
//! the primary storage.
//!
//! ## Column semantics
//!
//! | source      | operator | inout        | effect at run time                  |
//! |-------------|----------|--------------|-------------------------------------|
//! | `SelfTable` | `And`    | `In`         | reads the matched tables            |
//! | `SelfTable` | `And`    | `Out/InOut`  | writes the matched tables directly  |
//! | `SelfTable` | `Not`    | any          | excludes tables; writes are staged  |
//! | `Empty`     | any      | `Out/InOut`  | writes are staged                   |
//! | any         | `Or`     | any          | at least one `Or` id must be present |
//!
//! ## Rate limiting
//!
//! A system with an interval only runs once enough frame time has
//! accumulated. A skipped system is skipped entirely, before its context is
//! built.

use std::time::{Duration, Instant};

use crate::engine::attribute::{AttributeRegistry, Bundle};
use crate::engine::commands::{Command, CommandBuffer};
use crate::engine::entity::{Entity, EntityIndex};
use crate::engine::error::{ECSResult, UnsupportedOperationError};
use crate::engine::filter::Filter;
use crate::engine::graph::TableRegistry;
use crate::engine::storage::Column;
use crate::engine::table::Table;
use crate::engine::types::{AttributeID, SystemID, TableID, Type};
use crate::engine::world::World;


/// Where a column's data comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    /// The tables matched by the system.
    SelfTable,
    /// No source: the system only produces data (task-style).
    Empty,
    /// A single, fixed entity.
    Entity(Entity),
}

/// Declared access intent of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InOutKind {
    /// Read only.
    In,
    /// Write only.
    Out,
    /// Read and write.
    InOut,
}

/// Operator applied to a column during matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperKind {
    /// The attribute must be present.
    And,
    /// The attribute must be absent.
    Not,
    /// One of the `Or` attributes must be present.
    Or,
}

/// One declared attribute access of a system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SystemColumn {
    /// Data source.
    pub source: SourceKind,
    /// Attribute accessed.
    pub attribute: AttributeID,
    /// Access intent.
    pub inout: InOutKind,
    /// Matching operator.
    pub oper: OperKind,
}

impl SystemColumn {
    /// Fully specified column.
    pub const fn new(source: SourceKind, attribute: AttributeID, inout: InOutKind, oper: OperKind) -> Self {
        Self { source, attribute, inout, oper }
    }

    /// `In` column on the system's own tables.
    pub const fn read(attribute: AttributeID) -> Self {
        Self::new(SourceKind::SelfTable, attribute, InOutKind::In, OperKind::And)
    }

    /// `Out` column on the system's own tables.
    pub const fn write(attribute: AttributeID) -> Self {
        Self::new(SourceKind::SelfTable, attribute, InOutKind::Out, OperKind::And)
    }

    /// `InOut` column on the system's own tables.
    pub const fn read_write(attribute: AttributeID) -> Self {
        Self::new(SourceKind::SelfTable, attribute, InOutKind::InOut, OperKind::And)
    }

    /// Returns the column with another source.
    pub const fn from(mut self, source: SourceKind) -> Self {
        self.source = source;
        self
    }

    /// Returns the column with another operator.
    pub const fn oper(mut self, oper: OperKind) -> Self {
        self.oper = oper;
        self
    }

    /// Returns `true` if the column writes straight into the matched tables.
    pub fn writes_primary(&self) -> bool {
        self.source == SourceKind::SelfTable && self.oper != OperKind::Not && self.inout != InOutKind::In
    }
}

/// Pipeline phases, in execution order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelinePhase {
    /// Before anything else.
    PreFrame,
    /// Input loading.
    OnLoad,
    /// After loading.
    PostLoad,
    /// Before the update.
    PreUpdate,
    /// Main update; the default.
    #[default]
    OnUpdate,
    /// Validation of the update.
    OnValidate,
    /// After the update.
    PostUpdate,
    /// Before storing results.
    PreStore,
    /// Result storage.
    OnStore,
    /// After everything else.
    PostFrame,
}

/// A unit of logic run by the pipeline.
///
/// Systems must be `Send + Sync` so pipelines can be moved across threads.

pub trait System: Send + Sync {
    /// Stable identifier; orders systems within a phase.
    fn id(&self) -> SystemID;

    /// Human-readable name.
    fn name(&self) -> &str {
        ""
    }

    /// Phase the system runs in.
    fn phase(&self) -> PipelinePhase {
        PipelinePhase::OnUpdate
    }

    /// Declared columns, in declaration order.
    fn columns(&self) -> &[SystemColumn];

    /// Minimum frame time between two runs, `None` to run every frame.
    fn interval(&self) -> Option<f32> {
        None
    }

    /// Executes the system.
    fn run(&self, ctx: &mut SystemContext<'_>);
}

/// A [`System`] backed by a closure.

pub struct FnSystem<F>
where
    F: Fn(&mut SystemContext<'_>) + Send + Sync + 'static,
{
    id: SystemID,
    name: &'static str,
    phase: PipelinePhase,
    columns: Vec<SystemColumn>,
    interval: Option<f32>,
    f: F,
}

impl<F> FnSystem<F>
where
    F: Fn(&mut SystemContext<'_>) + Send + Sync + 'static,
{
    /// Creates a system in the `OnUpdate` phase with no column.
    pub fn new(id: SystemID, name: &'static str, f: F) -> Self {
        Self {
            id,
            name,
            phase: PipelinePhase::OnUpdate,
            columns: Vec::new(),
            interval: None,
            f,
        }
    }

    /// Appends a column declaration.
    pub fn with_column(mut self, column: SystemColumn) -> Self {
        self.columns.push(column);
        self
    }

    /// Sets the phase.
    pub fn in_phase(mut self, phase: PipelinePhase) -> Self {
        self.phase = phase;
        self
    }

    /// Sets the run interval in seconds.
    pub fn with_interval(mut self, seconds: f32) -> Self {
        self.interval = Some(seconds);
        self
    }
}

impl<F> System for FnSystem<F>
where
    F: Fn(&mut SystemContext<'_>) + Send + Sync + 'static,
{
    fn id(&self) -> SystemID { self.id }
    fn name(&self) -> &str { self.name }
    fn phase(&self) -> PipelinePhase { self.phase }
    fn columns(&self) -> &[SystemColumn] { &self.columns }
    fn interval(&self) -> Option<f32> { self.interval }
    fn run(&self, ctx: &mut SystemContext<'_>) { (self.f)(ctx) }
}

/// Per-system gate accumulating frame time against an interval.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RateLimit {
    interval: Option<f32>,
    accumulated: f32,
}

impl RateLimit {
    /// Gate for `interval` seconds, `None` to never skip.
    pub fn new(interval: Option<f32>) -> Self {
        Self { interval, accumulated: 0.0 }
    }

    /// Advances the gate by `delta_time` and returns `true` if the system
    /// should run this frame.
    pub fn tick(&mut self, delta_time: f32) -> bool {
        match self.interval {
            None => true,
            Some(interval) if interval <= 0.0 => true,
            Some(interval) => {
                self.accumulated += delta_time;
                if self.accumulated >= interval {
                    self.accumulated -= interval;
                    true
                } else {
                    false
                }
            }
        }
    }
}

/// Tables matched by a column list.
///
/// `SelfTable` columns with `And` form the include set and `Not` the exclude
/// set, evaluated by the world's matcher. `Or` columns additionally require
/// one of their ids. A column list without any `And`/`Or` column on its own
/// tables matches no table (task-style system).

pub fn matched_tables(world: &World, columns: &[SystemColumn]) -> Vec<TableID> {
    let own = |oper: OperKind| -> Vec<AttributeID> {
        columns
            .iter()
            .filter(|c| c.source == SourceKind::SelfTable && c.oper == oper)
            .map(|c| c.attribute)
            .collect()
    };
    let include = own(OperKind::And);
    let exclude = own(OperKind::Not);
    let any = Type::from_ids(&own(OperKind::Or));
    if include.is_empty() && any.is_empty() {
        return Vec::new();
    }

    let filter = Filter::new().include(&include).exclude(&exclude);
    world
        .tables
        .iter()
        .filter(|t| world.matcher.table_matches(t, &filter))
        .filter(|t| any.is_empty() || t.ty().contains_any(&any))
        .map(|t| t.id())
        .collect()
}

/// Returns `true` if a system with `columns` takes part in the pipeline:
/// task-style systems always do, others need at least one matched table.
pub fn is_active(world: &World, columns: &[SystemColumn]) -> bool {
    let is_task = !columns
        .iter()
        .any(|c| c.source == SourceKind::SelfTable && c.oper != OperKind::Not);
    is_task || !matched_tables(world, columns).is_empty()
}

/// View of the world handed to a running system.
///
/// ## Access rules
/// - Any column may be read.
/// - [`SystemContext::column_mut`] is only granted for attributes the system
///   declared as written on its own tables.
/// - Structural changes and all other writes are staged as commands.

pub struct SystemContext<'w> {
    tables: &'w mut TableRegistry,
    attributes: &'w AttributeRegistry,
    entities: &'w EntityIndex,
    commands: &'w mut CommandBuffer,
    columns: &'w [SystemColumn],
    matched: Vec<TableID>,
    system: SystemID,
    delta_time: f32,
    interrupted: bool,
}

impl<'w> SystemContext<'w> {
    /// Id of the running system.
    pub fn system_id(&self) -> SystemID { self.system }

    /// Frame delta time in seconds.
    pub fn delta_time(&self) -> f32 { self.delta_time }

    /// Tables matched by the system.
    pub fn matched_tables(&self) -> &[TableID] { &self.matched }

    /// Attribute registry.
    pub fn attributes(&self) -> &AttributeRegistry { self.attributes }

    /// Returns a table.
    pub fn table(&self, id: TableID) -> Option<&Table> { self.tables.get(id) }

    /// Entities of a table, empty if the table does not exist.
    pub fn entities_of(&self, id: TableID) -> &[Entity] {
        self.tables.get(id).map(|t| t.entities()).unwrap_or(&[])
    }

    /// Returns `true` if `entity` is alive in the primary storage.
    pub fn is_alive(&self, entity: Entity) -> bool { self.entities.is_alive(entity) }

    /// Reads a column of a table.
    pub fn column<T: 'static>(&self, table: TableID, attribute: AttributeID) -> Option<&Column<T>> {
        self.tables.get(table)?.column::<T>(attribute)
    }

    /// Writes a column of a table in the primary storage.
    ///
    /// ## Errors
    /// [`UnsupportedOperationError`] if the system did not declare
    /// `attribute` as `Out`/`InOut` on its own tables, or if the table holds
    /// no column of type `T` for it.

    pub fn column_mut<T: 'static>(&mut self, table: TableID, attribute: AttributeID) -> ECSResult<&mut Column<T>> {
        let declared = self
            .columns
            .iter()
            .any(|c| c.attribute == attribute && c.writes_primary());
        if !declared {
            return Err(UnsupportedOperationError {
                operation: "column_mut",
                reason: "attribute not declared as written on the system's own tables",
            }
            .into());
        }
        self.tables
            .get_mut(table)
            .and_then(|t| t.column_mut::<T>(attribute))
            .ok_or_else(|| {
                UnsupportedOperationError {
                    operation: "column_mut",
                    reason: "table holds no column of the requested type",
                }
                .into()
            })
    }

    /// Stages the creation of an entity.
    pub fn spawn(&mut self, bundle: Bundle) {
        self.commands.push(Command::Spawn { bundle });
    }

    /// Stages adding an attribute.
    pub fn add(&mut self, entity: Entity, attribute: AttributeID) {
        self.commands.push(Command::Add { entity, attribute });
    }

    /// Stages removing an attribute.
    pub fn remove(&mut self, entity: Entity, attribute: AttributeID) {
        self.commands.push(Command::Remove { entity, attribute });
    }

    /// Stages writing a value.
    pub fn set<T: Send + 'static>(&mut self, entity: Entity, attribute: AttributeID, value: T) {
        self.commands.push(Command::Set { entity, attribute, value: Box::new(value) });
    }

    /// Stages deleting an entity.
    pub fn delete(&mut self, entity: Entity) {
        self.commands.push(Command::Delete { entity });
    }

    /// Stops the system's own table iteration.
    pub fn interrupt(&mut self) { self.interrupted = true; }

    /// Returns `true` once [`SystemContext::interrupt`] was called.
    pub fn is_interrupted(&self) -> bool { self.interrupted }

    /// Calls `f` for each matched table until the system interrupts.
    pub fn for_each_table<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut SystemContext<'w>, TableID),
    {
        let matched = self.matched.clone();
        for table in matched {
            if self.interrupted {
                break;
            }
            f(self, table);
        }
    }
}

/// Outcome of one [`run_system`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SystemRun {
    /// Tables the system was given.
    pub tables: usize,
    /// The system interrupted its iteration.
    pub interrupted: bool,
    /// Wall-clock time spent in the system, if measured.
    pub elapsed: Duration,
}

/// Runs `system` once against `world`.
///
/// Writes the system is not allowed to make in place land in the world's
/// stage and become visible at the next merge.

pub fn run_system(world: &mut World, system: &dyn System, delta_time: f32) -> SystemRun {
    let matched = matched_tables(world, system.columns());
    let tables = matched.len();
    let start = world.config.measure_frame_time.then(Instant::now);

    let mut ctx = SystemContext {
        tables: &mut world.tables,
        attributes: &world.attributes,
        entities: &world.entities,
        commands: &mut world.stage,
        columns: system.columns(),
        matched,
        system: system.id(),
        delta_time,
        interrupted: false,
    };
    system.run(&mut ctx);

    SystemRun {
        tables,
        interrupted: ctx.interrupted,
        elapsed: start.map_or(Duration::ZERO, |s| s.elapsed()),
    }
}
