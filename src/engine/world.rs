//! World state, phase discipline and the merge operation.
//!
//! A [`World`] owns the attribute registry, the table registry, the entity
//! index and the stage (the buffer of staged commands). It is the context
//! object passed to every structural operation.
//!
//! ## Phases
//!
//! ```text
//!   Primary --begin_staging--> Executing --merge--> Merging --> Primary
//! ```
//!
//! * **Primary**: single-entity operations apply immediately and bulk
//!   operations are allowed.
//! * **Executing**: systems run. Structural changes and staged writes are
//!   recorded in the stage. Bulk operations are refused.
//! * **Merging**: the stage is drained FIFO into the primary tables. This
//!   phase only exists inside [`World::merge`].
//!
//! `merge` is idempotent: merging with an empty stage does nothing but
//! count the merge.

use std::any::{Any, TypeId};
use std::sync::Arc;
use std::time::Duration;

use log::{trace, warn};

use crate::engine::attribute::{AttributeRegistry, Bundle, RemoveHook};
use crate::engine::commands::{Command, CommandBuffer};
use crate::engine::entity::{Entity, EntityIndex, Record};
use crate::engine::error::{
    ECSError, ECSResult, MissingAttributeError, StaleEntityError, TypeMismatchError,
    UnknownAttributeError, UnsupportedOperationError,
};
use crate::engine::filter::{TableMatcher, TypeMatcher};
use crate::engine::graph::TableRegistry;
use crate::engine::storage::Column;
use crate::engine::types::{AttributeID, RowID, TableID, Type};


/// Execution phase of a world.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    /// Primary view: mutations apply immediately.
    #[default]
    Primary,
    /// Systems are executing; mutations are staged.
    Executing,
    /// Staged mutations are being applied.
    Merging,
}

/// World construction settings.
#[derive(Clone, Debug)]
pub struct WorldConfig {
    /// Record frame and system wall-clock time.
    pub measure_frame_time: bool,
    /// Entities to pre-size the entity index for.
    pub initial_entity_capacity: usize,
    /// Tables to pre-size the table registry for.
    pub initial_table_capacity: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            measure_frame_time: true,
            initial_entity_capacity: 0,
            initial_table_capacity: 0,
        }
    }
}

impl WorldConfig {
    /// Enables or disables frame time measurement.
    pub fn with_measure_frame_time(mut self, enabled: bool) -> Self {
        self.measure_frame_time = enabled;
        self
    }

    /// Sets the initial entity capacity.
    pub fn with_entity_capacity(mut self, entities: usize) -> Self {
        self.initial_entity_capacity = entities;
        self
    }

    /// Sets the initial table capacity.
    pub fn with_table_capacity(mut self, tables: usize) -> Self {
        self.initial_table_capacity = tables;
        self
    }
}

/// Counters reported by the world and the pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WorldStats {
    /// Frames run.
    pub frame_count: u64,
    /// Systems run during the last frame.
    pub systems_ran_frame: u32,
    /// Systems run since creation.
    pub systems_ran_total: u64,
    /// Merges performed since creation.
    pub merge_count_total: u64,
    /// Schedule builds since creation.
    pub pipeline_build_count_total: u64,
    /// Time spent inside systems.
    pub system_time_total: Duration,
    /// Time spent inside frames.
    pub frame_time_total: Duration,
    /// Duration of the last frame.
    pub last_frame_time: Duration,
}

/// Storage, registries and staging state.
///
/// ## Invariants
/// - Every live entity's record points at a live table and a row holding it.
/// - The stage is empty whenever the phase is `Merging` finishes.

pub struct World {
    pub(crate) config: WorldConfig,
    pub(crate) attributes: AttributeRegistry,
    pub(crate) tables: TableRegistry,
    pub(crate) entities: EntityIndex,
    pub(crate) stage: CommandBuffer,
    pub(crate) phase: Phase,
    pub(crate) matcher: Arc<dyn TableMatcher>,
    pub(crate) stats: WorldStats,
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl World {

    /// Creates an empty world.
    pub fn new(config: WorldConfig) -> Self {
        let attributes = AttributeRegistry::new();
        let tables = TableRegistry::with_capacity(config.initial_table_capacity, &attributes);
        let entities = EntityIndex::with_capacity(config.initial_entity_capacity);
        Self {
            config,
            attributes,
            tables,
            entities,
            stage: CommandBuffer::new(),
            phase: Phase::Primary,
            matcher: Arc::new(TypeMatcher),
            stats: WorldStats::default(),
        }
    }

    /// Replaces the table matcher used by bulk operations and system matching.
    pub fn with_matcher<M: TableMatcher + 'static>(mut self, matcher: M) -> Self {
        self.matcher = Arc::new(matcher);
        self
    }

    /// Settings the world was created with.
    #[inline]
    pub fn config(&self) -> &WorldConfig { &self.config }

    /// Current phase.
    #[inline]
    pub fn phase(&self) -> Phase { self.phase }

    /// Counters.
    #[inline]
    pub fn stats(&self) -> &WorldStats { &self.stats }

    /// Attribute registry.
    #[inline]
    pub fn attributes(&self) -> &AttributeRegistry { &self.attributes }

    /// Attribute registry, mutably.
    #[inline]
    pub fn attributes_mut(&mut self) -> &mut AttributeRegistry { &mut self.attributes }

    /// Table registry.
    #[inline]
    pub fn tables(&self) -> &TableRegistry { &self.tables }

    /// Entity index.
    #[inline]
    pub fn entities(&self) -> &EntityIndex { &self.entities }

    /// Active table matcher.
    #[inline]
    pub fn matcher(&self) -> &dyn TableMatcher { self.matcher.as_ref() }

    /// Registers data attribute `T`. See [`AttributeRegistry::register`].
    pub fn register<T: Default + Clone + Send + Sync + 'static>(&mut self, name: &str) -> AttributeID {
        self.attributes.register::<T>(name)
    }

    /// Registers a tag. See [`AttributeRegistry::register_tag`].
    pub fn register_tag(&mut self, name: &str) -> AttributeID {
        self.attributes.register_tag(name)
    }

    /// Number of live entities.
    #[inline]
    pub fn entity_count(&self) -> usize { self.entities.count() }

    /// Number of staged commands waiting for the next merge.
    #[inline]
    pub fn pending_commands(&self) -> usize { self.stage.len() }

    pub(crate) fn ensure_primary(&self, operation: &'static str) -> ECSResult<()> {
        match self.phase {
            Phase::Primary => Ok(()),
            Phase::Executing => Err(UnsupportedOperationError {
                operation,
                reason: "world is staged; only valid against the primary view",
            }
            .into()),
            Phase::Merging => Err(UnsupportedOperationError {
                operation,
                reason: "world is merging",
            }
            .into()),
        }
    }

    /// Enters the executing phase. Later mutations are staged.
    ///
    /// ## Errors
    /// [`UnsupportedOperationError`] unless the world is in the primary phase.

    pub fn begin_staging(&mut self) -> ECSResult<()> {
        self.ensure_primary("begin_staging")?;
        self.phase = Phase::Executing;
        Ok(())
    }

    /// Applies every staged command in recording order and returns to the
    /// primary phase.
    ///
    /// ## Behavior
    /// - Valid from the primary or executing phase. Merging an empty stage
    ///   is a no-op apart from the merge counter.
    /// - A command that fails (dead target, type mismatch, unknown attribute)
    ///   is dropped with a warning; the remaining commands still apply.
    ///
    /// Returns the number of commands applied.

    pub fn merge(&mut self) -> ECSResult<usize> {
        if self.phase == Phase::Merging {
            return Err(UnsupportedOperationError {
                operation: "merge",
                reason: "merge is not re-entrant",
            }
            .into());
        }
        self.phase = Phase::Merging;

        let commands = self.stage.take();
        let total = commands.len();
        let mut applied = 0;
        for command in commands {
            let kind = command.kind();
            match self.apply(command) {
                Ok(()) => applied += 1,
                Err(e) => warn!("dropped staged {kind} command: {e}"),
            }
        }

        self.phase = Phase::Primary;
        self.stats.merge_count_total += 1;
        trace!("merge applied {applied}/{total} staged commands");
        Ok(applied)
    }

    /// Records a command in the stage.
    pub fn defer(&mut self, command: Command) {
        self.stage.push(command);
    }

    fn apply(&mut self, command: Command) -> ECSResult<()> {
        match command {
            Command::Spawn { bundle } => self.spawn_now(bundle).map(|_| ()),
            Command::Delete { entity } => self.delete_now(entity),
            Command::Add { entity, attribute } => self.add_now(entity, attribute),
            Command::Remove { entity, attribute } => self.remove_now(entity, attribute),
            Command::Set { entity, attribute, value } => self.set_now(entity, attribute, value),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Single-entity operations
    // ─────────────────────────────────────────────────────────────────────

    /// Creates an entity from `bundle`.
    ///
    /// ## Errors
    /// - [`UnsupportedOperationError`] outside the primary phase; staged
    ///   spawns go through [`World::defer`] or a system context.
    /// - [`UnknownAttributeError`] / [`TypeMismatchError`] for invalid
    ///   bundle entries. Nothing is created in that case.

    pub fn spawn(&mut self, bundle: Bundle) -> ECSResult<Entity> {
        self.ensure_primary("spawn")?;
        self.spawn_now(bundle)
    }

    /// Adds `attribute` to `entity` (default value for data attributes).
    pub fn add(&mut self, entity: Entity, attribute: AttributeID) -> ECSResult<()> {
        if self.phase == Phase::Executing {
            self.defer(Command::Add { entity, attribute });
            return Ok(());
        }
        self.add_now(entity, attribute)
    }

    /// Removes `attribute` from `entity`.
    pub fn remove(&mut self, entity: Entity, attribute: AttributeID) -> ECSResult<()> {
        if self.phase == Phase::Executing {
            self.defer(Command::Remove { entity, attribute });
            return Ok(());
        }
        self.remove_now(entity, attribute)
    }

    /// Writes `value` to `attribute` of `entity`, adding the attribute first
    /// if needed.
    pub fn set<T: Send + 'static>(&mut self, entity: Entity, attribute: AttributeID, value: T) -> ECSResult<()> {
        if self.phase == Phase::Executing {
            self.defer(Command::Set { entity, attribute, value: Box::new(value) });
            return Ok(());
        }
        self.set_now(entity, attribute, Box::new(value))
    }

    /// Deletes `entity`, firing removal hooks of its attributes.
    pub fn delete(&mut self, entity: Entity) -> ECSResult<()> {
        if self.phase == Phase::Executing {
            self.defer(Command::Delete { entity });
            return Ok(());
        }
        self.delete_now(entity)
    }

    /// Value of `attribute` for `entity` in the primary storage.
    pub fn get<T: 'static>(&self, entity: Entity, attribute: AttributeID) -> Option<&T> {
        let record = self.entities.get(entity)?;
        self.tables
            .get(record.table)?
            .column::<T>(attribute)?
            .get(record.row as usize)
    }

    /// Returns `true` if `entity` is alive and carries `attribute`.
    pub fn has(&self, entity: Entity, attribute: AttributeID) -> bool {
        self.table_of(entity)
            .and_then(|t| self.tables.get(t))
            .is_some_and(|t| t.ty().contains(attribute))
    }

    /// Returns `true` if `entity` is alive.
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Table currently holding `entity`.
    pub fn table_of(&self, entity: Entity) -> Option<TableID> {
        self.entities.get(entity).map(|r| r.table)
    }

    /// Type of `entity`.
    pub fn type_of(&self, entity: Entity) -> Option<&Type> {
        self.tables.get(self.table_of(entity)?).map(|t| t.ty())
    }

    /// Typed column of `attribute` in table `table`.
    pub fn column<T: 'static>(&self, table: TableID, attribute: AttributeID) -> Option<&Column<T>> {
        self.tables.get(table)?.column::<T>(attribute)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Immediate mutation paths (primary and merging phases)
    // ─────────────────────────────────────────────────────────────────────

    fn record(&self, entity: Entity) -> ECSResult<Record> {
        self.entities
            .get(entity)
            .copied()
            .ok_or_else(|| StaleEntityError { entity }.into())
    }

    fn check_value(&self, attribute: AttributeID, value: &(dyn Any + Send)) -> ECSResult<()> {
        let desc = self
            .attributes
            .desc(attribute)
            .ok_or(UnknownAttributeError { attribute })?;
        let actual = (*value).type_id();
        match desc.type_id {
            Some(expected) if expected == actual => Ok(()),
            expected => Err(TypeMismatchError {
                expected: expected.unwrap_or(TypeId::of::<()>()),
                actual,
            }
            .into()),
        }
    }

    pub(crate) fn spawn_now(&mut self, bundle: Bundle) -> ECSResult<Entity> {
        let ty = bundle.ty();
        self.attributes.validate(&ty)?;
        let values: Vec<(AttributeID, Box<dyn Any + Send>)> = bundle.into_values().collect();
        for (attribute, value) in &values {
            self.check_value(*attribute, value.as_ref())?;
        }

        let table_id = self.tables.find_or_create(&ty, &self.attributes)?;

        let table = self
            .tables
            .get_mut(table_id)
            .ok_or_else(|| ECSError::Internal(format!("table {table_id} vanished during spawn")))?;
        let row = table.count() as RowID;
        let entity = self.entities.create(table_id, row);
        table.push_entity(entity);
        for (attribute, value) in values {
            table.set_dyn(row, attribute, value)?;
        }
        Ok(entity)
    }

    fn move_entity(&mut self, entity: Entity, record: Record, destination: TableID) -> ECSResult<()> {
        if record.table == destination {
            return Ok(());
        }
        let (source, target) = self
            .tables
            .get_pair_mut(record.table, destination)
            .ok_or_else(|| ECSError::Internal(format!(
                "cannot move entity {entity} from table {} to {destination}",
                record.table
            )))?;

        let (row, displaced) = source.move_row_to(record.row, target);
        if let Some(displaced) = displaced {
            self.entities.set_location(displaced, record.table, record.row);
        }
        self.entities.set_location(entity, destination, row);
        Ok(())
    }

    pub(crate) fn add_now(&mut self, entity: Entity, attribute: AttributeID) -> ECSResult<()> {
        let record = self.record(entity)?;
        let destination = self.tables.traverse_add(record.table, &[attribute], &self.attributes)?;
        self.move_entity(entity, record, destination)
    }

    pub(crate) fn remove_now(&mut self, entity: Entity, attribute: AttributeID) -> ECSResult<()> {
        let record = self.record(entity)?;
        let destination = self.tables.traverse_remove(record.table, &[attribute], &self.attributes)?;
        self.move_entity(entity, record, destination)
    }

    pub(crate) fn set_now(&mut self, entity: Entity, attribute: AttributeID, value: Box<dyn Any + Send>) -> ECSResult<()> {
        self.check_value(attribute, value.as_ref())?;
        self.add_now(entity, attribute)?;
        let record = self.record(entity)?;
        let table = self
            .tables
            .get_mut(record.table)
            .ok_or_else(|| ECSError::Internal(format!("table {} does not exist", record.table)))?;
        if table.set_dyn(record.row, attribute, value)? {
            Ok(())
        } else {
            Err(MissingAttributeError { entity, attribute }.into())
        }
    }

    pub(crate) fn delete_now(&mut self, entity: Entity) -> ECSResult<()> {
        let record = self.record(entity)?;
        if let Some(ty) = self.tables.get(record.table).map(|t| t.ty().clone()) {
            self.fire_remove_hooks(&ty, &[entity]);
        }

        let table = self
            .tables
            .get_mut(record.table)
            .ok_or_else(|| ECSError::Internal(format!("table {} does not exist", record.table)))?;
        if let Some(displaced) = table.delete_row(record.row) {
            self.entities.set_location(displaced, record.table, record.row);
        }
        self.entities.remove(entity);
        Ok(())
    }

    /// Calls the removal hook of every attribute of `ty` that has one.
    pub(crate) fn fire_remove_hooks(&self, ty: &Type, entities: &[Entity]) {
        if entities.is_empty() {
            return;
        }
        let hooks: Vec<(AttributeID, RemoveHook)> = ty
            .ids()
            .iter()
            .filter_map(|&a| Some((a, self.attributes.desc(a)?.on_remove()?.clone())))
            .collect();
        for (attribute, hook) in hooks {
            hook(attribute, entities);
        }
    }
}
