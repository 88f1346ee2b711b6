//! Entity handles and the entity index.

use std::fmt;

use crate::engine::sparse::SparseSet;
use crate::engine::types::{RowID, TableID};


const INDEX_BITS: u32 = 32;
const INDEX_MASK: u64 = (1u64 << INDEX_BITS) - 1;

/// Entity handle: low 32 bits index the entity index, high 32 bits carry the
/// generation used to detect stale handles.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Entity(pub u64);

#[inline]
const fn make_id(index: u32, generation: u32) -> u64 {
    ((generation as u64) << INDEX_BITS) | (index as u64)
}

impl Entity {
    /// Packs an index and a generation.
    #[inline] pub fn new(index: u32, generation: u32) -> Self { Entity(make_id(index, generation)) }
    /// Slot in the entity index.
    #[inline] pub fn index(self) -> u32 { (self.0 & INDEX_MASK) as u32 }
    /// Generation of the slot when the handle was issued.
    #[inline] pub fn generation(self) -> u32 { (self.0 >> INDEX_BITS) as u32 }
    /// Raw 64-bit value.
    #[inline] pub fn to_bits(self) -> u64 { self.0 }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

/// Where an entity currently lives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Record {
    /// Table holding the entity.
    pub table: TableID,
    /// Row inside the table.
    pub row: RowID,
    /// Current generation of the slot.
    pub generation: u32,
    /// Set once the entity is used as a fixed system source.
    pub is_watched: bool,
}

/// Entity index backed by a [`SparseSet`] of records.
///
/// A record's generation survives removal because the allocator leaves
/// removed payloads untouched; it is bumped on removal so the recycled slot
/// hands out a fresh handle.
#[derive(Default)]
pub struct EntityIndex {
    records: SparseSet<Record>,
}

impl EntityIndex {
    /// Creates an empty index.
    pub fn new() -> Self { Self::default() }

    /// Creates an index pre-sized for `entities` records.
    pub fn with_capacity(entities: usize) -> Self {
        Self { records: SparseSet::with_capacity(entities) }
    }

    /// Issues a handle located at `(table, row)`.
    pub fn create(&mut self, table: TableID, row: RowID) -> Entity {
        let (index, record) = self.records.add();
        record.table = table;
        record.row = row;
        record.is_watched = false;
        Entity::new(index, record.generation)
    }

    /// Record of a live entity; `None` for stale handles.
    pub fn get(&self, entity: Entity) -> Option<&Record> {
        self.records
            .get_sparse(entity.index())
            .filter(|r| r.generation == entity.generation())
    }

    /// Mutable variant of [`EntityIndex::get`].
    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut Record> {
        self.records
            .get_sparse_mut(entity.index())
            .filter(|r| r.generation == entity.generation())
    }

    /// Returns `true` if the handle is current.
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool { self.get(entity).is_some() }

    /// Points a live entity at a new `(table, row)`.
    pub fn set_location(&mut self, entity: Entity, table: TableID, row: RowID) -> bool {
        match self.get_mut(entity) {
            Some(record) => {
                record.table = table;
                record.row = row;
                true
            }
            None => false,
        }
    }

    /// Flags a live entity as watched.
    pub fn watch(&mut self, entity: Entity) -> bool {
        match self.get_mut(entity) {
            Some(record) => { record.is_watched = true; true }
            None => false,
        }
    }

    /// Unregisters `entity`, returning its last record.
    pub fn remove(&mut self, entity: Entity) -> Option<Record> {
        let record = self.get_mut(entity)?;
        let last = *record;
        record.generation = record.generation.wrapping_add(1);
        self.records.remove(entity.index());
        Some(last)
    }

    /// Number of live entities.
    #[inline]
    pub fn count(&self) -> usize { self.records.count() }

    /// Iterates live entities with their records.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &Record)> + '_ {
        self.records
            .iter()
            .map(|(index, record)| (Entity::new(index, record.generation), record))
    }
}
