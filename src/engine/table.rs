//! # Tables
//!
//! A [`Table`] stores every entity whose attribute set is exactly its
//! [`Type`]: one [`TypeErasedColumn`] per data attribute plus the entity
//! array, all kept row-aligned.
//!
//! ## Design
//! - Columns are kept sorted by attribute id so the two sides of a move or a
//!   merge can be walked in step.
//! - Tags contribute to the type but own no column.
//! - Each table records its outgoing transition edges (`edges`) and the
//!   `(table, attribute)` pairs whose edges point at it (`incoming`). The
//!   registry in [`crate::engine::graph`] maintains both.
//!
//! ## Invariants
//! - Every column has exactly `entities.len()` rows.
//! - Row `r` of every column belongs to `entities[r]`.
//! - Row removal is swap-remove; the entity that moved into the freed row is
//!   reported to the caller so its record can be patched.

use std::any::Any;
use std::collections::HashMap;

use crate::engine::attribute::AttributeRegistry;
use crate::engine::entity::Entity;
use crate::engine::error::{ECSResult, UnknownAttributeError};
use crate::engine::storage::{Column, TypeErasedColumn};
use crate::engine::types::{AttributeID, RowID, TableID, Type};


/// Memoized transitions for one attribute.
///
/// - `add`: the table reached by adding the attribute. Points at the table
///   itself when the attribute is already part of its type.
/// - `remove`: the table reached by removing the attribute.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Edge {
    /// Destination of the add transition.
    pub add: Option<TableID>,
    /// Destination of the remove transition.
    pub remove: Option<TableID>,
}

/// Bit flags describing a table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableFlags(u8);

impl TableFlags {
    /// The table type contains at least one builtin attribute.
    pub const HAS_BUILTINS: TableFlags = TableFlags(1 << 0);
    /// The table is the registry's empty-type root.
    pub const IS_ROOT: TableFlags = TableFlags(1 << 1);

    /// Returns `true` if every bit of `other` is set.
    #[inline]
    pub fn contains(self, other: TableFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    fn insert(&mut self, other: TableFlags) {
        self.0 |= other.0;
    }
}

/// Contiguous storage for all entities sharing one [`Type`].

#[derive(Default)]
pub struct Table {
    id: TableID,
    ty: Type,
    columns: Vec<(AttributeID, Box<dyn TypeErasedColumn>)>,
    entities: Vec<Entity>,
    pub(crate) edges: HashMap<AttributeID, Edge>,
    pub(crate) incoming: Vec<(TableID, AttributeID)>,
    flags: TableFlags,
    queries_matched: u32,
}

impl Table {

    /// Creates an empty table for `ty`.
    ///
    /// ## Behavior
    /// - Allocates one empty column per data attribute of `ty`.
    /// - Sets `HAS_BUILTINS` if any attribute is builtin and `IS_ROOT` if
    ///   `ty` is empty.
    ///
    /// ## Errors
    /// [`UnknownAttributeError`] if an id of `ty` is not registered.

    pub fn new(id: TableID, ty: Type, attributes: &AttributeRegistry) -> ECSResult<Self> {
        let mut columns = Vec::new();
        let mut flags = TableFlags::default();

        for &attribute in ty.ids() {
            let desc = attributes
                .desc(attribute)
                .ok_or(UnknownAttributeError { attribute })?;
            if desc.builtin {
                flags.insert(TableFlags::HAS_BUILTINS);
            }
            if let Some(column) = desc.make_column() {
                columns.push((attribute, column));
            }
        }
        if ty.is_empty() {
            flags.insert(TableFlags::IS_ROOT);
        }

        Ok(Self {
            id,
            ty,
            columns,
            entities: Vec::new(),
            edges: HashMap::new(),
            incoming: Vec::new(),
            flags,
            queries_matched: 0,
        })
    }

    /// Table id.
    #[inline]
    pub fn id(&self) -> TableID { self.id }

    /// Attribute set of this table.
    #[inline]
    pub fn ty(&self) -> &Type { &self.ty }

    /// Number of rows.
    #[inline]
    pub fn count(&self) -> usize { self.entities.len() }

    /// Returns `true` if the table has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool { self.entities.is_empty() }

    /// Entities by row.
    #[inline]
    pub fn entities(&self) -> &[Entity] { &self.entities }

    /// Table flags.
    #[inline]
    pub fn flags(&self) -> TableFlags { self.flags }

    /// Shorthand for `flags().contains(TableFlags::HAS_BUILTINS)`.
    #[inline]
    pub fn has_builtins(&self) -> bool { self.flags.contains(TableFlags::HAS_BUILTINS) }

    /// Number of system queries currently matching this table.
    #[inline]
    pub fn queries_matched(&self) -> u32 { self.queries_matched }

    pub(crate) fn set_queries_matched(&mut self, count: u32) {
        self.queries_matched = count;
    }

    /// Memoized edge for `attribute`.
    #[inline]
    pub fn edge(&self, attribute: AttributeID) -> Option<Edge> {
        self.edges.get(&attribute).copied()
    }

    /// Tables with an edge pointing at this table, with the edge attribute.
    #[inline]
    pub fn incoming(&self) -> &[(TableID, AttributeID)] { &self.incoming }

    /// Attributes that own a column, in ascending order.
    pub fn column_attributes(&self) -> impl Iterator<Item = AttributeID> + '_ {
        self.columns.iter().map(|(attribute, _)| *attribute)
    }

    fn column_index(&self, attribute: AttributeID) -> Option<usize> {
        self.columns.binary_search_by_key(&attribute, |(a, _)| *a).ok()
    }

    /// Type-erased column of `attribute`.
    pub fn column_dyn(&self, attribute: AttributeID) -> Option<&dyn TypeErasedColumn> {
        let index = self.column_index(attribute)?;
        Some(self.columns[index].1.as_ref())
    }

    /// Typed column of `attribute`, `None` if absent or of another type.
    pub fn column<T: 'static>(&self, attribute: AttributeID) -> Option<&Column<T>> {
        self.column_dyn(attribute)?.as_any().downcast_ref::<Column<T>>()
    }

    /// Mutable typed column of `attribute`.
    pub fn column_mut<T: 'static>(&mut self, attribute: AttributeID) -> Option<&mut Column<T>> {
        let index = self.column_index(attribute)?;
        self.columns[index].1.as_any_mut().downcast_mut::<Column<T>>()
    }

    /// Appends a row for `entity` with default values and returns its row.
    pub fn push_entity(&mut self, entity: Entity) -> RowID {
        let row = self.entities.len() as RowID;
        self.entities.push(entity);
        for (_, column) in self.columns.iter_mut() {
            column.push_default_dyn(1);
        }
        row
    }

    /// Writes a boxed value into `(row, attribute)`.
    ///
    /// Returns `Ok(false)` if the table has no column for `attribute` or the
    /// row is out of range.

    pub fn set_dyn(&mut self, row: RowID, attribute: AttributeID, value: Box<dyn Any + Send>) -> ECSResult<bool> {
        match self.column_index(attribute) {
            Some(index) => Ok(self.columns[index].1.set_dyn(row as usize, value)?),
            None => Ok(false),
        }
    }

    /// Swap-removes `row` from every column and the entity array.
    ///
    /// Returns the entity that moved into `row`, if any.

    pub fn delete_row(&mut self, row: RowID) -> Option<Entity> {
        let row = row as usize;
        if row >= self.entities.len() {
            return None;
        }
        for (_, column) in self.columns.iter_mut() {
            column.swap_remove_dyn(row);
        }
        self.entities.swap_remove(row);
        self.entities.get(row).copied()
    }

    /// Moves `row` into `destination`.
    ///
    /// ## Behavior
    /// - Shared columns are moved.
    /// - Source-only columns drop the value.
    /// - Destination-only columns receive a default value.
    ///
    /// Returns the destination row and the entity that moved into `row` in
    /// this table, if any.

    pub fn move_row_to(&mut self, row: RowID, destination: &mut Table) -> (RowID, Option<Entity>) {
        let row_index = row as usize;
        let destination_row = destination.entities.len() as RowID;

        let mut d = 0;
        for (attribute, column) in self.columns.iter_mut() {
            while d < destination.columns.len() && destination.columns[d].0 < *attribute {
                destination.columns[d].1.push_default_dyn(1);
                d += 1;
            }
            if d < destination.columns.len() && destination.columns[d].0 == *attribute {
                column.move_row_dyn(row_index, destination.columns[d].1.as_mut());
                d += 1;
            } else {
                column.swap_remove_dyn(row_index);
            }
        }
        for (_, column) in destination.columns[d..].iter_mut() {
            column.push_default_dyn(1);
        }

        let entity = self.entities.swap_remove(row_index);
        destination.entities.push(entity);
        (destination_row, self.entities.get(row_index).copied())
    }

    /// Moves every row of `source` to the end of this table.
    ///
    /// ## Behavior
    /// - Shared columns are bulk-appended.
    /// - Destination-only columns are default-filled.
    /// - Source-only columns are cleared.
    /// - `source` is left empty.
    ///
    /// Returns the first destination row.

    pub fn append_from(&mut self, source: &mut Table) -> RowID {
        let start = self.entities.len() as RowID;
        let moved = source.entities.len();

        let mut s = 0;
        for (attribute, column) in self.columns.iter_mut() {
            while s < source.columns.len() && source.columns[s].0 < *attribute {
                source.columns[s].1.clear_dyn();
                s += 1;
            }
            if s < source.columns.len() && source.columns[s].0 == *attribute {
                column.append_dyn(source.columns[s].1.as_mut());
                s += 1;
            } else {
                column.push_default_dyn(moved);
            }
        }
        for (_, column) in source.columns[s..].iter_mut() {
            column.clear_dyn();
        }

        self.entities.append(&mut source.entities);
        start
    }

    /// Drops every column value, keeping the entity array.
    pub fn clear_columns(&mut self) {
        for (_, column) in self.columns.iter_mut() {
            column.clear_dyn();
        }
    }

    /// Removes every row and returns the entities that were stored.
    pub fn clear(&mut self) -> Vec<Entity> {
        self.clear_columns();
        std::mem::take(&mut self.entities)
    }
}
