//! # Table Registry & Transition Graph
//!
//! Owns every [`Table`], maps each canonical [`Type`] to exactly one table,
//! and memoizes structural transitions as per-attribute edges.
//!
//! ## Purpose
//! Moving entities between attribute sets needs the destination table for
//! "this table plus/minus these attributes". Computing that type is
//! `O(type size)` set arithmetic followed by a hash lookup. The graph does it
//! once per distinct `(table, attribute)` transition and caches the answer
//! on the source table, with a backlink on the destination.
//!
//! ## Design
//! - Tables live in a [`SparseSet`] keyed by [`TableID`], so ids stay stable
//!   and table records never move in memory while the registry grows.
//! - `type_index` is the canonical `Type -> TableID` map.
//! - The empty type resolves to the root table, created with the registry.
//! - `generation` increases whenever a table is created or invalidated. The
//!   pipeline uses it to detect that system matching must be redone.
//!
//! ## Invariants
//! - Every live table's type appears exactly once in `type_index`.
//! - For a table `t` and attribute `a` already in `t`'s type, the add edge
//!   of `a` points at `t` itself.
//! - Tables are only destroyed through [`TableRegistry::invalidate`].

use std::collections::HashMap;

use log::{debug, trace};

use crate::engine::attribute::AttributeRegistry;
use crate::engine::entity::{Entity, EntityIndex};
use crate::engine::error::{ECSError, ECSResult};
use crate::engine::sparse::SparseSet;
use crate::engine::table::{Edge, Table};
use crate::engine::types::{AttributeID, RowID, TableID, Type};


/// Arena of tables plus the canonical type index and transition edges.

pub struct TableRegistry {
    tables: SparseSet<Table>,
    type_index: HashMap<Type, TableID>,
    root: TableID,
    generation: u64,
}

impl TableRegistry {

    /// Creates a registry holding only the root (empty-type) table.
    pub fn new(attributes: &AttributeRegistry) -> Self {
        Self::with_capacity(0, attributes)
    }

    /// Creates a registry with room for `tables` tables.
    pub fn with_capacity(tables: usize, attributes: &AttributeRegistry) -> Self {
        let mut registry = Self {
            tables: SparseSet::with_capacity(tables),
            type_index: HashMap::with_capacity(tables),
            root: 0,
            generation: 0,
        };
        // The empty type has no attribute to validate.
        let (id, slot) = registry.tables.add();
        if let Ok(table) = Table::new(id, Type::new(), attributes) {
            *slot = table;
        }
        registry.type_index.insert(Type::new(), id);
        registry.root = id;
        registry
    }

    /// Id of the root (empty-type) table.
    #[inline]
    pub fn root(&self) -> TableID {
        self.root
    }

    /// Monotonic counter of table creations and invalidations.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of live tables, root included.
    #[inline]
    pub fn count(&self) -> usize {
        self.tables.count()
    }

    /// Returns table `id`.
    #[inline]
    pub fn get(&self, id: TableID) -> Option<&Table> {
        self.tables.get_sparse(id)
    }

    /// Returns table `id` mutably.
    #[inline]
    pub fn get_mut(&mut self, id: TableID) -> Option<&mut Table> {
        self.tables.get_sparse_mut(id)
    }

    /// Returns two distinct tables mutably.
    pub fn get_pair_mut(&mut self, a: TableID, b: TableID) -> Option<(&mut Table, &mut Table)> {
        self.tables.get_pair_mut(a, b)
    }

    /// Looks up the table of `ty` without creating it.
    pub fn find(&self, ty: &Type) -> Option<TableID> {
        self.type_index.get(ty).copied()
    }

    /// Iterates live tables.
    pub fn iter(&self) -> impl Iterator<Item = &Table> + '_ {
        self.tables.iter().map(|(_, table)| table)
    }

    /// Live table ids.
    pub fn ids(&self) -> Vec<TableID> {
        self.tables.indices().to_vec()
    }

    /// Returns the canonical table of `ty`, creating it on first use.
    ///
    /// ## Errors
    /// Propagates [`Table::new`] failures (unregistered attribute). The
    /// registry is left unchanged in that case.

    pub fn find_or_create(&mut self, ty: &Type, attributes: &AttributeRegistry) -> ECSResult<TableID> {
        if let Some(&id) = self.type_index.get(ty) {
            return Ok(id);
        }
        attributes.validate(ty)?;

        let (id, slot) = self.tables.add();
        match Table::new(id, ty.clone(), attributes) {
            Ok(table) => *slot = table,
            Err(e) => {
                self.tables.remove(id);
                return Err(e);
            }
        }
        self.type_index.insert(ty.clone(), id);
        self.generation += 1;

        debug!("created table {id} for type {ty} (generation {})", self.generation);
        Ok(id)
    }

    fn table(&self, id: TableID) -> ECSResult<&Table> {
        self.get(id)
            .ok_or_else(|| ECSError::Internal(format!("table {id} does not exist")))
    }

    fn table_mut(&mut self, id: TableID) -> ECSResult<&mut Table> {
        self.get_mut(id)
            .ok_or_else(|| ECSError::Internal(format!("table {id} does not exist")))
    }

    fn link(&mut self, from: TableID, attribute: AttributeID, to: TableID, add: bool) -> ECSResult<()> {
        let edge = self.table_mut(from)?.edges.entry(attribute).or_default();
        if add {
            edge.add = Some(to);
        } else {
            edge.remove = Some(to);
        }

        if from != to {
            let target = self.table_mut(to)?;
            let back = target.edges.entry(attribute).or_default();
            if add {
                back.remove.get_or_insert(from);
            } else {
                back.add.get_or_insert(from);
            }
            target.incoming.push((from, attribute));
        }
        Ok(())
    }

    fn add_edge(&mut self, from: TableID, attribute: AttributeID, attributes: &AttributeRegistry) -> ECSResult<TableID> {
        let table = self.table(from)?;
        if let Some(to) = table.edge(attribute).and_then(|e| e.add) {
            return Ok(to);
        }
        if table.ty().contains(attribute) {
            self.link(from, attribute, from, true)?;
            return Ok(from);
        }

        let ty = table.ty().with(attribute);
        let to = self.find_or_create(&ty, attributes)?;
        self.link(from, attribute, to, true)?;
        trace!("edge {from} +{attribute} -> {to}");
        Ok(to)
    }

    fn remove_edge(&mut self, from: TableID, attribute: AttributeID, attributes: &AttributeRegistry) -> ECSResult<TableID> {
        let table = self.table(from)?;
        if !table.ty().contains(attribute) {
            return Ok(from);
        }
        if let Some(to) = table.edge(attribute).and_then(|e| e.remove) {
            return Ok(to);
        }

        let ty = table.ty().without(attribute);
        let to = self.find_or_create(&ty, attributes)?;
        self.link(from, attribute, to, false)?;
        trace!("edge {from} -{attribute} -> {to}");
        Ok(to)
    }

    /// Table reached from `from` by adding every attribute of `to_add`.
    ///
    /// Each step follows (or creates) the memoized edge of one attribute, so
    /// the same transition always yields the same table.

    pub fn traverse_add(&mut self, from: TableID, to_add: &[AttributeID], attributes: &AttributeRegistry) -> ECSResult<TableID> {
        let mut current = from;
        for &attribute in to_add {
            current = self.add_edge(current, attribute, attributes)?;
        }
        Ok(current)
    }

    /// Table reached from `from` by removing every attribute of `to_remove`.
    ///
    /// Attributes the table does not have are skipped.

    pub fn traverse_remove(&mut self, from: TableID, to_remove: &[AttributeID], attributes: &AttributeRegistry) -> ECSResult<TableID> {
        let mut current = from;
        for &attribute in to_remove {
            current = self.remove_edge(current, attribute, attributes)?;
        }
        Ok(current)
    }

    /// Remove transition followed by add transition.
    pub fn traverse(
        &mut self,
        from: TableID,
        to_add: &[AttributeID],
        to_remove: &[AttributeID],
        attributes: &AttributeRegistry,
    ) -> ECSResult<TableID> {
        let shrunk = self.traverse_remove(from, to_remove, attributes)?;
        self.traverse_add(shrunk, to_add, attributes)
    }

    /// Moves every row of `source` into `destination`.
    ///
    /// ## Behavior
    /// - Empty destination type: column data of `source` is dropped and the
    ///   entities move into the destination (the root table).
    /// - Otherwise columns are bulk-appended, destination-only columns are
    ///   default-filled and source-only columns dropped.
    /// - Records of moved entities are repointed at their new rows.
    /// - `source` is left with zero rows.
    ///
    /// Returns the number of entities moved.

    pub fn merge(&mut self, destination: TableID, source: TableID, entities: &mut EntityIndex) -> ECSResult<usize> {
        if destination == source {
            return Ok(0);
        }
        let (dst, src) = self
            .tables
            .get_pair_mut(destination, source)
            .ok_or_else(|| ECSError::Internal(format!("cannot merge table {source} into {destination}")))?;

        if dst.ty().is_empty() {
            src.clear_columns();
        }
        let moved = src.count();
        let start = dst.append_from(src);

        for (offset, &entity) in dst.entities()[start as usize..].iter().enumerate() {
            entities.set_location(entity, destination, start + offset as RowID);
        }

        trace!("merged {moved} rows of table {source} into {destination}");
        Ok(moved)
    }

    /// Removes every row of `id` and returns the stored entities.
    ///
    /// Records are left to the caller.

    pub fn clear_table(&mut self, id: TableID) -> ECSResult<Vec<Entity>> {
        Ok(self.table_mut(id)?.clear())
    }

    /// Destroys an empty, non-root table.
    ///
    /// ## Behavior
    /// Removes the canonical mapping and every edge pointing at the table.
    /// Returns `false` if the table is the root, still holds rows, or does
    /// not exist.

    pub fn invalidate(&mut self, id: TableID) -> bool {
        if id == self.root {
            return false;
        }
        let (ty, incoming, outgoing) = match self.get(id) {
            Some(table) if table.is_empty() => (
                table.ty().clone(),
                table.incoming().to_vec(),
                table
                    .edges
                    .iter()
                    .flat_map(|(a, e)| [e.add, e.remove].into_iter().flatten().map(move |t| (t, *a)))
                    .collect::<Vec<_>>(),
            ),
            _ => return false,
        };

        for (from, attribute) in incoming.into_iter().chain(outgoing) {
            if let Some(table) = self.get_mut(from) {
                if let Some(edge) = table.edges.get_mut(&attribute) {
                    clear_edge(edge, id);
                }
                table.incoming.retain(|(t, _)| *t != id);
            }
        }

        self.type_index.remove(&ty);
        self.tables.remove(id);
        self.generation += 1;
        debug!("invalidated table {id} for type {ty}");
        true
    }
}

fn clear_edge(edge: &mut Edge, target: TableID) {
    if edge.add == Some(target) {
        edge.add = None;
    }
    if edge.remove == Some(target) {
        edge.remove = None;
    }
}
