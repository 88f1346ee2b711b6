//! Bulk structural operations.
//!
//! These operations change the attribute set of (or delete) every entity in
//! every matching table at once. They work at table granularity: a table is
//! either skipped or merged as a whole into its destination table, so the
//! cost is one column concatenation per table instead of one row move per
//! entity.
//!
//! ## Procedure
//! 1. Refuse unless the world is in its primary phase.
//! 2. Scan a snapshot of the table registry in parallel (rayon), keeping
//!    non-empty tables that do not already satisfy the post-condition and
//!    that pass the optional filter.
//! 3. Sequentially, for each kept table, traverse the remove edges then the
//!    add edges and merge the table into the destination.
//!
//! Tables created by step 3 are not revisited. Every affected table is fully
//! migrated; a table is never left half-moved.

use log::debug;
use rayon::prelude::*;

use crate::engine::error::ECSResult;
use crate::engine::filter::Filter;
use crate::engine::table::Table;
use crate::engine::types::{AttributeID, TableID, Type};
use crate::engine::world::World;


impl World {

    fn candidate_tables<P>(&self, filter: Option<&Filter>, keep: P) -> Vec<TableID>
    where
        P: Fn(&Table) -> bool + Sync,
    {
        let tables: Vec<&Table> = self.tables.iter().collect();
        let matcher = self.matcher.as_ref();
        tables
            .par_iter()
            .filter(|table| !table.is_empty() && keep(table))
            .filter(|table| filter.map_or(true, |f| matcher.table_matches(table, f)))
            .map(|table| table.id())
            .collect()
    }

    /// Adds `to_add` and removes `to_remove` on every matching table.
    ///
    /// ## Behavior
    /// - A table is skipped when it already contains all of a non-empty
    ///   `to_add`, or when it contains none of a non-empty `to_remove`.
    ///   Repeating the call is a no-op.
    /// - A table failing `filter` is skipped.
    /// - Surviving tables are merged into `table - to_remove + to_add`.
    ///
    /// Returns the number of tables migrated.
    ///
    /// ## Errors
    /// - [`crate::engine::error::UnsupportedOperationError`] while staged.
    /// - [`crate::engine::error::UnknownAttributeError`] if an id to add is
    ///   not registered. Checked before any table is touched.

    pub fn bulk_add_remove(
        &mut self,
        to_add: &[AttributeID],
        to_remove: &[AttributeID],
        filter: Option<&Filter>,
    ) -> ECSResult<usize> {
        self.ensure_primary("bulk_add_remove")?;

        let to_add = Type::from_ids(to_add);
        let to_remove = Type::from_ids(to_remove);
        if to_add.is_empty() && to_remove.is_empty() {
            return Ok(0);
        }
        self.attributes.validate(&to_add)?;

        let candidates = self.candidate_tables(filter, |table| {
            let already_added = !to_add.is_empty() && table.ty().contains_all(&to_add);
            let nothing_to_remove = !to_remove.is_empty() && !table.ty().contains_any(&to_remove);
            !(already_added || nothing_to_remove)
        });

        let mut migrated = 0;
        for source in candidates {
            let destination = self.tables.traverse(
                source,
                to_add.ids(),
                to_remove.ids(),
                &self.attributes,
            )?;
            if destination == source {
                continue;
            }
            let moved = self.tables.merge(destination, source, &mut self.entities)?;
            debug!("bulk migrated {moved} entities from table {source} to {destination}");
            migrated += 1;
        }
        Ok(migrated)
    }

    /// Adds every attribute of `to_add` to matching tables.
    pub fn bulk_add(&mut self, to_add: &[AttributeID], filter: Option<&Filter>) -> ECSResult<usize> {
        self.bulk_add_remove(to_add, &[], filter)
    }

    /// Removes every attribute of `to_remove` from matching tables.
    pub fn bulk_remove(&mut self, to_remove: &[AttributeID], filter: Option<&Filter>) -> ECSResult<usize> {
        self.bulk_add_remove(&[], to_remove, filter)
    }

    /// Single-id form of [`World::bulk_add`].
    pub fn bulk_add_id(&mut self, id: AttributeID, filter: Option<&Filter>) -> ECSResult<usize> {
        self.bulk_add_remove(&[id], &[], filter)
    }

    /// Single-id form of [`World::bulk_remove`].
    pub fn bulk_remove_id(&mut self, id: AttributeID, filter: Option<&Filter>) -> ECSResult<usize> {
        self.bulk_add_remove(&[], &[id], filter)
    }

    fn delete_tables(&mut self, operation: &'static str, filter: Option<&Filter>, notify: bool) -> ECSResult<usize> {
        self.ensure_primary(operation)?;

        let candidates = self.candidate_tables(filter, |table| !table.has_builtins());
        let mut cleared = 0;
        for id in candidates {
            if notify {
                if let Some(table) = self.tables.get(id) {
                    self.fire_remove_hooks(table.ty(), table.entities());
                }
            }
            let entities = self.tables.clear_table(id)?;
            for entity in &entities {
                self.entities.remove(*entity);
            }
            debug!("{operation} removed {} entities from table {id}", entities.len());
            cleared += 1;
        }
        Ok(cleared)
    }

    /// Deletes every entity of every matching non-builtin table, firing
    /// removal hooks.
    ///
    /// Returns the number of tables cleared.

    pub fn bulk_delete(&mut self, filter: Option<&Filter>) -> ECSResult<usize> {
        self.delete_tables("bulk_delete", filter, true)
    }

    /// Like [`World::bulk_delete`] without firing removal hooks.
    pub fn bulk_clear(&mut self, filter: Option<&Filter>) -> ECSResult<usize> {
        self.delete_tables("bulk_clear", filter, false)
    }
}
