//! Core identifiers, storage constants and the canonical attribute-set type.
//!
//! This module defines the small, copyable values shared by every subsystem:
//! attribute and table identifiers, the chunk sizing constants used by the
//! allocators, and [`Type`], the ordered attribute set that identifies a table.
//!
//! ## Design Philosophy
//!
//! - **Stable numeric identifiers** for attributes, tables and systems.
//! - **Canonical sets**: a [`Type`] is always sorted and deduplicated, so two
//!   types describing the same attribute set compare equal and hash equally.
//! - **Page-sized chunks**: allocator chunk sizes are derived from a fixed byte
//!   budget rather than a fixed element count.
//!
//! ## Type Arithmetic
//!
//! Transition edges between tables are computed with [`Type::union`] and
//! [`Type::difference`]. Both run in `O(n + m)` over the sorted id sequences and
//! are only evaluated once per distinct transition; the table graph memoizes the
//! result.

use std::fmt;


/// Identifier of a registered attribute (a data column or a tag).
pub type AttributeID = u32;
/// Identifier of a table inside the table registry.
pub type TableID = u32;
/// Identifier of a system within a pipeline.
pub type SystemID = u32;
/// Row index within a table.
pub type RowID = u32;

/// Byte budget of a single sparse allocator chunk.
///
/// The number of elements per chunk is `SPARSE_CHUNK_BYTES / size_of::<T>()`,
/// clamped to at least one.
pub const SPARSE_CHUNK_BYTES: usize = 65_536;

/// Number of rows stored in each chunk of a table column.
pub const COLUMN_CHUNK_CAP: usize = 4_096;

const _: [(); 1] = [(); (COLUMN_CHUNK_CAP > 0) as usize];
const _: [(); 1] = [(); (SPARSE_CHUNK_BYTES > 0) as usize];

/// Ordered, deduplicated set of attribute ids.
///
/// ## Invariants
/// - ids are strictly increasing,
/// - equality and hashing are defined over the id sequence.
///
/// Tables are canonicalized by their `Type`: the table registry maps each
/// distinct `Type` to exactly one table.

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Type {
    ids: Vec<AttributeID>,
}

impl Type {
    /// Creates the empty type.
    pub fn new() -> Self {
        Self { ids: Vec::new() }
    }

    /// Builds a canonical type from an arbitrary id list.
    ///
    /// The ids are sorted and duplicates removed.

    pub fn from_ids(ids: &[AttributeID]) -> Self {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        Self { ids }
    }

    /// Returns the sorted id sequence.
    #[inline]
    pub fn ids(&self) -> &[AttributeID] {
        &self.ids
    }

    /// Number of attributes in this type.
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if the type holds no attribute.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns `true` if `id` is part of this type.
    #[inline]
    pub fn contains(&self, id: AttributeID) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    /// Returns `true` if every id of `other` is part of this type.
    ///
    /// An empty `other` is always contained.

    pub fn contains_all(&self, other: &Type) -> bool {
        let mut mine = self.ids.iter();
        'outer: for id in &other.ids {
            while let Some(candidate) = mine.next() {
                if candidate == id {
                    continue 'outer;
                }
                if candidate > id {
                    return false;
                }
            }
            return false;
        }
        true
    }

    /// Returns `true` if at least one id of `other` is part of this type.
    pub fn contains_any(&self, other: &Type) -> bool {
        let (mut i, mut j) = (0, 0);
        while i < self.ids.len() && j < other.ids.len() {
            match self.ids[i].cmp(&other.ids[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => return true,
            }
        }
        false
    }

    /// Returns the sorted union of `self` and `other`.
    pub fn union(&self, other: &Type) -> Type {
        let mut ids = Vec::with_capacity(self.ids.len() + other.ids.len());
        let (mut i, mut j) = (0, 0);
        while i < self.ids.len() && j < other.ids.len() {
            match self.ids[i].cmp(&other.ids[j]) {
                std::cmp::Ordering::Less => { ids.push(self.ids[i]); i += 1; }
                std::cmp::Ordering::Greater => { ids.push(other.ids[j]); j += 1; }
                std::cmp::Ordering::Equal => { ids.push(self.ids[i]); i += 1; j += 1; }
            }
        }
        ids.extend_from_slice(&self.ids[i..]);
        ids.extend_from_slice(&other.ids[j..]);
        Type { ids }
    }

    /// Returns the ids of `self` that are not part of `other`.
    pub fn difference(&self, other: &Type) -> Type {
        let ids = self
            .ids
            .iter()
            .copied()
            .filter(|id| !other.contains(*id))
            .collect();
        Type { ids }
    }

    /// Returns a copy of this type with `id` inserted.
    pub fn with(&self, id: AttributeID) -> Type {
        match self.ids.binary_search(&id) {
            Ok(_) => self.clone(),
            Err(pos) => {
                let mut ids = self.ids.clone();
                ids.insert(pos, id);
                Type { ids }
            }
        }
    }

    /// Returns a copy of this type with `id` removed.
    pub fn without(&self, id: AttributeID) -> Type {
        match self.ids.binary_search(&id) {
            Ok(pos) => {
                let mut ids = self.ids.clone();
                ids.remove(pos);
                Type { ids }
            }
            Err(_) => self.clone(),
        }
    }
}

impl From<&[AttributeID]> for Type {
    fn from(ids: &[AttributeID]) -> Self {
        Type::from_ids(ids)
    }
}

impl<const N: usize> From<[AttributeID; N]> for Type {
    fn from(ids: [AttributeID; N]) -> Self {
        Type::from_ids(&ids)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, id) in self.ids.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{id}")?;
        }
        f.write_str("]")
    }
}
