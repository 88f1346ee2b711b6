//! Chunked column storage and type-erased column access.
//!
//! [`Column<T>`] stores one attribute's values for every row of a table, in
//! fixed-capacity chunks of [`COLUMN_CHUNK_CAP`] rows. [`TypeErasedColumn`]
//! lets a table hold heterogeneous columns behind `Box<dyn TypeErasedColumn>`.
//!
//! # Storage model
//!
//! ```text
//! Vec<Vec<T>>   each inner Vec allocated with COLUMN_CHUNK_CAP capacity
//! ```
//!
//! Values are packed densely from chunk 0 upward. Every chunk except the last
//! is full; only the last may be partially filled. Chunks are allocated with
//! their full capacity up front and never grow past it, so a chunk's buffer is
//! never reallocated.
//!
//! # Core operations
//!
//! - **Append**: `push` writes into the last chunk, allocating a new chunk when
//!   it is full.
//! - **Remove**: `swap_remove` moves the last value into the removed row.
//! - **Transfer**: `push_from` moves one row from another column.
//! - **Bulk append**: `append` moves every row of another column. When this
//!   column ends on a chunk boundary whole chunks are moved without touching
//!   their contents.
//!
//! Row order is not preserved by removal.

use std::any::{type_name, Any, TypeId};

use crate::engine::error::TypeMismatchError;
use crate::engine::types::COLUMN_CHUNK_CAP;


/// Dense, chunked storage for a single element type.
///
/// ## Invariants
/// - `len = (chunks.len() - 1) * COLUMN_CHUNK_CAP + chunks.last().len()`,
///   or zero when there is no chunk.
/// - All chunks but the last hold exactly `COLUMN_CHUNK_CAP` values.
/// - No chunk is ever empty.

#[derive(Clone, Debug)]
pub struct Column<T> {
    chunks: Vec<Vec<T>>,
    len: usize,
}

impl<T> Default for Column<T> {
    fn default() -> Self {
        Self { chunks: Vec::new(), len: 0 }
    }
}

impl<T> Column<T> {
    /// Creates an empty column.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the column holds no row.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of allocated chunks.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    fn last_chunk_with_room(&mut self) -> &mut Vec<T> {
        let full = self.chunks.last().map_or(true, |c| c.len() == COLUMN_CHUNK_CAP);
        if full {
            self.chunks.push(Vec::with_capacity(COLUMN_CHUNK_CAP));
        }
        let last = self.chunks.len() - 1;
        &mut self.chunks[last]
    }

    /// Appends `value` and returns its row.
    pub fn push(&mut self, value: T) -> usize {
        self.last_chunk_with_room().push(value);
        self.len += 1;
        self.len - 1
    }

    /// Returns the value at `row`.
    #[inline]
    pub fn get(&self, row: usize) -> Option<&T> {
        if row >= self.len {
            return None;
        }
        Some(&self.chunks[row / COLUMN_CHUNK_CAP][row % COLUMN_CHUNK_CAP])
    }

    /// Returns the value at `row` mutably.
    #[inline]
    pub fn get_mut(&mut self, row: usize) -> Option<&mut T> {
        if row >= self.len {
            return None;
        }
        Some(&mut self.chunks[row / COLUMN_CHUNK_CAP][row % COLUMN_CHUNK_CAP])
    }

    fn pop(&mut self) -> Option<T> {
        let last = self.chunks.last_mut()?;
        let value = last.pop()?;
        if last.is_empty() {
            self.chunks.pop();
        }
        self.len -= 1;
        Some(value)
    }

    /// Removes the value at `row`, moving the last value into its place.
    ///
    /// Returns `None` if `row` is out of range.

    pub fn swap_remove(&mut self, row: usize) -> Option<T> {
        if row >= self.len {
            return None;
        }
        let last = self.pop()?;
        if row == self.len {
            return Some(last);
        }
        let slot = &mut self.chunks[row / COLUMN_CHUNK_CAP][row % COLUMN_CHUNK_CAP];
        Some(std::mem::replace(slot, last))
    }

    /// Moves row `row` of `source` to the end of this column.
    ///
    /// The source performs a swap-remove. Returns the destination row.

    pub fn push_from(&mut self, source: &mut Column<T>, row: usize) -> Option<usize> {
        let value = source.swap_remove(row)?;
        Some(self.push(value))
    }

    /// Moves every row of `other` to the end of this column.
    ///
    /// `other` is left empty. Returns the first destination row.

    pub fn append(&mut self, other: &mut Column<T>) -> usize {
        let start = self.len;
        if other.len == 0 {
            return start;
        }

        if self.len % COLUMN_CHUNK_CAP == 0 {
            self.chunks.append(&mut other.chunks);
        } else {
            for chunk in other.chunks.drain(..) {
                for value in chunk {
                    self.last_chunk_with_room().push(value);
                }
            }
        }

        self.len += other.len;
        other.len = 0;
        start
    }

    /// Removes every row.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.len = 0;
    }

    /// Iterates rows in order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.chunks.iter().flat_map(|chunk| chunk.iter())
    }

    /// Iterates rows mutably in order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.chunks.iter_mut().flat_map(|chunk| chunk.iter_mut())
    }
}

impl<T: Default> Column<T> {
    /// Appends `count` default values.
    pub fn push_default(&mut self, count: usize) {
        for _ in 0..count {
            self.push(T::default());
        }
    }
}

/// Object-safe interface over a [`Column<T>`] of unknown element type.
///
/// ## Behavior
/// - Row-level operations mirror the typed API.
/// - Operations between two columns (`move_row_dyn`, `append_dyn`) require
///   both to have the same element type. A mismatch is a table layout bug
///   and panics.
/// - Writing a boxed value with the wrong type returns
///   [`TypeMismatchError`].

pub trait TypeErasedColumn: Any + Send + Sync {
    /// Upcast for downcasting to the concrete column.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete column.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// `TypeId` of the stored element type.
    fn element_type_id(&self) -> TypeId;

    /// Human-readable element type name.
    fn element_type_name(&self) -> &'static str;

    /// Number of rows.
    fn len(&self) -> usize;

    /// Returns `true` if the column holds no row.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends `count` default values.
    fn push_default_dyn(&mut self, count: usize);

    /// Appends a boxed value.
    fn push_dyn(&mut self, value: Box<dyn Any + Send>) -> Result<usize, TypeMismatchError>;

    /// Overwrites the value at `row` with a boxed value.
    ///
    /// Returns `Ok(false)` if `row` is out of range.

    fn set_dyn(&mut self, row: usize, value: Box<dyn Any + Send>) -> Result<bool, TypeMismatchError>;

    /// Swap-removes `row`, dropping the value.
    fn swap_remove_dyn(&mut self, row: usize) -> bool;

    /// Moves `row` of this column to the end of `destination`.
    fn move_row_dyn(&mut self, row: usize, destination: &mut dyn TypeErasedColumn) -> Option<usize>;

    /// Moves every row of `source` to the end of this column.
    fn append_dyn(&mut self, source: &mut dyn TypeErasedColumn) -> usize;

    /// Removes every row.
    fn clear_dyn(&mut self);
}

fn downcast_column<'a, T: 'static>(
    column: &'a mut dyn TypeErasedColumn,
    expected: &'static str,
) -> &'a mut Column<T> {
    let actual = column.element_type_name();
    match column.as_any_mut().downcast_mut::<Column<T>>() {
        Some(column) => column,
        None => panic!("column type mismatch: expected {expected}, found {actual}"),
    }
}

impl<T> TypeErasedColumn for Column<T>
where
    T: Default + Clone + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn element_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn element_type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn len(&self) -> usize {
        self.len
    }

    fn push_default_dyn(&mut self, count: usize) {
        self.push_default(count);
    }

    fn push_dyn(&mut self, value: Box<dyn Any + Send>) -> Result<usize, TypeMismatchError> {
        let actual = (*value).type_id();
        match value.downcast::<T>() {
            Ok(value) => Ok(self.push(*value)),
            Err(_) => Err(TypeMismatchError { expected: TypeId::of::<T>(), actual }),
        }
    }

    fn set_dyn(&mut self, row: usize, value: Box<dyn Any + Send>) -> Result<bool, TypeMismatchError> {
        let actual = (*value).type_id();
        let value = value
            .downcast::<T>()
            .map_err(|_| TypeMismatchError { expected: TypeId::of::<T>(), actual })?;
        match self.get_mut(row) {
            Some(slot) => {
                *slot = *value;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn swap_remove_dyn(&mut self, row: usize) -> bool {
        self.swap_remove(row).is_some()
    }

    fn move_row_dyn(&mut self, row: usize, destination: &mut dyn TypeErasedColumn) -> Option<usize> {
        let destination = downcast_column::<T>(destination, type_name::<T>());
        destination.push_from(self, row)
    }

    fn append_dyn(&mut self, source: &mut dyn TypeErasedColumn) -> usize {
        let source = downcast_column::<T>(source, type_name::<T>());
        self.append(source)
    }

    fn clear_dyn(&mut self) {
        self.clear();
    }
}
