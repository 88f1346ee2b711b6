//! Chunked sparse set with stable element addresses.
//!
//! [`SparseSet<T>`] hands out slots keyed by a raw `u32` index, either generated
//! internally ([`SparseSet::add`]) or supplied by the caller
//! ([`SparseSet::get_or_create_sparse`]). It is the allocator underneath the
//! table registry, the entity index and the attribute registry.
//!
//! ## Storage model
//!
//! ```text
//! chunks : Vec<Box<[T]>>    fixed-size payload blocks, never reallocated
//! sparse : Vec<SparseSlot>  raw index -> position in `dense`
//! dense  : Vec<u32>         live raw indices, unordered
//! free   : Vec<u32>         recycled raw indices, reused before growing
//! ```
//!
//! The payload of raw index `i` lives at `chunks[i / cap][i % cap]`, where
//! `cap = SPARSE_CHUNK_BYTES / size_of::<T>()`. The location is derived on
//! demand rather than cached in the slot, so a deep copy never needs its
//! addresses fixed up.
//!
//! ## Invariants
//! - `dense[sparse[i].dense] == i` for every live `i`.
//! - A chunk, once allocated, is never moved or resized. References returned
//!   for a live element stay valid (at the same address) across any number of
//!   further `add` calls.
//! - Removing an element leaves its payload untouched. Callers that need
//!   destruction semantics run them on the payload `remove` hands back.
//!
//! ## Safety
//! The structure has no internal locking. Concurrency is handled by the
//! owner's phase discipline.

use std::mem::size_of;

use crate::engine::error::{DenseIndexOutOfRangeError, ECSResult};
use crate::engine::types::SPARSE_CHUNK_BYTES;


#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct SparseSlot {
    dense: u32,
}

/// Allocated versus in-use bytes of a [`SparseSet`].

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Bytes reserved by chunks and index arrays.
    pub allocated: usize,
    /// Bytes backing live elements and their index entries.
    pub used: usize,
}

/// Dense/sparse index over chunk-backed payload slots.
///
/// ## Behavior
/// - `add`, `remove`, `get`, `get_sparse` are `O(1)`.
/// - Growth appends a chunk, never reallocates one.
/// - Removed indices are recycled LIFO.
///
/// ## Type Parameters
/// - `T`: payload type. `Default` provides the initial value of fresh chunk
///   slots; recycled slots keep whatever the previous occupant left behind.

#[derive(Clone, Debug)]
pub struct SparseSet<T> {
    chunks: Vec<Box<[T]>>,
    chunk_capacity: usize,
    sparse: Vec<SparseSlot>,
    dense: Vec<u32>,
    free: Vec<u32>,
}

impl<T: Default> Default for SparseSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default> SparseSet<T> {
    /// Creates an empty set without allocating any chunk.
    pub fn new() -> Self {
        Self::with_chunks(0)
    }

    /// Creates an empty set with `initial_chunk_count` chunks pre-allocated.
    ///
    /// No element is live afterwards; pre-allocation only avoids chunk
    /// allocation on the first adds.

    pub fn with_chunks(initial_chunk_count: usize) -> Self {
        let chunk_capacity = (SPARSE_CHUNK_BYTES / size_of::<T>().max(1)).max(1);
        let mut set = Self {
            chunks: Vec::with_capacity(initial_chunk_count),
            chunk_capacity,
            sparse: Vec::new(),
            dense: Vec::new(),
            free: Vec::new(),
        };
        for _ in 0..initial_chunk_count {
            set.push_chunk();
        }
        set
    }

    /// Creates an empty set with enough chunks for `elements` payloads.
    pub fn with_capacity(elements: usize) -> Self {
        let mut set = Self::new();
        set.grow(elements);
        set
    }

    fn push_chunk(&mut self) {
        let chunk: Box<[T]> = (0..self.chunk_capacity).map(|_| T::default()).collect();
        self.chunks.push(chunk);
    }

    #[inline]
    fn locate(&self, index: u32) -> (usize, usize) {
        let index = index as usize;
        (index / self.chunk_capacity, index % self.chunk_capacity)
    }

    fn ensure_chunk_for(&mut self, index: u32) {
        while self.chunks.len() * self.chunk_capacity <= index as usize {
            self.push_chunk();
        }
    }

    /// Allocates a live slot and returns its raw index and payload.
    ///
    /// ## Behavior
    /// - Pops the free stack if it is non-empty. The recycled payload is
    ///   returned as the previous occupant left it.
    /// - Otherwise takes the next never-used index, allocating a chunk when
    ///   the current ones are exhausted.

    pub fn add(&mut self) -> (u32, &mut T) {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = self.sparse.len() as u32;
                self.sparse.push(SparseSlot::default());
                self.ensure_chunk_for(index);
                index
            }
        };

        self.sparse[index as usize].dense = self.dense.len() as u32;
        self.dense.push(index);

        let (chunk, offset) = self.locate(index);
        (index, &mut self.chunks[chunk][offset])
    }

    /// Marks `index` dead and pushes it on the free stack.
    ///
    /// ## Behavior
    /// - Swap-with-last removal in the dense array; the element that moved
    ///   gets its slot updated.
    /// - The payload is left untouched and returned, so the caller can run
    ///   whatever teardown it needs.
    /// - Returns `None` (and does nothing) if `index` is not live.

    pub fn remove(&mut self, index: u32) -> Option<&mut T> {
        if !self.is_live(index) {
            return None;
        }

        let position = self.sparse[index as usize].dense as usize;
        self.dense.swap_remove(position);
        if let Some(&moved) = self.dense.get(position) {
            self.sparse[moved as usize].dense = position as u32;
        }
        self.free.push(index);

        let (chunk, offset) = self.locate(index);
        Some(&mut self.chunks[chunk][offset])
    }

    /// Returns `true` if `index` is currently live.
    #[inline]
    pub fn is_live(&self, index: u32) -> bool {
        match self.sparse.get(index as usize) {
            Some(slot) => self.dense.get(slot.dense as usize) == Some(&index),
            None => false,
        }
    }

    /// Returns the payload at dense position `position`.
    ///
    /// ## Errors
    /// [`DenseIndexOutOfRangeError`] if `position >= count()`.

    pub fn get(&self, position: usize) -> ECSResult<&T> {
        let index = *self.dense.get(position).ok_or(DenseIndexOutOfRangeError {
            position,
            count: self.dense.len(),
        })?;
        let (chunk, offset) = self.locate(index);
        Ok(&self.chunks[chunk][offset])
    }

    /// Mutable variant of [`SparseSet::get`].
    pub fn get_mut(&mut self, position: usize) -> ECSResult<&mut T> {
        let index = *self.dense.get(position).ok_or(DenseIndexOutOfRangeError {
            position,
            count: self.dense.len(),
        })?;
        let (chunk, offset) = self.locate(index);
        Ok(&mut self.chunks[chunk][offset])
    }

    /// Unchecked-by-contract dense access for hot paths.
    ///
    /// ## Panics
    /// If `position` is out of the live range.

    #[inline]
    pub fn dense_at(&self, position: usize) -> &T {
        assert!(
            position < self.dense.len(),
            "dense position {position} out of range (live count {})",
            self.dense.len()
        );
        let (chunk, offset) = self.locate(self.dense[position]);
        &self.chunks[chunk][offset]
    }

    /// Returns the payload of a live raw index.
    #[inline]
    pub fn get_sparse(&self, index: u32) -> Option<&T> {
        if !self.is_live(index) {
            return None;
        }
        let (chunk, offset) = self.locate(index);
        Some(&self.chunks[chunk][offset])
    }

    /// Mutable variant of [`SparseSet::get_sparse`].
    #[inline]
    pub fn get_sparse_mut(&mut self, index: u32) -> Option<&mut T> {
        if !self.is_live(index) {
            return None;
        }
        let (chunk, offset) = self.locate(index);
        Some(&mut self.chunks[chunk][offset])
    }

    /// Returns two distinct live payloads mutably.
    ///
    /// Returns `None` if `a == b` or either index is not live.

    pub fn get_pair_mut(&mut self, a: u32, b: u32) -> Option<(&mut T, &mut T)> {
        if a == b || !self.is_live(a) || !self.is_live(b) {
            return None;
        }
        let (ca, oa) = self.locate(a);
        let (cb, ob) = self.locate(b);

        if ca == cb {
            let chunk = &mut self.chunks[ca];
            if oa < ob {
                let (lo, hi) = chunk.split_at_mut(ob);
                Some((&mut lo[oa], &mut hi[0]))
            } else {
                let (lo, hi) = chunk.split_at_mut(oa);
                Some((&mut hi[0], &mut lo[ob]))
            }
        } else if ca < cb {
            let (lo, hi) = self.chunks.split_at_mut(cb);
            Some((&mut lo[ca][oa], &mut hi[0][ob]))
        } else {
            let (lo, hi) = self.chunks.split_at_mut(ca);
            Some((&mut hi[0][oa], &mut lo[cb][ob]))
        }
    }

    /// Returns the payload of `index`, making it live first if needed.
    ///
    /// ## Behavior
    /// - Grows the sparse array and the chunk list to cover `index`.
    /// - Indices skipped over by the growth are not made live and are not
    ///   handed out by later `add` calls.
    /// - If `index` was on the free stack it is taken off it.
    /// - The boolean is `true` when the slot was not live before the call.

    pub fn get_or_create_sparse(&mut self, index: u32) -> (&mut T, bool) {
        let created = if self.is_live(index) {
            false
        } else {
            if (index as usize) >= self.sparse.len() {
                self.sparse.resize(index as usize + 1, SparseSlot::default());
                self.ensure_chunk_for(index);
            } else if let Some(pos) = self.free.iter().rposition(|&f| f == index) {
                self.free.swap_remove(pos);
            }
            self.sparse[index as usize].dense = self.dense.len() as u32;
            self.dense.push(index);
            true
        };

        let (chunk, offset) = self.locate(index);
        (&mut self.chunks[chunk][offset], created)
    }

    /// Removes every live element through [`SparseSet::remove`].
    ///
    /// Every previously live index ends up on the free stack. Chunks are kept.

    pub fn clear(&mut self) {
        while let Some(&index) = self.dense.last() {
            self.remove(index);
        }
    }

    /// Reserves room for `elements` indices without making any live.
    ///
    /// [`SparseSet::size`] is unchanged; only capacity and chunks grow.

    pub fn set_size(&mut self, elements: usize) {
        if elements == 0 {
            return;
        }
        if elements > self.sparse.len() {
            self.sparse.reserve(elements - self.sparse.len());
            self.ensure_chunk_for((elements - 1) as u32);
        }
        if elements > self.dense.capacity() {
            self.dense.reserve(elements - self.dense.len());
        }
    }

    /// Ensures chunks exist for `additional` more never-used indices.
    pub fn grow(&mut self, additional: usize) {
        if additional == 0 {
            return;
        }
        let last = self.sparse.len() + additional - 1;
        self.ensure_chunk_for(last as u32);
        self.sparse.reserve(additional);
        self.dense.reserve(additional);
    }

    /// Number of live elements.
    #[inline]
    pub fn count(&self) -> usize {
        self.dense.len()
    }

    /// Returns `true` if no element is live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Size of the sparse index range (highest index handed out + 1).
    #[inline]
    pub fn size(&self) -> usize {
        self.sparse.len()
    }

    /// Number of allocated chunks.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Payload slots per chunk.
    #[inline]
    pub fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    /// Live raw indices in dense order.
    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.dense
    }

    /// Recycled raw indices, most recently freed last.
    #[inline]
    pub fn unused_indices(&self) -> &[u32] {
        &self.free
    }

    /// Iterates `(raw index, payload)` in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> + '_ {
        self.dense.iter().map(move |&index| {
            let (chunk, offset) = self.locate(index);
            (index, &self.chunks[chunk][offset])
        })
    }

    /// Iterates `(raw index, payload)` mutably, in raw index order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut T)> + '_ {
        let capacity = self.chunk_capacity;
        let sparse = &self.sparse;
        let dense = &self.dense;
        self.chunks
            .iter_mut()
            .enumerate()
            .flat_map(move |(c, chunk)| {
                chunk
                    .iter_mut()
                    .enumerate()
                    .map(move |(o, value)| ((c * capacity + o) as u32, value))
            })
            .filter(move |(index, _)| {
                sparse
                    .get(*index as usize)
                    .is_some_and(|slot| dense.get(slot.dense as usize) == Some(index))
            })
    }

    /// Address of a live payload. Stable until the element is removed.
    pub fn ptr_of(&self, index: u32) -> Option<*const T> {
        self.get_sparse(index).map(|value| value as *const T)
    }

    /// Reports allocated and in-use bytes.
    pub fn memory_stats(&self) -> MemoryStats {
        let elem = size_of::<T>();
        let slot = size_of::<SparseSlot>();
        let index = size_of::<u32>();

        let allocated = self.chunks.len() * self.chunk_capacity * elem
            + self.sparse.capacity() * slot
            + (self.dense.capacity() + self.free.capacity()) * index;
        let used = self.dense.len() * (elem + index)
            + self.sparse.len() * slot
            + self.free.len() * index;

        MemoryStats { allocated, used }
    }
}

impl<T: Default + Clone> SparseSet<T> {
    /// Deep copy: chunks, sparse array, dense array and free stack.
    ///
    /// Payload locations are derived from indices, so every reference obtained
    /// from the copy points into the copy's own chunks.

    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Overwrites `self` with the contents of `src`, reusing `self`'s chunks.
    ///
    /// ## Panics
    /// If the chunk geometry of the two sets differs.

    pub fn restore(&mut self, src: &SparseSet<T>) {
        assert_eq!(
            self.chunk_capacity, src.chunk_capacity,
            "sparse set restore with mismatched chunk capacity"
        );

        for (i, chunk) in src.chunks.iter().enumerate() {
            match self.chunks.get_mut(i) {
                Some(dst) => dst.clone_from_slice(chunk),
                None => self.chunks.push(chunk.clone()),
            }
        }
        self.sparse.clone_from(&src.sparse);
        self.dense.clone_from(&src.dense);
        self.free.clone_from(&src.free);
    }
}
