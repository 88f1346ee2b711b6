//! # archetable
//!
//! Table-based entity storage with a transition graph, bulk migrations and a
//! pipeline scheduler that only merges staged writes where a later system
//! would otherwise read stale data.
//!
//! ## Design Goals
//! - Entities grouped by attribute set into tables of contiguous columns
//! - Memoized table transitions, so structural changes are edge lookups
//! - Whole-table migration for bulk add/remove/delete
//! - Deterministic system order with the minimum number of merges
//!
//! ## Example
//! ```rust
//! use archetable::prelude::*;
//!
//! #[derive(Clone, Copy, Default, Debug, PartialEq)]
//! struct Position(f32);
//!
//! let mut world = World::default();
//! let position = world.register::<Position>("Position");
//! let e = world.spawn(Bundle::new().with(position, Position(1.0))).unwrap();
//! assert_eq!(world.get::<Position>(e, position), Some(&Position(1.0)));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]
#![deny(dead_code)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use engine::types::{
    AttributeID,
    RowID,
    SystemID,
    TableID,
    Type,
};

pub use engine::error::{
    ECSError,
    ECSResult,
    DenseIndexOutOfRangeError,
    UnsupportedOperationError,
    StaleEntityError,
    UnknownAttributeError,
    MissingAttributeError,
    TypeMismatchError,
};

pub use engine::sparse::{MemoryStats, SparseSet};
pub use engine::storage::{Column, TypeErasedColumn};
pub use engine::attribute::{AttributeDesc, AttributeRegistry, Bundle, RemoveHook};
pub use engine::entity::{Entity, EntityIndex, Record};
pub use engine::table::{Edge, Table, TableFlags};
pub use engine::graph::TableRegistry;
pub use engine::filter::{Filter, MatchKind, TableMatcher, TypeMatcher};
pub use engine::commands::{Command, CommandBuffer};
pub use engine::world::{Phase, World, WorldConfig, WorldStats};

pub use engine::systems::{
    FnSystem,
    InOutKind,
    OperKind,
    PipelinePhase,
    RateLimit,
    SourceKind,
    System,
    SystemColumn,
    SystemContext,
    SystemRun,
    run_system,
};

pub use engine::pipeline::{
    FrameReport,
    Pipeline,
    PipelineOp,
    Schedule,
    WriteState,
    build_schedule,
    run_frame,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used types.
///
/// Import with:
/// ```rust
/// use archetable::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        AttributeID,
        Bundle,
        Entity,
        Filter,
        FnSystem,
        InOutKind,
        OperKind,
        Pipeline,
        PipelinePhase,
        SourceKind,
        System,
        SystemColumn,
        SystemContext,
        Type,
        World,
        WorldConfig,
        run_frame,
    };
}
