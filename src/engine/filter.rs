//! Table filters and the matcher seam.
//!
//! Bulk operations and system matching ask one question of a table: does it
//! satisfy this filter? [`TableMatcher`] is that question as a trait, so a
//! richer signature engine can be plugged into a world. [`TypeMatcher`] is the
//! default, evaluating a [`Filter`] against the table type alone.
//!
//! ## Matching rules of [`TypeMatcher`]
//! - Empty include set: every table matches except tables holding builtin
//!   attributes.
//! - `include_kind`: `All` (default) needs every include id, `Any` needs at
//!   least one, `Exact` needs the type to equal the include set.
//! - `exclude_kind`: `Any` (default) rejects a table holding any exclude id,
//!   `All` rejects only tables holding every exclude id, `Exact` rejects only
//!   the table whose type equals the exclude set.

use crate::engine::table::Table;
use crate::engine::types::{AttributeID, Type};


/// How a filter's id set is compared with a table type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchKind {
    /// Every id must be present.
    #[default]
    All,
    /// At least one id must be present.
    Any,
    /// The table type must equal the id set.
    Exact,
}

/// Table pre-selection for bulk operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filter {
    /// Attributes a table must carry.
    pub include: Type,
    /// Attributes a table must not carry.
    pub exclude: Type,
    /// Comparison used for `include`.
    pub include_kind: MatchKind,
    /// Comparison used for `exclude`.
    pub exclude_kind: MatchKind,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            include: Type::new(),
            exclude: Type::new(),
            include_kind: MatchKind::All,
            exclude_kind: MatchKind::Any,
        }
    }
}

impl Filter {
    /// Filter matching every non-builtin table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the include set.
    pub fn include(mut self, ids: &[AttributeID]) -> Self {
        self.include = Type::from_ids(ids);
        self
    }

    /// Sets the exclude set.
    pub fn exclude(mut self, ids: &[AttributeID]) -> Self {
        self.exclude = Type::from_ids(ids);
        self
    }

    /// Sets the include comparison.
    pub fn include_kind(mut self, kind: MatchKind) -> Self {
        self.include_kind = kind;
        self
    }

    /// Sets the exclude comparison.
    pub fn exclude_kind(mut self, kind: MatchKind) -> Self {
        self.exclude_kind = kind;
        self
    }
}

/// Evaluates filters against tables.
///
/// Implementations must be pure with respect to the table: bulk operations
/// call `table_matches` from rayon worker threads during a read-only scan.

pub trait TableMatcher: Send + Sync {
    /// Returns `true` if `table` satisfies `filter`.
    fn table_matches(&self, table: &Table, filter: &Filter) -> bool;
}

/// Default matcher over table types.
#[derive(Clone, Copy, Debug, Default)]
pub struct TypeMatcher;

impl TypeMatcher {
    /// Type-level match used by the [`TableMatcher`] impl.
    pub fn type_matches(ty: &Type, has_builtins: bool, filter: &Filter) -> bool {
        if filter.include.is_empty() {
            if has_builtins {
                return false;
            }
        } else {
            let included = match filter.include_kind {
                MatchKind::All => ty.contains_all(&filter.include),
                MatchKind::Any => ty.contains_any(&filter.include),
                MatchKind::Exact => *ty == filter.include,
            };
            if !included {
                return false;
            }
        }

        if !filter.exclude.is_empty() {
            let excluded = match filter.exclude_kind {
                MatchKind::Any => ty.contains_any(&filter.exclude),
                MatchKind::All => ty.contains_all(&filter.exclude),
                MatchKind::Exact => *ty == filter.exclude,
            };
            if excluded {
                return false;
            }
        }
        true
    }
}

impl TableMatcher for TypeMatcher {
    fn table_matches(&self, table: &Table, filter: &Filter) -> bool {
        Self::type_matches(table.ty(), table.has_builtins(), filter)
    }
}
