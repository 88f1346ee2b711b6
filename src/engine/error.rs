//! Error types for storage, structural changes and scheduling.
//!
//! This module declares small, focused error types, one per failure mode, and
//! an aggregate [`ECSError`] that higher layers return through [`ECSResult`].
//! Each low-level error converts into the aggregate with `From`, so callers
//! can propagate with `?` and still match on the precise cause.
//!
//! ## Taxonomy
//! * **Invalid parameter**: a checked accessor was given a position outside
//!   the live range ([`DenseIndexOutOfRangeError`]).
//! * **Invalid operating context**: a structural operation was attempted while
//!   the world is staged ([`UnsupportedOperationError`]). The operation is
//!   refused and nothing is mutated.
//! * **Stale handles and unknown ids**: [`StaleEntityError`],
//!   [`UnknownAttributeError`], [`MissingAttributeError`].
//! * **Type mismatch**: a dynamically typed value did not match the column it
//!   was written to ([`TypeMismatchError`]).
//!
//! Contract violations inside the allocator, the table graph and the
//! scheduler (mismatched chunk geometry on restore, a hazard re-raised right
//! after a reset, op bookkeeping drift) are not represented here. They panic.
//!
//! ## Display vs. Debug
//! * [`fmt::Display`] is short and suitable for logs.
//! * [`fmt::Debug`] (derived) keeps the full structure for diagnostics.

use std::any::TypeId;
use std::fmt;

use crate::engine::entity::Entity;
use crate::engine::types::AttributeID;


/// Returned when a dense position is outside the live range of a sparse set.
///
/// ### Fields
/// * `position`: The dense position that was requested.
/// * `count`: Number of live elements at the time of the call.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DenseIndexOutOfRangeError {

    /// Requested dense position.
    pub position: usize,

    /// Live element count.
    pub count: usize,
}

impl fmt::Display for DenseIndexOutOfRangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dense position {} out of range (live count {})",
            self.position, self.count
        )
    }
}

impl std::error::Error for DenseIndexOutOfRangeError {}

/// Returned when an operation is not permitted in the current world phase.
///
/// Bulk structural operations are only valid against the primary view of the
/// world. Invoking one while writes are being staged is refused with this
/// error and leaves every table untouched.
///
/// ### Example
/// ```ignore
/// world.begin_staging()?;
/// let err = world.bulk_add(&[position], None).unwrap_err();
/// assert!(matches!(err, ECSError::Unsupported(_)));
/// ```

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedOperationError {

    /// Name of the refused operation.
    pub operation: &'static str,

    /// Why the operation was refused.
    pub reason: &'static str,
}

impl fmt::Display for UnsupportedOperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported operation `{}`: {}", self.operation, self.reason)
    }
}

impl std::error::Error for UnsupportedOperationError {}

/// Returned when an `Entity` handle no longer refers to a live entity.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleEntityError {

    /// Offending handle.
    pub entity: Entity,
}

impl fmt::Display for StaleEntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stale or dead entity reference {}", self.entity)
    }
}

impl std::error::Error for StaleEntityError {}

/// Returned when an attribute id was never registered.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownAttributeError {

    /// Unregistered attribute id.
    pub attribute: AttributeID,
}

impl fmt::Display for UnknownAttributeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attribute {} is not registered", self.attribute)
    }
}

impl std::error::Error for UnknownAttributeError {}

/// Returned when an entity is expected to carry a data attribute it lacks,
/// or when a value is written to a tag.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingAttributeError {

    /// Entity that was addressed.
    pub entity: Entity,

    /// Attribute without a column for this entity.
    pub attribute: AttributeID,
}

impl fmt::Display for MissingAttributeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entity {} has no column for attribute {}",
            self.entity, self.attribute
        )
    }
}

impl std::error::Error for MissingAttributeError {}

/// Returned when a dynamically typed value does not match the element type of
/// the column it targets.
///
/// ### Fields
/// * `expected`: Column element type.
/// * `actual`: Dynamic type of the provided value.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMismatchError {

    /// Column element type.
    pub expected: TypeId,

    /// Provided value's dynamic type.
    pub actual: TypeId,
}

impl fmt::Display for TypeMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type mismatch: expected {:?}, actual {:?}", self.expected, self.actual)
    }
}

impl std::error::Error for TypeMismatchError {}

/// Aggregate error returned by world, table and scheduling operations.
///
/// ## Notes
/// `Internal` carries invariant failures that are detected at runtime but are
/// reported rather than panicking, such as a record pointing at a table that
/// no longer exists.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ECSError {
    /// Checked dense access out of range.
    InvalidParameter(DenseIndexOutOfRangeError),

    /// Operation refused in the current phase.
    Unsupported(UnsupportedOperationError),

    /// Entity handle is stale.
    StaleEntity(StaleEntityError),

    /// Attribute id was never registered.
    UnknownAttribute(UnknownAttributeError),

    /// Entity lacks a column for the attribute.
    MissingAttribute(MissingAttributeError),

    /// Dynamic value type differs from the column type.
    TypeMismatch(TypeMismatchError),

    /// Internal bookkeeping inconsistency.
    Internal(String),
}

impl fmt::Display for ECSError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ECSError::InvalidParameter(e) => write!(f, "invalid parameter: {e}"),
            ECSError::Unsupported(e) => write!(f, "{e}"),
            ECSError::StaleEntity(e) => write!(f, "{e}"),
            ECSError::UnknownAttribute(e) => write!(f, "{e}"),
            ECSError::MissingAttribute(e) => write!(f, "{e}"),
            ECSError::TypeMismatch(e) => write!(f, "{e}"),
            ECSError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ECSError {}

impl From<DenseIndexOutOfRangeError> for ECSError {
    fn from(e: DenseIndexOutOfRangeError) -> Self { ECSError::InvalidParameter(e) }
}
impl From<UnsupportedOperationError> for ECSError {
    fn from(e: UnsupportedOperationError) -> Self { ECSError::Unsupported(e) }
}
impl From<StaleEntityError> for ECSError {
    fn from(e: StaleEntityError) -> Self { ECSError::StaleEntity(e) }
}
impl From<UnknownAttributeError> for ECSError {
    fn from(e: UnknownAttributeError) -> Self { ECSError::UnknownAttribute(e) }
}
impl From<MissingAttributeError> for ECSError {
    fn from(e: MissingAttributeError) -> Self { ECSError::MissingAttribute(e) }
}
impl From<TypeMismatchError> for ECSError {
    fn from(e: TypeMismatchError) -> Self { ECSError::TypeMismatch(e) }
}

/// Result alias used throughout the engine.
pub type ECSResult<T> = Result<T, ECSError>;
