//! # Attribute Registry
//!
//! Assigns `AttributeID` values to data attributes (Rust types stored in
//! columns) and tags (attributes without data), and supplies the column
//! factories tables use to allocate storage.
//!
//! ## Design
//! - The registry is owned by a world rather than being process-global. Two
//!   worlds never share ids.
//! - Descriptors live in a [`SparseSet`] keyed by attribute id. Ids are either
//!   allocated by the set or supplied out of band through
//!   [`AttributeRegistry::register_with_id`], which uses
//!   [`SparseSet::get_or_create_sparse`].
//! - Attributes can be flagged as builtin. Tables containing a builtin are
//!   skipped by bulk delete/clear and by filters with an empty include set.
//! - An optional removal hook is fired when entities lose the attribute
//!   through delete operations.
//!
//! ## Invariants
//! - A data attribute always has a column factory; a tag never has one.
//! - A Rust type maps to at most one attribute id per registry.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::mem::size_of;
use std::sync::Arc;

use crate::engine::entity::Entity;
use crate::engine::error::{ECSResult, TypeMismatchError, UnknownAttributeError};
use crate::engine::sparse::SparseSet;
use crate::engine::storage::{Column, TypeErasedColumn};
use crate::engine::types::{AttributeID, Type};


/// Factory constructing an empty column for a data attribute.
pub type ColumnFactory = fn() -> Box<dyn TypeErasedColumn>;

/// Hook fired with the entities losing an attribute.
pub type RemoveHook = Arc<dyn Fn(AttributeID, &[Entity]) + Send + Sync>;

fn new_column<T: Default + Clone + Send + Sync + 'static>() -> Box<dyn TypeErasedColumn> {
    Box::new(Column::<T>::new())
}

/// Metadata of a registered attribute.

#[derive(Clone, Default)]
pub struct AttributeDesc {
    /// Attribute id.
    pub id: AttributeID,

    /// Registered name.
    pub name: String,

    /// `TypeId` of the stored type, `None` for tags.
    pub type_id: Option<TypeId>,

    /// Rust type name, empty for tags.
    pub type_name: &'static str,

    /// Element size in bytes, zero for tags.
    pub size: usize,

    /// Whether the attribute belongs to bootstrap/builtin data.
    pub builtin: bool,

    factory: Option<ColumnFactory>,
    on_remove: Option<RemoveHook>,
}

impl AttributeDesc {
    /// Returns `true` if values of this attribute are stored in a column.
    #[inline]
    pub fn is_data(&self) -> bool {
        self.factory.is_some()
    }

    /// Creates an empty column for this attribute, `None` for tags.
    pub fn make_column(&self) -> Option<Box<dyn TypeErasedColumn>> {
        self.factory.map(|factory| factory())
    }

    /// Returns the removal hook, if any.
    pub fn on_remove(&self) -> Option<&RemoveHook> {
        self.on_remove.as_ref()
    }
}

impl fmt::Debug for AttributeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeDesc")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("size", &self.size)
            .field("builtin", &self.builtin)
            .field("has_on_remove", &self.on_remove.is_some())
            .finish()
    }
}

/// World-owned mapping between attributes and their descriptors.

#[derive(Default)]
pub struct AttributeRegistry {
    descs: SparseSet<AttributeDesc>,
    by_type: HashMap<TypeId, AttributeID>,
    by_name: HashMap<String, AttributeID>,
}

impl AttributeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn describe<T: Default + Clone + Send + Sync + 'static>(desc: &mut AttributeDesc, id: AttributeID, name: &str) {
        *desc = AttributeDesc {
            id,
            name: name.to_string(),
            type_id: Some(TypeId::of::<T>()),
            type_name: type_name::<T>(),
            size: size_of::<T>(),
            builtin: false,
            factory: Some(new_column::<T>),
            on_remove: None,
        };
    }

    /// Registers data attribute `T` under `name` and returns its id.
    ///
    /// ## Behavior
    /// Registering the same type twice returns the existing id.

    pub fn register<T: Default + Clone + Send + Sync + 'static>(&mut self, name: &str) -> AttributeID {
        if let Some(&id) = self.by_type.get(&TypeId::of::<T>()) {
            return id;
        }
        let (id, desc) = self.descs.add();
        Self::describe::<T>(desc, id, name);
        self.by_type.insert(TypeId::of::<T>(), id);
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Registers a tag (attribute without data) and returns its id.
    ///
    /// Registering an existing tag name returns the existing id.

    pub fn register_tag(&mut self, name: &str) -> AttributeID {
        if let Some(&id) = self.by_name.get(name) {
            if self.descs.get_sparse(id).is_some_and(|d| !d.is_data()) {
                return id;
            }
        }
        let (id, desc) = self.descs.add();
        *desc = AttributeDesc { id, name: name.to_string(), ..AttributeDesc::default() };
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Registers data attribute `T` under an externally chosen id.
    ///
    /// ## Errors
    /// [`TypeMismatchError`] if `id` is already registered for a different
    /// type or as a tag.

    pub fn register_with_id<T: Default + Clone + Send + Sync + 'static>(
        &mut self,
        id: AttributeID,
        name: &str,
    ) -> ECSResult<AttributeID> {
        let (desc, created) = self.descs.get_or_create_sparse(id);
        if !created {
            return match desc.type_id {
                Some(existing) if existing == TypeId::of::<T>() => Ok(id),
                existing => Err(TypeMismatchError {
                    expected: existing.unwrap_or(TypeId::of::<()>()),
                    actual: TypeId::of::<T>(),
                }
                .into()),
            };
        }
        Self::describe::<T>(desc, id, name);
        self.by_type.insert(TypeId::of::<T>(), id);
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Registers a tag under an externally chosen id.
    pub fn register_tag_with_id(&mut self, id: AttributeID, name: &str) -> AttributeID {
        let (desc, created) = self.descs.get_or_create_sparse(id);
        if created {
            *desc = AttributeDesc { id, name: name.to_string(), ..AttributeDesc::default() };
            self.by_name.insert(name.to_string(), id);
        }
        id
    }

    /// Flags `id` as builtin.
    pub fn mark_builtin(&mut self, id: AttributeID) -> ECSResult<()> {
        let desc = self
            .descs
            .get_sparse_mut(id)
            .ok_or(UnknownAttributeError { attribute: id })?;
        desc.builtin = true;
        Ok(())
    }

    /// Installs a hook fired when entities lose `id` through a delete.
    pub fn set_on_remove<F>(&mut self, id: AttributeID, hook: F) -> ECSResult<()>
    where
        F: Fn(AttributeID, &[Entity]) + Send + Sync + 'static,
    {
        let desc = self
            .descs
            .get_sparse_mut(id)
            .ok_or(UnknownAttributeError { attribute: id })?;
        desc.on_remove = Some(Arc::new(hook));
        Ok(())
    }

    /// Returns the descriptor of `id`.
    #[inline]
    pub fn desc(&self, id: AttributeID) -> Option<&AttributeDesc> {
        self.descs.get_sparse(id)
    }

    /// Returns the id registered for type `T`.
    pub fn id_of<T: 'static>(&self) -> Option<AttributeID> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Returns the id registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<AttributeID> {
        self.by_name.get(name).copied()
    }

    /// Returns `true` if `id` is registered.
    #[inline]
    pub fn contains(&self, id: AttributeID) -> bool {
        self.descs.is_live(id)
    }

    /// Returns `true` if `id` is registered and flagged builtin.
    #[inline]
    pub fn is_builtin(&self, id: AttributeID) -> bool {
        self.desc(id).is_some_and(|d| d.builtin)
    }

    /// Number of registered attributes.
    pub fn count(&self) -> usize {
        self.descs.count()
    }

    /// Verifies every id of `ty` is registered.
    pub fn validate(&self, ty: &Type) -> ECSResult<()> {
        match ty.ids().iter().find(|id| !self.contains(**id)) {
            Some(&attribute) => Err(UnknownAttributeError { attribute }.into()),
            None => Ok(()),
        }
    }
}

/// Attribute values and tags used to spawn an entity.
///
/// ## Design
/// Values are type-erased (`Box<dyn Any + Send>`) so a bundle can carry any
/// mix of registered attributes. Types are checked against the destination
/// column when the bundle is applied.

#[derive(Default)]
pub struct Bundle {
    entries: Vec<(AttributeID, Option<Box<dyn Any + Send>>)>,
}

impl Bundle {
    /// Creates an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a data value for `id`, replacing any previous entry.
    pub fn insert<T: Send + 'static>(&mut self, id: AttributeID, value: T) -> &mut Self {
        self.entries.retain(|(existing, _)| *existing != id);
        self.entries.push((id, Some(Box::new(value))));
        self
    }

    /// Builder form of [`Bundle::insert`].
    pub fn with<T: Send + 'static>(mut self, id: AttributeID, value: T) -> Self {
        self.insert(id, value);
        self
    }

    /// Adds a tag (or a data attribute left at its default value).
    pub fn tag(mut self, id: AttributeID) -> Self {
        if !self.entries.iter().any(|(existing, _)| *existing == id) {
            self.entries.push((id, None));
        }
        self
    }

    /// Canonical type of the bundle.
    pub fn ty(&self) -> Type {
        let ids: Vec<AttributeID> = self.entries.iter().map(|(id, _)| *id).collect();
        Type::from_ids(&ids)
    }

    /// Returns `true` if the bundle holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the bundle, yielding the data values.
    pub fn into_values(self) -> impl Iterator<Item = (AttributeID, Box<dyn Any + Send>)> {
        self.entries
            .into_iter()
            .filter_map(|(id, value)| value.map(|value| (id, value)))
    }
}
