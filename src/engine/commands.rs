//! # Commands
//!
//! Staged world mutations recorded while systems execute and applied at the
//! next merge.
//!
//! ## Purpose
//! While a world is in its executing phase, systems may not change table
//! structure or write through columns they did not declare as writable from
//! their own table. Such writes are recorded as [`Command`] values in a
//! [`CommandBuffer`] and applied, in recording order, when the world merges.
//!
//! ## Invariants
//! - Commands are applied in the order they were recorded.
//! - A command whose target entity died before the merge is dropped.
//! - `Set` values must match the column type of the attribute; a mismatch is
//!   reported when the command is applied.

use std::any::Any;

use crate::engine::attribute::Bundle;
use crate::engine::entity::Entity;
use crate::engine::types::AttributeID;


/// A staged world mutation.

pub enum Command {
    /// Creates an entity holding the bundle's attributes.
    Spawn {
        /// Attribute values of the new entity.
        bundle: Bundle,
    },

    /// Deletes an entity, firing removal hooks of its attributes.
    Delete {
        /// Entity to delete.
        entity: Entity,
    },

    /// Adds an attribute (default value for data attributes).
    Add {
        /// Target entity.
        entity: Entity,
        /// Attribute to add.
        attribute: AttributeID,
    },

    /// Removes an attribute.
    Remove {
        /// Target entity.
        entity: Entity,
        /// Attribute to remove.
        attribute: AttributeID,
    },

    /// Writes a value, adding the attribute first if needed.
    Set {
        /// Target entity.
        entity: Entity,
        /// Attribute to write.
        attribute: AttributeID,
        /// New value; must match the registered type of `attribute`.
        value: Box<dyn Any + Send>,
    },
}

impl Command {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Spawn { .. } => "spawn",
            Command::Delete { .. } => "delete",
            Command::Add { .. } => "add",
            Command::Remove { .. } => "remove",
            Command::Set { .. } => "set",
        }
    }
}

/// FIFO of staged commands.
#[derive(Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a command.
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Number of pending commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Takes every pending command, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }
}
