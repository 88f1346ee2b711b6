//! # Engine Module
//!
//! Core building blocks of the store:
//! - Sparse allocation with stable element addresses
//! - Table storage and the table transition graph
//! - Entity records and the world's phase discipline
//! - Bulk structural operations
//! - Systems and the hazard-driven pipeline scheduler
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod sparse;
pub mod storage;
pub mod attribute;
pub mod entity;
pub mod table;
pub mod graph;
pub mod filter;
pub mod commands;
pub mod world;
pub mod bulk;
pub mod systems;
pub mod pipeline;
