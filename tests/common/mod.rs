#![allow(dead_code)]

use std::sync::Once;

use archetable::engine::attribute::Bundle;
use archetable::engine::entity::Entity;
use archetable::engine::error::ECSResult;
use archetable::engine::filter::{Filter, TableMatcher, TypeMatcher};
use archetable::engine::table::Table;
use archetable::engine::types::AttributeID;
use archetable::engine::world::World;

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Velocity {
    pub dx: f32,
    pub dy: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Health(pub i32);

pub struct Ids {
    pub position: AttributeID,
    pub velocity: AttributeID,
    pub health: AttributeID,
    pub frozen: AttributeID,
}

pub fn setup_world() -> (World, Ids) {
    init_logging();
    let mut world = World::default();
    let ids = Ids {
        position: world.register::<Position>("Position"),
        velocity: world.register::<Velocity>("Velocity"),
        health: world.register::<Health>("Health"),
        frozen: world.register_tag("Frozen"),
    };
    (world, ids)
}

pub fn spawn_movers(world: &mut World, ids: &Ids, count: usize) -> ECSResult<Vec<Entity>> {
    (0..count)
        .map(|i| {
            world.spawn(
                Bundle::new()
                    .with(ids.position, Position { x: i as f32, y: 0.0 })
                    .with(ids.velocity, Velocity { dx: 1.0, dy: 0.5 }),
            )
        })
        .collect()
}

/// Matches like [`TypeMatcher`] but ignores tables holding fewer than
/// `min_rows` entities.
pub struct CrowdedTables {
    pub min_rows: usize,
}

impl TableMatcher for CrowdedTables {
    fn table_matches(&self, table: &Table, filter: &Filter) -> bool {
        table.count() >= self.min_rows && TypeMatcher.table_matches(table, filter)
    }
}
