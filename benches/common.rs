#![allow(dead_code)]

use archetable::engine::attribute::Bundle;
use archetable::engine::error::ECSResult;
use archetable::engine::types::AttributeID;
use archetable::engine::world::{World, WorldConfig};

pub const AGENTS_SMALL: usize = 10_000;
pub const AGENTS_MED: usize = 100_000;

#[derive(Clone, Copy, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy, Default)]
pub struct Wealth {
    pub value: f32,
}

#[derive(Clone, Copy, Default)]
pub struct Productivity {
    pub rate: f32,
}

pub struct Ids {
    pub position: AttributeID,
    pub wealth: AttributeID,
    pub productivity: AttributeID,
    pub employed: AttributeID,
}

pub fn setup_world(agent_count: usize) -> ECSResult<(World, Ids)> {
    let config = WorldConfig::default()
        .with_entity_capacity(agent_count)
        .with_measure_frame_time(false);
    let mut world = World::new(config);
    let ids = Ids {
        position: world.register::<Position>("Position"),
        wealth: world.register::<Wealth>("Wealth"),
        productivity: world.register::<Productivity>("Productivity"),
        employed: world.register_tag("Employed"),
    };

    for i in 0..agent_count {
        world.spawn(
            Bundle::new()
                .with(ids.position, Position { x: i as f32, y: 0.0 })
                .with(ids.wealth, Wealth { value: 100.0 })
                .with(ids.productivity, Productivity { rate: 1.0 }),
        )?;
    }
    Ok((world, ids))
}
