use std::time::Duration;

use rand::Rng;
use rand::rngs::StdRng;
use tracing::{info, warn};
use tr_core::{CellObserver, EntityClass, Position, World, WorldError};

use crate::config::SimConfig;
use crate::context::SimContext;
use crate::error::SimResult;
use crate::system::System;

/// Try `config.food_spawn_batch` random cells in `[-range, range)` on both
/// axes, skipping the origin and occupied cells. Returns how many food
/// entities were placed.
pub fn spawn_food<O: CellObserver>(world: &mut World<O>, rng: &mut StdRng, config: &SimConfig) -> usize {
    let range = config.food_spawn_range;
    let mut placed = 0;
    for _ in 0..config.food_spawn_batch {
        let pos = Position::new(rng.random_range(-range..range), rng.random_range(-range..range));
        if pos == Position::new(0, 0) || world.occupied(pos) {
            continue;
        }
        match world.create_entity(EntityClass::Food, "", "", pos) {
            Ok(_) => placed += 1,
            Err(WorldError::InvalidPosition(_) | WorldError::PositionTaken(_)) => {}
            Err(err) => warn!(%err, position = %pos, "failed to place food"),
        }
    }
    placed
}

/// Replenishes food whenever the supply falls below the threshold.
#[derive(Debug, Default)]
pub struct FoodRespawnSystem;

impl System for FoodRespawnSystem {
    fn name(&self) -> &str {
        "food-respawn"
    }

    fn period(&self, config: &SimConfig) -> Duration {
        config.food_respawn_interval
    }

    fn tick(&mut self, ctx: &mut SimContext<'_>) -> SimResult<()> {
        let before = ctx.world.food_count();
        if before >= ctx.config.food_respawn_threshold {
            return Ok(());
        }
        let placed = spawn_food(ctx.world, ctx.rng, ctx.config);
        info!(before, placed, "food respawned");
        Ok(())
    }
}
