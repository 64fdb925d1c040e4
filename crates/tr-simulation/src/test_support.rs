use rand::SeedableRng;
use rand::rngs::StdRng;
use tr_core::World;

use crate::config::SimConfig;
use crate::remote_model::ModelRegistry;
use crate::sink::CellSink;
use crate::stadium::Stadium;

/// The pieces of a `SimContext`, owned, for driving a system directly.
pub(crate) fn context_parts(config: SimConfig) -> (World<CellSink>, ModelRegistry, SimConfig, StdRng) {
    let stadium = Stadium::new(config.region_size, config.spectator_queue_capacity);
    let world = World::with_observer(config.rules(), CellSink::new(stadium));
    let models = ModelRegistry::new(config.model_queue_capacity);
    let rng = StdRng::seed_from_u64(config.seed.unwrap_or(0));
    (world, models, config, rng)
}
