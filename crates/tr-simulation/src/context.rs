use rand::rngs::StdRng;
use tr_core::World;

use crate::config::SimConfig;
use crate::remote_model::ModelRegistry;
use crate::sink::CellSink;

/// Mutable view of the simulation handed to each system tick.
pub struct SimContext<'a> {
    /// The world being ticked.
    pub world: &'a mut World<CellSink>,
    /// Live remote model sessions.
    pub models: &'a mut ModelRegistry,
    /// Process-wide configuration.
    pub config: &'a SimConfig,
    /// Food placement randomness.
    pub rng: &'a mut StdRng,
}
