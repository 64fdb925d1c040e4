use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{Mutex, mpsc};
use tracing::info;
use tr_core::keyspace::{Keyspace, PositionKeyCodec};
use tr_core::{
    Direction, Entity, EntityClass, EntityId, Observation, Position, Region, World, WorldError,
};
use uuid::Uuid;

use crate::action::{ActionOutcome, ActionVerb};
use crate::agent_step::AgentStepSystem;
use crate::config::{Mode, SimConfig};
use crate::context::SimContext;
use crate::error::{SimError, SimResult};
use crate::event::{ServerAction, SpectateEvent};
use crate::food::{FoodRespawnSystem, spawn_food};
use crate::remote_model::{ModelConnection, ModelRegistry};
use crate::sink::CellSink;
use crate::stadium::Stadium;
use crate::system::System;

/// The one simulation instance shared by every request handler and the
/// ticker.
pub type SharedSimulation = Arc<Mutex<Simulation>>;

/// Everything guarded by the world lock: the world (with the stadium and
/// keyspace inside its cell observer), the remote-model registry, the RNG,
/// and the periodic systems.
pub struct Simulation {
    config: SimConfig,
    world: World<CellSink>,
    models: ModelRegistry,
    rng: StdRng,
    agent_step: AgentStepSystem,
    food_respawn: FoodRespawnSystem,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("mode", &self.config.mode)
            .field("entities", &self.world.len())
            .field("spectators", &self.world.observer().stadium.spectator_count())
            .field("models", &self.models.len())
            .field("steps", &self.agent_step.steps())
            .finish()
    }
}

impl Simulation {
    /// Create an empty simulation.
    pub fn new(config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        let stadium = Stadium::new(config.region_size, config.spectator_queue_capacity);
        let mut sink = CellSink::new(stadium);
        if config.keyspace_mirror {
            let bounds = config.bounds.unwrap_or_default();
            sink = sink.with_keyspace(Keyspace::new(PositionKeyCodec::for_bounds(&bounds)));
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            world: World::with_observer(config.rules(), sink),
            models: ModelRegistry::new(config.model_queue_capacity),
            rng,
            agent_step: AgentStepSystem::new(),
            food_respawn: FoodRespawnSystem,
            config,
        })
    }

    /// Create a simulation with its initial food supply.
    pub fn bootstrap(config: SimConfig) -> SimResult<Self> {
        let mut sim = Self::new(config)?;
        let placed = sim.seed_food();
        info!(placed, mode = %sim.config.mode, "world seeded");
        Ok(sim)
    }

    /// Wrap for sharing between the ticker and the service.
    pub fn into_shared(self) -> SharedSimulation {
        Arc::new(Mutex::new(self))
    }

    /// The configuration this simulation runs with.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The deployment mode.
    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    /// The world, read-only.
    pub fn world(&self) -> &World<CellSink> {
        &self.world
    }

    /// Spectator registry and subscriptions.
    pub fn stadium(&self) -> &Stadium {
        &self.world.observer().stadium
    }

    /// The ordered-set mirror, when enabled.
    pub fn keyspace(&self) -> Option<&Keyspace> {
        self.world.observer().keyspace.as_ref()
    }

    /// Live remote model sessions.
    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    /// Spawn an entity. Agents get the initial energy and health.
    pub fn create_entity(
        &mut self,
        class: EntityClass,
        owner_id: &str,
        model_name: &str,
        position: Position,
    ) -> SimResult<Entity> {
        Ok(self.world.create_entity(class, owner_id, model_name, position)?)
    }

    /// Look up an entity by id.
    pub fn get_entity(&self, id: EntityId) -> Option<&Entity> {
        self.world.get(id)
    }

    /// Returns whether an entity was removed.
    pub fn delete_entity(&mut self, id: EntityId) -> bool {
        self.world.delete_entity(id)
    }

    /// Entities inside `region`, cloned.
    pub fn entities_in_region(&self, region: Region) -> Vec<Entity> {
        self.world
            .entities_in_region(region)
            .into_iter()
            .cloned()
            .collect()
    }

    /// The agent's observation, or the dead observation if it is gone.
    pub fn observe(&self, id: EntityId) -> Observation {
        self.world.observe(id).unwrap_or_else(|| Observation::dead(id))
    }

    /// Resolve one agent action against the neighbouring cell in `direction`.
    ///
    /// Refused moves and consumes, and unknown verbs, are unsuccessful but
    /// not errors. In training the living cost is charged afterwards; an
    /// agent that dies of it reports the action as unsuccessful. Only agents
    /// act.
    pub fn execute_action(
        &mut self,
        id: EntityId,
        verb: &ActionVerb,
        direction: Direction,
    ) -> SimResult<ActionOutcome> {
        let entity = self.world.get(id).ok_or(WorldError::NotFound(id))?;
        if !entity.is_agent() {
            return Err(SimError::NotAnAgent(id));
        }
        let origin = entity.position;

        let was_successful = match (verb, origin.step(direction)) {
            (ActionVerb::Move, Some(target)) => self.world.entity_move(id, target),
            (ActionVerb::Consume, Some(target)) => self.world.entity_consume(id, target),
            _ => false,
        };

        let is_alive = if self.config.mode.applies_living_cost_inline() {
            self.world.living_cost(id)
        } else {
            self.world.get(id).is_some()
        };
        Ok(ActionOutcome {
            was_successful: was_successful && is_alive,
            is_alive,
        })
    }

    /// Place one food batch. Used at start-up and after a reset.
    pub fn seed_food(&mut self) -> usize {
        spawn_food(&mut self.world, &mut self.rng, &self.config)
    }

    /// Empty the world, tell every spectator, then reseed the food.
    ///
    /// Spectators receive the vacate updates, then `RESET`, then the
    /// updates for the new food.
    pub fn reset(&mut self) -> usize {
        let removed = self.world.clear();
        self.world
            .observer_mut()
            .stadium
            .broadcast_server_action(ServerAction::Reset);
        let placed = self.seed_food();
        info!(removed, placed, "world reset");
        removed
    }

    // -----------------------------------------------------------------------
    // Systems
    // -----------------------------------------------------------------------

    /// Run one agent step now.
    pub fn step_agents(&mut self) -> SimResult<()> {
        let mut ctx = SimContext {
            world: &mut self.world,
            models: &mut self.models,
            config: &self.config,
            rng: &mut self.rng,
        };
        self.agent_step.tick(&mut ctx)
    }

    /// Run one food respawn check now.
    pub fn respawn_food(&mut self) -> SimResult<()> {
        let mut ctx = SimContext {
            world: &mut self.world,
            models: &mut self.models,
            config: &self.config,
            rng: &mut self.rng,
        };
        self.food_respawn.tick(&mut ctx)
    }

    /// Periods of the agent step and the food respawn.
    pub fn periods(&self) -> (Duration, Duration) {
        (
            self.agent_step.period(&self.config),
            self.food_respawn.period(&self.config),
        )
    }

    /// Completed agent steps.
    pub fn agent_steps(&self) -> u64 {
        self.agent_step.steps()
    }

    // -----------------------------------------------------------------------
    // Spectators
    // -----------------------------------------------------------------------

    /// Register a spectator and return its event queue.
    pub fn add_spectator(&mut self, id: &str) -> SimResult<mpsc::Receiver<SpectateEvent>> {
        self.world.observer_mut().stadium.add_spectator(id)
    }

    /// Drop a spectator and every subscription it holds.
    pub fn remove_spectator(&mut self, id: &str) -> bool {
        self.world.observer_mut().stadium.remove_spectator(id)
    }

    /// Subscribe a spectator to a region and queue one cell update per
    /// occupied cell of that region. Nothing is queued on a repeat subscribe.
    pub fn subscribe_spectator(&mut self, id: &str, region: Region) -> SimResult<bool> {
        let stadium = &mut self.world.observer_mut().stadium;
        if !stadium.subscribe(id, region)? {
            return Ok(false);
        }
        let snapshot = self.entities_in_region(region);
        let stadium = &mut self.world.observer_mut().stadium;
        for entity in &snapshot {
            stadium.send_cell_update(id, entity.position, Some(entity));
        }
        Ok(true)
    }

    /// Returns whether the spectator was subscribed.
    pub fn unsubscribe_spectator(&mut self, id: &str, region: Region) -> SimResult<bool> {
        self.world.observer_mut().stadium.unsubscribe(id, region)
    }

    // -----------------------------------------------------------------------
    // Remote models
    // -----------------------------------------------------------------------

    /// Open a remote model session for the owner.
    pub fn register_model(&mut self, owner_id: &str, model_name: &str) -> SimResult<ModelConnection> {
        self.models.register(owner_id, model_name)
    }

    /// Close a session if `token` is the live one.
    pub fn deregister_model(&mut self, owner_id: &str, model_name: &str, token: Uuid) -> bool {
        self.models.deregister(owner_id, model_name, token)
    }
}
