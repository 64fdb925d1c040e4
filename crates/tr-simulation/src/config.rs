use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tr_core::{WorldBounds, WorldRules};

use crate::error::{SimError, SimResult};

/// Deployment mode. Selects the identity backend, where living cost is
/// charged, and which operations are restricted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Mock identity, inline living cost, debug operations.
    #[default]
    Training,
    /// Mock identity and debug operations.
    Testing,
    /// Real identities without ownership checks.
    Staging,
    /// Real identities and model ownership checks.
    Prod,
}

impl Mode {
    /// Training charges living cost right after each explicit action;
    /// every other mode charges it on the agent step.
    pub fn applies_living_cost_inline(self) -> bool {
        self == Mode::Training
    }

    /// Whether callers authenticate with the shared mock secret.
    pub fn uses_mock_identity(self) -> bool {
        matches!(self, Mode::Training | Mode::Testing)
    }

    /// Whether agents may only be driven by their owner.
    pub fn enforces_model_ownership(self) -> bool {
        self == Mode::Prod
    }

    /// Observation peeking and manual stepping.
    pub fn allows_debug_operations(self) -> bool {
        matches!(self, Mode::Training | Mode::Testing)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Training => "training",
            Mode::Testing => "testing",
            Mode::Staging => "staging",
            Mode::Prod => "prod",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "training" => Ok(Mode::Training),
            "testing" | "test" => Ok(Mode::Testing),
            "staging" => Ok(Mode::Staging),
            "prod" | "production" => Ok(Mode::Prod),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Process-wide configuration for a simulation.
///
/// Keys use the camelCase names of the options (`regionSize`,
/// `foodRespawnInterval`, ...). Missing keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct SimConfig {
    /// Side of the square broadcast region.
    pub region_size: i32,
    /// Chebyshev radius of observations.
    pub vision_distance: u32,
    /// Energy paid per successful move.
    pub move_cost: u32,
    /// Energy gained per consumed food.
    pub consume_gain: u32,
    /// Energy paid per living tick.
    pub living_energy_cost: u32,
    /// Health lost per living tick at zero energy.
    pub no_energy_health_cost: u32,
    /// Energy of a new agent.
    pub initial_energy: u32,
    /// Health of a new agent.
    pub initial_health: u32,
    /// Agent steps per second.
    pub fps: u32,
    /// Food is replenished only while fewer than this many food entities exist.
    pub food_respawn_threshold: usize,
    /// Seconds between food respawn checks.
    #[serde(with = "secs")]
    pub food_respawn_interval: Duration,
    /// Placement attempts per respawn.
    pub food_spawn_batch: usize,
    /// Food lands in `[-range, range)` on both axes.
    pub food_spawn_range: i32,
    /// Deployment mode.
    pub mode: Mode,
    /// RNG seed for food placement. Random when absent.
    pub seed: Option<u64>,
    /// Events buffered per spectator.
    pub spectator_queue_capacity: usize,
    /// Observations buffered per remote model.
    pub model_queue_capacity: usize,
    /// Enforced world square, if any.
    pub bounds: Option<WorldBounds>,
    /// Mirror every entity into the ordered-set keyspace.
    pub keyspace_mirror: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            region_size: 16,
            vision_distance: 1,
            move_cost: 4,
            consume_gain: 10,
            living_energy_cost: 2,
            no_energy_health_cost: 10,
            initial_energy: 100,
            initial_health: 100,
            fps: 5,
            food_respawn_threshold: 200,
            food_respawn_interval: Duration::from_secs(60),
            food_spawn_batch: 200,
            food_spawn_range: 25,
            mode: Mode::Training,
            seed: None,
            spectator_queue_capacity: 100,
            model_queue_capacity: 100,
            bounds: None,
            keyspace_mirror: false,
        }
    }
}

impl SimConfig {
    /// Parse a TOML document. Unset keys keep their defaults.
    pub fn from_toml_str(source: &str) -> SimResult<Self> {
        let config: SimConfig = toml::from_str(source).map_err(|e| SimError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> SimResult<Self> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| SimError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Reject configurations the simulation cannot run with.
    pub fn validate(&self) -> SimResult<()> {
        let fail = |msg: &str| Err(SimError::Config(msg.to_string()));
        if self.region_size <= 0 {
            return fail("regionSize must be positive");
        }
        if self.vision_distance == 0 {
            return fail("visionDistance must be at least 1");
        }
        if self.fps == 0 {
            return fail("fps must be positive");
        }
        if self.food_spawn_range <= 0 {
            return fail("foodSpawnRange must be positive");
        }
        if self.initial_energy == 0 || self.initial_health == 0 {
            return fail("initialEnergy and initialHealth must be positive");
        }
        if self.spectator_queue_capacity == 0 || self.model_queue_capacity == 0 {
            return fail("queue capacities must be positive");
        }
        if self.food_respawn_interval.is_zero() {
            return fail("foodRespawnInterval must be positive");
        }
        if let Some(bounds) = self.bounds {
            if bounds.min > bounds.max {
                return fail("bounds.min must not exceed bounds.max");
            }
        }
        if self.keyspace_mirror && self.bounds.is_none() {
            return fail("keyspaceMirror requires bounds");
        }
        Ok(())
    }

    /// World-engine rules derived from this configuration.
    pub fn rules(&self) -> WorldRules {
        WorldRules {
            region_size: self.region_size,
            vision_distance: self.vision_distance,
            move_cost: self.move_cost,
            consume_gain: self.consume_gain,
            living_energy_cost: self.living_energy_cost,
            no_energy_health_cost: self.no_energy_health_cost,
            initial_energy: self.initial_energy,
            initial_health: self.initial_health,
            bounds: self.bounds,
        }
    }

    /// Period of the agent step, `1000 / fps` milliseconds.
    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.fps.max(1)))
    }

    /// Set the deployment mode.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the RNG seed for deterministic food placement.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the broadcast region size.
    pub fn with_region_size(mut self, size: i32) -> Self {
        self.region_size = size;
        self
    }

    /// Set the observation radius.
    pub fn with_vision_distance(mut self, distance: u32) -> Self {
        self.vision_distance = distance;
        self
    }

    /// Set the agent step rate.
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Set how many food placements each respawn attempts.
    pub fn with_food_spawn_batch(mut self, batch: usize) -> Self {
        self.food_spawn_batch = batch;
        self
    }

    /// Set the food count below which food respawns.
    pub fn with_food_respawn_threshold(mut self, threshold: usize) -> Self {
        self.food_respawn_threshold = threshold;
        self
    }

    /// Set the time between respawn checks.
    pub fn with_food_respawn_interval(mut self, interval: Duration) -> Self {
        self.food_respawn_interval = interval;
        self
    }

    /// Set the half side of the food placement square.
    pub fn with_food_spawn_range(mut self, range: i32) -> Self {
        self.food_spawn_range = range;
        self
    }

    /// Set both queue capacities.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.spectator_queue_capacity = capacity;
        self.model_queue_capacity = capacity;
        self
    }

    /// Enforce a world square.
    pub fn with_bounds(mut self, bounds: WorldBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Toggle the keyspace mirror. Requires bounds.
    pub fn with_keyspace_mirror(mut self, enabled: bool) -> Self {
        self.keyspace_mirror = enabled;
        self
    }
}
