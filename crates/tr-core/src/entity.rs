use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::position::Position;

/// Unique identifier for every entity in a world. Ids start at 1 and only grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The class of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityClass {
    /// Controlled by a remote model; pays living cost each tick.
    Agent,
    /// Consumable; raises the consumer's energy.
    Food,
    /// Inert obstacle.
    Rock,
}

impl EntityClass {
    /// Wire id of an empty cell.
    pub const EMPTY_ID: u32 = 0;

    /// Wire id of this class (`AGENT = 1`, `ROCK = 2`, `FOOD = 3`).
    pub fn class_id(self) -> u32 {
        match self {
            EntityClass::Agent => 1,
            EntityClass::Rock => 2,
            EntityClass::Food => 3,
        }
    }

    /// Inverse of [`EntityClass::class_id`].
    pub fn from_class_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(EntityClass::Agent),
            2 => Some(EntityClass::Rock),
            3 => Some(EntityClass::Food),
            _ => None,
        }
    }
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityClass::Agent => "AGENT",
            EntityClass::Food => "FOOD",
            EntityClass::Rock => "ROCK",
        };
        write!(f, "{s}")
    }
}

impl FromStr for EntityClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AGENT" => Ok(EntityClass::Agent),
            "FOOD" => Ok(EntityClass::Food),
            "ROCK" => Ok(EntityClass::Rock),
            other => Err(format!("unknown entity class: {other}")),
        }
    }
}

/// An entity occupying exactly one cell of the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Unique and never reused.
    pub id: EntityId,
    /// Agent, rock or food.
    pub class: EntityClass,
    /// The one cell the entity occupies.
    pub position: Position,
    /// Spent by moving and living; refilled by eating.
    pub energy: u32,
    /// The entity dies when this reaches zero.
    pub health: u32,
    /// Empty for non-agent entities.
    pub owner_id: String,
    /// Empty for non-agent entities.
    pub model_name: String,
}

impl Entity {
    /// Whether this entity can act.
    pub fn is_agent(&self) -> bool {
        self.class == EntityClass::Agent
    }

    /// Whether agents can consume this entity.
    pub fn is_food(&self) -> bool {
        self.class == EntityClass::Food
    }
}
