use serde::{Deserialize, Serialize};

use crate::entity::{EntityClass, EntityId};
use crate::grid::GridIndex;
use crate::position::{Position, WorldBounds};
use crate::store::EntityStore;

/// What an observer sees in one neighbouring cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObservedCell {
    /// Nothing there.
    Empty,
    /// An entity and its class.
    Entity {
        /// The observed entity.
        id: EntityId,
        /// Its class.
        class: EntityClass,
    },
    /// Outside the world bounds; reported to clients as a rock.
    OutOfBounds,
}

impl ObservedCell {
    /// The class seen, if any.
    pub fn class(&self) -> Option<EntityClass> {
        match self {
            ObservedCell::Empty => None,
            ObservedCell::Entity { class, .. } => Some(*class),
            ObservedCell::OutOfBounds => Some(EntityClass::Rock),
        }
    }

    /// Wire class id; `0` for an empty cell.
    pub fn class_id(&self) -> u32 {
        self.class()
            .map_or(EntityClass::EMPTY_ID, EntityClass::class_id)
    }

    /// The id of the entity seen, if any.
    pub fn entity_id(&self) -> Option<EntityId> {
        match self {
            ObservedCell::Entity { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// An agent's local view plus its vital stats at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    /// The observing agent.
    pub id: EntityId,
    /// `false` in the dead observation, which carries no cells.
    pub is_alive: bool,
    /// Row-major window of side `2 * vision + 1`, centred on the agent.
    pub cells: Vec<ObservedCell>,
    /// Agent energy at snapshot time.
    pub energy: u32,
    /// Agent health at snapshot time.
    pub health: u32,
}

impl Observation {
    /// The observation returned for an agent that no longer exists.
    pub fn dead(id: EntityId) -> Self {
        Self {
            id,
            is_alive: false,
            cells: Vec::new(),
            energy: 0,
            health: 0,
        }
    }
}

/// Positions around `center` within Chebyshev radius `distance`, scanned row
/// by row from `y + d` down to `y - d`, each row from `x - d` to `x + d`,
/// skipping the center. `None` marks a coordinate that would overflow.
pub fn neighbourhood(center: Position, distance: u32) -> impl Iterator<Item = Option<Position>> {
    let d = i64::from(distance);
    (-d..=d).rev().flat_map(move |dy| {
        (-d..=d).filter_map(move |dx| {
            if dx == 0 && dy == 0 {
                return None;
            }
            let x = i32::try_from(i64::from(center.x) + dx).ok();
            let y = i32::try_from(i64::from(center.y) + dy).ok();
            Some(x.zip(y).map(|(x, y)| Position::new(x, y)))
        })
    })
}

/// Build the ordered cell list seen from `center`.
pub fn observe_cells(
    grid: &GridIndex,
    store: &EntityStore,
    center: Position,
    distance: u32,
    bounds: Option<&WorldBounds>,
) -> Vec<ObservedCell> {
    neighbourhood(center, distance)
        .map(|pos| {
            let Some(pos) = pos else {
                return ObservedCell::OutOfBounds;
            };
            if bounds.is_some_and(|b| !b.contains(pos)) {
                return ObservedCell::OutOfBounds;
            }
            grid.get(pos)
                .and_then(|id| store.lookup(id))
                .map_or(ObservedCell::Empty, |e| ObservedCell::Entity {
                    id: e.id,
                    class: e.class,
                })
        })
        .collect()
}
