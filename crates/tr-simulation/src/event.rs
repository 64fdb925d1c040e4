use serde::{Deserialize, Serialize};
use tr_core::{Entity, EntityClass, EntityId, Position};

/// The occupant reported in a cell update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    /// The occupying entity.
    pub id: EntityId,
    /// Its class.
    pub class: EntityClass,
}

impl From<&Entity> for Occupant {
    fn from(entity: &Entity) -> Self {
        Self {
            id: entity.id,
            class: entity.class,
        }
    }
}

/// A change of one cell. `occupant` is `None` when the cell was vacated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellUpdate {
    /// The cell that changed.
    pub position: Position,
    /// The new occupant, if any.
    pub occupant: Option<Occupant>,
}

impl CellUpdate {
    /// An update for `position`, vacated when `occupant` is `None`.
    pub fn new(position: Position, occupant: Option<&Entity>) -> Self {
        Self {
            position,
            occupant: occupant.map(Occupant::from),
        }
    }
}

/// World-wide notices sent to every spectator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerAction {
    /// The world was emptied; clients should drop their cached cells.
    Reset,
}

/// Everything a spectator can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpectateEvent {
    /// A cell in a subscribed region changed.
    CellUpdate(CellUpdate),
    /// A world-wide notice.
    ServerAction {
        /// The notice.
        action: ServerAction,
    },
}

impl SpectateEvent {
    /// The cell update carried, if this is one.
    pub fn as_cell_update(&self) -> Option<&CellUpdate> {
        match self {
            SpectateEvent::CellUpdate(update) => Some(update),
            SpectateEvent::ServerAction { .. } => None,
        }
    }
}
