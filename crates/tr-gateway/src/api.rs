//! Request and response messages of the environment service.

use serde::{Deserialize, Serialize};
use tr_core::{Entity, EntityClass, EntityId, Position, Region};

/// Spawn an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntityRequest {
    /// Class of the new entity.
    pub class: EntityClass,
    /// Must be free.
    pub position: Position,
    /// Required for agents.
    #[serde(default)]
    pub model_name: Option<String>,
}

/// Reply to [`CreateEntityRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEntityResponse {
    /// Id of the new entity.
    pub id: EntityId,
}

/// Address one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityIdRequest {
    /// The entity addressed.
    pub id: EntityId,
}

/// Reply to a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteEntityResponse {
    /// 0 or 1.
    pub deleted: u32,
}

/// One agent action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteAgentActionRequest {
    /// The acting agent.
    pub id: EntityId,
    /// `MOVE` or `CONSUME`; anything else is answered as unsuccessful.
    pub action: String,
    /// `UP`, `DOWN`, `LEFT` or `RIGHT`.
    pub direction: String,
}

/// Address one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRequest {
    /// The region addressed.
    pub region: Region,
}

/// A list of entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitiesResponse {
    /// In no particular order.
    pub entities: Vec<Entity>,
}

/// Reply to a world reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetWorldResponse {
    /// Number of entities removed.
    pub removed: usize,
}

/// Reply to a manual step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepWorldResponse {
    /// Agent steps completed so far.
    pub step: u64,
}

/// Create a spectator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectatorRequest {
    /// Caller-chosen, unique among live spectators.
    pub spectator_id: String,
}

/// Subscribe or unsubscribe a spectator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    /// The spectator addressed.
    pub spectator_id: String,
    /// The region addressed.
    pub region: Region,
}

/// Reply to a subscribe or unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    /// `false` when the subscription already was in the requested state.
    pub success: bool,
}

/// Open a remote model session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRemoteModelRequest {
    /// Falls back to the `model-name` metadata header.
    #[serde(default)]
    pub model_name: Option<String>,
}
