use serde::{Deserialize, Serialize};
use tr_core::{Position, WorldError};
use tr_simulation::SimError;

/// Alias for `Result<T, GatewayError>`.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Transport-neutral status reported with every failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    /// Unknown entity or spectator.
    NotFound,
    /// Cell taken or session already live.
    AlreadyExists,
    /// Malformed or unusable request.
    InvalidArgument,
    /// No usable credentials.
    Unauthenticated,
    /// Authenticated but not allowed.
    PermissionDenied,
    /// Position outside the world.
    OutOfRange,
    /// Server-side failure.
    Internal,
}

/// Caller-visible failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The referenced entity or spectator does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The target cell is occupied.
    #[error("position taken: {0}")]
    PositionTaken(Position),

    /// Outside the enforced world square.
    #[error("invalid position: {0}")]
    InvalidPosition(Position),

    /// Missing or unrecognised credentials.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The caller does not own the model, or the operation is restricted.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A remote model or spectator with this key is already live.
    #[error("already registered: {0}")]
    AlreadyRegistered(String),

    /// Unknown direction or malformed request fields.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A failure the caller cannot fix.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// The status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::NotFound(_) => StatusCode::NotFound,
            GatewayError::PositionTaken(_) | GatewayError::AlreadyRegistered(_) => {
                StatusCode::AlreadyExists
            }
            GatewayError::InvalidPosition(_) => StatusCode::OutOfRange,
            GatewayError::Unauthenticated(_) => StatusCode::Unauthenticated,
            GatewayError::PermissionDenied(_) => StatusCode::PermissionDenied,
            GatewayError::InvalidArgument(_) => StatusCode::InvalidArgument,
            GatewayError::Internal(_) => StatusCode::Internal,
        }
    }
}

impl From<WorldError> for GatewayError {
    fn from(err: WorldError) -> Self {
        match err {
            WorldError::NotFound(id) => GatewayError::NotFound(format!("entity {id}")),
            WorldError::PositionTaken(pos) => GatewayError::PositionTaken(pos),
            WorldError::InvalidPosition(pos) => GatewayError::InvalidPosition(pos),
            other @ (WorldError::Integrity(_) | WorldError::MalformedRecord(_)) => {
                GatewayError::Internal(other.to_string())
            }
        }
    }
}

impl From<SimError> for GatewayError {
    fn from(err: SimError) -> Self {
        match err {
            SimError::World(err) => err.into(),
            err @ SimError::NotAnAgent(_) => GatewayError::InvalidArgument(err.to_string()),
            SimError::SpectatorNotFound(id) => GatewayError::NotFound(format!("spectator {id}")),
            SimError::SpectatorExists(id) => GatewayError::AlreadyRegistered(format!("spectator {id}")),
            SimError::AlreadyRegistered { owner, model } => {
                GatewayError::AlreadyRegistered(format!("model {owner}/{model}"))
            }
            SimError::Config(msg) => GatewayError::Internal(msg),
        }
    }
}
