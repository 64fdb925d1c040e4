use crate::entity::EntityId;
use crate::position::Position;

/// Alias for `Result<T, WorldError>`.
pub type WorldResult<T> = Result<T, WorldError>;

/// Errors raised by the world engine and its indexes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// The requested entity does not exist.
    #[error("entity not found: {0}")]
    NotFound(EntityId),

    /// The target cell is already occupied.
    #[error("position taken: {0}")]
    PositionTaken(Position),

    /// The coordinates fall outside the supported range.
    #[error("invalid position: {0}")]
    InvalidPosition(Position),

    /// The store and the grid disagree, or an entity was removed twice.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// A serialized entity record could not be decoded.
    #[error("malformed entity record: {0}")]
    MalformedRecord(String),
}
