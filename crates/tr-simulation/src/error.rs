use tr_core::{EntityId, WorldError};

/// Alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;

/// Failures inside the simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A world engine failure.
    #[error(transparent)]
    World(#[from] WorldError),

    /// Only agents can act.
    #[error("entity {0} is not an agent")]
    NotAnAgent(EntityId),

    /// No live spectator with this id.
    #[error("spectator not found: {0}")]
    SpectatorNotFound(String),

    /// A spectator with this id is already live.
    #[error("spectator already connected: {0}")]
    SpectatorExists(String),

    /// A session for this model is already live.
    #[error("remote model already registered: {owner}/{model}")]
    AlreadyRegistered {
        /// Model owner.
        owner: String,
        /// Model name.
        model: String,
    },

    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
}
