//! Tick-driven simulation service for Terrarium.
//!
//! Wraps a [`tr_core::World`] together with the stadium (region pub/sub for
//! spectators), the remote-model registry, and the periodic systems. The
//! whole [`Simulation`] sits behind one async mutex; every request and every
//! tick holds it for the length of one operation.

/// Agent actions and their outcomes.
pub mod action;
/// Per-agent observation push and living cost.
pub mod agent_step;
/// Simulation configuration and deployment modes.
pub mod config;
/// Mutable context passed to systems during ticks.
pub mod context;
/// Error types for simulation operations.
pub mod error;
/// Events delivered to spectators.
pub mod event;
/// Food placement and the respawn system.
pub mod food;
/// Live remote-model sessions.
pub mod remote_model;
/// The locked simulation state and its operations.
pub mod simulation;
/// Cell observer that feeds the stadium and the keyspace mirror.
pub mod sink;
/// Region-scoped pub/sub for spectators.
pub mod stadium;
/// The `System` trait for periodic jobs.
pub mod system;
/// Background task driving the systems.
pub mod ticker;

#[cfg(test)]
mod test_support;

/// Re-export action types.
pub use action::{ActionOutcome, ActionVerb};
/// Re-export configuration types.
pub use config::{Mode, SimConfig};
/// Re-export error types.
pub use error::{SimError, SimResult};
/// Re-export spectator event types.
pub use event::{CellUpdate, Occupant, ServerAction, SpectateEvent};
/// Re-export remote-model types.
pub use remote_model::{ModelConnection, ModelKey, ModelRegistry};
/// Re-export the simulation handle.
pub use simulation::{SharedSimulation, Simulation};
/// Re-export the stadium.
pub use stadium::Stadium;
/// Re-export the ticker.
pub use ticker::Ticker;
