//! Core types for Terrarium: positions, entities, and the grid world engine.
//!
//! A [`World`] owns the entity store and the grid index and is the only place
//! where entities are created, moved, or destroyed. Every change of cell
//! occupancy is reported to the [`CellObserver`] handed to the world at
//! construction; the world itself knows nothing about who listens.

/// Entity types, identifiers, and classes.
pub mod entity;
/// Error types used throughout the crate.
pub mod error;
/// Sparse position-to-entity index.
pub mod grid;
/// Lexicographic position keys and the ordered-set entity index.
pub mod keyspace;
/// Local neighbourhood views around a position.
pub mod observation;
/// Grid coordinates, regions, bounds, and directions.
pub mod position;
/// Authoritative id-to-entity storage.
pub mod store;
/// The world engine: rules, operations, and the cell-update callback.
pub mod world;

/// Re-export core entity types.
pub use entity::{Entity, EntityClass, EntityId};
/// Re-export error types.
pub use error::{WorldError, WorldResult};
/// Re-export observation types.
pub use observation::{Observation, ObservedCell};
/// Re-export coordinate types.
pub use position::{Direction, Position, Region, WorldBounds};
/// Re-export world engine types.
pub use world::{CellObserver, NullObserver, World, WorldRules};
