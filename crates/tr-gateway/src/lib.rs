//! The Terrarium action gateway.
//!
//! [`EnvironmentService`] is the only way into a running simulation from the
//! outside. Each call authenticates the caller from request [`Metadata`],
//! applies the restrictions of the deployment mode, and performs one
//! operation under the simulation lock. Spectator and remote-model sessions
//! come back as streams that clean up after themselves when closed.

/// Request and response messages.
pub mod api;
/// Gateway errors and status codes.
pub mod error;
/// Request metadata and identity providers.
pub mod identity;
/// The environment service.
pub mod service;
/// Spectator and remote-model streams.
pub mod stream;

/// Re-export error types.
pub use error::{GatewayError, GatewayResult, StatusCode};
/// Re-export identity types.
pub use identity::{Identity, IdentityProvider, Metadata};
/// Re-export the service.
pub use service::EnvironmentService;
/// Re-export stream types.
pub use stream::{EventSink, ModelStream, SpectatorStream, StreamEnd};
