use std::sync::Arc;

use tracing::{info, warn};
use tr_core::{Direction, Entity, EntityClass, Observation};
use tr_simulation::{ActionOutcome, ActionVerb, Mode, SharedSimulation};

use crate::api::{
    ConnectRemoteModelRequest, CreateEntityRequest, CreateEntityResponse, DeleteEntityResponse,
    EntitiesResponse, EntityIdRequest, ExecuteAgentActionRequest, RegionRequest,
    ResetWorldResponse, SpectatorRequest, StepWorldResponse, SubscriptionRequest,
    SubscriptionResponse,
};
use crate::error::{GatewayError, GatewayResult};
use crate::identity::{Identity, IdentityProvider, MODEL_NAME_HEADER, Metadata, provider_for};
use crate::stream::{ModelStream, SpectatorStream};

/// The environment service: authenticates each call, applies the mode's
/// restrictions, and turns the request into one simulation operation.
#[derive(Debug, Clone)]
pub struct EnvironmentService {
    sim: SharedSimulation,
    identity: Arc<dyn IdentityProvider>,
    mode: Mode,
}

impl EnvironmentService {
    /// A service using the identity backend that matches `mode`.
    pub fn new(sim: SharedSimulation, mode: Mode) -> Self {
        Self::with_identity(sim, mode, provider_for(mode))
    }

    /// A service with an explicit identity backend.
    pub fn with_identity(sim: SharedSimulation, mode: Mode, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { sim, identity, mode }
    }

    /// The simulation this service drives.
    pub fn simulation(&self) -> &SharedSimulation {
        &self.sim
    }

    /// The deployment mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    fn authenticate(&self, metadata: &Metadata) -> GatewayResult<Identity> {
        self.identity.authenticate(metadata)
    }

    /// In prod, `action` is reserved for administrators.
    fn require_admin_in_prod(&self, caller: &Identity, action: &str) -> GatewayResult<()> {
        if self.mode == Mode::Prod && !caller.is_admin() {
            return Err(GatewayError::PermissionDenied(format!(
                "{action} is restricted in prod"
            )));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    /// Create an entity. Agents need a model name, and in prod that model
    /// must be connected by the caller.
    pub async fn create_entity(
        &self,
        metadata: &Metadata,
        req: CreateEntityRequest,
    ) -> GatewayResult<CreateEntityResponse> {
        let caller = self.authenticate(metadata)?;
        let model_name = req.model_name.unwrap_or_default();
        if req.class == EntityClass::Agent && model_name.is_empty() {
            return Err(GatewayError::InvalidArgument(
                "agents need a model name".to_string(),
            ));
        }
        if req.class != EntityClass::Agent {
            self.require_admin_in_prod(&caller, "creating non-agent entities")?;
        }

        let mut sim = self.sim.lock().await;
        if req.class == EntityClass::Agent
            && self.mode.enforces_model_ownership()
            && !sim.models().is_registered(&caller.user_id, &model_name)
        {
            return Err(GatewayError::PermissionDenied(format!(
                "model {model_name} is not connected for this caller"
            )));
        }
        let entity = sim.create_entity(req.class, &caller.user_id, &model_name, req.position)?;
        Ok(CreateEntityResponse { id: entity.id })
    }

    /// Fetch one entity.
    pub async fn get_entity(
        &self,
        metadata: &Metadata,
        req: EntityIdRequest,
    ) -> GatewayResult<Entity> {
        self.authenticate(metadata)?;
        let sim = self.sim.lock().await;
        sim.get_entity(req.id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("entity {}", req.id)))
    }

    /// Delete an entity. Missing ids delete nothing.
    pub async fn delete_entity(
        &self,
        metadata: &Metadata,
        req: EntityIdRequest,
    ) -> GatewayResult<DeleteEntityResponse> {
        let caller = self.authenticate(metadata)?;
        self.require_admin_in_prod(&caller, "deleting entities")?;
        let deleted = self.sim.lock().await.delete_entity(req.id);
        Ok(DeleteEntityResponse {
            deleted: u32::from(deleted),
        })
    }

    /// Entities inside one region.
    pub async fn get_entities_in_region(
        &self,
        metadata: &Metadata,
        req: RegionRequest,
    ) -> GatewayResult<EntitiesResponse> {
        self.authenticate(metadata)?;
        let entities = self.sim.lock().await.entities_in_region(req.region);
        Ok(EntitiesResponse { entities })
    }

    // -----------------------------------------------------------------------
    // Agents
    // -----------------------------------------------------------------------

    /// Resolve a `MOVE` or `CONSUME` towards a direction. Refused actions and
    /// unknown verbs come back unsuccessful, not as errors.
    pub async fn execute_agent_action(
        &self,
        metadata: &Metadata,
        req: ExecuteAgentActionRequest,
    ) -> GatewayResult<ActionOutcome> {
        let caller = self.authenticate(metadata)?;
        let direction: Direction = req.direction.parse().map_err(GatewayError::InvalidArgument)?;
        let verb = ActionVerb::parse(&req.action);

        let mut sim = self.sim.lock().await;
        let owner = sim
            .get_entity(req.id)
            .map(|e| e.owner_id.clone())
            .ok_or_else(|| GatewayError::NotFound(format!("entity {}", req.id)))?;
        if self.mode.enforces_model_ownership() && owner != caller.user_id {
            return Err(GatewayError::PermissionDenied(format!(
                "entity {} belongs to another user",
                req.id
            )));
        }
        Ok(sim.execute_action(req.id, &verb, direction)?)
    }

    /// Peek at an agent's observation. Missing agents read as dead.
    pub async fn get_agent_observation(
        &self,
        metadata: &Metadata,
        req: EntityIdRequest,
    ) -> GatewayResult<Observation> {
        self.authenticate(metadata)?;
        if !self.mode.allows_debug_operations() {
            return Err(GatewayError::PermissionDenied(format!(
                "observations are not available in {} mode",
                self.mode
            )));
        }
        Ok(self.sim.lock().await.observe(req.id))
    }

    // -----------------------------------------------------------------------
    // World
    // -----------------------------------------------------------------------

    /// Empty the world and reseed food. Spectators are told to reset.
    pub async fn reset_world(&self, metadata: &Metadata) -> GatewayResult<ResetWorldResponse> {
        let caller = self.authenticate(metadata)?;
        self.require_admin_in_prod(&caller, "resetting the world")?;
        let removed = self.sim.lock().await.reset();
        info!(caller = %caller.user_id, removed, "world reset requested");
        Ok(ResetWorldResponse { removed })
    }

    /// Run one agent step immediately.
    pub async fn step_world(&self, metadata: &Metadata) -> GatewayResult<StepWorldResponse> {
        let caller = self.authenticate(metadata)?;
        if !self.mode.allows_debug_operations() {
            self.require_admin_in_prod(&caller, "stepping the world")?;
        }
        let mut sim = self.sim.lock().await;
        sim.step_agents()?;
        Ok(StepWorldResponse {
            step: sim.agent_steps(),
        })
    }

    // -----------------------------------------------------------------------
    // Spectators
    // -----------------------------------------------------------------------

    /// Register a spectator and return its event stream.
    pub async fn create_spectator(
        &self,
        metadata: &Metadata,
        req: SpectatorRequest,
    ) -> GatewayResult<SpectatorStream> {
        self.authenticate(metadata)?;
        if req.spectator_id.is_empty() {
            return Err(GatewayError::InvalidArgument(
                "spectator id must not be empty".to_string(),
            ));
        }
        let receiver = self.sim.lock().await.add_spectator(&req.spectator_id)?;
        Ok(SpectatorStream::new(req.spectator_id, receiver, self.sim.clone()))
    }

    /// Subscribe a spectator and send it the region's occupied cells.
    pub async fn subscribe_spectator_to_region(
        &self,
        metadata: &Metadata,
        req: SubscriptionRequest,
    ) -> GatewayResult<SubscriptionResponse> {
        self.authenticate(metadata)?;
        let success = self
            .sim
            .lock()
            .await
            .subscribe_spectator(&req.spectator_id, req.region)?;
        Ok(SubscriptionResponse { success })
    }

    /// Drop one region subscription.
    pub async fn unsubscribe_spectator_from_region(
        &self,
        metadata: &Metadata,
        req: SubscriptionRequest,
    ) -> GatewayResult<SubscriptionResponse> {
        self.authenticate(metadata)?;
        let success = self
            .sim
            .lock()
            .await
            .unsubscribe_spectator(&req.spectator_id, req.region)?;
        Ok(SubscriptionResponse { success })
    }

    // -----------------------------------------------------------------------
    // Remote models
    // -----------------------------------------------------------------------

    /// Open the caller's session for a model and return its observation
    /// stream.
    pub async fn connect_remote_model(
        &self,
        metadata: &Metadata,
        req: ConnectRemoteModelRequest,
    ) -> GatewayResult<ModelStream> {
        let caller = self.authenticate(metadata)?;
        let model_name = req
            .model_name
            .filter(|name| !name.is_empty())
            .or_else(|| metadata.get(MODEL_NAME_HEADER).map(str::to_string))
            .filter(|name| !name.is_empty())
            .ok_or_else(|| GatewayError::InvalidArgument("missing model name".to_string()))?;
        if model_name.contains(':') {
            warn!(model = %model_name, "rejected model name");
            return Err(GatewayError::InvalidArgument(
                "model name must not contain ':'".to_string(),
            ));
        }
        let connection = self
            .sim
            .lock()
            .await
            .register_model(&caller.user_id, &model_name)?;
        Ok(ModelStream::new(connection, self.sim.clone()))
    }
}
