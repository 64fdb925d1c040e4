use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};
use tr_core::Observation;
use uuid::Uuid;

use crate::error::{SimError, SimResult};

/// Identifies a live remote model: the owning user plus the model's name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelKey {
    /// The owning user.
    pub owner_id: String,
    /// The model's name, unique per owner.
    pub model_name: String,
}

impl ModelKey {
    /// A key for `owner_id`'s model `model_name`.
    pub fn new(owner_id: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            model_name: model_name.into(),
        }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner_id, self.model_name)
    }
}

/// The consumer side of a registration: the observation queue and the
/// token that must be presented to deregister.
#[derive(Debug)]
pub struct ModelConnection {
    /// Owner and model name.
    pub key: ModelKey,
    /// Presented on deregistration.
    pub token: Uuid,
    /// Observations for this session.
    pub receiver: mpsc::Receiver<Observation>,
}

#[derive(Debug)]
struct ModelEntry {
    queue: mpsc::Sender<Observation>,
    token: Uuid,
    connected_at: DateTime<Utc>,
    dropped: u64,
}

/// Live remote-model sessions keyed by `(owner, model name)`.
#[derive(Debug)]
pub struct ModelRegistry {
    capacity: usize,
    models: HashMap<ModelKey, ModelEntry>,
}

impl ModelRegistry {
    /// An empty registry whose queues hold `capacity` observations.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            models: HashMap::new(),
        }
    }

    /// Open a session. Only one session per `(owner, model name)` may be live.
    pub fn register(&mut self, owner_id: &str, model_name: &str) -> SimResult<ModelConnection> {
        let key = ModelKey::new(owner_id, model_name);
        if self.models.contains_key(&key) {
            return Err(SimError::AlreadyRegistered {
                owner: key.owner_id,
                model: key.model_name,
            });
        }
        let (queue, receiver) = mpsc::channel(self.capacity);
        let token = Uuid::new_v4();
        self.models.insert(
            key.clone(),
            ModelEntry {
                queue,
                token,
                connected_at: Utc::now(),
                dropped: 0,
            },
        );
        info!(model = %key, %token, "remote model connected");
        Ok(ModelConnection {
            key,
            token,
            receiver,
        })
    }

    /// Close a session. A token from an earlier session with the same key
    /// leaves the current one alone.
    pub fn deregister(&mut self, owner_id: &str, model_name: &str, token: Uuid) -> bool {
        let key = ModelKey::new(owner_id, model_name);
        match self.models.get(&key) {
            Some(entry) if entry.token == token => {
                if let Some(entry) = self.models.remove(&key) {
                    info!(model = %key, dropped = entry.dropped, "remote model disconnected");
                }
                true
            }
            _ => false,
        }
    }

    /// Whether a session for this model is live.
    pub fn is_registered(&self, owner_id: &str, model_name: &str) -> bool {
        self.models.contains_key(&ModelKey::new(owner_id, model_name))
    }

    /// When the live session for this model was opened.
    pub fn connected_at(&self, owner_id: &str, model_name: &str) -> Option<DateTime<Utc>> {
        self.models
            .get(&ModelKey::new(owner_id, model_name))
            .map(|e| e.connected_at)
    }

    /// Enqueue an observation without waiting. Returns whether it was queued.
    pub fn push(&mut self, owner_id: &str, model_name: &str, observation: Observation) -> bool {
        let key = ModelKey::new(owner_id, model_name);
        let Some(entry) = self.models.get_mut(&key) else {
            return false;
        };
        match entry.queue.try_send(observation) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                entry.dropped += 1;
                debug!(model = %key, dropped = entry.dropped, "model queue full, observation dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Keys of the live sessions.
    pub fn keys(&self) -> impl Iterator<Item = &ModelKey> {
        self.models.keys()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tr_core::EntityId;

    #[test]
    fn register_rejects_duplicates() {
        let mut registry = ModelRegistry::new(10);
        let _conn = registry.register("alice", "forager").unwrap();
        let err = registry.register("alice", "forager").unwrap_err();
        assert!(matches!(err, SimError::AlreadyRegistered { .. }));
        assert!(registry.register("bob", "forager").is_ok());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn deregister_requires_matching_token() {
        let mut registry = ModelRegistry::new(10);
        let first = registry.register("alice", "forager").unwrap();
        assert!(!registry.deregister("alice", "forager", Uuid::new_v4()));
        assert!(registry.is_registered("alice", "forager"));
        assert!(registry.deregister("alice", "forager", first.token));
        assert!(!registry.is_registered("alice", "forager"));

        let second = registry.register("alice", "forager").unwrap();
        assert!(!registry.deregister("alice", "forager", first.token));
        assert!(registry.deregister("alice", "forager", second.token));
    }

    #[test]
    fn push_delivers_and_drops_when_full() {
        let mut registry = ModelRegistry::new(1);
        let mut conn = registry.register("alice", "forager").unwrap();
        assert!(registry.push("alice", "forager", Observation::dead(EntityId(1))));
        assert!(!registry.push("alice", "forager", Observation::dead(EntityId(2))));
        assert!(!registry.push("alice", "other", Observation::dead(EntityId(3))));
        assert_eq!(conn.receiver.try_recv().unwrap().id, EntityId(1));
        assert!(conn.receiver.try_recv().is_err());
    }

    #[test]
    fn connected_at_is_recorded() {
        let mut registry = ModelRegistry::new(1);
        let before = Utc::now();
        let _conn = registry.register("alice", "forager").unwrap();
        let at = registry.connected_at("alice", "forager").unwrap();
        assert!(at >= before);
        assert!(registry.connected_at("alice", "nope").is_none());
    }
}
