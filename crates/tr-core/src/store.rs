use std::collections::{BTreeSet, HashMap};

use crate::entity::{Entity, EntityClass, EntityId};
use crate::error::{WorldError, WorldResult};

/// Authoritative entity records plus the agent index.
#[derive(Debug, Clone)]
pub struct EntityStore {
    next_id: u64,
    entities: HashMap<EntityId, Entity>,
    agents: BTreeSet<EntityId>,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self {
            next_id: 1,
            entities: HashMap::new(),
            agents: BTreeSet::new(),
        }
    }
}

impl EntityStore {
    /// An empty store whose first id is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next id. Ids are never reused, even after `clear`.
    pub fn allocate_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Insert an entity under its id. A duplicate id is an integrity error.
    pub fn insert(&mut self, entity: Entity) -> WorldResult<()> {
        if self.entities.contains_key(&entity.id) {
            return Err(WorldError::Integrity(format!(
                "entity {} inserted twice",
                entity.id
            )));
        }
        if entity.class == EntityClass::Agent {
            self.agents.insert(entity.id);
        }
        self.entities.insert(entity.id, entity);
        Ok(())
    }

    /// The entity stored under `id`.
    pub fn lookup(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub(crate) fn lookup_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Remove an entity. Removing an id that is not present is an error.
    pub fn remove(&mut self, id: EntityId) -> WorldResult<Entity> {
        let entity = self.entities.remove(&id).ok_or(WorldError::NotFound(id))?;
        self.agents.remove(&id);
        Ok(entity)
    }

    /// Agent ids in ascending order.
    pub fn agents(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.agents.iter().copied()
    }

    /// Number of agents.
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Every entity, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the store holds no entity.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Drop every record and return them in id order.
    pub fn drain(&mut self) -> Vec<Entity> {
        self.agents.clear();
        let mut drained: Vec<Entity> = self.entities.drain().map(|(_, e)| e).collect();
        drained.sort_by_key(|e| e.id);
        drained
    }
}
