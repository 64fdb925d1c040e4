use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::entity::{Entity, EntityClass, EntityId};
use crate::error::{WorldError, WorldResult};
use crate::grid::GridIndex;
use crate::observation::{Observation, ObservedCell, observe_cells};
use crate::position::{Position, Region, WorldBounds};
use crate::store::EntityStore;

/// Receives every change of cell occupancy made by a [`World`].
///
/// Callbacks run synchronously inside the mutating operation, after the
/// change is committed, so their order matches the order of mutations.
pub trait CellObserver {
    /// `occupant` is `None` when the cell was vacated.
    fn on_cell_update(&mut self, position: Position, occupant: Option<&Entity>);

    /// Called when an entity's energy or health changed without it moving.
    fn on_vitals_changed(&mut self, _entity: &Entity) {}
}

/// Observer that ignores every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl CellObserver for NullObserver {
    fn on_cell_update(&mut self, _position: Position, _occupant: Option<&Entity>) {}
}

/// Costs, gains, and limits applied by the world engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldRules {
    /// Side of the square broadcast region.
    pub region_size: i32,
    /// Chebyshev radius of observations.
    pub vision_distance: u32,
    /// Energy paid per successful move.
    pub move_cost: u32,
    /// Energy gained per consumed food.
    pub consume_gain: u32,
    /// Energy paid per living tick.
    pub living_energy_cost: u32,
    /// Health lost per living tick at zero energy.
    pub no_energy_health_cost: u32,
    /// Energy of a new agent, and the cap for consumption.
    pub initial_energy: u32,
    /// Health of a new agent.
    pub initial_health: u32,
    /// When set, creation and movement outside the square are refused.
    pub bounds: Option<WorldBounds>,
}

impl Default for WorldRules {
    fn default() -> Self {
        Self {
            region_size: 16,
            vision_distance: 1,
            move_cost: 4,
            consume_gain: 10,
            living_energy_cost: 2,
            no_energy_health_cost: 10,
            initial_energy: 100,
            initial_health: 100,
            bounds: None,
        }
    }
}

impl WorldRules {
    /// Set the region side.
    pub fn with_region_size(mut self, size: i32) -> Self {
        self.region_size = size;
        self
    }

    /// Set the observation radius.
    pub fn with_vision_distance(mut self, distance: u32) -> Self {
        self.vision_distance = distance;
        self
    }

    /// Enforce `bounds` on creation and movement.
    pub fn with_bounds(mut self, bounds: WorldBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    fn in_bounds(&self, pos: Position) -> bool {
        self.bounds.is_none_or(|b| b.contains(pos))
    }
}

/// The grid world. Owns the entity store, the grid index, and the observer.
#[derive(Debug)]
pub struct World<O = NullObserver> {
    rules: WorldRules,
    store: EntityStore,
    grid: GridIndex,
    food_count: usize,
    observer: O,
}

impl World<NullObserver> {
    /// A world whose cell updates go nowhere.
    pub fn new(rules: WorldRules) -> Self {
        Self::with_observer(rules, NullObserver)
    }
}

impl<O: CellObserver> World<O> {
    /// A world reporting every cell change to `observer`.
    pub fn with_observer(rules: WorldRules, observer: O) -> Self {
        Self {
            rules,
            store: EntityStore::new(),
            grid: GridIndex::new(),
            food_count: 0,
            observer,
        }
    }

    /// The rules this world was built with.
    pub fn rules(&self) -> &WorldRules {
        &self.rules
    }

    /// The cell observer.
    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// The cell observer, mutably.
    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Look up an entity by id.
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.store.lookup(id)
    }

    /// The entity on `pos`, if any.
    pub fn entity_at(&self, pos: Position) -> Option<&Entity> {
        self.grid.get(pos).and_then(|id| self.store.lookup(id))
    }

    /// Whether any entity stands on `pos`.
    pub fn occupied(&self, pos: Position) -> bool {
        self.grid.occupied(pos)
    }

    /// Snapshot of the agent ids, ascending.
    pub fn agents(&self) -> Vec<EntityId> {
        self.store.agents().collect()
    }

    /// Food entities currently in the world.
    pub fn food_count(&self) -> usize {
        self.food_count
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the world holds no entity.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Every entity, in no particular order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.store.iter()
    }

    /// Every entity inside `region`.
    pub fn entities_in_region(&self, region: Region) -> Vec<&Entity> {
        self.grid
            .scan_region(region, self.rules.region_size)
            .into_iter()
            .filter_map(|(_, id)| self.store.lookup(id))
            .collect()
    }

    /// The ordered neighbourhood around `center`.
    pub fn observation_at(&self, center: Position) -> Vec<ObservedCell> {
        observe_cells(
            &self.grid,
            &self.store,
            center,
            self.rules.vision_distance,
            self.rules.bounds.as_ref(),
        )
    }

    /// The full observation for an entity, or `None` if it does not exist.
    pub fn observe(&self, id: EntityId) -> Option<Observation> {
        let entity = self.store.lookup(id)?;
        Some(Observation {
            id,
            is_alive: true,
            cells: self.observation_at(entity.position),
            energy: entity.energy,
            health: entity.health,
        })
    }

    // -----------------------------------------------------------------------
    // Entity lifecycle
    // -----------------------------------------------------------------------

    /// Create an entity with full energy and health on an empty cell.
    ///
    /// Owner and model are only kept for agents.
    pub fn create_entity(
        &mut self,
        class: EntityClass,
        owner_id: impl Into<String>,
        model_name: impl Into<String>,
        position: Position,
    ) -> WorldResult<Entity> {
        if !self.rules.in_bounds(position) {
            return Err(WorldError::InvalidPosition(position));
        }
        if self.grid.occupied(position) {
            return Err(WorldError::PositionTaken(position));
        }

        let (owner_id, model_name) = if class == EntityClass::Agent {
            (owner_id.into(), model_name.into())
        } else {
            (String::new(), String::new())
        };
        let entity = Entity {
            id: self.store.allocate_id(),
            class,
            position,
            energy: self.rules.initial_energy,
            health: self.rules.initial_health,
            owner_id,
            model_name,
        };

        self.grid.place(position, entity.id)?;
        self.store.insert(entity.clone())?;
        if class == EntityClass::Food {
            self.food_count += 1;
        }
        self.observer.on_cell_update(position, Some(&entity));
        Ok(entity)
    }

    /// Delete an entity. Returns `false` if it does not exist.
    pub fn delete_entity(&mut self, id: EntityId) -> bool {
        self.remove_entity(id).is_ok()
    }

    /// Remove an entity and return its final record.
    pub fn remove_entity(&mut self, id: EntityId) -> WorldResult<Entity> {
        let entity = self.store.remove(id)?;
        match self.grid.remove(entity.position) {
            Some(found) if found == id => {}
            other => {
                warn!(entity = %id, position = %entity.position, ?other, "grid out of sync on removal");
            }
        }
        if entity.class == EntityClass::Food {
            self.food_count = self.food_count.saturating_sub(1);
        }
        self.observer.on_cell_update(entity.position, None);
        Ok(entity)
    }

    /// Remove every entity, emitting a vacate update for each. Returns how
    /// many were removed. Ids keep counting up afterwards.
    pub fn clear(&mut self) -> usize {
        let removed = self.store.drain();
        self.grid.clear();
        self.food_count = 0;
        for entity in &removed {
            self.observer.on_cell_update(entity.position, None);
        }
        removed.len()
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    /// Move an entity onto an empty cell, paying the move cost.
    ///
    /// Observers see the vacate update before the arrival update. A refused
    /// move changes nothing and costs nothing.
    pub fn entity_move(&mut self, id: EntityId, target: Position) -> bool {
        let Some(origin) = self.store.lookup(id).map(|e| e.position) else {
            return false;
        };
        if !self.rules.in_bounds(target) || self.grid.place(target, id).is_err() {
            return false;
        }

        self.observer.on_cell_update(origin, None);
        self.grid.remove(origin);

        let move_cost = self.rules.move_cost;
        let Some(entity) = self.store.lookup_mut(id) else {
            self.grid.remove(target);
            return false;
        };
        entity.position = target;
        entity.energy = entity.energy.saturating_sub(move_cost);
        self.observer.on_cell_update(target, Some(&*entity));
        true
    }

    /// Eat the food on `target`, gaining energy up to the initial maximum.
    pub fn entity_consume(&mut self, id: EntityId, target: Position) -> bool {
        if self.store.lookup(id).is_none() {
            return false;
        }
        let Some(food_id) = self.entity_at(target).filter(|e| e.is_food()).map(|e| e.id) else {
            return false;
        };
        if self.remove_entity(food_id).is_err() {
            return false;
        }

        let (gain, cap) = (self.rules.consume_gain, self.rules.initial_energy);
        let Some(entity) = self.store.lookup_mut(id) else {
            return false;
        };
        entity.energy = entity.energy.saturating_add(gain).min(cap);
        self.observer.on_vitals_changed(entity);
        true
    }

    /// Charge one tick of living cost. Returns whether the entity survived.
    ///
    /// An entity without energy loses health instead; at zero health it is
    /// removed from the world.
    pub fn living_cost(&mut self, id: EntityId) -> bool {
        let (energy_cost, health_cost) = (
            self.rules.living_energy_cost,
            self.rules.no_energy_health_cost,
        );
        let Some(entity) = self.store.lookup_mut(id) else {
            return false;
        };
        if entity.energy == 0 {
            entity.health = entity.health.saturating_sub(health_cost);
        }
        if entity.health == 0 {
            debug!(entity = %id, position = %entity.position, "entity died of starvation");
            return match self.remove_entity(id) {
                Ok(_) => false,
                Err(err) => {
                    warn!(entity = %id, %err, "failed to remove dead entity");
                    false
                }
            };
        }
        entity.energy = entity.energy.saturating_sub(energy_cost);
        self.observer.on_vitals_changed(entity);
        true
    }

    // -----------------------------------------------------------------------
    // Integrity
    // -----------------------------------------------------------------------

    /// Check that the store, grid, agent index, and food counter agree and
    /// that every entity's vitals are within bounds.
    pub fn verify_integrity(&self) -> WorldResult<()> {
        if self.grid.len() != self.store.len() {
            return Err(WorldError::Integrity(format!(
                "grid has {} cells, store has {} entities",
                self.grid.len(),
                self.store.len()
            )));
        }
        let mut food = 0;
        let mut agents = BTreeSet::new();
        for entity in self.store.iter() {
            if self.grid.get(entity.position) != Some(entity.id) {
                return Err(WorldError::Integrity(format!(
                    "entity {} not indexed at {}",
                    entity.id, entity.position
                )));
            }
            if entity.energy > self.rules.initial_energy || entity.health > self.rules.initial_health {
                return Err(WorldError::Integrity(format!(
                    "entity {} vitals out of range",
                    entity.id
                )));
            }
            match entity.class {
                EntityClass::Food => food += 1,
                EntityClass::Agent => {
                    agents.insert(entity.id);
                }
                EntityClass::Rock => {}
            }
        }
        if food != self.food_count {
            return Err(WorldError::Integrity(format!(
                "food counter {} but {} food entities",
                self.food_count, food
            )));
        }
        if !agents.iter().copied().eq(self.store.agents()) {
            return Err(WorldError::Integrity("agent index mismatch".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        updates: Vec<(Position, Option<EntityId>)>,
        vitals: Vec<(EntityId, u32, u32)>,
    }

    impl CellObserver for Recorder {
        fn on_cell_update(&mut self, position: Position, occupant: Option<&Entity>) {
            self.updates.push((position, occupant.map(|e| e.id)));
        }

        fn on_vitals_changed(&mut self, entity: &Entity) {
            self.vitals.push((entity.id, entity.energy, entity.health));
        }
    }

    fn world() -> World<Recorder> {
        World::with_observer(WorldRules::default(), Recorder::default())
    }

    fn agent(world: &mut World<Recorder>, x: i32, y: i32) -> EntityId {
        world
            .create_entity(EntityClass::Agent, "owner", "model", Position::new(x, y))
            .unwrap()
            .id
    }

    fn food(world: &mut World<Recorder>, x: i32, y: i32) -> EntityId {
        world
            .create_entity(EntityClass::Food, "", "", Position::new(x, y))
            .unwrap()
            .id
    }

    #[test]
    fn create_emits_one_update() {
        let mut world = world();
        let entity = world
            .create_entity(EntityClass::Agent, "owner", "model", Position::new(1, 1))
            .unwrap();
        assert_eq!(entity.id, EntityId(1));
        assert_eq!((entity.energy, entity.health), (100, 100));
        assert_eq!(world.observer().updates, vec![(Position::new(1, 1), Some(EntityId(1)))]);
    }

    #[test]
    fn create_on_occupied_cell_fails() {
        let mut world = world();
        agent(&mut world, 1, 1);
        let err = world
            .create_entity(EntityClass::Agent, "owner", "model", Position::new(1, 1))
            .unwrap_err();
        assert_eq!(err, WorldError::PositionTaken(Position::new(1, 1)));
        assert_eq!(world.observer().updates.len(), 1);
    }

    #[test]
    fn create_outside_bounds_fails() {
        let rules = WorldRules::default().with_bounds(WorldBounds::new(0, 5));
        let mut world = World::new(rules);
        let err = world
            .create_entity(EntityClass::Rock, "", "", Position::new(6, 0))
            .unwrap_err();
        assert_eq!(err, WorldError::InvalidPosition(Position::new(6, 0)));
    }

    #[test]
    fn non_agents_drop_owner() {
        let mut world = world();
        let rock = world
            .create_entity(EntityClass::Rock, "owner", "model", Position::new(0, 0))
            .unwrap();
        assert!(rock.owner_id.is_empty());
        assert!(rock.model_name.is_empty());
        assert!(world.agents().is_empty());
    }

    #[test]
    fn delete_restores_empty_world() {
        let mut world = world();
        let id = food(&mut world, 4, 4);
        assert_eq!(world.food_count(), 1);
        assert!(world.delete_entity(id));
        assert!(!world.delete_entity(id));
        assert!(world.is_empty());
        assert_eq!(world.food_count(), 0);
        assert_eq!(world.observer().updates.last(), Some(&(Position::new(4, 4), None)));
        world.verify_integrity().unwrap();
    }

    #[test]
    fn move_emits_vacate_then_arrival() {
        let mut world = world();
        let id = agent(&mut world, 15, 0);
        world.observer_mut().updates.clear();

        assert!(world.entity_move(id, Position::new(16, 0)));
        assert_eq!(
            world.observer().updates,
            vec![(Position::new(15, 0), None), (Position::new(16, 0), Some(id))]
        );
        let moved = world.get(id).unwrap();
        assert_eq!(moved.position, Position::new(16, 0));
        assert_eq!(moved.energy, 96);
        assert_eq!(world.entity_at(Position::new(16, 0)).map(|e| e.id), Some(id));
        assert!(!world.occupied(Position::new(15, 0)));
        world.verify_integrity().unwrap();
    }

    #[test]
    fn blocked_move_costs_nothing() {
        let mut world = world();
        let id = agent(&mut world, 0, 0);
        food(&mut world, 0, 1);
        world.observer_mut().updates.clear();

        assert!(!world.entity_move(id, Position::new(0, 1)));
        let entity = world.get(id).unwrap();
        assert_eq!(entity.position, Position::new(0, 0));
        assert_eq!(entity.energy, 100);
        assert!(world.observer().updates.is_empty());
    }

    #[test]
    fn move_outside_bounds_is_refused() {
        let rules = WorldRules::default().with_bounds(WorldBounds::new(0, 3));
        let mut world = World::new(rules);
        let id = world
            .create_entity(EntityClass::Agent, "o", "m", Position::new(0, 0))
            .unwrap()
            .id;
        assert!(!world.entity_move(id, Position::new(-1, 0)));
        assert_eq!(world.get(id).unwrap().energy, 100);
    }

    #[test]
    fn move_energy_clamps_at_zero() {
        let mut world = world();
        let id = agent(&mut world, 0, 0);
        for step in 1..=30 {
            assert!(world.entity_move(id, Position::new(step, 0)));
        }
        assert_eq!(world.get(id).unwrap().energy, 0);
    }

    #[test]
    fn consume_gains_energy_and_removes_food() {
        let mut world = world();
        let id = agent(&mut world, 0, 0);
        let food_id = food(&mut world, 1, 0);
        for _ in 0..10 {
            world.living_cost(id);
        }
        assert_eq!(world.get(id).unwrap().energy, 80);
        world.observer_mut().updates.clear();

        assert!(world.entity_consume(id, Position::new(1, 0)));
        assert_eq!(world.get(id).unwrap().energy, 90);
        assert!(world.get(food_id).is_none());
        assert_eq!(world.food_count(), 0);
        assert_eq!(world.observer().updates, vec![(Position::new(1, 0), None)]);
    }

    #[test]
    fn consume_caps_energy_at_maximum() {
        let mut world = world();
        let id = agent(&mut world, 0, 0);
        food(&mut world, 1, 0);
        assert!(world.entity_consume(id, Position::new(1, 0)));
        assert_eq!(world.get(id).unwrap().energy, 100);
    }

    #[test]
    fn consume_requires_food() {
        let mut world = world();
        let id = agent(&mut world, 0, 0);
        let other = agent(&mut world, 1, 0);
        assert!(!world.entity_consume(id, Position::new(1, 0)));
        assert!(!world.entity_consume(id, Position::new(0, 1)));
        assert!(world.get(other).is_some());
    }

    #[test]
    fn living_cost_drains_energy_then_health() {
        let mut world = world();
        let id = agent(&mut world, 3, 3);
        for _ in 0..50 {
            assert!(world.living_cost(id));
        }
        let entity = world.get(id).unwrap();
        assert_eq!((entity.energy, entity.health), (0, 100));

        for _ in 0..9 {
            assert!(world.living_cost(id));
        }
        assert_eq!(world.get(id).unwrap().health, 10);
        assert!(!world.living_cost(id));
        assert!(world.get(id).is_none());
        assert_eq!(world.observer().updates.last(), Some(&(Position::new(3, 3), None)));
        assert!(!world.living_cost(id));
    }

    #[test]
    fn vitals_changes_are_reported() {
        let mut world = world();
        let id = agent(&mut world, 0, 0);
        world.living_cost(id);
        assert_eq!(world.observer().vitals, vec![(id, 98, 100)]);
    }

    #[test]
    fn clear_vacates_every_cell() {
        let mut world = world();
        agent(&mut world, 0, 0);
        food(&mut world, 1, 1);
        world.observer_mut().updates.clear();

        assert_eq!(world.clear(), 2);
        assert!(world.is_empty());
        assert_eq!(world.food_count(), 0);
        assert_eq!(
            world.observer().updates,
            vec![(Position::new(0, 0), None), (Position::new(1, 1), None)]
        );
        assert_eq!(agent(&mut world, 0, 0), EntityId(3));
    }

    #[test]
    fn observation_reports_neighbours() {
        let mut world = world();
        let id = agent(&mut world, 2, 2);
        let food_id = food(&mut world, 3, 2);
        let obs = world.observe(id).unwrap();
        assert!(obs.is_alive);
        assert_eq!(obs.cells.len(), 8);
        assert_eq!(
            obs.cells[4],
            ObservedCell::Entity {
                id: food_id,
                class: EntityClass::Food
            }
        );
        assert_eq!(obs.cells.iter().filter(|c| **c == ObservedCell::Empty).count(), 7);
        assert!(world.observe(EntityId(99)).is_none());
    }

    #[test]
    fn entities_in_region_uses_floor_tiling() {
        let mut world = world();
        food(&mut world, 3, 3);
        food(&mut world, -3, 3);
        food(&mut world, 17, 17);
        let found = world.entities_in_region(Region::new(-1, 0));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].position, Position::new(-3, 3));
    }
}
