//! Integration tests: world invariants.
use proptest::prelude::*;
use tr_core::{
    CellObserver, Direction, Entity, EntityClass, EntityId, Position, World, WorldRules,
};

#[derive(Debug, Clone)]
enum Op {
    Create(EntityClass, i32, i32),
    Delete(usize),
    Move(usize, Direction),
    Consume(usize, Direction),
    Living(usize),
    Clear,
}

fn class() -> impl Strategy<Value = EntityClass> {
    prop_oneof![
        Just(EntityClass::Agent),
        Just(EntityClass::Food),
        Just(EntityClass::Rock)
    ]
}

fn direction() -> impl Strategy<Value = Direction> {
    prop_oneof![
        Just(Direction::Up),
        Just(Direction::Down),
        Just(Direction::Left),
        Just(Direction::Right)
    ]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (class(), -4..4i32, -4..4i32).prop_map(|(c, x, y)| Op::Create(c, x, y)),
        1 => (0..16usize).prop_map(Op::Delete),
        3 => (0..16usize, direction()).prop_map(|(i, d)| Op::Move(i, d)),
        2 => (0..16usize, direction()).prop_map(|(i, d)| Op::Consume(i, d)),
        3 => (0..16usize).prop_map(Op::Living),
        1 => Just(Op::Clear),
    ]
}

/// Replays cell updates into its own occupancy map.
#[derive(Debug, Default)]
struct Shadow {
    cells: std::collections::HashMap<Position, EntityId>,
}

impl CellObserver for Shadow {
    fn on_cell_update(&mut self, position: Position, occupant: Option<&Entity>) {
        match occupant {
            Some(entity) => {
                self.cells.insert(position, entity.id);
            }
            None => {
                self.cells.remove(&position);
            }
        }
    }
}

fn pick(world: &World<Shadow>, index: usize) -> Option<EntityId> {
    let mut ids: Vec<EntityId> = world.entities().map(|e| e.id).collect();
    ids.sort();
    if ids.is_empty() {
        None
    } else {
        Some(ids[index % ids.len()])
    }
}

fn apply(world: &mut World<Shadow>, op: &Op) {
    match *op {
        Op::Create(class, x, y) => {
            let _ = world.create_entity(class, "owner", "model", Position::new(x, y));
        }
        Op::Delete(i) => {
            if let Some(id) = pick(world, i) {
                assert!(world.delete_entity(id));
            }
        }
        Op::Move(i, dir) => {
            if let Some(id) = pick(world, i) {
                let target = world.get(id).and_then(|e| e.position.step(dir));
                if let Some(target) = target {
                    world.entity_move(id, target);
                }
            }
        }
        Op::Consume(i, dir) => {
            if let Some(id) = pick(world, i) {
                let target = world.get(id).and_then(|e| e.position.step(dir));
                if let Some(target) = target {
                    world.entity_consume(id, target);
                }
            }
        }
        Op::Living(i) => {
            if let Some(id) = pick(world, i) {
                world.living_cost(id);
            }
        }
        Op::Clear => {
            world.clear();
        }
    }
}

proptest! {
    #[test]
    fn invariants_hold_after_any_sequence(ops in prop::collection::vec(op(), 1..80)) {
        let mut world = World::with_observer(WorldRules::default(), Shadow::default());
        for op in &ops {
            apply(&mut world, op);
            prop_assert!(world.verify_integrity().is_ok(), "after {:?}: {:?}", op, world.verify_integrity());

            let food = world.entities().filter(|e| e.class == EntityClass::Food).count();
            prop_assert_eq!(world.food_count(), food);

            let mut agents: Vec<EntityId> = world
                .entities()
                .filter(|e| e.class == EntityClass::Agent)
                .map(|e| e.id)
                .collect();
            agents.sort();
            prop_assert_eq!(world.agents(), agents);

            for entity in world.entities() {
                prop_assert!(entity.energy <= 100 && entity.health <= 100);
                prop_assert!(entity.health > 0);
                prop_assert_eq!(world.entity_at(entity.position).map(|e| e.id), Some(entity.id));
            }

            // Cell updates alone are enough to rebuild the occupancy map.
            prop_assert_eq!(world.observer().cells.len(), world.len());
            for entity in world.entities() {
                prop_assert_eq!(world.observer().cells.get(&entity.position), Some(&entity.id));
            }
        }
    }

    #[test]
    fn create_then_delete_is_a_no_op(
        ops in prop::collection::vec(op(), 0..30),
        x in -10..10i32,
        y in -10..10i32,
    ) {
        let mut world = World::with_observer(WorldRules::default(), Shadow::default());
        for op in &ops {
            apply(&mut world, op);
        }
        let mut before: Vec<Entity> = world.entities().cloned().collect();
        before.sort_by_key(|e| e.id);

        if let Ok(entity) = world.create_entity(EntityClass::Food, "", "", Position::new(x, y)) {
            prop_assert!(world.delete_entity(entity.id));
        }

        let mut after: Vec<Entity> = world.entities().cloned().collect();
        after.sort_by_key(|e| e.id);
        prop_assert_eq!(before, after);
        prop_assert!(world.verify_integrity().is_ok());
    }
}
