//! Property tests for core World mutation sequences.
//!
//! These generate random sequences of ECS operations and verify that world
//! invariants hold after each sequence.

use chunked_ecs::prelude::*;
use proptest::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Pos {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Vel {
    dx: f32,
    dy: f32,
}

#[derive(Debug, Clone)]
enum EcsOp {
    CreatePos(f32, f32),
    CreatePosVel(f32, f32, f32, f32),
    Destroy(usize),
    InsertVel(usize, f32, f32),
    RemoveVel(usize),
    QueryPos,
    QueryPosVel,
}

fn finite_f32() -> impl Strategy<Value = f32> {
    (-1_000_000i32..1_000_000i32).prop_map(|v| v as f32 * 0.01)
}

fn ecs_op_strategy() -> impl Strategy<Value = EcsOp> {
    prop_oneof![
        (finite_f32(), finite_f32()).prop_map(|(x, y)| EcsOp::CreatePos(x, y)),
        (finite_f32(), finite_f32(), finite_f32(), finite_f32())
            .prop_map(|(x, y, dx, dy)| EcsOp::CreatePosVel(x, y, dx, dy)),
        (0..100usize).prop_map(EcsOp::Destroy),
        (0..100usize, finite_f32(), finite_f32())
            .prop_map(|(i, dx, dy)| EcsOp::InsertVel(i, dx, dy)),
        (0..100usize).prop_map(EcsOp::RemoveVel),
        Just(EcsOp::QueryPos),
        Just(EcsOp::QueryPosVel),
    ]
}

fn setup() -> (World, ComponentType, ComponentType) {
    let mut schema = Schema::new();
    let pos = schema
        .register_component::<Pos>("pos", std::mem::size_of::<Pos>() as u16, None)
        .unwrap();
    let vel = schema
        .register_component::<Vel>("vel", std::mem::size_of::<Vel>() as u16, None)
        .unwrap();
    (World::new(schema), pos, vel)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn random_ops_preserve_invariants(ops in prop::collection::vec(ecs_op_strategy(), 1..50)) {
        let (mut world, _pos, vel) = setup();
        let mut alive: Vec<EntityId> = Vec::new();

        for op in ops {
            match op {
                EcsOp::CreatePos(x, y) => {
                    let e = world.create_entity();
                    world.add_component(e, Pos { x, y }).unwrap();
                    alive.push(e);
                }
                EcsOp::CreatePosVel(x, y, dx, dy) => {
                    let e = world.create_entity();
                    world.add_component(e, Pos { x, y }).unwrap();
                    world.add_component(e, Vel { dx, dy }).unwrap();
                    alive.push(e);
                }
                EcsOp::Destroy(idx) => {
                    if !alive.is_empty() {
                        let idx = idx % alive.len();
                        let e = alive.remove(idx);
                        let _ = world.destroy_entity(e);
                    }
                }
                EcsOp::InsertVel(idx, dx, dy) => {
                    if !alive.is_empty() {
                        let idx = idx % alive.len();
                        let _ = world.add_component(alive[idx], Vel { dx, dy });
                    }
                }
                EcsOp::RemoveVel(idx) => {
                    if !alive.is_empty() {
                        let idx = idx % alive.len();
                        let _ = world.remove_component(alive[idx], vel);
                    }
                }
                EcsOp::QueryPos => {
                    let q = world.query::<(&Pos,)>().unwrap();
                    prop_assert!(q.len() <= alive.len());
                }
                EcsOp::QueryPosVel => {
                    let q = world.query::<(&Pos, &Vel)>().unwrap();
                    prop_assert!(q.len() <= alive.len());
                }
            }

            prop_assert_eq!(world.entity_count(), alive.len());
            for &e in &alive {
                prop_assert!(world.is_alive(e));
            }
        }
    }

    /// Destroyed ids are never reported alive, even once recycled into a new
    /// entity (the new handle is a distinct logical entity sharing the raw id).
    #[test]
    fn destroyed_ids_detected_after_recycle(
        spawn_count in 1..20usize,
        destroy_indices in prop::collection::vec(0..20usize, 1..10),
    ) {
        let (mut world, pos, _vel) = setup();

        let mut entities: Vec<EntityId> = Vec::new();
        for i in 0..spawn_count {
            let e = world.create_entity();
            world.add_component(e, Pos { x: i as f32, y: 0.0 }).unwrap();
            entities.push(e);
        }

        let mut destroyed_count = 0usize;
        for &idx in &destroy_indices {
            if !entities.is_empty() {
                let idx = idx % entities.len();
                let e = entities.remove(idx);
                let _ = world.destroy_entity(e);
                destroyed_count += 1;
            }
        }

        for _ in 0..destroyed_count {
            let new_e = world.create_entity();
            world.add_component(new_e, Pos { x: 999.0, y: 999.0 }).unwrap();
            entities.push(new_e);
        }

        for &e in &entities {
            prop_assert!(world.is_alive(e));
            prop_assert!(world.try_get_component_ref(e, pos).is_some());
        }
    }

    /// Inserting then removing a component restores the entity's prior
    /// component bytes exactly.
    #[test]
    fn migration_round_trip_preserves_data(
        initial_x in finite_f32(),
        initial_y in finite_f32(),
        vel_dx in finite_f32(),
        vel_dy in finite_f32(),
    ) {
        let (mut world, pos, vel) = setup();

        let e = world.create_entity();
        world.add_component(e, Pos { x: initial_x, y: initial_y }).unwrap();
        world.add_component(e, Vel { dx: vel_dx, dy: vel_dy }).unwrap();

        let read = world.get_component_ref(e, pos).unwrap();
        let got: &Pos = unsafe { &*(read.as_ptr() as *const Pos) };
        prop_assert_eq!(got.x, initial_x);
        prop_assert_eq!(got.y, initial_y);

        world.remove_component(e, vel).unwrap();
        let read = world.get_component_ref(e, pos).unwrap();
        let got: &Pos = unsafe { &*(read.as_ptr() as *const Pos) };
        prop_assert_eq!(got.x, initial_x);
        prop_assert_eq!(got.y, initial_y);
        prop_assert!(!world.try_get_component_ref(e, vel).is_some());
    }

    /// Entities sharing a chunk keep independent component data.
    #[test]
    fn multiple_entities_independent_data(count in 2..50usize) {
        let (mut world, pos, _vel) = setup();

        let mut entities = Vec::new();
        for i in 0..count {
            let e = world.create_entity();
            world.add_component(e, Pos { x: i as f32, y: (i * 2) as f32 }).unwrap();
            entities.push(e);
        }

        for (i, &e) in entities.iter().enumerate() {
            let read = world.get_component_ref(e, pos).unwrap();
            let got: &Pos = unsafe { &*(read.as_ptr() as *const Pos) };
            prop_assert_eq!(got.x, i as f32);
            prop_assert_eq!(got.y, (i * 2) as f32);
        }

        if count > 2 {
            let mid = count / 2;
            let mid_e = entities.remove(mid);
            world.destroy_entity(mid_e).unwrap();

            prop_assert_eq!(world.entity_count(), entities.len());
            for &e in &entities {
                prop_assert!(world.is_alive(e));
                prop_assert!(world.try_get_component_ref(e, pos).is_some());
            }
        }
    }
}
