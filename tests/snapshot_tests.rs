//! Integration tests for World serialize/deserialize round trips.

use chunked_ecs::prelude::*;

// -- test component types ---------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity {
    dx: f32,
    dy: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Health(u32);

struct Player;
struct Enemy;

fn build_schema() -> Schema {
    let mut schema = Schema::new();
    schema
        .register_component::<Position>("position", std::mem::size_of::<Position>() as u16, None)
        .unwrap();
    schema
        .register_component::<Velocity>("velocity", std::mem::size_of::<Velocity>() as u16, None)
        .unwrap();
    schema
        .register_component::<Health>("health", std::mem::size_of::<Health>() as u16, None)
        .unwrap();
    schema.register_array_element::<u32>("inventory", 4, None).unwrap();
    schema.register_tag::<Player>("player").unwrap();
    schema.register_tag::<Enemy>("enemy").unwrap();
    schema
}

fn round_trip(world: &World) -> World {
    let mut buf = Vec::new();
    serialize(world, &mut buf).unwrap();
    deserialize(&mut buf.as_slice(), build_schema()).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn round_trip_preserves_single_component() {
    let schema = build_schema();
    let pos = schema.get_component::<Position>().unwrap();
    let mut world = World::new(schema);
    let e = world.create_entity();
    world.add_component(e, Position { x: 1.5, y: -2.5 }).unwrap();

    let world2 = round_trip(&world);
    let pos2 = world2.schema().get_component::<Position>().unwrap();
    assert_eq!(pos2, pos);
    assert!(world2.is_alive(e));
    assert_eq!(world2.get_component_ref(e, pos2).unwrap(), world.get_component_ref(e, pos).unwrap());
}

#[test]
fn round_trip_preserves_multiple_entities_and_chunks() {
    let schema = build_schema();
    let mut world = World::new(schema);

    let mut with_velocity = Vec::new();
    for i in 0..5 {
        let e = world.create_entity();
        world.add_component(e, Position { x: i as f32, y: 0.0 }).unwrap();
        if i % 2 == 0 {
            world.add_component(e, Velocity { dx: 1.0, dy: 1.0 }).unwrap();
            with_velocity.push(e);
        }
    }

    let chunk_count_before = world.chunk_count();
    let world2 = round_trip(&world);

    assert_eq!(world2.entity_count(), world.entity_count());
    assert_eq!(world2.chunk_count(), chunk_count_before);

    let pos2 = world2.schema().get_component::<Position>().unwrap();
    let vel2 = world2.schema().get_component::<Velocity>().unwrap();
    for &e in &with_velocity {
        assert!(world2.try_get_component_ref(e, pos2).is_some());
        assert!(world2.try_get_component_ref(e, vel2).is_some());
    }
}

#[test]
fn round_trip_preserves_tags() {
    let schema = build_schema();
    let player = schema.get_tag::<Player>().unwrap();
    let mut world = World::new(schema);
    let e = world.create_entity();
    world.add_tag(e, player).unwrap();

    let world2 = round_trip(&world);
    let player2 = world2.schema().get_tag::<Player>().unwrap();
    assert!(world2.has_tag(e, player2));
}

#[test]
fn round_trip_preserves_parent_child_relationships() {
    let schema = build_schema();
    let mut world = World::new(schema);
    let parent = world.create_entity();
    let child = world.create_entity();
    world.set_parent(child, parent).unwrap();

    let world2 = round_trip(&world);
    assert_eq!(world2.parent_of(child), parent);
    assert_eq!(world2.children_of(parent), &[child]);
}

#[test]
fn round_trip_preserves_enabled_state_cascade() {
    let schema = build_schema();
    let mut world = World::new(schema);
    let parent = world.create_entity();
    let child = world.create_entity();
    world.set_parent(child, parent).unwrap();
    world.set_enabled(parent, false).unwrap();

    let world2 = round_trip(&world);
    assert!(!world2.is_enabled(parent));
    assert!(!world2.is_enabled(child));
    assert_eq!(world2.state_of(child), EntityState::EnabledButDisabledByAncestor);
}

#[test]
fn round_trip_preserves_references() {
    let schema = build_schema();
    let mut world = World::new(schema);
    let a = world.create_entity();
    let b = world.create_entity();
    let rint = world.add_reference(a, b).unwrap();

    let world2 = round_trip(&world);
    assert_eq!(world2.get_reference(a, rint).unwrap(), b);
}

#[test]
fn round_trip_preserves_arrays() {
    let schema = build_schema();
    let inventory = schema.get_array_element::<u32>().unwrap();
    let mut world = World::new(schema);
    let e = world.create_entity();
    let values: Vec<u8> = [10u32, 20, 30].iter().flat_map(|v| v.to_le_bytes()).collect();
    world.create_array_with(e, inventory, &values).unwrap();

    let world2 = round_trip(&world);
    let inventory2 = world2.schema().get_array_element::<u32>().unwrap();
    assert_eq!(world2.get_array(e, inventory2).unwrap(), values.as_slice());
}

#[test]
fn round_trip_preserves_destroyed_entity_gaps() {
    let schema = build_schema();
    let mut world = World::new(schema);
    let a = world.create_entity();
    let b = world.create_entity();
    let c = world.create_entity();
    world.destroy_entity(b).unwrap();

    let mut world2 = round_trip(&world);
    assert!(world2.is_alive(a));
    assert!(!world2.is_alive(b));
    assert!(world2.is_alive(c));
    assert_eq!(world2.entity_count(), world.entity_count());

    // The freed id must be reusable exactly as it was in the source world.
    let reused = world2.create_entity();
    assert_eq!(reused, b);
}

#[test]
fn round_trip_preserves_cleared_references() {
    let schema = build_schema();
    let mut world = World::new(schema);
    let a = world.create_entity();
    let b = world.create_entity();
    let c = world.create_entity();
    let r1 = world.add_reference(a, b).unwrap();
    let r2 = world.add_reference(a, c).unwrap();
    world.destroy_entity(b).unwrap();

    let world2 = round_trip(&world);
    assert_eq!(world2.get_reference(a, r1).unwrap(), EntityId::NONE);
    assert_eq!(world2.get_reference(a, r2).unwrap(), c);
}

#[test]
fn round_trip_preserves_query_results() {
    let schema = build_schema();
    let mut world = World::new(schema);
    for i in 0..4 {
        let e = world.create_entity();
        world.add_component(e, Position { x: i as f32, y: i as f32 }).unwrap();
        world.add_component(e, Health(100)).unwrap();
    }

    let world2 = round_trip(&world);
    let q = world2.query::<(&Position, &Health)>().unwrap();
    assert_eq!(q.len(), 4);
}

#[test]
fn deserialize_rejects_bad_magic() {
    let schema = build_schema();
    let buf = vec![b'X', b'X', b'X', b'X', 1, 0, 0, 0];
    let err = deserialize(&mut buf.as_slice(), schema);
    assert_eq!(err, Err(EcsError::SchemaMismatch));
}

#[test]
fn deserialize_rejects_schema_missing_a_stream_type() {
    let schema = build_schema();
    let mut world = World::new(schema);
    let e = world.create_entity();
    let health = world.schema().get_component::<Health>().unwrap();
    world.add_component_bytes(e, health, &100u32.to_le_bytes()).unwrap();

    let mut buf = Vec::new();
    serialize(&world, &mut buf).unwrap();

    // A schema that never registered "health" cannot cover the stream.
    let mut narrow_schema = Schema::new();
    narrow_schema
        .register_component::<Position>("position", std::mem::size_of::<Position>() as u16, None)
        .unwrap();
    narrow_schema
        .register_component::<Velocity>("velocity", std::mem::size_of::<Velocity>() as u16, None)
        .unwrap();
    narrow_schema.register_array_element::<u32>("inventory", 4, None).unwrap();
    narrow_schema.register_tag::<Player>("player").unwrap();
    narrow_schema.register_tag::<Enemy>("enemy").unwrap();

    let err = deserialize(&mut buf.as_slice(), narrow_schema);
    assert_eq!(err, Err(EcsError::SchemaMismatch));
}

#[test]
fn deserialize_rejects_truncated_stream() {
    let schema = build_schema();
    let mut world = World::new(schema);
    let e = world.create_entity();
    let pos = world.schema().get_component::<Position>().unwrap();
    world.add_component_bytes(e, pos, &[0; 8]).unwrap();

    let mut buf = Vec::new();
    serialize(&world, &mut buf).unwrap();
    buf.truncate(buf.len() - 4);

    let result = deserialize(&mut buf.as_slice(), build_schema());
    assert!(result.is_err());
}
