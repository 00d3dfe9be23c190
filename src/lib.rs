//! Archetype-chunked Entity Component System data store.
//!
//! Entities are stored in chunks (one per unique `Definition`: a component
//! set, an array-element set, and a tag set) using Structure-of-Arrays
//! layout. Ids are non-generational `u32`s, reused once freed; liveness and
//! the parent/child/enabled-state machine live in a separate slot table so
//! the hot path (component storage) stays pure bytes.
//!
//! # Quick Start
//!
//! ```
//! use chunked_ecs::prelude::*;
//!
//! #[derive(Clone, Copy)]
//! struct Position { x: f32, y: f32 }
//!
//! let mut schema = Schema::new();
//! let position = schema.register_component::<Position>("position", std::mem::size_of::<Position>() as u16, None).unwrap();
//!
//! let mut world = World::new(schema);
//! let e = world.create_entity();
//! world.add_component(e, Position { x: 0.0, y: 0.0 }).unwrap();
//!
//! let q = world.query::<(&Position,)>().unwrap();
//! assert_eq!(q.len(), 1);
//! ```

#![deny(unsafe_code)]

pub mod bitset;
#[allow(unsafe_code)]
pub mod chunk;
pub mod definition;
pub mod entity;
pub mod error;
pub mod operation;
#[allow(unsafe_code)]
pub mod query;
pub mod schema;
pub mod serializer;
pub mod world;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::bitset::Bitset256;
    pub use crate::definition::{Archetype, Definition};
    pub use crate::entity::{EntityId, EntityState};
    pub use crate::error::EcsError;
    pub use crate::operation::Operation;
    pub use crate::query::{Query, QueryItem, TypedQuery};
    pub use crate::schema::{ArrayElementType, ComponentType, Schema, TagType};
    pub use crate::serializer::{deserialize, serialize};
    pub use crate::world::World;
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

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

    struct Player;

    fn setup_world() -> (World, ComponentType, ComponentType, TagType) {
        let mut schema = Schema::new();
        let position = schema
            .register_component::<Position>("position", std::mem::size_of::<Position>() as u16, None)
            .unwrap();
        let velocity = schema
            .register_component::<Velocity>("velocity", std::mem::size_of::<Velocity>() as u16, None)
            .unwrap();
        let player = schema.register_tag::<Player>("player").unwrap();
        (World::new(schema), position, velocity, player)
    }

    #[test]
    fn spawn_entities_with_components_and_query_back() {
        let (mut world, _pos, _vel, _player) = setup_world();
        let e = world.create_entity();
        world.add_component(e, Position { x: 1.0, y: 2.0 }).unwrap();
        world.add_component(e, Velocity { dx: 3.0, dy: 4.0 }).unwrap();

        let q = world.query::<(&Position, &Velocity)>().unwrap();
        let rows = q.rows(&mut world).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, e);
        assert_eq!(*rows[0].1 .0, Position { x: 1.0, y: 2.0 });
    }

    #[test]
    fn destroy_entity_then_query_returns_nothing() {
        let (mut world, _pos, _vel, _player) = setup_world();
        let e = world.create_entity();
        world.add_component(e, Position { x: 0.0, y: 0.0 }).unwrap();
        world.destroy_entity(e).unwrap();

        let q = world.query::<(&Position,)>().unwrap();
        assert!(q.is_empty());
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn insert_component_triggers_migration() {
        let (mut world, _pos, _vel, _player) = setup_world();
        let e = world.create_entity();
        world.add_component(e, Position { x: 1.0, y: 2.0 }).unwrap();
        let chunk_count_before = world.chunk_count();

        world.add_component(e, Velocity { dx: 5.0, dy: 6.0 }).unwrap();

        assert!(world.chunk_count() > chunk_count_before);
        let q = world.query::<(&Position, &Velocity)>().unwrap();
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn operation_and_query_compose() {
        let (mut world, pos, _vel, player) = setup_world();
        let mut op = Operation::new();
        op.create_entity(3).add_tag(player);
        op.create_entity(2);
        op.replay(&mut world);

        let mut include = Bitset256::empty();
        include.set(player.0 as u32).unwrap();
        let tagged = world.query_entities(&Definition::empty(), Some(&include), None, false);
        assert_eq!(tagged.len(), 3);
        let _ = pos;
    }

    #[test]
    fn serializer_round_trips_through_prelude() {
        let (mut world, pos, _vel, _player) = setup_world();
        let e = world.create_entity();
        world.add_component(e, Position { x: 7.0, y: 8.0 }).unwrap();

        let mut buf = Vec::new();
        serialize(&world, &mut buf).unwrap();

        let mut schema2 = Schema::new();
        schema2
            .register_component::<Position>("position", std::mem::size_of::<Position>() as u16, None)
            .unwrap();
        schema2
            .register_component::<Velocity>("velocity", std::mem::size_of::<Velocity>() as u16, None)
            .unwrap();
        schema2.register_tag::<Player>("player").unwrap();

        let world2 = deserialize(&mut buf.as_slice(), schema2).unwrap();
        assert!(world2.is_alive(e));
        let pos2 = world2.schema().get_component::<Position>().unwrap();
        assert_eq!(world2.get_component_ref(e, pos2).unwrap(), world.get_component_ref(e, pos).unwrap());
    }
}
