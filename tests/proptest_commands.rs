//! Property tests for the deferred `Operation` command buffer.
//!
//! These generate random instruction sequences, replay them against a fresh
//! `World`, and check that the resulting state matches what applying the
//! equivalent mutations directly would produce.

use chunked_ecs::prelude::*;
use proptest::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Hp {
    value: u32,
}

fn hp_bytes(value: u32) -> [u8; 4] {
    value.to_le_bytes()
}

#[derive(Debug, Clone)]
enum CmdOp {
    CreateOne,
    AddHp(usize, u32),
    SetHp(usize, u32),
    RemoveHp(usize),
    AddTag(usize),
    RemoveTag(usize),
    Destroy(usize),
    SelectAndParent(usize, usize),
}

fn cmd_op_strategy() -> impl Strategy<Value = CmdOp> {
    prop_oneof![
        Just(CmdOp::CreateOne),
        (0..20usize, any::<u32>()).prop_map(|(i, v)| CmdOp::AddHp(i, v)),
        (0..20usize, any::<u32>()).prop_map(|(i, v)| CmdOp::SetHp(i, v)),
        (0..20usize).prop_map(CmdOp::RemoveHp),
        (0..20usize).prop_map(CmdOp::AddTag),
        (0..20usize).prop_map(CmdOp::RemoveTag),
        (0..20usize).prop_map(CmdOp::Destroy),
        (0..20usize, 0..20usize).prop_map(|(a, b)| CmdOp::SelectAndParent(a, b)),
    ]
}

fn setup() -> (World, ComponentType, TagType) {
    let mut schema = Schema::new();
    let hp = schema
        .register_component::<Hp>("hp", std::mem::size_of::<Hp>() as u16, None)
        .unwrap();
    let marked = schema.register_tag_dynamic("marked").unwrap();
    (World::new(schema), hp, marked)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    /// Replaying a buffer never panics, never corrupts the entity count, and
    /// every surviving entity remains queryable through the world it touched.
    #[test]
    fn replay_preserves_invariants(ops in prop::collection::vec(cmd_op_strategy(), 1..40)) {
        let (mut world, hp, marked) = setup();
        let mut created: Vec<EntityId> = Vec::new();

        for op in ops {
            let mut buf = Operation::new();
            let is_create = matches!(op, CmdOp::CreateOne);
            match op {
                CmdOp::CreateOne => {
                    buf.create_entity(1);
                }
                CmdOp::AddHp(idx, v) => {
                    if !created.is_empty() {
                        buf.select_entity(created[idx % created.len()])
                            .add_component(hp, &hp_bytes(v));
                    }
                }
                CmdOp::SetHp(idx, v) => {
                    if !created.is_empty() {
                        buf.select_entity(created[idx % created.len()])
                            .set_component(hp, &hp_bytes(v));
                    }
                }
                CmdOp::RemoveHp(idx) => {
                    if !created.is_empty() {
                        buf.select_entity(created[idx % created.len()])
                            .remove_component(hp);
                    }
                }
                CmdOp::AddTag(idx) => {
                    if !created.is_empty() {
                        buf.select_entity(created[idx % created.len()]).add_tag(marked);
                    }
                }
                CmdOp::RemoveTag(idx) => {
                    if !created.is_empty() {
                        buf.select_entity(created[idx % created.len()]).remove_tag(marked);
                    }
                }
                CmdOp::Destroy(idx) => {
                    if !created.is_empty() {
                        let idx = idx % created.len();
                        buf.select_entity(created[idx]).destroy_selection();
                    }
                }
                CmdOp::SelectAndParent(a, b) => {
                    if !created.is_empty() {
                        let a = created[a % created.len()];
                        let b = created[b % created.len()];
                        buf.select_entity(a).set_parent_id(b);
                    }
                }
            }

            let selection = buf.replay(&mut world);
            if is_create {
                created.extend(selection);
            }
            created.retain(|&e| world.is_alive(e));
        }

        // Recompute the live set from the world itself and cross-check.
        created.retain(|&e| world.is_alive(e));
        prop_assert_eq!(world.entity_count(), created.len());
        for &e in &created {
            prop_assert!(world.is_alive(e));
        }
    }

    /// `create_entity` followed immediately by `add_component` and
    /// `select_offset(0)` targets the entity just created, whatever the
    /// buffer's prior contents.
    #[test]
    fn select_offset_targets_most_recent_creation(hp_value in any::<u32>()) {
        let (mut world, hp, _marked) = setup();
        let mut buf = Operation::new();
        buf.create_entity(1)
            .create_entity(1)
            .select_offset(0)
            .add_component(hp, &hp_bytes(hp_value));

        buf.replay(&mut world);

        let q = world.query::<(&Hp,)>().unwrap();
        let rows = q.rows(&mut world).unwrap();
        prop_assert_eq!(rows.len(), 1);
        prop_assert_eq!(rows[0].1 .0.value, hp_value);
    }

    /// Destroying a selection empties it; a subsequent op requiring a
    /// non-empty selection is skipped rather than panicking.
    #[test]
    fn destroy_then_mutate_is_skipped_gracefully(count in 1..10u32) {
        let (mut world, hp, _marked) = setup();
        let mut buf = Operation::new();
        buf.create_entity(count)
            .destroy_selection()
            .add_component(hp, &hp_bytes(1));

        buf.replay(&mut world);
        prop_assert_eq!(world.entity_count(), 0);
    }
}
