//! Deferred mutation buffer ("Operation"): an append-only instruction
//! stream with a stateful selection cursor, replayed against a `World` in
//! one pass.
//!
//! Payload bytes for `AddComponent`/`SetComponent`/`CreateArrayWith`/
//! `SetArrayElement` are heap-owned, copied into a single growable byte
//! arena rather than one allocation per instruction — the same
//! grow-by-doubling shape a command buffer typically uses for buffered
//! spawns, adapted here to tagged instructions instead of a bundle stream.

use crate::entity::EntityId;
use crate::error::EcsError;
use crate::schema::{ArrayElementType, ComponentType, TagType};
use crate::world::World;

/// Reference to a byte-arena payload: `(offset, len)` into `Operation::arena`.
#[derive(Debug, Clone, Copy)]
struct Payload {
    offset: usize,
    len: usize,
}

/// One recorded instruction. Selection-cursor references are either an
/// absolute, already-existing `EntityId` or a relative offset counting back
/// from the most recently created entity (`SelectOffset`/`*Offset` forms).
#[derive(Debug, Clone, Copy)]
enum Opcode {
    CreateEntity { count: u32 },
    DestroySelection,
    DestroyRange { start: u32, len: u32 },
    SelectEntity { id: EntityId },
    SelectOffset { k: u32 },
    ClearSelection,
    SetParentId { id: EntityId },
    SetParentOffset { k: u32 },
    AddReferenceId { id: EntityId },
    AddReferenceOffset { k: u32 },
    RemoveReference { rint: u32 },
    AddComponent { ty: ComponentType, payload: Payload },
    SetComponent { ty: ComponentType, payload: Payload },
    RemoveComponent { ty: ComponentType },
    AddTag { ty: TagType },
    RemoveTag { ty: TagType },
    CreateArray { ty: ArrayElementType, len: u32 },
    CreateArrayWith { ty: ArrayElementType, payload: Payload },
    DestroyArray { ty: ArrayElementType },
    SetArrayElement { ty: ArrayElementType, index: u32, payload: Payload },
    ResizeArray { ty: ArrayElementType, new_len: u32 },
}

/// An append-only, replayable instruction stream with a stateful selection
/// cursor. Recording never touches a `World`; only `replay` does.
#[derive(Debug, Default)]
pub struct Operation {
    ops: Vec<Opcode>,
    arena: Vec<u8>,
}

impl Operation {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_payload(&mut self, bytes: &[u8]) -> Payload {
        let offset = self.arena.len();
        self.arena.extend_from_slice(bytes);
        Payload { offset, len: bytes.len() }
    }

    pub fn create_entity(&mut self, count: u32) -> &mut Self {
        self.ops.push(Opcode::CreateEntity { count });
        self
    }

    pub fn destroy_selection(&mut self) -> &mut Self {
        self.ops.push(Opcode::DestroySelection);
        self
    }

    pub fn destroy_range(&mut self, start: u32, len: u32) -> &mut Self {
        self.ops.push(Opcode::DestroyRange { start, len });
        self
    }

    pub fn select_entity(&mut self, id: EntityId) -> &mut Self {
        self.ops.push(Opcode::SelectEntity { id });
        self
    }

    /// Append the `k`-th-last newly created entity (0 = most recent) to the
    /// selection.
    pub fn select_offset(&mut self, k: u32) -> &mut Self {
        self.ops.push(Opcode::SelectOffset { k });
        self
    }

    pub fn clear_selection(&mut self) -> &mut Self {
        self.ops.push(Opcode::ClearSelection);
        self
    }

    pub fn set_parent_id(&mut self, id: EntityId) -> &mut Self {
        self.ops.push(Opcode::SetParentId { id });
        self
    }

    pub fn set_parent_offset(&mut self, k: u32) -> &mut Self {
        self.ops.push(Opcode::SetParentOffset { k });
        self
    }

    pub fn add_reference_id(&mut self, id: EntityId) -> &mut Self {
        self.ops.push(Opcode::AddReferenceId { id });
        self
    }

    pub fn add_reference_offset(&mut self, k: u32) -> &mut Self {
        self.ops.push(Opcode::AddReferenceOffset { k });
        self
    }

    pub fn remove_reference(&mut self, rint: u32) -> &mut Self {
        self.ops.push(Opcode::RemoveReference { rint });
        self
    }

    pub fn add_component(&mut self, ty: ComponentType, bytes: &[u8]) -> &mut Self {
        let payload = self.push_payload(bytes);
        self.ops.push(Opcode::AddComponent { ty, payload });
        self
    }

    pub fn set_component(&mut self, ty: ComponentType, bytes: &[u8]) -> &mut Self {
        let payload = self.push_payload(bytes);
        self.ops.push(Opcode::SetComponent { ty, payload });
        self
    }

    pub fn remove_component(&mut self, ty: ComponentType) -> &mut Self {
        self.ops.push(Opcode::RemoveComponent { ty });
        self
    }

    pub fn add_tag(&mut self, ty: TagType) -> &mut Self {
        self.ops.push(Opcode::AddTag { ty });
        self
    }

    pub fn remove_tag(&mut self, ty: TagType) -> &mut Self {
        self.ops.push(Opcode::RemoveTag { ty });
        self
    }

    pub fn create_array(&mut self, ty: ArrayElementType, len: u32) -> &mut Self {
        self.ops.push(Opcode::CreateArray { ty, len });
        self
    }

    pub fn create_array_with(&mut self, ty: ArrayElementType, bytes: &[u8]) -> &mut Self {
        let payload = self.push_payload(bytes);
        self.ops.push(Opcode::CreateArrayWith { ty, payload });
        self
    }

    pub fn destroy_array(&mut self, ty: ArrayElementType) -> &mut Self {
        self.ops.push(Opcode::DestroyArray { ty });
        self
    }

    pub fn set_array_element(&mut self, ty: ArrayElementType, index: u32, bytes: &[u8]) -> &mut Self {
        let payload = self.push_payload(bytes);
        self.ops.push(Opcode::SetArrayElement { ty, index, payload });
        self
    }

    pub fn resize_array(&mut self, ty: ArrayElementType, new_len: u32) -> &mut Self {
        self.ops.push(Opcode::ResizeArray { ty, new_len });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Drop every recorded instruction and release the payload arena.
    pub fn clear(&mut self) {
        self.ops.clear();
        self.arena.clear();
    }

    /// Replay every instruction against `world` in order. A per-instruction
    /// failure is logged via `tracing::warn!` and the instruction is
    /// skipped; replay always runs to completion and never returns early.
    /// Returns the final selection.
    pub fn replay(&self, world: &mut World) -> Vec<EntityId> {
        let mut selection: Vec<EntityId> = Vec::new();
        let mut created: Vec<EntityId> = Vec::new();

        let resolve_offset = |created: &[EntityId], k: u32| -> Option<EntityId> {
            let idx = created.len().checked_sub(1)?.checked_sub(k as usize)?;
            created.get(idx).copied()
        };

        for (i, op) in self.ops.iter().enumerate() {
            let result: Result<(), EcsError> = (|| match *op {
                Opcode::CreateEntity { count } => {
                    for _ in 0..count {
                        let e = world.create_entity();
                        created.push(e);
                        selection.push(e);
                    }
                    Ok(())
                }
                Opcode::DestroySelection => {
                    if selection.is_empty() {
                        return Err(EcsError::EmptySelection);
                    }
                    for &e in &selection {
                        world.destroy_entity(e)?;
                    }
                    selection.clear();
                    Ok(())
                }
                Opcode::DestroyRange { start, len } => {
                    if selection.is_empty() {
                        return Err(EcsError::EmptySelection);
                    }
                    let start = start as usize;
                    let end = (start + len as usize).min(selection.len());
                    let window: Vec<EntityId> = selection[start..end].to_vec();
                    for e in window {
                        world.destroy_entity(e)?;
                    }
                    Ok(())
                }
                Opcode::SelectEntity { id } => {
                    selection.push(id);
                    Ok(())
                }
                Opcode::SelectOffset { k } => {
                    let e = resolve_offset(&created, k).ok_or(EcsError::EmptySelection)?;
                    selection.push(e);
                    Ok(())
                }
                Opcode::ClearSelection => {
                    selection.clear();
                    Ok(())
                }
                Opcode::SetParentId { id } => {
                    if selection.is_empty() {
                        return Err(EcsError::EmptySelection);
                    }
                    for &e in &selection {
                        world.set_parent(e, id)?;
                    }
                    Ok(())
                }
                Opcode::SetParentOffset { k } => {
                    if selection.is_empty() {
                        return Err(EcsError::EmptySelection);
                    }
                    let parent = resolve_offset(&selection, k).ok_or(EcsError::EmptySelection)?;
                    for &e in &selection {
                        world.set_parent(e, parent)?;
                    }
                    Ok(())
                }
                Opcode::AddReferenceId { id } => {
                    if selection.is_empty() {
                        return Err(EcsError::EmptySelection);
                    }
                    for &e in &selection {
                        world.add_reference(e, id)?;
                    }
                    Ok(())
                }
                Opcode::AddReferenceOffset { k } => {
                    if selection.is_empty() {
                        return Err(EcsError::EmptySelection);
                    }
                    let target = resolve_offset(&created, k).ok_or(EcsError::EmptySelection)?;
                    for &e in &selection {
                        world.add_reference(e, target)?;
                    }
                    Ok(())
                }
                Opcode::RemoveReference { rint } => {
                    if selection.is_empty() {
                        return Err(EcsError::EmptySelection);
                    }
                    for &e in &selection {
                        world.remove_reference(e, rint)?;
                    }
                    Ok(())
                }
                Opcode::AddComponent { ty, payload } => {
                    if selection.is_empty() {
                        return Err(EcsError::EmptySelection);
                    }
                    let bytes = &self.arena[payload.offset..payload.offset + payload.len];
                    for &e in &selection {
                        world.add_component_bytes(e, ty, bytes)?;
                    }
                    Ok(())
                }
                Opcode::SetComponent { ty, payload } => {
                    if selection.is_empty() {
                        return Err(EcsError::EmptySelection);
                    }
                    let bytes = &self.arena[payload.offset..payload.offset + payload.len];
                    for &e in &selection {
                        world.set_component_bytes(e, ty, bytes)?;
                    }
                    Ok(())
                }
                Opcode::RemoveComponent { ty } => {
                    if selection.is_empty() {
                        return Err(EcsError::EmptySelection);
                    }
                    for &e in &selection {
                        world.remove_component(e, ty)?;
                    }
                    Ok(())
                }
                Opcode::AddTag { ty } => {
                    if selection.is_empty() {
                        return Err(EcsError::EmptySelection);
                    }
                    for &e in &selection {
                        world.add_tag(e, ty)?;
                    }
                    Ok(())
                }
                Opcode::RemoveTag { ty } => {
                    if selection.is_empty() {
                        return Err(EcsError::EmptySelection);
                    }
                    for &e in &selection {
                        world.remove_tag(e, ty)?;
                    }
                    Ok(())
                }
                Opcode::CreateArray { ty, len } => {
                    if selection.is_empty() {
                        return Err(EcsError::EmptySelection);
                    }
                    for &e in &selection {
                        world.create_array(e, ty, len as usize)?;
                    }
                    Ok(())
                }
                Opcode::CreateArrayWith { ty, payload } => {
                    if selection.is_empty() {
                        return Err(EcsError::EmptySelection);
                    }
                    let bytes = &self.arena[payload.offset..payload.offset + payload.len];
                    for &e in &selection {
                        world.create_array_with(e, ty, bytes)?;
                    }
                    Ok(())
                }
                Opcode::DestroyArray { ty } => {
                    if selection.is_empty() {
                        return Err(EcsError::EmptySelection);
                    }
                    for &e in &selection {
                        world.destroy_array(e, ty)?;
                    }
                    Ok(())
                }
                Opcode::SetArrayElement { ty, index, payload } => {
                    if selection.is_empty() {
                        return Err(EcsError::EmptySelection);
                    }
                    let bytes = &self.arena[payload.offset..payload.offset + payload.len];
                    for &e in &selection {
                        world.set_array_element(e, ty, index as usize, bytes)?;
                    }
                    Ok(())
                }
                Opcode::ResizeArray { ty, new_len } => {
                    if selection.is_empty() {
                        return Err(EcsError::EmptySelection);
                    }
                    for &e in &selection {
                        world.resize_array(e, ty, new_len as usize)?;
                    }
                    Ok(())
                }
            })();

            if let Err(err) = result {
                tracing::warn!(instruction = i, error = %err, "operation replay: instruction failed, skipping");
            }
        }

        selection
    }
}
