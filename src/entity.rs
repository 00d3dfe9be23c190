//! Entity identity: ids, slots, the enabled-state machine, and the
//! free-id-stack allocator.
//!
//! Ids are plain, non-generational `u32`s reused once an entity is
//! destroyed; liveness is tracked by `EntitySlot::state` rather than by a
//! generation counter, so recycled ids are disambiguated by explicit state
//! instead of a generation mismatch.

use std::collections::HashMap;

use crate::schema::ArrayElementType;

/// A handle to a slot in the World. `0` is reserved to mean "no entity".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(u32);

impl EntityId {
    /// Sentinel meaning "no entity" (used for `parent == 0`, cleared
    /// references, etc).
    pub const NONE: EntityId = EntityId(0);

    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Debug for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// The entity enabled-state machine (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Destroyed / reusable terminal; the slot holds no live entity.
    Free,
    Enabled,
    Disabled,
    /// Was explicitly enabled, but an ancestor is disabled.
    EnabledButDisabledByAncestor,
}

impl EntityState {
    /// `true` only for `Enabled`.
    pub fn is_enabled(self) -> bool {
        matches!(self, EntityState::Enabled)
    }
}

/// A lazily-populated, 1-based reference list: index `rint - 1` holds the
/// target entity, or `EntityId::NONE` if that `rint` was cleared.
#[derive(Debug, Default, Clone)]
pub struct ReferenceList {
    entries: Vec<EntityId>,
}

impl ReferenceList {
    /// Append `target`, returning the new 1-based `rint`.
    pub fn add(&mut self, target: EntityId) -> u32 {
        self.entries.push(target);
        self.entries.len() as u32
    }

    pub fn get(&self, rint: u32) -> Option<EntityId> {
        if rint == 0 {
            return None;
        }
        self.entries.get(rint as usize - 1).copied()
    }

    pub fn set(&mut self, rint: u32, target: EntityId) -> bool {
        if rint == 0 {
            return false;
        }
        match self.entries.get_mut(rint as usize - 1) {
            Some(slot) => {
                *slot = target;
                true
            }
            None => false,
        }
    }

    /// Clear `rint` to `EntityId::NONE`, preserving the indices of later
    /// references.
    pub fn clear(&mut self, rint: u32) -> bool {
        self.set(rint, EntityId::NONE)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, EntityId)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, &e)| (i as u32 + 1, e))
    }
}

/// A per-entity variable-length array of one `ArrayElementType`'s element
/// values, stored as raw bytes.
#[derive(Debug, Clone)]
pub struct ArrayBuffer {
    pub element_size: u16,
    bytes: Vec<u8>,
    len: usize,
}

impl ArrayBuffer {
    pub fn new(element_size: u16, len: usize) -> Self {
        Self {
            element_size,
            bytes: vec![0u8; element_size as usize * len],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn element(&self, index: usize) -> Option<&[u8]> {
        if index >= self.len {
            return None;
        }
        let size = self.element_size as usize;
        Some(&self.bytes[index * size..(index + 1) * size])
    }

    pub fn set_element(&mut self, index: usize, value: &[u8]) -> Option<()> {
        if index >= self.len {
            return None;
        }
        let size = self.element_size as usize;
        self.bytes[index * size..(index + 1) * size].copy_from_slice(value);
        Some(())
    }

    pub fn resize(&mut self, new_len: usize) {
        self.bytes.resize(new_len * self.element_size as usize, 0);
        self.len = new_len;
    }
}

/// Per-entity record: parent/child graph edges, references, arrays, enabled
/// state, and the chunk the entity currently lives in.
#[derive(Debug)]
pub struct EntitySlot {
    pub entity: EntityId,
    pub parent: EntityId,
    pub children: Vec<EntityId>,
    pub references: ReferenceList,
    pub arrays: HashMap<ArrayElementType, ArrayBuffer>,
    /// Index into `World`'s chunk vector.
    pub chunk: u32,
    pub row: usize,
    pub state: EntityState,
}

impl EntitySlot {
    fn free() -> Self {
        Self {
            entity: EntityId::NONE,
            parent: EntityId::NONE,
            children: Vec::new(),
            references: ReferenceList::default(),
            arrays: HashMap::new(),
            chunk: 0,
            row: 0,
            state: EntityState::Free,
        }
    }
}

/// The slot table plus the free-id stack. Ids are allocated preferring reuse
/// from the free stack before growing the table.
#[derive(Debug)]
pub struct SlotTable {
    slots: Vec<EntitySlot>,
    free: Vec<u32>,
}

impl SlotTable {
    pub fn new() -> Self {
        // Index 0 is never assigned to a live entity; it exists only so
        // slot indices line up with raw ids.
        Self {
            slots: vec![EntitySlot::free()],
            free: Vec::new(),
        }
    }

    /// Allocate a fresh id: pop from the free stack, or grow the table.
    pub fn allocate(&mut self) -> EntityId {
        let id = if let Some(raw) = self.free.pop() {
            raw
        } else {
            let raw = self.slots.len() as u32;
            self.slots.push(EntitySlot::free());
            raw
        };
        let slot = &mut self.slots[id as usize];
        slot.entity = EntityId::new(id);
        slot.parent = EntityId::NONE;
        slot.children.clear();
        slot.references = ReferenceList::default();
        slot.arrays.clear();
        slot.state = EntityState::Enabled;
        EntityId::new(id)
    }

    /// Push `id` back onto the free stack and mark its slot `Free`.
    pub fn free(&mut self, id: EntityId) {
        let slot = &mut self.slots[id.raw() as usize];
        slot.state = EntityState::Free;
        slot.parent = EntityId::NONE;
        slot.children.clear();
        slot.references = ReferenceList::default();
        slot.arrays.clear();
        self.free.push(id.raw());
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        if id.is_none() {
            return false;
        }
        match self.slots.get(id.raw() as usize) {
            Some(slot) => slot.state != EntityState::Free,
            None => false,
        }
    }

    pub fn get(&self, id: EntityId) -> Option<&EntitySlot> {
        if !self.is_alive(id) {
            return None;
        }
        self.slots.get(id.raw() as usize)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut EntitySlot> {
        if !self.is_alive(id) {
            return None;
        }
        self.slots.get_mut(id.raw() as usize)
    }

    /// Direct, unchecked slot access (used internally once liveness has
    /// already been verified by the caller).
    pub(crate) fn slot_unchecked(&self, id: EntityId) -> &EntitySlot {
        &self.slots[id.raw() as usize]
    }

    pub(crate) fn slot_unchecked_mut(&mut self, id: EntityId) -> &mut EntitySlot {
        &mut self.slots[id.raw() as usize]
    }

    pub fn max_entity(&self) -> u32 {
        self.slots.len() as u32 - 1
    }

    pub fn free_ids(&self) -> &[u32] {
        &self.free
    }

    /// Iterate all currently-live entity ids, ascending.
    pub fn live_entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.slots
            .iter()
            .filter(|s| s.state != EntityState::Free)
            .map(|s| s.entity)
    }
}

impl Default for SlotTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_reuses_freed_id() {
        let mut table = SlotTable::new();
        let e1 = table.allocate();
        table.free(e1);
        let e2 = table.allocate();
        assert_eq!(e1, e2);
    }

    #[test]
    fn fresh_ids_are_dense() {
        let mut table = SlotTable::new();
        let a = table.allocate();
        let b = table.allocate();
        assert_eq!(a.raw(), 1);
        assert_eq!(b.raw(), 2);
    }

    #[test]
    fn freed_entity_is_not_alive() {
        let mut table = SlotTable::new();
        let e = table.allocate();
        table.free(e);
        assert!(!table.is_alive(e));
    }

    #[test]
    fn reference_list_clears_preserve_other_indices() {
        let mut refs = ReferenceList::default();
        let a = refs.add(EntityId::new(5));
        let b = refs.add(EntityId::new(6));
        refs.clear(a);
        assert_eq!(refs.get(a), Some(EntityId::NONE));
        assert_eq!(refs.get(b), Some(EntityId::new(6)));
    }

    #[test]
    fn array_buffer_resize_preserves_prefix() {
        let mut arr = ArrayBuffer::new(4, 2);
        arr.set_element(0, &[1, 2, 3, 4]).unwrap();
        arr.resize(3);
        assert_eq!(arr.len(), 3);
        assert_eq!(arr.element(0).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(arr.element(2).unwrap(), &[0, 0, 0, 0]);
    }
}
