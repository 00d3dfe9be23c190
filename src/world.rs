//! The [`World`] is the top-level container for the ECS. It owns the slot
//! table, the chunk table, the free-id stack, and the schema, and exposes
//! every mutation and query primitive described by the core.

use std::collections::HashMap;

use crate::chunk::Chunk;
use crate::definition::Definition;
use crate::entity::{ArrayBuffer, EntityId, EntityState, SlotTable};
use crate::error::EcsError;
use crate::schema::{ArrayElementType, ComponentType, Schema, TagType, DISABLED_TAG};

/// Owns every chunk, the slot table, the free-id stack, and the schema.
/// Exposes all mutation and query primitives over the population of
/// entities it owns.
pub struct World {
    schema: Schema,
    chunks: Vec<Chunk>,
    chunk_index: HashMap<Definition, u32>,
    slots: SlotTable,
    /// `target -> [(source, rint)]`, rebuilt lazily as references change;
    /// lets `destroy_entity` clear back-references without scanning every
    /// entity.
    reverse_refs: HashMap<EntityId, Vec<(EntityId, u32)>>,
    /// Bumped on every structural change; consulted by queries for
    /// staleness detection.
    version: u64,
}

impl World {
    /// Create a world attached to `schema`. The empty-definition chunk
    /// (index 0) always exists so freshly created entities have somewhere
    /// to live.
    pub fn new(schema: Schema) -> Self {
        let empty_chunk = Chunk::new(Definition::empty(), &schema);
        let mut chunk_index = HashMap::new();
        chunk_index.insert(Definition::empty(), 0u32);
        Self {
            schema,
            chunks: vec![empty_chunk],
            chunk_index,
            slots: SlotTable::new(),
            reverse_refs: HashMap::new(),
            version: 0,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn schema_mut(&mut self) -> &mut Schema {
        &mut self.schema
    }

    /// Monotonic counter, incremented on every structural change (entity
    /// creation/destruction, migration between chunks). Used by queries to
    /// detect staleness.
    pub fn version(&self) -> u64 {
        self.version
    }

    fn bump_version(&mut self) {
        self.version += 1;
    }

    // -- chunk lookup --------------------------------------------------

    fn get_or_create_chunk(&mut self, def: Definition) -> u32 {
        if let Some(&id) = self.chunk_index.get(&def) {
            return id;
        }
        let chunk = Chunk::new(def, &self.schema);
        let id = self.chunks.len() as u32;
        self.chunks.push(chunk);
        self.chunk_index.insert(def, id);
        tracing::debug!(chunk_id = id, "created new chunk");
        id
    }

    pub(crate) fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub(crate) fn chunks_mut(&mut self) -> &mut [Chunk] {
        &mut self.chunks
    }

    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    fn definition_of(&self, entity: EntityId) -> Definition {
        let chunk_id = self.slots.slot_unchecked(entity).chunk as usize;
        *self.chunks[chunk_id].definition()
    }

    /// Move `entity` to whichever chunk matches `new_def`, creating it if
    /// necessary. Components/arrays shared between the old and new
    /// definition keep their bytes; dest-only columns are zero-filled.
    fn migrate(&mut self, entity: EntityId, new_def: Definition) {
        let slot_chunk = self.slots.slot_unchecked(entity).chunk as usize;
        let slot_row = self.slots.slot_unchecked(entity).row;
        let dest_chunk = self.get_or_create_chunk(new_def) as usize;

        let (dest_row, swapped) = if slot_chunk == dest_chunk {
            // Same chunk (shouldn't normally happen since callers only
            // migrate on an actual definition change, but stay correct).
            (slot_row, None)
        } else {
            let lo = slot_chunk.min(dest_chunk);
            let hi = slot_chunk.max(dest_chunk);
            let (left, right) = self.chunks.split_at_mut(hi);
            // `left[lo]` is whichever of src/dest has the smaller index;
            // `right[0]` (index `hi`) is the other one.
            if slot_chunk < dest_chunk {
                left[lo].move_entity(slot_row, &mut right[0])
            } else {
                right[0].move_entity(slot_row, &mut left[lo])
            }
        };

        if let Some(swapped_entity) = swapped {
            self.slots.slot_unchecked_mut(swapped_entity).row = slot_row;
        }
        let slot = self.slots.slot_unchecked_mut(entity);
        slot.chunk = dest_chunk as u32;
        slot.row = dest_row;
        self.bump_version();
    }

    // -- entity lifecycle ------------------------------------------------

    /// Create a single entity. It joins the empty-definition chunk with
    /// state `Enabled` and no parent.
    pub fn create_entity(&mut self) -> EntityId {
        let entity = self.slots.allocate();
        let row = self.chunks[0].add_entity(entity);
        let slot = self.slots.slot_unchecked_mut(entity);
        slot.chunk = 0;
        slot.row = row;
        self.bump_version();
        entity
    }

    /// Batch-create `n` entities, appending their ids to `out`.
    pub fn create_entities(&mut self, n: usize, out: &mut Vec<EntityId>) {
        out.reserve(n);
        for _ in 0..n {
            out.push(self.create_entity());
        }
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.slots.is_alive(entity)
    }

    fn require_alive(&self, entity: EntityId) -> Result<(), EcsError> {
        if self.slots.is_alive(entity) {
            Ok(())
        } else {
            Err(EcsError::NoSuchEntity { entity })
        }
    }

    /// Destroy `entity` and, depth-first, all of its descendants. Any
    /// reference held by another entity *to* one of the destroyed entities
    /// is cleared (set to 0), not removed: its `rint` stays valid.
    pub fn destroy_entity(&mut self, entity: EntityId) -> Result<(), EcsError> {
        self.require_alive(entity)?;
        let parent = self.slots.slot_unchecked(entity).parent;
        if !parent.is_none() {
            if let Some(pslot) = self.slots.get_mut(parent) {
                pslot.children.retain(|&c| c != entity);
            }
        }
        self.destroy_recursive(entity);
        Ok(())
    }

    fn destroy_recursive(&mut self, entity: EntityId) {
        let children = self.slots.slot_unchecked(entity).children.clone();
        for child in children {
            self.destroy_recursive(child);
        }

        if let Some(referrers) = self.reverse_refs.remove(&entity) {
            for (source, rint) in referrers {
                if self.slots.is_alive(source) {
                    self.slots.slot_unchecked_mut(source).references.clear(rint);
                }
            }
        }

        let outgoing: Vec<(u32, EntityId)> = self
            .slots
            .slot_unchecked(entity)
            .references
            .iter()
            .filter(|(_, target)| !target.is_none())
            .collect();
        for (rint, target) in outgoing {
            if let Some(v) = self.reverse_refs.get_mut(&target) {
                v.retain(|&(src, r)| !(src == entity && r == rint));
            }
        }

        let chunk_id = self.slots.slot_unchecked(entity).chunk as usize;
        let row = self.slots.slot_unchecked(entity).row;
        if let Some(swapped) = self.chunks[chunk_id].remove_entity(row) {
            self.slots.slot_unchecked_mut(swapped).row = row;
        }
        self.bump_version();
        self.slots.free(entity);
    }

    // -- components --------------------------------------------------------

    pub fn add_component_bytes(
        &mut self,
        entity: EntityId,
        ty: ComponentType,
        bytes: &[u8],
    ) -> Result<(), EcsError> {
        self.require_alive(entity)?;
        let def = self.definition_of(entity);
        if def.has_component(ty) {
            return Err(EcsError::ComponentAlreadyPresent { entity });
        }
        let new_def = def.with_component(ty);
        self.migrate(entity, new_def);
        let slot = self.slots.slot_unchecked(entity);
        self.chunks[slot.chunk as usize].set_component_bytes(slot.row, ty, bytes);
        Ok(())
    }

    /// Typed convenience wrapper over `add_component_bytes` for `Copy` value
    /// types whose `ComponentType` has already been registered.
    pub fn add_component<T: Copy + 'static>(
        &mut self,
        entity: EntityId,
        value: T,
    ) -> Result<(), EcsError> {
        let ty = self.schema.get_component::<T>()?;
        let bytes = unsafe {
            std::slice::from_raw_parts(&value as *const T as *const u8, std::mem::size_of::<T>())
        };
        self.add_component_bytes(entity, ty, bytes)
    }

    pub fn remove_component(&mut self, entity: EntityId, ty: ComponentType) -> Result<(), EcsError> {
        self.require_alive(entity)?;
        let def = self.definition_of(entity);
        if !def.has_component(ty) {
            return Err(EcsError::ComponentNotPresent { entity });
        }
        let new_def = def.without_component(ty);
        self.migrate(entity, new_def);
        Ok(())
    }

    pub fn set_component_bytes(
        &mut self,
        entity: EntityId,
        ty: ComponentType,
        bytes: &[u8],
    ) -> Result<(), EcsError> {
        self.require_alive(entity)?;
        let def = self.definition_of(entity);
        if !def.has_component(ty) {
            return Err(EcsError::ComponentNotPresent { entity });
        }
        let slot = self.slots.slot_unchecked(entity);
        self.chunks[slot.chunk as usize].set_component_bytes(slot.row, ty, bytes);
        Ok(())
    }

    pub fn get_component_ref(&self, entity: EntityId, ty: ComponentType) -> Result<&[u8], EcsError> {
        self.require_alive(entity)?;
        let slot = self.slots.slot_unchecked(entity);
        self.chunks[slot.chunk as usize]
            .component_bytes(slot.row, ty)
            .ok_or(EcsError::ComponentNotPresent { entity })
    }

    pub fn try_get_component_ref(&self, entity: EntityId, ty: ComponentType) -> Option<&[u8]> {
        if !self.slots.is_alive(entity) {
            return None;
        }
        let slot = self.slots.slot_unchecked(entity);
        self.chunks[slot.chunk as usize].component_bytes(slot.row, ty)
    }

    // -- tags ----------------------------------------------------------

    pub fn add_tag(&mut self, entity: EntityId, ty: TagType) -> Result<(), EcsError> {
        self.require_alive(entity)?;
        let def = self.definition_of(entity);
        if def.has_tag(ty) {
            return Err(EcsError::TagAlreadyPresent { entity });
        }
        let new_def = def.with_tag(ty);
        self.migrate(entity, new_def);
        Ok(())
    }

    pub fn remove_tag(&mut self, entity: EntityId, ty: TagType) -> Result<(), EcsError> {
        self.require_alive(entity)?;
        let def = self.definition_of(entity);
        if !def.has_tag(ty) {
            return Err(EcsError::TagNotPresent { entity });
        }
        let new_def = def.without_tag(ty);
        self.migrate(entity, new_def);
        Ok(())
    }

    pub fn has_tag(&self, entity: EntityId, ty: TagType) -> bool {
        if !self.slots.is_alive(entity) {
            return false;
        }
        self.definition_of(entity).has_tag(ty)
    }

    // -- arrays ----------------------------------------------------------

    pub fn create_array(
        &mut self,
        entity: EntityId,
        ty: ArrayElementType,
        len: usize,
    ) -> Result<(), EcsError> {
        self.require_alive(entity)?;
        let def = self.definition_of(entity);
        if def.has_array(ty) {
            return Err(EcsError::ArrayAlreadyPresent { entity });
        }
        let new_def = def.with_array(ty);
        self.migrate(entity, new_def);
        let size = self.schema.array_element_size_of(ty);
        self.slots
            .slot_unchecked_mut(entity)
            .arrays
            .insert(ty, ArrayBuffer::new(size, len));
        Ok(())
    }

    pub fn create_array_with(
        &mut self,
        entity: EntityId,
        ty: ArrayElementType,
        bytes: &[u8],
    ) -> Result<(), EcsError> {
        let size = self.schema.array_element_size_of(ty) as usize;
        debug_assert_eq!(bytes.len() % size.max(1), 0);
        let len = if size == 0 { 0 } else { bytes.len() / size };
        self.create_array(entity, ty, len)?;
        let arr = self
            .slots
            .slot_unchecked_mut(entity)
            .arrays
            .get_mut(&ty)
            .expect("array was just created");
        for i in 0..len {
            arr.set_element(i, &bytes[i * size..(i + 1) * size]);
        }
        Ok(())
    }

    pub fn destroy_array(&mut self, entity: EntityId, ty: ArrayElementType) -> Result<(), EcsError> {
        self.require_alive(entity)?;
        let def = self.definition_of(entity);
        if !def.has_array(ty) {
            return Err(EcsError::ArrayNotPresent { entity });
        }
        self.slots.slot_unchecked_mut(entity).arrays.remove(&ty);
        let new_def = def.without_array(ty);
        self.migrate(entity, new_def);
        Ok(())
    }

    pub fn resize_array(
        &mut self,
        entity: EntityId,
        ty: ArrayElementType,
        new_len: usize,
    ) -> Result<(), EcsError> {
        self.require_alive(entity)?;
        let arr = self
            .slots
            .slot_unchecked_mut(entity)
            .arrays
            .get_mut(&ty)
            .ok_or(EcsError::ArrayNotPresent { entity })?;
        arr.resize(new_len);
        Ok(())
    }

    pub fn get_array(&self, entity: EntityId, ty: ArrayElementType) -> Result<&[u8], EcsError> {
        self.require_alive(entity)?;
        self.slots
            .slot_unchecked(entity)
            .arrays
            .get(&ty)
            .map(|a| a.as_bytes())
            .ok_or(EcsError::ArrayNotPresent { entity })
    }

    pub fn set_array_element(
        &mut self,
        entity: EntityId,
        ty: ArrayElementType,
        index: usize,
        bytes: &[u8],
    ) -> Result<(), EcsError> {
        self.require_alive(entity)?;
        let arr = self
            .slots
            .slot_unchecked_mut(entity)
            .arrays
            .get_mut(&ty)
            .ok_or(EcsError::ArrayNotPresent { entity })?;
        arr.set_element(index, bytes)
            .ok_or(EcsError::OutOfRange { index: index as u32 })
    }

    // -- parent / children -----------------------------------------------

    pub fn parent_of(&self, entity: EntityId) -> EntityId {
        self.slots.slot_unchecked(entity).parent
    }

    pub fn children_of(&self, entity: EntityId) -> &[EntityId] {
        &self.slots.slot_unchecked(entity).children
    }

    pub fn set_parent(&mut self, entity: EntityId, parent: EntityId) -> Result<(), EcsError> {
        self.require_alive(entity)?;
        if !parent.is_none() {
            self.require_alive(parent)?;
            let mut cur = parent;
            loop {
                if cur == entity {
                    return Err(EcsError::CycleDetected { entity });
                }
                let next = self.slots.slot_unchecked(cur).parent;
                if next.is_none() {
                    break;
                }
                cur = next;
            }
        }

        let old_parent = self.slots.slot_unchecked(entity).parent;
        if old_parent == parent {
            return Ok(());
        }
        if !old_parent.is_none() {
            if let Some(pslot) = self.slots.get_mut(old_parent) {
                pslot.children.retain(|&c| c != entity);
            }
        }
        if !parent.is_none() {
            self.slots.slot_unchecked_mut(parent).children.push(entity);
        }
        self.slots.slot_unchecked_mut(entity).parent = parent;

        let explicit_intent_enabled =
            !matches!(self.slots.slot_unchecked(entity).state, EntityState::Disabled);
        let ancestor_ok = parent.is_none() || self.is_enabled(parent);
        let new_state = if !explicit_intent_enabled {
            EntityState::Disabled
        } else if ancestor_ok {
            EntityState::Enabled
        } else {
            EntityState::EnabledButDisabledByAncestor
        };
        self.slots.slot_unchecked_mut(entity).state = new_state;
        let now_enabled = new_state.is_enabled();
        self.cascade_enabled(entity, now_enabled);
        Ok(())
    }

    // -- references --------------------------------------------------------

    pub fn add_reference(&mut self, entity: EntityId, other: EntityId) -> Result<u32, EcsError> {
        self.require_alive(entity)?;
        self.require_alive(other)?;
        let rint = self.slots.slot_unchecked_mut(entity).references.add(other);
        self.reverse_refs.entry(other).or_default().push((entity, rint));
        Ok(rint)
    }

    /// Append a reference slot without requiring `other` to be alive, so a
    /// previously-cleared reference (serialized as `EntityId::NONE`) can be
    /// reconstructed at its original `rint` instead of being dropped and
    /// shifting every later reference down by one.
    pub(crate) fn restore_reference(&mut self, entity: EntityId, other: EntityId) -> u32 {
        let rint = self.slots.slot_unchecked_mut(entity).references.add(other);
        if !other.is_none() {
            self.reverse_refs.entry(other).or_default().push((entity, rint));
        }
        rint
    }

    pub fn set_reference(
        &mut self,
        entity: EntityId,
        rint: u32,
        other: EntityId,
    ) -> Result<(), EcsError> {
        self.require_alive(entity)?;
        if !other.is_none() {
            self.require_alive(other)?;
        }
        let old = self
            .slots
            .slot_unchecked(entity)
            .references
            .get(rint)
            .ok_or(EcsError::ReferenceOutOfRange { entity, rint })?;
        if !old.is_none() {
            if let Some(v) = self.reverse_refs.get_mut(&old) {
                v.retain(|&(src, r)| !(src == entity && r == rint));
            }
        }
        self.slots.slot_unchecked_mut(entity).references.set(rint, other);
        if !other.is_none() {
            self.reverse_refs.entry(other).or_default().push((entity, rint));
        }
        Ok(())
    }

    pub fn get_reference(&self, entity: EntityId, rint: u32) -> Result<EntityId, EcsError> {
        self.require_alive(entity)?;
        self.slots
            .slot_unchecked(entity)
            .references
            .get(rint)
            .ok_or(EcsError::ReferenceOutOfRange { entity, rint })
    }

    pub fn remove_reference(&mut self, entity: EntityId, rint: u32) -> Result<(), EcsError> {
        self.set_reference(entity, rint, EntityId::NONE)
    }

    // -- enabled state -------------------------------------------------

    pub fn is_enabled(&self, entity: EntityId) -> bool {
        if !self.slots.is_alive(entity) {
            return false;
        }
        self.slots.slot_unchecked(entity).state.is_enabled()
    }

    pub fn state_of(&self, entity: EntityId) -> EntityState {
        self.slots.slot_unchecked(entity).state
    }

    pub fn set_enabled(&mut self, entity: EntityId, enabled: bool) -> Result<(), EcsError> {
        self.require_alive(entity)?;
        let parent = self.slots.slot_unchecked(entity).parent;
        let ancestor_ok = parent.is_none() || self.is_enabled(parent);
        let new_state = if enabled {
            if ancestor_ok {
                EntityState::Enabled
            } else {
                EntityState::EnabledButDisabledByAncestor
            }
        } else {
            EntityState::Disabled
        };
        self.slots.slot_unchecked_mut(entity).state = new_state;
        let now_enabled = new_state.is_enabled();
        self.cascade_enabled(entity, now_enabled);
        Ok(())
    }

    fn cascade_enabled(&mut self, entity: EntityId, ancestor_enabled: bool) {
        let children = self.slots.slot_unchecked(entity).children.clone();
        for child in children {
            let slot = self.slots.slot_unchecked_mut(child);
            match (slot.state, ancestor_enabled) {
                (EntityState::Enabled, false) => {
                    slot.state = EntityState::EnabledButDisabledByAncestor;
                    self.cascade_enabled(child, false);
                }
                (EntityState::EnabledButDisabledByAncestor, true) => {
                    slot.state = EntityState::Enabled;
                    self.cascade_enabled(child, true);
                }
                _ => {}
            }
        }
    }

    // -- queries -----------------------------------------------------------

    /// Chunk indices whose `Definition` satisfies every supplied mask.
    /// `exclude_tags.contains_any` must be false for a match.
    pub fn matching_chunks(
        &self,
        components: &Definition,
        include_tags: Option<&crate::bitset::Bitset256>,
        exclude_tags: Option<&crate::bitset::Bitset256>,
    ) -> Vec<u32> {
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| {
                let def = chunk.definition();
                if !def.contains_all(components) {
                    return false;
                }
                if let Some(inc) = include_tags {
                    if !def.tags.contains_all(inc) {
                        return false;
                    }
                }
                if let Some(exc) = exclude_tags {
                    if def.tags.contains_any(exc) {
                        return false;
                    }
                }
                true
            })
            .map(|(i, _)| i as u32)
            .collect()
    }

    /// Bitset query: entity ids only, filtered by component/array masks,
    /// optional tag include/exclude masks, and (optionally) enabled state.
    pub fn query_entities(
        &self,
        components: &Definition,
        include_tags: Option<&crate::bitset::Bitset256>,
        exclude_tags: Option<&crate::bitset::Bitset256>,
        only_enabled: bool,
    ) -> Vec<EntityId> {
        let chunk_ids = self.matching_chunks(components, include_tags, exclude_tags);
        let mut out = Vec::new();
        for id in chunk_ids {
            for &entity in self.chunks[id as usize].entities() {
                if only_enabled && !self.is_enabled(entity) {
                    continue;
                }
                out.push(entity);
            }
        }
        out
    }

    /// Definition query: entities whose Definition `containsAll` the given
    /// required Definition's component/array masks and whose tag mask
    /// `containsAll` the required Definition's tag mask.
    pub fn query_definition(&self, required: &Definition) -> Vec<EntityId> {
        let chunk_ids: Vec<u32> = self
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| chunk.definition().contains_all(required))
            .map(|(i, _)| i as u32)
            .collect();
        let mut out = Vec::new();
        for id in chunk_ids {
            out.extend_from_slice(self.chunks[id as usize].entities());
        }
        out
    }

    pub fn component_type_id<T: 'static>(&self) -> Result<ComponentType, EcsError> {
        self.schema.get_component::<T>()
    }

    pub fn entity_count(&self) -> usize {
        self.slots.live_entities().count()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn max_entity(&self) -> u32 {
        self.slots.max_entity()
    }

    pub fn free_ids(&self) -> &[u32] {
        self.slots.free_ids()
    }

    pub fn disabled_tag(&self) -> TagType {
        DISABLED_TAG
    }
}
