//! Type-index registry: three independent `u8`-indexed namespaces for
//! components, array elements, and tags.

use std::any::TypeId;
use std::collections::HashMap;

use crate::error::EcsError;

/// Maximum number of live entries in any one namespace. Index 255 is never
/// assigned (kept free to mirror the bitset's reserved top bit).
pub const MAX_TYPES: usize = 254;

/// Dense index into the component namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentType(pub u8);

/// Dense index into the array-element namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArrayElementType(pub u8);

/// Dense index into the tag namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TagType(pub u8);

/// Fixed index of the reserved `Disabled` tag. Registered by every fresh
/// `Schema` before any user type, so it is stable across Schema instances.
pub const DISABLED_TAG: TagType = TagType(0);

/// A single named field inside a registered type's byte layout, used only by
/// the serializer to emit self-describing layout metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: String,
    pub offset: u16,
    pub size: u16,
}

#[derive(Debug, Clone)]
struct TypeEntry {
    name: String,
    size: u16,
    layout: Option<Vec<FieldLayout>>,
    type_id: Option<TypeId>,
}

/// One `u8`-indexed namespace (component, array-element, or tag).
#[derive(Debug, Default)]
struct Namespace {
    by_name: HashMap<String, u8>,
    entries: Vec<TypeEntry>,
}

impl Namespace {
    fn register(
        &mut self,
        name: &str,
        size: u16,
        layout: Option<Vec<FieldLayout>>,
        type_id: Option<TypeId>,
    ) -> Result<u8, EcsError> {
        if let Some(&idx) = self.by_name.get(name) {
            let existing = &self.entries[idx as usize];
            if existing.size != size || existing.layout != layout {
                tracing::warn!(
                    name,
                    existing_size = existing.size,
                    new_size = size,
                    "re-registration with mismatched size/layout"
                );
                return Err(EcsError::SchemaMismatch);
            }
            return Ok(idx);
        }
        if self.entries.len() >= MAX_TYPES {
            panic!("schema namespace exhausted: cannot register more than {MAX_TYPES} types");
        }
        let idx = self.entries.len() as u8;
        self.entries.push(TypeEntry {
            name: name.to_string(),
            size,
            layout,
            type_id,
        });
        self.by_name.insert(name.to_string(), idx);
        Ok(idx)
    }

    fn lookup_by_name(&self, name: &str) -> Option<u8> {
        self.by_name.get(name).copied()
    }

    fn lookup_by_type(&self, type_id: TypeId) -> Option<u8> {
        self.entries
            .iter()
            .position(|e| e.type_id == Some(type_id))
            .map(|i| i as u8)
    }

    fn size_of(&self, idx: u8) -> Option<u16> {
        self.entries.get(idx as usize).map(|e| e.size)
    }

    fn layout_of(&self, idx: u8) -> Option<&[FieldLayout]> {
        self.entries
            .get(idx as usize)
            .and_then(|e| e.layout.as_deref())
    }

    fn name_of(&self, idx: u8) -> Option<&str> {
        self.entries.get(idx as usize).map(|e| e.name.as_str())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn iter(&self) -> impl Iterator<Item = (u8, &TypeEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i as u8, e))
    }
}

/// Registry assigning a dense `u8` index to each component/array/tag type.
///
/// Indices start at 0, are dense, and are stable for the lifetime of the
/// `Schema`. Re-registration under the same name is idempotent as long as the
/// size and layout match; a mismatch is rejected with `SchemaMismatch`.
#[derive(Debug)]
pub struct Schema {
    components: Namespace,
    arrays: Namespace,
    tags: Namespace,
}

impl Schema {
    /// Create a fresh schema. Registers the reserved `Disabled` tag at index
    /// 0 before any user type can be registered.
    pub fn new() -> Self {
        let mut tags = Namespace::default();
        tags.register("__disabled", 0, None, None)
            .expect("registering the reserved Disabled tag cannot fail");
        Self {
            components: Namespace::default(),
            arrays: Namespace::default(),
            tags,
        }
    }

    /// Register a component type by name, returning its stable index.
    /// Idempotent: calling again with the same name and size returns the same
    /// index. A mismatched size/layout on re-registration is rejected.
    pub fn register_component<T: 'static>(
        &mut self,
        name: &str,
        size: u16,
        layout: Option<Vec<FieldLayout>>,
    ) -> Result<ComponentType, EcsError> {
        self.components
            .register(name, size, layout, Some(TypeId::of::<T>()))
            .map(ComponentType)
    }

    /// Register an array-element type by name, returning its stable index.
    pub fn register_array_element<T: 'static>(
        &mut self,
        name: &str,
        size: u16,
        layout: Option<Vec<FieldLayout>>,
    ) -> Result<ArrayElementType, EcsError> {
        self.arrays
            .register(name, size, layout, Some(TypeId::of::<T>()))
            .map(ArrayElementType)
    }

    /// Register a zero-byte tag type by name, returning its stable index.
    pub fn register_tag<T: 'static>(&mut self, name: &str) -> Result<TagType, EcsError> {
        self.tags
            .register(name, 0, None, Some(TypeId::of::<T>()))
            .map(TagType)
    }

    /// Register a tag by name only (no static type backing it), used by the
    /// serializer and the operation buffer where tags are addressed by index
    /// rather than by a Rust type.
    pub fn register_tag_dynamic(&mut self, name: &str) -> Result<TagType, EcsError> {
        self.tags.register(name, 0, None, None).map(TagType)
    }

    /// Look up a previously registered component type by its Rust type.
    pub fn get_component<T: 'static>(&self) -> Result<ComponentType, EcsError> {
        self.components
            .lookup_by_type(TypeId::of::<T>())
            .map(ComponentType)
            .ok_or(EcsError::NotRegistered)
    }

    /// Look up a previously registered array-element type by its Rust type.
    pub fn get_array_element<T: 'static>(&self) -> Result<ArrayElementType, EcsError> {
        self.arrays
            .lookup_by_type(TypeId::of::<T>())
            .map(ArrayElementType)
            .ok_or(EcsError::NotRegistered)
    }

    /// Look up a previously registered tag type by its Rust type.
    pub fn get_tag<T: 'static>(&self) -> Result<TagType, EcsError> {
        self.tags
            .lookup_by_type(TypeId::of::<T>())
            .map(TagType)
            .ok_or(EcsError::NotRegistered)
    }

    /// Look up a component type by its registered name.
    pub fn component_by_name(&self, name: &str) -> Result<ComponentType, EcsError> {
        self.components
            .lookup_by_name(name)
            .map(ComponentType)
            .ok_or(EcsError::NotRegistered)
    }

    /// Look up an array-element type by its registered name.
    pub fn array_element_by_name(&self, name: &str) -> Result<ArrayElementType, EcsError> {
        self.arrays
            .lookup_by_name(name)
            .map(ArrayElementType)
            .ok_or(EcsError::NotRegistered)
    }

    /// Look up a tag type by its registered name.
    pub fn tag_by_name(&self, name: &str) -> Result<TagType, EcsError> {
        self.tags
            .lookup_by_name(name)
            .map(TagType)
            .ok_or(EcsError::NotRegistered)
    }

    pub fn size_of(&self, ty: ComponentType) -> u16 {
        self.components
            .size_of(ty.0)
            .expect("ComponentType must have been obtained from this Schema")
    }

    pub fn array_element_size_of(&self, ty: ArrayElementType) -> u16 {
        self.arrays
            .size_of(ty.0)
            .expect("ArrayElementType must have been obtained from this Schema")
    }

    pub fn layout_of(&self, ty: ComponentType) -> Option<&[FieldLayout]> {
        self.components.layout_of(ty.0)
    }

    pub fn component_name(&self, ty: ComponentType) -> &str {
        self.components
            .name_of(ty.0)
            .expect("ComponentType must have been obtained from this Schema")
    }

    pub fn array_element_name(&self, ty: ArrayElementType) -> &str {
        self.arrays
            .name_of(ty.0)
            .expect("ArrayElementType must have been obtained from this Schema")
    }

    pub fn tag_name(&self, ty: TagType) -> &str {
        self.tags
            .name_of(ty.0)
            .expect("TagType must have been obtained from this Schema")
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn array_element_count(&self) -> usize {
        self.arrays.len()
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Iterate all registered components as `(index, name, size, layout)`.
    pub fn components_iter(&self) -> impl Iterator<Item = (u8, &str, u16, Option<&[FieldLayout]>)> {
        self.components
            .iter()
            .map(|(i, e)| (i, e.name.as_str(), e.size, e.layout.as_deref()))
    }

    /// Iterate all registered array elements as `(index, name, size, layout)`.
    pub fn arrays_iter(&self) -> impl Iterator<Item = (u8, &str, u16, Option<&[FieldLayout]>)> {
        self.arrays
            .iter()
            .map(|(i, e)| (i, e.name.as_str(), e.size, e.layout.as_deref()))
    }

    /// Iterate all registered tags (including the reserved `Disabled` tag at
    /// index 0) as `(index, name)`.
    pub fn tags_iter(&self) -> impl Iterator<Item = (u8, &str)> {
        self.tags.iter().map(|(i, e)| (i, e.name.as_str()))
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}
