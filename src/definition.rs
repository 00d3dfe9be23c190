//! `Definition`: the archetype key. `Archetype`: a `Definition` paired with a
//! `Schema` reference, used by callers that want to inspect composition
//! without going through a `World`.

use crate::bitset::Bitset256;
use crate::schema::{ArrayElementType, ComponentType, Schema, TagType};

/// Triple of three Bitset-256 values identifying an exact combination of
/// component types, array-element types, and tags. Equality is structural
/// over the three masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Definition {
    pub components: Bitset256,
    pub arrays: Bitset256,
    pub tags: Bitset256,
}

impl Definition {
    /// The empty definition (no components, arrays, or tags).
    pub const fn empty() -> Self {
        Self {
            components: Bitset256::empty(),
            arrays: Bitset256::empty(),
            tags: Bitset256::empty(),
        }
    }

    pub fn with_component(mut self, ty: ComponentType) -> Self {
        self.components.set(ty.0 as u32).expect("component index always < 255");
        self
    }

    pub fn without_component(mut self, ty: ComponentType) -> Self {
        self.components.clear(ty.0 as u32).expect("component index always < 255");
        self
    }

    pub fn with_array(mut self, ty: ArrayElementType) -> Self {
        self.arrays.set(ty.0 as u32).expect("array index always < 255");
        self
    }

    pub fn without_array(mut self, ty: ArrayElementType) -> Self {
        self.arrays.clear(ty.0 as u32).expect("array index always < 255");
        self
    }

    pub fn with_tag(mut self, ty: TagType) -> Self {
        self.tags.set(ty.0 as u32).expect("tag index always < 255");
        self
    }

    pub fn without_tag(mut self, ty: TagType) -> Self {
        self.tags.clear(ty.0 as u32).expect("tag index always < 255");
        self
    }

    pub fn has_component(&self, ty: ComponentType) -> bool {
        self.components.contains(ty.0 as u32).unwrap_or(false)
    }

    pub fn has_array(&self, ty: ArrayElementType) -> bool {
        self.arrays.contains(ty.0 as u32).unwrap_or(false)
    }

    pub fn has_tag(&self, ty: TagType) -> bool {
        self.tags.contains(ty.0 as u32).unwrap_or(false)
    }

    /// Component types present, ascending.
    pub fn component_types(&self) -> impl Iterator<Item = ComponentType> + '_ {
        self.components.iter().map(|i| ComponentType(i as u8))
    }

    /// Array-element types present, ascending.
    pub fn array_types(&self) -> impl Iterator<Item = ArrayElementType> + '_ {
        self.arrays.iter().map(|i| ArrayElementType(i as u8))
    }

    /// Whether this definition's masks are a superset of `required`'s, for
    /// each of the three masks independently.
    pub fn contains_all(&self, required: &Definition) -> bool {
        self.components.contains_all(&required.components)
            && self.arrays.contains_all(&required.arrays)
            && self.tags.contains_all(&required.tags)
    }
}

/// A `Definition` bundled with the `Schema` that assigned its type indices.
/// Exists purely as an inspection handle for callers; `World` stores
/// `Definition`s directly (a `Schema` is shared, not duplicated, per-chunk).
#[derive(Clone, Copy)]
pub struct Archetype<'s> {
    pub definition: Definition,
    pub schema: &'s Schema,
}

impl<'s> Archetype<'s> {
    pub fn new(definition: Definition, schema: &'s Schema) -> Self {
        Self { definition, schema }
    }

    /// Human-readable component names in this archetype, for diagnostics.
    pub fn component_names(&self) -> Vec<&'s str> {
        self.definition
            .component_types()
            .map(|ty| self.schema.component_name(ty))
            .collect()
    }

    /// Human-readable tag names in this archetype, for diagnostics.
    pub fn tag_names(&self) -> Vec<&'s str> {
        self.definition
            .tags
            .iter()
            .map(|i| self.schema.tag_name(TagType(i as u8)))
            .collect()
    }
}

impl<'s> std::fmt::Debug for Archetype<'s> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archetype")
            .field("components", &self.component_names())
            .field("tags", &self.tag_names())
            .finish()
    }
}
