//! Storage for all entities sharing one [`Definition`](crate::definition::Definition).
//!
//! Components are plain-old-data with a fixed size known at registration and
//! no reflection, so columns are raw byte buffers with
//! no per-element destructor: growing, shrinking, and swap-removing a column
//! is a matter of `memcpy`, never a typed drop. This is simpler than a
//! generic-component store and needs no vtable machinery.
//!
//! # Safety
//!
//! This module manages raw allocations directly (`std::alloc`) because
//! component columns are type-erased byte buffers. Every public entry point
//! either works purely in terms of `&[u8]`/`&mut [u8]` or is documented with
//! the invariant the caller must uphold.

use std::alloc::{self, Layout};
use std::ptr;

use crate::definition::Definition;
use crate::entity::EntityId;
use crate::schema::{ComponentType, Schema};

/// A type-erased, densely packed byte column: `len` logical rows of
/// `item_size` bytes each.
struct Column {
    data: *mut u8,
    len: usize,
    capacity: usize,
    item_size: usize,
}

// Columns store raw POD bytes only; no thread-specific state is captured.
unsafe impl Send for Column {}
unsafe impl Sync for Column {}

impl Column {
    fn new(item_size: usize) -> Self {
        Self {
            data: ptr::null_mut(),
            len: 0,
            capacity: 0,
            item_size,
        }
    }

    fn layout_for_capacity(&self, cap: usize) -> Option<Layout> {
        if self.item_size == 0 || cap == 0 {
            return None;
        }
        Layout::from_size_align(self.item_size * cap, 8).ok()
    }

    fn grow_if_needed(&mut self) {
        if self.len < self.capacity {
            return;
        }
        let new_cap = if self.capacity == 0 { 4 } else { self.capacity * 2 };
        if self.item_size == 0 {
            self.capacity = new_cap;
            return;
        }
        let new_layout = self
            .layout_for_capacity(new_cap)
            .expect("column layout overflow");
        unsafe {
            let new_data = if self.capacity == 0 {
                alloc::alloc(new_layout)
            } else {
                let old_layout = self
                    .layout_for_capacity(self.capacity)
                    .expect("old layout must be valid");
                alloc::realloc(self.data, old_layout, new_layout.size())
            };
            assert!(!new_data.is_null(), "allocation failed");
            self.data = new_data;
        }
        self.capacity = new_cap;
    }

    #[inline]
    fn byte_offset(&self, row: usize) -> usize {
        debug_assert!(row < self.len);
        row * self.item_size
    }

    fn row_bytes(&self, row: usize) -> &[u8] {
        if self.item_size == 0 {
            return &[];
        }
        let off = self.byte_offset(row);
        unsafe { std::slice::from_raw_parts(self.data.add(off), self.item_size) }
    }

    fn row_bytes_mut(&mut self, row: usize) -> &mut [u8] {
        if self.item_size == 0 {
            return &mut [];
        }
        let off = self.byte_offset(row);
        unsafe { std::slice::from_raw_parts_mut(self.data.add(off), self.item_size) }
    }

    /// Append a zero-filled row.
    fn push_zeroed(&mut self) {
        self.grow_if_needed();
        if self.item_size > 0 {
            unsafe {
                let dst = self.data.add(self.len * self.item_size);
                ptr::write_bytes(dst, 0, self.item_size);
            }
        }
        self.len += 1;
    }

    /// Append a row copied from `bytes` (must be exactly `item_size` long).
    fn push_bytes(&mut self, bytes: &[u8]) {
        debug_assert_eq!(bytes.len(), self.item_size);
        self.grow_if_needed();
        if self.item_size > 0 {
            unsafe {
                let dst = self.data.add(self.len * self.item_size);
                ptr::copy_nonoverlapping(bytes.as_ptr(), dst, self.item_size);
            }
        }
        self.len += 1;
    }

    /// Swap-remove `row`: moves the last row's bytes into the vacated slot.
    fn swap_remove(&mut self, row: usize) {
        debug_assert!(row < self.len);
        let last = self.len - 1;
        if self.item_size > 0 && row != last {
            unsafe {
                let src = self.data.add(last * self.item_size);
                let dst = self.data.add(row * self.item_size);
                ptr::copy_nonoverlapping(src, dst, self.item_size);
            }
        }
        self.len -= 1;
    }

    fn dealloc_storage(&mut self) {
        if self.item_size > 0 && self.capacity > 0 {
            let layout = self
                .layout_for_capacity(self.capacity)
                .expect("layout must be valid");
            unsafe {
                alloc::dealloc(self.data, layout);
            }
        }
        self.data = ptr::null_mut();
        self.len = 0;
        self.capacity = 0;
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        self.dealloc_storage();
    }
}

impl std::fmt::Debug for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("item_size", &self.item_size)
            .finish()
    }
}

/// Storage for all entities sharing one [`Definition`]: a dense entity-id
/// list plus one raw byte column per component type in the definition.
#[derive(Debug)]
pub struct Chunk {
    definition: Definition,
    /// Sorted by `ComponentType` for deterministic iteration and binary search.
    columns: Vec<(ComponentType, Column)>,
    entities: Vec<EntityId>,
}

impl Chunk {
    /// Create an empty chunk for `definition`, sizing one column per
    /// component type using `schema`.
    pub fn new(definition: Definition, schema: &Schema) -> Self {
        let mut columns: Vec<(ComponentType, Column)> = definition
            .component_types()
            .map(|ty| (ty, Column::new(schema.size_of(ty) as usize)))
            .collect();
        columns.sort_by_key(|(ty, _)| *ty);
        Self {
            definition,
            columns,
            entities: Vec::new(),
        }
    }

    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    #[inline]
    fn column_index(&self, ty: ComponentType) -> Option<usize> {
        self.columns.binary_search_by_key(&ty, |(id, _)| *id).ok()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn contains_all_types(&self, required: &Definition) -> bool {
        self.definition.contains_all(required)
    }

    /// Append `entity` as a new row with every component column zero-filled.
    /// Returns the new row index.
    pub fn add_entity(&mut self, entity: EntityId) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        for (_, column) in &mut self.columns {
            column.push_zeroed();
        }
        row
    }

    /// Swap-remove the entity at `row`. Returns the entity that was moved
    /// into `row` (the previous last entity), or `None` if `row` was last.
    pub fn remove_entity(&mut self, row: usize) -> Option<EntityId> {
        let last = self.entities.len() - 1;
        self.entities.swap_remove(row);
        for (_, column) in &mut self.columns {
            column.swap_remove(row);
        }
        if row < last {
            Some(self.entities[row])
        } else {
            None
        }
    }

    /// Read-only view of component `ty`'s bytes at `row`.
    pub fn component_bytes(&self, row: usize, ty: ComponentType) -> Option<&[u8]> {
        let idx = self.column_index(ty)?;
        Some(self.columns[idx].1.row_bytes(row))
    }

    /// Mutable view of component `ty`'s bytes at `row`.
    pub fn component_bytes_mut(&mut self, row: usize, ty: ComponentType) -> Option<&mut [u8]> {
        let idx = self.column_index(ty)?;
        Some(self.columns[idx].1.row_bytes_mut(row))
    }

    /// Overwrite component `ty`'s bytes at `row` with `bytes`.
    pub fn set_component_bytes(&mut self, row: usize, ty: ComponentType, bytes: &[u8]) {
        let idx = self.column_index(ty).expect("component type not in this chunk");
        let dst = self.columns[idx].1.row_bytes_mut(row);
        dst.copy_from_slice(bytes);
    }

    /// Move the entity at `row` in `self` (the source chunk) into `dest`,
    /// copying bytes for every component present in both chunks' definitions,
    /// leaving destination-only columns zero-filled, and dropping
    /// source-only columns. Swap-removes from `self`.
    ///
    /// Returns `(dest_row, swapped_into_source_row)`.
    pub fn move_entity(&mut self, row: usize, dest: &mut Chunk) -> (usize, Option<EntityId>) {
        let entity = self.entities[row];
        let dest_row = dest.entities.len();
        dest.entities.push(entity);

        for (ty, dest_column) in &mut dest.columns {
            if let Some(src_idx) = self.column_index(*ty) {
                let bytes = self.columns[src_idx].1.row_bytes(row).to_vec();
                dest_column.push_bytes(&bytes);
            } else {
                dest_column.push_zeroed();
            }
        }

        let swapped = self.remove_entity(row);
        (dest_row, swapped)
    }
}
