//! Binary world format: a self-describing blob covering the schema, the
//! slot table, every chunk, and the free-id stack.
//!
//! Wire format (all integers little-endian):
//! - Magic `WRLD`, `u16` major, `u16` minor.
//! - Schema block: `u16` count, then per type: `u8` kind (0=component,
//!   1=array, 2=tag), `u8` index, `u16` size, length-prefixed UTF-8 name,
//!   optional layout (`u16` field count, then per field: name, `u16`
//!   offset, `u16` size).
//! - Slot table block: `u32` max-entity, then per live entity: `u32` id,
//!   `u32` parent, `u8` state, references (`u16` count, `u32[]`), arrays
//!   (`u16` count, then per array: `u8` type index, `u32` length, raw
//!   bytes).
//! - Chunk block: `u32` chunk count; per chunk: Definition (3 × 32 bytes),
//!   `u32` row count, `u32[]` entity ids, then for each component index set
//!   in the Definition (ascending), `row_count * size` raw bytes.
//! - Free-id block: `u32` count, `u32[]` ids.

use std::io::{self, Read, Write};

use crate::bitset::Bitset256;
use crate::definition::Definition;
use crate::entity::EntityState;
use crate::error::EcsError;
use crate::schema::{ArrayElementType, ComponentType, FieldLayout, Schema, TagType};
use crate::world::World;

const MAGIC: &[u8; 4] = b"WRLD";
const VERSION_MAJOR: u16 = 1;
const VERSION_MINOR: u16 = 0;

fn write_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

fn write_u16<W: Write>(w: &mut W, v: u16) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_str<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    write_u16(w, s.len() as u16)?;
    w.write_all(s.as_bytes())
}

fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u16<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_str<R: Read>(r: &mut R) -> io::Result<String> {
    let len = read_u16(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn write_layout<W: Write>(w: &mut W, layout: Option<&[FieldLayout]>) -> io::Result<()> {
    match layout {
        None => write_u16(w, 0),
        Some(fields) => {
            write_u16(w, fields.len() as u16)?;
            for f in fields {
                write_str(w, &f.name)?;
                write_u16(w, f.offset)?;
                write_u16(w, f.size)?;
            }
            Ok(())
        }
    }
}

fn read_layout<R: Read>(r: &mut R) -> io::Result<Option<Vec<FieldLayout>>> {
    let count = read_u16(r)?;
    if count == 0 {
        return Ok(None);
    }
    let mut fields = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = read_str(r)?;
        let offset = read_u16(r)?;
        let size = read_u16(r)?;
        fields.push(FieldLayout { name, offset, size });
    }
    Ok(Some(fields))
}

/// Serialize `world`'s full logical state (schema, entities, chunks,
/// free-id stack) into `sink`.
pub fn serialize<W: Write>(world: &World, sink: &mut W) -> io::Result<()> {
    sink.write_all(MAGIC)?;
    write_u16(sink, VERSION_MAJOR)?;
    write_u16(sink, VERSION_MINOR)?;

    write_schema(world.schema(), sink)?;
    write_slot_table(world, sink)?;
    write_chunks(world, sink)?;
    write_free_ids(world, sink)?;
    Ok(())
}

fn write_schema<W: Write>(schema: &Schema, sink: &mut W) -> io::Result<()> {
    let total = schema.component_count() + schema.array_element_count() + schema.tag_count();
    write_u16(sink, total as u16)?;
    for (idx, name, size, layout) in schema.components_iter() {
        write_u8(sink, 0)?;
        write_u8(sink, idx)?;
        write_u16(sink, size)?;
        write_str(sink, name)?;
        write_layout(sink, layout)?;
    }
    for (idx, name, size, layout) in schema.arrays_iter() {
        write_u8(sink, 1)?;
        write_u8(sink, idx)?;
        write_u16(sink, size)?;
        write_str(sink, name)?;
        write_layout(sink, layout)?;
    }
    for (idx, name) in schema.tags_iter() {
        write_u8(sink, 2)?;
        write_u8(sink, idx)?;
        write_u16(sink, 0)?;
        write_str(sink, name)?;
        write_layout(sink, None)?;
    }
    Ok(())
}

fn write_slot_table<W: Write>(world: &World, sink: &mut W) -> io::Result<()> {
    write_u32(sink, world.max_entity())?;
    for entity in world.slots().live_entities() {
        let slot = world.slots().get(entity).expect("live_entities only yields alive ids");
        write_u32(sink, entity.raw())?;
        write_u32(sink, slot.parent.raw())?;
        write_u8(sink, state_tag(slot.state))?;

        write_u16(sink, slot.references.len() as u16)?;
        for (_, target) in slot.references.iter() {
            write_u32(sink, target.raw())?;
        }

        write_u16(sink, slot.arrays.len() as u16)?;
        let mut array_keys: Vec<&ArrayElementType> = slot.arrays.keys().collect();
        array_keys.sort_by_key(|ty| ty.0);
        for ty in array_keys {
            let arr = &slot.arrays[ty];
            write_u8(sink, ty.0)?;
            write_u32(sink, arr.len() as u32)?;
            sink.write_all(arr.as_bytes())?;
        }
    }
    Ok(())
}

fn state_tag(state: EntityState) -> u8 {
    match state {
        EntityState::Free => 0,
        EntityState::Enabled => 1,
        EntityState::Disabled => 2,
        EntityState::EnabledButDisabledByAncestor => 3,
    }
}

fn state_from_tag(tag: u8) -> io::Result<EntityState> {
    match tag {
        0 => Ok(EntityState::Free),
        1 => Ok(EntityState::Enabled),
        2 => Ok(EntityState::Disabled),
        3 => Ok(EntityState::EnabledButDisabledByAncestor),
        other => Err(io::Error::new(io::ErrorKind::InvalidData, format!("unknown state tag {other}"))),
    }
}

fn write_chunks<W: Write>(world: &World, sink: &mut W) -> io::Result<()> {
    write_u32(sink, world.chunk_count() as u32)?;
    for chunk in world.chunks() {
        let def = chunk.definition();
        sink.write_all(&def.components.to_bytes())?;
        sink.write_all(&def.arrays.to_bytes())?;
        sink.write_all(&def.tags.to_bytes())?;

        write_u32(sink, chunk.len() as u32)?;
        for &entity in chunk.entities() {
            write_u32(sink, entity.raw())?;
        }
        for ty in def.component_types() {
            for row in 0..chunk.len() {
                let bytes = chunk.component_bytes(row, ty).expect("column present per definition");
                sink.write_all(bytes)?;
            }
        }
    }
    Ok(())
}

fn write_free_ids<W: Write>(world: &World, sink: &mut W) -> io::Result<()> {
    let ids = world.free_ids();
    write_u32(sink, ids.len() as u32)?;
    for &id in ids {
        write_u32(sink, id)?;
    }
    Ok(())
}

/// Deserialize a world previously produced by [`serialize`]. The caller
/// supplies a `schema` that must cover every type index the stream
/// references (by kind+index+size); a mismatch is fatal (`SchemaMismatch`).
pub fn deserialize<R: Read>(source: &mut R, schema: Schema) -> Result<World, EcsError> {
    let mut magic = [0u8; 4];
    source.read_exact(&mut magic).map_err(|_| EcsError::SchemaMismatch)?;
    if &magic != MAGIC {
        tracing::warn!("deserialize: bad magic");
        return Err(EcsError::SchemaMismatch);
    }
    let major = read_u16(source).map_err(|_| EcsError::SchemaMismatch)?;
    let minor = read_u16(source).map_err(|_| EcsError::SchemaMismatch)?;
    if major != VERSION_MAJOR {
        tracing::warn!(major, minor, "deserialize: unsupported major version");
        return Err(EcsError::SchemaMismatch);
    }

    let stream_schema = read_schema(source).map_err(|_| EcsError::SchemaMismatch)?;
    validate_schema_covers(&schema, &stream_schema)?;

    let mut world = World::new(schema);
    read_slot_table(source, &mut world).map_err(|_| EcsError::SchemaMismatch)?;
    read_chunks(source, &mut world).map_err(|_| EcsError::SchemaMismatch)?;
    read_free_ids(source, &mut world).map_err(|_| EcsError::SchemaMismatch)?;
    Ok(world)
}

struct StreamType {
    kind: u8,
    index: u8,
    size: u16,
    name: String,
    #[allow(dead_code)]
    layout: Option<Vec<FieldLayout>>,
}

fn read_schema<R: Read>(source: &mut R) -> io::Result<Vec<StreamType>> {
    let count = read_u16(source)?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let kind = read_u8(source)?;
        let index = read_u8(source)?;
        let size = read_u16(source)?;
        let name = read_str(source)?;
        let layout = read_layout(source)?;
        out.push(StreamType { kind, index, size, name, layout });
    }
    Ok(out)
}

/// Confirm every type the stream references is registered in `schema` under
/// the same name, index, and size. `schema` is allowed to carry extra,
/// unreferenced types.
fn validate_schema_covers(schema: &Schema, stream: &[StreamType]) -> Result<(), EcsError> {
    for ty in stream {
        let ok = match ty.kind {
            0 => schema
                .component_by_name(&ty.name)
                .map(|c| c.0 == ty.index && schema.size_of(c) == ty.size)
                .unwrap_or(false),
            1 => schema
                .array_element_by_name(&ty.name)
                .map(|a| a.0 == ty.index && schema.array_element_size_of(a) == ty.size)
                .unwrap_or(false),
            2 => schema
                .tag_by_name(&ty.name)
                .map(|t| t.0 == ty.index)
                .unwrap_or(false),
            _ => false,
        };
        if !ok {
            tracing::warn!(name = %ty.name, kind = ty.kind, "deserialize: schema does not cover stream type");
            return Err(EcsError::SchemaMismatch);
        }
    }
    Ok(())
}

fn read_slot_table<R: Read>(source: &mut R, world: &mut World) -> io::Result<()> {
    let max_entity = read_u32(source)?;
    // Entities are recreated in stream order; World assigns ids from its own
    // slot table, so we rely on create_entity producing ids in ascending
    // order starting at 1 for a freshly constructed World (true here since
    // deserialize always builds a fresh World). Ids that fall in a gap
    // between two stream records (or past the last record, up to
    // `max_entity`) are filled with throwaway live entities here; the
    // free-id block, read later, converts the ones that were actually free
    // in the source world back to `Free` (see `read_free_ids`).
    loop {
        let mut id_buf = [0u8; 4];
        match source.read(&mut id_buf)? {
            0 => break,
            4 => {}
            _ => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short slot read")),
        }
        let id = u32::from_le_bytes(id_buf);
        let parent_raw = read_u32(source)?;
        let state_tag_byte = read_u8(source)?;
        let state = state_from_tag(state_tag_byte)?;

        let ref_count = read_u16(source)?;
        let mut refs = Vec::with_capacity(ref_count as usize);
        for _ in 0..ref_count {
            refs.push(read_u32(source)?);
        }

        let array_count = read_u16(source)?;
        let mut arrays = Vec::with_capacity(array_count as usize);
        for _ in 0..array_count {
            let ty_idx = read_u8(source)?;
            let len = read_u32(source)?;
            let size = world.schema().array_element_size_of(ArrayElementType(ty_idx)) as usize;
            let mut bytes = vec![0u8; size * len as usize];
            source.read_exact(&mut bytes)?;
            arrays.push((ty_idx, len, bytes));
        }

        while world.max_entity() < id {
            world.create_entity();
        }
        let entity = crate::entity::EntityId::new(id);
        apply_raw_slot(world, entity, parent_raw, state, &refs, &arrays);
    }
    while world.max_entity() < max_entity {
        world.create_entity();
    }
    Ok(())
}

fn apply_raw_slot(
    world: &mut World,
    entity: crate::entity::EntityId,
    parent_raw: u32,
    state: EntityState,
    refs: &[u32],
    arrays: &[(u8, u32, Vec<u8>)],
) {
    use crate::entity::EntityId;

    if parent_raw != 0 {
        let _ = world.set_parent(entity, EntityId::new(parent_raw));
    }
    for &target in refs {
        world.restore_reference(entity, EntityId::new(target));
    }
    for (ty_idx, _len, bytes) in arrays {
        let ty = ArrayElementType(*ty_idx);
        let _ = world.create_array_with(entity, ty, bytes);
    }
    let enabled = matches!(state, EntityState::Enabled);
    let _ = world.set_enabled(entity, enabled);
}

fn read_chunks<R: Read>(source: &mut R, world: &mut World) -> io::Result<()> {
    let chunk_count = read_u32(source)?;
    for _ in 0..chunk_count {
        let mut comp_bytes = [0u8; 32];
        let mut arr_bytes = [0u8; 32];
        let mut tag_bytes = [0u8; 32];
        source.read_exact(&mut comp_bytes)?;
        source.read_exact(&mut arr_bytes)?;
        source.read_exact(&mut tag_bytes)?;
        let components = Bitset256::from_bytes(&comp_bytes);
        let arrays = Bitset256::from_bytes(&arr_bytes);
        let tags = Bitset256::from_bytes(&tag_bytes);
        let def = Definition { components, arrays, tags };

        let row_count = read_u32(source)? as usize;
        let mut entity_ids = Vec::with_capacity(row_count);
        for _ in 0..row_count {
            entity_ids.push(read_u32(source)?);
        }

        let comp_types: Vec<ComponentType> = def.component_types().collect();
        let mut columns: Vec<Vec<u8>> = Vec::with_capacity(comp_types.len());
        for ty in &comp_types {
            let size = world.schema().size_of(*ty) as usize;
            let mut bytes = vec![0u8; size * row_count];
            source.read_exact(&mut bytes)?;
            columns.push(bytes);
        }

        for (row, &raw_id) in entity_ids.iter().enumerate() {
            let entity = crate::entity::EntityId::new(raw_id);
            for (col_idx, ty) in comp_types.iter().enumerate() {
                let size = world.schema().size_of(*ty) as usize;
                let bytes = &columns[col_idx][row * size..(row + 1) * size];
                if world.try_get_component_ref(entity, *ty).is_some() {
                    let _ = world.set_component_bytes(entity, *ty, bytes);
                } else {
                    let _ = world.add_component_bytes(entity, *ty, bytes);
                }
            }
            for ty in def.tags.iter() {
                let _ = world.add_tag(entity, TagType(ty as u8));
            }
        }
    }
    Ok(())
}

/// The ids in this block were gap-filled with throwaway live entities by
/// `read_slot_table` (no stream record claimed them); destroying them here
/// restores the source world's free stack exactly.
fn read_free_ids<R: Read>(source: &mut R, world: &mut World) -> io::Result<()> {
    let count = read_u32(source)?;
    for _ in 0..count {
        let id = read_u32(source)?;
        let entity = crate::entity::EntityId::new(id);
        let _ = world.destroy_entity(entity);
    }
    Ok(())
}
