//! Query engines: typed component queries, a raw bitset query, and a
//! definition query.
//!
//! Typed queries resolve which chunks contain the required component set and
//! yield `(EntityId, (&C1, &C2, ...))` tuples for each matching row. They are
//! generated for arities 1..=16 via a macro, mirroring the hand-written
//! tuple impls this pattern is scaled up from.
//!
//! ## Soundness
//!
//! [`World::query`] only reads schema/chunk metadata to find matching chunks,
//! so it takes `&self`. Fetching the actual row data — `TypedQuery::rows` —
//! always takes `&mut World`, even for read-only (`&T`) item types: that's
//! the only mutable borrow in play, and the compiler enforces that no other
//! borrow of `world` is alive while the returned items are, which is what
//! lets `&mut T` items be handed out soundly (rows are disjoint by
//! construction: `TypedQuery` never emits the same `(chunk, row)` twice).
//! Every query snapshots the world's version at construction time and
//! reports `StaleQuery` if a structural mutation happened since.

use crate::definition::Definition;
use crate::entity::EntityId;
use crate::error::EcsError;
use crate::schema::ComponentType;
use crate::world::World;

/// One element of a query tuple: `&T` (read) or `&mut T` (write).
pub trait QueryItem {
    type Item<'w>;
    fn component_type(world: &World) -> Result<ComponentType, EcsError>;
    /// # Safety
    /// The caller must hold `world` exclusively (a live `&mut World`) and
    /// must call this at most once per distinct `(chunk, row)` pair for the
    /// duration that any returned `Item` is alive — true of `TypedQuery`,
    /// which never repeats a `(chunk, row)` within one `rows()` call.
    unsafe fn fetch<'w>(world: &'w mut World, chunk: u32, row: usize, ty: ComponentType) -> Self::Item<'w>;
}

impl<T: Copy + 'static> QueryItem for &T {
    type Item<'w> = &'w T;

    fn component_type(world: &World) -> Result<ComponentType, EcsError> {
        world.component_type_id::<T>()
    }

    unsafe fn fetch<'w>(world: &'w mut World, chunk: u32, row: usize, ty: ComponentType) -> Self::Item<'w> {
        let bytes = world.chunks()[chunk as usize]
            .component_bytes(row, ty)
            .expect("chunk matched the query mask so the column must exist");
        &*(bytes.as_ptr() as *const T)
    }
}

impl<T: Copy + 'static> QueryItem for &mut T {
    type Item<'w> = &'w mut T;

    fn component_type(world: &World) -> Result<ComponentType, EcsError> {
        world.component_type_id::<T>()
    }

    unsafe fn fetch<'w>(world: &'w mut World, chunk: u32, row: usize, ty: ComponentType) -> Self::Item<'w> {
        let bytes = world.chunks_mut()[chunk as usize]
            .component_bytes_mut(row, ty)
            .expect("chunk matched the query mask so the column must exist");
        &mut *(bytes.as_mut_ptr() as *mut T)
    }
}

/// A tuple of `QueryItem`s, e.g. `(&A, &mut B, &C)`.
pub trait Query {
    type Item<'w>;
    fn definition_mask(world: &World) -> Result<Definition, EcsError>;
    /// # Safety
    /// Same contract as `QueryItem::fetch`: `world` must be held exclusively,
    /// and each `(chunk, row)` must be fetched only once per call.
    unsafe fn fetch_row<'w>(world: &'w mut World, chunk: u32, row: usize, tys: &[ComponentType]) -> Self::Item<'w>;
}

macro_rules! impl_query_tuple {
    ($($T:ident : $idx:tt),+) => {
        impl<$($T),+> Query for ($($T,)+)
        where
            $($T: QueryItem,)+
        {
            type Item<'w> = ($($T::Item<'w>,)+);

            fn definition_mask(world: &World) -> Result<Definition, EcsError> {
                let mut def = Definition::empty();
                $(
                    let ty = $T::component_type(world)?;
                    def = def.with_component(ty);
                )+
                Ok(def)
            }

            unsafe fn fetch_row<'w>(world: &'w mut World, chunk: u32, row: usize, tys: &[ComponentType]) -> Self::Item<'w> {
                // Safety: each `$T::fetch` call borrows disjoint column bytes
                // (different component types within the same row never
                // overlap), so handing out several simultaneous exclusive
                // reborrows of `world` here is sound.
                ($($T::fetch(&mut *(world as *mut World), chunk, row, tys[$idx]),)+)
            }
        }
    };
}

impl_query_tuple!(A:0);
impl_query_tuple!(A:0, B:1);
impl_query_tuple!(A:0, B:1, C:2);
impl_query_tuple!(A:0, B:1, C:2, D:3);
impl_query_tuple!(A:0, B:1, C:2, D:3, E:4);
impl_query_tuple!(A:0, B:1, C:2, D:3, E:4, F:5);
impl_query_tuple!(A:0, B:1, C:2, D:3, E:4, F:5, G:6);
impl_query_tuple!(A:0, B:1, C:2, D:3, E:4, F:5, G:6, H:7);
impl_query_tuple!(A:0, B:1, C:2, D:3, E:4, F:5, G:6, H:7, I:8);
impl_query_tuple!(A:0, B:1, C:2, D:3, E:4, F:5, G:6, H:7, I:8, J:9);
impl_query_tuple!(A:0, B:1, C:2, D:3, E:4, F:5, G:6, H:7, I:8, J:9, K:10);
impl_query_tuple!(A:0, B:1, C:2, D:3, E:4, F:5, G:6, H:7, I:8, J:9, K:10, L:11);
impl_query_tuple!(A:0, B:1, C:2, D:3, E:4, F:5, G:6, H:7, I:8, J:9, K:10, L:11, M:12);
impl_query_tuple!(A:0, B:1, C:2, D:3, E:4, F:5, G:6, H:7, I:8, J:9, K:10, L:11, M:12, N:13);
impl_query_tuple!(A:0, B:1, C:2, D:3, E:4, F:5, G:6, H:7, I:8, J:9, K:10, L:11, M:12, N:13, O:14);
impl_query_tuple!(A:0, B:1, C:2, D:3, E:4, F:5, G:6, H:7, I:8, J:9, K:10, L:11, M:12, N:13, O:14, P:15);

/// A materialized typed query: the matching chunk/row pairs are computed
/// once at construction (materialize-on-update), and a `version` snapshot
/// lets `rows`/`iter` report `StaleQuery` if the world has mutated since.
pub struct TypedQuery<Q: Query> {
    version: u64,
    tys: Vec<ComponentType>,
    // (chunk, row) pairs, flattened across all matching chunks.
    rows: Vec<(u32, usize)>,
    entities: Vec<EntityId>,
    _marker: std::marker::PhantomData<Q>,
}

impl<Q: Query> TypedQuery<Q> {
    pub fn new(world: &World) -> Result<Self, EcsError> {
        let def = Q::definition_mask(world)?;
        let tys: Vec<ComponentType> = def.component_types().collect();
        let chunk_ids = world.matching_chunks(&def, None, None);
        let mut rows = Vec::new();
        let mut entities = Vec::new();
        for chunk_id in chunk_ids {
            let chunk = &world.chunks()[chunk_id as usize];
            for (row, &entity) in chunk.entities().iter().enumerate() {
                rows.push((chunk_id, row));
                entities.push(entity);
            }
        }
        Ok(Self {
            version: world.version(),
            tys,
            rows,
            entities,
            _marker: std::marker::PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn check_stale(&self, world: &World) -> Result<(), EcsError> {
        if world.version() != self.version {
            Err(EcsError::StaleQuery)
        } else {
            Ok(())
        }
    }

    /// Fetch every row as `(EntityId, Q::Item)`. Fails with `StaleQuery` if
    /// any structural mutation happened on `world` since this query was
    /// constructed. Takes `world` exclusively even for read-only item types,
    /// so that `&mut T` items can be handed out soundly (see module docs).
    pub fn rows<'w>(&self, world: &'w mut World) -> Result<Vec<(EntityId, Q::Item<'w>)>, EcsError> {
        self.check_stale(world)?;
        Ok(self
            .rows
            .iter()
            .zip(self.entities.iter())
            .map(|(&(chunk, row), &entity)| {
                // Safety: `self.rows` never repeats a `(chunk, row)` pair, so
                // each reborrow below targets disjoint column bytes.
                let item = unsafe { Q::fetch_row(&mut *(world as *mut World), chunk, row, &self.tys) };
                (entity, item)
            })
            .collect())
    }

    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }
}

impl World {
    /// Build a read-only typed query over `Q` (a tuple of `&T`/`&mut T`).
    pub fn query<Q: Query>(&self) -> Result<TypedQuery<Q>, EcsError> {
        TypedQuery::new(self)
    }
}
