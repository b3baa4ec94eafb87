//! Views: iteration over every entity that carries a given set of component
//! types.
//!
//! A view is described by a tuple of `&T` / `&mut T` items, e.g.
//! `(&mut Position, &Velocity)`. Entities are visited in roster order
//! (creation order) and yielded when their record holds every type in the
//! tuple; entities with extra components still match.
//!
//! ## Soundness
//!
//! Read-only views ([`Registry::view`]) borrow the registry shared and only
//! accept tuples made of `&T` items; the read-only traits are sealed, so no
//! other crate can mark a `&mut T` item as read-only. Mutable views
//! ([`Registry::view_mut`]) borrow the registry exclusively, so nothing can
//! add, remove or destroy while a view is alive. Slots are claimed and freed
//! only by entity operations, so each live entity owns a distinct slot in
//! every pool, and a tuple naming the same type twice with a `&mut` is
//! rejected when the view is built. The `&mut T` handed out never alias.
//!
//! ```compile_fail
//! use bitpool_ecs::prelude::*;
//!
//! #[derive(Clone)]
//! struct Hp(u32);
//!
//! let registry = Registry::new();
//! let _ = registry.view::<(&mut Hp,)>();
//! ```
//!
//! ```compile_fail
//! use bitpool_ecs::view::ReadOnlyQueryItem;
//!
//! #[derive(Clone)]
//! struct Hp(u32);
//!
//! impl ReadOnlyQueryItem for &mut Hp {}
//! ```
// Note: unsafe_code is allowed on this module via #[allow(unsafe_code)] in lib.rs

use std::any::TypeId;
use std::marker::PhantomData;

use crate::component::{Component, ComponentTypeId};
use crate::entity::{EntityId, EntityRecord};
use crate::pool::ComponentPool;
use crate::registry::Registry;
use crate::EcsError;

mod sealed {
    pub trait Sealed {}

    impl<T: 'static> Sealed for &T {}
    impl<T: 'static> Sealed for &mut T {}

    /// Implemented only for `&T` and tuples of read-only items.
    pub trait ReadOnly {}

    impl<T: 'static> ReadOnly for &T {}
}

// ---------------------------------------------------------------------------
// QueryItem -- one element of a view tuple
// ---------------------------------------------------------------------------

/// A single element of a view tuple: `&T` (read) or `&mut T` (write).
pub trait QueryItem: sealed::Sealed {
    /// The value yielded per entity.
    type Item<'r>;
    /// Whether this item borrows mutably.
    const MUTABLE: bool;
    /// Rust type of the component, used for access validation.
    fn rust_type_id() -> TypeId;
    /// The component's registered id, or `None` if it has no pool yet.
    fn component_type_id(registry: &Registry) -> Option<ComponentTypeId>;
    /// Fetch the value stored in `slot`.
    ///
    /// # Safety
    ///
    /// For `&mut T` items the caller must guarantee that no other reference
    /// to `slot` exists for `'r`.
    unsafe fn fetch<'r>(pool: &'r ComponentPool, slot: usize) -> Result<Self::Item<'r>, EcsError>;
}

/// Items that never hand out mutable access.
pub trait ReadOnlyQueryItem: QueryItem + sealed::ReadOnly {}

impl<T: Component> QueryItem for &T {
    type Item<'r> = &'r T;
    const MUTABLE: bool = false;

    fn rust_type_id() -> TypeId {
        TypeId::of::<T>()
    }

    fn component_type_id(registry: &Registry) -> Option<ComponentTypeId> {
        registry.component_type_id::<T>()
    }

    unsafe fn fetch<'r>(pool: &'r ComponentPool, slot: usize) -> Result<&'r T, EcsError> {
        pool.get::<T>(slot)
    }
}

impl<T: Component> ReadOnlyQueryItem for &T {}

impl<T: Component> QueryItem for &mut T {
    type Item<'r> = &'r mut T;
    const MUTABLE: bool = true;

    fn rust_type_id() -> TypeId {
        TypeId::of::<T>()
    }

    fn component_type_id(registry: &Registry) -> Option<ComponentTypeId> {
        registry.component_type_id::<T>()
    }

    unsafe fn fetch<'r>(pool: &'r ComponentPool, slot: usize) -> Result<&'r mut T, EcsError> {
        let ptr = pool.get_ptr::<T>(slot)?;
        // Safety: slot is occupied and of type T (checked above); exclusivity
        // is the caller's obligation.
        Ok(unsafe { &mut *ptr })
    }
}

// ---------------------------------------------------------------------------
// Query -- a tuple of QueryItems
// ---------------------------------------------------------------------------

/// A tuple of [`QueryItem`]s: `(&A,)`, `(&mut A, &B)`, ... up to eight.
pub trait Query: sealed::Sealed {
    /// The per-entity output type.
    type Item<'r>;
    /// Whether any item in this query borrows mutably.
    const HAS_MUTABLE: bool;
    /// Ids of every type in the tuple, or `None` if any has no pool (in
    /// which case nothing can match).
    fn type_ids(registry: &Registry) -> Option<Vec<ComponentTypeId>>;
    /// Panic if the tuple requests conflicting access to one type.
    fn validate_access();
    /// Fetch one entity's items. `slots[i]` is the slot of `ids[i]`.
    ///
    /// # Safety
    ///
    /// Same contract as [`QueryItem::fetch`] for every mutable item.
    unsafe fn fetch<'r>(
        registry: &'r Registry,
        ids: &[ComponentTypeId],
        slots: &[usize],
    ) -> Result<Self::Item<'r>, EcsError>;
}

/// Queries made only of `&T` items, usable with [`Registry::view`].
pub trait ReadOnlyQuery: Query + sealed::ReadOnly {}

/// Panics if the same component type appears as both `&mut T` and `&T`, or
/// as `&mut T` twice.
fn validate_no_access_conflicts(items: &[(bool, TypeId)]) {
    let mut mutable_ids: Vec<TypeId> = Vec::new();
    let mut read_ids: Vec<TypeId> = Vec::new();
    for &(is_mutable, id) in items {
        if is_mutable {
            if mutable_ids.contains(&id) {
                panic!("view contains duplicate mutable access to the same component type");
            }
            if read_ids.contains(&id) {
                panic!("view contains overlapping read and mutable access to the same component type");
            }
            mutable_ids.push(id);
        } else {
            if mutable_ids.contains(&id) {
                panic!("view contains overlapping read and mutable access to the same component type");
            }
            read_ids.push(id);
        }
    }
}

macro_rules! impl_query {
    ($($name:ident $idx:tt),+) => {
        impl<$($name: QueryItem),+> sealed::Sealed for ($($name,)+) {}

        impl<$($name: QueryItem),+> Query for ($($name,)+) {
            type Item<'r> = ($($name::Item<'r>,)+);
            const HAS_MUTABLE: bool = false $(|| $name::MUTABLE)+;

            fn type_ids(registry: &Registry) -> Option<Vec<ComponentTypeId>> {
                Some(vec![$($name::component_type_id(registry)?),+])
            }

            fn validate_access() {
                validate_no_access_conflicts(&[$(($name::MUTABLE, $name::rust_type_id())),+]);
            }

            unsafe fn fetch<'r>(
                registry: &'r Registry,
                ids: &[ComponentTypeId],
                slots: &[usize],
            ) -> Result<Self::Item<'r>, EcsError> {
                Ok(($(
                    unsafe { $name::fetch(registry.pool_at(ids[$idx]), slots[$idx])? },
                )+))
            }
        }

        impl<$($name: ReadOnlyQueryItem),+> sealed::ReadOnly for ($($name,)+) {}

        impl<$($name: ReadOnlyQueryItem),+> ReadOnlyQuery for ($($name,)+) {}
    };
}

impl_query!(A 0);
impl_query!(A 0, B 1);
impl_query!(A 0, B 1, C 2);
impl_query!(A 0, B 1, C 2, D 3);
impl_query!(A 0, B 1, C 2, D 3, E 4);
impl_query!(A 0, B 1, C 2, D 3, E 4, F 5);
impl_query!(A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_query!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

/// Slots of `ids` in `record`, written to `out`. Returns `false` if the
/// record lacks any of them.
fn collect_slots(record: &EntityRecord, ids: &[ComponentTypeId], out: &mut Vec<usize>) -> bool {
    out.clear();
    for &id in ids {
        match record.slot(id) {
            Some(slot) => out.push(slot),
            None => return false,
        }
    }
    true
}

/// Roster entries whose record carries every type in `ids`.
fn matching_entities<'r>(
    registry: &'r Registry,
    ids: Option<&'r [ComponentTypeId]>,
) -> impl Iterator<Item = EntityId> + 'r {
    let roster: &[EntityId] = if ids.is_some() { &registry.roster } else { &[] };
    roster.iter().copied().filter(move |&entity| {
        let ids = ids.unwrap_or_default();
        registry
            .entities
            .get(entity)
            .is_some_and(|record| record.has_all(ids))
    })
}

// ---------------------------------------------------------------------------
// Iterators
// ---------------------------------------------------------------------------

/// Iterator yielding `(EntityId, Q::Item)` for every matching entity.
pub struct ViewEntityIter<'r, Q: Query> {
    registry: &'r Registry,
    /// `None` when some type of the view has no pool.
    ids: Option<Vec<ComponentTypeId>>,
    cursor: usize,
    end: usize,
    slots: Vec<usize>,
    _marker: PhantomData<fn() -> Q>,
}

impl<'r, Q: Query> ViewEntityIter<'r, Q> {
    /// # Safety
    ///
    /// If `Q` has mutable items the caller must hold exclusive access to
    /// `registry` for `'r`.
    unsafe fn new(registry: &'r Registry, ids: Option<Vec<ComponentTypeId>>) -> Self {
        let end = if ids.is_some() { registry.roster.len() } else { 0 };
        Self {
            registry,
            ids,
            cursor: 0,
            end,
            slots: Vec::new(),
            _marker: PhantomData,
        }
    }
}

impl<'r, Q: Query> Iterator for ViewEntityIter<'r, Q> {
    type Item = (EntityId, Q::Item<'r>);

    fn next(&mut self) -> Option<Self::Item> {
        let ids = self.ids.as_deref()?;
        while self.cursor < self.end {
            let entity = self.registry.roster[self.cursor];
            self.cursor += 1;
            let Some(record) = self.registry.entities.get(entity) else {
                continue;
            };
            if !collect_slots(record, ids, &mut self.slots) {
                continue;
            }
            // Safety: each roster entry is visited once and owns distinct
            // slots; access conflicts were rejected at construction.
            match unsafe { Q::fetch(self.registry, ids, &self.slots) } {
                Ok(item) => return Some((entity, item)),
                Err(err) => unreachable!("{entity} maps to an unreadable slot: {err}"),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.end - self.cursor))
    }
}

/// Iterator yielding `Q::Item` for every matching entity.
pub struct ViewIter<'r, Q: Query> {
    inner: ViewEntityIter<'r, Q>,
}

impl<'r, Q: Query> Iterator for ViewIter<'r, Q> {
    type Item = Q::Item<'r>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, item)| item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

// ---------------------------------------------------------------------------
// View (read-only)
// ---------------------------------------------------------------------------

/// Read-only view over every entity matching `Q`.
///
/// ```
/// use bitpool_ecs::prelude::*;
///
/// #[derive(Clone)]
/// struct Hp(u32);
///
/// let mut registry = Registry::new();
/// let e = registry.create();
/// registry.add_component(e, Hp(10)).unwrap();
///
/// let total: u32 = registry.view::<(&Hp,)>().iter().map(|(hp,)| hp.0).sum();
/// assert_eq!(total, 10);
/// ```
pub struct View<'r, Q: ReadOnlyQuery> {
    registry: &'r Registry,
    ids: Option<Vec<ComponentTypeId>>,
    _marker: PhantomData<fn() -> Q>,
}

impl<'r, Q: ReadOnlyQuery> View<'r, Q> {
    fn new(registry: &'r Registry) -> Self {
        assert!(!Q::HAS_MUTABLE, "read-only view over a mutable query");
        Self {
            registry,
            ids: Q::type_ids(registry),
            _marker: PhantomData,
        }
    }

    /// Matching entities together with their components.
    pub fn iter_with_entity(&self) -> ViewEntityIter<'r, Q> {
        // Safety: read-only items only.
        unsafe { ViewEntityIter::new(self.registry, self.ids.clone()) }
    }

    /// Components of every matching entity.
    pub fn iter(&self) -> ViewIter<'r, Q> {
        ViewIter {
            inner: self.iter_with_entity(),
        }
    }

    /// Call `f` with the components of every matching entity.
    pub fn each<F>(&self, mut f: F)
    where
        F: FnMut(Q::Item<'r>),
    {
        for item in self.iter() {
            f(item);
        }
    }

    pub fn each_with_entity<F>(&self, mut f: F)
    where
        F: FnMut(EntityId, Q::Item<'r>),
    {
        for (entity, item) in self.iter_with_entity() {
            f(entity, item);
        }
    }

    /// Ids of matching entities in roster order.
    pub fn entities(&self) -> Vec<EntityId> {
        matching_entities(self.registry, self.ids.as_deref()).collect()
    }

    /// Number of matching entities.
    pub fn count(&self) -> usize {
        matching_entities(self.registry, self.ids.as_deref()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

impl<'r, Q: ReadOnlyQuery> IntoIterator for View<'r, Q> {
    type Item = Q::Item<'r>;
    type IntoIter = ViewIter<'r, Q>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'r, Q: ReadOnlyQuery> IntoIterator for &View<'r, Q> {
    type Item = Q::Item<'r>;
    type IntoIter = ViewIter<'r, Q>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ---------------------------------------------------------------------------
// ViewMut
// ---------------------------------------------------------------------------

/// View that may hand out `&mut T` components. Holds the registry
/// exclusively for its whole lifetime.
pub struct ViewMut<'r, Q: Query> {
    registry: &'r mut Registry,
    ids: Option<Vec<ComponentTypeId>>,
    _marker: PhantomData<fn() -> Q>,
}

impl<'r, Q: Query> ViewMut<'r, Q> {
    fn new(registry: &'r mut Registry) -> Self {
        Q::validate_access();
        let ids = Q::type_ids(registry);
        Self {
            registry,
            ids,
            _marker: PhantomData,
        }
    }

    /// Matching entities together with their components.
    pub fn iter_with_entity(&mut self) -> ViewEntityIter<'_, Q> {
        // Safety: `self.registry` is borrowed exclusively through `&mut self`.
        unsafe { ViewEntityIter::new(&*self.registry, self.ids.clone()) }
    }

    /// Components of every matching entity.
    pub fn iter_mut(&mut self) -> ViewIter<'_, Q> {
        ViewIter {
            inner: self.iter_with_entity(),
        }
    }

    /// Call `f` with the components of every matching entity.
    pub fn each<'v, F>(&'v mut self, mut f: F)
    where
        F: FnMut(Q::Item<'v>),
    {
        for item in self.iter_mut() {
            f(item);
        }
    }

    pub fn each_with_entity<'v, F>(&'v mut self, mut f: F)
    where
        F: FnMut(EntityId, Q::Item<'v>),
    {
        for (entity, item) in self.iter_with_entity() {
            f(entity, item);
        }
    }

    /// Ids of matching entities in roster order.
    pub fn entities(&self) -> Vec<EntityId> {
        matching_entities(&*self.registry, self.ids.as_deref()).collect()
    }

    /// Number of matching entities.
    pub fn count(&self) -> usize {
        matching_entities(&*self.registry, self.ids.as_deref()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

impl<'r, Q: Query> IntoIterator for ViewMut<'r, Q> {
    type Item = Q::Item<'r>;
    type IntoIter = ViewIter<'r, Q>;

    fn into_iter(self) -> Self::IntoIter {
        let registry: &'r Registry = self.registry;
        ViewIter {
            // Safety: the exclusive borrow is consumed and held for 'r.
            inner: unsafe { ViewEntityIter::new(registry, self.ids) },
        }
    }
}

impl<'a, 'r, Q: Query> IntoIterator for &'a mut ViewMut<'r, Q> {
    type Item = Q::Item<'a>;
    type IntoIter = ViewIter<'a, Q>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

// ---------------------------------------------------------------------------
// Registry view methods
// ---------------------------------------------------------------------------

impl Registry {
    /// Read-only view over every entity carrying all of `Q`'s types.
    ///
    /// If any type in `Q` has never been stored the view is empty.
    ///
    /// ```ignore
    /// for (pos, vel) in registry.view::<(&Position, &Velocity)>() {
    ///     println!("{pos:?} {vel:?}");
    /// }
    /// ```
    pub fn view<Q: ReadOnlyQuery>(&self) -> View<'_, Q> {
        View::new(self)
    }

    /// Mutable view over every entity carrying all of `Q`'s types.
    ///
    /// # Panics
    ///
    /// Panics if `Q` names the same component type twice with at least one
    /// `&mut`.
    pub fn view_mut<Q: Query>(&mut self) -> ViewMut<'_, Q> {
        ViewMut::new(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
