//! The [`Registry`] is the top-level container. It owns one
//! [`ComponentPool`] per component type, the records of all live entities
//! and the insertion-ordered roster that views walk.
//!
//! Entity operations take the [`EntityId`] explicitly; [`EntityRef`] and
//! [`EntityMut`] bundle an id with a borrow of the registry for call sites
//! that work on one entity at a time.

use std::any::type_name;
use std::ops::Deref;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::component::{Component, ComponentRegistry, ComponentTypeId};
use crate::entity::{EntityArena, EntityId, EntityRecord};
use crate::pool::ComponentPool;
use crate::EcsError;

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

/// Pool capacity used when no configuration is supplied.
pub const DEFAULT_MAX_COMPONENTS: usize = 1024;

/// Configuration for a [`Registry`].
///
/// `max_components_per_type` is applied uniformly to every pool the registry
/// creates. Pools never grow; once a pool is full, adding or cloning a
/// component of that type fails with [`EcsError::CapacityExceeded`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum number of live components of any single type.
    pub max_components_per_type: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_components_per_type: DEFAULT_MAX_COMPONENTS,
        }
    }
}

impl RegistryConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    ///
    /// ```
    /// use bitpool_ecs::registry::RegistryConfig;
    ///
    /// let config = RegistryConfig::from_json(r#"{ "max_components_per_type": 64 }"#).unwrap();
    /// assert_eq!(config.max_components_per_type, 64);
    /// ```
    pub fn from_json(text: &str) -> Result<Self, EcsError> {
        serde_json::from_str(text).map_err(|e| EcsError::InvalidConfig {
            details: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// ComponentSet -- compile-time lists of component types
// ---------------------------------------------------------------------------

/// A tuple of component types, used to test several attachments at once.
///
/// ```ignore
/// registry.has_components::<(Position, Velocity)>(entity)?;
/// ```
pub trait ComponentSet {
    /// Ids of every type in the set, or `None` if any type has no pool yet
    /// (in which case no entity can carry the whole set).
    fn type_ids(components: &ComponentRegistry) -> Option<Vec<ComponentTypeId>>;
}

macro_rules! impl_component_set {
    ($($name:ident),+) => {
        impl<$($name: Component),+> ComponentSet for ($($name,)+) {
            fn type_ids(components: &ComponentRegistry) -> Option<Vec<ComponentTypeId>> {
                Some(vec![$(components.lookup::<$name>()?),+])
            }
        }
    };
}

impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
impl_component_set!(A, B, C, D, E, F);
impl_component_set!(A, B, C, D, E, F, G);
impl_component_set!(A, B, C, D, E, F, G, H);

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Owner of all component pools and entities.
///
/// Pools are created lazily the first time a type is stored and then live as
/// long as the registry, even when emptied. Dropping the registry destroys
/// every entity still in the roster, regardless of outstanding holders.
pub struct Registry {
    config: RegistryConfig,
    /// Component type registry; ids index into `pools`.
    components: ComponentRegistry,
    /// One pool per registered component type, indexed by `ComponentTypeId`.
    pools: Vec<ComponentPool>,
    /// Records of live entities.
    pub(crate) entities: EntityArena,
    /// Live entities in creation order.
    pub(crate) roster: Vec<EntityId>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("entity_count", &self.roster.len())
            .field("pool_count", &self.pools.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry from an explicit configuration.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            config,
            components: ComponentRegistry::new(),
            pools: Vec::new(),
            entities: EntityArena::new(),
            roster: Vec::new(),
        }
    }

    /// Create an empty registry whose pools hold at most `max` values each.
    pub fn with_max_components(max: usize) -> Self {
        Self::with_config(RegistryConfig {
            max_components_per_type: max,
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Read-only access to the component type registry.
    pub fn component_registry(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Look up the `ComponentTypeId` for a Rust type, if it has a pool.
    pub fn component_type_id<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.components.lookup::<T>()
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Create an entity with no components and append it to the roster.
    pub fn create(&mut self) -> EntityId {
        let entity = self.entities.insert(EntityRecord::new());
        self.roster.push(entity);
        debug!(entity = %entity, "created entity");
        entity
    }

    /// Destroy an entity: every component it holds is dropped and its slot
    /// freed, then it leaves the roster.
    ///
    /// Returns `false` if the entity was already destroyed (or never existed),
    /// in which case nothing happens.
    pub fn remove(&mut self, entity: EntityId) -> bool {
        let Some(record) = self.entities.remove(entity) else {
            return false;
        };
        self.free_components(entity, &record);
        if let Some(pos) = self.roster.iter().position(|&e| e == entity) {
            self.roster.remove(pos);
        }
        debug!(entity = %entity, components = record.len(), "removed entity");
        true
    }

    fn free_components(&mut self, entity: EntityId, record: &EntityRecord) {
        for (type_id, slot) in record.components() {
            let freed = self.pools[type_id.index()].remove(slot);
            debug_assert!(freed.is_ok(), "{entity} owned an empty slot: {freed:?}");
        }
    }

    /// Register an additional holder of `entity`.
    ///
    /// # Errors
    ///
    /// [`EcsError::UseAfterFree`] if the entity is already destroyed.
    pub fn retain(&mut self, entity: EntityId) -> Result<(), EcsError> {
        self.entities
            .get_mut(entity)
            .ok_or(EcsError::UseAfterFree { entity })?
            .retain();
        Ok(())
    }

    /// Drop one holder of `entity`, destroying it when the last holder is
    /// released. Returns `true` if this call destroyed the entity.
    ///
    /// Releasing an entity that was already removed is a no-op.
    pub fn release(&mut self, entity: EntityId) -> bool {
        let Some(record) = self.entities.get_mut(entity) else {
            return false;
        };
        if record.release() {
            self.remove(entity)
        } else {
            false
        }
    }

    /// Outstanding holders of `entity`, or `None` if it is dead.
    pub fn holders(&self, entity: EntityId) -> Option<u32> {
        self.entities.get(entity).map(EntityRecord::holders)
    }

    /// Number of live entities.
    pub fn count(&self) -> usize {
        self.roster.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    /// Live entities in creation order.
    pub fn entities(&self) -> &[EntityId] {
        &self.roster
    }

    /// Whether `entity` refers to a live entity.
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entities.contains(entity)
    }

    pub(crate) fn record(&self, entity: EntityId) -> Result<&EntityRecord, EcsError> {
        self.entities
            .get(entity)
            .ok_or(EcsError::UseAfterFree { entity })
    }

    /// Borrow one entity for reading.
    pub fn entity(&self, entity: EntityId) -> Result<EntityRef<'_>, EcsError> {
        self.record(entity)?;
        Ok(EntityRef {
            registry: self,
            id: entity,
        })
    }

    /// Borrow one entity for modification.
    pub fn entity_mut(&mut self, entity: EntityId) -> Result<EntityMut<'_>, EcsError> {
        self.record(entity)?;
        Ok(EntityMut {
            registry: self,
            id: entity,
        })
    }

    // -- pools --------------------------------------------------------------

    /// Id of `T`'s pool, creating the pool on first use.
    fn ensure_pool<T: Component>(&mut self) -> Result<ComponentTypeId, EcsError> {
        if let Some(id) = self.components.lookup::<T>() {
            return Ok(id);
        }
        let capacity = self.config.max_components_per_type;
        let pool = ComponentPool::new::<T>(capacity)?;
        let id = self.components.register::<T>();
        debug_assert_eq!(id.index(), self.pools.len());
        self.pools.push(pool);
        debug!(component = type_name::<T>(), capacity, "created component pool");
        Ok(id)
    }

    /// The pool storing `T`.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownType`] if no `T` was ever stored. Read-only lookups
    /// never create pools.
    pub fn pool<T: Component>(&self) -> Result<&ComponentPool, EcsError> {
        let id = self
            .components
            .lookup::<T>()
            .ok_or_else(|| EcsError::UnknownType {
                component: type_name::<T>().to_owned(),
            })?;
        Ok(&self.pools[id.index()])
    }

    /// The pool storing `T`, created at the configured capacity if this is
    /// the first request for `T`.
    ///
    /// Values can be modified in place through the returned [`PoolMut`];
    /// slots are claimed and freed only through entity operations.
    pub fn pool_mut<T: Component>(&mut self) -> Result<PoolMut<'_>, EcsError> {
        let id = self.ensure_pool::<T>()?;
        Ok(PoolMut {
            pool: &mut self.pools[id.index()],
        })
    }

    /// The pool for a runtime type id.
    pub fn pool_by_id(&self, id: ComponentTypeId) -> Result<&ComponentPool, EcsError> {
        self.pools.get(id.index()).ok_or_else(|| EcsError::UnknownType {
            component: format!("{id:?}"),
        })
    }

    /// Number of pools created so far.
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    #[inline]
    pub(crate) fn pool_at(&self, id: ComponentTypeId) -> &ComponentPool {
        &self.pools[id.index()]
    }

    // -- component access ---------------------------------------------------

    /// Attach `value` to `entity` and return a reference to the stored value.
    ///
    /// # Errors
    ///
    /// [`EcsError::UseAfterFree`] for a dead entity,
    /// [`EcsError::DuplicateComponent`] if a `T` is already attached, and
    /// any pool error (notably [`EcsError::CapacityExceeded`]).
    pub fn add_component<T: Component>(
        &mut self,
        entity: EntityId,
        value: T,
    ) -> Result<&mut T, EcsError> {
        if !self.entities.contains(entity) {
            return Err(EcsError::UseAfterFree { entity });
        }
        let type_id = self.ensure_pool::<T>()?;
        let record = self
            .entities
            .get_mut(entity)
            .ok_or(EcsError::UseAfterFree { entity })?;
        if record.has(type_id) {
            return Err(EcsError::DuplicateComponent {
                entity,
                component: type_name::<T>(),
            });
        }

        let pool = &mut self.pools[type_id.index()];
        let slot = pool.add(value)?;
        record.insert(type_id, slot);
        trace!(entity = %entity, component = type_name::<T>(), slot, "added component");
        pool.get_mut::<T>(slot)
    }

    /// Detach the `T` from `entity`, returning the value.
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> Result<T, EcsError> {
        let missing = || EcsError::MissingComponent {
            entity,
            component: type_name::<T>(),
        };
        let record = self
            .entities
            .get_mut(entity)
            .ok_or(EcsError::UseAfterFree { entity })?;
        let type_id = self.components.lookup::<T>().ok_or_else(missing)?;
        let slot = record.remove(type_id).ok_or_else(missing)?;
        trace!(entity = %entity, component = type_name::<T>(), slot, "removed component");
        self.pools[type_id.index()].take::<T>(slot)
    }

    /// Where `entity`'s `T` lives.
    fn locate<T: Component>(&self, entity: EntityId) -> Result<(ComponentTypeId, usize), EcsError> {
        let record = self.record(entity)?;
        self.components
            .lookup::<T>()
            .and_then(|id| record.slot(id).map(|slot| (id, slot)))
            .ok_or(EcsError::MissingComponent {
                entity,
                component: type_name::<T>(),
            })
    }

    /// Borrow `entity`'s `T`.
    pub fn get_component<T: Component>(&self, entity: EntityId) -> Result<&T, EcsError> {
        let (type_id, slot) = self.locate::<T>(entity)?;
        self.pools[type_id.index()].get::<T>(slot)
    }

    /// Mutably borrow `entity`'s `T`.
    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> Result<&mut T, EcsError> {
        let (type_id, slot) = self.locate::<T>(entity)?;
        self.pools[type_id.index()].get_mut::<T>(slot)
    }

    /// Whether `entity` carries a `T`.
    pub fn has_component<T: Component>(&self, entity: EntityId) -> Result<bool, EcsError> {
        let record = self.record(entity)?;
        Ok(self
            .components
            .lookup::<T>()
            .is_some_and(|id| record.has(id)))
    }

    /// Whether `entity` carries every type in the tuple `S`.
    pub fn has_components<S: ComponentSet>(&self, entity: EntityId) -> Result<bool, EcsError> {
        let record = self.record(entity)?;
        Ok(S::type_ids(&self.components).is_some_and(|ids| record.has_all(&ids)))
    }

    /// Runtime form of [`has_components`](Self::has_components) for callers
    /// that only know the type ids.
    pub fn has_component_ids(
        &self,
        entity: EntityId,
        ids: &[ComponentTypeId],
    ) -> Result<bool, EcsError> {
        Ok(self.record(entity)?.has_all(ids))
    }

    /// Pool slot of `entity`'s `T`, or `None` if not attached.
    pub fn slot_of<T: Component>(&self, entity: EntityId) -> Result<Option<usize>, EcsError> {
        let record = self.record(entity)?;
        Ok(self.components.lookup::<T>().and_then(|id| record.slot(id)))
    }

    /// Types attached to `entity`, in id order.
    pub fn component_types(&self, entity: EntityId) -> Result<Vec<ComponentTypeId>, EcsError> {
        Ok(self.record(entity)?.components().map(|(id, _)| id).collect())
    }

    /// Create a new entity carrying a clone of every component of `entity`.
    ///
    /// Each component is duplicated through its `Clone` impl into a fresh
    /// slot of the same pool. If any pool is full the partial copy is undone
    /// and the error returned; the registry is left as it was.
    pub fn clone_entity(&mut self, entity: EntityId) -> Result<EntityId, EcsError> {
        let source: Vec<(ComponentTypeId, usize)> = self.record(entity)?.components().collect();

        let mut copy = EntityRecord::new();
        for (type_id, slot) in source {
            match self.pools[type_id.index()].clone_slot(slot) {
                Ok(new_slot) => {
                    copy.insert(type_id, new_slot);
                }
                Err(err) => {
                    self.free_components(entity, &copy);
                    return Err(err);
                }
            }
        }

        let components = copy.len();
        let clone = self.entities.insert(copy);
        self.roster.push(clone);
        debug!(source = %entity, entity = %clone, components, "cloned entity");
        Ok(clone)
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        let roster = std::mem::take(&mut self.roster);
        for entity in roster {
            if let Some(record) = self.entities.remove(entity) {
                self.free_components(entity, &record);
            }
        }
        debug_assert_eq!(self.entities.len(), 0);
    }
}

// ---------------------------------------------------------------------------
// PoolMut
// ---------------------------------------------------------------------------

/// In-place access to a registry-owned pool.
///
/// Every occupied slot belongs to exactly one entity record, so the guard
/// offers no way to add, remove or clone values. Read-only pool methods are
/// reachable through `Deref`.
///
/// ```compile_fail
/// use bitpool_ecs::prelude::*;
///
/// #[derive(Clone)]
/// struct Hp(u32);
///
/// let mut registry = Registry::new();
/// let e = registry.create();
/// registry.add_component(e, Hp(3)).unwrap();
/// registry.pool_mut::<Hp>().unwrap().remove(0).unwrap();
/// ```
#[derive(Debug)]
pub struct PoolMut<'r> {
    pool: &'r mut ComponentPool,
}

impl PoolMut<'_> {
    /// Mutably borrow the value in `slot`. See [`ComponentPool::get_mut`].
    pub fn get_mut<T: 'static>(&mut self, slot: usize) -> Result<&mut T, EcsError> {
        self.pool.get_mut::<T>(slot)
    }
}

impl Deref for PoolMut<'_> {
    type Target = ComponentPool;

    fn deref(&self) -> &ComponentPool {
        &*self.pool
    }
}

// ---------------------------------------------------------------------------
// EntityRef / EntityMut
// ---------------------------------------------------------------------------

/// Read access to one live entity.
#[derive(Clone, Copy)]
pub struct EntityRef<'r> {
    registry: &'r Registry,
    id: EntityId,
}

impl std::fmt::Debug for EntityRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EntityRef").field(&self.id).finish()
    }
}

impl<'r> EntityRef<'r> {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn get<T: Component>(&self) -> Result<&'r T, EcsError> {
        self.registry.get_component::<T>(self.id)
    }

    pub fn has<T: Component>(&self) -> bool {
        self.registry.has_component::<T>(self.id).unwrap_or(false)
    }

    pub fn has_all<S: ComponentSet>(&self) -> bool {
        self.registry.has_components::<S>(self.id).unwrap_or(false)
    }

    pub fn has_ids(&self, ids: &[ComponentTypeId]) -> bool {
        self.registry.has_component_ids(self.id, ids).unwrap_or(false)
    }

    pub fn slot_of<T: Component>(&self) -> Option<usize> {
        self.registry.slot_of::<T>(self.id).ok().flatten()
    }

    pub fn component_types(&self) -> Vec<ComponentTypeId> {
        self.registry.component_types(self.id).unwrap_or_default()
    }

    pub fn holders(&self) -> u32 {
        self.registry.holders(self.id).unwrap_or(0)
    }
}

/// Exclusive access to one live entity.
///
/// The entity stays alive for as long as the handle exists: the only way to
/// destroy it through the handle is [`destroy`](Self::destroy), which
/// consumes it.
pub struct EntityMut<'r> {
    registry: &'r mut Registry,
    id: EntityId,
}

impl std::fmt::Debug for EntityMut<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EntityMut").field(&self.id).finish()
    }
}

impl<'r> EntityMut<'r> {
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Attach `value`. See [`Registry::add_component`].
    pub fn add<T: Component>(&mut self, value: T) -> Result<&mut T, EcsError> {
        self.registry.add_component(self.id, value)
    }

    /// Builder form of [`add`](Self::add).
    pub fn with<T: Component>(self, value: T) -> Result<Self, EcsError> {
        self.registry.add_component(self.id, value)?;
        Ok(self)
    }

    /// Detach and return the `T`. See [`Registry::remove_component`].
    pub fn remove<T: Component>(&mut self) -> Result<T, EcsError> {
        self.registry.remove_component::<T>(self.id)
    }

    pub fn get<T: Component>(&self) -> Result<&T, EcsError> {
        self.registry.get_component::<T>(self.id)
    }

    pub fn get_mut<T: Component>(&mut self) -> Result<&mut T, EcsError> {
        self.registry.get_component_mut::<T>(self.id)
    }

    pub fn has<T: Component>(&self) -> bool {
        self.registry.has_component::<T>(self.id).unwrap_or(false)
    }

    pub fn has_all<S: ComponentSet>(&self) -> bool {
        self.registry.has_components::<S>(self.id).unwrap_or(false)
    }

    /// Clone this entity into a new one. See [`Registry::clone_entity`].
    pub fn clone_entity(&mut self) -> Result<EntityId, EcsError> {
        self.registry.clone_entity(self.id)
    }

    /// Downgrade to a read-only handle.
    pub fn as_readonly(&self) -> EntityRef<'_> {
        EntityRef {
            registry: &*self.registry,
            id: self.id,
        }
    }

    /// Destroy the entity, regardless of other holders.
    pub fn destroy(self) -> bool {
        self.registry.remove(self.id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
