//! Entities: generational ids, the per-entity component records the registry
//! keeps, and the arena that stores those records.
//!
//! - [`EntityId`] packs a generation (high 32 bits) and an arena index (low
//!   32 bits). Recycling an index bumps its generation, so ids of destroyed
//!   entities are rejected by one comparison.
//! - [`EntityRecord`] maps each attached component type to the pool slot the
//!   entity owns and counts the holders sharing the entity.
//! - [`EntityArena`] hands out ids and recycles freed indices first in, first
//!   out.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use crate::component::ComponentTypeId;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// Handle to an entity in a [`Registry`](crate::registry::Registry).
///
/// Layout: `[generation: u32 | index: u32]`. Displays as `<index>v<generation>`,
/// e.g. `3v1`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    /// Arena index, reused across generations.
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// Bumped each time the arena index is recycled.
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Packed form, suitable for logging or external keys.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({self})")
    }
}

// ---------------------------------------------------------------------------
// EntityRecord
// ---------------------------------------------------------------------------

/// What the registry knows about one live entity: the pool slot of each
/// attached component and how many holders share the entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    /// Component type -> slot in that type's pool. Ordered so that destroy
    /// and clone visit pools deterministically.
    components: BTreeMap<ComponentTypeId, usize>,
    holders: u32,
}

impl EntityRecord {
    /// A record with no components and a single holder.
    pub(crate) fn new() -> Self {
        Self {
            components: BTreeMap::new(),
            holders: 1,
        }
    }

    /// Slot of the component of type `id`, if attached.
    #[inline]
    pub fn slot(&self, id: ComponentTypeId) -> Option<usize> {
        self.components.get(&id).copied()
    }

    #[inline]
    pub fn has(&self, id: ComponentTypeId) -> bool {
        self.components.contains_key(&id)
    }

    /// Whether every type in `ids` is attached. Empty signatures match.
    pub fn has_all(&self, ids: &[ComponentTypeId]) -> bool {
        ids.iter().all(|id| self.components.contains_key(id))
    }

    /// Attached `(type, slot)` pairs in type order.
    pub fn components(&self) -> impl Iterator<Item = (ComponentTypeId, usize)> + '_ {
        self.components.iter().map(|(&id, &slot)| (id, slot))
    }

    /// Number of attached components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Outstanding holders of the entity.
    pub fn holders(&self) -> u32 {
        self.holders
    }

    pub(crate) fn insert(&mut self, id: ComponentTypeId, slot: usize) -> Option<usize> {
        self.components.insert(id, slot)
    }

    pub(crate) fn remove(&mut self, id: ComponentTypeId) -> Option<usize> {
        self.components.remove(&id)
    }

    pub(crate) fn retain(&mut self) {
        self.holders = self.holders.saturating_add(1);
    }

    /// Drop one holder; returns `true` when none are left.
    pub(crate) fn release(&mut self) -> bool {
        self.holders = self.holders.saturating_sub(1);
        self.holders == 0
    }
}

// ---------------------------------------------------------------------------
// EntityArena
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ArenaSlot {
    generation: u32,
    record: Option<EntityRecord>,
}

/// Generational storage for [`EntityRecord`]s.
///
/// Free indices are kept in a FIFO queue so that generations are spread out
/// over time rather than concentrated on a hot index.
#[derive(Debug, Default)]
pub(crate) struct EntityArena {
    slots: Vec<ArenaSlot>,
    free_indices: VecDeque<u32>,
    live: usize,
}

impl EntityArena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Store `record` and return the id that now refers to it.
    pub(crate) fn insert(&mut self, record: EntityRecord) -> EntityId {
        self.live += 1;
        if let Some(index) = self.free_indices.pop_front() {
            // Generation was already bumped when the index was freed.
            let slot = &mut self.slots[index as usize];
            slot.record = Some(record);
            EntityId::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(ArenaSlot {
                generation: 0,
                record: Some(record),
            });
            EntityId::new(index, 0)
        }
    }

    fn slot(&self, id: EntityId) -> Option<&ArenaSlot> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
    }

    pub(crate) fn get(&self, id: EntityId) -> Option<&EntityRecord> {
        self.slot(id)?.record.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: EntityId) -> Option<&mut EntityRecord> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())?
            .record
            .as_mut()
    }

    pub(crate) fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    /// Take the record out, invalidating `id` and every copy of it.
    pub(crate) fn remove(&mut self, id: EntityId) -> Option<EntityRecord> {
        let slot = self
            .slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())?;
        let record = slot.record.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_indices.push_back(id.index());
        self.live -= 1;
        Some(record)
    }

    /// Number of live records.
    pub(crate) fn len(&self) -> usize {
        self.live
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
