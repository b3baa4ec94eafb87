//! Bitpool ECS -- an Entity Component System built on fixed-capacity,
//! bitmap-indexed component pools.
//!
//! Every component type gets one [`ComponentPool`](pool::ComponentPool): a
//! contiguous arena of `capacity` slots plus an occupancy bitmap. New values
//! always land in the lowest free slot, so holes left by removals are filled
//! before the pool reaches into untouched memory. Entities are generational
//! ids whose record maps each attached component type to its slot.
//!
//! # Quick Start
//!
//! ```
//! use bitpool_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Position { x: i32, y: i32 }
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Velocity { x: i32, y: i32 }
//!
//! let mut registry = Registry::new();
//! let entity = registry.create();
//! registry.add_component(entity, Position { x: 5, y: 3 }).unwrap();
//! registry.add_component(entity, Velocity { x: 1, y: 6 }).unwrap();
//!
//! registry.view_mut::<(&mut Position, &Velocity)>().each(|(pos, vel)| {
//!     pos.x += vel.x;
//!     pos.y += vel.y;
//! });
//!
//! assert_eq!(
//!     registry.get_component::<Position>(entity).unwrap(),
//!     &Position { x: 6, y: 9 }
//! );
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod entity;
pub mod occupancy;
#[allow(unsafe_code)]
pub mod pool;
pub mod registry;
#[allow(unsafe_code)]
pub mod view;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by pool, registry and entity operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// Every slot of the pool is occupied.
    #[error("pool for '{component}' is full (capacity {capacity})")]
    CapacityExceeded {
        component: &'static str,
        capacity: usize,
    },

    /// The requested type's size differs from the pool's element size.
    #[error("pool for '{component}' stores {expected}-byte elements, requested type is {found} bytes")]
    TypeSizeMismatch {
        component: &'static str,
        expected: usize,
        found: usize,
    },

    /// The requested type has the pool's element size but is a different type.
    #[error("pool stores '{expected}', requested '{found}'")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// The slot holds no value.
    #[error("slot {slot} of pool '{component}' is empty")]
    SlotEmpty {
        component: &'static str,
        slot: usize,
    },

    /// The slot index is at or past the pool's capacity.
    #[error("slot {slot} is out of range for pool '{component}' (capacity {capacity})")]
    OutOfRange {
        component: &'static str,
        slot: usize,
        capacity: usize,
    },

    /// The pool's arena size does not fit in memory.
    #[error("capacity {capacity} overflows the address space for '{component}'")]
    CapacityOverflow {
        component: &'static str,
        capacity: usize,
    },

    /// The entity already carries a component of this type.
    #[error("entity {entity:?} already has a '{component}'")]
    DuplicateComponent {
        entity: entity::EntityId,
        component: &'static str,
    },

    /// The entity carries no component of this type.
    #[error("entity {entity:?} has no '{component}'")]
    MissingComponent {
        entity: entity::EntityId,
        component: &'static str,
    },

    /// The entity has been destroyed (or never existed).
    #[error("entity {entity:?} was used after being destroyed")]
    UseAfterFree { entity: entity::EntityId },

    /// No pool exists for the component type.
    #[error("no pool exists for component type '{component}'")]
    UnknownType { component: String },

    /// A configuration document could not be parsed.
    #[error("invalid registry configuration: {details}")]
    InvalidConfig { details: String },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::{Component, ComponentInfo, ComponentRegistry, ComponentTypeId};
    pub use crate::entity::{EntityId, EntityRecord};
    pub use crate::pool::ComponentPool;
    pub use crate::registry::{
        ComponentSet, EntityMut, EntityRef, PoolMut, Registry, RegistryConfig,
        DEFAULT_MAX_COMPONENTS,
    };
    pub use crate::view::{Query, QueryItem, ReadOnlyQuery, View, ViewEntityIter, ViewIter, ViewMut};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
