//! Component type identity and metadata.
//!
//! Component types are registered lazily, the first time a [`Registry`](crate::registry::Registry)
//! needs a pool for them. Registration produces a dense [`ComponentTypeId`]
//! that doubles as the index of the type's pool, so every typed access is a
//! hash lookup on the Rust `TypeId` followed by a `Vec` index.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Marker trait for types that can be stored as components.
///
/// `Clone` is the duplication capability used by
/// [`Registry::clone_entity`](crate::registry::Registry::clone_entity): cloned
/// components go through the type's own `Clone` impl, so owned resources such
/// as `Vec` or `String` fields are duplicated rather than shared between the
/// original and the copy.
pub trait Component: Clone + 'static {}

impl<T: Clone + 'static> Component for T {}

// ---------------------------------------------------------------------------
// ComponentTypeId
// ---------------------------------------------------------------------------

/// Opaque, lightweight identifier for a registered component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub(crate) u32);

impl ComponentTypeId {
    /// Position of the type's pool inside the registry.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

/// Layout and identity of a component type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
    /// `std::any::type_name::<T>()`, used in error messages and logs.
    pub name: &'static str,
    /// `std::mem::size_of::<T>()`
    pub size: usize,
    /// `std::mem::align_of::<T>()`
    pub align: usize,
    /// Rust `TypeId` for runtime type checking.
    pub type_id: TypeId,
}

impl ComponentInfo {
    /// Describe the concrete type `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            name: std::any::type_name::<T>(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Maps Rust types to [`ComponentTypeId`]s and their metadata.
///
/// A type is registered at most once; registering it again returns the
/// existing id. Ids are handed out densely in registration order.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    /// TypeId -> ComponentTypeId for dedup.
    by_type: HashMap<TypeId, ComponentTypeId>,
    /// Indexed by ComponentTypeId.0.
    infos: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T`, or return its id if it is already known.
    pub fn register<T: Component>(&mut self) -> ComponentTypeId {
        let rust_type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&rust_type_id) {
            return existing;
        }

        let id = ComponentTypeId(self.infos.len() as u32);
        self.infos.push(ComponentInfo::of::<T>());
        self.by_type.insert(rust_type_id, id);
        id
    }

    /// Look up a component type by its Rust `TypeId`.
    pub fn lookup<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Get the [`ComponentInfo`] for a registered component type ID.
    pub fn get_info(&self, id: ComponentTypeId) -> Option<&ComponentInfo> {
        self.infos.get(id.index())
    }

    /// Total number of registered component types.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether any component types have been registered.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Type names in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.infos.iter().map(|info| info.name).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    #[allow(dead_code)]
    struct Pos {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone)]
    #[allow(dead_code)]
    struct Vel {
        dx: f32,
        dy: f32,
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register::<Pos>();
        assert_eq!(reg.lookup::<Pos>(), Some(id));
        assert_eq!(reg.lookup::<Vel>(), None);
    }

    #[test]
    fn same_type_same_id() {
        let mut reg = ComponentRegistry::new();
        let id1 = reg.register::<Pos>();
        let id2 = reg.register::<Pos>();
        assert_eq!(id1, id2);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn ids_are_dense_in_registration_order() {
        let mut reg = ComponentRegistry::new();
        let v = reg.register::<Vel>();
        let p = reg.register::<Pos>();
        assert_eq!(v.index(), 0);
        assert_eq!(p.index(), 1);
        assert_eq!(reg.names().len(), 2);
        assert!(reg.names()[0].ends_with("Vel"));
    }

    #[test]
    fn info_correctness() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register::<Pos>();
        let info = reg.get_info(id).unwrap();
        assert!(info.name.ends_with("Pos"));
        assert_eq!(info.size, std::mem::size_of::<Pos>());
        assert_eq!(info.align, std::mem::align_of::<Pos>());
        assert_eq!(info.type_id, TypeId::of::<Pos>());
    }
}
