//! Fixed-capacity, type-erased component storage.
//!
//! A [`ComponentPool`] holds every live instance of one component type in a
//! single heap arena of `capacity` elements. Occupancy is tracked by an
//! [`OccupancyBitmap`]; the free cursor always points at the lowest unset
//! bit, so a freed slot is reused before any higher index.
//!
//! # Safety
//!
//! The arena is a raw byte buffer allocated with the element's layout. Every
//! typed access first checks the requested type against the pool's
//! [`ComponentInfo`] (size, then `TypeId`) and the slot against the bitmap,
//! so the public API never reinterprets bytes as the wrong type nor reads an
//! uninitialised slot.
// Note: unsafe_code is allowed on this module via #[allow(unsafe_code)] in lib.rs

use std::alloc::{self, Layout};
use std::any::TypeId;
use std::ptr::{self, NonNull};

use crate::component::{Component, ComponentInfo};
use crate::occupancy::OccupancyBitmap;
use crate::EcsError;

// ---------------------------------------------------------------------------
// ComponentVtable -- type-erased operations for a component type
// ---------------------------------------------------------------------------

/// Function pointers for type-erased drop and clone of component values.
///
/// Created via [`ComponentVtable::new::<T>()`] and stored alongside each pool
/// so the pool can drop and duplicate its contents without knowing the
/// concrete type at compile time.
#[derive(Clone, Copy)]
pub struct ComponentVtable {
    /// Drop a single value in place.
    pub(crate) drop_fn: unsafe fn(*mut u8),
    /// Clone a value from `src` into uninitialised `dst` via `T::clone`.
    pub(crate) clone_fn: unsafe fn(*const u8, *mut u8),
}

impl std::fmt::Debug for ComponentVtable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentVtable").finish_non_exhaustive()
    }
}

impl ComponentVtable {
    /// Create a vtable for a concrete component type `T`.
    pub fn new<T: Component>() -> Self {
        unsafe fn drop_fn_impl<T>(ptr: *mut u8) {
            ptr::drop_in_place(ptr.cast::<T>());
        }

        unsafe fn clone_fn_impl<T: Clone>(src: *const u8, dst: *mut u8) {
            let value = &*src.cast::<T>();
            ptr::write(dst.cast::<T>(), value.clone());
        }

        Self {
            drop_fn: drop_fn_impl::<T>,
            clone_fn: clone_fn_impl::<T>,
        }
    }
}

// ---------------------------------------------------------------------------
// ComponentPool
// ---------------------------------------------------------------------------

/// Fixed-capacity arena for all live values of a single component type.
pub struct ComponentPool {
    info: ComponentInfo,
    vtable: ComponentVtable,
    /// Start of the arena. Dangling (but aligned) when nothing was allocated.
    data: NonNull<u8>,
    /// Layout of the allocation, `None` for zero-sized arenas.
    layout: Option<Layout>,
    capacity: usize,
    occupancy: OccupancyBitmap,
    /// Lowest unset slot, or `capacity` when the pool is full.
    next_free: usize,
    count: usize,
}

impl ComponentPool {
    /// Create a pool for `T` with room for `capacity` values.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::CapacityOverflow`] if `capacity` elements of `T`
    /// do not fit in a single allocation.
    pub fn new<T: Component>(capacity: usize) -> Result<Self, EcsError> {
        Self::with_vtable(ComponentInfo::of::<T>(), ComponentVtable::new::<T>(), capacity)
    }

    fn with_vtable(
        info: ComponentInfo,
        vtable: ComponentVtable,
        capacity: usize,
    ) -> Result<Self, EcsError> {
        let layout = info
            .size
            .checked_mul(capacity)
            .and_then(|bytes| Layout::from_size_align(bytes, info.align).ok())
            .ok_or(EcsError::CapacityOverflow {
                component: info.name,
                capacity,
            })?;

        let (data, layout) = if layout.size() == 0 {
            let dangling = NonNull::new(info.align as *mut u8).unwrap_or(NonNull::dangling());
            (dangling, None)
        } else {
            let ptr = unsafe { alloc::alloc(layout) };
            let data = NonNull::new(ptr).unwrap_or_else(|| alloc::handle_alloc_error(layout));
            (data, Some(layout))
        };

        Ok(Self {
            info,
            vtable,
            data,
            layout,
            capacity,
            occupancy: OccupancyBitmap::new(capacity),
            next_free: 0,
            count: 0,
        })
    }

    // -- accessors ----------------------------------------------------------

    /// Layout and identity of the stored type.
    pub fn info(&self) -> &ComponentInfo {
        &self.info
    }

    /// Number of live values.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Maximum number of live values.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.next_free >= self.capacity
    }

    /// The slot the next `add` or `clone_slot` will fill.
    #[inline]
    pub fn next_free(&self) -> usize {
        self.next_free
    }

    /// Whether `slot` currently holds a live value.
    #[inline]
    pub fn is_occupied(&self, slot: usize) -> bool {
        self.occupancy.is_set(slot)
    }

    /// Occupied slots in ascending order.
    pub fn occupied_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.occupancy.iter_ones()
    }

    // -- internal helpers ---------------------------------------------------

    #[inline]
    fn slot_ptr(&self, slot: usize) -> *mut u8 {
        debug_assert!(slot < self.capacity);
        if self.info.size == 0 {
            return self.data.as_ptr();
        }
        unsafe { self.data.as_ptr().add(slot * self.info.size) }
    }

    fn check_type<T: 'static>(&self) -> Result<(), EcsError> {
        let found = std::mem::size_of::<T>();
        if found != self.info.size {
            return Err(EcsError::TypeSizeMismatch {
                component: self.info.name,
                expected: self.info.size,
                found,
            });
        }
        if TypeId::of::<T>() != self.info.type_id {
            return Err(EcsError::TypeMismatch {
                expected: self.info.name,
                found: std::any::type_name::<T>(),
            });
        }
        Ok(())
    }

    fn check_occupied(&self, slot: usize) -> Result<(), EcsError> {
        if slot >= self.capacity {
            return Err(EcsError::OutOfRange {
                component: self.info.name,
                slot,
                capacity: self.capacity,
            });
        }
        if !self.occupancy.is_set(slot) {
            return Err(EcsError::SlotEmpty {
                component: self.info.name,
                slot,
            });
        }
        Ok(())
    }

    fn reserve_slot(&self) -> Result<usize, EcsError> {
        if self.is_full() {
            return Err(EcsError::CapacityExceeded {
                component: self.info.name,
                capacity: self.capacity,
            });
        }
        Ok(self.next_free)
    }

    /// Mark a freshly written slot live and advance the cursor past it.
    fn commit_slot(&mut self, slot: usize) {
        self.occupancy.set(slot);
        self.count += 1;
        self.next_free = self
            .occupancy
            .first_unset_from(slot + 1)
            .unwrap_or(self.capacity);
    }

    /// Mark a slot free. The value must already have been moved out or must
    /// be dropped by the caller right after.
    fn release_slot(&mut self, slot: usize) {
        self.occupancy.clear(slot);
        self.count -= 1;
        if slot < self.next_free {
            self.next_free = slot;
        }
    }

    // -- typed access -------------------------------------------------------

    /// Store `value` in the lowest free slot and return that slot.
    ///
    /// # Errors
    ///
    /// [`EcsError::TypeSizeMismatch`] / [`EcsError::TypeMismatch`] if `T` is
    /// not the pool's type, [`EcsError::CapacityExceeded`] if every slot is
    /// occupied. On error `value` is dropped and the pool is unchanged.
    pub fn add<T: 'static>(&mut self, value: T) -> Result<usize, EcsError> {
        self.check_type::<T>()?;
        let slot = self.reserve_slot()?;
        unsafe {
            ptr::write(self.slot_ptr(slot).cast::<T>(), value);
        }
        self.commit_slot(slot);
        Ok(slot)
    }

    /// Borrow the value in `slot`.
    pub fn get<T: 'static>(&self, slot: usize) -> Result<&T, EcsError> {
        self.check_type::<T>()?;
        self.check_occupied(slot)?;
        Ok(unsafe { &*self.slot_ptr(slot).cast::<T>() })
    }

    /// Mutably borrow the value in `slot`.
    pub fn get_mut<T: 'static>(&mut self, slot: usize) -> Result<&mut T, EcsError> {
        self.check_type::<T>()?;
        self.check_occupied(slot)?;
        Ok(unsafe { &mut *self.slot_ptr(slot).cast::<T>() })
    }

    /// Checked raw pointer to the value in `slot`, used by mutable views that
    /// hand out `&mut T` to distinct slots from a shared pool borrow.
    pub(crate) fn get_ptr<T: 'static>(&self, slot: usize) -> Result<*mut T, EcsError> {
        self.check_type::<T>()?;
        self.check_occupied(slot)?;
        Ok(self.slot_ptr(slot).cast::<T>())
    }

    /// Drop the value in `slot` and free the slot.
    ///
    /// # Errors
    ///
    /// [`EcsError::OutOfRange`] if `slot >= capacity`, otherwise
    /// [`EcsError::SlotEmpty`] if the slot holds no value.
    pub fn remove(&mut self, slot: usize) -> Result<(), EcsError> {
        self.check_occupied(slot)?;
        self.release_slot(slot);
        unsafe {
            (self.vtable.drop_fn)(self.slot_ptr(slot));
        }
        Ok(())
    }

    /// Move the value out of `slot` and free the slot.
    pub fn take<T: 'static>(&mut self, slot: usize) -> Result<T, EcsError> {
        self.check_type::<T>()?;
        self.check_occupied(slot)?;
        self.release_slot(slot);
        Ok(unsafe { ptr::read(self.slot_ptr(slot).cast::<T>()) })
    }

    /// Duplicate the value in `slot` into the lowest free slot using the
    /// component's `Clone` impl, returning the new slot.
    pub fn clone_slot(&mut self, slot: usize) -> Result<usize, EcsError> {
        self.check_occupied(slot)?;
        let dst = self.reserve_slot()?;
        unsafe {
            (self.vtable.clone_fn)(self.slot_ptr(slot), self.slot_ptr(dst));
        }
        self.commit_slot(dst);
        Ok(dst)
    }
}

impl std::fmt::Debug for ComponentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentPool")
            .field("component", &self.info.name)
            .field("count", &self.count)
            .field("capacity", &self.capacity)
            .field("next_free", &self.next_free)
            .finish()
    }
}

impl Drop for ComponentPool {
    fn drop(&mut self) {
        for slot in self.occupancy.iter_ones() {
            unsafe {
                (self.vtable.drop_fn)(self.slot_ptr(slot));
            }
        }
        if let Some(layout) = self.layout {
            unsafe {
                alloc::dealloc(self.data.as_ptr(), layout);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
