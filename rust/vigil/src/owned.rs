//! `Owned<T>`: the exclusive owner of a pointee.
//!
//! An owner is move-only. Moving it (including `std::mem::take`, which leaves
//! a null owner behind) moves only the pointer to its registry, so handles
//! minted before the move stay live. Dropping, resetting or releasing the owner
//! finalizes the registry: every outstanding [`Handle`] turns dead before the
//! pointee is dropped.

use std::{
    cell::{self, RefCell},
    fmt,
    pin::Pin,
    ptr::NonNull,
    rc::Rc,
};

use crate::{
    handle::Handle,
    registry::{DeletionPolicy, Registry},
};

/// Exclusive owner of a `T` that can hand out checked [`Handle`]s to it.
///
/// # Examples
///
/// ```
/// use vigil::Owned;
///
/// let mut owner = Owned::new(String::from("config"));
/// let handle = owner.get();
/// assert_eq!(handle.try_borrow().unwrap().as_str(), "config");
///
/// owner.reset(None);
/// assert!(handle.try_borrow().is_err());
/// ```
pub struct Owned<T> {
    registry: Option<Rc<Registry<T>>>,
}

impl<T> Owned<T> {
    /// Creates a null owner.
    pub fn null() -> Owned<T> {
        Owned { registry: None }
    }

    /// Moves `value` to the heap and takes ownership of it.
    pub fn new(value: T) -> Owned<T> {
        let target = NonNull::from(Box::leak(Box::new(RefCell::new(value))));
        // SAFETY: the cell was just leaked from a box and only this registry
        // frees it.
        let registry = unsafe { Registry::new(target, DeletionPolicy::Destroy) };
        Owned {
            registry: Some(registry),
        }
    }

    /// Takes ownership of a boxed value.
    pub fn from_box(value: Box<T>) -> Owned<T> {
        Owned::new(*value)
    }

    /// Creates an owner that tracks handles to a cell it does not own.
    ///
    /// Finalizing the owner invalidates its handles but never drops the cell.
    ///
    /// # Safety
    ///
    /// The cell must stay valid, and must not move, for as long as the
    /// returned owner is alive. If `T` is not `Unpin`, the cell must also be
    /// treated as pinned from this point on.
    pub unsafe fn borrowing(target: NonNull<RefCell<T>>) -> Owned<T> {
        // SAFETY: guaranteed by the caller.
        let registry = unsafe { Registry::new(target, DeletionPolicy::Borrow) };
        Owned {
            registry: Some(registry),
        }
    }

    /// Returns `true` if this owner holds nothing.
    pub fn is_null(&self) -> bool {
        self.registry.is_none()
    }

    /// Deletion policy of the current pointee, or `None` for a null owner.
    pub fn policy(&self) -> Option<DeletionPolicy> {
        self.registry.as_ref().map(|registry| registry.policy())
    }

    /// Returns a new handle to the current pointee, or a null handle if the
    /// owner is null.
    pub fn get(&self) -> Handle<T> {
        Handle::new(self)
    }

    /// Number of live handles registered against the current pointee.
    pub fn observer_count(&self) -> usize {
        self.registry
            .as_ref()
            .map_or(0, |registry| registry.observer_count())
    }

    /// Immutably borrows the pointee, or returns `None` for a null owner.
    ///
    /// # Panics
    ///
    /// Panics if the pointee is mutably borrowed through a handle.
    pub fn borrow(&self) -> Option<cell::Ref<'_, T>> {
        self.target().map(RefCell::borrow)
    }

    /// Borrows the pointee at its fixed heap address.
    ///
    /// # Panics
    ///
    /// Panics if the pointee is mutably borrowed through a handle.
    pub fn pinned(&self) -> Option<Pin<cell::Ref<'_, T>>> {
        // SAFETY: the pointee is only moved by `borrow_mut` and `release`,
        // which require `T: Unpin`. Finalizing drops it in place.
        self.borrow().map(|guard| unsafe { Pin::new_unchecked(guard) })
    }

    /// Drops the current pointee (after invalidating every handle to it) and
    /// installs `value`, if any, with a fresh registry.
    ///
    /// Handles minted before the reset stay dead even if they are compared
    /// against the new pointee.
    pub fn reset(&mut self, value: Option<T>) {
        self.finalize();
        if let Some(value) = value {
            *self = Owned::new(value);
        }
    }

    pub(crate) fn registry(&self) -> Option<&Rc<Registry<T>>> {
        self.registry.as_ref()
    }

    fn target(&self) -> Option<&RefCell<T>> {
        self.registry.as_ref().and_then(|registry| registry.target())
    }

    fn finalize(&mut self) {
        if let Some(registry) = self.registry.take() {
            registry.finalize();
        }
    }
}

impl<T: Unpin> Owned<T> {
    /// Mutably borrows the pointee, or returns `None` for a null owner.
    ///
    /// # Panics
    ///
    /// Panics if the pointee is borrowed through a handle.
    pub fn borrow_mut(&self) -> Option<cell::RefMut<'_, T>> {
        self.target().map(RefCell::borrow_mut)
    }

    /// Invalidates every handle and hands the pointee back to the caller
    /// instead of dropping it. The owner becomes null.
    ///
    /// Returns `None` for a null owner and for a [`DeletionPolicy::Borrow`]
    /// owner, which has nothing to hand back.
    pub fn release(&mut self) -> Option<T> {
        let registry = self.registry.take()?;
        let target = registry.invalidate()?;
        // SAFETY: `target` was just detached by `invalidate`.
        let cell = unsafe { registry.reclaim(target) }?;
        log::debug!("{} released by its owner", std::any::type_name::<T>());
        Some(cell.into_inner())
    }
}

impl<T> Drop for Owned<T> {
    fn drop(&mut self) {
        self.finalize();
    }
}

impl<T> Default for Owned<T> {
    fn default() -> Self {
        Owned::null()
    }
}

impl<T> From<T> for Owned<T> {
    fn from(value: T) -> Self {
        Owned::new(value)
    }
}

/// Owners are equal when both are null or both own the same pointee. Since
/// ownership is exclusive, two distinct non-null owners are never equal, even
/// when their values are.
impl<T> PartialEq for Owned<T> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.registry, &other.registry) {
            (None, None) => true,
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<T> Eq for Owned<T> {}

impl<T> PartialEq<Handle<T>> for Owned<T> {
    fn eq(&self, other: &Handle<T>) -> bool {
        other == self
    }
}

impl<T: fmt::Debug> fmt::Debug for Owned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target() {
            Some(cell) => f.debug_tuple("Owned").field(cell).finish(),
            None => f.write_str("Owned(null)"),
        }
    }
}
