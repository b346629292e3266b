//! Per-pointee bookkeeping of live observer handles.
//!
//! Every non-null [`Owned`](crate::Owned) holds exactly one `Registry`. The
//! registry records where the pointee lives, how it must be released, and which
//! handles are currently registered against it. Finalizing the registry flips
//! every registered handle to dead in one sweep and only then releases the
//! pointee, so no handle can reach a value that is being torn down.
//!
//! With the `track-refs` feature each handle owns a slot in a generation-tagged
//! [`SlotVec`]; finalizing clears the slot array, which bumps every slot's
//! generation. Without it the observer set is compiled out and liveness is the
//! registry's own active flag.

use std::{
    cell::{Cell, RefCell},
    ptr::NonNull,
    rc::Rc,
};

#[cfg(feature = "track-refs")]
use vigil_slot_vec::{SlotKey, SlotVec};

/// What finalizing an owner does to its pointee.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeletionPolicy {
    /// The owner allocated the pointee and drops it.
    #[default]
    Destroy,
    /// The pointee lives elsewhere; the owner only invalidates handles.
    Borrow,
}

#[cfg(feature = "track-refs")]
pub(crate) type ObserverKey = SlotKey;

#[cfg(not(feature = "track-refs"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ObserverKey;

/// The set of live observers of one registry.
#[cfg(feature = "track-refs")]
#[derive(Default)]
struct ObserverSet(RefCell<SlotVec<()>>);

#[cfg(feature = "track-refs")]
impl ObserverSet {
    fn insert(&self) -> ObserverKey {
        self.0.borrow_mut().insert(())
    }

    fn remove(&self, key: ObserverKey) {
        self.0.borrow_mut().remove(key);
    }

    fn contains(&self, key: ObserverKey) -> bool {
        self.0.borrow().contains_key(key)
    }

    fn len(&self) -> usize {
        self.0.borrow().len()
    }

    fn clear(&self) -> usize {
        self.0.borrow_mut().clear()
    }
}

/// Untracked mode: nothing is recorded, the registry's active flag decides.
#[cfg(not(feature = "track-refs"))]
#[derive(Default)]
struct ObserverSet;

#[cfg(not(feature = "track-refs"))]
impl ObserverSet {
    fn insert(&self) -> ObserverKey {
        ObserverKey
    }

    fn remove(&self, _key: ObserverKey) {}

    fn contains(&self, _key: ObserverKey) -> bool {
        true
    }

    fn len(&self) -> usize {
        0
    }

    fn clear(&self) -> usize {
        0
    }
}

pub(crate) struct Registry<T> {
    policy: DeletionPolicy,
    /// Address of the pointee cell. `None` once finalized.
    target: Cell<Option<NonNull<RefCell<T>>>>,
    observers: ObserverSet,
}

impl<T> Registry<T> {
    /// Creates an active registry for `target`.
    ///
    /// # Safety
    ///
    /// `target` must stay valid for shared access until the registry is
    /// finalized. With [`DeletionPolicy::Destroy`] it must come from
    /// `Box::into_raw` and must not be freed by anyone else.
    pub(crate) unsafe fn new(target: NonNull<RefCell<T>>, policy: DeletionPolicy) -> Rc<Self> {
        log::trace!(
            "registry for {} created ({policy:?})",
            std::any::type_name::<T>()
        );
        Rc::new(Registry {
            policy,
            target: Cell::new(Some(target)),
            observers: ObserverSet::default(),
        })
    }

    pub(crate) fn policy(&self) -> DeletionPolicy {
        self.policy
    }

    pub(crate) fn is_active(&self) -> bool {
        self.target.get().is_some()
    }

    /// Returns the pointee cell while the registry is active.
    pub(crate) fn target(&self) -> Option<&RefCell<T>> {
        // SAFETY: the target stays valid until `invalidate` clears it, and
        // `reclaim` refuses to free a cell that still has outstanding borrows.
        self.target.get().map(|target| unsafe { target.as_ref() })
    }

    /// Adds a live observer. Returns `None` on a finalized registry.
    pub(crate) fn register(&self) -> Option<ObserverKey> {
        if !self.is_active() {
            return None;
        }
        Some(self.observers.insert())
    }

    /// Removes an observer. Unknown or stale keys are ignored.
    pub(crate) fn deregister(&self, key: ObserverKey) {
        self.observers.remove(key);
    }

    pub(crate) fn is_live(&self, key: ObserverKey) -> bool {
        self.is_active() && self.observers.contains(key)
    }

    /// Number of live registrations. Always zero without `track-refs`.
    pub(crate) fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Marks every registered observer dead and detaches the target.
    ///
    /// Returns the former target, or `None` if the registry was already
    /// finalized.
    pub(crate) fn invalidate(&self) -> Option<NonNull<RefCell<T>>> {
        let target = self.target.take()?;
        let invalidated = self.observers.clear();
        log::trace!(
            "registry for {} finalized, {invalidated} observers invalidated",
            std::any::type_name::<T>()
        );
        Some(target)
    }

    /// Takes back ownership of a detached Destroy target.
    ///
    /// Returns `None` for [`DeletionPolicy::Borrow`].
    ///
    /// # Safety
    ///
    /// `target` must be the value returned by [`Registry::invalidate`] on this
    /// registry, and must be passed here at most once.
    ///
    /// # Panics
    ///
    /// Panics, leaking the pointee, if it is still borrowed through a handle.
    pub(crate) unsafe fn reclaim(&self, target: NonNull<RefCell<T>>) -> Option<Box<RefCell<T>>> {
        match self.policy {
            DeletionPolicy::Borrow => None,
            DeletionPolicy::Destroy => {
                // SAFETY: the target has not been freed yet (see above).
                if unsafe { target.as_ref() }.try_borrow_mut().is_err() {
                    panic!(
                        "{} released while borrowed through a handle",
                        std::any::type_name::<T>()
                    );
                }
                // SAFETY: Destroy targets come from `Box::into_raw`.
                Some(unsafe { Box::from_raw(target.as_ptr()) })
            }
        }
    }

    /// Invalidates all observers, then applies the deletion policy.
    /// Runs at most once; later calls do nothing.
    pub(crate) fn finalize(&self) {
        if let Some(target) = self.invalidate() {
            // SAFETY: `target` was just detached by `invalidate`.
            drop(unsafe { self.reclaim(target) });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe(Rc<Cell<usize>>);

    impl Drop for Probe {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn boxed(drops: &Rc<Cell<usize>>) -> NonNull<RefCell<Probe>> {
        NonNull::from(Box::leak(Box::new(RefCell::new(Probe(drops.clone())))))
    }

    #[test]
    fn test_finalize_destroys_once() {
        let drops = Rc::new(Cell::new(0));
        let registry = unsafe { Registry::new(boxed(&drops), DeletionPolicy::Destroy) };
        assert!(registry.is_active());

        registry.finalize();
        assert!(!registry.is_active());
        assert!(registry.target().is_none());
        assert_eq!(drops.get(), 1);

        registry.finalize();
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_finalize_borrow_keeps_pointee() {
        let drops = Rc::new(Cell::new(0));
        let cell = RefCell::new(Probe(drops.clone()));
        let registry = unsafe { Registry::new(NonNull::from(&cell), DeletionPolicy::Borrow) };
        let key = registry.register().unwrap();

        registry.finalize();
        assert!(!registry.is_live(key));
        assert_eq!(drops.get(), 0);

        drop(cell);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_register_after_finalize() {
        let drops = Rc::new(Cell::new(0));
        let registry = unsafe { Registry::new(boxed(&drops), DeletionPolicy::Destroy) };
        registry.finalize();
        assert!(registry.register().is_none());
    }

    #[test]
    fn test_reclaim_borrowed_target_panics() {
        let drops = Rc::new(Cell::new(0));
        let target = boxed(&drops);
        let registry = unsafe { Registry::new(target, DeletionPolicy::Destroy) };
        let guard = registry.target().unwrap().borrow();

        let detached = registry.invalidate().unwrap();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
            registry.reclaim(detached)
        }));
        assert!(result.is_err());
        assert_eq!(drops.get(), 0);

        drop(guard);
        // The pointee was leaked by the failed reclaim; free it here.
        drop(unsafe { Box::from_raw(target.as_ptr()) });
        assert_eq!(drops.get(), 1);
    }

    #[cfg(feature = "track-refs")]
    #[test]
    fn test_register_deregister() {
        let drops = Rc::new(Cell::new(0));
        let registry = unsafe { Registry::new(boxed(&drops), DeletionPolicy::Destroy) };

        let a = registry.register().unwrap();
        let b = registry.register().unwrap();
        assert_eq!(registry.observer_count(), 2);
        assert!(registry.is_live(a) && registry.is_live(b));

        registry.deregister(a);
        registry.deregister(a);
        assert_eq!(registry.observer_count(), 1);
        assert!(!registry.is_live(a));
        assert!(registry.is_live(b));

        registry.finalize();
        assert_eq!(registry.observer_count(), 0);
        assert!(!registry.is_live(b));
        registry.deregister(b);
    }
}
