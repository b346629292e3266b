//! `Member<T>`: a value that hands out handles to itself.
//!
//! A `Member` keeps its value inline, on the stack or inside another struct,
//! and acts as its own owner: once pinned, [`Member::address_of`] returns
//! [`Handle`]s that behave exactly like handles minted from an [`Owned`], and
//! die when the member's storage goes away. The member's owner uses
//! [`DeletionPolicy::Borrow`](crate::DeletionPolicy::Borrow), so tearing it down
//! never drops the value; the value is dropped as part of the member itself,
//! after every handle to it has been invalidated.
//!
//! Members can be nested. A struct holding `Member` fields is `!Unpin`, so it
//! is only reachable through shared borrows and its members keep their
//! addresses:
//!
//! ```
//! use std::pin::{Pin, pin};
//! use vigil::{Handle, Member};
//!
//! struct Engine {
//!     rpm: u32,
//! }
//!
//! struct Car {
//!     engine: Member<Engine>,
//! }
//!
//! impl Car {
//!     fn engine(self: Pin<&Self>) -> Handle<Engine> {
//!         // SAFETY: `engine` is never moved out of a pinned `Car`.
//!         unsafe { self.map_unchecked(|car| &car.engine) }.address_of()
//!     }
//! }
//!
//! let engine = {
//!     let car = pin!(Member::new(Car {
//!         engine: Member::new(Engine { rpm: 900 }),
//!     }));
//!     let engine = car.as_ref().pinned().as_ref().engine();
//!     assert_eq!(engine.try_borrow().unwrap().rpm, 900);
//!     engine
//! };
//! assert!(engine.try_borrow().is_err());
//! ```

use std::{
    cell::{self, OnceCell, RefCell},
    fmt,
    marker::PhantomPinned,
    pin::Pin,
    ptr::NonNull,
};

use crate::{handle::Handle, owned::Owned};

pub struct Member<T> {
    /// Created on the first `address_of`, once the address is fixed.
    owner: OnceCell<Owned<T>>,
    value: RefCell<T>,
    _pinned: PhantomPinned,
}

impl<T> Member<T> {
    pub fn new(value: T) -> Member<T> {
        Member {
            owner: OnceCell::new(),
            value: RefCell::new(value),
            _pinned: PhantomPinned,
        }
    }

    /// Returns a live handle to this member's value.
    pub fn address_of(self: Pin<&Self>) -> Handle<T> {
        let this = self.get_ref();
        this.owner
            .get_or_init(|| {
                // SAFETY: `this` is pinned, so `value` keeps its address until
                // the member is dropped, and `Drop` finalizes the owner before
                // `value` goes away.
                unsafe { Owned::borrowing(NonNull::from(&this.value)) }
            })
            .get()
    }

    /// Number of live handles to this member.
    pub fn observer_count(&self) -> usize {
        self.owner.get().map_or(0, Owned::observer_count)
    }

    /// # Panics
    ///
    /// Panics if the value is mutably borrowed through a handle.
    pub fn borrow(&self) -> cell::Ref<'_, T> {
        self.value.borrow()
    }

    /// Borrows the value without allowing it to be moved.
    pub fn pinned(self: Pin<&Self>) -> Pin<cell::Ref<'_, T>> {
        // SAFETY: the value is structurally pinned; it can only be moved out
        // through `borrow_mut`, which requires `T: Unpin`.
        unsafe { Pin::new_unchecked(self.get_ref().value.borrow()) }
    }
}

impl<T: Unpin> Member<T> {
    /// # Panics
    ///
    /// Panics if the value is borrowed through a handle.
    pub fn borrow_mut(&self) -> cell::RefMut<'_, T> {
        self.value.borrow_mut()
    }
}

impl<T> Drop for Member<T> {
    fn drop(&mut self) {
        let Some(owner) = self.owner.take() else {
            return;
        };
        if self.value.try_borrow_mut().is_err() {
            // The storage is going away regardless; freeing it under a live
            // borrow is not recoverable.
            log::error!(
                "Member<{}> dropped while borrowed through a handle",
                std::any::type_name::<T>()
            );
            std::process::abort();
        }
        drop(owner);
    }
}

impl<T: Default> Default for Member<T> {
    fn default() -> Self {
        Member::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Member<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("value", &self.value)
            .field("observers", &self.observer_count())
            .finish()
    }
}
