//! `Handle<T>`: a non-owning, checked reference to an owned pointee.
//!
//! A handle is in one of three states:
//!
//! - null: never bound to anything (`Handle::null()`, or minted from a null
//!   owner),
//! - live: registered with its owner's registry,
//! - dead: its owner was dropped, reset or released since the handle was
//!   minted.
//!
//! Cloning a live handle registers the clone separately; cloning a dead or
//! null handle yields a dead or null handle. A dead handle never becomes live
//! again.
//!
//! Accessing a dead handle reports [`ErrorKind::UseAfterFree`]. Accessing a
//! null handle is a caller bug and panics with an ordinary message instead.
//!
//! [`ErrorKind::UseAfterFree`]: crate::ErrorKind::UseAfterFree

use std::{
    cell::{self, RefCell},
    fmt,
    pin::Pin,
    rc::Rc,
};

use crate::{
    Error, Result,
    owned::Owned,
    registry::{ObserverKey, Registry},
};

/// A cloneable, non-owning reference that fails fast once its owner is gone.
///
/// # Examples
///
/// ```
/// use vigil::Owned;
///
/// let owner = Owned::new(vec![1, 2, 3]);
/// let first = owner.get();
/// let second = first.clone();
/// assert_eq!(first, second);
///
/// drop(owner);
/// let err = second.try_borrow().unwrap_err();
/// assert!(err.to_string().starts_with("use after free"));
/// ```
pub struct Handle<T> {
    link: Option<Link<T>>,
}

struct Link<T> {
    registry: Rc<Registry<T>>,
    key: ObserverKey,
}

enum State<'a, T> {
    Null,
    Live(&'a Rc<Registry<T>>),
    Dead,
}

impl<T> Handle<T> {
    /// Creates a null handle.
    pub fn null() -> Handle<T> {
        Handle { link: None }
    }

    /// Creates a handle to the pointee of `owner`, or a null handle if the
    /// owner is null.
    pub fn new(owner: &Owned<T>) -> Handle<T> {
        let link = owner.registry().and_then(|registry| {
            registry.register().map(|key| Link {
                registry: registry.clone(),
                key,
            })
        });
        Handle { link }
    }

    pub fn is_null(&self) -> bool {
        self.link.is_none()
    }

    pub fn is_live(&self) -> bool {
        matches!(self.state(), State::Live(_))
    }

    pub fn is_dead(&self) -> bool {
        matches!(self.state(), State::Dead)
    }

    /// Immutably borrows the pointee.
    ///
    /// # Errors
    ///
    /// Returns a use-after-free error if the owner has released the pointee.
    ///
    /// # Panics
    ///
    /// Panics if the handle is null or the pointee is mutably borrowed.
    #[track_caller]
    pub fn try_borrow(&self) -> Result<cell::Ref<'_, T>> {
        self.target().map(RefCell::borrow)
    }

    /// Like [`Handle::try_borrow`], but unwinds with the [`Error`] itself as
    /// the panic payload when the pointee is gone, so callers that catch the
    /// unwind can tell a use-after-free apart from any other panic.
    #[track_caller]
    pub fn borrow(&self) -> cell::Ref<'_, T> {
        match self.try_borrow() {
            Ok(guard) => guard,
            Err(e) => std::panic::panic_any(e),
        }
    }

    /// Borrows the pointee without allowing it to be moved, for handing out
    /// handles to [`Member`](crate::Member)s nested inside it.
    #[track_caller]
    pub fn try_pinned(&self) -> Result<Pin<cell::Ref<'_, T>>> {
        let guard = self.try_borrow()?;
        // SAFETY: pointees are only moved through `borrow_mut` and `release`,
        // which require `T: Unpin`.
        Ok(unsafe { Pin::new_unchecked(guard) })
    }

    /// Runs `f` on the pointee.
    #[track_caller]
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let guard = self.try_borrow()?;
        Ok(f(&guard))
    }

    /// Compares two handles, treating a dead operand as an access.
    ///
    /// # Errors
    ///
    /// Returns a use-after-free error if either handle is dead.
    #[track_caller]
    pub fn try_eq(&self, other: &Handle<T>) -> Result<bool> {
        if self.is_dead() || other.is_dead() {
            return Err(Error::use_after_free::<T>());
        }
        Ok(self == other)
    }

    #[track_caller]
    fn target(&self) -> Result<&RefCell<T>> {
        let Some(link) = &self.link else {
            panic!("access through a null Handle<{}>", std::any::type_name::<T>());
        };
        match link.registry.target() {
            Some(cell) if link.registry.is_live(link.key) => Ok(cell),
            _ => Err(Error::use_after_free::<T>()),
        }
    }

    fn state(&self) -> State<'_, T> {
        match &self.link {
            None => State::Null,
            Some(link) if link.registry.is_live(link.key) => State::Live(&link.registry),
            Some(_) => State::Dead,
        }
    }
}

impl<T: Unpin> Handle<T> {
    /// Mutably borrows the pointee.
    ///
    /// # Errors
    ///
    /// Returns a use-after-free error if the owner has released the pointee.
    ///
    /// # Panics
    ///
    /// Panics if the handle is null or the pointee is already borrowed.
    #[track_caller]
    pub fn try_borrow_mut(&self) -> Result<cell::RefMut<'_, T>> {
        self.target().map(RefCell::borrow_mut)
    }

    /// Panicking form of [`Handle::try_borrow_mut`]; see [`Handle::borrow`].
    #[track_caller]
    pub fn borrow_mut(&self) -> cell::RefMut<'_, T> {
        match self.try_borrow_mut() {
            Ok(guard) => guard,
            Err(e) => std::panic::panic_any(e),
        }
    }

    /// Runs `f` on the mutably borrowed pointee.
    #[track_caller]
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut guard = self.try_borrow_mut()?;
        Ok(f(&mut guard))
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        let link = self.link.as_ref().map(|link| Link {
            registry: link.registry.clone(),
            // A dead link keeps its stale key, so the clone is dead as well.
            key: link.registry.register().unwrap_or(link.key),
        });
        Handle { link }
    }
}

impl<T> Drop for Handle<T> {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            link.registry.deregister(link.key);
        }
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Handle::null()
    }
}

impl<T> From<&Owned<T>> for Handle<T> {
    fn from(owner: &Owned<T>) -> Self {
        Handle::new(owner)
    }
}

/// Handles are equal when both are null, or both are live and refer to the
/// same pointee. A dead handle is unequal to everything, itself included; use
/// [`Handle::try_eq`] to have a dead operand reported instead.
impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self.state(), other.state()) {
            (State::Null, State::Null) => true,
            (State::Live(a), State::Live(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<T> PartialEq<Owned<T>> for Handle<T> {
    fn eq(&self, other: &Owned<T>) -> bool {
        match (self.state(), other.registry()) {
            (State::Null, None) => true,
            (State::Live(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state() {
            State::Null => "null",
            State::Live(_) => "live",
            State::Dead => "dead",
        };
        write!(f, "Handle<{}>({state})", std::any::type_name::<T>())
    }
}
