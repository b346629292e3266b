//! Runtime-checked ownership: exclusive owners and observer handles that fail
//! fast instead of dangling.
//!
//! - [`Owned<T>`]: move-only owner of a pointee. Dropping, resetting or
//!   releasing it invalidates every handle minted from it before the pointee
//!   is dropped.
//! - [`Handle<T>`]: cheap, cloneable, non-owning reference. Every access
//!   checks that the owner still holds the pointee and reports
//!   [`ErrorKind::UseAfterFree`] otherwise.
//! - [`Member<T>`]: a value that owns itself, for stack and struct-field
//!   storage, handing out the same kind of handles via
//!   [`Member::address_of`].
//!
//! All types are single-threaded (`!Send`, `!Sync`).
//!
//! # Features
//!
//! - `track-refs` (default): every handle is registered individually with its
//!   owner and invalidated by a broadcast on release. Without it, handles only
//!   consult their owner's release flag; behavior is the same, but
//!   [`Owned::observer_count`] always reports zero.

pub mod error;
pub mod handle;
pub mod member;
pub mod owned;
mod registry;
pub mod result;

pub use error::{Error, ErrorKind};
pub use handle::Handle;
pub use member::Member;
pub use owned::Owned;
pub use registry::DeletionPolicy;
pub use result::Result;
