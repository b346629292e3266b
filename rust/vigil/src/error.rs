use std::panic::Location;

use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    /// Builds a use-after-free error for a pointee of type `T`, attributed to
    /// the caller's location.
    #[track_caller]
    pub fn use_after_free<T: ?Sized>() -> Error {
        Error(
            ErrorKind::UseAfterFree {
                type_name: std::any::type_name::<T>(),
                location: Location::caller(),
            }
            .into(),
        )
    }

    /// Source location of the access that failed.
    pub fn location(&self) -> &'static Location<'static> {
        match self.kind() {
            ErrorKind::UseAfterFree { location, .. } => location,
        }
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("use after free: {type_name} accessed at {location} after its owner released it")]
    UseAfterFree {
        type_name: &'static str,
        location: &'static Location<'static>,
    },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}
