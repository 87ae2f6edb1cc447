//! Error types for rustlevel.

use std::fmt;

/// The main error type for rustlevel operations.
#[derive(Debug)]
pub enum Error {
    /// A key or a store does not exist
    NotFound(String),

    /// I/O error reported by the storage engine
    Io(std::io::Error),

    /// Persisted data failed an integrity check
    Corruption(String),

    /// The handle (or the handle a cursor/batch refers to) has been closed
    HandleClosed,

    /// A batch was committed without a bound or supplied handle
    NoHandle,

    /// A cursor accessor was used while the cursor is not positioned
    InvalidPosition,

    /// An operation was called in a state that does not allow it
    Precondition(String),

    /// Invalid argument or option combination
    InvalidArgument(String),

    /// Serialization/deserialization error
    Serialization(String),

    /// A lock was poisoned (internal error)
    LockPoisoned,
}

impl Error {
    /// Returns true for lookup misses and missing stores.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Returns true if persisted data failed an integrity check.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(what) => write!(f, "Not found: {}", what),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Corruption(msg) => write!(f, "Corruption: {}", msg),
            Error::HandleClosed => write!(f, "Handle closed"),
            Error::NoHandle => write!(f, "No handle"),
            Error::InvalidPosition => write!(f, "Cursor is not positioned at a valid entry"),
            Error::Precondition(msg) => write!(f, "Precondition failed: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::LockPoisoned => write!(f, "Lock poisoned"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

/// A specialized `Result` type for rustlevel operations.
pub type Result<T> = std::result::Result<T, Error>;
