//! Error types for Coffer.

use std::fmt;

/// The main error type for Coffer operations.
#[derive(Debug)]
pub enum Error {
    /// An insert hit a primary key that is already present
    AlreadyExists,

    /// A decoder ran out of bytes in the middle of a record
    InsufficientData,

    /// Bytes on disk are malformed (bad checksum, unknown tag, bad header)
    Corruption(String),

    /// Another snapshot of the same container is still running
    SnapshotInProgress(String),

    /// I/O error
    Io(std::io::Error),

    /// Serialization error
    Serialization(String),

    /// A lock was poisoned (internal error)
    LockPoisoned,

    /// Invalid operation
    InvalidOperation(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AlreadyExists => write!(f, "The primary key already exists"),
            Error::InsufficientData => write!(f, "Insufficient data for a complete record"),
            Error::Corruption(msg) => write!(f, "Data corruption: {}", msg),
            Error::SnapshotInProgress(name) => {
                write!(f, "Snapshot of container '{}' already in progress", name)
            }
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::LockPoisoned => write!(f, "Lock poisoned"),
            Error::InvalidOperation(msg) => write!(f, "Invalid operation: {}", msg),
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

/// A specialized `Result` type for Coffer operations.
pub type Result<T> = std::result::Result<T, Error>;
