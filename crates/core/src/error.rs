//! Error types for mapfold.

use alloc::string::String;
use alloc::vec::Vec;
use thiserror::Error;

/// Result type alias for mapfold operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for mapfold operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A read or write against the underlying store failed.
    ///
    /// The current mutation is considered not yet applied and is retried when
    /// the trigger redelivers it.
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Persisted engine state does not have the expected structure.
    #[error("Corrupted entry {key:?}: {message}")]
    Corruption { key: Vec<u8>, message: String },

    /// A composite key could not be encoded or decoded.
    #[error("Key encoding error: {message}")]
    KeyEncoding { message: String },

    /// A value could not be serialized or deserialized.
    #[error("Codec error: {message}")]
    Codec { message: String },

    /// The trigger or task has been closed.
    #[error("Task {name} is closed")]
    Closed { name: String },

    /// Invalid operation.
    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },
}

impl Error {
    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
        }
    }

    /// Creates a corruption error for the entry stored at `key`.
    pub fn corruption(key: impl Into<Vec<u8>>, message: impl Into<String>) -> Self {
        Error::Corruption {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a key encoding error.
    pub fn key_encoding(message: impl Into<String>) -> Self {
        Error::KeyEncoding {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Error::Codec {
            message: message.into(),
        }
    }

    /// Creates a closed error.
    pub fn closed(name: impl Into<String>) -> Self {
        Error::Closed { name: name.into() }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if retrying the same mutation later may succeed.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Storage { .. })
    }

    /// Returns true if the error signals a broken invariant in persisted state.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Corruption { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        use alloc::string::ToString;
        Error::codec(err.to_string())
    }
}
