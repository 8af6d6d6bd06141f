//! Error types for the persistence engine

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for persistence operations
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Errors that can occur in the persistence engine
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Permanent I/O errors (not retried)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transient I/O errors that did not clear within the retry budget
    #[error("{operation} on {path:?} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: &'static str,
        path: PathBuf,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    /// Value could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Text could not be decoded into a value
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Empty or otherwise unusable file contents
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Temp file read-back did not match what was written
    #[error("Verification failed: {0}")]
    Verification(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rolling backup creation or pruning errors
    #[error("Backup error: {0}")]
    Backup(String),

    /// A blocking I/O worker panicked or was cancelled
    #[error("Task error: {0}")]
    Task(String),
}

impl PersistenceError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a new deserialization error
    pub fn deserialization(msg: impl Into<String>) -> Self {
        Self::Deserialization(msg.into())
    }

    /// Create a new corruption error
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Create a new verification error
    pub fn verification(msg: impl Into<String>) -> Self {
        Self::Verification(msg.into())
    }

    /// Create a new backup error
    pub fn backup(msg: impl Into<String>) -> Self {
        Self::Backup(msg.into())
    }

    /// Create a new task error
    pub fn task(msg: impl Into<String>) -> Self {
        Self::Task(msg.into())
    }

    /// Whether the underlying cause is a missing file
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Io(err) => err.kind() == io::ErrorKind::NotFound,
            Self::RetriesExhausted { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Whether an I/O error is worth retrying.
///
/// Missing files and malformed requests won't resolve by waiting; anything
/// else (sharing violations, permission flaps from scanners, interrupted
/// calls) is treated as short-lived contention.
pub fn is_transient(err: &io::Error) -> bool {
    !matches!(
        err.kind(),
        io::ErrorKind::NotFound
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::InvalidData
            | io::ErrorKind::Unsupported
    )
}
