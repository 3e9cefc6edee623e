//! Store error types.
//!
//! - `NotFound`: key set location, metadata or version blob missing
//! - `AlreadyExists`: writer refused to replace an existing key set
//! - `Serialization`: metadata or key data could not be encoded/decoded
//! - `Io`: underlying file system errors
//! - `Finished`: writer used after its commit
//! - `Decryption`: encrypted key data could not be opened

use thiserror::Error;

/// Errors that can occur while reading or writing key sets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Requested item does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Target already holds a key set and overwriting was not allowed
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error (file system, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Writer was already committed
    #[error("writer already finished")]
    Finished,

    /// Encrypted key data could not be decrypted
    #[error("key data decryption failed: {0}")]
    Decryption(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}
