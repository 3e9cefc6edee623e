//! Key set persistence.
//!
//! Engines see a key set only through [`KeySetReader`]; lifecycle saves go
//! through [`KeySetWriter`]. Writers stage everything and make it visible in
//! `finish()`, so a reader never observes half of a save.
//!
//! - [`FileKeySet`] / [`FileKeySetWriter`]: a directory with `meta` and one
//!   file per version number
//! - [`MemoryKeySet`]: shared in-memory store for tests and transient sets
//! - [`EncryptedKeySetReader`] / [`EncryptedKeySetWriter`]: key blobs
//!   encrypted under another key set

mod encrypted;
mod error;
mod file;
mod memory;

pub use encrypted::{EncryptedKeySetReader, EncryptedKeySetWriter};
pub use error::StoreError;
pub use file::{FileKeySet, FileKeySetWriter};
pub use memory::{MemoryKeySet, MemoryKeySetWriter};

use crate::metadata::KeyMetadata;

/// Read side of a key set location.
pub trait KeySetReader {
    /// Parsed, validated metadata.
    fn metadata(&self) -> Result<KeyMetadata, StoreError>;

    /// Serialized material of `version`.
    ///
    /// Returns `NotFound` if the version has no blob.
    fn key_data(&self, version: u32) -> Result<String, StoreError>;
}

/// Write side of a key set location.
///
/// # Invariants
///
/// - Nothing written is visible to readers before `finish()` succeeds
/// - A writer dropped without `finish()` leaves the location untouched
/// - After `finish()` every further call returns `Finished`
pub trait KeySetWriter {
    /// Stage metadata.
    fn write_metadata(&mut self, metadata: &KeyMetadata) -> Result<(), StoreError>;

    /// Stage serialized material for `version`.
    fn write_key_data(&mut self, version: u32, data: &str) -> Result<(), StoreError>;

    /// Commit everything staged.
    fn finish(&mut self) -> Result<(), StoreError>;
}

impl<R: KeySetReader + ?Sized> KeySetReader for &R {
    fn metadata(&self) -> Result<KeyMetadata, StoreError> {
        (**self).metadata()
    }

    fn key_data(&self, version: u32) -> Result<String, StoreError> {
        (**self).key_data(version)
    }
}
