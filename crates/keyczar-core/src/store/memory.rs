//! In-memory key set store.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use super::{KeySetReader, KeySetWriter, StoreError};
use crate::metadata::KeyMetadata;

/// In-memory key set for tests and transient key sets.
///
/// Clones share state. Writers obtained from [`MemoryKeySet::writer`] stage
/// their output and replace the whole stored key set on `finish()`.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeySet {
    inner: Arc<Mutex<MemoryKeySetInner>>,
}

#[derive(Debug, Default)]
struct MemoryKeySetInner {
    /// Metadata JSON, `None` until the first commit
    metadata: Option<String>,
    keys: BTreeMap<u32, String>,
}

impl MemoryKeySet {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer that commits into this store.
    pub fn writer(&self) -> MemoryKeySetWriter {
        MemoryKeySetWriter {
            target: self.clone(),
            metadata: None,
            keys: BTreeMap::new(),
            finished: false,
        }
    }

    /// Number of stored version blobs.
    pub fn version_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.keys.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryKeySetInner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Io("key set lock poisoned".into()))
    }
}

impl KeySetReader for MemoryKeySet {
    fn metadata(&self) -> Result<KeyMetadata, StoreError> {
        let inner = self.lock()?;
        let json = inner.metadata.as_deref().ok_or_else(|| StoreError::NotFound("meta".into()))?;
        KeyMetadata::from_json(json)
    }

    fn key_data(&self, version: u32) -> Result<String, StoreError> {
        self.lock()?
            .keys
            .get(&version)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("version {version}")))
    }
}

/// Staged write into a [`MemoryKeySet`].
#[derive(Debug)]
pub struct MemoryKeySetWriter {
    target: MemoryKeySet,
    metadata: Option<String>,
    keys: BTreeMap<u32, String>,
    finished: bool,
}

impl KeySetWriter for MemoryKeySetWriter {
    fn write_metadata(&mut self, metadata: &KeyMetadata) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::Finished);
        }
        self.metadata = Some(metadata.to_json()?);
        Ok(())
    }

    fn write_key_data(&mut self, version: u32, data: &str) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::Finished);
        }
        self.keys.insert(version, data.to_owned());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::Finished);
        }
        let metadata = self
            .metadata
            .take()
            .ok_or_else(|| StoreError::NotFound("metadata was never written".into()))?;

        let mut inner = self.target.lock()?;
        inner.metadata = Some(metadata);
        inner.keys = std::mem::take(&mut self.keys);
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use keyczar_crypto::{KeyPurpose, KeyType};

    use super::*;

    #[test]
    fn empty_store_has_no_metadata() {
        let store = MemoryKeySet::new();
        assert!(matches!(store.metadata(), Err(StoreError::NotFound(_))));
        assert!(matches!(store.key_data(1), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn commit_replaces_contents() {
        let store = MemoryKeySet::new();
        let metadata =
            KeyMetadata::new("mem", KeyPurpose::SignAndVerify, KeyType::HmacSha1).unwrap();

        let mut writer = store.writer();
        writer.write_metadata(&metadata).unwrap();
        writer.write_key_data(1, "one").unwrap();
        writer.write_key_data(2, "two").unwrap();
        assert_eq!(store.version_count().unwrap(), 0);
        writer.finish().unwrap();
        assert_eq!(store.version_count().unwrap(), 2);

        let mut writer = store.writer();
        writer.write_metadata(&metadata).unwrap();
        writer.write_key_data(2, "two").unwrap();
        writer.finish().unwrap();

        assert_eq!(store.metadata().unwrap(), metadata);
        assert!(store.key_data(1).is_err());
        assert_eq!(store.key_data(2).unwrap(), "two");
    }

    #[test]
    fn clones_share_state() {
        let store = MemoryKeySet::new();
        let clone = store.clone();
        let metadata =
            KeyMetadata::new("mem", KeyPurpose::SignAndVerify, KeyType::HmacSha1).unwrap();

        let mut writer = clone.writer();
        writer.write_metadata(&metadata).unwrap();
        writer.finish().unwrap();

        assert_eq!(store.metadata().unwrap().name(), "mem");
        assert_eq!(writer.finish(), Err(StoreError::Finished));
    }
}
