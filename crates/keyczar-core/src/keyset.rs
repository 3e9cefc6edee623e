//! Immutable key set with hash lookup.
//!
//! A [`KeySet`] pairs validated metadata with the key material of every
//! version and indexes that material by key hash once, at construction.
//! After that it is read-only and may be shared across threads.
//!
//! # Candidate Order
//!
//! Envelope headers carry a 4-byte key hash, and several keys may answer to
//! the same hash. [`KeySet::candidates`] returns, without duplicates:
//!
//! 1. Keys whose primary hash matches, newest version first
//! 2. Keys whose fallback hash matches, newest version first
//! 3. Keys whose primary hash is all zeros (imported single-key sets)
//!
//! When nothing matches the list holds a single `None`. Engines run their
//! trial against it anyway so a miss costs the same as a failed check.

use std::collections::{BTreeMap, HashMap};

use keyczar_crypto::KeyMaterial;
use keyczar_proto::KeyHash;

use crate::{
    error::KeyczarError,
    metadata::{KeyMetadata, KeyStatus},
    store::{KeySetReader, StoreError},
};

/// A key to try for an operation. `None` is the dummy candidate.
pub type Candidate<'a> = Option<(u32, &'a KeyMaterial)>;

/// Read-only key set.
pub struct KeySet {
    metadata: KeyMetadata,
    keys: BTreeMap<u32, KeyMaterial>,
    index: HashIndex,
}

/// Versions by key hash, each list newest first.
#[derive(Debug, Default)]
struct HashIndex {
    primary: HashMap<KeyHash, Vec<u32>>,
    fallback: HashMap<KeyHash, Vec<u32>>,
    zero: Vec<u32>,
}

impl HashIndex {
    fn build(keys: &BTreeMap<u32, KeyMaterial>) -> Self {
        let mut index = Self::default();
        // Descending so every list comes out newest first.
        for (&version, key) in keys.iter().rev() {
            let hash = key.key_hash();
            if hash.is_zero() {
                index.zero.push(version);
            }
            index.primary.entry(hash).or_default().push(version);
            for fallback in key.fallback_key_hashes() {
                index.fallback.entry(*fallback).or_default().push(version);
            }
        }
        index
    }
}

impl KeySet {
    /// Assemble a key set from metadata and the material of every version.
    ///
    /// # Errors
    ///
    /// - `Store(NotFound)` if a version in the metadata has no material
    /// - `Store(Serialization)` if material disagrees with the metadata type
    ///   or exists for a version the metadata does not list
    pub fn new(
        metadata: KeyMetadata,
        keys: BTreeMap<u32, KeyMaterial>,
    ) -> Result<Self, KeyczarError> {
        for version in metadata.versions() {
            let key = keys.get(&version.version_number).ok_or_else(|| {
                StoreError::NotFound(format!("key data for version {}", version.version_number))
            })?;
            if key.key_type() != metadata.key_type() {
                return Err(StoreError::Serialization(format!(
                    "version {} is {}, key set type is {}",
                    version.version_number,
                    key.key_type().identifier(),
                    metadata.key_type().identifier()
                ))
                .into());
            }
        }
        if let Some(extra) = keys.keys().find(|v| metadata.version(**v).is_none()) {
            return Err(StoreError::Serialization(format!(
                "key data for unlisted version {extra}"
            ))
            .into());
        }

        let index = HashIndex::build(&keys);
        tracing::debug!(
            name = metadata.name(),
            purpose = %metadata.purpose(),
            versions = keys.len(),
            "loaded key set"
        );
        Ok(Self { metadata, keys, index })
    }

    /// Load metadata and every version from a store.
    pub fn read(reader: &impl KeySetReader) -> Result<Self, KeyczarError> {
        let metadata = reader.metadata()?;
        let mut keys = BTreeMap::new();
        for version in metadata.versions() {
            let data = zeroize::Zeroizing::new(reader.key_data(version.version_number)?);
            let key = KeyMaterial::from_json(metadata.key_type(), &data)?;
            keys.insert(version.version_number, key);
        }
        Self::new(metadata, keys)
    }

    /// Key set metadata.
    pub fn metadata(&self) -> &KeyMetadata {
        &self.metadata
    }

    pub(crate) fn into_parts(self) -> (KeyMetadata, BTreeMap<u32, KeyMaterial>) {
        (self.metadata, self.keys)
    }

    /// Material for `version`.
    ///
    /// # Errors
    ///
    /// `UnknownVersion` if the version is not in the set.
    pub fn by_version(&self, version: u32) -> Result<&KeyMaterial, KeyczarError> {
        self.keys.get(&version).ok_or(KeyczarError::UnknownVersion(version))
    }

    /// Primary version and its material.
    ///
    /// # Errors
    ///
    /// `MissingPrimaryKey` if no version is primary.
    pub fn primary(&self) -> Result<(u32, &KeyMaterial), KeyczarError> {
        let version = self.metadata.primary_version().ok_or(KeyczarError::MissingPrimaryKey)?;
        let key = self.keys.get(&version).ok_or(KeyczarError::MissingPrimaryKey)?;
        Ok((version, key))
    }

    /// Every version with its status and material, ascending.
    pub fn keys(&self) -> impl Iterator<Item = (u32, KeyStatus, &KeyMaterial)> {
        self.keys.iter().filter_map(|(&version, key)| {
            let status = self.metadata.version(version)?.status;
            Some((version, status, key))
        })
    }

    /// Keys to try for an envelope carrying `hash`, in priority order.
    ///
    /// Never empty: a miss yields `[None]`.
    pub fn candidates(&self, hash: KeyHash) -> Vec<Candidate<'_>> {
        let primary = self.index.primary.get(&hash).map(Vec::as_slice).unwrap_or_default();
        let fallback = self.index.fallback.get(&hash).map(Vec::as_slice).unwrap_or_default();

        let mut versions: Vec<u32> =
            Vec::with_capacity(primary.len() + fallback.len() + self.index.zero.len());
        for &version in primary.iter().chain(fallback).chain(&self.index.zero) {
            if !versions.contains(&version) {
                versions.push(version);
            }
        }

        let candidates: Vec<Candidate<'_>> = versions
            .into_iter()
            .filter_map(|version| self.keys.get(&version).map(|key| Some((version, key))))
            .collect();

        if candidates.is_empty() {
            tracing::trace!(%hash, "no key matches hash");
            return vec![None];
        }
        candidates
    }
}

impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySet")
            .field("metadata", &self.metadata)
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}
