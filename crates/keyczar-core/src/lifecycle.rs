//! Key rotation.
//!
//! [`MutableKeySet`] owns metadata and material and applies status
//! transitions; [`KeySet`] is the frozen form engines use.
//!
//! ```text
//!            add(Primary)                    add(Active)
//!                 |                               |
//!                 v        demote                 v       demote
//!             Primary  ----------------------> Active  -----------> Inactive
//!                 ^        promote                |  <-----------      |
//!                 +-------------------------------+     promote        | revoke
//!                                                                      v
//!                                                                   removed
//! ```
//!
//! # Invariants
//!
//! - At most one version is `Primary`; promoting or adding a primary demotes
//!   the previous one to `Active`
//! - Only `Inactive` versions can be revoked
//! - Version numbers are never reused: a new version is numbered one past
//!   the highest version this key set has held, including revoked ones

use std::collections::BTreeMap;

use keyczar_crypto::{CryptoError, KeyMaterial, KeyPurpose, KeyType};
use zeroize::Zeroizing;

use crate::{
    error::KeyczarError,
    keyset::KeySet,
    metadata::{KeyMetadata, KeyStatus, KeyVersion},
    store::{KeySetReader, KeySetWriter},
};

/// Key set under modification.
pub struct MutableKeySet {
    metadata: KeyMetadata,
    keys: BTreeMap<u32, KeyMaterial>,
    /// Highest version number handed out, revoked versions included
    high_water: u32,
}

impl MutableKeySet {
    /// Empty key set.
    ///
    /// # Errors
    ///
    /// `InvalidKeySetPurpose` if `key_type` cannot serve `purpose`.
    pub fn create(
        name: impl Into<String>,
        purpose: KeyPurpose,
        key_type: KeyType,
    ) -> Result<Self, KeyczarError> {
        let metadata = KeyMetadata::new(name, purpose, key_type)?;
        Ok(Self { metadata, keys: BTreeMap::new(), high_water: 0 })
    }

    /// Load a key set for modification.
    pub fn read(reader: &impl KeySetReader) -> Result<Self, KeyczarError> {
        Ok(KeySet::read(reader)?.into())
    }

    /// Current metadata.
    pub fn metadata(&self) -> &KeyMetadata {
        &self.metadata
    }

    /// Status of `version`.
    ///
    /// # Errors
    ///
    /// `UnknownVersion` if the version is not in the set.
    pub fn status(&self, version: u32) -> Result<KeyStatus, KeyczarError> {
        self.metadata
            .version(version)
            .map(|v| v.status)
            .ok_or(KeyczarError::UnknownVersion(version))
    }

    /// Generate a new version with `status`.
    ///
    /// `size_bits` of `None` picks the key type's default size. Returns the
    /// new version number.
    ///
    /// # Errors
    ///
    /// - `InvalidStatusTransition` for `Inactive`
    /// - `Crypto` if the key type cannot be generated (public-only types) or
    ///   the size is not supported
    pub fn add_key(
        &mut self,
        status: KeyStatus,
        size_bits: Option<u32>,
    ) -> Result<u32, KeyczarError> {
        let key = KeyMaterial::generate(self.metadata.key_type(), size_bits)?;
        self.import_key(status, key)
    }

    /// Add existing material as a new version with `status`.
    ///
    /// # Errors
    ///
    /// - `InvalidStatusTransition` for `Inactive`
    /// - `Crypto(UnsupportedOperation)` if the material is not of the key
    ///   set's type
    pub fn import_key(&mut self, status: KeyStatus, key: KeyMaterial) -> Result<u32, KeyczarError> {
        let version = self.high_water.max(self.metadata.max_version()) + 1;
        if status == KeyStatus::Inactive {
            return Err(KeyczarError::InvalidStatusTransition { version, status, operation: "add" });
        }
        if key.key_type() != self.metadata.key_type() {
            return Err(CryptoError::UnsupportedOperation("import key of a different type").into());
        }

        if status == KeyStatus::Primary {
            self.demote_current_primary();
        }
        self.metadata.push_version(KeyVersion::new(version, status));
        self.keys.insert(version, key);
        self.high_water = version;
        tracing::debug!(name = self.metadata.name(), version, %status, "added key version");
        Ok(version)
    }

    /// Raise `version` one step: `Inactive` to `Active`, `Active` to
    /// `Primary`. Returns the new status.
    ///
    /// # Errors
    ///
    /// - `UnknownVersion` if the version is not in the set
    /// - `InvalidStatusTransition` if the version is already `Primary`
    pub fn promote(&mut self, version: u32) -> Result<KeyStatus, KeyczarError> {
        let next = match self.status(version)? {
            KeyStatus::Primary => {
                return Err(KeyczarError::InvalidStatusTransition {
                    version,
                    status: KeyStatus::Primary,
                    operation: "promote",
                });
            },
            KeyStatus::Active => {
                self.demote_current_primary();
                KeyStatus::Primary
            },
            KeyStatus::Inactive => KeyStatus::Active,
        };
        self.set_status(version, next, "promoted");
        Ok(next)
    }

    /// Lower `version` one step: `Primary` to `Active`, `Active` to
    /// `Inactive`. Returns the new status.
    ///
    /// # Errors
    ///
    /// - `UnknownVersion` if the version is not in the set
    /// - `InvalidStatusTransition` if the version is already `Inactive`
    pub fn demote(&mut self, version: u32) -> Result<KeyStatus, KeyczarError> {
        let next = match self.status(version)? {
            KeyStatus::Primary => KeyStatus::Active,
            KeyStatus::Active => KeyStatus::Inactive,
            KeyStatus::Inactive => {
                return Err(KeyczarError::InvalidStatusTransition {
                    version,
                    status: KeyStatus::Inactive,
                    operation: "demote",
                });
            },
        };
        self.set_status(version, next, "demoted");
        Ok(next)
    }

    /// Remove an `Inactive` version and drop its material.
    ///
    /// # Errors
    ///
    /// - `UnknownVersion` if the version is not in the set
    /// - `InvalidStatusTransition` unless the version is `Inactive`
    pub fn revoke(&mut self, version: u32) -> Result<(), KeyczarError> {
        let status = self.status(version)?;
        if status != KeyStatus::Inactive {
            return Err(KeyczarError::InvalidStatusTransition {
                version,
                status,
                operation: "revoke",
            });
        }
        self.metadata.remove_version(version);
        self.keys.remove(&version);
        tracing::debug!(name = self.metadata.name(), version, "revoked key version");
        Ok(())
    }

    /// Stage metadata and every key blob in `writer`, then commit.
    pub fn save(&self, writer: &mut impl KeySetWriter) -> Result<(), KeyczarError> {
        writer.write_metadata(&self.metadata)?;
        for (&version, key) in &self.keys {
            let data = Zeroizing::new(key.to_json()?);
            writer.write_key_data(version, &data)?;
        }
        writer.finish()?;
        tracing::debug!(
            name = self.metadata.name(),
            versions = self.keys.len(),
            "saved key set"
        );
        Ok(())
    }

    /// Freeze into a [`KeySet`] for use by engines.
    pub fn into_keyset(self) -> Result<KeySet, KeyczarError> {
        KeySet::new(self.metadata, self.keys)
    }

    /// Public halves of every version, with the same version numbers and
    /// statuses.
    ///
    /// # Errors
    ///
    /// `Crypto(UnsupportedOperation)` for symmetric or already-public key
    /// sets.
    pub fn export_public_keys(&self) -> Result<MutableKeySet, KeyczarError> {
        let metadata = self
            .metadata
            .public_counterpart()
            .ok_or(CryptoError::UnsupportedOperation("export public keys"))?;
        let keys = self
            .keys
            .iter()
            .map(|(&version, key)| {
                key.public_key()
                    .map(|public| (version, public))
                    .ok_or(CryptoError::UnsupportedOperation("export public keys"))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(Self { metadata, keys, high_water: self.high_water })
    }

    fn demote_current_primary(&mut self) {
        if let Some(primary) = self.metadata.primary_version() {
            self.set_status(primary, KeyStatus::Active, "demoted");
        }
    }

    fn set_status(&mut self, version: u32, status: KeyStatus, action: &'static str) {
        if let Some(entry) = self.metadata.version_mut(version) {
            entry.status = status;
            tracing::debug!(
                name = self.metadata.name(),
                version,
                %status,
                action,
                "key status changed"
            );
        }
    }
}

impl From<KeySet> for MutableKeySet {
    fn from(keyset: KeySet) -> Self {
        let (metadata, keys) = keyset.into_parts();
        let high_water = metadata.max_version();
        Self { metadata, keys, high_water }
    }
}

impl TryFrom<MutableKeySet> for KeySet {
    type Error = KeyczarError;

    fn try_from(keyset: MutableKeySet) -> Result<Self, Self::Error> {
        keyset.into_keyset()
    }
}

impl std::fmt::Debug for MutableKeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutableKeySet")
            .field("metadata", &self.metadata)
            .field("versions", &self.keys.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
