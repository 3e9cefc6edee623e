//! Key set metadata.
//!
//! Persisted as JSON alongside the per-version key blobs:
//!
//! ```text
//! {"name":"...","purpose":"DECRYPT_AND_ENCRYPT","type":"AES",
//!  "versions":[{"versionNumber":1,"status":"PRIMARY","exportable":false}],
//!  "encrypted":false}
//! ```

use std::fmt;

use keyczar_crypto::{KeyKind, KeyPurpose, KeyType};
use serde::{Deserialize, Serialize};

use crate::{error::KeyczarError, store::StoreError};

/// Lifecycle status of a key version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyStatus {
    /// Used for new encryptions and signatures
    Primary,
    /// Decrypts and verifies only
    Active,
    /// Still usable, scheduled for revocation
    Inactive,
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Primary => "PRIMARY",
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
        })
    }
}

/// One version entry in the metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyVersion {
    /// Positive, unique within the key set
    pub version_number: u32,
    /// Lifecycle status
    pub status: KeyStatus,
    /// Carried for interoperability; not enforced
    #[serde(default)]
    pub exportable: bool,
}

impl KeyVersion {
    /// Version entry with `exportable` unset.
    pub fn new(version_number: u32, status: KeyStatus) -> Self {
        Self { version_number, status, exportable: false }
    }
}

/// Descriptive data for a key set.
///
/// # Invariants
///
/// - At most one version has status `Primary`
/// - Version numbers are positive and unique
/// - `key_type` permits `purpose`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
    name: String,
    purpose: KeyPurpose,
    #[serde(rename = "type")]
    key_type: KeyType,
    versions: Vec<KeyVersion>,
    #[serde(default)]
    encrypted: bool,
}

impl KeyMetadata {
    /// Empty metadata for a new key set.
    ///
    /// # Errors
    ///
    /// `InvalidKeySetPurpose` if `key_type` cannot serve `purpose`.
    pub fn new(
        name: impl Into<String>,
        purpose: KeyPurpose,
        key_type: KeyType,
    ) -> Result<Self, KeyczarError> {
        if !key_type.supports_purpose(purpose) {
            return Err(KeyczarError::InvalidKeySetPurpose {
                expected: key_type.identifier(),
                actual: purpose,
            });
        }
        Ok(Self { name: name.into(), purpose, key_type, versions: Vec::new(), encrypted: false })
    }

    /// Human-readable key set name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared purpose.
    pub fn purpose(&self) -> KeyPurpose {
        self.purpose
    }

    /// Key type shared by every version.
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Symmetric, private or public.
    pub fn kind(&self) -> KeyKind {
        self.key_type.kind()
    }

    /// Versions in insertion order.
    pub fn versions(&self) -> &[KeyVersion] {
        &self.versions
    }

    /// Key blobs are stored encrypted.
    pub fn encrypted(&self) -> bool {
        self.encrypted
    }

    pub(crate) fn set_encrypted(&mut self, encrypted: bool) {
        self.encrypted = encrypted;
    }

    /// Entry for `version`.
    pub fn version(&self, version: u32) -> Option<&KeyVersion> {
        self.versions.iter().find(|v| v.version_number == version)
    }

    pub(crate) fn version_mut(&mut self, version: u32) -> Option<&mut KeyVersion> {
        self.versions.iter_mut().find(|v| v.version_number == version)
    }

    /// Version with status `Primary`, if any.
    pub fn primary_version(&self) -> Option<u32> {
        self.versions.iter().find(|v| v.status == KeyStatus::Primary).map(|v| v.version_number)
    }

    /// Largest version number in use, 0 when empty.
    pub fn max_version(&self) -> u32 {
        self.versions.iter().map(|v| v.version_number).max().unwrap_or(0)
    }

    pub(crate) fn push_version(&mut self, version: KeyVersion) {
        debug_assert!(self.version(version.version_number).is_none());
        self.versions.push(version);
    }

    pub(crate) fn remove_version(&mut self, version: u32) {
        self.versions.retain(|v| v.version_number != version);
    }

    /// Copy of this metadata describing the public half of the key set.
    ///
    /// Returns `None` for symmetric or already-public key sets.
    pub(crate) fn public_counterpart(&self) -> Option<Self> {
        Some(Self {
            name: self.name.clone(),
            purpose: self.purpose.public_counterpart()?,
            key_type: self.key_type.public_type()?,
            versions: self.versions.clone(),
            encrypted: false,
        })
    }

    /// Parse and validate persisted metadata.
    ///
    /// # Errors
    ///
    /// `Serialization` for malformed JSON or metadata breaking an invariant.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let metadata: Self = serde_json::from_str(json)?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Serialize to the persisted form.
    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(self)?)
    }

    fn validate(&self) -> Result<(), StoreError> {
        if !self.key_type.supports_purpose(self.purpose) {
            return Err(StoreError::Serialization(format!(
                "key type {} cannot serve purpose {}",
                self.key_type.identifier(),
                self.purpose
            )));
        }

        let primaries = self.versions.iter().filter(|v| v.status == KeyStatus::Primary).count();
        if primaries > 1 {
            return Err(StoreError::Serialization(format!("{primaries} primary versions")));
        }

        let mut seen = std::collections::HashSet::new();
        for version in &self.versions {
            if version.version_number == 0 {
                return Err(StoreError::Serialization("version number 0".into()));
            }
            if !seen.insert(version.version_number) {
                return Err(StoreError::Serialization(format!(
                    "duplicate version {}",
                    version.version_number
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aes_metadata() -> KeyMetadata {
        let mut metadata =
            KeyMetadata::new("Test", KeyPurpose::DecryptAndEncrypt, KeyType::Aes).unwrap();
        metadata.push_version(KeyVersion::new(1, KeyStatus::Active));
        metadata.push_version(KeyVersion::new(2, KeyStatus::Primary));
        metadata
    }

    #[test]
    fn json_shape() {
        insta::assert_snapshot!(aes_metadata().to_json().unwrap(), @r#"{"name":"Test","purpose":"DECRYPT_AND_ENCRYPT","type":"AES","versions":[{"versionNumber":1,"status":"ACTIVE","exportable":false},{"versionNumber":2,"status":"PRIMARY","exportable":false}],"encrypted":false}"#);
    }

    #[test]
    fn json_round_trip() {
        let metadata = aes_metadata();
        let parsed = KeyMetadata::from_json(&metadata.to_json().unwrap()).unwrap();
        assert_eq!(parsed, metadata);
        assert_eq!(parsed.primary_version(), Some(2));
        assert_eq!(parsed.max_version(), 2);
    }

    #[test]
    fn missing_optional_fields_default() {
        let json = r#"{"name":"x","purpose":"SIGN_AND_VERIFY","type":"HMAC_SHA1",
            "versions":[{"versionNumber":1,"status":"PRIMARY"}]}"#;
        let parsed = KeyMetadata::from_json(json).unwrap();
        assert!(!parsed.encrypted());
        assert!(!parsed.versions()[0].exportable);
    }

    #[test]
    fn rejects_two_primaries() {
        let json = r#"{"name":"x","purpose":"SIGN_AND_VERIFY","type":"HMAC_SHA1",
            "versions":[{"versionNumber":1,"status":"PRIMARY"},
                        {"versionNumber":2,"status":"PRIMARY"}]}"#;
        assert!(matches!(KeyMetadata::from_json(json), Err(StoreError::Serialization(_))));
    }

    #[test]
    fn rejects_duplicate_versions() {
        let json = r#"{"name":"x","purpose":"SIGN_AND_VERIFY","type":"HMAC_SHA1",
            "versions":[{"versionNumber":1,"status":"ACTIVE"},
                        {"versionNumber":1,"status":"INACTIVE"}]}"#;
        assert!(KeyMetadata::from_json(json).is_err());
    }

    #[test]
    fn rejects_purpose_type_mismatch() {
        assert!(KeyMetadata::new("x", KeyPurpose::SignAndVerify, KeyType::Aes).is_err());

        let json = r#"{"name":"x","purpose":"ENCRYPT","type":"HMAC_SHA1","versions":[]}"#;
        assert!(KeyMetadata::from_json(json).is_err());
    }

    #[test]
    fn public_counterpart_of_private_set() {
        let metadata =
            KeyMetadata::new("rsa", KeyPurpose::DecryptAndEncrypt, KeyType::RsaPriv).unwrap();
        let public = metadata.public_counterpart().unwrap();
        assert_eq!(public.purpose(), KeyPurpose::Encrypt);
        assert_eq!(public.key_type(), KeyType::RsaPub);
        assert_eq!(public.kind(), KeyKind::Public);

        assert!(aes_metadata().public_counterpart().is_none());
    }
}
