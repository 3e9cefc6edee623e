//! Envelope header with zero-copy parsing.
//!
//! The header is a fixed 5-byte structure: one format byte followed by the
//! 4-byte truncated hash of the key that produced the payload.

use std::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    FORMAT_VERSION, HEADER_SIZE, KEY_HASH_SIZE,
    errors::{ProtocolError, Result},
};

/// Truncated key hash used to select candidate keys.
///
/// Two structurally different keys may share a hash. Lookups therefore map a
/// hash to a list of keys, never to a single key.
#[repr(transparent)]
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, FromBytes, IntoBytes, KnownLayout, Immutable,
)]
pub struct KeyHash([u8; KEY_HASH_SIZE]);

impl KeyHash {
    /// Reserved all-zero hash carried by imported single-key sets.
    pub const ZERO: Self = Self([0; KEY_HASH_SIZE]);

    /// Wrap raw hash bytes.
    pub const fn new(bytes: [u8; KEY_HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build from the first [`KEY_HASH_SIZE`] bytes of a digest.
    ///
    /// Returns `None` if the digest is shorter than a key hash.
    pub fn from_digest(digest: &[u8]) -> Option<Self> {
        let bytes: [u8; KEY_HASH_SIZE] = digest.get(..KEY_HASH_SIZE)?.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Raw hash bytes.
    pub const fn as_bytes(&self) -> &[u8; KEY_HASH_SIZE] {
        &self.0
    }

    /// Hash interpreted as a big-endian integer (the lookup map key).
    pub const fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// True for the reserved all-zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0; KEY_HASH_SIZE]
    }
}

impl fmt::Debug for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyHash({self})")
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; KEY_HASH_SIZE]> for KeyHash {
    fn from(bytes: [u8; KEY_HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

/// Fixed 5-byte envelope header.
///
/// All 5-byte patterns are valid memory representations, so the header can be
/// cast directly from untrusted input. The format byte is checked separately
/// in [`EnvelopeHeader::from_bytes`].
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct EnvelopeHeader {
    version: u8,
    key_hash: KeyHash,
}

impl EnvelopeHeader {
    /// Size of the serialized header.
    pub const SIZE: usize = HEADER_SIZE;

    /// Header for a payload produced by the key with the given hash.
    pub const fn new(key_hash: KeyHash) -> Self {
        Self { version: FORMAT_VERSION, key_hash }
    }

    /// Parse the header from the front of `bytes` without copying.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::EnvelopeTooShort` if fewer than 5 bytes are present
    /// - `ProtocolError::UnsupportedVersion` if the format byte is unknown
    ///
    /// Size is checked before the format byte so that truncated garbage is
    /// always reported as a structural failure.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let (header, _) = Self::ref_from_prefix(bytes).map_err(|_| {
            ProtocolError::EnvelopeTooShort { expected: Self::SIZE, actual: bytes.len() }
        })?;

        if header.version != FORMAT_VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        Ok(header)
    }

    /// Split `bytes` into a validated header and the remaining payload.
    pub fn split(bytes: &[u8]) -> Result<(&Self, &[u8])> {
        let header = Self::from_bytes(bytes)?;
        Ok((header, bytes.get(Self::SIZE..).unwrap_or_default()))
    }

    /// Serialize the header.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(IntoBytes::as_bytes(self));
        out
    }

    /// Format byte.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Hash of the key that produced the payload.
    pub fn key_hash(&self) -> KeyHash {
        self.key_hash
    }
}

impl fmt::Debug for EnvelopeHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeHeader")
            .field("version", &self.version)
            .field("key_hash", &self.key_hash)
            .finish()
    }
}
