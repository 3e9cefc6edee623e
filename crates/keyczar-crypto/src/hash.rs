//! Key hash computation.
//!
//! A key hash is SHA-1 over the key's public components, each prefixed with
//! its 4-byte big-endian length, truncated to [`KEY_HASH_SIZE`] bytes.
//!
//! Fallback hashes reproduce encodings used by older implementations. They
//! are a compatibility contract: the exact byte layouts here must not drift.

use keyczar_proto::{KEY_HASH_SIZE, KeyHash};
use sha1::{Digest, Sha1};

/// Incremental builder for key hashes.
#[derive(Clone, Default)]
pub struct KeyHasher {
    digest: Sha1,
}

impl KeyHasher {
    /// Empty hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `be32(len(component)) || component`.
    #[must_use]
    pub fn prefixed(mut self, component: &[u8]) -> Self {
        // Key components are at most a few KiB.
        let len = u32::try_from(component.len()).unwrap_or(u32::MAX);
        self.digest.update(len.to_be_bytes());
        self.digest.update(component);
        self
    }

    /// Append raw bytes without a length prefix.
    #[must_use]
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.digest.update(bytes);
        self
    }

    /// Finish and truncate.
    pub fn finish(self) -> KeyHash {
        let full = self.digest.finalize();
        let mut hash = [0u8; KEY_HASH_SIZE];
        hash.copy_from_slice(&full[..KEY_HASH_SIZE]);
        KeyHash::new(hash)
    }
}

/// Drop leading zero bytes from a big-endian integer encoding.
///
/// Zero itself encodes as a single zero byte.
pub fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b != 0) {
        Some(start) => &bytes[start..],
        None if bytes.is_empty() => bytes,
        None => &bytes[bytes.len() - 1..],
    }
}

/// Two's-complement encoding of a non-negative big-endian integer: a leading
/// zero byte is added when the high bit is set.
pub fn sign_padded(bytes: &[u8]) -> Vec<u8> {
    let stripped = strip_leading_zeros(bytes);
    let mut out = Vec::with_capacity(stripped.len() + 1);
    if stripped.first().is_some_and(|b| b & 0x80 != 0) {
        out.push(0);
    }
    out.extend_from_slice(stripped);
    out
}

/// Hash over length-prefixed integer components, stripped of leading zeros.
pub fn stripped_components_hash(components: &[&[u8]]) -> KeyHash {
    components
        .iter()
        .fold(KeyHasher::new(), |hasher, c| hasher.prefixed(strip_leading_zeros(c)))
        .finish()
}

/// Hash over length-prefixed integer components in sign-padded form.
pub fn padded_components_hash(components: &[&[u8]]) -> KeyHash {
    components.iter().fold(KeyHasher::new(), |hasher, c| hasher.prefixed(&sign_padded(c))).finish()
}

/// Keep only fallbacks that differ from the primary hash, without repeats.
pub(crate) fn distinct_fallbacks(primary: KeyHash, candidates: &[KeyHash]) -> Vec<KeyHash> {
    let mut out: Vec<KeyHash> = Vec::with_capacity(candidates.len());
    for &candidate in candidates {
        if candidate != primary && !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    out
}
