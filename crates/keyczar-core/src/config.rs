//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Default chunk size for streaming reads.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Default upper bound on session material accepted by a responder.
pub const DEFAULT_MAX_SESSION_MATERIAL_LEN: usize = 64 * 1024;

/// Compression applied to plaintext before encryption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompressionMode {
    /// Plaintext is encrypted as-is
    #[default]
    None,
    /// gzip (RFC 1952)
    Gzip,
    /// zlib (RFC 1950)
    Zlib,
}

/// Settings shared by every engine.
///
/// Both sides of an exchange must agree on `compression`; it is not recorded
/// in the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyczarConfig {
    /// Plaintext compression
    pub compression: CompressionMode,

    /// Reject DSA signatures with non-canonical integer encodings
    pub strict_dsa_verification: bool,

    /// Chunk size for streaming reads
    pub buffer_size: usize,

    /// Largest session material a responder will process
    pub max_session_material_len: usize,
}

impl Default for KeyczarConfig {
    fn default() -> Self {
        Self {
            compression: CompressionMode::None,
            strict_dsa_verification: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_session_material_len: DEFAULT_MAX_SESSION_MATERIAL_LEN,
        }
    }
}

impl KeyczarConfig {
    /// Config with the given compression and defaults elsewhere.
    pub fn with_compression(compression: CompressionMode) -> Self {
        Self { compression, ..Self::default() }
    }

    /// Chunk size, never zero.
    pub(crate) fn chunk_size(&self) -> usize {
        self.buffer_size.max(1)
    }
}
