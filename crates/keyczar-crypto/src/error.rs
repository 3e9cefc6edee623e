//! Error types for key material operations

use thiserror::Error;

/// Errors from key generation, parsing and primitive operations.
///
/// Primitive failures deliberately carry no detail beyond the operation name:
/// padding and tag errors must not be distinguishable by callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The key type cannot perform the requested operation
    /// (e.g. generating a public key, signing with an AES key)
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// Requested key size is not in the registry for this key type
    #[error("unsupported key size {size} for {key_type}")]
    UnsupportedKeySize {
        /// Key type identifier
        key_type: &'static str,
        /// Requested size in bits
        size: u32,
    },

    /// Key type identifier is not in the registry
    #[error("unknown key type: {0}")]
    UnknownKeyType(String),

    /// Key data could not be turned into a usable key
    #[error("invalid key data: {0}")]
    InvalidKeyData(String),

    /// The underlying primitive rejected its input
    #[error("{operation} failed")]
    Primitive {
        /// Operation that failed
        operation: &'static str,
    },

    /// Input exceeds what a single asymmetric operation can process
    #[error("input too large: {size} bytes, max {max}")]
    InputTooLarge {
        /// Input size in bytes
        size: usize,
        /// Maximum accepted size in bytes
        max: usize,
    },

    /// JSON key data could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CryptoError {
    /// Returns true if this error reflects a bad input for this particular
    /// key (wrong key, tampered data) rather than a misuse of the API.
    ///
    /// Candidate-key trials treat these as "try the next key".
    pub fn is_key_mismatch(&self) -> bool {
        match self {
            Self::Primitive { .. } | Self::InputTooLarge { .. } => true,

            Self::UnsupportedOperation(_)
            | Self::UnsupportedKeySize { .. }
            | Self::UnknownKeyType(_)
            | Self::InvalidKeyData(_)
            | Self::Serialization(_) => false,
        }
    }
}

impl From<serde_json::Error> for CryptoError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
