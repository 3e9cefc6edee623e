//! Error types for key sets and operation engines.
//!
//! Envelope and primitive failures arrive as `ProtocolError` and
//! `CryptoError` and are folded into [`KeyczarError`]. Engines never surface
//! which check failed on a ciphertext: tag, padding and key mismatch all
//! become `InvalidCiphertext`.

use std::io;

use keyczar_crypto::{CryptoError, KeyPurpose};
use keyczar_proto::ProtocolError;
use thiserror::Error;

use crate::{metadata::KeyStatus, store::StoreError};

/// Errors from key set handling and cryptographic operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyczarError {
    /// Ciphertext is too short, was tampered with, or no candidate key
    /// opened it
    #[error("invalid ciphertext")]
    InvalidCiphertext,

    /// Signature envelope is too short or malformed
    #[error("invalid signature data")]
    InvalidSignatureData,

    /// Envelope format byte is not the supported version
    #[error("unsupported format version: {0}")]
    UnsupportedFormatVersion(u8),

    /// Operation needs a primary key and the key set has none
    #[error("key set has no primary key")]
    MissingPrimaryKey,

    /// Engine constructed against a key set whose purpose forbids it
    #[error("key set purpose {actual} does not permit {expected}")]
    InvalidKeySetPurpose {
        /// Operation the engine performs
        expected: &'static str,
        /// Purpose declared by the key set
        actual: KeyPurpose,
    },

    /// Version number is not in the key set
    #[error("unknown key version: {0}")]
    UnknownVersion(u32),

    /// Lifecycle transition not permitted from the current status
    #[error("cannot {operation} version {version} with status {status}")]
    InvalidStatusTransition {
        /// Version the transition targeted
        version: u32,
        /// Status the version currently holds
        status: KeyStatus,
        /// Transition that was attempted
        operation: &'static str,
    },

    /// Session crypter used in a role its construction does not allow
    #[error("session role mismatch: {0}")]
    SessionRoleMismatch(&'static str),

    /// Key set store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Key material failure outside trial decryption
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Envelope framing failure
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    /// Caller-supplied stream failed
    #[error("I/O error: {0}")]
    Io(String),

    /// Compression stream failed
    #[error("compression error: {0}")]
    Compression(String),
}

impl KeyczarError {
    /// Returns true if retrying with the same key set and input cannot
    /// succeed.
    ///
    /// I/O failures come from caller streams and may be transient. Everything
    /// else describes the key set or the input itself.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::Store(StoreError::Io(_)))
    }

    /// Returns true for a lifecycle probe that named a missing version.
    ///
    /// Callers routinely probe versions; a miss is an answer, not a fault.
    pub fn is_probe_failure(&self) -> bool {
        matches!(self, Self::UnknownVersion(_))
    }
}

impl From<ProtocolError> for KeyczarError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::UnsupportedVersion(version) => Self::UnsupportedFormatVersion(version),
            other => Self::Protocol(other),
        }
    }
}

/// Unwraps errors that crossed an `io::Write` adapter as `KeyczarError`.
impl From<io::Error> for KeyczarError {
    fn from(err: io::Error) -> Self {
        match err.get_ref().and_then(|inner| inner.downcast_ref::<Self>()) {
            Some(inner) => inner.clone(),
            None => Self::Io(err.to_string()),
        }
    }
}

/// Convert `KeyczarError` to `io::Error` at `Read`/`Write` adapter
/// boundaries.
impl From<KeyczarError> for io::Error {
    fn from(err: KeyczarError) -> Self {
        let kind = match &err {
            KeyczarError::Io(_) => io::ErrorKind::Other,
            _ => io::ErrorKind::InvalidData,
        };
        Self::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(KeyczarError::InvalidCiphertext.to_string(), "invalid ciphertext");

        let err = KeyczarError::InvalidKeySetPurpose {
            expected: "sign",
            actual: KeyPurpose::Verify,
        };
        assert_eq!(err.to_string(), "key set purpose VERIFY does not permit sign");

        let err = KeyczarError::InvalidStatusTransition {
            version: 3,
            status: KeyStatus::Primary,
            operation: "revoke",
        };
        assert_eq!(err.to_string(), "cannot revoke version 3 with status PRIMARY");
    }

    #[test]
    fn version_mismatch_maps_to_format_error() {
        let err: KeyczarError = ProtocolError::UnsupportedVersion(9).into();
        assert_eq!(err, KeyczarError::UnsupportedFormatVersion(9));

        let err: KeyczarError = ProtocolError::TooManySegments(4).into();
        assert!(matches!(err, KeyczarError::Protocol(_)));
    }

    #[test]
    fn fatal_classification() {
        assert!(KeyczarError::MissingPrimaryKey.is_fatal());
        assert!(KeyczarError::UnsupportedFormatVersion(1).is_fatal());
        assert!(!KeyczarError::Io("broken pipe".into()).is_fatal());
        assert!(!KeyczarError::Store(StoreError::Io("disk full".into())).is_fatal());
    }

    #[test]
    fn probe_classification() {
        assert!(KeyczarError::UnknownVersion(7).is_probe_failure());
        assert!(!KeyczarError::MissingPrimaryKey.is_probe_failure());
    }

    #[test]
    fn round_trips_through_io_error() {
        let io_err: io::Error = KeyczarError::InvalidCiphertext.into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(io_err.to_string(), "invalid ciphertext");

        let back: KeyczarError = io_err.into();
        assert_eq!(back, KeyczarError::InvalidCiphertext);

        let plain: KeyczarError = io::Error::other("disk on fire").into();
        assert_eq!(plain, KeyczarError::Io("disk on fire".into()));
    }
}
