//! Protocol-level framing errors.
//!
//! These are structural failures: the bytes cannot be an envelope at all.
//! They are distinct from "well-formed but unverifiable", which the engines
//! report as a failed verification or `InvalidCiphertext`.

use thiserror::Error;

/// Result alias for framing operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while parsing or building envelope bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Input is shorter than the fixed part of the envelope.
    #[error("envelope too short: expected at least {expected} bytes, got {actual}")]
    EnvelopeTooShort {
        /// Minimum number of bytes required
        expected: usize,
        /// Number of bytes available
        actual: usize,
    },

    /// Format byte does not match [`crate::FORMAT_VERSION`].
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u8),

    /// An embedded length field claims more bytes than are present.
    #[error("message truncated: length field claims {expected} bytes, {actual} available")]
    MessageTruncated {
        /// Length claimed by the length field
        expected: usize,
        /// Bytes actually available
        actual: usize,
    },

    /// A packed array count is larger than the input could possibly hold.
    #[error("too many packed segments: {0}")]
    TooManySegments(u32),

    /// A payload is too large to be described by a 4-byte length field.
    #[error("segment too large: {0} bytes")]
    SegmentTooLarge(usize),
}

impl ProtocolError {
    /// Returns true if the failure came from the format byte rather than the
    /// shape of the input.
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, Self::UnsupportedVersion(_))
    }
}
