//! Signature payload layouts.
//!
//! Three layouts share the envelope header:
//!
//! ```text
//! plain:    header || signature
//! attached: header || be32(message length) || message || signature
//! timeout:  header || be64(expiration millis) || signature
//! ```
//!
//! Parsing borrows from the input; nothing is copied. Signature bytes are
//! whatever remains after the fixed fields, and may be empty (an empty
//! signature simply fails verification).

use bytes::BufMut;

use crate::{
    EnvelopeHeader, KeyHash,
    errors::{ProtocolError, Result},
};

const LENGTH_FIELD_SIZE: usize = 4;
const EXPIRATION_FIELD_SIZE: usize = 8;

/// Encode a length as the 4-byte big-endian field used throughout the
/// envelope format.
pub(crate) fn length_field(len: usize) -> Result<[u8; LENGTH_FIELD_SIZE]> {
    let len = u32::try_from(len).map_err(|_| ProtocolError::SegmentTooLarge(len))?;
    Ok(len.to_be_bytes())
}

/// `header || signature`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedEnvelope<'a> {
    /// Envelope header
    pub header: EnvelopeHeader,
    /// Raw signature bytes
    pub signature: &'a [u8],
}

impl<'a> SignedEnvelope<'a> {
    /// Parse a plain signature envelope.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let (header, signature) = EnvelopeHeader::split(bytes)?;
        Ok(Self { header: *header, signature })
    }

    /// Key hash from the header.
    pub fn key_hash(&self) -> KeyHash {
        self.header.key_hash()
    }

    /// Write `header || signature`.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(self.signature);
    }

    /// Encode into a new buffer.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(EnvelopeHeader::SIZE + self.signature.len());
        self.encode(&mut out);
        out
    }
}

/// `header || be32(len) || message || signature`.
///
/// The signature covers the header, the length field, the message, the
/// length-prefixed hidden data (never stored) and the format byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachedEnvelope<'a> {
    /// Envelope header
    pub header: EnvelopeHeader,
    /// Embedded message
    pub message: &'a [u8],
    /// Raw signature bytes
    pub signature: &'a [u8],
}

impl<'a> AttachedEnvelope<'a> {
    /// Minimum number of bytes in an attached envelope.
    pub const MIN_SIZE: usize = EnvelopeHeader::SIZE + LENGTH_FIELD_SIZE;

    /// Parse an attached signature envelope.
    ///
    /// # Errors
    ///
    /// - `EnvelopeTooShort` if the header or length field is missing
    /// - `UnsupportedVersion` if the format byte is unknown
    /// - `MessageTruncated` if the length field claims more bytes than remain
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < Self::MIN_SIZE {
            // Still surface a bad format byte before the size complaint when
            // the header itself is present.
            EnvelopeHeader::from_bytes(bytes)?;
            return Err(ProtocolError::EnvelopeTooShort {
                expected: Self::MIN_SIZE,
                actual: bytes.len(),
            });
        }

        let (header, rest) = EnvelopeHeader::split(bytes)?;
        let (len_bytes, rest) = rest.split_at(LENGTH_FIELD_SIZE);
        let mut len = [0u8; LENGTH_FIELD_SIZE];
        len.copy_from_slice(len_bytes);
        let message_len = u32::from_be_bytes(len) as usize;

        if message_len > rest.len() {
            return Err(ProtocolError::MessageTruncated {
                expected: message_len,
                actual: rest.len(),
            });
        }

        let (message, signature) = rest.split_at(message_len);
        Ok(Self { header: *header, message, signature })
    }

    /// Key hash from the header.
    pub fn key_hash(&self) -> KeyHash {
        self.header.key_hash()
    }

    /// Bytes hashed before the message: `header || be32(len)`.
    pub fn signed_prefix(header: &EnvelopeHeader, message_len: usize) -> Result<Vec<u8>> {
        let mut prefix = Vec::with_capacity(Self::MIN_SIZE);
        prefix.extend_from_slice(&header.to_bytes());
        prefix.extend_from_slice(&length_field(message_len)?);
        Ok(prefix)
    }

    /// Bytes hashed after the message: `be32(len(hidden)) || hidden`.
    pub fn hidden_suffix(hidden: &[u8]) -> Result<Vec<u8>> {
        let mut suffix = Vec::with_capacity(LENGTH_FIELD_SIZE + hidden.len());
        suffix.extend_from_slice(&length_field(hidden.len())?);
        suffix.extend_from_slice(hidden);
        Ok(suffix)
    }

    /// Write the envelope.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let len = length_field(self.message.len())?;
        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&len);
        dst.put_slice(self.message);
        dst.put_slice(self.signature);
        Ok(())
    }

    /// Encode into a new buffer.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut out =
            Vec::with_capacity(Self::MIN_SIZE + self.message.len() + self.signature.len());
        self.encode(&mut out)?;
        Ok(out)
    }
}

/// `header || be64(expiration millis) || signature`.
///
/// The signature covers `be64(expiration) || message || format byte`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutEnvelope<'a> {
    /// Envelope header
    pub header: EnvelopeHeader,
    /// Expiration as milliseconds since the Unix epoch
    pub expiration_millis: u64,
    /// Raw signature bytes
    pub signature: &'a [u8],
}

impl<'a> TimeoutEnvelope<'a> {
    /// Minimum number of bytes in a timeout envelope.
    pub const MIN_SIZE: usize = EnvelopeHeader::SIZE + EXPIRATION_FIELD_SIZE;

    /// Parse a timeout signature envelope.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < Self::MIN_SIZE {
            EnvelopeHeader::from_bytes(bytes)?;
            return Err(ProtocolError::EnvelopeTooShort {
                expected: Self::MIN_SIZE,
                actual: bytes.len(),
            });
        }

        let (header, rest) = EnvelopeHeader::split(bytes)?;
        let (expiration, signature) = rest.split_at(EXPIRATION_FIELD_SIZE);
        let mut raw = [0u8; EXPIRATION_FIELD_SIZE];
        raw.copy_from_slice(expiration);

        Ok(Self { header: *header, expiration_millis: u64::from_be_bytes(raw), signature })
    }

    /// Key hash from the header.
    pub fn key_hash(&self) -> KeyHash {
        self.header.key_hash()
    }

    /// Bytes hashed before the message: `be64(expiration)`.
    pub fn signed_prefix(expiration_millis: u64) -> [u8; EXPIRATION_FIELD_SIZE] {
        expiration_millis.to_be_bytes()
    }

    /// Write the envelope.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_slice(&self.header.to_bytes());
        dst.put_u64(self.expiration_millis);
        dst.put_slice(self.signature);
    }

    /// Encode into a new buffer.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::MIN_SIZE + self.signature.len());
        self.encode(&mut out);
        out
    }
}
