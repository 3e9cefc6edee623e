//! Keyczar envelope wire format.
//!
//! Every ciphertext and signature produced by this toolkit is wrapped in the
//! same fixed binary envelope so that it interoperates byte-for-byte with the
//! other Keyczar implementations:
//!
//! ```text
//! +---------+--------------+-------------------------+----------------+
//! | version | key hash (4) | payload (variable)      | trailer (opt.) |
//! +---------+--------------+-------------------------+----------------+
//!   1 byte     4 bytes
//! ```
//!
//! This crate only deals with framing. It knows nothing about keys or
//! algorithms: the header identifies a key by its truncated hash, and the
//! payload/trailer bytes are opaque.
//!
//! # Components
//!
//! - [`EnvelopeHeader`]: the 5-byte header, parsed zero-copy
//! - [`KeyHash`]: the 4-byte truncated key identifier
//! - [`SignedEnvelope`], [`AttachedEnvelope`], [`TimeoutEnvelope`]: the three
//!   signature payload layouts
//! - [`packing`]: length-prefixed byte-array packing (session material, key
//!   hash inputs)

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod errors;
mod header;
pub mod packing;
mod signed;

pub use errors::{ProtocolError, Result};
pub use header::{EnvelopeHeader, KeyHash};
pub use signed::{AttachedEnvelope, SignedEnvelope, TimeoutEnvelope};

/// Current envelope format version. Written as the first byte of every
/// envelope and appended to every signature input.
pub const FORMAT_VERSION: u8 = 0;

/// Format version as a one-byte slice, for feeding into hash streams.
pub const FORMAT_BYTES: [u8; 1] = [FORMAT_VERSION];

/// Length of a truncated key hash.
pub const KEY_HASH_SIZE: usize = 4;

/// Length of the envelope header (format byte + key hash).
pub const HEADER_SIZE: usize = 1 + KEY_HASH_SIZE;
