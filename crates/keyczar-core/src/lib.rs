//! Keyczar key sets and operations.
//!
//! A key set is a named, versioned collection of keys of one type with one
//! purpose. Exactly zero or one version is primary: it produces every new
//! ciphertext and signature, while older versions keep decrypting and
//! verifying until they are revoked.
//!
//! ```text
//!   KeySetReader ──> KeySet ──> Encrypter / Crypter
//!        ^             |        Signer / Verifier
//!        |             |        AttachedSigner / AttachedVerifier
//!   KeySetWriter <── MutableKeySet  TimeoutSigner / TimeoutVerifier
//!                               UnversionedSigner / UnversionedVerifier
//!                               SessionCrypter
//! ```
//!
//! # Components
//!
//! - [`KeySet`]: frozen key set with hash lookup, shared by engines
//! - [`MutableKeySet`]: add, promote, demote and revoke versions, then save
//! - [`store`]: directory, in-memory and encrypted key set locations
//! - [`engine`]: encrypt, decrypt, sign and verify over slices or streams
//! - [`session`]: hybrid sessions keyed through a public key set
//!
//! # Candidate Keys
//!
//! Decrypt and verify never trust the header hash to name exactly one key.
//! Every key that answers to the hash is tried, newest first; a key that
//! does not fit is skipped, and only structurally broken input is an error.
//! A wrong signature is `Ok(false)`, never `Err`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod compression;
pub mod config;
pub mod engine;
pub mod env;
pub mod error;
pub mod keyset;
pub mod lifecycle;
pub mod metadata;
pub mod session;
pub mod store;

pub use config::{CompressionMode, KeyczarConfig};
pub use engine::{
    AttachedSigner, AttachedVerifier, Crypter, Encrypter, Signer, TimeoutSigner, TimeoutVerifier,
    UnversionedSigner, UnversionedVerifier, Verifier,
};
pub use env::{Environment, SystemEnv};
pub use error::KeyczarError;
pub use keyset::KeySet;
pub use lifecycle::MutableKeySet;
pub use metadata::{KeyMetadata, KeyStatus, KeyVersion};
pub use session::SessionCrypter;
pub use store::{KeySetReader, KeySetWriter, StoreError};
