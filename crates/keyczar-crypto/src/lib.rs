//! Keyczar Key Material
//!
//! Algorithm keys and the byte-stream transformers they produce. This crate
//! knows nothing about key sets or envelopes beyond the key hash that names
//! a key in an envelope header.
//!
//! # Key Types
//!
//! ```text
//! AES          CBC + HMAC-SHA1 trailer       encrypt / decrypt
//! C#_AES_AEAD  GCM, header as AAD            encrypt / decrypt
//! HMAC_SHA1    20-byte tag                   sign / verify
//! RSA_PRIV     OAEP-SHA1, PKCS#1-SHA1 sigs   decrypt / sign  (+ public ops)
//! RSA_PUB                                    encrypt / verify
//! C#_RSA_SIGN  PSS-SHA256                    sign / verify
//! DSA_PRIV     DSA-SHA1, DER signatures      sign            (+ verify)
//! DSA_PUB                                    verify
//! ```
//!
//! # Key Hashes
//!
//! Every key has a 4-byte primary hash (SHA-1 over length-prefixed
//! components) and zero or more fallback hashes reproducing encodings of
//! older implementations. Hashes may collide; callers must tolerate several
//! keys sharing one.
//!
//! # Security
//!
//! - Symmetric key bytes are zeroed on drop
//! - MAC comparison is constant-time
//! - Decryption failures carry no detail about which check failed
//! - `Debug` output never includes secret material

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod encoding;
pub mod error;
pub mod hash;
pub mod key_type;
pub mod keys;
pub mod stream;

pub use error::CryptoError;
pub use key_type::{KeyKind, KeyPurpose, KeyType, KeyTypeSpec};
pub use keys::{
    AesGcmKey, AesKey, Decryptable, DsaPrivateKey, DsaPublicKey, Encryptable, HmacKey, KeyMaterial,
    RsaPadding, RsaPrivateKey, RsaPublicKey, RsaSignScheme, Signable, Verifiable, VerifyPolicy,
};
pub use stream::{CipherStream, SigningStream, VerifyingStream};
