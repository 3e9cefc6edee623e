//! Key material.
//!
//! [`KeyMaterial`] is a closed sum over every supported algorithm. Callers
//! ask for a capability (`as_encryptable`, `as_signable`, ...) rather than
//! matching on the variant; a key without the capability answers `None`.
//!
//! Secret bytes are zeroed when a key is dropped. RSA and DSA secrets are
//! zeroed by their own crates.

mod aes_cbc;
mod dsa_key;
mod gcm;
mod hmac_sha1;
mod rsa_key;

use keyczar_proto::KeyHash;

pub use self::{
    aes_cbc::{AES_BLOCK_SIZE, AesKey},
    dsa_key::{DsaPrivateKey, DsaPublicKey},
    gcm::{AesGcmKey, GCM_NONCE_SIZE, GCM_TAG_SIZE},
    hmac_sha1::{HMAC_TAG_SIZE, HmacKey},
    rsa_key::{RsaPadding, RsaPrivateKey, RsaPublicKey, RsaSignScheme},
};
use crate::{
    error::CryptoError,
    key_type::{KeyKind, KeyType},
    stream::{CipherStream, SigningStream, VerifyingStream},
};

/// Options that change how strictly signatures are checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyPolicy {
    /// Reject DSA signatures whose integers are not canonically encoded
    pub strict_dsa: bool,
}

/// Keys that produce ciphertext.
pub trait Encryptable {
    /// Start an encryption. `associated_data` is authenticated by AEAD keys
    /// and ignored by others.
    fn encrypting_stream(&self, associated_data: &[u8])
    -> Result<Box<dyn CipherStream>, CryptoError>;

    /// Separate authenticator over `header || ciphertext`, for keys whose
    /// cipher does not authenticate by itself.
    fn auth_signing_stream(&self) -> Result<Option<Box<dyn SigningStream>>, CryptoError>;
}

/// Keys that open ciphertext.
pub trait Decryptable {
    /// Start a decryption. `associated_data` must match what was given to
    /// the encrypting stream.
    fn decrypting_stream(&self, associated_data: &[u8])
    -> Result<Box<dyn CipherStream>, CryptoError>;

    /// Verifier for the separate authenticator, if any.
    fn auth_verifying_stream(&self) -> Result<Option<Box<dyn VerifyingStream>>, CryptoError>;

    /// Length of the authenticator trailer following the ciphertext.
    fn trailer_size(&self) -> usize;
}

/// Keys that produce signatures.
pub trait Signable {
    /// Start a signature.
    fn signing_stream(&self) -> Result<Box<dyn SigningStream>, CryptoError>;
}

/// Keys that check signatures.
pub trait Verifiable {
    /// Start a verification.
    fn verifying_stream(&self, policy: VerifyPolicy)
    -> Result<Box<dyn VerifyingStream>, CryptoError>;
}

/// Algorithm-specific key.
pub enum KeyMaterial {
    /// AES-CBC with HMAC-SHA1
    Aes(AesKey),
    /// AES-GCM
    AesGcm(AesGcmKey),
    /// HMAC-SHA1
    Hmac(HmacKey),
    /// RSA private key
    RsaPrivate(RsaPrivateKey),
    /// RSA public key
    RsaPublic(RsaPublicKey),
    /// DSA private key
    DsaPrivate(DsaPrivateKey),
    /// DSA public key
    DsaPublic(DsaPublicKey),
}

impl KeyMaterial {
    /// Generate fresh key material.
    ///
    /// `size_bits` of `None` picks the registry default.
    ///
    /// # Errors
    ///
    /// - `UnsupportedOperation` for public-only key types
    /// - `UnsupportedKeySize` for sizes outside the registry
    pub fn generate(key_type: KeyType, size_bits: Option<u32>) -> Result<Self, CryptoError> {
        if key_type.kind() == KeyKind::Public {
            return Err(CryptoError::UnsupportedOperation("generate a public key on its own"));
        }
        let size = key_type.resolve_size(size_bits)?;
        tracing::debug!(key_type = %key_type, size, "generating key");

        Ok(match key_type {
            KeyType::Aes => Self::Aes(AesKey::generate(size)?),
            KeyType::AesGcm => Self::AesGcm(AesGcmKey::generate(size)?),
            KeyType::HmacSha1 => Self::Hmac(HmacKey::generate(size)?),
            KeyType::RsaPriv => {
                Self::RsaPrivate(RsaPrivateKey::generate(RsaSignScheme::Pkcs1Sha1, size)?)
            },
            KeyType::RsaPssPriv => {
                Self::RsaPrivate(RsaPrivateKey::generate(RsaSignScheme::PssSha256, size)?)
            },
            KeyType::DsaPriv => Self::DsaPrivate(DsaPrivateKey::generate(size)?),
            KeyType::RsaPub | KeyType::RsaPssPub | KeyType::DsaPub => {
                return Err(CryptoError::UnsupportedOperation("generate a public key on its own"));
            },
        })
    }

    /// Registry type of this key.
    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Aes(_) => KeyType::Aes,
            Self::AesGcm(_) => KeyType::AesGcm,
            Self::Hmac(_) => KeyType::HmacSha1,
            Self::RsaPrivate(k) => k.key_type(),
            Self::RsaPublic(k) => k.key_type(),
            Self::DsaPrivate(_) => KeyType::DsaPriv,
            Self::DsaPublic(_) => KeyType::DsaPub,
        }
    }

    /// Key size in bits.
    pub fn size(&self) -> u32 {
        match self {
            Self::Aes(k) => k.size(),
            Self::AesGcm(k) => k.size(),
            Self::Hmac(k) => k.size(),
            Self::RsaPrivate(k) => k.size(),
            Self::RsaPublic(k) => k.size(),
            Self::DsaPrivate(k) => k.size(),
            Self::DsaPublic(k) => k.size(),
        }
    }

    /// Primary key hash. Private keys share their public half's hash.
    pub fn key_hash(&self) -> KeyHash {
        match self {
            Self::Aes(k) => k.key_hash(),
            Self::AesGcm(k) => k.key_hash(),
            Self::Hmac(k) => k.key_hash(),
            Self::RsaPrivate(k) => k.public_key().key_hash(),
            Self::RsaPublic(k) => k.key_hash(),
            Self::DsaPrivate(k) => k.public_key().key_hash(),
            Self::DsaPublic(k) => k.key_hash(),
        }
    }

    /// Legacy hashes this key also answers to, in priority order.
    pub fn fallback_key_hashes(&self) -> &[KeyHash] {
        match self {
            Self::Aes(k) => k.fallback_key_hashes(),
            Self::AesGcm(_) | Self::Hmac(_) => &[],
            Self::RsaPrivate(k) => k.public_key().fallback_key_hashes(),
            Self::RsaPublic(k) => k.fallback_key_hashes(),
            Self::DsaPrivate(k) => k.public_key().fallback_key_hashes(),
            Self::DsaPublic(k) => k.fallback_key_hashes(),
        }
    }

    /// Public half of a private key.
    pub fn public_key(&self) -> Option<Self> {
        match self {
            Self::RsaPrivate(k) => Some(Self::RsaPublic(k.public_key().clone())),
            Self::DsaPrivate(k) => Some(Self::DsaPublic(k.public_key().clone())),
            Self::Aes(_)
            | Self::AesGcm(_)
            | Self::Hmac(_)
            | Self::RsaPublic(_)
            | Self::DsaPublic(_) => None,
        }
    }

    /// Encryption capability.
    pub fn as_encryptable(&self) -> Option<&dyn Encryptable> {
        match self {
            Self::Aes(k) => Some(k),
            Self::AesGcm(k) => Some(k),
            Self::RsaPrivate(k) if k.public_key().scheme() == RsaSignScheme::Pkcs1Sha1 => {
                Some(k.public_key())
            },
            Self::RsaPublic(k) if k.scheme() == RsaSignScheme::Pkcs1Sha1 => Some(k),
            _ => None,
        }
    }

    /// Decryption capability.
    pub fn as_decryptable(&self) -> Option<&dyn Decryptable> {
        match self {
            Self::Aes(k) => Some(k),
            Self::AesGcm(k) => Some(k),
            Self::RsaPrivate(k) if k.public_key().scheme() == RsaSignScheme::Pkcs1Sha1 => Some(k),
            _ => None,
        }
    }

    /// Signing capability.
    pub fn as_signable(&self) -> Option<&dyn Signable> {
        match self {
            Self::Hmac(k) => Some(k),
            Self::RsaPrivate(k) => Some(k),
            Self::DsaPrivate(k) => Some(k),
            _ => None,
        }
    }

    /// Verification capability.
    pub fn as_verifiable(&self) -> Option<&dyn Verifiable> {
        match self {
            Self::Hmac(k) => Some(k),
            Self::RsaPrivate(k) => Some(k.public_key()),
            Self::RsaPublic(k) => Some(k),
            Self::DsaPrivate(k) => Some(k.public_key()),
            Self::DsaPublic(k) => Some(k),
            _ => None,
        }
    }

    /// Serialize to the persisted JSON form.
    pub fn to_json(&self) -> Result<String, CryptoError> {
        let json = match self {
            Self::Aes(k) => serde_json::to_string(&k.to_data())?,
            Self::AesGcm(k) => serde_json::to_string(&k.to_data())?,
            Self::Hmac(k) => serde_json::to_string(&k.to_data())?,
            Self::RsaPrivate(k) => serde_json::to_string(&k.to_data()?)?,
            Self::RsaPublic(k) => serde_json::to_string(&k.to_data())?,
            Self::DsaPrivate(k) => serde_json::to_string(&k.to_data())?,
            Self::DsaPublic(k) => serde_json::to_string(&k.to_data())?,
        };
        Ok(json)
    }

    /// Parse the persisted JSON form of a key of `key_type`.
    pub fn from_json(key_type: KeyType, json: &str) -> Result<Self, CryptoError> {
        Ok(match key_type {
            KeyType::Aes => Self::Aes(AesKey::from_data(&serde_json::from_str(json)?)?),
            KeyType::AesGcm => Self::AesGcm(AesGcmKey::from_data(&serde_json::from_str(json)?)?),
            KeyType::HmacSha1 => Self::Hmac(HmacKey::from_data(&serde_json::from_str(json)?)?),
            KeyType::RsaPriv => Self::RsaPrivate(RsaPrivateKey::from_data(
                &serde_json::from_str(json)?,
                RsaSignScheme::Pkcs1Sha1,
            )?),
            KeyType::RsaPssPriv => Self::RsaPrivate(RsaPrivateKey::from_data(
                &serde_json::from_str(json)?,
                RsaSignScheme::PssSha256,
            )?),
            KeyType::RsaPub => Self::RsaPublic(RsaPublicKey::from_data(
                &serde_json::from_str(json)?,
                RsaSignScheme::Pkcs1Sha1,
            )?),
            KeyType::RsaPssPub => Self::RsaPublic(RsaPublicKey::from_data(
                &serde_json::from_str(json)?,
                RsaSignScheme::PssSha256,
            )?),
            KeyType::DsaPriv => {
                Self::DsaPrivate(DsaPrivateKey::from_data(&serde_json::from_str(json)?)?)
            },
            KeyType::DsaPub => {
                Self::DsaPublic(DsaPublicKey::from_data(&serde_json::from_str(json)?)?)
            },
        })
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print secrets.
        f.debug_struct("KeyMaterial")
            .field("type", &self.key_type().identifier())
            .field("size", &self.size())
            .field("hash", &self.key_hash())
            .finish_non_exhaustive()
    }
}
