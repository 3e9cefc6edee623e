//! Key type registry.
//!
//! An immutable table mapping each supported key type to its identifier,
//! kind, permitted purposes and sizes. The table is plain `const` data; there
//! is no runtime registration.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

/// Whether a key is secret-symmetric, the private half, or the public half of
/// an asymmetric pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyKind {
    /// Shared secret key
    Symmetric,
    /// Private half of an asymmetric pair
    Private,
    /// Public half of an asymmetric pair
    Public,
}

/// What a key set may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyPurpose {
    /// Encrypt only (public encryption keys)
    Encrypt,
    /// Decrypt and encrypt
    DecryptAndEncrypt,
    /// Verify only (public signing keys)
    Verify,
    /// Sign and verify
    SignAndVerify,
}

impl KeyPurpose {
    /// Purpose can produce ciphertext.
    pub fn can_encrypt(self) -> bool {
        matches!(self, Self::Encrypt | Self::DecryptAndEncrypt)
    }

    /// Purpose can open ciphertext.
    pub fn can_decrypt(self) -> bool {
        matches!(self, Self::DecryptAndEncrypt)
    }

    /// Purpose can produce signatures.
    pub fn can_sign(self) -> bool {
        matches!(self, Self::SignAndVerify)
    }

    /// Purpose can check signatures.
    pub fn can_verify(self) -> bool {
        matches!(self, Self::Verify | Self::SignAndVerify)
    }

    /// Purpose of the public half of a key set with this purpose.
    pub fn public_counterpart(self) -> Option<Self> {
        match self {
            Self::DecryptAndEncrypt => Some(Self::Encrypt),
            Self::SignAndVerify => Some(Self::Verify),
            Self::Encrypt | Self::Verify => None,
        }
    }
}

impl fmt::Display for KeyPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Encrypt => "ENCRYPT",
            Self::DecryptAndEncrypt => "DECRYPT_AND_ENCRYPT",
            Self::Verify => "VERIFY",
            Self::SignAndVerify => "SIGN_AND_VERIFY",
        };
        f.write_str(name)
    }
}

/// Supported key algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// AES-CBC with an HMAC-SHA1 trailer
    Aes,
    /// AES-GCM
    AesGcm,
    /// HMAC-SHA1
    HmacSha1,
    /// RSA private key (OAEP/PKCS1 encryption, PKCS1-SHA1 signatures)
    RsaPriv,
    /// RSA public key
    RsaPub,
    /// RSA private key for PSS-SHA256 signatures
    RsaPssPriv,
    /// RSA public key for PSS-SHA256 signatures
    RsaPssPub,
    /// DSA private key
    DsaPriv,
    /// DSA public key
    DsaPub,
}

/// Registry entry for a key type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTypeSpec {
    /// Identifier used in persisted metadata
    pub identifier: &'static str,
    /// Symmetric, private or public
    pub kind: KeyKind,
    /// Purposes a key set of this type may declare
    pub purposes: &'static [KeyPurpose],
    /// Accepted sizes in bits
    pub sizes: &'static [u32],
    /// Size used when none is requested
    pub default_size: u32,
    /// Authenticates inside the cipher stream (no separate trailer)
    pub aead: bool,
}

const SYMMETRIC_CRYPT: &[KeyPurpose] = &[KeyPurpose::DecryptAndEncrypt];
const SYMMETRIC_SIGN: &[KeyPurpose] = &[KeyPurpose::SignAndVerify];
const RSA_PRIVATE: &[KeyPurpose] = &[KeyPurpose::DecryptAndEncrypt, KeyPurpose::SignAndVerify];
const RSA_PUBLIC: &[KeyPurpose] = &[KeyPurpose::Encrypt, KeyPurpose::Verify];
const SIGN_PRIVATE: &[KeyPurpose] = &[KeyPurpose::SignAndVerify];
const SIGN_PUBLIC: &[KeyPurpose] = &[KeyPurpose::Verify];

const AES_SIZES: &[u32] = &[128, 192, 256];
const RSA_SIZES: &[u32] = &[1024, 2048, 3072, 4096];
const RSA_PSS_SIZES: &[u32] = &[2048, 3072, 4096];

impl KeyType {
    /// Every registered key type.
    pub const ALL: [Self; 9] = [
        Self::Aes,
        Self::AesGcm,
        Self::HmacSha1,
        Self::RsaPriv,
        Self::RsaPub,
        Self::RsaPssPriv,
        Self::RsaPssPub,
        Self::DsaPriv,
        Self::DsaPub,
    ];

    /// Registry entry for this type.
    pub const fn spec(self) -> KeyTypeSpec {
        match self {
            Self::Aes => KeyTypeSpec {
                identifier: "AES",
                kind: KeyKind::Symmetric,
                purposes: SYMMETRIC_CRYPT,
                sizes: AES_SIZES,
                default_size: 128,
                aead: false,
            },
            Self::AesGcm => KeyTypeSpec {
                identifier: "C#_AES_AEAD",
                kind: KeyKind::Symmetric,
                purposes: SYMMETRIC_CRYPT,
                sizes: AES_SIZES,
                default_size: 256,
                aead: true,
            },
            Self::HmacSha1 => KeyTypeSpec {
                identifier: "HMAC_SHA1",
                kind: KeyKind::Symmetric,
                purposes: SYMMETRIC_SIGN,
                sizes: &[256],
                default_size: 256,
                aead: false,
            },
            Self::RsaPriv => KeyTypeSpec {
                identifier: "RSA_PRIV",
                kind: KeyKind::Private,
                purposes: RSA_PRIVATE,
                sizes: RSA_SIZES,
                default_size: 2048,
                aead: false,
            },
            Self::RsaPub => KeyTypeSpec {
                identifier: "RSA_PUB",
                kind: KeyKind::Public,
                purposes: RSA_PUBLIC,
                sizes: RSA_SIZES,
                default_size: 2048,
                aead: false,
            },
            Self::RsaPssPriv => KeyTypeSpec {
                identifier: "C#_RSA_SIGN_PRIV",
                kind: KeyKind::Private,
                purposes: SIGN_PRIVATE,
                sizes: RSA_PSS_SIZES,
                default_size: 2048,
                aead: false,
            },
            Self::RsaPssPub => KeyTypeSpec {
                identifier: "C#_RSA_SIGN_PUB",
                kind: KeyKind::Public,
                purposes: SIGN_PUBLIC,
                sizes: RSA_PSS_SIZES,
                default_size: 2048,
                aead: false,
            },
            Self::DsaPriv => KeyTypeSpec {
                identifier: "DSA_PRIV",
                kind: KeyKind::Private,
                purposes: SIGN_PRIVATE,
                sizes: &[1024],
                default_size: 1024,
                aead: false,
            },
            Self::DsaPub => KeyTypeSpec {
                identifier: "DSA_PUB",
                kind: KeyKind::Public,
                purposes: SIGN_PUBLIC,
                sizes: &[1024],
                default_size: 1024,
                aead: false,
            },
        }
    }

    /// Identifier used in persisted metadata.
    pub const fn identifier(self) -> &'static str {
        self.spec().identifier
    }

    /// Kind of key.
    pub const fn kind(self) -> KeyKind {
        self.spec().kind
    }

    /// Look a type up by its persisted identifier.
    pub fn from_identifier(identifier: &str) -> Result<Self, CryptoError> {
        Self::ALL
            .into_iter()
            .find(|t| t.identifier() == identifier)
            .ok_or_else(|| CryptoError::UnknownKeyType(identifier.to_string()))
    }

    /// Whether a key set of this type may declare `purpose`.
    pub fn supports_purpose(self, purpose: KeyPurpose) -> bool {
        self.spec().purposes.contains(&purpose)
    }

    /// Resolve a requested size against the registry.
    ///
    /// `None` selects the default size.
    pub fn resolve_size(self, requested: Option<u32>) -> Result<u32, CryptoError> {
        let spec = self.spec();
        match requested {
            None => Ok(spec.default_size),
            Some(size) if spec.sizes.contains(&size) => Ok(size),
            Some(size) => Err(CryptoError::UnsupportedKeySize { key_type: spec.identifier, size }),
        }
    }

    /// Type of the public half, for private types.
    pub const fn public_type(self) -> Option<Self> {
        match self {
            Self::RsaPriv => Some(Self::RsaPub),
            Self::RsaPssPriv => Some(Self::RsaPssPub),
            Self::DsaPriv => Some(Self::DsaPub),
            Self::Aes
            | Self::AesGcm
            | Self::HmacSha1
            | Self::RsaPub
            | Self::RsaPssPub
            | Self::DsaPub => None,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl Serialize for KeyType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.identifier())
    }
}

impl<'de> Deserialize<'de> for KeyType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let identifier = String::deserialize(deserializer)?;
        Self::from_identifier(&identifier).map_err(serde::de::Error::custom)
    }
}
