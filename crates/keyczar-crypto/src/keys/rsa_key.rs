//! RSA keys.
//!
//! One pair of structs serves both RSA key families:
//!
//! - `RSA_PRIV` / `RSA_PUB`: OAEP-SHA1 (or PKCS#1 v1.5) encryption and
//!   PKCS#1 v1.5 SHA-1 signatures
//! - `C#_RSA_SIGN_PRIV` / `C#_RSA_SIGN_PUB`: PSS SHA-256 signatures only
//!
//! Encryption and decryption buffer their whole input; a single RSA block
//! bounds the plaintext.

use std::sync::Arc;

use keyczar_proto::KeyHash;
use rand::rngs::OsRng;
use rsa::{
    BigUint, Oaep, Pkcs1v15Encrypt, Pkcs1v15Sign, Pss, RsaPrivateKey as RawPrivateKey,
    RsaPublicKey as RawPublicKey,
    traits::{PrivateKeyParts, PublicKeyParts},
};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use super::{Decryptable, Encryptable, Signable, Verifiable, VerifyPolicy};
use crate::{
    encoding::{integer_bytes, unsigned_bytes, websafe},
    error::CryptoError,
    hash::{distinct_fallbacks, padded_components_hash, stripped_components_hash},
    key_type::KeyType,
    stream::{CipherStream, OneShot, SigningStream, VerifyingStream},
};

/// SHA-1 output size, which sizes the OAEP overhead
const SHA1_SIZE: usize = 20;

/// Encryption padding for RSA keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RsaPadding {
    /// OAEP with SHA-1
    #[default]
    Oaep,
    /// PKCS#1 v1.5
    Pkcs,
}

/// Signature scheme an RSA key signs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaSignScheme {
    /// PKCS#1 v1.5 over SHA-1
    Pkcs1Sha1,
    /// PSS over SHA-256
    PssSha256,
}

impl RsaSignScheme {
    fn private_type(self) -> KeyType {
        match self {
            Self::Pkcs1Sha1 => KeyType::RsaPriv,
            Self::PssSha256 => KeyType::RsaPssPriv,
        }
    }

    fn public_type(self) -> KeyType {
        match self {
            Self::Pkcs1Sha1 => KeyType::RsaPub,
            Self::PssSha256 => KeyType::RsaPssPub,
        }
    }
}

/// Persisted form of an RSA public key.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RsaPublicKeyData {
    #[serde(with = "websafe")]
    modulus: Vec<u8>,
    #[serde(with = "websafe")]
    public_exponent: Vec<u8>,
    size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    padding: Option<RsaPadding>,
}

/// Persisted form of an RSA private key.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RsaPrivateKeyData {
    public_key: RsaPublicKeyData,
    #[serde(with = "websafe")]
    private_exponent: Vec<u8>,
    #[serde(with = "websafe")]
    prime_p: Vec<u8>,
    #[serde(with = "websafe")]
    prime_q: Vec<u8>,
    #[serde(with = "websafe")]
    prime_exponent_p: Vec<u8>,
    #[serde(with = "websafe")]
    prime_exponent_q: Vec<u8>,
    #[serde(with = "websafe")]
    crt_coefficient: Vec<u8>,
    size: u32,
}

impl Drop for RsaPrivateKeyData {
    fn drop(&mut self) {
        self.private_exponent.zeroize();
        self.prime_p.zeroize();
        self.prime_q.zeroize();
        self.prime_exponent_p.zeroize();
        self.prime_exponent_q.zeroize();
        self.crt_coefficient.zeroize();
    }
}

fn biguint(bytes: &[u8]) -> Result<BigUint, CryptoError> {
    Ok(BigUint::from_bytes_be(unsigned_bytes(bytes)?))
}

fn invalid(err: &rsa::Error) -> CryptoError {
    CryptoError::InvalidKeyData(err.to_string())
}

/// RSA public key.
#[derive(Clone)]
pub struct RsaPublicKey {
    inner: Arc<RawPublicKey>,
    padding: RsaPadding,
    scheme: RsaSignScheme,
    hash: KeyHash,
    fallback: Vec<KeyHash>,
}

impl RsaPublicKey {
    fn from_raw(inner: RawPublicKey, padding: RsaPadding, scheme: RsaSignScheme) -> Self {
        let n = inner.n().to_bytes_be();
        let e = inner.e().to_bytes_be();
        let hash = stripped_components_hash(&[&n, &e]);
        let fallback = distinct_fallbacks(hash, &[padded_components_hash(&[&n, &e])]);
        Self { inner: Arc::new(inner), padding, scheme, hash, fallback }
    }

    /// Key type for this key's signature scheme.
    pub fn key_type(&self) -> KeyType {
        self.scheme.public_type()
    }

    /// Modulus size in bits.
    pub fn size(&self) -> u32 {
        (self.inner.size() * 8) as u32
    }

    /// Encryption padding.
    pub fn padding(&self) -> RsaPadding {
        self.padding
    }

    /// Signature scheme.
    pub fn scheme(&self) -> RsaSignScheme {
        self.scheme
    }

    /// Primary key hash over `n` and `e` with leading zeros stripped.
    pub fn key_hash(&self) -> KeyHash {
        self.hash
    }

    /// Hash over sign-padded `n` and `e`, when it differs.
    pub fn fallback_key_hashes(&self) -> &[KeyHash] {
        &self.fallback
    }

    /// Largest plaintext a single encryption accepts.
    pub fn max_plaintext_size(&self) -> usize {
        let k = self.inner.size();
        match self.padding {
            RsaPadding::Oaep => k.saturating_sub(2 * SHA1_SIZE + 2),
            RsaPadding::Pkcs => k.saturating_sub(11),
        }
    }

    pub(crate) fn to_data(&self) -> RsaPublicKeyData {
        RsaPublicKeyData {
            modulus: integer_bytes(&self.inner.n().to_bytes_be()),
            public_exponent: integer_bytes(&self.inner.e().to_bytes_be()),
            size: self.size(),
            padding: match self.scheme {
                RsaSignScheme::Pkcs1Sha1 => Some(self.padding),
                RsaSignScheme::PssSha256 => None,
            },
        }
    }

    pub(crate) fn from_data(
        data: &RsaPublicKeyData,
        scheme: RsaSignScheme,
    ) -> Result<Self, CryptoError> {
        let n = biguint(&data.modulus)?;
        let e = biguint(&data.public_exponent)?;
        let inner = RawPublicKey::new(n, e).map_err(|e| invalid(&e))?;
        let key = Self::from_raw(inner, data.padding.unwrap_or_default(), scheme);
        check_size(data.size, key.size())?;
        Ok(key)
    }
}

fn check_size(declared: u32, actual: u32) -> Result<(), CryptoError> {
    if declared == actual {
        Ok(())
    } else {
        Err(CryptoError::InvalidKeyData(format!(
            "RSA modulus is {actual} bits, size says {declared}"
        )))
    }
}

impl Encryptable for RsaPublicKey {
    fn encrypting_stream(
        &self,
        _associated_data: &[u8],
    ) -> Result<Box<dyn CipherStream>, CryptoError> {
        if self.scheme == RsaSignScheme::PssSha256 {
            return Err(CryptoError::UnsupportedOperation("encrypt with a signing-only RSA key"));
        }

        let key = Arc::clone(&self.inner);
        let padding = self.padding;
        let stream = OneShot::new(move |plaintext: &[u8]| {
            let result = match padding {
                RsaPadding::Oaep => key.encrypt(&mut OsRng, Oaep::new::<Sha1>(), plaintext),
                RsaPadding::Pkcs => key.encrypt(&mut OsRng, Pkcs1v15Encrypt, plaintext),
            };
            result
                .map(Zeroizing::new)
                .map_err(|_| CryptoError::Primitive { operation: "encrypt" })
        });
        Ok(Box::new(stream.with_limit(self.max_plaintext_size())))
    }

    fn auth_signing_stream(&self) -> Result<Option<Box<dyn SigningStream>>, CryptoError> {
        Ok(None)
    }
}

impl Verifiable for RsaPublicKey {
    fn verifying_stream(
        &self,
        _policy: VerifyPolicy,
    ) -> Result<Box<dyn VerifyingStream>, CryptoError> {
        Ok(Box::new(RsaVerifyingStream {
            key: Arc::clone(&self.inner),
            scheme: self.scheme,
            digest: Prehash::new(self.scheme),
        }))
    }
}

/// RSA private key.
pub struct RsaPrivateKey {
    inner: Arc<RawPrivateKey>,
    public: RsaPublicKey,
}

impl RsaPrivateKey {
    /// Generate a fresh key pair.
    pub fn generate(scheme: RsaSignScheme, size_bits: u32) -> Result<Self, CryptoError> {
        let size_bits = scheme.private_type().resolve_size(Some(size_bits))?;
        let inner = RawPrivateKey::new(&mut OsRng, size_bits as usize)
            .map_err(|_| CryptoError::Primitive { operation: "generate" })?;
        Ok(Self::from_raw(inner, RsaPadding::default(), scheme))
    }

    fn from_raw(inner: RawPrivateKey, padding: RsaPadding, scheme: RsaSignScheme) -> Self {
        let public = RsaPublicKey::from_raw(inner.to_public_key(), padding, scheme);
        Self { inner: Arc::new(inner), public }
    }

    /// Key type for this key's signature scheme.
    pub fn key_type(&self) -> KeyType {
        self.public.scheme.private_type()
    }

    /// Public half.
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Modulus size in bits.
    pub fn size(&self) -> u32 {
        self.public.size()
    }

    pub(crate) fn to_data(&self) -> Result<RsaPrivateKeyData, CryptoError> {
        let [p, q] = self.inner.primes() else {
            return Err(CryptoError::InvalidKeyData("multi-prime RSA key".into()));
        };
        let d = self.inner.d();
        let one = BigUint::from(1u8);
        let two = BigUint::from(2u8);

        let dp = d % (p - &one);
        let dq = d % (q - &one);
        // p is prime, so q^(p-2) is the inverse of q mod p.
        let qinv = q.modpow(&(p - &two), p);

        Ok(RsaPrivateKeyData {
            public_key: self.public.to_data(),
            private_exponent: integer_bytes(&d.to_bytes_be()),
            prime_p: integer_bytes(&p.to_bytes_be()),
            prime_q: integer_bytes(&q.to_bytes_be()),
            prime_exponent_p: integer_bytes(&dp.to_bytes_be()),
            prime_exponent_q: integer_bytes(&dq.to_bytes_be()),
            crt_coefficient: integer_bytes(&qinv.to_bytes_be()),
            size: self.size(),
        })
    }

    pub(crate) fn from_data(
        data: &RsaPrivateKeyData,
        scheme: RsaSignScheme,
    ) -> Result<Self, CryptoError> {
        let public = RsaPublicKey::from_data(&data.public_key, scheme)?;
        let n = public.inner.n().clone();
        let e = public.inner.e().clone();
        let d = biguint(&data.private_exponent)?;
        let primes = vec![biguint(&data.prime_p)?, biguint(&data.prime_q)?];

        let mut inner = RawPrivateKey::from_components(n, e, d, primes).map_err(|e| invalid(&e))?;
        inner.validate().map_err(|e| invalid(&e))?;
        inner.precompute().map_err(|e| invalid(&e))?;
        check_size(data.size, public.size())?;

        Ok(Self { inner: Arc::new(inner), public })
    }
}

impl Decryptable for RsaPrivateKey {
    fn decrypting_stream(
        &self,
        _associated_data: &[u8],
    ) -> Result<Box<dyn CipherStream>, CryptoError> {
        if self.public.scheme == RsaSignScheme::PssSha256 {
            return Err(CryptoError::UnsupportedOperation("decrypt with a signing-only RSA key"));
        }

        let key = Arc::clone(&self.inner);
        let padding = self.public.padding;
        let stream = OneShot::new(move |ciphertext: &[u8]| {
            let result = match padding {
                RsaPadding::Oaep => key.decrypt(Oaep::new::<Sha1>(), ciphertext),
                RsaPadding::Pkcs => key.decrypt(Pkcs1v15Encrypt, ciphertext),
            };
            result
                .map(Zeroizing::new)
                .map_err(|_| CryptoError::Primitive { operation: "decrypt" })
        });
        Ok(Box::new(stream.with_limit(self.inner.size())))
    }

    fn auth_verifying_stream(&self) -> Result<Option<Box<dyn VerifyingStream>>, CryptoError> {
        Ok(None)
    }

    fn trailer_size(&self) -> usize {
        0
    }
}

impl Signable for RsaPrivateKey {
    fn signing_stream(&self) -> Result<Box<dyn SigningStream>, CryptoError> {
        Ok(Box::new(RsaSigningStream {
            key: Arc::clone(&self.inner),
            scheme: self.public.scheme,
            digest: Prehash::new(self.public.scheme),
        }))
    }
}

/// Message digest matching a signature scheme.
enum Prehash {
    Sha1(Sha1),
    Sha256(Sha256),
}

impl Prehash {
    fn new(scheme: RsaSignScheme) -> Self {
        match scheme {
            RsaSignScheme::Pkcs1Sha1 => Self::Sha1(Sha1::new()),
            RsaSignScheme::PssSha256 => Self::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha1(d) => d.update(data),
            Self::Sha256(d) => d.update(data),
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha1(d) => d.finalize().to_vec(),
            Self::Sha256(d) => d.finalize().to_vec(),
        }
    }
}

struct RsaSigningStream {
    key: Arc<RawPrivateKey>,
    scheme: RsaSignScheme,
    digest: Prehash,
}

impl SigningStream for RsaSigningStream {
    fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, CryptoError> {
        let digest = self.digest.finalize();
        let result = match self.scheme {
            RsaSignScheme::Pkcs1Sha1 => self.key.sign(Pkcs1v15Sign::new::<Sha1>(), &digest),
            RsaSignScheme::PssSha256 => {
                self.key.sign_with_rng(&mut OsRng, Pss::new::<Sha256>(), &digest)
            },
        };
        result.map_err(|_| CryptoError::Primitive { operation: "sign" })
    }
}

struct RsaVerifyingStream {
    key: Arc<RawPublicKey>,
    scheme: RsaSignScheme,
    digest: Prehash,
}

impl VerifyingStream for RsaVerifyingStream {
    fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    fn verify(self: Box<Self>, signature: &[u8]) -> bool {
        let digest = self.digest.finalize();
        let result = match self.scheme {
            RsaSignScheme::Pkcs1Sha1 => {
                self.key.verify(Pkcs1v15Sign::new::<Sha1>(), &digest, signature)
            },
            RsaSignScheme::PssSha256 => self.key.verify(Pss::new::<Sha256>(), &digest, signature),
        };
        result.is_ok()
    }
}
