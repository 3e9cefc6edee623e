//! HMAC-SHA1 signing keys

use hmac::{Hmac, Mac};
use keyczar_proto::KeyHash;
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use zeroize::Zeroize;

use super::{Signable, Verifiable, VerifyPolicy};
use crate::{
    error::CryptoError,
    encoding::websafe,
    hash::KeyHasher,
    key_type::KeyType,
    stream::{SigningStream, VerifyingStream},
};

type HmacSha1 = Hmac<Sha1>;

/// Size of an HMAC-SHA1 tag in bytes
pub const HMAC_TAG_SIZE: usize = 20;

/// Persisted form of an HMAC key.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HmacKeyData {
    #[serde(with = "websafe")]
    pub(crate) hmac_key_string: Vec<u8>,
    pub(crate) size: u32,
}

impl Drop for HmacKeyData {
    fn drop(&mut self) {
        self.hmac_key_string.zeroize();
    }
}

/// Shared-secret HMAC-SHA1 key.
///
/// Also serves as the authentication sub-key of AES-CBC keys.
pub struct HmacKey {
    key: Vec<u8>,
    hash: KeyHash,
}

impl HmacKey {
    /// Generate a fresh key of `size_bits`.
    pub fn generate(size_bits: u32) -> Result<Self, CryptoError> {
        let size_bits = KeyType::HmacSha1.resolve_size(Some(size_bits))?;
        let mut key = vec![0u8; (size_bits / 8) as usize];
        OsRng.fill_bytes(&mut key);
        Ok(Self::from_bytes(key))
    }

    /// Wrap raw key bytes.
    pub fn from_bytes(key: Vec<u8>) -> Self {
        let hash = KeyHasher::new().prefixed(&key).finish();
        Self { key, hash }
    }

    /// Key size in bits.
    pub fn size(&self) -> u32 {
        (self.key.len() * 8) as u32
    }

    /// Primary key hash: `len(key) || key`.
    pub fn key_hash(&self) -> KeyHash {
        self.hash
    }

    /// Raw key bytes.
    pub fn key_bytes(&self) -> &[u8] {
        &self.key
    }

    pub(crate) fn to_data(&self) -> HmacKeyData {
        HmacKeyData { hmac_key_string: self.key.clone(), size: self.size() }
    }

    pub(crate) fn from_data(data: &HmacKeyData) -> Result<Self, CryptoError> {
        if data.hmac_key_string.len() * 8 != data.size as usize {
            return Err(CryptoError::InvalidKeyData(format!(
                "hmac key is {} bytes, size says {} bits",
                data.hmac_key_string.len(),
                data.size
            )));
        }
        Ok(Self::from_bytes(data.hmac_key_string.clone()))
    }

    fn mac(&self) -> Result<HmacSha1, CryptoError> {
        HmacSha1::new_from_slice(&self.key).map_err(|_| CryptoError::Primitive { operation: "hmac" })
    }
}

impl Drop for HmacKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl Signable for HmacKey {
    fn signing_stream(&self) -> Result<Box<dyn SigningStream>, CryptoError> {
        Ok(Box::new(HmacStream { mac: self.mac()? }))
    }
}

impl Verifiable for HmacKey {
    fn verifying_stream(&self, _policy: VerifyPolicy) -> Result<Box<dyn VerifyingStream>, CryptoError> {
        Ok(Box::new(HmacStream { mac: self.mac()? }))
    }
}

/// Running HMAC; signs or verifies.
struct HmacStream {
    mac: HmacSha1,
}

impl SigningStream for HmacStream {
    fn update(&mut self, data: &[u8]) {
        self.mac.update(data);
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, CryptoError> {
        Ok(self.mac.finalize().into_bytes().to_vec())
    }
}

impl VerifyingStream for HmacStream {
    fn update(&mut self, data: &[u8]) {
        self.mac.update(data);
    }

    fn verify(self: Box<Self>, signature: &[u8]) -> bool {
        // Constant-time; also rejects truncated tags.
        self.mac.verify_slice(signature).is_ok()
    }
}
