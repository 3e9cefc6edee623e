//! AES-GCM keys.
//!
//! # Ciphertext layout
//!
//! ```text
//! nonce (12) || GCM(plaintext) || tag (16)
//! ```
//!
//! The envelope header is passed as associated data, so the tag binds it
//! without a separate MAC trailer.

use aes::Aes192;
use aes_gcm::{
    Aes128Gcm, Aes256Gcm, AesGcm, KeyInit, Nonce,
    aead::{Aead, Payload, consts::U12},
};
use keyczar_proto::KeyHash;
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use super::{Decryptable, Encryptable};
use crate::{
    encoding::websafe,
    error::CryptoError,
    hash::KeyHasher,
    key_type::KeyType,
    stream::{CipherStream, OneShot, SigningStream, VerifyingStream},
};

type Aes192Gcm = AesGcm<Aes192, U12>;

/// GCM nonce size in bytes
pub const GCM_NONCE_SIZE: usize = 12;

/// GCM tag size in bytes
pub const GCM_TAG_SIZE: usize = 16;

const MODE_GCM: &str = "GCM";

/// Persisted form of an AES-GCM key.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AesGcmKeyData {
    #[serde(with = "websafe")]
    aes_key_string: Vec<u8>,
    mode: String,
    size: u32,
}

impl Drop for AesGcmKeyData {
    fn drop(&mut self) {
        self.aes_key_string.zeroize();
    }
}

/// AES-GCM authenticated encryption key.
pub struct AesGcmKey {
    key: Zeroizing<Vec<u8>>,
    hash: KeyHash,
}

impl AesGcmKey {
    /// Generate a fresh key of `size_bits`.
    pub fn generate(size_bits: u32) -> Result<Self, CryptoError> {
        let size_bits = KeyType::AesGcm.resolve_size(Some(size_bits))?;
        let mut key = vec![0u8; (size_bits / 8) as usize];
        OsRng.fill_bytes(&mut key);
        Self::from_bytes(key)
    }

    /// Wrap raw key bytes.
    pub fn from_bytes(key: Vec<u8>) -> Result<Self, CryptoError> {
        KeyType::AesGcm.resolve_size(Some((key.len() * 8) as u32))?;
        let hash = KeyHasher::new().prefixed(&key).finish();
        Ok(Self { key: Zeroizing::new(key), hash })
    }

    /// Key size in bits.
    pub fn size(&self) -> u32 {
        (self.key.len() * 8) as u32
    }

    /// Primary key hash: `len(key) || key`.
    pub fn key_hash(&self) -> KeyHash {
        self.hash
    }

    pub(crate) fn to_data(&self) -> AesGcmKeyData {
        AesGcmKeyData {
            aes_key_string: self.key.to_vec(),
            mode: MODE_GCM.to_string(),
            size: self.size(),
        }
    }

    pub(crate) fn from_data(data: &AesGcmKeyData) -> Result<Self, CryptoError> {
        if data.mode != MODE_GCM {
            return Err(CryptoError::InvalidKeyData(format!("unsupported AEAD mode {}", data.mode)));
        }
        if data.aes_key_string.len() * 8 != data.size as usize {
            return Err(CryptoError::InvalidKeyData("AES key length disagrees with size".into()));
        }
        Self::from_bytes(data.aes_key_string.clone())
    }
}

fn seal(
    key: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let mut nonce = [0u8; GCM_NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let payload = Payload { msg: plaintext, aad };
    let nonce_ref = Nonce::<U12>::from_slice(&nonce);
    let failed = |_| CryptoError::Primitive { operation: "encrypt" };
    let sealed = match key.len() {
        16 => cipher::<Aes128Gcm>(key)?.encrypt(nonce_ref, payload).map_err(failed)?,
        24 => cipher::<Aes192Gcm>(key)?.encrypt(nonce_ref, payload).map_err(failed)?,
        32 => cipher::<Aes256Gcm>(key)?.encrypt(nonce_ref, payload).map_err(failed)?,
        n => return Err(CryptoError::InvalidKeyData(format!("AES key of {n} bytes"))),
    };

    let mut out = Zeroizing::new(Vec::with_capacity(GCM_NONCE_SIZE + sealed.len()));
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

fn open(key: &[u8], aad: &[u8], input: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let failed = CryptoError::Primitive { operation: "decrypt" };
    if input.len() < GCM_NONCE_SIZE + GCM_TAG_SIZE {
        return Err(failed);
    }

    let (nonce, sealed) = input.split_at(GCM_NONCE_SIZE);
    let nonce = Nonce::<U12>::from_slice(nonce);
    let payload = Payload { msg: sealed, aad };
    let opened = match key.len() {
        16 => cipher::<Aes128Gcm>(key)?.decrypt(nonce, payload),
        24 => cipher::<Aes192Gcm>(key)?.decrypt(nonce, payload),
        32 => cipher::<Aes256Gcm>(key)?.decrypt(nonce, payload),
        n => return Err(CryptoError::InvalidKeyData(format!("AES key of {n} bytes"))),
    };
    opened.map(Zeroizing::new).map_err(|_| failed)
}

fn cipher<C: KeyInit>(key: &[u8]) -> Result<C, CryptoError> {
    C::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyData("AES key length".into()))
}

impl Encryptable for AesGcmKey {
    fn encrypting_stream(
        &self,
        associated_data: &[u8],
    ) -> Result<Box<dyn CipherStream>, CryptoError> {
        let key = self.key.clone();
        let aad = associated_data.to_vec();
        Ok(Box::new(OneShot::new(move |plaintext: &[u8]| seal(&key, &aad, plaintext))))
    }

    fn auth_signing_stream(&self) -> Result<Option<Box<dyn SigningStream>>, CryptoError> {
        Ok(None)
    }
}

impl Decryptable for AesGcmKey {
    fn decrypting_stream(
        &self,
        associated_data: &[u8],
    ) -> Result<Box<dyn CipherStream>, CryptoError> {
        let key = self.key.clone();
        let aad = associated_data.to_vec();
        Ok(Box::new(OneShot::new(move |ciphertext: &[u8]| open(&key, &aad, ciphertext))))
    }

    fn auth_verifying_stream(&self) -> Result<Option<Box<dyn VerifyingStream>>, CryptoError> {
        Ok(None)
    }

    fn trailer_size(&self) -> usize {
        0
    }
}
