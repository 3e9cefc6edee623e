//! AES-CBC keys with an HMAC-SHA1 authentication sub-key.
//!
//! # Ciphertext layout
//!
//! ```text
//! IV (16) || CBC(PKCS#7-padded plaintext)
//! ```
//!
//! The envelope layer appends `HMAC-SHA1(header || IV || ciphertext)` using
//! the sub-key exposed through the auth streams.

use aes::{
    Aes128, Aes192, Aes256,
    cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, generic_array::GenericArray},
};
use keyczar_proto::KeyHash;
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use super::{
    Decryptable, Encryptable, Signable, Verifiable, VerifyPolicy,
    hmac_sha1::{HMAC_TAG_SIZE, HmacKey, HmacKeyData},
};
use crate::{
    encoding::websafe,
    error::CryptoError,
    hash::{KeyHasher, distinct_fallbacks},
    key_type::KeyType,
    stream::{CipherStream, SigningStream, VerifyingStream},
};

/// AES block and IV size in bytes
pub const AES_BLOCK_SIZE: usize = 16;

const MODE_CBC: &str = "CBC";

/// Persisted form of an AES-CBC key.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AesKeyData {
    #[serde(with = "websafe")]
    aes_key_string: Vec<u8>,
    hmac_key: HmacKeyData,
    mode: String,
    size: u32,
}

impl Drop for AesKeyData {
    fn drop(&mut self) {
        self.aes_key_string.zeroize();
    }
}

/// AES-CBC encryption key paired with an HMAC-SHA1 key.
pub struct AesKey {
    key: Vec<u8>,
    hmac: HmacKey,
    hash: KeyHash,
    fallback: Vec<KeyHash>,
}

impl AesKey {
    /// Generate a fresh key of `size_bits` with a new HMAC sub-key.
    pub fn generate(size_bits: u32) -> Result<Self, CryptoError> {
        let size_bits = KeyType::Aes.resolve_size(Some(size_bits))?;
        let mut key = vec![0u8; (size_bits / 8) as usize];
        OsRng.fill_bytes(&mut key);
        let hmac = HmacKey::generate(KeyType::HmacSha1.spec().default_size)?;
        Self::from_parts(key, hmac)
    }

    /// Assemble from raw AES key bytes and an HMAC sub-key.
    pub fn from_parts(key: Vec<u8>, hmac: HmacKey) -> Result<Self, CryptoError> {
        KeyType::Aes.resolve_size(Some((key.len() * 8) as u32))?;

        let hash = KeyHasher::new().prefixed(&key).raw(hmac.key_bytes()).finish();

        // Java computed the prefix from the block size, not the key length.
        // Only differs for keys longer than one block.
        let mut candidates = Vec::new();
        if key.len() != AES_BLOCK_SIZE {
            candidates.push(
                KeyHasher::new()
                    .raw(&(AES_BLOCK_SIZE as u32).to_be_bytes())
                    .raw(&key)
                    .raw(hmac.key_bytes())
                    .finish(),
            );
        }
        let fallback = distinct_fallbacks(hash, &candidates);

        Ok(Self { key, hmac, hash, fallback })
    }

    /// Key size in bits.
    pub fn size(&self) -> u32 {
        (self.key.len() * 8) as u32
    }

    /// Primary key hash: `len(aes) || aes || hmac`.
    pub fn key_hash(&self) -> KeyHash {
        self.hash
    }

    /// Legacy hashes this key also answers to.
    pub fn fallback_key_hashes(&self) -> &[KeyHash] {
        &self.fallback
    }

    /// Authentication sub-key.
    pub fn hmac_key(&self) -> &HmacKey {
        &self.hmac
    }

    /// Raw AES key bytes.
    pub fn key_bytes(&self) -> &[u8] {
        &self.key
    }

    pub(crate) fn to_data(&self) -> AesKeyData {
        AesKeyData {
            aes_key_string: self.key.clone(),
            hmac_key: self.hmac.to_data(),
            mode: MODE_CBC.to_string(),
            size: self.size(),
        }
    }

    pub(crate) fn from_data(data: &AesKeyData) -> Result<Self, CryptoError> {
        if data.mode != MODE_CBC {
            return Err(CryptoError::InvalidKeyData(format!("unsupported AES mode {}", data.mode)));
        }
        if data.aes_key_string.len() * 8 != data.size as usize {
            return Err(CryptoError::InvalidKeyData("AES key length disagrees with size".into()));
        }
        let hmac = HmacKey::from_data(&data.hmac_key)?;
        Self::from_parts(data.aes_key_string.clone(), hmac)
    }
}

impl Drop for AesKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl Encryptable for AesKey {
    fn encrypting_stream(
        &self,
        _associated_data: &[u8],
    ) -> Result<Box<dyn CipherStream>, CryptoError> {
        let mut iv = [0u8; AES_BLOCK_SIZE];
        OsRng.fill_bytes(&mut iv);
        let cipher = CbcEncryptor::new(&self.key, &iv)?;
        Ok(Box::new(CbcEncryptStream { cipher, iv: Some(iv), pending: Zeroizing::default() }))
    }

    fn auth_signing_stream(&self) -> Result<Option<Box<dyn SigningStream>>, CryptoError> {
        self.hmac.signing_stream().map(Some)
    }
}

impl Decryptable for AesKey {
    fn decrypting_stream(
        &self,
        _associated_data: &[u8],
    ) -> Result<Box<dyn CipherStream>, CryptoError> {
        Ok(Box::new(CbcDecryptStream {
            key: Zeroizing::new(self.key.clone()),
            cipher: None,
            pending: Zeroizing::default(),
        }))
    }

    fn auth_verifying_stream(&self) -> Result<Option<Box<dyn VerifyingStream>>, CryptoError> {
        self.hmac.verifying_stream(VerifyPolicy::default()).map(Some)
    }

    fn trailer_size(&self) -> usize {
        HMAC_TAG_SIZE
    }
}

enum CbcEncryptor {
    Aes128(cbc::Encryptor<Aes128>),
    Aes192(cbc::Encryptor<Aes192>),
    Aes256(cbc::Encryptor<Aes256>),
}

impl CbcEncryptor {
    fn new(key: &[u8], iv: &[u8]) -> Result<Self, CryptoError> {
        let invalid = |_| CryptoError::InvalidKeyData("AES key length".into());
        Ok(match key.len() {
            16 => Self::Aes128(cbc::Encryptor::new_from_slices(key, iv).map_err(invalid)?),
            24 => Self::Aes192(cbc::Encryptor::new_from_slices(key, iv).map_err(invalid)?),
            32 => Self::Aes256(cbc::Encryptor::new_from_slices(key, iv).map_err(invalid)?),
            n => return Err(CryptoError::InvalidKeyData(format!("AES key of {n} bytes"))),
        })
    }

    /// Encrypt whole blocks in place. `data.len()` must be a block multiple.
    fn encrypt_blocks(&mut self, data: &mut [u8]) {
        for block in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            let block = GenericArray::from_mut_slice(block);
            match self {
                Self::Aes128(c) => c.encrypt_block_mut(block),
                Self::Aes192(c) => c.encrypt_block_mut(block),
                Self::Aes256(c) => c.encrypt_block_mut(block),
            }
        }
    }
}

enum CbcDecryptor {
    Aes128(cbc::Decryptor<Aes128>),
    Aes192(cbc::Decryptor<Aes192>),
    Aes256(cbc::Decryptor<Aes256>),
}

impl CbcDecryptor {
    fn new(key: &[u8], iv: &[u8]) -> Result<Self, CryptoError> {
        let invalid = |_| CryptoError::InvalidKeyData("AES key length".into());
        Ok(match key.len() {
            16 => Self::Aes128(cbc::Decryptor::new_from_slices(key, iv).map_err(invalid)?),
            24 => Self::Aes192(cbc::Decryptor::new_from_slices(key, iv).map_err(invalid)?),
            32 => Self::Aes256(cbc::Decryptor::new_from_slices(key, iv).map_err(invalid)?),
            n => return Err(CryptoError::InvalidKeyData(format!("AES key of {n} bytes"))),
        })
    }

    fn decrypt_blocks(&mut self, data: &mut [u8]) {
        for block in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            let block = GenericArray::from_mut_slice(block);
            match self {
                Self::Aes128(c) => c.decrypt_block_mut(block),
                Self::Aes192(c) => c.decrypt_block_mut(block),
                Self::Aes256(c) => c.decrypt_block_mut(block),
            }
        }
    }
}

struct CbcEncryptStream {
    cipher: CbcEncryptor,
    /// Written ahead of the first ciphertext bytes
    iv: Option<[u8; AES_BLOCK_SIZE]>,
    /// Plaintext tail shorter than one block
    pending: Zeroizing<Vec<u8>>,
}

impl CbcEncryptStream {
    fn emit_iv(&mut self, output: &mut Vec<u8>) {
        if let Some(iv) = self.iv.take() {
            output.extend_from_slice(&iv);
        }
    }
}

impl CipherStream for CbcEncryptStream {
    fn update(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<(), CryptoError> {
        self.emit_iv(output);
        self.pending.extend_from_slice(input);

        let whole = self.pending.len() - self.pending.len() % AES_BLOCK_SIZE;
        if whole > 0 {
            let mut blocks: Vec<u8> = self.pending.drain(..whole).collect();
            self.cipher.encrypt_blocks(&mut blocks);
            output.extend_from_slice(&blocks);
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>, output: &mut Vec<u8>) -> Result<(), CryptoError> {
        self.emit_iv(output);

        // PKCS#7: always pad, a full block when already aligned.
        let pad = AES_BLOCK_SIZE - self.pending.len() % AES_BLOCK_SIZE;
        let mut last = std::mem::take(&mut *self.pending);
        last.resize(last.len() + pad, pad as u8);
        self.cipher.encrypt_blocks(&mut last);
        output.extend_from_slice(&last);
        Ok(())
    }
}

struct CbcDecryptStream {
    key: Zeroizing<Vec<u8>>,
    /// Created once the IV has arrived
    cipher: Option<CbcDecryptor>,
    /// Unprocessed input. The last full block is held back for unpadding.
    pending: Zeroizing<Vec<u8>>,
}

impl CipherStream for CbcDecryptStream {
    fn update(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<(), CryptoError> {
        self.pending.extend_from_slice(input);

        if self.cipher.is_none() {
            if self.pending.len() < AES_BLOCK_SIZE {
                return Ok(());
            }
            let iv: Vec<u8> = self.pending.drain(..AES_BLOCK_SIZE).collect();
            self.cipher = Some(CbcDecryptor::new(&self.key, &iv)?);
        }
        let Some(cipher) = self.cipher.as_mut() else {
            return Ok(());
        };

        if self.pending.len() > AES_BLOCK_SIZE {
            let ready = (self.pending.len() - 1) / AES_BLOCK_SIZE * AES_BLOCK_SIZE;
            let mut blocks = Zeroizing::new(self.pending.drain(..ready).collect::<Vec<u8>>());
            cipher.decrypt_blocks(&mut blocks);
            output.extend_from_slice(&blocks);
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>, output: &mut Vec<u8>) -> Result<(), CryptoError> {
        let failed = CryptoError::Primitive { operation: "decrypt" };

        let Some(cipher) = self.cipher.as_mut() else {
            return Err(failed);
        };
        if self.pending.len() != AES_BLOCK_SIZE {
            return Err(failed);
        }

        let mut last = std::mem::take(&mut *self.pending);
        cipher.decrypt_blocks(&mut last);

        let pad = last[AES_BLOCK_SIZE - 1] as usize;
        let valid = (1..=AES_BLOCK_SIZE).contains(&pad)
            && last[AES_BLOCK_SIZE - pad..].iter().all(|&b| b as usize == pad);
        if !valid {
            last.zeroize();
            return Err(failed);
        }

        output.extend_from_slice(&last[..AES_BLOCK_SIZE - pad]);
        last.zeroize();
        Ok(())
    }
}
