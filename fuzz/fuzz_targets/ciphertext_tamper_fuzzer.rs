//! Fuzz target for decryption
//!
//! Decrypt runs on attacker-controlled bytes and must fail closed.
//!
//! # Strategy
//!
//! - Raw bytes: arbitrary input as AES-CBC and AES-GCM ciphertext
//! - Corrupted ciphertext: flip bits in a valid ciphertext
//! - Truncation: cut a valid ciphertext short
//!
//! # Invariants
//!
//! - Valid ciphertext MUST decrypt to its plaintext
//! - Any bit flip or truncation MUST fail, never return other plaintext
//! - NEVER panic on arbitrary ciphertext input

#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use keyczar_core::{CompressionMode, Crypter, KeySet, KeyStatus, KeyczarConfig, MutableKeySet};
use keyczar_crypto::{AesGcmKey, AesKey, HmacKey, KeyMaterial, KeyPurpose, KeyType};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    seed: [u8; 32],
    gcm: bool,
    compression: u8,
    plaintext: Vec<u8>,
    attack: CiphertextAttack,
}

#[derive(Debug, Clone, Arbitrary)]
enum CiphertextAttack {
    RawBytes { ciphertext: Vec<u8> },
    CorruptedCiphertext { byte_offset: u16, bit_offset: u8 },
    Truncated { keep: u16 },
}

fn keyset(seed: &[u8; 32], gcm: bool) -> Arc<KeySet> {
    let (key_type, key) = if gcm {
        let key = AesGcmKey::from_bytes(seed[..16].to_vec()).expect("128-bit key");
        (KeyType::AesGcm, KeyMaterial::AesGcm(key))
    } else {
        let hmac = HmacKey::from_bytes(seed.to_vec());
        let key = AesKey::from_parts(seed[..16].to_vec(), hmac).expect("128-bit key");
        (KeyType::Aes, KeyMaterial::Aes(key))
    };
    let mut keyset = MutableKeySet::create("fuzz", KeyPurpose::DecryptAndEncrypt, key_type)
        .expect("AES supports encryption");
    keyset.import_key(KeyStatus::Primary, key).expect("import");
    Arc::new(keyset.into_keyset().expect("freeze"))
}

fuzz_target!(|input: FuzzInput| {
    let compression = match input.compression % 3 {
        0 => CompressionMode::None,
        1 => CompressionMode::Gzip,
        _ => CompressionMode::Zlib,
    };
    let crypter = Crypter::with_config(
        keyset(&input.seed, input.gcm),
        KeyczarConfig::with_compression(compression),
    )
    .expect("crypter");

    let ciphertext = crypter.encrypt(&input.plaintext).expect("encrypt");
    assert_eq!(crypter.decrypt(&ciphertext).as_deref(), Ok(input.plaintext.as_slice()));

    match input.attack {
        CiphertextAttack::RawBytes { ciphertext } => {
            let _ = crypter.decrypt(&ciphertext);
        },
        CiphertextAttack::CorruptedCiphertext { byte_offset, bit_offset } => {
            let mut corrupted = ciphertext.clone();
            let index = usize::from(byte_offset) % corrupted.len();
            corrupted[index] ^= 1 << (bit_offset % 8);
            assert!(crypter.decrypt(&corrupted).is_err());
        },
        CiphertextAttack::Truncated { keep } => {
            let keep = usize::from(keep) % ciphertext.len();
            assert!(crypter.decrypt(&ciphertext[..keep]).is_err());
        },
    }
});
