//! Fuzz target for signature verification
//!
//! Prevent signature forgery and verification bypass (CRITICAL security
//! boundary)
//!
//! # Strategy
//!
//! - Raw bytes: arbitrary input as plain, attached and timeout envelopes
//! - Corrupted signatures: flip bits in a valid signature
//! - Tampered data: verify a valid signature over different bytes
//! - Wrong key: sign under one key set, verify under another
//!
//! # Invariants
//!
//! - Valid signature MUST verify
//! - Corrupted signature (any bit flip) MUST NOT verify
//! - Signature over other data MUST NOT verify
//! - Signature from an unrelated key set MUST NOT verify
//! - NEVER panic on arbitrary signature input

#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use keyczar_core::{AttachedVerifier, KeySet, KeyStatus, MutableKeySet, Signer, TimeoutVerifier};
use keyczar_crypto::{HmacKey, KeyMaterial, KeyPurpose, KeyType};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    seed: [u8; 32],
    message: Vec<u8>,
    attack: SignatureAttack,
}

#[derive(Debug, Clone, Arbitrary)]
enum SignatureAttack {
    RawBytes { envelope: Vec<u8> },
    CorruptedSignature { byte_offset: u16, bit_offset: u8 },
    TamperedData { other: Vec<u8> },
    WrongKey,
}

fn derive_key_bytes(seed: &[u8; 32], index: u8) -> [u8; 32] {
    let mut key_bytes = *seed;
    for (i, byte) in key_bytes.iter_mut().enumerate() {
        *byte ^= index.wrapping_add(i as u8);
    }
    key_bytes
}

fn hmac_keyset(seed: &[u8; 32], index: u8) -> Arc<KeySet> {
    let mut keyset = MutableKeySet::create("fuzz", KeyPurpose::SignAndVerify, KeyType::HmacSha1)
        .expect("HMAC supports signing");
    let key = HmacKey::from_bytes(derive_key_bytes(seed, index).to_vec());
    keyset.import_key(KeyStatus::Primary, KeyMaterial::Hmac(key)).expect("import");
    Arc::new(keyset.into_keyset().expect("freeze"))
}

fuzz_target!(|input: FuzzInput| {
    let keyset = hmac_keyset(&input.seed, 0);
    let signer = Signer::new(Arc::clone(&keyset)).expect("signer");
    let signature = signer.sign(&input.message).expect("sign");
    assert_eq!(signer.verify(&input.message, &signature), Ok(true));

    match input.attack {
        SignatureAttack::RawBytes { envelope } => {
            let _ = signer.verify(&input.message, &envelope);
            let attached = AttachedVerifier::new(Arc::clone(&keyset)).expect("verifier");
            let _ = attached.verify(&envelope, &input.message);
            let timeout = TimeoutVerifier::new(keyset).expect("verifier");
            let _ = timeout.verify(&input.message, &envelope);
        },
        SignatureAttack::CorruptedSignature { byte_offset, bit_offset } => {
            let mut corrupted = signature.clone();
            let index = usize::from(byte_offset) % corrupted.len();
            corrupted[index] ^= 1 << (bit_offset % 8);
            assert_ne!(signer.verify(&input.message, &corrupted), Ok(true));
        },
        SignatureAttack::TamperedData { other } => {
            let expected = other == input.message;
            assert_eq!(signer.verify(&other, &signature), Ok(expected));
        },
        SignatureAttack::WrongKey => {
            let other = Signer::new(hmac_keyset(&input.seed, 1)).expect("signer");
            assert_eq!(other.verify(&input.message, &signature), Ok(false));
        },
    }
});
