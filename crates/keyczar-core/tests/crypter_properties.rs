//! Encrypt/decrypt behavior across key types, versions and compression.
//!
//! 1. **Round-trip**: every encrypting key type decrypts what it encrypted,
//!    for empty, single-byte and multi-buffer plaintexts
//! 2. **Non-determinism**: the same plaintext never encrypts twice alike
//! 3. **Fail-closed**: any single flipped byte is rejected
//! 4. **Version history**: ciphertexts from every non-revoked version still
//!    decrypt after the primary moves on
//! 5. **Ambiguous hashes**: colliding and fallback key hashes still find
//!    the right key

use std::{collections::HashMap, io::Cursor, sync::Arc};

use keyczar_core::{
    CompressionMode, Crypter, Encrypter, KeySet, KeyStatus, KeyczarConfig, KeyczarError,
    MutableKeySet,
};
use keyczar_crypto::{AesKey, HmacKey, KeyMaterial, KeyPurpose, KeyType, Signable};
use keyczar_proto::{HEADER_SIZE, KeyHash};
use proptest::prelude::*;

const COMPRESSION_MODES: [CompressionMode; 3] =
    [CompressionMode::None, CompressionMode::Gzip, CompressionMode::Zlib];

fn symmetric_keyset(key_type: KeyType) -> Arc<KeySet> {
    let mut keyset =
        MutableKeySet::create("crypt", KeyPurpose::DecryptAndEncrypt, key_type).expect("create");
    keyset.add_key(KeyStatus::Primary, None).expect("add key");
    Arc::new(keyset.into_keyset().expect("freeze"))
}

fn aes_crypter() -> Crypter {
    Crypter::new(symmetric_keyset(KeyType::Aes)).expect("crypter")
}

#[test]
fn symmetric_round_trip_lengths_and_compression() {
    // 0, 1, exactly one buffer, and a few buffers plus a tail
    let lengths = [0usize, 1, 4096, 3 * 4096 + 17];

    for key_type in [KeyType::Aes, KeyType::AesGcm] {
        let keyset = symmetric_keyset(key_type);
        for mode in COMPRESSION_MODES {
            let crypter =
                Crypter::with_config(Arc::clone(&keyset), KeyczarConfig::with_compression(mode))
                    .expect("crypter");
            for len in lengths {
                let plaintext: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
                let ciphertext = crypter.encrypt(&plaintext).expect("encrypt");
                assert_eq!(
                    crypter.decrypt(&ciphertext).expect("decrypt"),
                    plaintext,
                    "{key_type:?} {mode:?} len {len}"
                );
            }
        }
    }
}

#[test]
fn rsa_round_trip_through_public_export() {
    let mut private =
        MutableKeySet::create("rsa", KeyPurpose::DecryptAndEncrypt, KeyType::RsaPriv)
            .expect("create");
    private.add_key(KeyStatus::Primary, None).expect("add key");
    let public =
        Arc::new(private.export_public_keys().expect("export").into_keyset().expect("freeze"));
    assert_eq!(public.metadata().purpose(), KeyPurpose::Encrypt);
    assert_eq!(public.metadata().key_type(), KeyType::RsaPub);

    let encrypter = Encrypter::new(Arc::clone(&public)).expect("encrypter");
    let crypter = Crypter::new(private.into_keyset().expect("freeze")).expect("crypter");

    for plaintext in [&b""[..], b"x", &[0x5a; 200][..]] {
        let ciphertext = encrypter.encrypt(plaintext).expect("encrypt");
        assert_eq!(crypter.decrypt(&ciphertext).expect("decrypt"), plaintext);
    }

    // Public key sets cannot decrypt
    assert!(matches!(Crypter::new(public), Err(KeyczarError::InvalidKeySetPurpose { .. })));
}

#[test]
fn encryption_is_not_deterministic() {
    let crypter = aes_crypter();
    let first = crypter.encrypt(b"same plaintext").expect("encrypt");
    let second = crypter.encrypt(b"same plaintext").expect("encrypt");

    // PROPERTY: fresh IV per message
    assert_ne!(first, second);
    assert_eq!(crypter.decrypt(&first).expect("decrypt"), b"same plaintext");
    assert_eq!(crypter.decrypt(&second).expect("decrypt"), b"same plaintext");
}

#[test]
fn prop_aes_round_trip() {
    let crypter = aes_crypter();
    proptest!(|(plaintext in prop::collection::vec(any::<u8>(), 0..2048))| {
        let ciphertext = crypter.encrypt(&plaintext).expect("encrypt");

        // PROPERTY: header, IV, padded blocks, HMAC trailer
        let padded = (plaintext.len() / 16 + 1) * 16;
        prop_assert_eq!(ciphertext.len(), HEADER_SIZE + 16 + padded + 20);
        prop_assert_eq!(crypter.decrypt(&ciphertext).expect("decrypt"), plaintext);
    });
}

#[test]
fn prop_any_flipped_byte_is_rejected() {
    let crypter = aes_crypter();
    let ciphertext = crypter.encrypt(b"flip me if you can").expect("encrypt");

    proptest!(|(index in 0..ciphertext.len(), mask in 1u8..=255)| {
        let mut tampered = ciphertext.clone();
        tampered[index] ^= mask;
        let result = crypter.decrypt(&tampered);

        // PROPERTY: the format byte reports its version, everything else is
        // an opaque ciphertext failure
        if index == 0 {
            prop_assert_eq!(result, Err(KeyczarError::UnsupportedFormatVersion(mask)));
        } else {
            prop_assert_eq!(result, Err(KeyczarError::InvalidCiphertext));
        }
    });
}

#[test]
fn stream_decrypt_matches_slice_decrypt() {
    let crypter = Crypter::with_config(
        symmetric_keyset(KeyType::Aes),
        KeyczarConfig { buffer_size: 7, ..KeyczarConfig::default() },
    )
    .expect("crypter");
    let plaintext = vec![3u8; 1000];

    let mut ciphertext = Vec::new();
    crypter.encrypt_stream(&mut plaintext.as_slice(), &mut ciphertext).expect("encrypt");
    let mut decrypted = Vec::new();
    crypter.decrypt_stream(&mut Cursor::new(&ciphertext), &mut decrypted).expect("decrypt");

    assert_eq!(decrypted, plaintext);
    assert_eq!(crypter.decrypt(&ciphertext).expect("decrypt"), plaintext);
}

#[test]
fn older_versions_keep_decrypting_until_revoked() {
    let mut keyset =
        MutableKeySet::create("rotating", KeyPurpose::DecryptAndEncrypt, KeyType::Aes)
            .expect("create");
    let v1 = keyset.add_key(KeyStatus::Primary, None).expect("add");
    let old = Crypter::new(keyset_snapshot(&keyset)).expect("crypter");
    let old_ciphertext = old.encrypt(b"written under v1").expect("encrypt");

    let v2 = keyset.add_key(KeyStatus::Primary, None).expect("add");
    assert_eq!(keyset.status(v1), Ok(KeyStatus::Active));
    let current = Crypter::new(keyset_snapshot(&keyset)).expect("crypter");
    let new_ciphertext = current.encrypt(b"written under v2").expect("encrypt");

    // Both versions decrypt
    assert_eq!(current.decrypt(&old_ciphertext).expect("decrypt"), b"written under v1");
    assert_eq!(current.decrypt(&new_ciphertext).expect("decrypt"), b"written under v2");

    // Inactive still decrypts
    keyset.demote(v1).expect("demote");
    assert_eq!(keyset.status(v1), Ok(KeyStatus::Inactive));
    let inactive = Crypter::new(keyset_snapshot(&keyset)).expect("crypter");
    assert_eq!(inactive.decrypt(&old_ciphertext).expect("decrypt"), b"written under v1");

    // Revoked does not
    keyset.revoke(v1).expect("revoke");
    let revoked = Crypter::new(keyset_snapshot(&keyset)).expect("crypter");
    assert_eq!(revoked.decrypt(&old_ciphertext), Err(KeyczarError::InvalidCiphertext));
    assert_eq!(revoked.decrypt(&new_ciphertext).expect("decrypt"), b"written under v2");
    assert_eq!(keyset.status(v2), Ok(KeyStatus::Primary));
}

/// Freeze a copy of a mutable key set by round-tripping it through JSON.
fn keyset_snapshot(keyset: &MutableKeySet) -> Arc<KeySet> {
    let store = keyczar_core::store::MemoryKeySet::new();
    keyset.save(&mut store.writer()).expect("save");
    Arc::new(KeySet::read(&store).expect("read"))
}

fn aes_from_seed(seed: u64) -> AesKey {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&seed.to_be_bytes());
    let mut hmac = [0x42u8; 32];
    hmac[24..].copy_from_slice(&seed.to_be_bytes());
    AesKey::from_parts(key.to_vec(), HmacKey::from_bytes(hmac.to_vec())).expect("valid key")
}

/// Search for two seeds whose AES keys share a 4-byte hash.
///
/// The expected number of draws before a collision is about 82k.
fn colliding_seeds() -> (u64, u64) {
    let mut seen: HashMap<KeyHash, u64> = HashMap::new();
    for seed in 0u64.. {
        if let Some(previous) = seen.insert(aes_from_seed(seed).key_hash(), seed) {
            return (previous, seed);
        }
    }
    unreachable!("u64 seeds exhausted")
}

fn keyset_of(keys: Vec<(KeyStatus, KeyMaterial)>) -> Arc<KeySet> {
    let mut keyset =
        MutableKeySet::create("collide", KeyPurpose::DecryptAndEncrypt, KeyType::Aes)
            .expect("create");
    for (status, key) in keys {
        keyset.import_key(status, key).expect("import");
    }
    Arc::new(keyset.into_keyset().expect("freeze"))
}

#[test]
fn colliding_hashes_try_every_candidate() {
    let (older, newer) = colliding_seeds();
    assert_eq!(aes_from_seed(older).key_hash(), aes_from_seed(newer).key_hash());

    let ciphertext = Crypter::new(keyset_of(vec![(
        KeyStatus::Primary,
        KeyMaterial::Aes(aes_from_seed(older)),
    )]))
    .expect("crypter")
    .encrypt(b"from the older key")
    .expect("encrypt");

    let both = keyset_of(vec![
        (KeyStatus::Active, KeyMaterial::Aes(aes_from_seed(older))),
        (KeyStatus::Primary, KeyMaterial::Aes(aes_from_seed(newer))),
    ]);
    assert_eq!(both.candidates(aes_from_seed(older).key_hash()).len(), 2);

    // Newest candidate is tried first and fails; the older one opens it
    let crypter = Crypter::new(both).expect("crypter");
    assert_eq!(crypter.decrypt(&ciphertext).expect("decrypt"), b"from the older key");
}

#[test]
fn fallback_hash_still_finds_the_key() {
    let key = KeyMaterial::generate(KeyType::Aes, Some(256)).expect("generate");
    let KeyMaterial::Aes(aes) = &key else { unreachable!("generated AES") };
    let fallback = *aes.fallback_key_hashes().first().expect("AES-256 has a fallback hash");
    assert_ne!(fallback, aes.key_hash());
    let hmac = HmacKey::from_bytes(aes.hmac_key().key_bytes().to_vec());

    let keyset = keyset_of(vec![(KeyStatus::Primary, key)]);
    let crypter = Crypter::new(keyset).expect("crypter");
    let ciphertext = crypter.encrypt(b"legacy header").expect("encrypt");

    // Re-address the ciphertext to the fallback hash and re-authenticate
    let body_end = ciphertext.len() - 20;
    let mut rewritten = ciphertext[..body_end].to_vec();
    rewritten[1..HEADER_SIZE].copy_from_slice(fallback.as_bytes());
    let mut mac = hmac.signing_stream().expect("mac");
    mac.update(&rewritten);
    rewritten.extend_from_slice(&mac.finish().expect("tag"));

    assert_eq!(crypter.decrypt(&rewritten).expect("decrypt"), b"legacy header");
}

#[test]
fn aes_header_carries_interoperable_hash() {
    // SHA-1(be32(16) || aes || hmac)[..4] for this fixed key
    let aes = AesKey::from_parts(vec![3; 16], HmacKey::from_bytes(vec![7; 32])).expect("aes");
    let hmac = HmacKey::from_bytes(aes.hmac_key().key_bytes().to_vec());
    let expected = KeyHash::new([0x63, 0xef, 0xf7, 0x3c]);

    let crypter =
        Crypter::new(keyset_of(vec![(KeyStatus::Primary, KeyMaterial::Aes(aes))])).expect("crypter");
    let ciphertext = crypter.encrypt(b"interop").expect("encrypt");
    assert_eq!(&ciphertext[1..HEADER_SIZE], expected.as_bytes());

    // A ciphertext built elsewhere under the same key, addressed the same way
    let mut foreign = ciphertext[..ciphertext.len() - 20].to_vec();
    foreign[1..HEADER_SIZE].copy_from_slice(expected.as_bytes());
    let mut mac = hmac.signing_stream().expect("mac");
    mac.update(&foreign);
    foreign.extend_from_slice(&mac.finish().expect("tag"));
    assert_eq!(crypter.decrypt(&foreign).expect("decrypt"), b"interop");
}

#[test]
fn aes_scenario_corrupted_hash_byte() {
    let crypter = aes_crypter();
    let ciphertext = crypter.encrypt(b"This is some test data").expect("encrypt");
    assert_eq!(crypter.decrypt(&ciphertext).expect("decrypt"), b"This is some test data");

    let mut corrupted = ciphertext;
    corrupted[1] ^= 0xff;
    assert_eq!(crypter.decrypt(&corrupted), Err(KeyczarError::InvalidCiphertext));
}
