//! Fuzz target for persisted key sets
//!
//! Key data and metadata come from disk or from decrypted blobs and are
//! untrusted. Every key type parses the same arbitrary string to find:
//! - Panics on missing or mistyped JSON fields
//! - Serialized keys that do not parse back to the same key
//! - Bignum components that crash key construction
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use keyczar_core::KeyMetadata;
use keyczar_crypto::{KeyMaterial, KeyType};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let _ = KeyMetadata::from_json(data);

    for key_type in KeyType::ALL {
        if let Ok(key) = KeyMaterial::from_json(key_type, data) {
            // Whatever parsed must describe itself consistently
            assert_eq!(key.key_type(), key_type);
            let json = key.to_json().expect("parsed key serializes");
            let reparsed = KeyMaterial::from_json(key_type, &json).expect("own output parses");
            assert_eq!(reparsed.key_hash(), key.key_hash());
        }
    }
});
