//! Key sets on disk: layout, atomic saves, rotation and encrypted blobs.

use std::{fs, sync::Arc};

use keyczar_core::{
    Crypter, KeySet, KeyStatus, KeyczarError, MutableKeySet, Signer, StoreError, Verifier,
    store::{EncryptedKeySetReader, EncryptedKeySetWriter, FileKeySet, FileKeySetWriter},
};
use keyczar_crypto::{KeyPurpose, KeyType};

fn hmac_keyset() -> MutableKeySet {
    let mut keyset = MutableKeySet::create("disk", KeyPurpose::SignAndVerify, KeyType::HmacSha1)
        .expect("create");
    keyset.add_key(KeyStatus::Active, None).expect("add");
    keyset.add_key(KeyStatus::Primary, None).expect("add");
    keyset
}

#[test]
fn directory_holds_meta_and_one_file_per_version() {
    let dir = tempfile::tempdir().expect("tempdir");
    let keyset = hmac_keyset();
    keyset.save(&mut FileKeySetWriter::new(dir.path())).expect("save");

    let mut names: Vec<String> = fs::read_dir(dir.path())
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, ["1", "2", "meta"]);

    let meta = fs::read_to_string(dir.path().join("meta")).expect("meta");
    assert!(meta.contains(r#""purpose":"SIGN_AND_VERIFY""#));
    assert!(meta.contains(r#""type":"HMAC_SHA1""#));
    let key = fs::read_to_string(dir.path().join("2")).expect("key");
    assert!(key.contains("hmacKeyString"));
}

#[test]
fn reloaded_key_set_verifies_earlier_signatures() {
    let dir = tempfile::tempdir().expect("tempdir");
    let keyset = hmac_keyset();
    keyset.save(&mut FileKeySetWriter::new(dir.path())).expect("save");

    let signer = Signer::new(KeySet::read(&FileKeySet::new(dir.path())).expect("read"))
        .expect("signer");
    let signature = signer.sign(b"persisted").expect("sign");

    // Rotate on disk, then verify with a fresh load
    let mut rotated = MutableKeySet::read(&FileKeySet::new(dir.path())).expect("read");
    rotated.add_key(KeyStatus::Primary, None).expect("add");
    rotated.save(&mut FileKeySetWriter::new(dir.path()).overwrite(true)).expect("save");

    let reloaded = KeySet::read(&FileKeySet::new(dir.path())).expect("read");
    assert_eq!(reloaded.metadata().primary_version(), Some(3));
    let verifier = Verifier::new(reloaded).expect("verifier");
    assert_eq!(verifier.verify(b"persisted", &signature), Ok(true));
}

#[test]
fn existing_key_set_is_not_replaced_by_default() {
    let dir = tempfile::tempdir().expect("tempdir");
    hmac_keyset().save(&mut FileKeySetWriter::new(dir.path())).expect("save");
    let original = fs::read_to_string(dir.path().join("2")).expect("key");

    let result = hmac_keyset().save(&mut FileKeySetWriter::new(dir.path()));
    assert!(matches!(result, Err(KeyczarError::Store(StoreError::AlreadyExists(_)))));

    // Neither the refused save nor its staged files touched the directory
    assert_eq!(fs::read_to_string(dir.path().join("2")).expect("key"), original);
    assert_eq!(fs::read_dir(dir.path()).expect("read dir").count(), 3);
}

#[test]
fn abandoned_writer_leaves_nothing_behind() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("keys");
    {
        use keyczar_core::KeySetWriter;

        let keyset = hmac_keyset();
        let mut writer = FileKeySetWriter::new(&target);
        writer.write_metadata(keyset.metadata()).expect("stage metadata");
        writer.write_key_data(1, "{}").expect("stage key");
        // Dropped without finish
    }

    assert_eq!(fs::read_dir(&target).expect("read dir").count(), 0);
    assert!(matches!(
        KeySet::read(&FileKeySet::new(&target)),
        Err(KeyczarError::Store(StoreError::NotFound(_)))
    ));
}

#[test]
fn shrinking_save_removes_revoked_version_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut keyset = hmac_keyset();
    keyset.save(&mut FileKeySetWriter::new(dir.path())).expect("save");

    keyset.demote(1).expect("demote");
    keyset.revoke(1).expect("revoke");
    keyset.save(&mut FileKeySetWriter::new(dir.path()).overwrite(true)).expect("save");

    assert!(!dir.path().join("1").exists());
    assert!(dir.path().join("2").exists());
    let reloaded = MutableKeySet::read(&FileKeySet::new(dir.path())).expect("read");
    assert_eq!(reloaded.status(1), Err(KeyczarError::UnknownVersion(1)));
}

#[test]
fn rotation_after_revoking_top_version_never_reuses_its_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut keyset = hmac_keyset();
    keyset.save(&mut FileKeySetWriter::new(dir.path())).expect("save");
    let revoked_data = fs::read_to_string(dir.path().join("2")).expect("key");

    let signer = Signer::new(KeySet::read(&FileKeySet::new(dir.path())).expect("read"))
        .expect("signer");
    let signature = signer.sign(b"signed by version 2").expect("sign");

    keyset.demote(2).expect("demote");
    keyset.demote(2).expect("demote");
    keyset.revoke(2).expect("revoke");
    let added = keyset.add_key(KeyStatus::Primary, None).expect("add");
    assert_eq!(added, 3);

    // The metadata still on disk lists version 2 with its original material,
    // so the save must not stage anything under that name.
    let on_disk = MutableKeySet::read(&FileKeySet::new(dir.path())).expect("read");
    assert!(on_disk.metadata().version(added).is_none());
    assert_eq!(fs::read_to_string(dir.path().join("2")).expect("key"), revoked_data);

    keyset.save(&mut FileKeySetWriter::new(dir.path()).overwrite(true)).expect("save");
    assert!(!dir.path().join("2").exists());
    assert!(dir.path().join("3").exists());

    let reloaded = KeySet::read(&FileKeySet::new(dir.path())).expect("read");
    assert_eq!(reloaded.metadata().primary_version(), Some(3));
    assert_eq!(
        Verifier::new(reloaded).expect("verifier").verify(b"signed by version 2", &signature),
        Ok(false)
    );
}

#[test]
fn encrypted_key_set_on_disk() {
    let wrapping_dir = tempfile::tempdir().expect("tempdir");
    let inner_dir = tempfile::tempdir().expect("tempdir");

    let mut wrapping =
        MutableKeySet::create("wrapping", KeyPurpose::DecryptAndEncrypt, KeyType::Aes)
            .expect("create");
    wrapping.add_key(KeyStatus::Primary, None).expect("add");
    wrapping.save(&mut FileKeySetWriter::new(wrapping_dir.path())).expect("save");
    let crypter = Crypter::new(Arc::new(
        KeySet::read(&FileKeySet::new(wrapping_dir.path())).expect("read"),
    ))
    .expect("crypter");

    let inner = hmac_keyset();
    let mut writer = EncryptedKeySetWriter::new(
        FileKeySetWriter::new(inner_dir.path()),
        crypter.encrypter().clone(),
    );
    inner.save(&mut writer).expect("save");

    let raw = fs::read_to_string(inner_dir.path().join("1")).expect("blob");
    assert!(!raw.contains("hmacKeyString"));
    let meta = fs::read_to_string(inner_dir.path().join("meta")).expect("meta");
    assert!(meta.contains(r#""encrypted":true"#));

    // The plain reader cannot parse the blobs
    assert!(KeySet::read(&FileKeySet::new(inner_dir.path())).is_err());

    let reader = EncryptedKeySetReader::new(FileKeySet::new(inner_dir.path()), crypter);
    let signer = Signer::new(KeySet::read(&reader).expect("read")).expect("signer");
    let signature = signer.sign(b"wrapped").expect("sign");
    assert_eq!(signer.verify(b"wrapped", &signature), Ok(true));
}
