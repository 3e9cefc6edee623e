//! Key blobs encrypted under another key set.
//!
//! Each version blob is the websafe base64 of a ciphertext whose plaintext is
//! the key JSON. Metadata stays in the clear with `encrypted` set.

use keyczar_crypto::encoding::{decode_websafe, encode_websafe};
use zeroize::Zeroizing;

use super::{KeySetReader, KeySetWriter, StoreError};
use crate::{
    engine::{Crypter, Encrypter},
    metadata::KeyMetadata,
};

/// Reader that decrypts every key blob of an inner reader.
#[derive(Debug)]
pub struct EncryptedKeySetReader<R> {
    reader: R,
    crypter: Crypter,
}

impl<R: KeySetReader> EncryptedKeySetReader<R> {
    /// Wrap `reader`, opening blobs with `crypter`.
    pub fn new(reader: R, crypter: Crypter) -> Self {
        Self { reader, crypter }
    }
}

impl<R: KeySetReader> KeySetReader for EncryptedKeySetReader<R> {
    fn metadata(&self) -> Result<KeyMetadata, StoreError> {
        self.reader.metadata()
    }

    fn key_data(&self, version: u32) -> Result<String, StoreError> {
        let blob = self.reader.key_data(version)?;
        let ciphertext = decode_websafe(blob.trim())
            .map_err(|err| StoreError::Decryption(format!("version {version}: {err}")))?;
        let plaintext = Zeroizing::new(
            self.crypter
                .decrypt(&ciphertext)
                .map_err(|err| StoreError::Decryption(format!("version {version}: {err}")))?,
        );
        String::from_utf8(plaintext.to_vec())
            .map_err(|_| StoreError::Decryption(format!("version {version}: key data is not UTF-8")))
    }
}

/// Writer that encrypts every key blob before staging it in an inner writer.
#[derive(Debug)]
pub struct EncryptedKeySetWriter<W> {
    writer: W,
    encrypter: Encrypter,
}

impl<W: KeySetWriter> EncryptedKeySetWriter<W> {
    /// Wrap `writer`, sealing blobs with `encrypter`.
    pub fn new(writer: W, encrypter: Encrypter) -> Self {
        Self { writer, encrypter }
    }

    /// Inner writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: KeySetWriter> KeySetWriter for EncryptedKeySetWriter<W> {
    fn write_metadata(&mut self, metadata: &KeyMetadata) -> Result<(), StoreError> {
        let mut metadata = metadata.clone();
        metadata.set_encrypted(true);
        self.writer.write_metadata(&metadata)
    }

    fn write_key_data(&mut self, version: u32, data: &str) -> Result<(), StoreError> {
        let ciphertext = self
            .encrypter
            .encrypt(data.as_bytes())
            .map_err(|err| StoreError::Serialization(format!("version {version}: {err}")))?;
        self.writer.write_key_data(version, &encode_websafe(&ciphertext))
    }

    fn finish(&mut self) -> Result<(), StoreError> {
        self.writer.finish()
    }
}
