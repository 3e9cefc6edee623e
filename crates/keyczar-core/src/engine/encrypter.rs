//! Encryption and decryption.
//!
//! ```text
//! ciphertext = header || key ciphertext || trailer
//! ```
//!
//! The key ciphertext layout belongs to the key type (IV and CBC blocks for
//! AES, nonce and tagged GCM output for AEAD, one OAEP block for RSA). Keys
//! with a separate authenticator append a trailer computed over
//! `header || key ciphertext`; AEAD keys take the header as associated data
//! instead.
//!
//! Compression, when configured, applies to the plaintext on both sides.

use std::{
    io::{self, Cursor, Read, Seek, SeekFrom, Write},
    sync::Arc,
};

use keyczar_crypto::{
    CipherStream, CryptoError, Decryptable, KeyMaterial, KeyPurpose, SigningStream,
};
use keyczar_proto::{EnvelopeHeader, HEADER_SIZE};
use zeroize::Zeroizing;

use super::{
    CandidateOutcome, CandidateTrial, ciphertext_parse_error, dummy_verifier, key_miss,
    read_chunks, require_purpose, try_candidates,
};
use crate::{
    compression::{Compressor, Decompressor},
    config::{CompressionMode, KeyczarConfig},
    error::KeyczarError,
    keyset::KeySet,
};

/// Trailer length assumed by the dummy check when no key matched.
const DUMMY_TRAILER_SIZE: u64 = 20;

/// Encrypts with the primary key of a key set.
#[derive(Debug, Clone)]
pub struct Encrypter {
    keyset: Arc<KeySet>,
    config: KeyczarConfig,
}

impl Encrypter {
    /// Encrypter with default configuration.
    ///
    /// # Errors
    ///
    /// `InvalidKeySetPurpose` unless the key set can encrypt.
    pub fn new(keyset: impl Into<Arc<KeySet>>) -> Result<Self, KeyczarError> {
        Self::with_config(keyset, KeyczarConfig::default())
    }

    /// Encrypter with explicit configuration.
    pub fn with_config(
        keyset: impl Into<Arc<KeySet>>,
        config: KeyczarConfig,
    ) -> Result<Self, KeyczarError> {
        let keyset = keyset.into();
        require_purpose(&keyset, "encrypt", KeyPurpose::can_encrypt)?;
        Ok(Self { keyset, config })
    }

    /// Underlying key set.
    pub fn keyset(&self) -> &KeySet {
        &self.keyset
    }

    /// Engine configuration.
    pub fn config(&self) -> &KeyczarConfig {
        &self.config
    }

    /// Encrypt `plaintext` with the primary key.
    ///
    /// Output is randomized: encrypting the same plaintext twice gives
    /// different ciphertexts.
    ///
    /// # Errors
    ///
    /// - `MissingPrimaryKey` if no version is primary
    /// - `Crypto(InputTooLarge)` if the plaintext exceeds what an RSA key
    ///   can hold
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeyczarError> {
        let mut input = plaintext;
        let mut output = Vec::new();
        self.encrypt_stream(&mut input, &mut output)?;
        Ok(output)
    }

    /// Encrypt everything `input` yields into `output`.
    ///
    /// On error `output` may hold a partial ciphertext.
    pub fn encrypt_stream<R: Read + ?Sized, W: Write>(
        &self,
        input: &mut R,
        output: &mut W,
    ) -> Result<(), KeyczarError> {
        let (version, key) = self.keyset.primary()?;
        let encryptable =
            key.as_encryptable().ok_or(CryptoError::UnsupportedOperation("encrypt"))?;

        let header = EnvelopeHeader::new(key.key_hash()).to_bytes();
        let cipher = encryptable.encrypting_stream(&header)?;
        let mut auth = encryptable.auth_signing_stream()?;

        output.write_all(&header)?;
        if let Some(auth) = auth.as_mut() {
            auth.update(&header);
        }

        let sink = CipherSink { cipher, auth, output, scratch: Vec::new() };
        let mut compressor = Compressor::new(self.config.compression, sink);
        let consumed = read_chunks(input, self.config.chunk_size(), |chunk| {
            compressor.write_all(chunk).map_err(KeyczarError::from)
        })?;
        compressor.finish()?.finish()?;

        tracing::trace!(version, plaintext_len = consumed, "encrypted");
        Ok(())
    }
}

/// Encrypts through the key cipher and appends the authenticator.
struct CipherSink<W> {
    cipher: Box<dyn CipherStream>,
    auth: Option<Box<dyn SigningStream>>,
    output: W,
    scratch: Vec<u8>,
}

impl<W: Write> CipherSink<W> {
    fn emit(&mut self) -> io::Result<()> {
        if let Some(auth) = self.auth.as_mut() {
            auth.update(&self.scratch);
        }
        self.output.write_all(&self.scratch)
    }

    fn finish(mut self) -> Result<W, KeyczarError> {
        self.scratch.clear();
        let Self { cipher, auth, mut output, scratch } = self;

        let mut last = scratch;
        cipher.finish(&mut last)?;
        let mut auth = auth;
        if let Some(auth) = auth.as_mut() {
            auth.update(&last);
        }
        output.write_all(&last)?;
        if let Some(auth) = auth {
            output.write_all(&auth.finish()?)?;
        }
        Ok(output)
    }
}

impl<W: Write> Write for CipherSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.scratch.clear();
        self.cipher
            .update(buf, &mut self.scratch)
            .map_err(|err| io::Error::from(KeyczarError::Crypto(err)))?;
        self.emit()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}

/// Encrypts with the primary key and decrypts with any key of the set.
#[derive(Debug, Clone)]
pub struct Crypter {
    encrypter: Encrypter,
}

impl Crypter {
    /// Crypter with default configuration.
    ///
    /// # Errors
    ///
    /// `InvalidKeySetPurpose` unless the key set can decrypt.
    pub fn new(keyset: impl Into<Arc<KeySet>>) -> Result<Self, KeyczarError> {
        Self::with_config(keyset, KeyczarConfig::default())
    }

    /// Crypter with explicit configuration.
    pub fn with_config(
        keyset: impl Into<Arc<KeySet>>,
        config: KeyczarConfig,
    ) -> Result<Self, KeyczarError> {
        let keyset = keyset.into();
        require_purpose(&keyset, "decrypt", KeyPurpose::can_decrypt)?;
        Ok(Self { encrypter: Encrypter::with_config(keyset, config)? })
    }

    /// Underlying key set.
    pub fn keyset(&self) -> &KeySet {
        self.encrypter.keyset()
    }

    /// Encrypting half of this crypter.
    pub fn encrypter(&self) -> &Encrypter {
        &self.encrypter
    }

    /// Encrypt `plaintext` with the primary key.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeyczarError> {
        self.encrypter.encrypt(plaintext)
    }

    /// Encrypt everything `input` yields into `output`.
    pub fn encrypt_stream<R: Read + ?Sized, W: Write>(
        &self,
        input: &mut R,
        output: &mut W,
    ) -> Result<(), KeyczarError> {
        self.encrypter.encrypt_stream(input, output)
    }

    /// Decrypt `ciphertext` with whichever key produced it.
    ///
    /// # Errors
    ///
    /// - `InvalidCiphertext` if the input is truncated, was tampered with, or
    ///   no key in the set opens it
    /// - `UnsupportedFormatVersion` for an unknown format byte
    /// - `Compression` if the plaintext does not inflate under the
    ///   configured mode
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, KeyczarError> {
        let mut input = Cursor::new(ciphertext);
        let mut output = Vec::new();
        self.decrypt_stream(&mut input, &mut output)?;
        Ok(output)
    }

    /// Decrypt the ciphertext `input` holds from its current position to
    /// its end, writing plaintext to `output`.
    ///
    /// Keys with an authenticator are checked over the whole input before any
    /// plaintext is written. On error `output` may still hold a partial
    /// plaintext for keys without one.
    pub fn decrypt_stream<R: Read + Seek, W: Write>(
        &self,
        input: &mut R,
        output: &mut W,
    ) -> Result<(), KeyczarError> {
        let start = input.stream_position()?;
        let end = input.seek(SeekFrom::End(0))?;
        let total = end.saturating_sub(start);
        input.seek(SeekFrom::Start(start))?;

        let mut header = [0u8; HEADER_SIZE];
        let header_len = usize::try_from(total).unwrap_or(HEADER_SIZE).min(HEADER_SIZE);
        read_exact_ciphertext(input, &mut header[..header_len])?;
        let key_hash = EnvelopeHeader::from_bytes(&header[..header_len])
            .map_err(ciphertext_parse_error)?
            .key_hash();

        let config = self.encrypter.config();
        let mut trial = DecryptTrial {
            input,
            output,
            header,
            body_start: start + HEADER_SIZE as u64,
            body_len: total - HEADER_SIZE as u64,
            chunk: config.chunk_size(),
            compression: config.compression,
        };
        match try_candidates(self.keyset().candidates(key_hash), &mut trial)? {
            Some(version) => {
                tracing::trace!(version, ciphertext_len = total, "decrypted");
                Ok(())
            },
            None => {
                tracing::debug!(key_hash = key_hash.as_u32(), "no key opened ciphertext");
                Err(KeyczarError::InvalidCiphertext)
            },
        }
    }
}

/// Opens one ciphertext with each candidate key.
struct DecryptTrial<'a, R, W> {
    input: &'a mut R,
    output: &'a mut W,
    header: [u8; HEADER_SIZE],
    body_start: u64,
    body_len: u64,
    chunk: usize,
    compression: CompressionMode,
}

impl<R: Read + Seek, W: Write> DecryptTrial<'_, R, W> {
    /// Feed `len` bytes starting at `offset` to `sink`.
    fn stream_range(
        &mut self,
        offset: u64,
        len: u64,
        mut sink: impl FnMut(&[u8]) -> Result<(), KeyczarError>,
    ) -> Result<(), KeyczarError> {
        stream_range(self.input, offset, len, self.chunk, &mut sink)
    }

    /// Read `len` bytes starting at `offset`.
    fn read_range(&mut self, offset: u64, len: u64) -> Result<Vec<u8>, KeyczarError> {
        let len = usize::try_from(len).map_err(|_| KeyczarError::InvalidCiphertext)?;
        let mut bytes = vec![0u8; len];
        self.input.seek(SeekFrom::Start(offset))?;
        read_exact_ciphertext(self.input, &mut bytes)?;
        Ok(bytes)
    }

    /// Check the trailer over `header || ciphertext`. `None` means the key
    /// has no separate authenticator.
    fn authenticate(
        &mut self,
        version: u32,
        key: &dyn Decryptable,
        cipher_len: u64,
    ) -> Result<Option<CandidateOutcome<u32>>, KeyczarError> {
        let mut verifier = match key.auth_verifying_stream() {
            Ok(Some(verifier)) => verifier,
            Ok(None) => return Ok(None),
            Err(err) => return Ok(Some(key_miss(version, &err))),
        };
        verifier.update(&self.header);
        self.stream_range(self.body_start, cipher_len, |chunk| {
            verifier.update(chunk);
            Ok(())
        })?;
        let trailer = self.read_range(self.body_start + cipher_len, self.body_len - cipher_len)?;
        if verifier.verify(&trailer) {
            Ok(Some(CandidateOutcome::Accepted(version)))
        } else {
            tracing::trace!(version, "ciphertext authenticator mismatch");
            Ok(Some(CandidateOutcome::TryNext))
        }
    }

    /// Decrypt the key ciphertext into the output, inflating if configured.
    fn decrypt_body(
        &mut self,
        version: u32,
        key: &dyn Decryptable,
        cipher_len: u64,
        authenticated: bool,
    ) -> Result<CandidateOutcome<u32>, KeyczarError> {
        let mut cipher = match key.decrypting_stream(&self.header) {
            Ok(cipher) => cipher,
            Err(err) => return Ok(key_miss(version, &err)),
        };

        let compression = self.compression;
        let mut sink = Decompressor::new(compression, &mut *self.output);
        let mut plaintext = Zeroizing::new(Vec::new());
        let mut emitted = false;

        let fed = stream_range(self.input, self.body_start, cipher_len, self.chunk, &mut |chunk| {
            plaintext.clear();
            cipher.update(chunk, &mut plaintext)?;
            if !plaintext.is_empty() {
                emitted = true;
                sink.write_all(&plaintext).map_err(|err| inflate_error(compression, err))?;
            }
            Ok(())
        });
        match fed {
            Ok(()) => {},
            Err(KeyczarError::Crypto(err)) => {
                return cipher_failure(version, &err, emitted || authenticated);
            },
            Err(err) => return Err(err),
        }

        plaintext.clear();
        if let Err(err) = cipher.finish(&mut plaintext) {
            return cipher_failure(version, &err, emitted || authenticated);
        }
        sink.write_all(&plaintext).map_err(|err| inflate_error(compression, err))?;
        sink.finish().map_err(|err| inflate_error(compression, err))?;
        Ok(CandidateOutcome::Accepted(version))
    }
}

impl<R: Read + Seek, W: Write> CandidateTrial for DecryptTrial<'_, R, W> {
    type Output = u32;

    fn attempt(
        &mut self,
        version: u32,
        key: &KeyMaterial,
    ) -> Result<CandidateOutcome<u32>, KeyczarError> {
        let Some(decryptable) = key.as_decryptable() else {
            return Ok(CandidateOutcome::TryNext);
        };
        let trailer = decryptable.trailer_size() as u64;
        if self.body_len < trailer {
            tracing::trace!(version, "ciphertext shorter than trailer");
            return Ok(CandidateOutcome::TryNext);
        }
        let cipher_len = self.body_len - trailer;

        let authenticated = match self.authenticate(version, decryptable, cipher_len)? {
            Some(CandidateOutcome::TryNext) => return Ok(CandidateOutcome::TryNext),
            Some(CandidateOutcome::Accepted(_)) => true,
            None => false,
        };
        self.decrypt_body(version, decryptable, cipher_len, authenticated)
    }

    fn dummy(&mut self) -> Result<(), KeyczarError> {
        let trailer = self.body_len.min(DUMMY_TRAILER_SIZE);
        let cipher_len = self.body_len - trailer;
        let mut verifier = dummy_verifier()?;
        verifier.update(&self.header);
        self.stream_range(self.body_start, cipher_len, |chunk| {
            verifier.update(chunk);
            Ok(())
        })?;
        let tag = self.read_range(self.body_start + cipher_len, trailer)?;
        let _ = verifier.verify(&tag);
        Ok(())
    }
}

/// A cipher error before any plaintext left the trial means this key does
/// not fit. Once an authenticated key failed or output was written, the
/// ciphertext itself is bad.
fn cipher_failure(
    version: u32,
    err: &CryptoError,
    committed: bool,
) -> Result<CandidateOutcome<u32>, KeyczarError> {
    if committed {
        tracing::debug!(version, error = %err, "decryption failed after commit");
        Err(KeyczarError::InvalidCiphertext)
    } else {
        Ok(key_miss(version, err))
    }
}

fn inflate_error(mode: CompressionMode, err: io::Error) -> KeyczarError {
    let from_data = matches!(err.kind(), io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput);
    let ours = err.get_ref().is_some_and(|inner| inner.is::<KeyczarError>());
    if mode != CompressionMode::None && from_data && !ours {
        KeyczarError::Compression(err.to_string())
    } else {
        err.into()
    }
}

fn stream_range<R: Read + Seek>(
    input: &mut R,
    offset: u64,
    len: u64,
    chunk: usize,
    sink: &mut dyn FnMut(&[u8]) -> Result<(), KeyczarError>,
) -> Result<(), KeyczarError> {
    input.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; chunk];
    let mut remaining = len;
    while remaining > 0 {
        let n = usize::try_from(remaining).map_or(chunk, |left| left.min(chunk));
        read_exact_ciphertext(input, &mut buf[..n])?;
        sink(&buf[..n])?;
        remaining -= n as u64;
    }
    Ok(())
}

/// `read_exact` where running out of input means a truncated ciphertext.
fn read_exact_ciphertext<R: Read + ?Sized>(
    input: &mut R,
    buf: &mut [u8],
) -> Result<(), KeyczarError> {
    input.read_exact(buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => KeyczarError::InvalidCiphertext,
        _ => err.into(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use keyczar_crypto::KeyType;

    use super::*;
    use crate::metadata::{KeyMetadata, KeyStatus, KeyVersion};

    fn keyset(key_type: KeyType, statuses: &[KeyStatus]) -> Arc<KeySet> {
        let mut metadata =
            KeyMetadata::new("crypt", KeyPurpose::DecryptAndEncrypt, key_type).unwrap();
        let mut keys = BTreeMap::new();
        for (i, status) in statuses.iter().enumerate() {
            let version = i as u32 + 1;
            metadata.push_version(KeyVersion::new(version, *status));
            keys.insert(version, KeyMaterial::generate(key_type, None).unwrap());
        }
        Arc::new(KeySet::new(metadata, keys).unwrap())
    }

    fn crypter_with(key_type: KeyType, statuses: &[KeyStatus], config: KeyczarConfig) -> Crypter {
        Crypter::with_config(keyset(key_type, statuses), config).unwrap()
    }

    fn crypter() -> Crypter {
        crypter_with(KeyType::Aes, &[KeyStatus::Primary], KeyczarConfig::default())
    }

    #[test]
    fn round_trip() {
        let crypter = crypter();
        let ciphertext = crypter.encrypt(b"This is some test data").unwrap();
        assert_eq!(ciphertext[0], 0);
        assert_eq!(&ciphertext[1..5], crypter.keyset().primary().unwrap().1.key_hash().as_bytes());
        assert_eq!(crypter.decrypt(&ciphertext).unwrap(), b"This is some test data");
    }

    #[test]
    fn aes_layout() {
        let crypter = crypter();
        // header, IV, one padded block, HMAC trailer
        assert_eq!(crypter.encrypt(b"").unwrap().len(), 5 + 16 + 16 + 20);
        assert_eq!(crypter.encrypt(&[7u8; 16]).unwrap().len(), 5 + 16 + 32 + 20);
    }

    #[test]
    fn ciphertexts_differ() {
        let crypter = crypter();
        assert_ne!(crypter.encrypt(b"same").unwrap(), crypter.encrypt(b"same").unwrap());
    }

    #[test]
    fn small_buffer_streams_many_chunks() {
        let config = KeyczarConfig { buffer_size: 3, ..KeyczarConfig::default() };
        let crypter = crypter_with(KeyType::Aes, &[KeyStatus::Primary], config);
        let data = b"streamed through tiny buffers".repeat(7);
        let ciphertext = crypter.encrypt(&data).unwrap();
        assert_eq!(crypter.decrypt(&ciphertext).unwrap(), data);
    }

    #[test]
    fn decrypts_from_stream_position() {
        let crypter = crypter();
        let ciphertext = crypter.encrypt(b"positioned").unwrap();
        let mut framed = b"junk".to_vec();
        framed.extend_from_slice(&ciphertext);

        let mut input = Cursor::new(framed);
        input.set_position(4);
        let mut output = Vec::new();
        crypter.decrypt_stream(&mut input, &mut output).unwrap();
        assert_eq!(output, b"positioned");
    }

    #[test]
    fn short_input_is_invalid_ciphertext() {
        let crypter = crypter();
        assert_eq!(crypter.decrypt(&[]), Err(KeyczarError::InvalidCiphertext));
        assert_eq!(crypter.decrypt(&[0, 1, 2]), Err(KeyczarError::InvalidCiphertext));
    }

    #[test]
    fn unknown_format_byte() {
        let crypter = crypter();
        let mut ciphertext = crypter.encrypt(b"x").unwrap();
        ciphertext[0] = 1;
        assert_eq!(crypter.decrypt(&ciphertext), Err(KeyczarError::UnsupportedFormatVersion(1)));
    }

    #[test]
    fn tampering_is_detected() {
        let crypter = crypter();
        let ciphertext = crypter.encrypt(b"This is some test data").unwrap();
        for i in 0..ciphertext.len() {
            let mut tampered = ciphertext.clone();
            tampered[i] ^= 0x01;
            assert!(crypter.decrypt(&tampered).is_err(), "byte {i}");
        }
        assert_eq!(
            crypter.decrypt(&ciphertext[..ciphertext.len() - 1]),
            Err(KeyczarError::InvalidCiphertext)
        );
    }

    #[test]
    fn unknown_key_hash_runs_dummy_and_fails() {
        let crypter = crypter();
        let mut ciphertext = crypter.encrypt(b"x").unwrap();
        ciphertext[1..5].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(crypter.decrypt(&ciphertext), Err(KeyczarError::InvalidCiphertext));
    }

    #[test]
    fn gcm_round_trip() {
        let crypter = crypter_with(KeyType::AesGcm, &[KeyStatus::Primary], KeyczarConfig::default());
        let ciphertext = crypter.encrypt(b"aead").unwrap();
        assert_eq!(crypter.decrypt(&ciphertext).unwrap(), b"aead");

        let mut tampered = ciphertext.clone();
        tampered[3] ^= 0x01;
        assert_eq!(crypter.decrypt(&tampered), Err(KeyczarError::InvalidCiphertext));
    }

    #[test]
    fn compression_modes_round_trip() {
        let data = b"compressible ".repeat(200);
        for mode in [CompressionMode::Gzip, CompressionMode::Zlib] {
            let crypter =
                crypter_with(KeyType::Aes, &[KeyStatus::Primary], KeyczarConfig::with_compression(mode));
            let ciphertext = crypter.encrypt(&data).unwrap();
            assert!(ciphertext.len() < data.len(), "{mode:?}");
            assert_eq!(crypter.decrypt(&ciphertext).unwrap(), data, "{mode:?}");
        }
    }

    #[test]
    fn mismatched_compression_is_reported() {
        let keyset = keyset(KeyType::Aes, &[KeyStatus::Primary]);
        let plain = Crypter::new(Arc::clone(&keyset)).unwrap();
        let gzip =
            Crypter::with_config(keyset, KeyczarConfig::with_compression(CompressionMode::Gzip))
                .unwrap();
        let ciphertext = plain.encrypt(b"not gzip at all").unwrap();
        assert!(matches!(gzip.decrypt(&ciphertext), Err(KeyczarError::Compression(_))));
    }

    #[test]
    fn purpose_is_checked() {
        let mut metadata =
            KeyMetadata::new("sign", KeyPurpose::SignAndVerify, KeyType::HmacSha1).unwrap();
        metadata.push_version(KeyVersion::new(1, KeyStatus::Primary));
        let keys = BTreeMap::from([(1, KeyMaterial::generate(KeyType::HmacSha1, None).unwrap())]);
        let keyset = KeySet::new(metadata, keys).unwrap();
        assert!(matches!(
            Crypter::new(keyset),
            Err(KeyczarError::InvalidKeySetPurpose { expected: "decrypt", .. })
        ));
    }

    #[test]
    fn missing_primary() {
        let crypter = crypter_with(KeyType::Aes, &[KeyStatus::Active], KeyczarConfig::default());
        assert_eq!(crypter.encrypt(b"x"), Err(KeyczarError::MissingPrimaryKey));
    }
}
