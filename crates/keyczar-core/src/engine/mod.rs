//! Operation engines.
//!
//! Each engine composes key set lookup, envelope framing and key streams into
//! one operation. Engines hold an `Arc<KeySet>` and are cheap to clone.
//!
//! # Candidate Trial
//!
//! Decrypt and verify walk [`KeySet::candidates`] and run the same check
//! against each key until one accepts. A candidate that fails for any reason
//! tied to that key (wrong MAC, bad padding, unusable key data) yields
//! [`CandidateOutcome::TryNext`]; only structural problems with the input or
//! failures of the caller's streams abort the walk.
//!
//! When no key matches the header hash the walk still runs one check with a
//! throwaway HMAC key over the same bytes, so "no such key" and "key found,
//! check failed" take comparable time.

mod attached;
mod encrypter;
mod signer;
mod timeout;
mod unversioned;

use std::io::{self, Read, Seek, SeekFrom};

pub use attached::{AttachedSigner, AttachedVerifier};
pub use encrypter::{Crypter, Encrypter};
use keyczar_crypto::{CryptoError, HmacKey, KeyMaterial, KeyPurpose, Verifiable, VerifyingStream};
use keyczar_proto::ProtocolError;
pub use signer::{Signer, Verifier};
pub use timeout::{TimeoutSigner, TimeoutVerifier};
pub use unversioned::{UnversionedSigner, UnversionedVerifier};
use zeroize::Zeroizing;

use crate::{
    error::KeyczarError,
    keyset::{Candidate, KeySet},
};

/// Result of trying one candidate key.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum CandidateOutcome<T> {
    /// The key checked out
    Accepted(T),
    /// The key did not fit; try the next one
    TryNext,
}

/// One check run against each candidate key.
pub(crate) trait CandidateTrial {
    /// Value produced by the accepting key.
    type Output;

    /// Check the input against `key`.
    fn attempt(
        &mut self,
        version: u32,
        key: &KeyMaterial,
    ) -> Result<CandidateOutcome<Self::Output>, KeyczarError>;

    /// Run a throwaway check over the same input. The answer is ignored.
    fn dummy(&mut self) -> Result<(), KeyczarError>;
}

/// Run `trial` over `candidates` in order until one accepts.
///
/// Errors from the trial abort the walk.
pub(crate) fn try_candidates<T: CandidateTrial>(
    candidates: Vec<Candidate<'_>>,
    trial: &mut T,
) -> Result<Option<T::Output>, KeyczarError> {
    for candidate in candidates {
        match candidate {
            Some((version, key)) => match trial.attempt(version, key)? {
                CandidateOutcome::Accepted(value) => return Ok(Some(value)),
                CandidateOutcome::TryNext => {
                    tracing::trace!(version, "candidate rejected");
                },
            },
            None => trial.dummy()?,
        }
    }
    Ok(None)
}

/// Log a per-key failure and move on.
pub(crate) fn key_miss<T>(version: u32, err: &CryptoError) -> CandidateOutcome<T> {
    tracing::debug!(version, error = %err, "candidate key unusable");
    CandidateOutcome::TryNext
}

/// Verifier whose answer is discarded.
pub(crate) fn dummy_verifier() -> Result<Box<dyn VerifyingStream>, KeyczarError> {
    let key = HmacKey::from_bytes(vec![0u8; 32]);
    Ok(key.verifying_stream(keyczar_crypto::VerifyPolicy::default())?)
}

/// Fail construction unless the key set purpose permits the operation.
pub(crate) fn require_purpose(
    keyset: &KeySet,
    operation: &'static str,
    permits: fn(KeyPurpose) -> bool,
) -> Result<(), KeyczarError> {
    let purpose = keyset.metadata().purpose();
    if permits(purpose) {
        Ok(())
    } else {
        Err(KeyczarError::InvalidKeySetPurpose { expected: operation, actual: purpose })
    }
}

/// Map an envelope parse failure for a signature input.
pub(crate) fn signature_parse_error(err: ProtocolError) -> KeyczarError {
    match err {
        ProtocolError::UnsupportedVersion(version) => {
            KeyczarError::UnsupportedFormatVersion(version)
        },
        _ => KeyczarError::InvalidSignatureData,
    }
}

/// Map an envelope parse failure for a ciphertext input.
pub(crate) fn ciphertext_parse_error(err: ProtocolError) -> KeyczarError {
    match err {
        ProtocolError::UnsupportedVersion(version) => {
            KeyczarError::UnsupportedFormatVersion(version)
        },
        _ => KeyczarError::InvalidCiphertext,
    }
}

/// Feed `reader` to `sink` in chunks of `chunk` bytes until EOF.
pub(crate) fn read_chunks<R: Read + ?Sized>(
    reader: &mut R,
    chunk: usize,
    mut sink: impl FnMut(&[u8]) -> Result<(), KeyczarError>,
) -> Result<u64, KeyczarError> {
    // Plaintext passes through here on the encrypt path.
    let mut buf = Zeroizing::new(vec![0u8; chunk]);
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        sink(&buf[..n])?;
        total += n as u64;
    }
}

/// Message bytes that can be fed to a check more than once.
pub(crate) trait Replay {
    /// Feed every byte of the message to `sink`, from the start.
    fn replay(
        &mut self,
        sink: &mut dyn FnMut(&[u8]) -> Result<(), KeyczarError>,
    ) -> Result<(), KeyczarError>;
}

impl Replay for &[u8] {
    fn replay(
        &mut self,
        sink: &mut dyn FnMut(&[u8]) -> Result<(), KeyczarError>,
    ) -> Result<(), KeyczarError> {
        sink(*self)
    }
}

/// Seekable reader replayed from the position it had when wrapped.
pub(crate) struct ReplayReader<'r, R> {
    reader: &'r mut R,
    start: u64,
    chunk: usize,
}

impl<'r, R: Read + Seek> ReplayReader<'r, R> {
    pub(crate) fn new(reader: &'r mut R, chunk: usize) -> Result<Self, KeyczarError> {
        let start = reader.stream_position()?;
        Ok(Self { reader, start, chunk })
    }
}

impl<R: Read + Seek> Replay for ReplayReader<'_, R> {
    fn replay(
        &mut self,
        sink: &mut dyn FnMut(&[u8]) -> Result<(), KeyczarError>,
    ) -> Result<(), KeyczarError> {
        self.reader.seek(SeekFrom::Start(self.start))?;
        read_chunks(&mut *self.reader, self.chunk, sink)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, io::Cursor};

    use keyczar_crypto::KeyType;

    use super::*;
    use crate::metadata::{KeyMetadata, KeyStatus, KeyVersion};

    fn hmac_set(count: u32) -> KeySet {
        let mut metadata =
            KeyMetadata::new("t", KeyPurpose::SignAndVerify, KeyType::HmacSha1).unwrap();
        let mut keys = BTreeMap::new();
        for version in 1..=count {
            metadata.push_version(KeyVersion::new(version, KeyStatus::Active));
            keys.insert(version, KeyMaterial::generate(KeyType::HmacSha1, None).unwrap());
        }
        KeySet::new(metadata, keys).unwrap()
    }

    /// Accepts one version, records every attempt.
    struct Probe {
        accept: Option<u32>,
        tried: Vec<u32>,
        dummies: usize,
        fail: bool,
    }

    impl Probe {
        fn accepting(accept: Option<u32>) -> Self {
            Self { accept, tried: Vec::new(), dummies: 0, fail: false }
        }
    }

    impl CandidateTrial for Probe {
        type Output = u32;

        fn attempt(
            &mut self,
            version: u32,
            _key: &KeyMaterial,
        ) -> Result<CandidateOutcome<u32>, KeyczarError> {
            if self.fail {
                return Err(KeyczarError::Io("reader failed".into()));
            }
            self.tried.push(version);
            Ok(if self.accept == Some(version) {
                CandidateOutcome::Accepted(version)
            } else {
                CandidateOutcome::TryNext
            })
        }

        fn dummy(&mut self) -> Result<(), KeyczarError> {
            self.dummies += 1;
            Ok(())
        }
    }

    fn all_candidates(set: &KeySet) -> Vec<Candidate<'_>> {
        set.keys().map(|(v, _, k)| Some((v, k))).collect()
    }

    #[test]
    fn stops_at_first_accepted() {
        let set = hmac_set(3);
        let mut probe = Probe::accepting(Some(2));
        let result = try_candidates(all_candidates(&set), &mut probe).unwrap();
        assert_eq!(result, Some(2));
        assert_eq!(probe.tried, vec![1, 2]);
    }

    #[test]
    fn exhausted_candidates_yield_none() {
        let set = hmac_set(2);
        let mut probe = Probe::accepting(None);
        assert_eq!(try_candidates(all_candidates(&set), &mut probe).unwrap(), None);
        assert_eq!(probe.tried, vec![1, 2]);
        assert_eq!(probe.dummies, 0);
    }

    #[test]
    fn dummy_runs_for_absent_candidate() {
        let mut probe = Probe::accepting(Some(1));
        assert_eq!(try_candidates(vec![None], &mut probe).unwrap(), None);
        assert_eq!(probe.dummies, 1);
        assert!(probe.tried.is_empty());
    }

    #[test]
    fn errors_abort_the_walk() {
        let set = hmac_set(2);
        let mut probe = Probe { fail: true, ..Probe::accepting(Some(2)) };
        assert_eq!(
            try_candidates(all_candidates(&set), &mut probe),
            Err(KeyczarError::Io("reader failed".into()))
        );
    }

    #[test]
    fn purpose_check() {
        let set = hmac_set(1);
        assert!(require_purpose(&set, "sign", KeyPurpose::can_sign).is_ok());
        assert_eq!(
            require_purpose(&set, "encrypt", KeyPurpose::can_encrypt),
            Err(KeyczarError::InvalidKeySetPurpose {
                expected: "encrypt",
                actual: KeyPurpose::SignAndVerify
            })
        );
    }

    #[test]
    fn replay_reader_restarts_from_initial_position() {
        let mut cursor = Cursor::new(b"xxhello".to_vec());
        cursor.set_position(2);
        let mut replay = ReplayReader::new(&mut cursor, 2).unwrap();

        for _ in 0..2 {
            let mut seen = Vec::new();
            replay
                .replay(&mut |chunk| {
                    assert!(chunk.len() <= 2);
                    seen.extend_from_slice(chunk);
                    Ok(())
                })
                .unwrap();
            assert_eq!(seen, b"hello");
        }
    }

    #[test]
    fn parse_error_mapping() {
        let short = ProtocolError::EnvelopeTooShort { expected: 5, actual: 1 };
        assert_eq!(signature_parse_error(short.clone()), KeyczarError::InvalidSignatureData);
        assert_eq!(ciphertext_parse_error(short), KeyczarError::InvalidCiphertext);
        assert_eq!(
            ciphertext_parse_error(ProtocolError::UnsupportedVersion(2)),
            KeyczarError::UnsupportedFormatVersion(2)
        );
    }
}
