//! Detached signatures.
//!
//! ```text
//! signature envelope = header || raw signature
//! signed bytes       = message || format byte
//! ```

use std::{
    io::{Read, Seek},
    sync::Arc,
};

use keyczar_crypto::{CryptoError, KeyMaterial, KeyPurpose, VerifyPolicy, VerifyingStream};
use keyczar_proto::{EnvelopeHeader, FORMAT_BYTES, SignedEnvelope};

use super::{
    CandidateOutcome, CandidateTrial, Replay, ReplayReader, dummy_verifier, key_miss,
    read_chunks, require_purpose, signature_parse_error, try_candidates,
};
use crate::{config::KeyczarConfig, error::KeyczarError, keyset::KeySet};

/// Checks one signature against each candidate key.
///
/// The verifier is fed `prefix || message || suffix`; callers put the format
/// byte (and any hidden data) in `suffix`.
pub(crate) struct SignatureTrial<'a, M> {
    pub(crate) prefix: &'a [u8],
    pub(crate) message: M,
    pub(crate) suffix: &'a [u8],
    pub(crate) signature: &'a [u8],
    pub(crate) policy: VerifyPolicy,
}

impl<M: Replay> SignatureTrial<'_, M> {
    fn feed(&mut self, stream: &mut dyn VerifyingStream) -> Result<(), KeyczarError> {
        stream.update(self.prefix);
        self.message.replay(&mut |chunk| {
            stream.update(chunk);
            Ok(())
        })?;
        stream.update(self.suffix);
        Ok(())
    }
}

impl<M: Replay> CandidateTrial for SignatureTrial<'_, M> {
    type Output = ();

    fn attempt(
        &mut self,
        version: u32,
        key: &KeyMaterial,
    ) -> Result<CandidateOutcome<()>, KeyczarError> {
        let Some(verifiable) = key.as_verifiable() else {
            return Ok(CandidateOutcome::TryNext);
        };
        let mut stream = match verifiable.verifying_stream(self.policy) {
            Ok(stream) => stream,
            Err(err) => return Ok(key_miss(version, &err)),
        };
        self.feed(stream.as_mut())?;
        Ok(if stream.verify(self.signature) {
            CandidateOutcome::Accepted(())
        } else {
            CandidateOutcome::TryNext
        })
    }

    fn dummy(&mut self) -> Result<(), KeyczarError> {
        let mut stream = dummy_verifier()?;
        self.feed(stream.as_mut())?;
        let _ = stream.verify(self.signature);
        Ok(())
    }
}

/// Verifies signatures against every key in a key set.
#[derive(Debug, Clone)]
pub struct Verifier {
    keyset: Arc<KeySet>,
    config: KeyczarConfig,
}

impl Verifier {
    /// Verifier with default configuration.
    ///
    /// # Errors
    ///
    /// `InvalidKeySetPurpose` unless the key set can verify.
    pub fn new(keyset: impl Into<Arc<KeySet>>) -> Result<Self, KeyczarError> {
        Self::with_config(keyset, KeyczarConfig::default())
    }

    /// Verifier with explicit configuration.
    pub fn with_config(
        keyset: impl Into<Arc<KeySet>>,
        config: KeyczarConfig,
    ) -> Result<Self, KeyczarError> {
        let keyset = keyset.into();
        require_purpose(&keyset, "verify", KeyPurpose::can_verify)?;
        Ok(Self { keyset, config })
    }

    /// Underlying key set.
    pub fn keyset(&self) -> &KeySet {
        &self.keyset
    }

    pub(crate) fn policy(&self) -> VerifyPolicy {
        VerifyPolicy { strict_dsa: self.config.strict_dsa_verification }
    }

    pub(crate) fn chunk_size(&self) -> usize {
        self.config.chunk_size()
    }

    /// Check `signature` over `data`.
    ///
    /// A wrong signature is `Ok(false)`.
    ///
    /// # Errors
    ///
    /// - `InvalidSignatureData` if `signature` is shorter than a header
    /// - `UnsupportedFormatVersion` for an unknown format byte
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool, KeyczarError> {
        self.verify_message(data, signature)
    }

    /// Check `signature` over everything `data` yields from its current
    /// position. The reader is rewound for each candidate key.
    pub fn verify_stream<R: Read + Seek>(
        &self,
        data: &mut R,
        signature: &[u8],
    ) -> Result<bool, KeyczarError> {
        let replay = ReplayReader::new(data, self.chunk_size())?;
        self.verify_message(replay, signature)
    }

    fn verify_message(&self, message: impl Replay, signature: &[u8]) -> Result<bool, KeyczarError> {
        let envelope = SignedEnvelope::parse(signature).map_err(signature_parse_error)?;
        let mut trial = SignatureTrial {
            prefix: &[],
            message,
            suffix: &FORMAT_BYTES,
            signature: envelope.signature,
            policy: self.policy(),
        };
        let accepted = try_candidates(self.keyset.candidates(envelope.key_hash()), &mut trial)?;
        Ok(accepted.is_some())
    }
}

/// Produces detached signatures with the primary key.
#[derive(Debug, Clone)]
pub struct Signer {
    verifier: Verifier,
}

impl Signer {
    /// Signer with default configuration.
    ///
    /// # Errors
    ///
    /// `InvalidKeySetPurpose` unless the key set can sign.
    pub fn new(keyset: impl Into<Arc<KeySet>>) -> Result<Self, KeyczarError> {
        Self::with_config(keyset, KeyczarConfig::default())
    }

    /// Signer with explicit configuration.
    pub fn with_config(
        keyset: impl Into<Arc<KeySet>>,
        config: KeyczarConfig,
    ) -> Result<Self, KeyczarError> {
        let keyset = keyset.into();
        require_purpose(&keyset, "sign", KeyPurpose::can_sign)?;
        Ok(Self { verifier: Verifier::with_config(keyset, config)? })
    }

    /// Underlying key set.
    pub fn keyset(&self) -> &KeySet {
        self.verifier.keyset()
    }

    /// Verifier over the same key set.
    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// Sign `data`.
    ///
    /// # Errors
    ///
    /// `MissingPrimaryKey` if no version is primary.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, KeyczarError> {
        let mut input = data;
        self.sign_stream(&mut input)
    }

    /// Sign everything `data` yields.
    pub fn sign_stream<R: Read>(&self, data: &mut R) -> Result<Vec<u8>, KeyczarError> {
        let (header, signature) = sign_with_primary(
            self.keyset(),
            self.verifier.chunk_size(),
            &[],
            data,
            &FORMAT_BYTES,
        )?;
        Ok(SignedEnvelope { header, signature: &signature }.to_vec())
    }

    /// Check `signature` over `data`.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool, KeyczarError> {
        self.verifier.verify(data, signature)
    }
}

/// Sign `prefix || data || suffix` with the primary key.
pub(crate) fn sign_with_primary<R: Read + ?Sized>(
    keyset: &KeySet,
    chunk: usize,
    prefix: &[u8],
    data: &mut R,
    suffix: &[u8],
) -> Result<(EnvelopeHeader, Vec<u8>), KeyczarError> {
    let (version, key) = keyset.primary()?;
    let signature = sign_raw(key, chunk, prefix, data, suffix)?;
    tracing::trace!(version, "signed");
    Ok((EnvelopeHeader::new(key.key_hash()), signature))
}

/// Sign `prefix || data || suffix` with `key`, without any framing.
pub(crate) fn sign_raw<R: Read + ?Sized>(
    key: &KeyMaterial,
    chunk: usize,
    prefix: &[u8],
    data: &mut R,
    suffix: &[u8],
) -> Result<Vec<u8>, KeyczarError> {
    let signable = key.as_signable().ok_or(CryptoError::UnsupportedOperation("sign"))?;
    let mut stream = signable.signing_stream()?;
    stream.update(prefix);
    read_chunks(data, chunk, |bytes| {
        stream.update(bytes);
        Ok(())
    })?;
    stream.update(suffix);
    Ok(stream.finish()?)
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, io::Cursor};

    use keyczar_crypto::KeyType;

    use super::*;
    use crate::metadata::{KeyMetadata, KeyStatus, KeyVersion};

    fn keyset(key_type: KeyType, purpose: KeyPurpose, statuses: &[KeyStatus]) -> Arc<KeySet> {
        let mut metadata = KeyMetadata::new("sign", purpose, key_type).unwrap();
        let mut keys = BTreeMap::new();
        for (i, status) in statuses.iter().enumerate() {
            let version = i as u32 + 1;
            metadata.push_version(KeyVersion::new(version, *status));
            keys.insert(version, KeyMaterial::generate(key_type, None).unwrap());
        }
        Arc::new(KeySet::new(metadata, keys).unwrap())
    }

    fn hmac_signer() -> Signer {
        Signer::new(keyset(KeyType::HmacSha1, KeyPurpose::SignAndVerify, &[KeyStatus::Primary]))
            .unwrap()
    }

    #[test]
    fn sign_and_verify() {
        let signer = hmac_signer();
        let signature = signer.sign(b"This is some test data").unwrap();
        assert!(signer.verify(b"This is some test data", &signature).unwrap());
        assert!(!signer.verify(b"Wrong string", &signature).unwrap());
    }

    #[test]
    fn signature_layout() {
        let signer = hmac_signer();
        let signature = signer.sign(b"abc").unwrap();
        let (_, key) = signer.keyset().primary().unwrap();
        assert_eq!(signature.len(), 5 + 20);
        assert_eq!(signature[0], 0);
        assert_eq!(&signature[1..5], key.key_hash().as_bytes());
    }

    #[test]
    fn empty_message() {
        let signer = hmac_signer();
        let signature = signer.sign(b"").unwrap();
        assert!(signer.verify(b"", &signature).unwrap());
    }

    #[test]
    fn short_signature_is_structural_error() {
        let signer = hmac_signer();
        assert_eq!(signer.verify(b"x", &[0, 1, 2]), Err(KeyczarError::InvalidSignatureData));
    }

    #[test]
    fn bad_format_byte() {
        let signer = hmac_signer();
        let mut signature = signer.sign(b"x").unwrap();
        signature[0] = 7;
        assert_eq!(signer.verify(b"x", &signature), Err(KeyczarError::UnsupportedFormatVersion(7)));
    }

    #[test]
    fn stream_verify_matches_slice_verify() {
        let signer = Signer::with_config(
            keyset(KeyType::HmacSha1, KeyPurpose::SignAndVerify, &[KeyStatus::Primary]),
            KeyczarConfig { buffer_size: 7, ..KeyczarConfig::default() },
        )
        .unwrap();
        let data = vec![0x5a; 100];
        let signature = signer.sign_stream(&mut Cursor::new(&data)).unwrap();
        assert!(signer.verifier().verify_stream(&mut Cursor::new(&data), &signature).unwrap());
        assert!(signer.verify(&data, &signature).unwrap());
    }

    #[test]
    fn older_versions_still_verify() {
        let set = keyset(
            KeyType::HmacSha1,
            KeyPurpose::SignAndVerify,
            &[KeyStatus::Primary, KeyStatus::Active],
        );
        let old = set.by_version(2).unwrap();
        let (header, sig) = {
            let mut input: &[u8] = b"msg";
            let sig = sign_raw(old, 16, &[], &mut input, &FORMAT_BYTES).unwrap();
            (EnvelopeHeader::new(old.key_hash()), sig)
        };
        let signature = SignedEnvelope { header, signature: &sig }.to_vec();
        assert!(Verifier::new(set).unwrap().verify(b"msg", &signature).unwrap());
    }

    #[test]
    fn missing_primary() {
        let signer =
            Signer::new(keyset(KeyType::HmacSha1, KeyPurpose::SignAndVerify, &[KeyStatus::Active]))
                .unwrap();
        assert_eq!(signer.sign(b"x"), Err(KeyczarError::MissingPrimaryKey));
    }

    #[test]
    fn purpose_enforced() {
        let set = keyset(KeyType::Aes, KeyPurpose::DecryptAndEncrypt, &[KeyStatus::Primary]);
        assert!(matches!(
            Signer::new(Arc::clone(&set)),
            Err(KeyczarError::InvalidKeySetPurpose { expected: "sign", .. })
        ));
        assert!(Verifier::new(set).is_err());
    }

    #[test]
    fn dsa_round_trip() {
        let signer =
            Signer::new(keyset(KeyType::DsaPriv, KeyPurpose::SignAndVerify, &[KeyStatus::Primary]))
                .unwrap();
        let signature = signer.sign(b"This is some test data").unwrap();
        assert!(signer.verify(b"This is some test data", &signature).unwrap());
        assert!(!signer.verify(b"This is some test datA", &signature).unwrap());
    }
}
