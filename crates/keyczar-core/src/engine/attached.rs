//! Attached signatures.
//!
//! The message travels inside the envelope; optional hidden data is signed
//! but not transmitted, so the verifier must supply the same bytes.
//!
//! ```text
//! envelope     = header || be32(len) || message || signature
//! signed bytes = header || be32(len) || message || be32(len hidden) || hidden || format byte
//! ```

use std::sync::Arc;

use keyczar_proto::{AttachedEnvelope, EnvelopeHeader, FORMAT_BYTES};

use super::{
    Signer, Verifier, signature_parse_error,
    signer::{SignatureTrial, sign_raw},
    try_candidates,
};
use crate::{config::KeyczarConfig, error::KeyczarError, keyset::KeySet};

fn hidden_suffix(hidden: &[u8]) -> Result<Vec<u8>, KeyczarError> {
    let mut suffix = AttachedEnvelope::hidden_suffix(hidden)?;
    suffix.extend_from_slice(&FORMAT_BYTES);
    Ok(suffix)
}

/// Verifies attached signatures.
#[derive(Debug, Clone)]
pub struct AttachedVerifier {
    verifier: Verifier,
}

impl AttachedVerifier {
    /// Attached verifier with default configuration.
    ///
    /// # Errors
    ///
    /// `InvalidKeySetPurpose` unless the key set can verify.
    pub fn new(keyset: impl Into<Arc<KeySet>>) -> Result<Self, KeyczarError> {
        Ok(Self { verifier: Verifier::new(keyset)? })
    }

    /// Attached verifier with explicit configuration.
    pub fn with_config(
        keyset: impl Into<Arc<KeySet>>,
        config: KeyczarConfig,
    ) -> Result<Self, KeyczarError> {
        Ok(Self { verifier: Verifier::with_config(keyset, config)? })
    }

    /// Underlying key set.
    pub fn keyset(&self) -> &KeySet {
        self.verifier.keyset()
    }

    /// Check an attached signature with `hidden` data.
    ///
    /// # Errors
    ///
    /// - `InvalidSignatureData` if the envelope is truncated
    /// - `UnsupportedFormatVersion` for an unknown format byte
    pub fn verify(&self, signed: &[u8], hidden: &[u8]) -> Result<bool, KeyczarError> {
        Ok(self.check(signed, hidden)?.is_some())
    }

    /// Message carried by `signed`, if the signature checks out.
    ///
    /// # Errors
    ///
    /// `InvalidSignatureData` if the signature does not verify, plus every
    /// error of [`AttachedVerifier::verify`].
    pub fn verified_message(&self, signed: &[u8], hidden: &[u8]) -> Result<Vec<u8>, KeyczarError> {
        self.check(signed, hidden)?.ok_or(KeyczarError::InvalidSignatureData)
    }

    fn check(&self, signed: &[u8], hidden: &[u8]) -> Result<Option<Vec<u8>>, KeyczarError> {
        let envelope = AttachedEnvelope::parse(signed).map_err(signature_parse_error)?;
        let prefix = AttachedEnvelope::signed_prefix(&envelope.header, envelope.message.len())?;
        let suffix = hidden_suffix(hidden)?;

        let mut trial = SignatureTrial {
            prefix: &prefix,
            message: envelope.message,
            suffix: &suffix,
            signature: envelope.signature,
            policy: self.verifier.policy(),
        };
        let accepted = try_candidates(self.keyset().candidates(envelope.key_hash()), &mut trial)?;
        Ok(accepted.map(|()| envelope.message.to_vec()))
    }
}

/// Produces attached signatures with the primary key.
#[derive(Debug, Clone)]
pub struct AttachedSigner {
    signer: Signer,
    verifier: AttachedVerifier,
}

impl AttachedSigner {
    /// Attached signer with default configuration.
    ///
    /// # Errors
    ///
    /// `InvalidKeySetPurpose` unless the key set can sign.
    pub fn new(keyset: impl Into<Arc<KeySet>>) -> Result<Self, KeyczarError> {
        Self::with_config(keyset, KeyczarConfig::default())
    }

    /// Attached signer with explicit configuration.
    pub fn with_config(
        keyset: impl Into<Arc<KeySet>>,
        config: KeyczarConfig,
    ) -> Result<Self, KeyczarError> {
        let keyset = keyset.into();
        Ok(Self {
            signer: Signer::with_config(Arc::clone(&keyset), config.clone())?,
            verifier: AttachedVerifier::with_config(keyset, config)?,
        })
    }

    /// Underlying key set.
    pub fn keyset(&self) -> &KeySet {
        self.signer.keyset()
    }

    /// Verifier over the same key set.
    pub fn verifier(&self) -> &AttachedVerifier {
        &self.verifier
    }

    /// Sign `message`, binding `hidden` into the signature.
    ///
    /// # Errors
    ///
    /// - `MissingPrimaryKey` if no version is primary
    /// - `Protocol(SegmentTooLarge)` for messages over 4 GiB
    pub fn sign(&self, message: &[u8], hidden: &[u8]) -> Result<Vec<u8>, KeyczarError> {
        let (_, key) = self.keyset().primary()?;
        let header = EnvelopeHeader::new(key.key_hash());
        let prefix = AttachedEnvelope::signed_prefix(&header, message.len())?;
        let suffix = hidden_suffix(hidden)?;

        let mut input = message;
        let signature =
            sign_raw(key, self.signer.verifier().chunk_size(), &prefix, &mut input, &suffix)?;
        Ok(AttachedEnvelope { header, message, signature: &signature }.to_vec()?)
    }

    /// Check an attached signature with `hidden` data.
    pub fn verify(&self, signed: &[u8], hidden: &[u8]) -> Result<bool, KeyczarError> {
        self.verifier.verify(signed, hidden)
    }
}
