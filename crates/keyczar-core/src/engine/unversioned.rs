//! Raw signatures without a header.
//!
//! For interop with systems that expect a bare algorithm signature. Without a
//! key hash the verifier cannot narrow the candidates and tries every key.

use std::{
    io::{Read, Seek},
    sync::Arc,
};

use super::{
    CandidateOutcome, CandidateTrial, Replay, ReplayReader, Signer, Verifier,
    signer::{SignatureTrial, sign_raw},
};
use crate::{config::KeyczarConfig, error::KeyczarError, keyset::KeySet};

/// Verifies bare signatures against every key in the set.
#[derive(Debug, Clone)]
pub struct UnversionedVerifier {
    verifier: Verifier,
}

impl UnversionedVerifier {
    /// Unversioned verifier with default configuration.
    ///
    /// # Errors
    ///
    /// `InvalidKeySetPurpose` unless the key set can verify.
    pub fn new(keyset: impl Into<Arc<KeySet>>) -> Result<Self, KeyczarError> {
        Ok(Self { verifier: Verifier::new(keyset)? })
    }

    /// Unversioned verifier with explicit configuration.
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

    /// Check a bare `signature` over `data`. Never a structural error.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool, KeyczarError> {
        self.verify_message(data, signature)
    }

    /// Check a bare `signature` over everything `data` yields.
    pub fn verify_stream<R: Read + Seek>(
        &self,
        data: &mut R,
        signature: &[u8],
    ) -> Result<bool, KeyczarError> {
        let replay = ReplayReader::new(data, self.verifier.chunk_size())?;
        self.verify_message(replay, signature)
    }

    fn verify_message(&self, message: impl Replay, signature: &[u8]) -> Result<bool, KeyczarError> {
        let mut trial = SignatureTrial {
            prefix: &[],
            message,
            suffix: &[],
            signature,
            policy: self.verifier.policy(),
        };
        // Newest first, matching hash lookups.
        let keys: Vec<_> = self.keyset().keys().collect();
        for (version, _, key) in keys.into_iter().rev() {
            if let CandidateOutcome::Accepted(()) = trial.attempt(version, key)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Produces bare signatures with the primary key.
#[derive(Debug, Clone)]
pub struct UnversionedSigner {
    signer: Signer,
    verifier: UnversionedVerifier,
}

impl UnversionedSigner {
    /// Unversioned signer with default configuration.
    ///
    /// # Errors
    ///
    /// `InvalidKeySetPurpose` unless the key set can sign.
    pub fn new(keyset: impl Into<Arc<KeySet>>) -> Result<Self, KeyczarError> {
        Self::with_config(keyset, KeyczarConfig::default())
    }

    /// Unversioned signer with explicit configuration.
    pub fn with_config(
        keyset: impl Into<Arc<KeySet>>,
        config: KeyczarConfig,
    ) -> Result<Self, KeyczarError> {
        let keyset = keyset.into();
        Ok(Self {
            signer: Signer::with_config(Arc::clone(&keyset), config.clone())?,
            verifier: UnversionedVerifier::with_config(keyset, config)?,
        })
    }

    /// Underlying key set.
    pub fn keyset(&self) -> &KeySet {
        self.signer.keyset()
    }

    /// Verifier over the same key set.
    pub fn verifier(&self) -> &UnversionedVerifier {
        &self.verifier
    }

    /// Sign `data` with no header and no format byte.
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
        let (_, key) = self.keyset().primary()?;
        sign_raw(key, self.signer.verifier().chunk_size(), &[], data, &[])
    }

    /// Check a bare `signature` over `data`.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool, KeyczarError> {
        self.verifier.verify(data, signature)
    }
}
