//! Signatures that expire.
//!
//! ```text
//! envelope     = header || be64(expiration millis) || signature
//! signed bytes = be64(expiration millis) || message || format byte
//! ```
//!
//! A signature whose expiration is in the past verifies as `false`, the same
//! answer as a wrong signature.

use std::{
    fmt,
    io::{Read, Seek},
    sync::Arc,
    time::Duration,
};

use keyczar_proto::{FORMAT_BYTES, TimeoutEnvelope};

use super::{
    Replay, ReplayReader, Signer, Verifier, signature_parse_error,
    signer::{SignatureTrial, sign_with_primary},
    try_candidates,
};
use crate::{
    config::KeyczarConfig,
    env::{Environment, SystemEnv},
    error::KeyczarError,
    keyset::KeySet,
};

/// Verifies timeout signatures against the environment's wall clock.
#[derive(Clone)]
pub struct TimeoutVerifier {
    verifier: Verifier,
    env: Arc<dyn Environment>,
}

impl TimeoutVerifier {
    /// Timeout verifier reading the system clock.
    ///
    /// # Errors
    ///
    /// `InvalidKeySetPurpose` unless the key set can verify.
    pub fn new(keyset: impl Into<Arc<KeySet>>) -> Result<Self, KeyczarError> {
        Self::with_environment(keyset, KeyczarConfig::default(), Arc::new(SystemEnv::new()))
    }

    /// Timeout verifier with explicit configuration and clock.
    pub fn with_environment(
        keyset: impl Into<Arc<KeySet>>,
        config: KeyczarConfig,
        env: Arc<dyn Environment>,
    ) -> Result<Self, KeyczarError> {
        Ok(Self { verifier: Verifier::with_config(keyset, config)?, env })
    }

    /// Underlying key set.
    pub fn keyset(&self) -> &KeySet {
        self.verifier.keyset()
    }

    /// Check `signed` over `data`, rejecting expired signatures.
    ///
    /// # Errors
    ///
    /// - `InvalidSignatureData` if `signed` is shorter than header plus
    ///   expiration
    /// - `UnsupportedFormatVersion` for an unknown format byte
    pub fn verify(&self, data: &[u8], signed: &[u8]) -> Result<bool, KeyczarError> {
        self.verify_message(data, signed)
    }

    /// Check `signed` over everything `data` yields from its current position.
    pub fn verify_stream<R: Read + Seek>(
        &self,
        data: &mut R,
        signed: &[u8],
    ) -> Result<bool, KeyczarError> {
        let replay = ReplayReader::new(data, self.verifier.chunk_size())?;
        self.verify_message(replay, signed)
    }

    fn verify_message(&self, message: impl Replay, signed: &[u8]) -> Result<bool, KeyczarError> {
        let envelope = TimeoutEnvelope::parse(signed).map_err(signature_parse_error)?;

        let now = self.env.wall_clock_millis();
        if now > envelope.expiration_millis {
            tracing::debug!(
                expiration = envelope.expiration_millis,
                now,
                "timeout signature expired"
            );
            return Ok(false);
        }

        let prefix = TimeoutEnvelope::signed_prefix(envelope.expiration_millis);
        let mut trial = SignatureTrial {
            prefix: &prefix,
            message,
            suffix: &FORMAT_BYTES,
            signature: envelope.signature,
            policy: self.verifier.policy(),
        };
        let accepted = try_candidates(self.keyset().candidates(envelope.key_hash()), &mut trial)?;
        Ok(accepted.is_some())
    }
}

impl fmt::Debug for TimeoutVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutVerifier").field("verifier", &self.verifier).finish_non_exhaustive()
    }
}

/// Produces timeout signatures with the primary key.
#[derive(Clone)]
pub struct TimeoutSigner {
    signer: Signer,
    verifier: TimeoutVerifier,
}

impl TimeoutSigner {
    /// Timeout signer reading the system clock.
    ///
    /// # Errors
    ///
    /// `InvalidKeySetPurpose` unless the key set can sign.
    pub fn new(keyset: impl Into<Arc<KeySet>>) -> Result<Self, KeyczarError> {
        Self::with_environment(keyset, KeyczarConfig::default(), Arc::new(SystemEnv::new()))
    }

    /// Timeout signer with explicit configuration and clock.
    pub fn with_environment(
        keyset: impl Into<Arc<KeySet>>,
        config: KeyczarConfig,
        env: Arc<dyn Environment>,
    ) -> Result<Self, KeyczarError> {
        let keyset = keyset.into();
        Ok(Self {
            signer: Signer::with_config(Arc::clone(&keyset), config.clone())?,
            verifier: TimeoutVerifier::with_environment(keyset, config, env)?,
        })
    }

    /// Underlying key set.
    pub fn keyset(&self) -> &KeySet {
        self.signer.keyset()
    }

    /// Verifier over the same key set and clock.
    pub fn verifier(&self) -> &TimeoutVerifier {
        &self.verifier
    }

    /// Sign `data`, valid until `expiration_millis` (Unix epoch).
    ///
    /// # Errors
    ///
    /// `MissingPrimaryKey` if no version is primary.
    pub fn sign(&self, data: &[u8], expiration_millis: u64) -> Result<Vec<u8>, KeyczarError> {
        let mut input = data;
        self.sign_stream(&mut input, expiration_millis)
    }

    /// Sign `data`, valid for `ttl` from now.
    pub fn sign_valid_for(&self, data: &[u8], ttl: Duration) -> Result<Vec<u8>, KeyczarError> {
        let ttl_millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let expiration = self.verifier.env.wall_clock_millis().saturating_add(ttl_millis);
        self.sign(data, expiration)
    }

    /// Sign everything `data` yields, valid until `expiration_millis`.
    pub fn sign_stream<R: Read>(
        &self,
        data: &mut R,
        expiration_millis: u64,
    ) -> Result<Vec<u8>, KeyczarError> {
        let prefix = TimeoutEnvelope::signed_prefix(expiration_millis);
        let (header, signature) = sign_with_primary(
            self.keyset(),
            self.signer.verifier().chunk_size(),
            &prefix,
            data,
            &FORMAT_BYTES,
        )?;
        Ok(TimeoutEnvelope { header, expiration_millis, signature: &signature }.to_vec())
    }

    /// Check `signed` over `data`, rejecting expired signatures.
    pub fn verify(&self, data: &[u8], signed: &[u8]) -> Result<bool, KeyczarError> {
        self.verifier.verify(data, signed)
    }
}

impl fmt::Debug for TimeoutSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutSigner").field("signer", &self.signer).finish_non_exhaustive()
    }
}
