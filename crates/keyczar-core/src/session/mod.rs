//! Session crypters.
//!
//! An initiator generates a symmetric session key, packs it, encrypts the
//! blob for the responder's public key and hands out the result as session
//! material. A responder opens that material with the matching private key.
//! After that both sides encrypt with the session key only.
//!
//! With a signer (initiator) or verifier (responder) the material is an
//! attached signature over the encrypted blob, and every ciphertext is
//! attached-signed with the session nonce as hidden data. A message from one
//! session then fails verification in any other.
//!
//! Setup is deferred until the first call that needs the session key.

mod packer;

use std::{fmt, sync::Arc};

use keyczar_crypto::{KeyMaterial, KeyPurpose};
pub use packer::{NonceSessionPacker, SessionKey, SessionKeyPacker, SimpleAesHmacSha1Packer};
use zeroize::Zeroizing;

use crate::{
    config::KeyczarConfig,
    engine::{AttachedSigner, AttachedVerifier, Crypter, Encrypter},
    env::{Environment, SystemEnv},
    error::KeyczarError,
    keyset::KeySet,
    metadata::{KeyMetadata, KeyStatus, KeyVersion},
};

/// Length of the random nonce bound into signed sessions.
pub const SESSION_NONCE_SIZE: usize = 16;

/// One end of a session.
pub struct SessionCrypter {
    state: SessionState,
    signer: Option<AttachedSigner>,
    verifier: Option<AttachedVerifier>,
}

enum SessionState {
    /// Inputs needed to establish the session
    Uninitialized(Setup),
    /// Session key in place
    Ready(Session),
}

enum Setup {
    Initiator {
        encrypter: Encrypter,
        packer: Box<dyn SessionKeyPacker>,
        env: Arc<dyn Environment>,
    },
    Responder {
        crypter: Crypter,
        material: Vec<u8>,
        packer: Box<dyn SessionKeyPacker>,
    },
}

struct Session {
    crypter: Crypter,
    nonce: Option<Vec<u8>>,
    material: Vec<u8>,
}

impl SessionCrypter {
    /// Initiator encrypting the session key for `encrypter`'s key set.
    ///
    /// Uses [`SimpleAesHmacSha1Packer`].
    pub fn initiator(encrypter: Encrypter) -> Self {
        Self::with_setup(
            Setup::Initiator {
                encrypter,
                packer: Box::new(SimpleAesHmacSha1Packer),
                env: Arc::new(SystemEnv::new()),
            },
            None,
            None,
        )
    }

    /// Initiator that signs the session material and every ciphertext.
    ///
    /// Uses [`NonceSessionPacker`] so each session has its own nonce.
    pub fn signed_initiator(encrypter: Encrypter, signer: AttachedSigner) -> Self {
        Self::with_setup(
            Setup::Initiator {
                encrypter,
                packer: Box::new(NonceSessionPacker::default()),
                env: Arc::new(SystemEnv::new()),
            },
            Some(signer),
            None,
        )
    }

    /// Responder opening `material` with `crypter`.
    ///
    /// Uses [`SimpleAesHmacSha1Packer`].
    pub fn responder(crypter: Crypter, material: impl Into<Vec<u8>>) -> Self {
        Self::with_setup(
            Setup::Responder {
                crypter,
                material: material.into(),
                packer: Box::new(SimpleAesHmacSha1Packer),
            },
            None,
            None,
        )
    }

    /// Responder that checks the initiator's signatures.
    ///
    /// Uses [`NonceSessionPacker`].
    pub fn verified_responder(
        crypter: Crypter,
        verifier: AttachedVerifier,
        material: impl Into<Vec<u8>>,
    ) -> Self {
        Self::with_setup(
            Setup::Responder {
                crypter,
                material: material.into(),
                packer: Box::new(NonceSessionPacker::default()),
            },
            None,
            Some(verifier),
        )
    }

    fn with_setup(
        setup: Setup,
        signer: Option<AttachedSigner>,
        verifier: Option<AttachedVerifier>,
    ) -> Self {
        Self { state: SessionState::Uninitialized(setup), signer, verifier }
    }

    /// Replace the session key packer. No effect once the session is
    /// established.
    #[must_use]
    pub fn with_packer(mut self, packer: impl SessionKeyPacker + 'static) -> Self {
        if let SessionState::Uninitialized(
            Setup::Initiator { packer: slot, .. } | Setup::Responder { packer: slot, .. },
        ) = &mut self.state
        {
            *slot = Box::new(packer);
        }
        self
    }

    /// Replace the nonce source of an initiator. No effect on responders or
    /// once the session is established.
    #[must_use]
    pub fn with_environment(mut self, env: Arc<dyn Environment>) -> Self {
        if let SessionState::Uninitialized(Setup::Initiator { env: slot, .. }) = &mut self.state {
            *slot = env;
        }
        self
    }

    /// Material the responder needs, establishing the session if needed.
    ///
    /// # Errors
    ///
    /// Initiator: `MissingPrimaryKey` or `Crypto` from encrypting the packed
    /// key. Responder: `InvalidCiphertext` for oversized or unopenable
    /// material, `InvalidSignatureData` if the signature does not verify.
    pub fn session_material(&mut self) -> Result<&[u8], KeyczarError> {
        self.ensure_established()?;
        Ok(&self.session()?.material)
    }

    /// Encrypt `plaintext` under the session key.
    ///
    /// # Errors
    ///
    /// `SessionRoleMismatch` on a verifying responder.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, KeyczarError> {
        if self.verifier.is_some() {
            return Err(KeyczarError::SessionRoleMismatch(
                "a verifying responder cannot encrypt",
            ));
        }
        self.ensure_established()?;
        let session = self.session()?;
        let ciphertext = session.crypter.encrypt(plaintext)?;
        let hidden = session.nonce.as_deref().unwrap_or_default();
        match &self.signer {
            Some(signer) => signer.sign(&ciphertext, hidden),
            None => Ok(ciphertext),
        }
    }

    /// Decrypt `ciphertext` produced by the other end of the session.
    ///
    /// # Errors
    ///
    /// - `SessionRoleMismatch` on a signing initiator
    /// - `InvalidSignatureData` if the attached signature does not verify
    /// - `InvalidCiphertext` if the session key does not open it
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, KeyczarError> {
        if self.signer.is_some() {
            return Err(KeyczarError::SessionRoleMismatch("a signing initiator cannot decrypt"));
        }
        self.ensure_established()?;
        let session = self.session()?;
        match &self.verifier {
            Some(verifier) => {
                let hidden = session.nonce.as_deref().unwrap_or_default();
                let inner = verifier.verified_message(ciphertext, hidden)?;
                session.crypter.decrypt(&inner)
            },
            None => session.crypter.decrypt(ciphertext),
        }
    }

    fn ensure_established(&mut self) -> Result<(), KeyczarError> {
        if let SessionState::Uninitialized(setup) = &self.state {
            let session = setup.establish(self.signer.as_ref(), self.verifier.as_ref())?;
            self.state = SessionState::Ready(session);
        }
        Ok(())
    }

    fn session(&self) -> Result<&Session, KeyczarError> {
        match &self.state {
            SessionState::Ready(session) => Ok(session),
            SessionState::Uninitialized(_) => {
                Err(KeyczarError::SessionRoleMismatch("session not established"))
            },
        }
    }
}

impl Setup {
    fn establish(
        &self,
        signer: Option<&AttachedSigner>,
        verifier: Option<&AttachedVerifier>,
    ) -> Result<Session, KeyczarError> {
        match self {
            Self::Initiator { encrypter, packer, env } => {
                let key = KeyMaterial::generate(packer.session_key_type(), None)?;
                let nonce = packer.carries_nonce().then(|| {
                    let mut nonce = vec![0u8; SESSION_NONCE_SIZE];
                    env.random_bytes(&mut nonce);
                    nonce
                });
                let session_key = SessionKey { key, nonce };

                let packed = Zeroizing::new(packer.pack(&session_key)?);
                let encrypted = encrypter.encrypt(&packed)?;
                let material = match signer {
                    Some(signer) => signer.sign(&encrypted, &[])?,
                    None => encrypted,
                };

                let crypter = session_crypter(session_key.key, encrypter.config())?;
                tracing::debug!(
                    signed = signer.is_some(),
                    material_len = material.len(),
                    "session initiated"
                );
                Ok(Session { crypter, nonce: session_key.nonce, material })
            },
            Self::Responder { crypter, material, packer } => {
                let config = crypter.encrypter().config();
                if material.len() > config.max_session_material_len {
                    tracing::debug!(
                        material_len = material.len(),
                        max = config.max_session_material_len,
                        "session material too large"
                    );
                    return Err(KeyczarError::InvalidCiphertext);
                }

                let encrypted = match verifier {
                    Some(verifier) => verifier.verified_message(material, &[])?,
                    None => material.clone(),
                };
                let packed = Zeroizing::new(crypter.decrypt(&encrypted)?);
                let session_key = packer.unpack(&packed)?;

                let session = session_crypter(session_key.key, config)?;
                tracing::debug!(verified = verifier.is_some(), "session accepted");
                Ok(Session {
                    crypter: session,
                    nonce: session_key.nonce,
                    material: material.clone(),
                })
            },
        }
    }
}

/// Single-version key set around the session key.
fn session_crypter(key: KeyMaterial, config: &KeyczarConfig) -> Result<Crypter, KeyczarError> {
    let mut metadata = KeyMetadata::new("session", KeyPurpose::DecryptAndEncrypt, key.key_type())?;
    metadata.push_version(KeyVersion::new(1, KeyStatus::Primary));
    let keyset = KeySet::new(metadata, [(1, key)].into())?;
    Crypter::with_config(keyset, config.clone())
}

impl fmt::Debug for SessionCrypter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            SessionState::Uninitialized(Setup::Initiator { .. }) => "initiator (pending)",
            SessionState::Uninitialized(Setup::Responder { .. }) => "responder (pending)",
            SessionState::Ready(_) => "ready",
        };
        f.debug_struct("SessionCrypter")
            .field("state", &state)
            .field("signed", &self.signer.is_some())
            .field("verified", &self.verifier.is_some())
            .finish_non_exhaustive()
    }
}
