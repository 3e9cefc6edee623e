//! Session key serialization.
//!
//! A packer turns the freshly generated session key (and nonce, if it carries
//! one) into the blob the initiator encrypts for the responder. Both sides
//! must use the same packer.

use keyczar_crypto::{AesKey, CryptoError, HmacKey, KeyMaterial, KeyType};
use keyczar_proto::packing;
use zeroize::Zeroizing;

use crate::error::KeyczarError;

/// Symmetric key of one session plus its optional nonce.
#[derive(Debug)]
pub struct SessionKey {
    /// Key used for every message of the session
    pub key: KeyMaterial,
    /// Bound into attached signatures when the session is signed
    pub nonce: Option<Vec<u8>>,
}

/// Serializes session keys for transport.
pub trait SessionKeyPacker: Send + Sync {
    /// Serialize `session`.
    fn pack(&self, session: &SessionKey) -> Result<Vec<u8>, KeyczarError>;

    /// Parse what [`SessionKeyPacker::pack`] produced.
    fn unpack(&self, packed: &[u8]) -> Result<SessionKey, KeyczarError>;

    /// Type of key the initiator generates for this packer.
    fn session_key_type(&self) -> KeyType;

    /// Whether packed sessions carry a nonce.
    fn carries_nonce(&self) -> bool;
}

/// `[aes key bytes, hmac key bytes]`, length-prefixed. No nonce.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleAesHmacSha1Packer;

impl SessionKeyPacker for SimpleAesHmacSha1Packer {
    fn pack(&self, session: &SessionKey) -> Result<Vec<u8>, KeyczarError> {
        let KeyMaterial::Aes(key) = &session.key else {
            return Err(CryptoError::UnsupportedOperation("pack a non-AES session key").into());
        };
        Ok(packing::pack([key.key_bytes(), key.hmac_key().key_bytes()])?)
    }

    fn unpack(&self, packed: &[u8]) -> Result<SessionKey, KeyczarError> {
        let segments = packing::unpack(packed)?;
        let [aes, hmac] = segments.as_slice() else {
            return Err(CryptoError::InvalidKeyData(format!(
                "expected 2 session key segments, found {}",
                segments.len()
            ))
            .into());
        };
        let key = AesKey::from_parts(aes.to_vec(), HmacKey::from_bytes(hmac.to_vec()))?;
        Ok(SessionKey { key: KeyMaterial::Aes(key), nonce: None })
    }

    fn session_key_type(&self) -> KeyType {
        KeyType::Aes
    }

    fn carries_nonce(&self) -> bool {
        false
    }
}

/// `[key type identifier, key JSON, nonce]`, length-prefixed.
#[derive(Debug, Clone, Copy)]
pub struct NonceSessionPacker {
    key_type: KeyType,
}

impl NonceSessionPacker {
    /// Packer generating session keys of `key_type`.
    pub fn new(key_type: KeyType) -> Self {
        Self { key_type }
    }
}

impl Default for NonceSessionPacker {
    fn default() -> Self {
        Self::new(KeyType::Aes)
    }
}

impl SessionKeyPacker for NonceSessionPacker {
    fn pack(&self, session: &SessionKey) -> Result<Vec<u8>, KeyczarError> {
        let json = Zeroizing::new(session.key.to_json()?);
        let nonce = session.nonce.as_deref().unwrap_or_default();
        Ok(packing::pack([
            session.key.key_type().identifier().as_bytes(),
            json.as_bytes(),
            nonce,
        ])?)
    }

    fn unpack(&self, packed: &[u8]) -> Result<SessionKey, KeyczarError> {
        let segments = packing::unpack(packed)?;
        let [identifier, json, nonce] = segments.as_slice() else {
            return Err(CryptoError::InvalidKeyData(format!(
                "expected 3 session key segments, found {}",
                segments.len()
            ))
            .into());
        };

        let identifier = std::str::from_utf8(identifier)
            .map_err(|_| CryptoError::InvalidKeyData("session key type is not UTF-8".into()))?;
        let key_type = KeyType::from_identifier(identifier)?;
        if key_type != self.key_type {
            return Err(CryptoError::InvalidKeyData(format!(
                "session key type {identifier}, expected {}",
                self.key_type.identifier()
            ))
            .into());
        }
        let json = std::str::from_utf8(json)
            .map_err(|_| CryptoError::InvalidKeyData("session key is not UTF-8".into()))?;
        let key = KeyMaterial::from_json(key_type, json)?;
        Ok(SessionKey { key, nonce: Some(nonce.to_vec()) })
    }

    fn session_key_type(&self) -> KeyType {
        self.key_type
    }

    fn carries_nonce(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aes_session(nonce: Option<Vec<u8>>) -> SessionKey {
        SessionKey { key: KeyMaterial::generate(KeyType::Aes, None).unwrap(), nonce }
    }

    #[test]
    fn simple_packer_layout() {
        let session = aes_session(None);
        let packed = SimpleAesHmacSha1Packer.pack(&session).unwrap();
        // count, then 16 AES bytes and 32 HMAC bytes, each length-prefixed
        assert_eq!(&packed[..8], &[0, 0, 0, 2, 0, 0, 0, 16]);
        assert_eq!(packed.len(), 4 + 4 + 16 + 4 + 32);

        let unpacked = SimpleAesHmacSha1Packer.unpack(&packed).unwrap();
        assert_eq!(unpacked.key.key_hash(), session.key.key_hash());
        assert!(unpacked.nonce.is_none());
    }

    #[test]
    fn simple_packer_rejects_other_keys() {
        let session =
            SessionKey { key: KeyMaterial::generate(KeyType::AesGcm, None).unwrap(), nonce: None };
        assert!(matches!(SimpleAesHmacSha1Packer.pack(&session), Err(KeyczarError::Crypto(_))));
    }

    #[test]
    fn nonce_packer_carries_nonce() {
        let packer = NonceSessionPacker::default();
        let session = aes_session(Some(vec![9; 16]));
        let unpacked = packer.unpack(&packer.pack(&session).unwrap()).unwrap();
        assert_eq!(unpacked.key.key_hash(), session.key.key_hash());
        assert_eq!(unpacked.nonce.as_deref(), Some(&[9u8; 16][..]));
    }

    #[test]
    fn nonce_packer_checks_key_type() {
        let session =
            SessionKey { key: KeyMaterial::generate(KeyType::AesGcm, None).unwrap(), nonce: None };
        let packed = NonceSessionPacker::new(KeyType::AesGcm).pack(&session).unwrap();
        assert!(NonceSessionPacker::default().unpack(&packed).is_err());
        assert!(NonceSessionPacker::new(KeyType::AesGcm).unpack(&packed).is_ok());
    }

    #[test]
    fn wrong_segment_count() {
        let packed = packing::pack([b"only one".as_slice()]).unwrap();
        assert!(SimpleAesHmacSha1Packer.unpack(&packed).is_err());
        assert!(NonceSessionPacker::default().unpack(&packed).is_err());
    }
}
