//! Key data encodings: websafe base64 and big-integer byte forms.

use base64::{
    Engine,
    alphabet::URL_SAFE,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};

use crate::{error::CryptoError, hash::sign_padded};

/// URL-safe alphabet, no padding on encode, padding optional on decode.
const WEBSAFE: GeneralPurpose = GeneralPurpose::new(
    &URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode bytes as websafe base64.
pub fn encode_websafe(bytes: &[u8]) -> String {
    WEBSAFE.encode(bytes)
}

/// Decode websafe base64, with or without padding.
pub fn decode_websafe(text: &str) -> Result<Vec<u8>, CryptoError> {
    WEBSAFE.decode(text).map_err(|e| CryptoError::InvalidKeyData(format!("base64: {e}")))
}

/// Serde adapter for byte fields stored as websafe base64 strings.
pub mod websafe {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    /// Serialize bytes as websafe base64.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode_websafe(bytes))
    }

    /// Deserialize websafe base64 into bytes.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::decode_websafe(&text).map_err(D::Error::custom)
    }
}

/// Two's-complement bytes for a non-negative integer given big-endian.
///
/// This is the form big integers take in persisted key data.
pub fn integer_bytes(unsigned_be: &[u8]) -> Vec<u8> {
    sign_padded(unsigned_be)
}

/// Read persisted integer bytes back as unsigned big-endian.
///
/// Negative values have no meaning in key data and are rejected.
pub fn unsigned_bytes(twos_complement: &[u8]) -> Result<&[u8], CryptoError> {
    match twos_complement.first() {
        None => Err(CryptoError::InvalidKeyData("empty integer".to_string())),
        Some(b) if b & 0x80 != 0 => {
            Err(CryptoError::InvalidKeyData("negative integer".to_string()))
        },
        Some(_) => Ok(twos_complement),
    }
}
