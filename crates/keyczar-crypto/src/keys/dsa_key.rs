//! DSA keys.
//!
//! Signatures are DSA over a SHA-1 digest, encoded as a DER
//! `SEQUENCE { INTEGER r, INTEGER s }`.
//!
//! Some historical signers emitted `r`/`s` without the sign-padding zero
//! byte, or with redundant leading zeros. Those encodings verify unless
//! [`VerifyPolicy::strict_dsa`] is set.

use std::sync::Arc;

use dsa::{BigUint, Components, KeySize, Signature, SigningKey, VerifyingKey};
use keyczar_proto::KeyHash;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use signature::hazmat::{PrehashSigner, PrehashVerifier};
use zeroize::Zeroize;

use super::{Signable, Verifiable, VerifyPolicy};
use crate::{
    encoding::{integer_bytes, unsigned_bytes, websafe},
    error::CryptoError,
    hash::{
        distinct_fallbacks, padded_components_hash, sign_padded, strip_leading_zeros,
        stripped_components_hash,
    },
    key_type::KeyType,
    stream::{SigningStream, VerifyingStream},
};

const DER_SEQUENCE: u8 = 0x30;
const DER_INTEGER: u8 = 0x02;

/// Persisted form of a DSA public key.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DsaPublicKeyData {
    #[serde(with = "websafe")]
    p: Vec<u8>,
    #[serde(with = "websafe")]
    q: Vec<u8>,
    #[serde(with = "websafe")]
    g: Vec<u8>,
    #[serde(with = "websafe")]
    y: Vec<u8>,
    size: u32,
}

/// Persisted form of a DSA private key.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DsaPrivateKeyData {
    public_key: DsaPublicKeyData,
    #[serde(with = "websafe")]
    x: Vec<u8>,
    size: u32,
}

impl Drop for DsaPrivateKeyData {
    fn drop(&mut self) {
        self.x.zeroize();
    }
}

fn biguint(bytes: &[u8]) -> Result<BigUint, CryptoError> {
    Ok(BigUint::from_bytes_be(unsigned_bytes(bytes)?))
}

fn invalid(what: &str) -> CryptoError {
    CryptoError::InvalidKeyData(format!("invalid DSA {what}"))
}

/// DSA public key.
#[derive(Clone)]
pub struct DsaPublicKey {
    inner: Arc<VerifyingKey>,
    hash: KeyHash,
    fallback: Vec<KeyHash>,
}

impl DsaPublicKey {
    fn from_raw(inner: VerifyingKey) -> Self {
        let components = inner.components();
        let p = components.p().to_bytes_be();
        let q = components.q().to_bytes_be();
        let g = components.g().to_bytes_be();
        let y = inner.y().to_bytes_be();

        let parts: [&[u8]; 4] = [&p, &q, &g, &y];
        let hash = stripped_components_hash(&parts);
        let fallback = distinct_fallbacks(hash, &[padded_components_hash(&parts)]);
        Self { inner: Arc::new(inner), hash, fallback }
    }

    /// Size of `p` in bits.
    pub fn size(&self) -> u32 {
        self.inner.components().p().bits() as u32
    }

    /// Primary key hash over `p`, `q`, `g`, `y` with leading zeros stripped.
    pub fn key_hash(&self) -> KeyHash {
        self.hash
    }

    /// Hash over the sign-padded components, when it differs.
    pub fn fallback_key_hashes(&self) -> &[KeyHash] {
        &self.fallback
    }

    pub(crate) fn to_data(&self) -> DsaPublicKeyData {
        let components = self.inner.components();
        DsaPublicKeyData {
            p: integer_bytes(&components.p().to_bytes_be()),
            q: integer_bytes(&components.q().to_bytes_be()),
            g: integer_bytes(&components.g().to_bytes_be()),
            y: integer_bytes(&self.inner.y().to_bytes_be()),
            size: self.size(),
        }
    }

    pub(crate) fn from_data(data: &DsaPublicKeyData) -> Result<Self, CryptoError> {
        let components =
            Components::from_components(biguint(&data.p)?, biguint(&data.q)?, biguint(&data.g)?)
                .map_err(|_| invalid("domain parameters"))?;
        let inner = VerifyingKey::from_components(components, biguint(&data.y)?)
            .map_err(|_| invalid("public value"))?;
        let key = Self::from_raw(inner);
        if key.size() != data.size {
            return Err(CryptoError::InvalidKeyData(format!(
                "DSA p is {} bits, size says {}",
                key.size(),
                data.size
            )));
        }
        Ok(key)
    }
}

impl Verifiable for DsaPublicKey {
    fn verifying_stream(&self, policy: VerifyPolicy) -> Result<Box<dyn VerifyingStream>, CryptoError> {
        Ok(Box::new(DsaVerifyingStream {
            key: Arc::clone(&self.inner),
            digest: Sha1::new(),
            strict: policy.strict_dsa,
        }))
    }
}

/// DSA private key.
pub struct DsaPrivateKey {
    inner: Arc<SigningKey>,
    public: DsaPublicKey,
}

impl DsaPrivateKey {
    /// Generate fresh domain parameters and a key pair.
    pub fn generate(size_bits: u32) -> Result<Self, CryptoError> {
        KeyType::DsaPriv.resolve_size(Some(size_bits))?;
        #[allow(deprecated)]
        let components = Components::generate(&mut OsRng, KeySize::DSA_1024_160);
        let inner = SigningKey::generate(&mut OsRng, components);
        Ok(Self::from_raw(inner))
    }

    fn from_raw(inner: SigningKey) -> Self {
        let public = DsaPublicKey::from_raw(inner.verifying_key().clone());
        Self { inner: Arc::new(inner), public }
    }

    /// Public half.
    pub fn public_key(&self) -> &DsaPublicKey {
        &self.public
    }

    /// Size of `p` in bits.
    pub fn size(&self) -> u32 {
        self.public.size()
    }

    pub(crate) fn to_data(&self) -> DsaPrivateKeyData {
        DsaPrivateKeyData {
            public_key: self.public.to_data(),
            x: integer_bytes(&self.inner.x().to_bytes_be()),
            size: self.size(),
        }
    }

    pub(crate) fn from_data(data: &DsaPrivateKeyData) -> Result<Self, CryptoError> {
        let public = DsaPublicKey::from_data(&data.public_key)?;
        let verifying = VerifyingKey::clone(&public.inner);
        let inner = SigningKey::from_components(verifying, biguint(&data.x)?)
            .map_err(|_| invalid("private value"))?;
        Ok(Self { inner: Arc::new(inner), public })
    }
}

impl Signable for DsaPrivateKey {
    fn signing_stream(&self) -> Result<Box<dyn SigningStream>, CryptoError> {
        Ok(Box::new(DsaSigningStream { key: Arc::clone(&self.inner), digest: Sha1::new() }))
    }
}

struct DsaSigningStream {
    key: Arc<SigningKey>,
    digest: Sha1,
}

impl SigningStream for DsaSigningStream {
    fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, CryptoError> {
        let digest = self.digest.finalize();
        let signature: Signature = self
            .key
            .sign_prehash(&digest)
            .map_err(|_| CryptoError::Primitive { operation: "sign" })?;
        Ok(encode_der_signature(&signature.r().to_bytes_be(), &signature.s().to_bytes_be()))
    }
}

struct DsaVerifyingStream {
    key: Arc<VerifyingKey>,
    digest: Sha1,
    strict: bool,
}

impl VerifyingStream for DsaVerifyingStream {
    fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    fn verify(self: Box<Self>, signature: &[u8]) -> bool {
        let Some(parsed) = parse_der_signature(signature, self.strict) else {
            return false;
        };
        if !parsed.canonical {
            tracing::warn!("accepting DSA signature with non-canonical integer encoding");
        }
        let Ok(signature) = Signature::from_components(parsed.r, parsed.s) else {
            return false;
        };
        let digest = self.digest.finalize();
        self.key.verify_prehash(&digest, &signature).is_ok()
    }
}

/// Encode `r` and `s` (unsigned big-endian) as a DER signature.
pub(crate) fn encode_der_signature(r: &[u8], s: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    for value in [r, s] {
        let padded = sign_padded(value);
        body.push(DER_INTEGER);
        push_der_length(&mut body, padded.len());
        body.extend_from_slice(&padded);
    }

    let mut out = Vec::with_capacity(body.len() + 4);
    out.push(DER_SEQUENCE);
    push_der_length(&mut out, body.len());
    out.extend_from_slice(&body);
    out
}

fn push_der_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let significant = strip_leading_zeros(&bytes);
        out.push(0x80 | significant.len() as u8);
        out.extend_from_slice(significant);
    }
}

/// Result of parsing a DER signature.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ParsedSignature {
    pub(crate) r: BigUint,
    pub(crate) s: BigUint,
    /// Both integers used minimal two's-complement encoding
    pub(crate) canonical: bool,
}

/// Parse a DER `SEQUENCE { INTEGER, INTEGER }`.
///
/// In strict mode any non-canonical integer rejects the signature. Otherwise
/// a missing sign pad or redundant leading zeros are tolerated. Framing
/// errors and trailing bytes are rejected either way.
pub(crate) fn parse_der_signature(bytes: &[u8], strict: bool) -> Option<ParsedSignature> {
    let mut outer = DerReader { bytes };
    let body = outer.read_tlv(DER_SEQUENCE)?;
    if !outer.bytes.is_empty() {
        return None;
    }

    let mut inner = DerReader { bytes: body };
    let (r, r_canonical) = read_integer(&mut inner)?;
    let (s, s_canonical) = read_integer(&mut inner)?;
    if !inner.bytes.is_empty() {
        return None;
    }

    let canonical = r_canonical && s_canonical;
    if strict && !canonical {
        return None;
    }
    Some(ParsedSignature { r, s, canonical })
}

fn read_integer(reader: &mut DerReader<'_>) -> Option<(BigUint, bool)> {
    let content = reader.read_tlv(DER_INTEGER)?;
    let first = *content.first()?;

    let negative = first & 0x80 != 0;
    let redundant_zero = content.len() > 1 && first == 0 && content[1] & 0x80 == 0;
    Some((BigUint::from_bytes_be(content), !negative && !redundant_zero))
}

struct DerReader<'a> {
    bytes: &'a [u8],
}

impl<'a> DerReader<'a> {
    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        if len > self.bytes.len() {
            return None;
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Some(head)
    }

    fn read_tlv(&mut self, tag: u8) -> Option<&'a [u8]> {
        if *self.take(1)?.first()? != tag {
            return None;
        }
        let first = *self.take(1)?.first()?;
        let len = if first & 0x80 == 0 {
            usize::from(first)
        } else {
            let count = usize::from(first & 0x7F);
            if count == 0 || count > 2 {
                return None;
            }
            self.take(count)?.iter().fold(0usize, |acc, &b| (acc << 8) | usize::from(b))
        };
        self.take(len)
    }
}
