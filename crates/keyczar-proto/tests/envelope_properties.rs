//! Property-based tests for envelope framing.
//!
//! These tests verify that framing is correct for all inputs, not just
//! specific examples:
//!
//! 1. **Round-trip**: every layout parses back to what was encoded
//! 2. **Fail-closed**: arbitrary bytes either parse or return an error
//! 3. **Version binding**: any format byte other than 0 is rejected

use keyczar_proto::{
    AttachedEnvelope, EnvelopeHeader, FORMAT_VERSION, HEADER_SIZE, KeyHash, ProtocolError,
    SignedEnvelope, TimeoutEnvelope, packing,
};
use proptest::prelude::*;

fn arbitrary_header() -> impl Strategy<Value = EnvelopeHeader> {
    any::<[u8; 4]>().prop_map(|hash| EnvelopeHeader::new(KeyHash::new(hash)))
}

#[test]
fn prop_signed_roundtrip() {
    proptest!(|(header in arbitrary_header(), signature in prop::collection::vec(any::<u8>(), 0..512))| {
        let envelope = SignedEnvelope { header, signature: &signature };
        let bytes = envelope.to_vec();

        prop_assert_eq!(bytes.len(), HEADER_SIZE + signature.len());
        let decoded = SignedEnvelope::parse(&bytes).expect("parse should succeed");

        // PROPERTY: Round-trip must be identity
        prop_assert_eq!(decoded, envelope);
    });
}

#[test]
fn prop_timeout_roundtrip() {
    proptest!(|(
        header in arbitrary_header(),
        expiration in any::<u64>(),
        signature in prop::collection::vec(any::<u8>(), 0..128),
    )| {
        let envelope = TimeoutEnvelope { header, expiration_millis: expiration, signature: &signature };
        let decoded_bytes = envelope.to_vec();
        let decoded = TimeoutEnvelope::parse(&decoded_bytes).expect("parse should succeed");

        prop_assert_eq!(decoded.expiration_millis, expiration);
        prop_assert_eq!(decoded.signature, signature.as_slice());
    });
}

#[test]
fn prop_bad_format_byte_rejected() {
    proptest!(|(version in 1u8..=255, rest in prop::collection::vec(any::<u8>(), 4..64))| {
        let mut bytes = vec![version];
        bytes.extend_from_slice(&rest);

        // PROPERTY: every layout reports the version, not a verification failure
        prop_assert_eq!(SignedEnvelope::parse(&bytes), Err(ProtocolError::UnsupportedVersion(version)));
        prop_assert_eq!(
            AttachedEnvelope::parse(&bytes).map(|_| ()),
            Err(ProtocolError::UnsupportedVersion(version))
        );
        prop_assert_eq!(
            TimeoutEnvelope::parse(&bytes).map(|_| ()),
            Err(ProtocolError::UnsupportedVersion(version))
        );
    });
}

#[test]
fn prop_short_input_is_structural_error() {
    proptest!(|(bytes in prop::collection::vec(any::<u8>(), 0..HEADER_SIZE))| {
        let result = EnvelopeHeader::from_bytes(&bytes);
        let too_short = matches!(result, Err(ProtocolError::EnvelopeTooShort { .. }));
        prop_assert!(too_short);
    });
}

#[test]
fn prop_attached_message_is_sliced_exactly() {
    proptest!(|(
        header in arbitrary_header(),
        message in prop::collection::vec(any::<u8>(), 0..1024),
        signature in prop::collection::vec(any::<u8>(), 0..64),
    )| {
        let envelope = AttachedEnvelope { header, message: &message, signature: &signature };
        let bytes = envelope.to_vec().expect("encode should succeed");
        let decoded = AttachedEnvelope::parse(&bytes).expect("parse should succeed");

        prop_assert_eq!(decoded.message, message.as_slice());
        prop_assert_eq!(decoded.signature, signature.as_slice());
    });
}

#[test]
fn prop_packing_survives_arbitrary_segments() {
    proptest!(|(segments in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..6))| {
        let packed = packing::pack(&segments).expect("pack should succeed");
        let unpacked = packing::unpack(&packed).expect("unpack should succeed");
        let owned: Vec<Vec<u8>> = unpacked.into_iter().map(<[u8]>::to_vec).collect();
        prop_assert_eq!(owned, segments);
    });
}

#[test]
fn format_version_is_zero() {
    assert_eq!(FORMAT_VERSION, 0);
    assert_eq!(HEADER_SIZE, 5);
}
