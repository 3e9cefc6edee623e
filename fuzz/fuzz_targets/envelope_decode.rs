//! Fuzz target for envelope and packing decoders
//!
//! Feeds arbitrary bytes to every parser in `keyczar_proto` to find:
//! - Panics on short or truncated input
//! - Length fields that overflow or over-read
//! - Segment counts that allocate without bound
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use keyczar_proto::{
    AttachedEnvelope, EnvelopeHeader, FORMAT_VERSION, SignedEnvelope, TimeoutEnvelope, packing,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok((header, rest)) = EnvelopeHeader::split(data) {
        assert_eq!(header.version(), FORMAT_VERSION);
        assert_eq!(rest.len(), data.len() - EnvelopeHeader::SIZE);
    }

    if let Ok(envelope) = SignedEnvelope::parse(data) {
        // Re-encoding must reproduce the input exactly
        assert_eq!(envelope.to_vec(), data);
    }

    if let Ok(envelope) = AttachedEnvelope::parse(data) {
        assert_eq!(envelope.to_vec().ok().as_deref(), Some(data));
    }

    if let Ok(envelope) = TimeoutEnvelope::parse(data) {
        assert_eq!(envelope.to_vec(), data);
    }

    if let Ok(segments) = packing::unpack(data) {
        assert_eq!(packing::pack(&segments).ok().as_deref(), Some(data));
    }
});
