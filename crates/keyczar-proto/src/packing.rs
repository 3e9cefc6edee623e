//! Length-prefixed byte-array packing.
//!
//! ```text
//! be32(count) || be32(len_0) || bytes_0 || ... || be32(len_n) || bytes_n
//! ```
//!
//! Used for session material and anywhere several byte arrays travel as one
//! blob. Unpacking validates every length against the remaining input before
//! slicing, so hostile counts or lengths fail cleanly.

use crate::{
    errors::{ProtocolError, Result},
    signed::length_field,
};

/// Pack several byte arrays into one blob.
pub fn pack<I, B>(segments: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let segments: Vec<B> = segments.into_iter().collect();
    let total: usize = segments.iter().map(|s| 4 + s.as_ref().len()).sum();

    let mut out = Vec::with_capacity(4 + total);
    out.extend_from_slice(&length_field(segments.len())?);
    for segment in &segments {
        let segment = segment.as_ref();
        out.extend_from_slice(&length_field(segment.len())?);
        out.extend_from_slice(segment);
    }
    Ok(out)
}

/// Unpack a blob produced by [`pack`].
///
/// Trailing bytes after the last segment are rejected.
pub fn unpack(bytes: &[u8]) -> Result<Vec<&[u8]>> {
    let mut cursor = Reader { bytes };
    let count = cursor.read_u32()?;

    // Every segment needs at least its own length field.
    if count as usize > cursor.bytes.len() / 4 {
        return Err(ProtocolError::TooManySegments(count));
    }

    let mut segments = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = cursor.read_u32()? as usize;
        segments.push(cursor.take(len)?);
    }

    if !cursor.bytes.is_empty() {
        return Err(ProtocolError::MessageTruncated { expected: 0, actual: cursor.bytes.len() });
    }

    Ok(segments)
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.bytes.len() {
            return Err(ProtocolError::MessageTruncated { expected: len, actual: self.bytes.len() });
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let raw = self.take(4).map_err(|_| ProtocolError::EnvelopeTooShort {
            expected: 4,
            actual: self.bytes.len(),
        })?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(raw);
        Ok(u32::from_be_bytes(buf))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn pack_layout() {
        let packed = pack([&b"ab"[..], &b""[..], &b"c"[..]]).unwrap();
        assert_eq!(packed, vec![0, 0, 0, 3, 0, 0, 0, 2, b'a', b'b', 0, 0, 0, 0, 0, 0, 0, 1, b'c']);
    }

    #[test]
    fn unpack_empty_list() {
        assert!(unpack(&[0, 0, 0, 0]).unwrap().is_empty());
    }

    #[test]
    fn unpack_rejects_absurd_count() {
        assert_eq!(unpack(&[0xFF, 0xFF, 0xFF, 0xFF]), Err(ProtocolError::TooManySegments(u32::MAX)));
    }

    #[test]
    fn unpack_rejects_truncated_segment() {
        let result = unpack(&[0, 0, 0, 1, 0, 0, 0, 9, 1, 2]);
        assert_eq!(result, Err(ProtocolError::MessageTruncated { expected: 9, actual: 2 }));
    }

    #[test]
    fn unpack_rejects_trailing_bytes() {
        assert!(unpack(&[0, 0, 0, 0, 0xAA]).is_err());
    }

    proptest! {
        #[test]
        fn pack_unpack(segments in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 0..8)) {
            let packed = pack(&segments).unwrap();
            let unpacked = unpack(&packed).unwrap();
            prop_assert_eq!(unpacked.len(), segments.len());
            for (a, b) in unpacked.iter().zip(&segments) {
                prop_assert_eq!(*a, b.as_slice());
            }
        }

        #[test]
        fn unpack_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let _ = unpack(&bytes);
        }
    }
}
