//! Byte-stream transformers produced by keys.
//!
//! Streams are consumed by `finish`/`verify`, so a finished stream cannot be
//! fed again. Every stream accepts zero bytes of input.

use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Incremental cipher transform (encrypt or decrypt).
pub trait CipherStream: Send {
    /// Feed input, appending any transformed bytes ready so far to `output`.
    fn update(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<(), CryptoError>;

    /// Flush final blocks, padding or tags into `output`.
    ///
    /// Decrypting streams fail here when padding or an inline tag does not
    /// check out.
    fn finish(self: Box<Self>, output: &mut Vec<u8>) -> Result<(), CryptoError>;
}

/// Running signature or MAC computation.
pub trait SigningStream: Send {
    /// Feed message bytes.
    fn update(&mut self, data: &[u8]);

    /// Produce the signature bytes.
    fn finish(self: Box<Self>) -> Result<Vec<u8>, CryptoError>;
}

/// Running signature or MAC check.
pub trait VerifyingStream: Send {
    /// Feed message bytes.
    fn update(&mut self, data: &[u8]);

    /// Check `signature` against everything fed so far.
    ///
    /// Malformed signatures return `false`; this never errors.
    fn verify(self: Box<Self>, signature: &[u8]) -> bool;
}

/// Buffers all input and transforms it in one shot at `finish`.
///
/// Asymmetric ciphers and AEAD modes cannot emit output before they have the
/// whole input. Both the buffered input and the transform's output are zeroed
/// on drop.
pub(crate) struct OneShot<F>
where
    F: FnOnce(&[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> + Send,
{
    buffer: Zeroizing<Vec<u8>>,
    limit: Option<usize>,
    transform: F,
}

impl<F> OneShot<F>
where
    F: FnOnce(&[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> + Send,
{
    pub(crate) fn new(transform: F) -> Self {
        Self { buffer: Zeroizing::new(Vec::new()), limit: None, transform }
    }

    /// Reject input beyond `limit` bytes as soon as it arrives.
    pub(crate) fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl<F> CipherStream for OneShot<F>
where
    F: FnOnce(&[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> + Send,
{
    fn update(&mut self, input: &[u8], _output: &mut Vec<u8>) -> Result<(), CryptoError> {
        let size = self.buffer.len() + input.len();
        if let Some(max) = self.limit
            && size > max
        {
            return Err(CryptoError::InputTooLarge { size, max });
        }
        self.buffer.extend_from_slice(input);
        Ok(())
    }

    fn finish(self: Box<Self>, output: &mut Vec<u8>) -> Result<(), CryptoError> {
        let Self { buffer, transform, .. } = *self;
        let transformed = transform(&buffer)?;
        output.extend_from_slice(&transformed);
        Ok(())
    }
}
