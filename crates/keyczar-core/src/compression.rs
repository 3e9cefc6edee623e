//! Plaintext compression filters.
//!
//! Compression wraps the plaintext side only: the encrypt path compresses
//! before bytes reach the cipher, the decrypt path inflates after they leave
//! it. Both are `io::Write` adapters so the engines can push chunks through
//! without holding the whole message.

use std::io::{self, Write};

use flate2::{
    Compression,
    write::{GzDecoder, GzEncoder, ZlibDecoder, ZlibEncoder},
};

use crate::config::CompressionMode;

/// Compressing writer in front of `W`.
pub(crate) enum Compressor<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
    Zlib(ZlibEncoder<W>),
}

impl<W: Write> Compressor<W> {
    pub(crate) fn new(mode: CompressionMode, inner: W) -> Self {
        match mode {
            CompressionMode::None => Self::Plain(inner),
            CompressionMode::Gzip => Self::Gzip(GzEncoder::new(inner, Compression::default())),
            CompressionMode::Zlib => Self::Zlib(ZlibEncoder::new(inner, Compression::default())),
        }
    }

    /// Flush the compressed trailer and return the inner writer.
    pub(crate) fn finish(self) -> io::Result<W> {
        match self {
            Self::Plain(inner) => Ok(inner),
            Self::Gzip(encoder) => encoder.finish(),
            Self::Zlib(encoder) => encoder.finish(),
        }
    }
}

impl<W: Write> Write for Compressor<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(inner) => inner.write(buf),
            Self::Gzip(encoder) => encoder.write(buf),
            Self::Zlib(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(inner) => inner.flush(),
            Self::Gzip(encoder) => encoder.flush(),
            Self::Zlib(encoder) => encoder.flush(),
        }
    }
}

/// Inflating writer in front of `W`.
pub(crate) enum Decompressor<W: Write> {
    Plain(W),
    Gzip(GzDecoder<W>),
    Zlib(ZlibDecoder<W>),
}

impl<W: Write> Decompressor<W> {
    pub(crate) fn new(mode: CompressionMode, inner: W) -> Self {
        match mode {
            CompressionMode::None => Self::Plain(inner),
            CompressionMode::Gzip => Self::Gzip(GzDecoder::new(inner)),
            CompressionMode::Zlib => Self::Zlib(ZlibDecoder::new(inner)),
        }
    }

    /// Check the stream ended cleanly and return the inner writer.
    pub(crate) fn finish(self) -> io::Result<W> {
        match self {
            Self::Plain(inner) => Ok(inner),
            Self::Gzip(decoder) => decoder.finish(),
            Self::Zlib(decoder) => decoder.finish(),
        }
    }
}

impl<W: Write> Write for Decompressor<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(inner) => inner.write(buf),
            Self::Gzip(decoder) => decoder.write(buf),
            Self::Zlib(decoder) => decoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(inner) => inner.flush(),
            Self::Gzip(decoder) => decoder.flush(),
            Self::Zlib(decoder) => decoder.flush(),
        }
    }
}
