//! Streaming byte splitters
//!
//! Two framing rules are provided, both as [`tokio_util::codec::Decoder`]
//! implementations so they plug straight into `FramedRead`:
//!
//! - [`DelimiterSplitter`] splits on an arbitrary multi-byte delimiter using a
//!   precomputed failure function, so a delimiter straddling two chunks is found
//!   without rescanning bytes that were already inspected.
//! - [`LineSplitter`] splits on `\n` and `\r\n`, optionally keeping the
//!   terminator verbatim.
//!
//! For callers that receive chunks from somewhere other than an `AsyncRead`
//! (the process drain loop, tests), [`ChunkSplitter`] wraps either decoder with
//! a push-style `feed` / `finish` API.

pub mod delimiter;
pub mod line;

pub use delimiter::{DelimiterSplitter, EmptyDelimiter};
pub use line::LineSplitter;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Push-style driver for a [`Decoder`].
///
/// Bytes handed to [`feed`](Self::feed) are appended to an internal buffer and
/// every complete segment is returned in arrival order. [`finish`](Self::finish)
/// signals end-of-input and returns whatever trailing partial segment remains.
#[derive(Debug)]
pub struct ChunkSplitter<D> {
    decoder: D,
    buf: BytesMut,
}

impl<D: Decoder> ChunkSplitter<D> {
    #[must_use]
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            buf: BytesMut::new(),
        }
    }

    /// Append a chunk and collect every segment it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<D::Item>, D::Error> {
        self.buf.extend_from_slice(chunk);
        let mut segments = Vec::new();
        while let Some(segment) = self.decoder.decode(&mut self.buf)? {
            segments.push(segment);
        }
        Ok(segments)
    }

    /// Signal end-of-input and collect the remaining segments.
    pub fn finish(&mut self) -> Result<Vec<D::Item>, D::Error> {
        let mut segments = Vec::new();
        while let Some(segment) = self.decoder.decode_eof(&mut self.buf)? {
            segments.push(segment);
        }
        Ok(segments)
    }

    /// Number of buffered bytes not yet emitted as part of a segment.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
