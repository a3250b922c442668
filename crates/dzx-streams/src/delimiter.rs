//! Arbitrary-delimiter framing with a KMP failure table

use bytes::{Bytes, BytesMut};
use std::io;
use thiserror::Error;
use tokio_util::codec::Decoder;

/// Returned when a [`DelimiterSplitter`] is built from an empty delimiter.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("delimiter must contain at least one byte")]
pub struct EmptyDelimiter;

/// Splits a byte stream on a fixed multi-byte delimiter.
///
/// The delimiter itself is not part of the emitted segments. Matching state
/// (`match_index`, `inspect_index`) survives between calls to `decode`, so a
/// delimiter split across two chunks is detected once the second chunk
/// arrives. After every full match both indices reset to zero; matches are
/// therefore leftmost and non-overlapping.
#[derive(Debug, Clone)]
pub struct DelimiterSplitter {
    delimiter: Vec<u8>,
    /// `lps[i]` = length of the longest proper prefix of `delimiter[..=i]`
    /// that is also a suffix of it.
    lps: Vec<usize>,
    match_index: usize,
    inspect_index: usize,
}

impl DelimiterSplitter {
    pub fn new(delimiter: impl Into<Vec<u8>>) -> Result<Self, EmptyDelimiter> {
        let delimiter = delimiter.into();
        if delimiter.is_empty() {
            return Err(EmptyDelimiter);
        }
        let lps = longest_prefix_suffix(&delimiter);
        Ok(Self {
            delimiter,
            lps,
            match_index: 0,
            inspect_index: 0,
        })
    }

    #[must_use]
    pub fn delimiter(&self) -> &[u8] {
        &self.delimiter
    }

    fn reset(&mut self) {
        self.match_index = 0;
        self.inspect_index = 0;
    }
}

impl Decoder for DelimiterSplitter {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, io::Error> {
        while self.inspect_index < buf.len() {
            if buf[self.inspect_index] == self.delimiter[self.match_index] {
                self.inspect_index += 1;
                self.match_index += 1;
                if self.match_index == self.delimiter.len() {
                    let end = self.inspect_index;
                    let mut segment = buf.split_to(end);
                    segment.truncate(end - self.delimiter.len());
                    self.reset();
                    return Ok(Some(segment.freeze()));
                }
            } else if self.match_index == 0 {
                self.inspect_index += 1;
            } else {
                // Fall back without moving inspect_index: the bytes already
                // matched are a prefix of the delimiter by construction.
                self.match_index = self.lps[self.match_index - 1];
            }
        }
        Ok(None)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, io::Error> {
        if let Some(segment) = self.decode(buf)? {
            return Ok(Some(segment));
        }
        self.reset();
        if buf.is_empty() {
            Ok(None)
        } else {
            Ok(Some(buf.split().freeze()))
        }
    }
}

fn longest_prefix_suffix(pattern: &[u8]) -> Vec<usize> {
    let mut lps = vec![0; pattern.len()];
    let mut prefix_end = 0;
    let mut i = 1;
    while i < pattern.len() {
        if pattern[i] == pattern[prefix_end] {
            prefix_end += 1;
            lps[i] = prefix_end;
            i += 1;
        } else if prefix_end == 0 {
            lps[i] = 0;
            i += 1;
        } else {
            prefix_end = lps[prefix_end - 1];
        }
    }
    lps
}
