//! `\n` / `\r\n` line framing

use bytes::{Bytes, BytesMut};
use std::io;
use tokio_util::codec::Decoder;

const LF: u8 = b'\n';
const CR: u8 = b'\r';

/// Splits a byte stream into lines terminated by `\n` or `\r\n`.
///
/// Only LF terminates a line. A CR immediately before the LF is part of the
/// terminator; a CR anywhere else is ordinary content. A CR that lands at the
/// very end of a chunk is therefore held back until the next chunk shows
/// whether an LF follows it.
///
/// With `keep_line_breaks` the terminator (`\n` or `\r\n`) stays attached to
/// each emitted line, so concatenating the output reproduces the input.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineSplitter {
    keep_line_breaks: bool,
    /// Bytes before this offset are known to contain no LF.
    next_index: usize,
}

impl LineSplitter {
    /// Splitter that strips line terminators.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            keep_line_breaks: false,
            next_index: 0,
        }
    }

    /// Splitter that keeps line terminators verbatim.
    #[must_use]
    pub const fn keep_line_breaks() -> Self {
        Self {
            keep_line_breaks: true,
            next_index: 0,
        }
    }

    #[must_use]
    pub const fn keeps_line_breaks(&self) -> bool {
        self.keep_line_breaks
    }
}

impl Decoder for LineSplitter {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, io::Error> {
        let Some(offset) = buf[self.next_index..].iter().position(|b| *b == LF) else {
            self.next_index = buf.len();
            return Ok(None);
        };

        let lf_index = self.next_index + offset;
        self.next_index = 0;
        let mut line = buf.split_to(lf_index + 1);
        if !self.keep_line_breaks {
            line.truncate(lf_index);
            if line.last() == Some(&CR) {
                line.truncate(lf_index - 1);
            }
        }
        Ok(Some(line.freeze()))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if buf.is_empty() {
            Ok(None)
        } else {
            Ok(Some(buf.split().freeze()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChunkSplitter;
    use proptest::prelude::*;

    const CHUNKS: [&str; 6] = [
        "qwertzu",
        "iopasd\r\nmnbvc",
        "xylk\njhgfds\napoiuzt",
        "qwr09eiqwrjiowqr\r",
        "\nrewq0987654321\n",
        "foo\n\r\n\nbar",
    ];

    fn collect(splitter: LineSplitter, chunks: &[&str]) -> Vec<String> {
        let mut splitter = ChunkSplitter::new(splitter);
        let mut lines = Vec::new();
        for chunk in chunks {
            lines.extend(splitter.feed(chunk.as_bytes()).unwrap());
        }
        lines.extend(splitter.finish().unwrap());
        lines
            .into_iter()
            .map(|line| String::from_utf8(line.to_vec()).unwrap())
            .collect()
    }

    #[test]
    fn test_strips_line_breaks() {
        assert_eq!(
            collect(LineSplitter::new(), &CHUNKS),
            vec![
                "qwertzuiopasd",
                "mnbvcxylk",
                "jhgfds",
                "apoiuztqwr09eiqwrjiowqr",
                "rewq0987654321",
                "foo",
                "",
                "",
                "bar",
            ]
        );
    }

    #[test]
    fn test_keeps_line_breaks() {
        assert_eq!(
            collect(LineSplitter::keep_line_breaks(), &CHUNKS),
            vec![
                "qwertzuiopasd\r\n",
                "mnbvcxylk\n",
                "jhgfds\n",
                "apoiuztqwr09eiqwrjiowqr\r\n",
                "rewq0987654321\n",
                "foo\n",
                "\r\n",
                "\n",
                "bar",
            ]
        );
    }

    #[test]
    fn test_trailing_segment_only_on_finish() {
        let mut splitter = ChunkSplitter::new(LineSplitter::new());
        assert!(splitter.feed(b"abc").unwrap().is_empty());
        assert_eq!(splitter.feed(b"def\n").unwrap(), vec!["abcdef"]);
        assert!(splitter.feed(b"ghi").unwrap().is_empty());
        assert_eq!(splitter.pending(), 3);
        assert_eq!(splitter.finish().unwrap(), vec!["ghi"]);
    }

    #[test]
    fn test_lone_cr_is_content() {
        assert_eq!(collect(LineSplitter::new(), &["a\rb\n", "c\r"]), vec!["a\rb", "c\r"]);
    }

    #[test]
    fn test_cr_held_at_chunk_end() {
        let mut splitter = ChunkSplitter::new(LineSplitter::new());
        assert!(splitter.feed(b"abc\r").unwrap().is_empty());
        assert_eq!(splitter.feed(b"\ndef").unwrap(), vec!["abc"]);
    }

    #[test]
    fn test_empty_input_emits_nothing() {
        assert!(collect(LineSplitter::new(), &[]).is_empty());
        assert!(collect(LineSplitter::new(), &["", ""]).is_empty());
    }

    proptest! {
        #[test]
        fn prop_chunking_does_not_change_lines(
            data in proptest::collection::vec(
                prop_oneof![Just(b'x'), Just(b'y'), Just(b'\r'), Just(b'\n')],
                0..80,
            ),
            cuts in proptest::collection::vec(0usize..80, 0..10),
            keep in any::<bool>(),
        ) {
            let make = || if keep { LineSplitter::keep_line_breaks() } else { LineSplitter::new() };

            let mut whole = ChunkSplitter::new(make());
            let mut expected = whole.feed(&data).unwrap();
            expected.extend(whole.finish().unwrap());

            let mut cuts: Vec<usize> = cuts.into_iter().filter(|c| *c <= data.len()).collect();
            cuts.sort_unstable();
            let mut chunked = ChunkSplitter::new(make());
            let mut actual = Vec::new();
            let mut start = 0;
            for cut in cuts {
                actual.extend(chunked.feed(&data[start..cut]).unwrap());
                start = cut;
            }
            actual.extend(chunked.feed(&data[start..]).unwrap());
            actual.extend(chunked.finish().unwrap());

            prop_assert_eq!(&actual, &expected);
            if keep {
                let joined: Vec<u8> = actual.iter().flat_map(|line| line.iter().copied()).collect();
                prop_assert_eq!(joined, data);
            }
        }
    }
}
