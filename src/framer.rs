//! Line framing for the device byte stream.
//!
//! The device writes ASCII lines terminated by `\r`, `\n` or both. Reads from the
//! transport return arbitrary chunks, so a line may arrive in pieces and a single
//! chunk may hold several lines.
//!
//! [`LineFramer`] is usable two ways:
//! - directly, through [`LineFramer::ingest`], which keeps its own buffer
//! - as a [`tokio_util::codec::Decoder`] yielding [`FramedLine`], driven by
//!   `FramedRead` in the session reader
//!
//! `\r` and `\n` are interchangeable delimiters and empty lines are never
//! emitted, so `\r\n` split across two reads produces no spurious line.
//!
//! Lines are capped at `max_line_len` bytes. A line that outgrows the cap is
//! dropped as a whole, up to its delimiter, and reported once. Only bytes that
//! arrived since the previous call are scanned for a delimiter.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{trace, warn};

/// Default cap on a single line, in bytes.
pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

fn is_delimiter(byte: u8) -> bool {
    byte == b'\r' || byte == b'\n'
}

/// One item produced by the framer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramedLine {
    /// A complete, non-empty line without its delimiter
    Line(String),
    /// A line exceeded the cap; its first `discarded` bytes were dropped and the
    /// rest is skipped up to the next delimiter
    Oversized { discarded: usize },
}

/// Byte stream to line splitter.
#[derive(Debug)]
pub struct LineFramer {
    buffer: BytesMut,
    max_line_len: usize,
    /// Bytes at the front of the pending tail already known to hold no delimiter
    scanned: usize,
    /// Skipping the remainder of an oversized line
    discarding: bool,
    oversized: u64,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::with_max_line_len(DEFAULT_MAX_LINE_LEN)
    }
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Framer that drops lines longer than `max_line_len` bytes (at least 1).
    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_line_len: max_line_len.max(1),
            scanned: 0,
            discarding: false,
            oversized: 0,
        }
    }

    pub fn max_line_len(&self) -> usize {
        self.max_line_len
    }

    /// Append a chunk and return every line it completes, in arrival order.
    ///
    /// Oversized lines are logged and counted, never returned.
    pub fn ingest(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(item) = self.next_line(&mut buffer) {
            if let FramedLine::Line(line) = item {
                lines.push(line);
            }
        }
        self.buffer = buffer;
        lines
    }

    /// Bytes of the incomplete trailing line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Lines dropped for exceeding the cap.
    pub fn oversized_lines(&self) -> u64 {
        self.oversized
    }

    /// Drop any incomplete line, e.g. on disconnect.
    pub fn reset(&mut self) {
        if !self.buffer.is_empty() {
            trace!(bytes = self.buffer.len(), "Discarding partial line");
        }
        self.buffer.clear();
        self.scanned = 0;
        self.discarding = false;
    }

    /// Take the next item off the front of `buffer`.
    ///
    /// Returns `None` when only an unterminated tail (or nothing) remains.
    fn next_line(&mut self, buffer: &mut BytesMut) -> Option<FramedLine> {
        loop {
            let start = self.scanned.min(buffer.len());
            let Some(offset) = buffer[start..].iter().position(|&b| is_delimiter(b)) else {
                return self.hold_tail(buffer);
            };

            let line = buffer.split_to(start + offset);
            buffer.advance(1);
            self.scanned = 0;

            if self.discarding {
                self.discarding = false;
                trace!(bytes = line.len(), "Skipped rest of oversized line");
                continue;
            }
            if line.len() > self.max_line_len {
                return Some(self.report_oversized(line.len()));
            }
            if !line.is_empty() {
                return Some(FramedLine::Line(String::from_utf8_lossy(&line).into_owned()));
            }
        }
    }

    fn hold_tail(&mut self, buffer: &mut BytesMut) -> Option<FramedLine> {
        if self.discarding {
            buffer.clear();
            self.scanned = 0;
            return None;
        }
        if buffer.len() > self.max_line_len {
            let discarded = buffer.len();
            buffer.clear();
            self.scanned = 0;
            self.discarding = true;
            return Some(self.report_oversized(discarded));
        }
        self.scanned = buffer.len();
        None
    }

    fn report_oversized(&mut self, discarded: usize) -> FramedLine {
        self.oversized += 1;
        warn!(discarded, max = self.max_line_len, "Dropping oversized line");
        FramedLine::Oversized { discarded }
    }
}

impl Decoder for LineFramer {
    type Item = FramedLine;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<FramedLine>, Self::Error> {
        Ok(self.next_line(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<FramedLine>, Self::Error> {
        let line = self.decode(src)?;
        if line.is_none() && !src.is_empty() {
            // Device input stopped mid-line; this is not a framing error.
            trace!(bytes = src.len(), "Discarding partial line at end of stream");
            src.clear();
            self.scanned = 0;
        }
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Reference split of a complete input: delimiters removed, empties dropped,
    /// unterminated tail excluded.
    fn reference_lines(input: &[u8]) -> Vec<String> {
        let terminated = match input.iter().rposition(|&b| is_delimiter(b)) {
            Some(last) => &input[..last],
            None => return Vec::new(),
        };
        terminated
            .split(|&b| is_delimiter(b))
            .filter(|part| !part.is_empty())
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .collect()
    }

    #[test]
    fn emits_complete_lines_only() {
        let mut framer = LineFramer::new();
        assert!(framer.ingest(b"$DATA,1,2").is_empty());
        assert_eq!(framer.pending(), 9);

        let lines = framer.ingest(b"5.5\n$FILTER_ACK,R,45\r\nSPEC");
        assert_eq!(lines, vec!["$DATA,1,25.5", "$FILTER_ACK,R,45"]);
        assert_eq!(framer.pending(), 4);
    }

    #[test]
    fn split_crlf_does_not_emit_empty_line() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.ingest(b"SPECTRAL_ACK:13\r"), vec!["SPECTRAL_ACK:13"]);
        assert!(framer.ingest(b"\n").is_empty());
        assert!(framer.ingest(b"\r\n\n\r").is_empty());
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn reset_discards_partial_line() {
        let mut framer = LineFramer::new();
        framer.ingest(b"$DATA,4,1");
        framer.reset();
        assert_eq!(framer.pending(), 0);
        assert_eq!(framer.ingest(b"2\n"), vec!["2"]);
    }

    #[test]
    fn decoder_discards_tail_at_eof() {
        let mut framer = LineFramer::new();
        let mut buffer = BytesMut::from(&b"first\nsecond"[..]);

        assert_eq!(framer.decode(&mut buffer).unwrap(), Some(FramedLine::Line("first".into())));
        assert_eq!(framer.decode(&mut buffer).unwrap(), None);
        assert_eq!(framer.decode_eof(&mut buffer).unwrap(), None);
        assert!(buffer.is_empty());
    }

    #[test]
    fn undelimited_flood_stays_bounded() {
        let mut framer = LineFramer::with_max_line_len(256);
        let chunk = [b'x'; 1024];

        for _ in 0..4096 {
            assert!(framer.ingest(&chunk).is_empty());
            assert!(framer.pending() <= 256);
        }
        assert_eq!(framer.oversized_lines(), 1);

        // The rest of the oversized line is skipped up to its delimiter
        let lines = framer.ingest(b"tail of the flood
SPECTRAL_ACK:13
");
        assert_eq!(lines, vec!["SPECTRAL_ACK:13"]);
        assert_eq!(framer.pending(), 0);
        assert_eq!(framer.oversized_lines(), 1);
    }

    #[test]
    fn terminated_line_over_the_cap_is_dropped() {
        let mut framer = LineFramer::with_max_line_len(8);
        assert!(framer.ingest(b"$DATA,1,").is_empty());
        assert_eq!(framer.ingest(b"25.5\nOK\n"), vec!["OK"]);
        assert_eq!(framer.oversized_lines(), 1);
    }

    #[test]
    fn decoder_reports_oversized_once() {
        let mut framer = LineFramer::with_max_line_len(4);
        let mut buffer = BytesMut::from(&b"abcdef"[..]);

        assert_eq!(framer.decode(&mut buffer).unwrap(), Some(FramedLine::Oversized { discarded: 6 }));
        assert!(buffer.is_empty());

        buffer.extend_from_slice(b"ghij\nok\n");
        assert_eq!(framer.decode(&mut buffer).unwrap(), Some(FramedLine::Line("ok".into())));
        assert_eq!(framer.decode(&mut buffer).unwrap(), None);
    }

    #[test]
    fn pending_tail_is_not_rescanned() {
        let mut framer = LineFramer::new();
        for _ in 0..100 {
            assert!(framer.ingest(b"0123456789").is_empty());
        }
        assert_eq!(framer.scanned, 1000);
        assert_eq!(framer.ingest(b"\n").len(), 1);
        assert_eq!(framer.scanned, 0);
    }

    proptest! {
        #[test]
        fn prop_chunk_boundaries_do_not_change_output(
            input in prop::collection::vec(
                prop::sample::select(vec![b'a', b'7', b',', b'.', b'$', b'\r', b'\n']),
                0..200,
            ),
            cuts in prop::collection::vec(0usize..200, 0..20),
        ) {
            let mut cuts: Vec<usize> = cuts.into_iter().filter(|&c| c <= input.len()).collect();
            cuts.push(0);
            cuts.push(input.len());
            cuts.sort_unstable();
            cuts.dedup();

            let mut framer = LineFramer::new();
            let mut emitted = Vec::new();
            for window in cuts.windows(2) {
                emitted.extend(framer.ingest(&input[window[0]..window[1]]));
            }

            prop_assert_eq!(&emitted, &reference_lines(&input));
            prop_assert!(emitted.iter().all(|line| !line.is_empty()));

            let tail = match input.iter().rposition(|&b| is_delimiter(b)) {
                Some(last) => input.len() - last - 1,
                None => input.len(),
            };
            prop_assert_eq!(framer.pending(), tail);
        }
    }
}
