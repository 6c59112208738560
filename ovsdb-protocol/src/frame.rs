//! Incremental framing of JSON-RPC documents on a byte stream.
//!
//! OVSDB sends JSON-RPC messages back to back with no length prefix or
//! delimiter. A message ends when the top-level object's braces balance:
//!
//! ```text
//!   {"id":1,"result":[...]}{"method":"update",...}   {"id":2,...
//!   ^---- frame 1 -------^^------- frame 2 -----^   ^-- partial, kept
//! ```
//!
//! Braces inside string literals do not count. A quote ends a string only
//! when it is preceded by an even-length run of backslashes, which the
//! scanner tracks with a single `escaped` flag so it never has to look
//! back across read boundaries.

use crate::error::ProtocolError;
use crate::DEFAULT_MAX_FRAME_LENGTH;
use bytes::{Buf, Bytes, BytesMut};
use serde_json::Value;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Bytes needed before the encoding of a message can be checked.
const ENCODING_PROBE_LEN: usize = 2;

/// Per-message scanner state, carried across partial reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanState {
    /// Offset of the next unscanned byte, relative to the message start.
    pub position: usize,
    /// Current brace depth.
    pub depth: usize,
    /// Inside a string literal.
    pub in_string: bool,
    /// The previous byte was an unescaped backslash inside a string.
    pub escaped: bool,
    /// Depth has been above zero during this message.
    pub opened: bool,
    /// Leading whitespace was skipped and the encoding checked.
    pub started: bool,
}

/// Result of scanning a message buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// The message ends at this offset (exclusive).
    Complete(usize),
    /// More bytes are needed; resume from this state.
    Incomplete(ScanState),
    /// The message would exceed the limit; carries the scanned length.
    TooLong(usize),
}

/// Scans `buf` (which starts at the first byte of a message) from
/// `state.position` onwards.
pub fn scan(mut state: ScanState, buf: &[u8], max_frame_length: usize) -> Scan {
    for (i, &byte) in buf.iter().enumerate().skip(state.position) {
        if i >= max_frame_length {
            return Scan::TooLong(i + 1);
        }

        if state.in_string {
            if state.escaped {
                state.escaped = false;
            } else if byte == b'\\' {
                state.escaped = true;
            } else if byte == b'"' {
                state.in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => state.in_string = true,
            b'{' => {
                state.depth += 1;
                state.opened = true;
            }
            b'}' => {
                state.depth = state.depth.saturating_sub(1);
                if state.opened && state.depth == 0 {
                    return Scan::Complete(i + 1);
                }
            }
            _ => {}
        }
    }

    state.position = buf.len();
    Scan::Incomplete(state)
}

fn is_json_whitespace(byte: &u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r')
}

/// Rejects UTF-16 and UTF-32 streams from the first bytes of a message.
fn check_encoding(head: &[u8]) -> Result<(), ProtocolError> {
    match head {
        [0xFE, 0xFF, ..] => Err(ProtocolError::InvalidEncoding("UTF-16BE")),
        [0xFF, 0xFE, 0x00, 0x00, ..] => Err(ProtocolError::InvalidEncoding("UTF-32LE")),
        [0xFF, 0xFE, ..] => Err(ProtocolError::InvalidEncoding("UTF-16LE")),
        [0x00, 0x00, ..] => Err(ProtocolError::InvalidEncoding("UTF-32BE")),
        [0x00, _, ..] => Err(ProtocolError::InvalidEncoding("UTF-16BE")),
        [_, 0x00, 0x00, 0x00, ..] => Err(ProtocolError::InvalidEncoding("UTF-32LE")),
        [_, 0x00, ..] => Err(ProtocolError::InvalidEncoding("UTF-16LE")),
        _ => Ok(()),
    }
}

/// Splits a byte stream into complete JSON documents.
///
/// Owned by exactly one reader; `feed` takes `&mut self` and the decoder is
/// not meant to be shared between reading contexts.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    state: ScanState,
    max_frame_length: usize,
    failed: bool,
    frames_decoded: u64,
    frames_dropped: u64,
}

impl FrameDecoder {
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            state: ScanState::default(),
            max_frame_length,
            failed: false,
            frames_decoded: 0,
            frames_dropped: 0,
        }
    }

    /// Feeds bytes and returns every document completed by them.
    ///
    /// Documents completed earlier in the same call are lost if a fatal
    /// error is returned; use [`FrameDecoder::feed_into`] to keep them.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Value>, ProtocolError> {
        let mut documents = Vec::new();
        self.feed_into(data, &mut documents)?;
        Ok(documents)
    }

    /// Feeds bytes, appending completed documents to `out`.
    ///
    /// On a fatal error, `out` still holds the documents that completed
    /// before the fault. After a fatal error the decoder ignores all input.
    pub fn feed_into(&mut self, data: &[u8], out: &mut Vec<Value>) -> Result<(), ProtocolError> {
        if self.failed {
            tracing::trace!("ignoring {} bytes after fatal framing error", data.len());
            return Ok(());
        }

        self.buffer.extend_from_slice(data);

        loop {
            let frame = match self.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(e) => {
                    tracing::error!("fatal framing error: {}", e);
                    self.failed = true;
                    self.discard();
                    return Err(e);
                }
            };

            match serde_json::from_slice::<Value>(&frame) {
                Ok(doc) => {
                    self.frames_decoded += 1;
                    out.push(doc);
                }
                Err(e) => {
                    self.frames_dropped += 1;
                    tracing::warn!("dropping malformed frame ({} bytes): {}", frame.len(), e);
                }
            }
        }
    }

    /// Extracts the next complete frame from the buffer, if any.
    fn next_frame(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        if !self.state.started && !self.start_message()? {
            return Ok(None);
        }

        match scan(self.state, &self.buffer, self.max_frame_length) {
            Scan::Complete(end) => {
                let frame = self.buffer.split_to(end).freeze();
                self.state = ScanState::default();
                Ok(Some(frame))
            }
            Scan::Incomplete(state) => {
                self.state = state;
                Ok(None)
            }
            Scan::TooLong(length) => Err(ProtocolError::FrameTooLong {
                length,
                max: self.max_frame_length,
            }),
        }
    }

    /// Skips leading whitespace and checks the encoding of a fresh message.
    /// Returns false while there are not enough bytes to decide.
    fn start_message(&mut self) -> Result<bool, ProtocolError> {
        loop {
            let skip = self
                .buffer
                .iter()
                .take_while(|b| is_json_whitespace(b))
                .count();
            self.buffer.advance(skip);

            if self.buffer.first() == Some(&UTF8_BOM[0]) {
                if self.buffer.len() < UTF8_BOM.len() {
                    return Ok(false);
                }
                if self.buffer.starts_with(&UTF8_BOM) {
                    self.buffer.advance(UTF8_BOM.len());
                    continue;
                }
            }
            break;
        }

        if self.buffer.len() < ENCODING_PROBE_LEN {
            return Ok(false);
        }
        check_encoding(&self.buffer)?;
        self.state.started = true;
        Ok(true)
    }

    /// Drops any partially buffered message.
    pub fn discard(&mut self) {
        if !self.buffer.is_empty() {
            tracing::debug!("discarding {} buffered bytes", self.buffer.len());
        }
        self.buffer.clear();
        self.state = ScanState::default();
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }

    /// Returns whether a fatal error has stopped this decoder.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Frames that were delimited but did not parse as JSON.
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ValueCodec;
    use crate::value::{Uuid, UuidKind};
    use proptest::prelude::*;
    use serde_json::json;

    const ECHO: &str = r#"{"id":"echo","method":"echo","params":[]}"#;

    #[test]
    fn test_single_frame() {
        let mut decoder = FrameDecoder::default();
        let docs = decoder.feed(ECHO.as_bytes()).unwrap();
        assert_eq!(docs, vec![json!({"id":"echo","method":"echo","params":[]})]);
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.frames_decoded(), 1);
    }

    #[test]
    fn test_multiple_frames_in_one_feed() {
        let mut decoder = FrameDecoder::default();
        let input = br#"{"id":1,"result":[]}{"id":2,"result":{}}"#;
        let docs = decoder.feed(input).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["id"], 1);
        assert_eq!(docs[1]["id"], 2);
    }

    #[test]
    fn test_whitespace_between_frames() {
        let mut decoder = FrameDecoder::default();
        let input = b"  {\"a\":1}\n\r\n\t{\"b\":2}\n";
        let docs = decoder.feed(input).unwrap();
        assert_eq!(docs, vec![json!({"a":1}), json!({"b":2})]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_whitespace_only_feeds_are_not_buffered() {
        let mut decoder = FrameDecoder::default();
        assert!(decoder.feed(b"   \n").unwrap().is_empty());
        assert_eq!(decoder.buffered(), 0);
        assert!(decoder.feed(b"\t\t").unwrap().is_empty());
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.feed(b" {}").unwrap(), vec![json!({})]);
    }

    #[test]
    fn test_partial_frame_every_split_offset() {
        let bytes = br#"{"method":"update","params":["mon",{"Bridge":{"x":{"new":{"name":"br}{0"}}}}],"id":null}"#;
        let mut whole = FrameDecoder::default();
        let expected = whole.feed(bytes).unwrap();
        assert_eq!(expected.len(), 1);

        for split in 0..=bytes.len() {
            let mut decoder = FrameDecoder::default();
            let mut docs = decoder.feed(&bytes[..split]).unwrap();
            if split < bytes.len() {
                assert!(docs.is_empty(), "early frame at split {}", split);
            }
            docs.extend(decoder.feed(&bytes[split..]).unwrap());
            assert_eq!(docs, expected, "split at {}", split);
        }
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let mut decoder = FrameDecoder::default();
        let docs = decoder.feed(br#"{"a":"x\"{}y"}"#).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["a"], "x\"{}y");
    }

    #[test]
    fn test_even_backslash_run_ends_string() {
        // The value is a single backslash; the quote after `\\` closes it.
        let mut decoder = FrameDecoder::default();
        let docs = decoder.feed(br#"{"a":"x\\"}{"b":"}"}"#).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["a"], "x\\");
        assert_eq!(docs[1]["b"], "}");
    }

    #[test]
    fn test_escape_split_across_feeds() {
        let mut decoder = FrameDecoder::default();
        assert!(decoder.feed(br#"{"a":"q\"#).unwrap().is_empty());
        assert!(decoder.state().escaped);
        assert!(decoder.feed(br#""}"#).unwrap().is_empty());
        let docs = decoder.feed(br#""}"#).unwrap();
        assert_eq!(docs, vec![json!({"a": "q\"}"})]);
    }

    #[test]
    fn test_nested_objects() {
        let mut decoder = FrameDecoder::default();
        let docs = decoder
            .feed(br#"{"a":{"b":{"c":{}}},"d":[{"e":1},{"f":2}]}"#)
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["d"][1]["f"], 2);
    }

    #[test]
    fn test_frame_too_long_raised_once() {
        let mut decoder = FrameDecoder::new(16);
        let err = decoder.feed(br#"{"key":"0123456789abcdef"#).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLong { max: 16, .. }));
        assert!(err.is_fatal());
        assert!(decoder.is_failed());
        assert_eq!(decoder.buffered(), 0);

        // Later input is not consumed, even if it contains valid frames.
        assert!(decoder.feed(b"\"}{}").unwrap().is_empty());
        assert!(decoder.feed(b"{}").unwrap().is_empty());
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_frame_too_long_across_partial_reads() {
        let mut decoder = FrameDecoder::new(10);
        assert!(decoder.feed(b"{\"abc").unwrap().is_empty());
        assert!(decoder.feed(b"defg").unwrap().is_empty());
        let err = decoder.feed(b"hij\":1}").unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLong { length: 11, max: 10 }));
    }

    #[test]
    fn test_unbalanced_garbage_hits_limit() {
        let mut decoder = FrameDecoder::new(64);
        let garbage = vec![b'x'; 65];
        let err = decoder.feed(&garbage).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLong { .. }));
    }

    #[test]
    fn test_frame_exactly_at_limit() {
        let frame = br#"{"k":"v"}"#;
        let mut decoder = FrameDecoder::new(frame.len());
        assert_eq!(decoder.feed(frame).unwrap().len(), 1);

        let mut decoder = FrameDecoder::new(frame.len() - 1);
        assert!(decoder.feed(frame).is_err());
    }

    #[test]
    fn test_leading_whitespace_not_counted_toward_limit() {
        let mut decoder = FrameDecoder::new(4);
        let err = decoder.feed(b"          {\"\":0}").unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLong { length: 5, max: 4 }));

        let mut decoder = FrameDecoder::new(2);
        assert_eq!(decoder.feed(b"                {}").unwrap().len(), 1);
    }

    #[test]
    fn test_documents_before_fault_are_kept() {
        let mut decoder = FrameDecoder::new(8);
        let mut out = Vec::new();
        let err = decoder
            .feed_into(br#"{"a":1}{"long":"value"}"#, &mut out)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLong { .. }));
        assert_eq!(out, vec![json!({"a":1})]);
    }

    #[test]
    fn test_rejects_utf16() {
        let utf16le: Vec<u8> = "{}".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        let mut decoder = FrameDecoder::default();
        let err = decoder.feed(&utf16le).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidEncoding("UTF-16LE")));
        assert!(decoder.is_failed());

        let utf16be: Vec<u8> = "{}".encode_utf16().flat_map(|u| u.to_be_bytes()).collect();
        let mut decoder = FrameDecoder::default();
        let err = decoder.feed(&utf16be).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidEncoding("UTF-16BE")));

        let mut decoder = FrameDecoder::default();
        let err = decoder.feed(&[0xFF, 0xFE, b'{', 0x00]).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidEncoding(_)));
    }

    #[test]
    fn test_rejects_utf32() {
        let mut decoder = FrameDecoder::default();
        let err = decoder.feed(&[b'{', 0, 0, 0, b'}', 0, 0, 0]).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidEncoding("UTF-32LE")));

        let mut decoder = FrameDecoder::default();
        let err = decoder.feed(&[0, 0, 0, b'{']).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidEncoding("UTF-32BE")));
    }

    #[test]
    fn test_encoding_checked_per_message() {
        let mut decoder = FrameDecoder::default();
        let mut input = b"{}".to_vec();
        input.extend([0x00, b'{', 0x00, b'}']);
        let mut out = Vec::new();
        let err = decoder.feed_into(&input, &mut out).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidEncoding(_)));
        assert_eq!(out, vec![json!({})]);
    }

    #[test]
    fn test_utf8_bom_is_skipped() {
        let mut decoder = FrameDecoder::default();
        assert!(decoder.feed(&UTF8_BOM[..2]).unwrap().is_empty());
        let mut rest = vec![UTF8_BOM[2]];
        rest.extend_from_slice(b"{\"x\":true}");
        assert_eq!(decoder.feed(&rest).unwrap(), vec![json!({"x": true})]);
    }

    #[test]
    fn test_non_ascii_utf8_payload() {
        let mut decoder = FrameDecoder::default();
        let docs = decoder.feed("{\"name\":\"brücke-{é}\"}".as_bytes()).unwrap();
        assert_eq!(docs[0]["name"], "brücke-{é}");
    }

    #[test]
    fn test_malformed_frame_is_dropped() {
        let mut decoder = FrameDecoder::default();
        let docs = decoder.feed(br#"{"a":}{"b":1}"#).unwrap();
        assert_eq!(docs, vec![json!({"b":1})]);
        assert_eq!(decoder.frames_dropped(), 1);
        assert!(!decoder.is_failed());
    }

    #[test]
    fn test_discard_drops_partial_frame() {
        let mut decoder = FrameDecoder::default();
        assert!(decoder.feed(br#"{"id":1,"res"#).unwrap().is_empty());
        assert!(decoder.buffered() > 0);
        decoder.discard();
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.state(), ScanState::default());
        assert_eq!(decoder.feed(b"{}").unwrap(), vec![json!({})]);
    }

    #[test]
    fn test_scan_is_resumable() {
        let buf = br#"{"a":"}"#;
        let state = match scan(ScanState::default(), buf, 100) {
            Scan::Incomplete(state) => state,
            other => panic!("expected incomplete, got {:?}", other),
        };
        assert!(state.in_string);
        assert_eq!(state.depth, 1);
        assert_eq!(state.position, buf.len());

        let mut longer = buf.to_vec();
        longer.extend_from_slice(br#""}tail"#);
        assert_eq!(scan(state, &longer, 100), Scan::Complete(buf.len() + 2));
    }

    #[test]
    fn test_end_to_end_uuid_result() {
        let mut decoder = FrameDecoder::default();
        let docs = decoder
            .feed(br#"{"id":1,"result":["uuid","123e4567-e89b-12d3-a456-426614174000"],"error":null}"#)
            .unwrap();
        assert_eq!(docs.len(), 1);

        let uuid = ValueCodec::default().decode_uuid(&docs[0]["result"]).unwrap();
        assert_eq!(uuid, Uuid::new("123e4567-e89b-12d3-a456-426614174000"));
        assert_eq!(uuid.kind(), UuidKind::Uuid);
    }

    fn frame_stream() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(("[a-z{}\\[\\]\" ]{0,10}", 0i64..1000), 1..4).prop_map(|pairs| {
            let mut out = Vec::new();
            for (text, n) in pairs {
                let doc = json!({"s": text, "n": n, "o": {"nested": [text]}});
                out.extend(serde_json::to_vec(&doc).unwrap());
                out.push(b'\n');
            }
            out
        })
    }

    proptest! {
        #[test]
        fn prop_chunking_does_not_change_output(
            stream in frame_stream(),
            chunk in 1usize..32,
        ) {
            let mut whole = FrameDecoder::default();
            let expected = whole.feed(&stream).unwrap();

            let mut decoder = FrameDecoder::default();
            let mut docs = Vec::new();
            for piece in stream.chunks(chunk) {
                docs.extend(decoder.feed(piece).unwrap());
            }
            prop_assert_eq!(docs, expected);
            prop_assert_eq!(decoder.buffered(), 0);
        }
    }
}
