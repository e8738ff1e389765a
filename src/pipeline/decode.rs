//! Streaming decoders (Bytes -> RawFrame -> Frame)

use crate::types::events::{Frame, RawFrame, DEFAULT_EVENT};
use crate::BoxStream;
use bytes::Bytes;
use futures::{stream, StreamExt};
use std::collections::VecDeque;
use tracing::{debug, warn};

const BOUNDARY: &[u8] = b"\n\n";

/// Incremental event stream parser.
///
/// Bytes after the last complete boundary stay buffered and are prefixed onto
/// the next delivery, so a frame (or a multi-byte UTF-8 character) split
/// across two reads is reassembled exactly once.
#[derive(Debug, Default)]
pub struct EventFrameParser {
    buf: Vec<u8>,
    /// Prefix of `buf` already searched without finding a boundary start.
    scanned: usize,
}

impl EventFrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, fragment: &str) -> Vec<RawFrame> {
        self.feed_bytes(fragment.as_bytes())
    }

    pub fn feed_bytes(&mut self, bytes: &[u8]) -> Vec<RawFrame> {
        self.buf.extend_from_slice(bytes);

        let mut frames = Vec::new();
        let mut start = 0;
        let mut search_from = self.scanned;
        while let Some(pos) = find_boundary(&self.buf[search_from..]) {
            let end = search_from + pos;
            if let Some(frame) = parse_block(&self.buf[start..end]) {
                frames.push(frame);
            }
            start = end + BOUNDARY.len();
            search_from = start;
        }
        if start > 0 {
            self.buf.drain(..start);
        }
        // A boundary may straddle the tail, so its first byte is rescanned.
        self.scanned = self.buf.len().saturating_sub(BOUNDARY.len() - 1);
        frames
    }

    /// End of input: parse whatever is left as a final frame.
    pub fn finish(&mut self) -> Option<RawFrame> {
        let rest = std::mem::take(&mut self.buf);
        self.scanned = 0;
        parse_block(&rest)
    }

    /// Number of buffered bytes not yet terminated by a boundary.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn find_boundary(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(BOUNDARY.len())
        .position(|w| w == BOUNDARY)
}

fn parse_block(block: &[u8]) -> Option<RawFrame> {
    let text = String::from_utf8_lossy(block);
    let mut event: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        // Ignore blank and comment lines
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.find(':') {
            Some(idx) => (&line[..idx], line[idx + 1..].trim()),
            None => (line, ""),
        };
        match field.trim() {
            "event" => event = Some(value.to_string()),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    let data = data_lines.join("\n");
    if data.trim().is_empty() {
        return None;
    }

    Some(RawFrame {
        event: event
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
        data,
    })
}

/// Decode one raw frame. Malformed JSON and unknown kinds are logged and dropped.
pub fn decode_frame(raw: &RawFrame) -> Option<Frame> {
    match Frame::from_raw(raw) {
        Ok(Some(frame)) => Some(frame),
        Ok(None) => {
            debug!(event = raw.event.as_str(), "ignoring frame of unknown kind");
            None
        }
        Err(e) => {
            warn!(
                event = raw.event.as_str(),
                error = %e,
                "dropping frame with malformed JSON data"
            );
            None
        }
    }
}

/// Turns a transport byte stream into typed frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameDecoder;

impl FrameDecoder {
    pub fn decode_stream(&self, input: BoxStream<'static, Bytes>) -> BoxStream<'static, Frame> {
        let state = (input, EventFrameParser::new(), VecDeque::new(), false);

        let stream = stream::unfold(
            state,
            |(mut input, mut parser, mut ready, mut eof): (
                BoxStream<'static, Bytes>,
                EventFrameParser,
                VecDeque<Frame>,
                bool,
            )| async move {
                loop {
                    if let Some(frame) = ready.pop_front() {
                        return Some((Ok(frame), (input, parser, ready, eof)));
                    }
                    if eof {
                        return None;
                    }

                    // Need more data.
                    match input.next().await {
                        Some(Ok(bytes)) => {
                            ready.extend(parser.feed_bytes(&bytes).iter().filter_map(decode_frame));
                        }
                        Some(Err(e)) => {
                            return Some((Err(e), (input, parser, ready, eof)));
                        }
                        None => {
                            eof = true;
                            if let Some(raw) = parser.finish() {
                                ready.extend(decode_frame(&raw));
                            }
                        }
                    }
                }
            },
        );

        Box::pin(stream)
    }
}
