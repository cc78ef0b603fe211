//! SSE stream parsing logic
//!
//! Contains the stateful SseParser for accumulating lines into frames and
//! the SseDecoder that turns raw body chunks into lines.

use crate::sse::events::{SseFrame, SseLine};

/// Parse a single SSE line into its component type
pub fn parse_sse_line(line: &str) -> SseLine {
    if line.is_empty() {
        return SseLine::Empty;
    }

    if let Some(stripped) = line.strip_prefix(':') {
        return SseLine::Comment(stripped.trim().to_string());
    }

    if let Some(rest) = line.strip_prefix("event:") {
        return SseLine::Event(rest.trim().to_string());
    }

    if let Some(rest) = line.strip_prefix("data:") {
        // Only the single space after the colon belongs to the framing
        let value = rest.strip_prefix(' ').unwrap_or(rest);
        return SseLine::Data(value.to_string());
    }

    if let Some(rest) = line.strip_prefix("id:") {
        return SseLine::Id(rest.trim().to_string());
    }

    if let Some(rest) = line.strip_prefix("retry:") {
        if let Ok(millis) = rest.trim().parse::<u64>() {
            return SseLine::Retry(millis);
        }
    }

    // Unknown line format - treat as comment
    SseLine::Comment(line.to_string())
}

/// Stateful SSE parser that accumulates lines and emits complete frames
#[derive(Debug, Default)]
pub struct SseParser {
    /// Channel name of the frame being accumulated
    current_event: Option<String>,
    /// Accumulated data lines (SSE allows multiple data: lines)
    data_buffer: Vec<String>,
    /// Id of the frame being accumulated
    current_id: Option<String>,
    /// Last retry hint announced by the server
    retry_hint: Option<u64>,
}

impl SseParser {
    /// Create a new SSE parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a line to the parser, potentially returning a complete frame
    ///
    /// Returns:
    /// - `Some(frame)` - A blank line completed a frame carrying data
    /// - `None` - Line was consumed but no frame is ready
    pub fn feed_line(&mut self, line: &str) -> Option<SseFrame> {
        match parse_sse_line(line) {
            SseLine::Event(name) => {
                self.current_event = Some(name);
                None
            }
            SseLine::Data(data) => {
                self.data_buffer.push(data);
                None
            }
            SseLine::Id(id) => {
                self.current_id = Some(id);
                None
            }
            SseLine::Retry(millis) => {
                self.retry_hint = Some(millis);
                None
            }
            SseLine::Empty => self.try_emit_frame(),
            SseLine::Comment(_) => None,
        }
    }

    /// Try to emit a complete frame from accumulated state
    fn try_emit_frame(&mut self) -> Option<SseFrame> {
        let event = self.current_event.take();
        let id = self.current_id.take();

        // Blocks without any data line are not dispatched
        if self.data_buffer.is_empty() {
            return None;
        }

        let data = self.data_buffer.join("\n");
        self.data_buffer.clear();

        Some(SseFrame { event, data, id })
    }

    /// Last `retry:` hint sent by the server, in milliseconds
    pub fn retry_hint(&self) -> Option<u64> {
        self.retry_hint
    }

    /// Reset the parser state
    pub fn reset(&mut self) {
        self.current_event = None;
        self.data_buffer.clear();
        self.current_id = None;
    }
}

/// Byte-level front end of [`SseParser`].
///
/// Body chunks can end in the middle of a line or of a multi-byte UTF-8
/// sequence, so bytes are buffered until a full line is available.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    parser: SseParser,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a body chunk, returning every frame it completes in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.parser.feed_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Access the underlying line parser.
    pub fn parser(&self) -> &SseParser {
        &self.parser
    }

    /// Drop buffered bytes and any partially accumulated frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.parser.reset();
    }
}
