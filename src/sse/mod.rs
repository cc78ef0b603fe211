//! SSE (Server-Sent Events) stream parser
//!
//! Parses the `text/event-stream` wire format served by the payment backend.
//! SSE format consists of:
//! - `event: <name>` - named channel for the next frame
//! - `data: <payload>` - payload line (several lines are joined with `\n`)
//! - `id: <id>` - last event id
//! - Empty line - dispatches the accumulated frame
//! - Lines starting with `:` - comments (ignored)
//!
//! # Module structure
//! - `events` - Wire-level types (SseLine, SseFrame)
//! - `parser` - Parsing logic (SseParser, SseDecoder, parse_sse_line)

mod events;
mod parser;

// Re-export public types
pub use events::{SseFrame, SseLine};
pub use parser::{parse_sse_line, SseDecoder, SseParser};
