//! SSE wire-level types
//!
//! Contains the line classification produced by the parser and the raw frame
//! it emits once a blank line terminates an event block.

/// Name the SSE format assigns to frames without an `event:` line.
pub const DEFAULT_EVENT_NAME: &str = "message";

/// A complete SSE frame as dispatched by the parser.
///
/// Frames are untyped: classification into payment events happens in
/// [`crate::events::classify_frame`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseFrame {
    /// Channel name from the `event:` line, `None` for the default channel
    pub event: Option<String>,
    /// Payload, multiple `data:` lines joined with `\n`
    pub data: String,
    /// Value of the last `id:` line of this frame
    pub id: Option<String>,
}

impl SseFrame {
    /// Create a frame on the default channel.
    pub fn message(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
            id: None,
        }
    }

    /// Create a frame on a named channel.
    pub fn named(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
            id: None,
        }
    }

    /// Channel name, falling back to `message` for the default channel.
    pub fn event_name(&self) -> &str {
        self.event.as_deref().unwrap_or(DEFAULT_EVENT_NAME)
    }

    /// Whether this frame was sent on the default (unnamed) channel.
    pub fn is_default_channel(&self) -> bool {
        self.event_name() == DEFAULT_EVENT_NAME
    }
}

/// Represents a parsed SSE line
#[derive(Debug, Clone, PartialEq)]
pub enum SseLine {
    /// Event type declaration (e.g., "event: PAYMENT_STATUS")
    Event(String),
    /// Data payload (e.g., "data: {\"orderId\": \"ORD-1\"}")
    Data(String),
    /// Event id (e.g., "id: 42")
    Id(String),
    /// Reconnection time hint in milliseconds
    Retry(u64),
    /// Empty line - signals end of event
    Empty,
    /// Comment line (starts with ':')
    Comment(String),
}
