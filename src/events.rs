//! Typed stream events.
//!
//! Every SSE frame received from the payment event stream is classified into
//! a [`StreamEvent`] by [`classify_frame`]: first by channel name, then, for
//! the default channel, by payload content. Connection lifecycle signals
//! (open, error, closed) use the same type so a consumer sees one ordered
//! sequence.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::StreamError;
use crate::models::{PaymentStatusUpdate, HEARTBEAT_EVENT_TYPE};
use crate::sse::SseFrame;

/// Named channel carrying status updates.
pub const PAYMENT_STATUS_CHANNEL: &str = "PAYMENT_STATUS";

/// Named channel carrying keep-alives.
pub const HEARTBEAT_CHANNEL: &str = "heartbeat";

/// What kind of event was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamEventKind {
    /// Connection established
    Open,
    /// Frame on the default (unnamed) channel
    Message,
    /// Frame on the `PAYMENT_STATUS` channel
    PaymentStatus,
    /// Keep-alive, on the `heartbeat` channel or marked in a default payload
    Heartbeat,
    /// Transport failure reported by the connection
    Error,
    /// Connection is closed and will not deliver more frames
    Closed,
}

impl StreamEventKind {
    /// Tag used in logs and in the diagnostic trace.
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamEventKind::Open => "OPEN",
            StreamEventKind::Message => "MESSAGE",
            StreamEventKind::PaymentStatus => "PAYMENT_STATUS",
            StreamEventKind::Heartbeat => "HEARTBEAT",
            StreamEventKind::Error => "ERROR",
            StreamEventKind::Closed => "CLOSED",
        }
    }
}

/// Parsed content of an event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    /// Lifecycle event without content
    None,
    /// Well-formed status payload
    Status(PaymentStatusUpdate),
    /// Keep-alive; its payload is opaque
    Heartbeat,
    /// Payload could not be parsed; the connection is unaffected
    Invalid(StreamError),
    /// Connection-level failure
    Failure(StreamError),
}

/// A single classified event.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub kind: StreamEventKind,
    pub data: EventData,
    /// Raw frame payload, for message-bearing kinds
    pub raw: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl StreamEvent {
    pub fn new(kind: StreamEventKind, data: EventData, raw: Option<String>) -> Self {
        Self {
            kind,
            data,
            raw,
            received_at: Utc::now(),
        }
    }

    pub fn open() -> Self {
        Self::new(StreamEventKind::Open, EventData::None, None)
    }

    pub fn closed() -> Self {
        Self::new(StreamEventKind::Closed, EventData::None, None)
    }

    /// Transport failure on an established connection.
    pub fn error(error: StreamError) -> Self {
        Self::new(StreamEventKind::Error, EventData::Failure(error), None)
    }

    /// Final event once reconnection has been given up.
    pub fn exhausted(attempts: u32) -> Self {
        Self::new(
            StreamEventKind::Closed,
            EventData::Failure(StreamError::RetriesExhausted { attempts }),
            None,
        )
    }

    /// The status payload, if this event carries one.
    pub fn status_update(&self) -> Option<&PaymentStatusUpdate> {
        match &self.data {
            EventData::Status(update) => Some(update),
            _ => None,
        }
    }

    /// The error carried by this event, parse or transport.
    pub fn error_detail(&self) -> Option<&StreamError> {
        match &self.data {
            EventData::Invalid(err) | EventData::Failure(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        self.kind == StreamEventKind::Heartbeat
    }
}

/// Classify a frame by channel name and payload.
///
/// Returns `None` for frames on channels this client does not listen to.
pub fn classify_frame(frame: SseFrame) -> Option<StreamEvent> {
    if frame.is_default_channel() {
        return Some(classify_default_channel(frame.data));
    }

    let name = frame.event_name();
    if name == PAYMENT_STATUS_CHANNEL {
        let data = parse_status(name, &frame.data);
        return Some(StreamEvent::new(
            StreamEventKind::PaymentStatus,
            data,
            Some(frame.data),
        ));
    }

    if name.eq_ignore_ascii_case(HEARTBEAT_CHANNEL) {
        return Some(StreamEvent::new(
            StreamEventKind::Heartbeat,
            EventData::Heartbeat,
            Some(frame.data),
        ));
    }

    debug!("Ignoring frame on unhandled channel '{}'", name);
    None
}

/// The default channel carries either status payloads or a heartbeat marker.
fn classify_default_channel(data: String) -> StreamEvent {
    let value = match serde_json::from_str::<serde_json::Value>(&data) {
        Ok(value) => value,
        Err(e) => {
            let err = StreamError::InvalidJson {
                event_type: StreamEventKind::Message.as_str().to_string(),
                message: e.to_string(),
            };
            return StreamEvent::new(StreamEventKind::Message, EventData::Invalid(err), Some(data));
        }
    };

    if value.get("eventType").and_then(|v| v.as_str()) == Some(HEARTBEAT_EVENT_TYPE) {
        return StreamEvent::new(StreamEventKind::Heartbeat, EventData::Heartbeat, Some(data));
    }

    let parsed = match serde_json::from_value::<PaymentStatusUpdate>(value) {
        Ok(update) => EventData::Status(update),
        Err(e) => EventData::Invalid(StreamError::InvalidJson {
            event_type: StreamEventKind::Message.as_str().to_string(),
            message: e.to_string(),
        }),
    };
    StreamEvent::new(StreamEventKind::Message, parsed, Some(data))
}

fn parse_status(event_type: &str, data: &str) -> EventData {
    match serde_json::from_str::<PaymentStatusUpdate>(data) {
        Ok(update) => EventData::Status(update),
        Err(e) => EventData::Invalid(StreamError::InvalidJson {
            event_type: event_type.to_string(),
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentStatus;

    #[test]
    fn test_kind_tags() {
        assert_eq!(StreamEventKind::PaymentStatus.as_str(), "PAYMENT_STATUS");
        assert_eq!(StreamEventKind::Heartbeat.as_str(), "HEARTBEAT");
        assert_eq!(StreamEventKind::Closed.as_str(), "CLOSED");
    }

    #[test]
    fn test_classify_named_payment_status() {
        let frame = SseFrame::named(
            "PAYMENT_STATUS",
            r#"{"eventType":"PAYMENT_STATUS","orderId":"ORD-1","status":"SUCCESS","message":"ok"}"#,
        );
        let event = classify_frame(frame).unwrap();
        assert_eq!(event.kind, StreamEventKind::PaymentStatus);
        let update = event.status_update().unwrap();
        assert_eq!(update.order_id.as_str(), "ORD-1");
        assert_eq!(update.status, PaymentStatus::Success);
        assert!(event.raw.unwrap().contains("ORD-1"));
    }

    #[test]
    fn test_classify_named_payment_status_malformed() {
        let event = classify_frame(SseFrame::named("PAYMENT_STATUS", "{not json")).unwrap();
        assert_eq!(event.kind, StreamEventKind::PaymentStatus);
        match event.data {
            EventData::Invalid(StreamError::InvalidJson { event_type, .. }) => {
                assert_eq!(event_type, "PAYMENT_STATUS");
            }
            other => panic!("Expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_named_heartbeat_is_opaque() {
        let event = classify_frame(SseFrame::named("heartbeat", "not even json")).unwrap();
        assert_eq!(event.kind, StreamEventKind::Heartbeat);
        assert_eq!(event.data, EventData::Heartbeat);
        assert!(event.is_heartbeat());
    }

    #[test]
    fn test_classify_default_channel_heartbeat_marker() {
        let frame = SseFrame::message(
            r#"{"eventType":"HEARTBEAT","orderId":null,"status":null,"message":"heartbeat"}"#,
        );
        let event = classify_frame(frame).unwrap();
        assert_eq!(event.kind, StreamEventKind::Heartbeat);
    }

    #[test]
    fn test_classify_default_channel_status() {
        let frame = SseFrame::message(r#"{"orderId":"ORD-2","status":"PENDING","message":"wait"}"#);
        let event = classify_frame(frame).unwrap();
        assert_eq!(event.kind, StreamEventKind::Message);
        assert_eq!(
            event.status_update().unwrap().status,
            PaymentStatus::Pending
        );
    }

    #[test]
    fn test_classify_default_channel_invalid_json() {
        let event = classify_frame(SseFrame::message("garbage")).unwrap();
        assert_eq!(event.kind, StreamEventKind::Message);
        assert!(matches!(event.data, EventData::Invalid(_)));
        assert_eq!(event.raw.as_deref(), Some("garbage"));
    }

    #[test]
    fn test_classify_default_channel_wrong_shape() {
        let event = classify_frame(SseFrame::message(r#"{"hello":"world"}"#)).unwrap();
        assert!(matches!(event.data, EventData::Invalid(_)));
    }

    #[test]
    fn test_classify_unknown_channel_is_ignored() {
        assert!(classify_frame(SseFrame::named("ORDER_CREATED", "{}")).is_none());
    }

    #[test]
    fn test_lifecycle_constructors() {
        assert_eq!(StreamEvent::open().kind, StreamEventKind::Open);
        assert_eq!(StreamEvent::closed().data, EventData::None);

        let exhausted = StreamEvent::exhausted(5);
        assert_eq!(exhausted.kind, StreamEventKind::Closed);
        assert_eq!(
            exhausted.error_detail(),
            Some(&StreamError::RetriesExhausted { attempts: 5 })
        );

        let error = StreamEvent::error(StreamError::ServerClosed { reason: None });
        assert_eq!(error.kind, StreamEventKind::Error);
        assert!(error.error_detail().unwrap().is_retryable());
    }
}
