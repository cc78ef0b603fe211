//! Bounded diagnostic trace of received stream events.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::events::{EventData, StreamEvent};

/// Trace tag recorded when the session closes the stream itself.
pub const CLOSED_MANUALLY: &str = "CLOSED_MANUALLY";

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    /// Event kind tag (e.g. "PAYMENT_STATUS", "HEARTBEAT", "ERROR")
    pub event_type: String,
    /// Raw payload, or the error description for failures
    pub payload: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl TraceEntry {
    pub fn new(event_type: impl Into<String>, payload: Option<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            received_at: Utc::now(),
        }
    }

    pub fn from_event(event: &StreamEvent) -> Self {
        let payload = match (&event.raw, &event.data) {
            (Some(raw), _) => Some(raw.clone()),
            (None, EventData::Failure(err)) => Some(err.to_string()),
            (None, _) => None,
        };
        Self {
            event_type: event.kind.as_str().to_string(),
            payload,
            received_at: event.received_at,
        }
    }
}

/// Ordered ring of the most recent entries; the oldest is dropped when full.
#[derive(Debug, Clone)]
pub struct EventTrace {
    entries: VecDeque<TraceEntry>,
    capacity: usize,
}

impl EventTrace {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, entry: TraceEntry) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy of the entries, oldest first.
    pub fn entries(&self) -> Vec<TraceEntry> {
        self.entries.iter().cloned().collect()
    }
}
