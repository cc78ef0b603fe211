//! Streaming-related error types.
//!
//! This module defines errors that occur while opening, reading and
//! re-establishing the payment event stream.

use std::fmt;

/// Stream-specific error variants.
///
/// These errors represent issues with the Server-Sent Events connection and
/// with the payloads it carries. None of them are fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The stream could not be opened (transport error or non-2xx status).
    ConnectionFailed {
        url: String,
        message: String,
    },

    /// Stream connection was lost unexpectedly.
    ConnectionLost {
        message: String,
    },

    /// Stream was closed by the server.
    ServerClosed {
        reason: Option<String>,
    },

    /// Invalid JSON in stream data.
    InvalidJson {
        event_type: String,
        message: String,
    },

    /// Automatic reconnection gave up.
    RetriesExhausted {
        attempts: u32,
    },
}

impl StreamError {
    /// Check if this error is a transport failure that the reconnect policy
    /// handles.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StreamError::ConnectionLost { .. } | StreamError::ServerClosed { .. }
        )
    }

    /// Check if this error means the connection is gone for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamError::RetriesExhausted { .. })
    }

    /// Get a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            StreamError::ConnectionFailed { .. } => {
                "Could not connect to the payment event stream.".to_string()
            }
            StreamError::ConnectionLost { .. } => {
                "Connection to the payment server was lost. Attempting to reconnect...".to_string()
            }
            StreamError::ServerClosed { reason } => match reason {
                Some(r) => format!("Server closed the connection: {}", r),
                None => "Server closed the connection.".to_string(),
            },
            StreamError::InvalidJson { .. } => {
                "Received an unreadable update from the payment server.".to_string()
            }
            StreamError::RetriesExhausted { attempts } => {
                format!(
                    "Lost contact with the payment server after {} reconnection attempts. Start the payment again to resume.",
                    attempts
                )
            }
        }
    }

    /// Get a short error code for logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            StreamError::ConnectionFailed { .. } => "E_STREAM_OPEN",
            StreamError::ConnectionLost { .. } => "E_STREAM_CONN",
            StreamError::ServerClosed { .. } => "E_STREAM_CLOSED",
            StreamError::InvalidJson { .. } => "E_STREAM_JSON",
            StreamError::RetriesExhausted { .. } => "E_STREAM_EXHAUSTED",
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::ConnectionFailed { url, message } => {
                write!(f, "Failed to open stream '{}': {}", url, message)
            }
            StreamError::ConnectionLost { message } => {
                write!(f, "Stream connection lost: {}", message)
            }
            StreamError::ServerClosed { reason } => match reason {
                Some(r) => write!(f, "Server closed stream: {}", r),
                None => write!(f, "Server closed stream"),
            },
            StreamError::InvalidJson { event_type, message } => {
                write!(f, "Invalid JSON for {} event: {}", event_type, message)
            }
            StreamError::RetriesExhausted { attempts } => {
                write!(f, "Reconnection abandoned after {} attempts", attempts)
            }
        }
    }
}

impl std::error::Error for StreamError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(StreamError::ConnectionLost {
            message: "reset".to_string()
        }
        .is_retryable());
        assert!(StreamError::ServerClosed { reason: None }.is_retryable());
        assert!(!StreamError::InvalidJson {
            event_type: "PAYMENT_STATUS".to_string(),
            message: "eof".to_string()
        }
        .is_retryable());
        assert!(!StreamError::RetriesExhausted { attempts: 3 }.is_retryable());
        assert!(!StreamError::ConnectionFailed {
            url: "http://x".to_string(),
            message: "refused".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_is_terminal() {
        assert!(StreamError::RetriesExhausted { attempts: 5 }.is_terminal());
        assert!(!StreamError::ServerClosed { reason: None }.is_terminal());
    }

    #[test]
    fn test_display() {
        let err = StreamError::InvalidJson {
            event_type: "PAYMENT_STATUS".to_string(),
            message: "expected value".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid JSON for PAYMENT_STATUS event: expected value"
        );

        let err = StreamError::ServerClosed {
            reason: Some("shutdown".to_string()),
        };
        assert_eq!(err.to_string(), "Server closed stream: shutdown");

        let err = StreamError::RetriesExhausted { attempts: 5 };
        assert_eq!(err.to_string(), "Reconnection abandoned after 5 attempts");
    }

    #[test]
    fn test_error_codes_unique() {
        let errors = [
            StreamError::ConnectionFailed {
                url: String::new(),
                message: String::new(),
            },
            StreamError::ConnectionLost {
                message: String::new(),
            },
            StreamError::ServerClosed { reason: None },
            StreamError::InvalidJson {
                event_type: String::new(),
                message: String::new(),
            },
            StreamError::RetriesExhausted { attempts: 0 },
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.error_code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_user_message_mentions_attempts() {
        let msg = StreamError::RetriesExhausted { attempts: 7 }.user_message();
        assert!(msg.contains('7'));
    }
}
