//! Error types for paywatch.
//!
//! Errors are split by concern:
//!
//! - [`StreamError`]: the event stream (open failures, lost connections,
//!   malformed payloads, reconnect exhaustion)
//! - [`PaymentError`]: the request/response endpoints of the payment backend
//!
//! Transport-level failures are reported as [`crate::traits::HttpError`] by
//! the [`crate::traits::HttpClient`] implementations.
//!
//! | Error | Retried automatically | Effect on the session |
//! |-------|-----------------------|-----------------------|
//! | `PaymentError` during initialize | No | No order, reason recorded |
//! | `StreamError::InvalidJson` | No | Recorded, connection stays open |
//! | `StreamError::ConnectionLost` / `ServerClosed` | Yes | Reconnect policy |
//! | `StreamError::RetriesExhausted` | No | Connectivity flagged lost |

mod payment;
mod stream;

pub use payment::PaymentError;
pub use stream::StreamError;
