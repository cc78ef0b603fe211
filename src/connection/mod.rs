//! Upstream event stream management.
//!
//! [`StreamConnectionManager`] owns at most one live streaming connection,
//! feeds its frames through the SSE decoder and classifier, and re-opens it
//! under a bounded [`ReconnectPolicy`] after transport failures.

mod manager;
mod reconnect;

pub use manager::{ConnectionState, StreamConnectionManager};
pub use reconnect::ReconnectPolicy;
