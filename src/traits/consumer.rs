//! Sink for classified stream events.

use crate::events::StreamEvent;

/// Receiver of the events produced by a
/// [`StreamConnectionManager`](crate::connection::StreamConnectionManager).
///
/// Both methods are called from the manager's background tasks while it
/// holds its connection lock, so they must return quickly and must not call
/// back into the manager (`start`/`stop`) synchronously. Spawn a task for
/// anything that needs to.
pub trait StreamConsumer: Send + Sync {
    /// Handle one event. Events arrive in the order the transport received
    /// them.
    fn on_event(&self, event: StreamEvent);

    /// Whether an active, non-terminal order is still waiting for events.
    ///
    /// Consulted before scheduling a reconnect and again right before the
    /// reconnect opens the new connection.
    fn is_retry_eligible(&self) -> bool;
}
