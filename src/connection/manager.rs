//! Stream connection manager.
//!
//! One manager owns one upstream connection at a time. Every connection
//! lifetime is tagged with a generation number; `start` and `stop` bump it
//! under the slot lock, and every delivery, reconnect and open completion
//! re-checks it under the same lock, so a stopped connection can never
//! deliver another event.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::reconnect::ReconnectPolicy;
use crate::error::StreamError;
use crate::events::{classify_frame, StreamEvent};
use crate::sse::SseDecoder;
use crate::traits::{ByteStream, Headers, HttpClient, StreamConsumer};

/// Connection state, published through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the retry delay before attempt number `attempt`
    Reconnecting { attempt: u32 },
}

/// Everything that belongs to the current connection lifetime.
#[derive(Default)]
struct ConnectionSlot {
    generation: u64,
    endpoint: Option<String>,
    consumer: Option<Arc<dyn StreamConsumer>>,
    reader: Option<JoinHandle<()>>,
    retry: Option<JoinHandle<()>>,
}

impl ConnectionSlot {
    /// Abort the reader and any pending reconnect.
    fn abort_tasks(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(retry) = self.retry.take() {
            retry.abort();
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }
}

struct ManagerInner {
    http: Arc<dyn HttpClient>,
    policy: ReconnectPolicy,
    attempts: AtomicU32,
    slot: Mutex<ConnectionSlot>,
    state_tx: watch::Sender<ConnectionState>,
}

/// Owns the payment event stream and its reconnection.
///
/// Cheap to clone; clones share the same connection.
///
/// # Example
///
/// ```ignore
/// let manager = StreamConnectionManager::new(http, ReconnectPolicy::default());
/// manager.start(api.stream_url(), consumer).await?;
/// // ... events flow to the consumer ...
/// manager.stop();
/// ```
#[derive(Clone)]
pub struct StreamConnectionManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for StreamConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConnectionManager")
            .field("policy", &self.inner.policy)
            .field("state", &self.connection_state())
            .field("attempts", &self.attempts())
            .finish()
    }
}

impl StreamConnectionManager {
    pub fn new(http: Arc<dyn HttpClient>, policy: ReconnectPolicy) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(ManagerInner {
                http,
                policy,
                attempts: AtomicU32::new(0),
                slot: Mutex::new(ConnectionSlot::default()),
                state_tx,
            }),
        }
    }

    /// Open `endpoint` and deliver its events to `consumer`.
    ///
    /// Any existing connection (and pending reconnect) is closed first.
    /// An open failure is returned as [`StreamError::ConnectionFailed`] and
    /// does not start the retry loop. If `stop` or another `start` wins the
    /// race while the connection is opening, the new connection is dropped
    /// and `Ok(())` is returned.
    pub async fn start(
        &self,
        endpoint: impl Into<String>,
        consumer: Arc<dyn StreamConsumer>,
    ) -> Result<(), StreamError> {
        let endpoint = endpoint.into();
        let (generation, previous) = {
            let mut slot = self.inner.lock_slot();
            slot.abort_tasks();
            slot.generation += 1;
            slot.endpoint = Some(endpoint.clone());
            let previous = slot.consumer.replace(consumer);
            (slot.generation, previous)
        };
        drop(previous);

        self.inner.attempts.store(0, Ordering::SeqCst);
        self.inner.set_state(ConnectionState::Connecting);
        info!("Opening payment event stream {}", endpoint);

        match self.inner.open(&endpoint).await {
            Ok(stream) => {
                let mut slot = self.inner.lock_slot();
                if !slot.is_current(generation) {
                    debug!("Stream open superseded before it completed");
                    return Ok(());
                }
                self.inner.attempts.store(0, Ordering::SeqCst);
                slot.reader = Some(tokio::spawn(
                    Arc::clone(&self.inner).run_reader(generation, stream),
                ));
                self.inner.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(err) => {
                warn!("Failed to open payment event stream: {}", err);
                let released = {
                    let mut slot = self.inner.lock_slot();
                    if slot.is_current(generation) {
                        slot.endpoint = None;
                        self.inner.set_state(ConnectionState::Disconnected);
                        slot.consumer.take()
                    } else {
                        None
                    }
                };
                drop(released);
                Err(err)
            }
        }
    }

    /// Close the connection and cancel any pending reconnect.
    ///
    /// No-op when idle. Once this returns the consumer receives nothing
    /// more from the closed connection.
    pub fn stop(&self) {
        let released = {
            let mut slot = self.inner.lock_slot();
            self.inner.stop_locked(&mut slot)
        };
        drop(released);
    }

    /// Stop only if `consumer` is the one currently registered.
    ///
    /// Lets a caller close the connection it started without racing a newer
    /// `start` from someone else. Returns whether anything was stopped.
    pub fn release(&self, consumer: &Arc<dyn StreamConsumer>) -> bool {
        let released = {
            let mut slot = self.inner.lock_slot();
            let registered = slot
                .consumer
                .as_ref()
                .map(|current| same_consumer(current, consumer))
                .unwrap_or(false);
            if !registered {
                return false;
            }
            self.inner.stop_locked(&mut slot)
        };
        drop(released);
        true
    }

    /// Whether a connection is currently established.
    pub fn has_connection(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Whether the manager is connected or working towards a connection.
    pub fn is_active(&self) -> bool {
        self.connection_state() != ConnectionState::Disconnected
    }

    /// Consecutive failed attempts since the last successful open or
    /// heartbeat.
    pub fn attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.inner.policy
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }
}

fn same_consumer(a: &Arc<dyn StreamConsumer>, b: &Arc<dyn StreamConsumer>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl ManagerInner {
    fn lock_slot(&self) -> MutexGuard<'_, ConnectionSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    /// Returns the released consumer so the caller can drop it unlocked.
    fn stop_locked(&self, slot: &mut ConnectionSlot) -> Option<Arc<dyn StreamConsumer>> {
        slot.generation += 1;
        slot.abort_tasks();
        slot.endpoint = None;
        self.attempts.store(0, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected);
        let released = slot.consumer.take();
        if released.is_some() {
            info!("Payment event stream stopped");
        }
        released
    }

    async fn open(&self, endpoint: &str) -> Result<ByteStream, StreamError> {
        let mut headers = Headers::new();
        headers.insert("Accept".to_string(), "text/event-stream".to_string());
        headers.insert("Cache-Control".to_string(), "no-cache".to_string());

        self.http
            .get_stream(endpoint, &headers)
            .await
            .map_err(|e| StreamError::ConnectionFailed {
                url: endpoint.to_string(),
                message: e.to_string(),
            })
    }

    /// Deliver one event if `generation` is still current.
    ///
    /// Returns `false` once the connection has been superseded.
    fn deliver(&self, generation: u64, event: StreamEvent) -> bool {
        let slot = self.lock_slot();
        if !slot.is_current(generation) {
            return false;
        }
        if event.is_heartbeat() {
            self.attempts.store(0, Ordering::SeqCst);
        }
        if let Some(consumer) = slot.consumer.as_ref() {
            consumer.on_event(event);
        }
        true
    }

    async fn run_reader(self: Arc<Self>, generation: u64, mut stream: ByteStream) {
        if !self.deliver(generation, StreamEvent::open()) {
            return;
        }
        debug!("Payment event stream open (generation {})", generation);

        let mut decoder = SseDecoder::new();
        let failure = loop {
            match stream.next().await {
                Some(Ok(chunk)) => {
                    for frame in decoder.push(&chunk) {
                        let Some(event) = classify_frame(frame) else {
                            continue;
                        };
                        if let Some(err) = event.error_detail() {
                            warn!("Unreadable stream payload: {}", err);
                        }
                        if !self.deliver(generation, event) {
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    break StreamError::ConnectionLost {
                        message: e.to_string(),
                    }
                }
                None => break StreamError::ServerClosed { reason: None },
            }
        };

        self.handle_failure(generation, failure);
    }

    /// Report a dropped connection and decide whether to reconnect.
    fn handle_failure(self: &Arc<Self>, generation: u64, error: StreamError) {
        let mut slot = self.lock_slot();
        if !slot.is_current(generation) {
            return;
        }
        warn!("Payment event stream failed: {}", error);
        slot.reader = None;
        if let Some(consumer) = slot.consumer.clone() {
            consumer.on_event(StreamEvent::error(error));
            consumer.on_event(StreamEvent::closed());
        }
        self.schedule_reconnect(&mut slot, generation);
    }

    /// Called with the slot locked and `generation` verified current.
    fn schedule_reconnect(self: &Arc<Self>, slot: &mut ConnectionSlot, generation: u64) {
        let Some(consumer) = slot.consumer.clone() else {
            self.set_state(ConnectionState::Disconnected);
            return;
        };

        if !consumer.is_retry_eligible() {
            info!("No pending payment, not reconnecting");
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        let attempts = self.attempts.load(Ordering::SeqCst);
        if !self.policy.allows(attempts) {
            warn!(
                "Giving up on payment event stream after {} reconnect attempts",
                attempts
            );
            consumer.on_event(StreamEvent::exhausted(attempts));
            slot.endpoint = None;
            slot.consumer = None;
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        let attempt = attempts + 1;
        self.attempts.store(attempt, Ordering::SeqCst);
        self.set_state(ConnectionState::Reconnecting { attempt });
        info!(
            "Reconnecting in {:?} (attempt {}/{})",
            self.policy.retry_delay, attempt, self.policy.max_attempts
        );

        slot.retry = Some(tokio::spawn(
            Arc::clone(self).reconnect_after_delay(generation),
        ));
    }

    async fn reconnect_after_delay(self: Arc<Self>, generation: u64) {
        tokio::time::sleep(self.policy.retry_delay).await;

        let endpoint = {
            let slot = self.lock_slot();
            if !slot.is_current(generation) {
                return;
            }
            let eligible = slot
                .consumer
                .as_ref()
                .map(|c| c.is_retry_eligible())
                .unwrap_or(false);
            if !eligible {
                info!("Payment no longer pending, reconnect abandoned");
                self.set_state(ConnectionState::Disconnected);
                return;
            }
            match slot.endpoint.clone() {
                Some(endpoint) => endpoint,
                None => return,
            }
        };

        match self.open(&endpoint).await {
            Ok(stream) => {
                let mut slot = self.lock_slot();
                if !slot.is_current(generation) {
                    return;
                }
                info!("Payment event stream re-established");
                self.attempts.store(0, Ordering::SeqCst);
                slot.reader = Some(tokio::spawn(
                    Arc::clone(&self).run_reader(generation, stream),
                ));
                self.set_state(ConnectionState::Connected);
            }
            Err(err) => {
                warn!("Reconnect failed: {}", err);
                let mut slot = self.lock_slot();
                if !slot.is_current(generation) {
                    return;
                }
                if let Some(consumer) = slot.consumer.clone() {
                    consumer.on_event(StreamEvent::error(err));
                }
                self.schedule_reconnect(&mut slot, generation);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MockHttpClient;
    use crate::events::{EventData, StreamEventKind};
    use crate::models::PaymentStatus;
    use crate::traits::HttpError;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    const URL: &str = "http://localhost:8080/api/sse/payment-events";

    #[derive(Default)]
    struct RecordingConsumer {
        events: Mutex<Vec<StreamEvent>>,
        ineligible: AtomicBool,
    }

    impl RecordingConsumer {
        fn kinds(&self) -> Vec<StreamEventKind> {
            self.events.lock().unwrap().iter().map(|e| e.kind).collect()
        }

        fn len(&self) -> usize {
            self.events.lock().unwrap().len()
        }
    }

    impl StreamConsumer for RecordingConsumer {
        fn on_event(&self, event: StreamEvent) {
            self.events.lock().unwrap().push(event);
        }

        fn is_retry_eligible(&self) -> bool {
            !self.ineligible.load(Ordering::SeqCst)
        }
    }

    async fn wait_for(mut cond: impl FnMut() -> bool) {
        for _ in 0..400 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not met in time");
    }

    fn manager(http: &MockHttpClient) -> StreamConnectionManager {
        StreamConnectionManager::new(
            Arc::new(http.clone()),
            ReconnectPolicy::new(3, Duration::from_millis(20)),
        )
    }

    #[tokio::test]
    async fn test_start_sends_stream_headers() {
        let http = MockHttpClient::new();
        let _handle = http.push_stream();
        let manager = manager(&http);
        let consumer = Arc::new(RecordingConsumer::default());

        manager.start(URL, consumer.clone()).await.unwrap();

        let requests = http.stream_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, URL);
        assert_eq!(
            requests[0].headers.get("Accept").map(String::as_str),
            Some("text/event-stream")
        );
        assert_eq!(
            requests[0].headers.get("Cache-Control").map(String::as_str),
            Some("no-cache")
        );
        assert!(manager.has_connection());
        manager.stop();
    }

    #[tokio::test]
    async fn test_events_delivered_in_order_after_open() {
        let http = MockHttpClient::new();
        let handle = http.push_stream();
        let manager = manager(&http);
        let consumer = Arc::new(RecordingConsumer::default());

        manager.start(URL, consumer.clone()).await.unwrap();
        handle.send_event(
            "PAYMENT_STATUS",
            r#"{"orderId":"ORD-1","status":"PENDING"}"#,
        );
        handle.send_message("not json");
        handle.send_event("heartbeat", "{}");
        handle.send_event("PAYMENT_STATUS", r#"{"orderId":"ORD-1","status":"SUCCESS"}"#);

        wait_for(|| consumer.len() == 5).await;
        assert_eq!(
            consumer.kinds(),
            vec![
                StreamEventKind::Open,
                StreamEventKind::PaymentStatus,
                StreamEventKind::Message,
                StreamEventKind::Heartbeat,
                StreamEventKind::PaymentStatus,
            ]
        );
        let events = consumer.events.lock().unwrap();
        assert!(matches!(events[2].data, EventData::Invalid(_)));
        assert_eq!(
            events[4].status_update().map(|u| u.status),
            Some(PaymentStatus::Success)
        );
        drop(events);
        assert!(manager.has_connection());
        manager.stop();
    }

    #[tokio::test]
    async fn test_open_failure_is_returned_without_retry() {
        let http = MockHttpClient::new();
        http.push_stream_error(HttpError::ServerError {
            status: 503,
            message: "unavailable".to_string(),
        });
        let manager = manager(&http);
        let consumer = Arc::new(RecordingConsumer::default());

        let result = manager.start(URL, consumer.clone()).await;
        assert!(matches!(result, Err(StreamError::ConnectionFailed { .. })));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(http.stream_requests().len(), 1);
        assert_eq!(manager.connection_state(), ConnectionState::Disconnected);
        assert_eq!(consumer.len(), 0);
    }

    #[tokio::test]
    async fn test_stop_closes_stream_and_silences_consumer() {
        let http = MockHttpClient::new();
        let handle = http.push_stream();
        let manager = manager(&http);
        let consumer = Arc::new(RecordingConsumer::default());

        manager.start(URL, consumer.clone()).await.unwrap();
        wait_for(|| consumer.len() == 1).await;

        manager.stop();
        assert!(!manager.has_connection());
        handle.send_event("PAYMENT_STATUS", r#"{"orderId":"ORD-1","status":"SUCCESS"}"#);

        wait_for(|| handle.is_closed()).await;
        assert_eq!(consumer.kinds(), vec![StreamEventKind::Open]);
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let http = MockHttpClient::new();
        let manager = manager(&http);
        manager.stop();
        manager.stop();
        assert_eq!(manager.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_restart_closes_previous_connection() {
        let http = MockHttpClient::new();
        let first = http.push_stream();
        let _second = http.push_stream();
        let manager = manager(&http);
        let old_consumer = Arc::new(RecordingConsumer::default());
        let new_consumer = Arc::new(RecordingConsumer::default());

        manager.start(URL, old_consumer.clone()).await.unwrap();
        manager.start(URL, new_consumer.clone()).await.unwrap();

        wait_for(|| first.is_closed()).await;
        wait_for(|| new_consumer.len() == 1).await;
        first.send_message(r#"{"orderId":"ORD-1","status":"SUCCESS"}"#);
        assert!(old_consumer
            .kinds()
            .iter()
            .all(|kind| *kind == StreamEventKind::Open));
        manager.stop();
    }

    #[tokio::test]
    async fn test_server_close_reports_error_then_closed() {
        let http = MockHttpClient::new();
        let handle = http.push_stream();
        let manager = manager(&http);
        let consumer = Arc::new(RecordingConsumer::default());
        consumer.ineligible.store(true, Ordering::SeqCst);

        manager.start(URL, consumer.clone()).await.unwrap();
        wait_for(|| consumer.len() == 1).await;
        handle.close();

        wait_for(|| manager.connection_state() == ConnectionState::Disconnected).await;
        assert_eq!(
            consumer.kinds(),
            vec![
                StreamEventKind::Open,
                StreamEventKind::Error,
                StreamEventKind::Closed,
            ]
        );
        let events = consumer.events.lock().unwrap();
        assert_eq!(
            events[1].error_detail(),
            Some(&StreamError::ServerClosed { reason: None })
        );
    }

    #[tokio::test]
    async fn test_successful_reopen_resets_attempts() {
        let http = MockHttpClient::new();
        let first = http.push_stream();
        http.push_stream_error(HttpError::ConnectionFailed("refused".to_string()));
        let second = http.push_stream();
        let manager = StreamConnectionManager::new(
            Arc::new(http.clone()),
            ReconnectPolicy::new(3, Duration::from_millis(40)),
        );
        let consumer = Arc::new(RecordingConsumer::default());

        manager.start(URL, consumer.clone()).await.unwrap();
        first.fail(HttpError::Io("reset".to_string()));

        // one failed reopen, then a successful one
        wait_for(|| http.stream_requests().len() == 3).await;
        wait_for(|| manager.has_connection()).await;
        assert_eq!(manager.attempts(), 0);

        second.fail(HttpError::Io("reset again".to_string()));
        wait_for(|| manager.connection_state() == ConnectionState::Reconnecting { attempt: 1 })
            .await;
        assert_eq!(manager.attempts(), 1);
        manager.stop();
        assert_eq!(manager.attempts(), 0);
        assert_eq!(manager.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_release_only_stops_registered_consumer() {
        let http = MockHttpClient::new();
        let _first = http.push_stream();
        let second = http.push_stream();
        let manager = manager(&http);
        let old: Arc<dyn StreamConsumer> = Arc::new(RecordingConsumer::default());
        let current: Arc<dyn StreamConsumer> = Arc::new(RecordingConsumer::default());

        manager.start(URL, old.clone()).await.unwrap();
        manager.start(URL, current.clone()).await.unwrap();

        assert!(!manager.release(&old));
        assert!(manager.has_connection());

        assert!(manager.release(&current));
        assert!(!manager.has_connection());
        wait_for(|| second.is_closed()).await;
    }
}
