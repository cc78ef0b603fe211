//! Payment session state machine.
//!
//! A [`PaymentSession`] follows exactly one order at a time:
//!
//! ```text
//! NO_ORDER --initialize--> PENDING --update--> PENDING
//!                             |
//!                             +--terminal update--> SUCCESS | FAILURE
//!
//! any state --reset--> NO_ORDER
//! ```
//!
//! Status updates arrive from the [`StreamConnectionManager`] through a
//! [`StreamConsumer`] bound to the session's current epoch. `initialize` and
//! `reset` bump the epoch, so work started on behalf of an older order
//! (late events, teardown timers, an order creation that lost the race) is
//! discarded instead of touching the current one.
//!
//! Lock order: the manager's slot lock is taken before the session state
//! lock, never the other way round.

mod trace;

pub use trace::{EventTrace, TraceEntry, CLOSED_MANUALLY};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::adapters::ReqwestHttpClient;
use crate::api::PaymentApiClient;
use crate::config::ClientConfig;
use crate::connection::StreamConnectionManager;
use crate::error::PaymentError;
use crate::events::{EventData, StreamEvent, StreamEventKind};
use crate::models::{OrderId, PaymentStatus, PaymentStatusUpdate};
use crate::traits::{HttpClient, StreamConsumer};

/// Point-in-time view of a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub order_id: Option<OrderId>,
    pub status: Option<PaymentStatus>,
    /// Message of the latest accepted update, empty if it carried none
    pub message: String,
    /// Order creation is in progress
    pub in_flight: bool,
    /// Last order creation, stream or payload error
    pub last_error: Option<String>,
    /// The stream could not be (re-)established
    pub connectivity_lost: bool,
}

impl SessionSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.map(|s| s.is_terminal()).unwrap_or(false)
    }
}

#[derive(Default)]
struct SessionState {
    order_id: Option<OrderId>,
    status: Option<PaymentStatus>,
    message: String,
    in_flight: bool,
    last_error: Option<String>,
    connectivity_lost: bool,
    epoch: u64,
    listener: Option<Arc<dyn StreamConsumer>>,
    teardown: Option<JoinHandle<()>>,
}

impl SessionState {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            order_id: self.order_id.clone(),
            status: self.status,
            message: self.message.clone(),
            in_flight: self.in_flight,
            last_error: self.last_error.clone(),
            connectivity_lost: self.connectivity_lost,
        }
    }

    /// Back to `NO_ORDER` under a new epoch.
    ///
    /// Returns the previous listener so it can be dropped unlocked.
    fn begin_epoch(&mut self) -> (u64, Option<Arc<dyn StreamConsumer>>) {
        if let Some(teardown) = self.teardown.take() {
            teardown.abort();
        }
        self.order_id = None;
        self.status = None;
        self.message.clear();
        self.in_flight = false;
        self.last_error = None;
        self.connectivity_lost = false;
        self.epoch += 1;
        (self.epoch, self.listener.take())
    }

    fn is_retry_eligible(&self) -> bool {
        self.order_id.is_some() && self.status == Some(PaymentStatus::Pending)
    }
}

struct SessionCore {
    api: PaymentApiClient,
    manager: StreamConnectionManager,
    config: ClientConfig,
    state: Mutex<SessionState>,
    trace: Option<Mutex<EventTrace>>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

/// Stream consumer registered for one epoch of a session.
///
/// Holds the session weakly; the manager never keeps a session alive.
struct EpochListener {
    core: Weak<SessionCore>,
    epoch: u64,
}

impl StreamConsumer for EpochListener {
    fn on_event(&self, event: StreamEvent) {
        if let Some(core) = self.core.upgrade() {
            core.handle_event(self.epoch, event);
        }
    }

    fn is_retry_eligible(&self) -> bool {
        self.core
            .upgrade()
            .map(|core| {
                let state = core.lock_state();
                state.epoch == self.epoch && state.is_retry_eligible()
            })
            .unwrap_or(false)
    }
}

/// Tracks one payment from order creation to a terminal status.
///
/// # Example
///
/// ```ignore
/// use paywatch::config::ClientConfig;
/// use paywatch::session::PaymentSession;
/// use rust_decimal::Decimal;
///
/// let session = PaymentSession::from_config(ClientConfig::from_env());
/// let payment_url = session.initialize(Decimal::from(1000)).await?;
/// let mut updates = session.status_receiver();
/// while !updates.borrow_and_update().is_terminal() {
///     updates.changed().await?;
/// }
/// ```
pub struct PaymentSession {
    core: Arc<SessionCore>,
}

impl std::fmt::Debug for PaymentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentSession")
            .field("snapshot", &self.snapshot())
            .field("manager", &self.core.manager)
            .finish()
    }
}

impl PaymentSession {
    pub fn new(http: Arc<dyn HttpClient>, config: ClientConfig) -> Self {
        let api = PaymentApiClient::new(Arc::clone(&http), config.base_url.clone());
        let manager = StreamConnectionManager::new(http, config.reconnect_policy());
        let trace = config
            .trace_enabled
            .then(|| Mutex::new(EventTrace::new(config.trace_capacity)));
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());

        Self {
            core: Arc::new(SessionCore {
                api,
                manager,
                config,
                state: Mutex::new(SessionState::default()),
                trace,
                snapshot_tx,
            }),
        }
    }

    /// Session talking to the backend over reqwest.
    pub fn from_config(config: ClientConfig) -> Self {
        Self::new(Arc::new(ReqwestHttpClient::new()), config)
    }

    /// Create an order for `amount` and start following it.
    ///
    /// Any previous order is abandoned first. Returns the payment URL. If the
    /// order was created but the event stream could not be opened, the URL
    /// is still returned and the failure is visible through `last_error`
    /// and `connectivity_lost`.
    pub async fn initialize(&self, amount: Decimal) -> Result<String, PaymentError> {
        let core = &self.core;
        core.manager.stop();

        let (epoch, previous) = {
            let mut state = core.lock_state();
            let started = state.begin_epoch();
            state.in_flight = true;
            core.publish(&state);
            started
        };
        drop(previous);
        core.clear_trace();
        info!("Initializing payment of {}", amount);

        let created = match core.api.create_order(amount).await {
            Ok(created) => created,
            Err(err) => {
                error!("Order creation failed: {}", err);
                let mut state = core.lock_state();
                if state.epoch != epoch {
                    return Err(PaymentError::Superseded);
                }
                state.in_flight = false;
                state.last_error = Some(err.to_string());
                core.publish(&state);
                return Err(err);
            }
        };

        let listener: Arc<dyn StreamConsumer> = Arc::new(EpochListener {
            core: Arc::downgrade(core),
            epoch,
        });
        {
            let mut state = core.lock_state();
            if state.epoch != epoch {
                debug!("Order {} superseded before streaming", created.order_id);
                return Err(PaymentError::Superseded);
            }
            state.order_id = Some(created.order_id.clone());
            state.status = Some(PaymentStatus::Pending);
            state.listener = Some(Arc::clone(&listener));
            core.publish(&state);
        }

        let opened = core
            .manager
            .start(core.api.stream_url(), Arc::clone(&listener))
            .await;

        let superseded = {
            let mut state = core.lock_state();
            if state.epoch == epoch {
                state.in_flight = false;
                if let Err(err) = &opened {
                    state.last_error = Some(err.to_string());
                    state.connectivity_lost = true;
                }
                core.publish(&state);
                false
            } else {
                true
            }
        };
        if superseded {
            core.manager.release(&listener);
            return Err(PaymentError::Superseded);
        }

        Ok(created.payment_url)
    }

    /// Stop streaming and return to `NO_ORDER`. Idempotent.
    pub fn reset(&self) {
        let core = &self.core;
        let previous = {
            let mut state = core.lock_state();
            let (_, previous) = state.begin_epoch();
            core.publish(&state);
            previous
        };
        core.manager.stop();
        drop(previous);
        core.clear_trace();
        debug!("Payment session reset");
    }

    /// Whether an order is waiting for a terminal status.
    pub fn is_retry_eligible(&self) -> bool {
        self.core.lock_state().is_retry_eligible()
    }

    /// Ask the backend to complete the current order.
    pub async fn simulate_success(&self) -> Result<String, PaymentError> {
        let order_id = self.require_order()?;
        info!("Simulating success for order {}", order_id);
        self.core.api.simulate_success(&order_id).await
    }

    /// Ask the backend to fail the current order.
    pub async fn simulate_failure(&self, reason: &str) -> Result<String, PaymentError> {
        let order_id = self.require_order()?;
        info!("Simulating failure for order {}: {}", order_id, reason);
        self.core.api.simulate_failure(&order_id, reason).await
    }

    /// Poll the backend for the current order's status.
    ///
    /// Useful when the stream is gone. A newer status than the session's is
    /// applied exactly as if it had arrived on the stream.
    pub async fn refresh_status(&self) -> Result<PaymentStatus, PaymentError> {
        let (order_id, epoch) = {
            let state = self.core.lock_state();
            let order_id = state.order_id.clone().ok_or(PaymentError::NoActiveOrder)?;
            (order_id, state.epoch)
        };

        let status = self.core.api.order_status(&order_id).await?;

        let mut state = self.core.lock_state();
        if state.epoch != epoch {
            return Err(PaymentError::Superseded);
        }
        if state.status != Some(status) {
            let message = state.message.clone();
            let update = PaymentStatusUpdate::new(order_id, status).with_message(message);
            self.core.apply_update(&mut state, &update);
            self.core.publish(&state);
        }
        Ok(status)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.core.lock_state().snapshot()
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.core.lock_state().order_id.clone()
    }

    pub fn status(&self) -> Option<PaymentStatus> {
        self.core.lock_state().status
    }

    pub fn message(&self) -> String {
        self.core.lock_state().message.clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.core.lock_state().in_flight
    }

    pub fn last_error(&self) -> Option<String> {
        self.core.lock_state().last_error.clone()
    }

    pub fn connectivity_lost(&self) -> bool {
        self.core.lock_state().connectivity_lost
    }

    /// Recorded events, oldest first. Empty when tracing is disabled.
    pub fn trace(&self) -> Vec<TraceEntry> {
        self.core
            .trace
            .as_ref()
            .map(|trace| lock(trace).entries())
            .unwrap_or_default()
    }

    pub fn trace_enabled(&self) -> bool {
        self.core.trace.is_some()
    }

    /// Subscribe to snapshot changes.
    pub fn status_receiver(&self) -> watch::Receiver<SessionSnapshot> {
        self.core.snapshot_tx.subscribe()
    }

    pub fn manager(&self) -> &StreamConnectionManager {
        &self.core.manager
    }

    pub fn api(&self) -> &PaymentApiClient {
        &self.core.api
    }

    pub fn config(&self) -> &ClientConfig {
        &self.core.config
    }

    fn require_order(&self) -> Result<OrderId, PaymentError> {
        self.core
            .lock_state()
            .order_id
            .clone()
            .ok_or(PaymentError::NoActiveOrder)
    }
}

impl Drop for PaymentSession {
    fn drop(&mut self) {
        self.core.manager.stop();
        let teardown = self.core.lock_state().teardown.take();
        if let Some(teardown) = teardown {
            teardown.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionCore {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        lock(&self.state)
    }

    fn publish(&self, state: &SessionState) {
        self.snapshot_tx.send_replace(state.snapshot());
    }

    fn record(&self, entry: TraceEntry) {
        if let Some(trace) = &self.trace {
            lock(trace).push(entry);
        }
    }

    fn clear_trace(&self) {
        if let Some(trace) = &self.trace {
            lock(trace).clear();
        }
    }

    /// Called by the manager with its slot lock held.
    fn handle_event(self: &Arc<Self>, epoch: u64, event: StreamEvent) {
        let mut state = self.lock_state();
        if state.epoch != epoch {
            return;
        }
        if self.trace.is_some() {
            self.record(TraceEntry::from_event(&event));
        }

        match &event.data {
            EventData::Status(update) => self.apply_update(&mut state, update),
            EventData::Invalid(err) => {
                state.last_error = Some(err.to_string());
            }
            EventData::Failure(err) if err.is_terminal() => {
                error!("{}", err.user_message());
                state.connectivity_lost = true;
                state.last_error = Some(err.to_string());
            }
            EventData::Failure(err) => {
                debug!("Stream failure for order {:?}: {}", state.order_id, err);
                state.last_error = Some(err.to_string());
            }
            EventData::Heartbeat | EventData::None => {
                if event.kind == StreamEventKind::Open {
                    state.connectivity_lost = false;
                }
            }
        }

        self.publish(&state);
    }

    fn apply_update(self: &Arc<Self>, state: &mut SessionState, update: &PaymentStatusUpdate) {
        let Some(current) = state.order_id.as_ref() else {
            debug!("Ignoring update for {}: no active order", update.order_id);
            return;
        };
        if *current != update.order_id {
            debug!(
                "Ignoring update for {} while following {}",
                update.order_id, current
            );
            return;
        }
        if let Some(status) = state.status.filter(|s| s.is_terminal()) {
            debug!(
                "Order {} already {}, ignoring {}",
                current, status, update.status
            );
            return;
        }

        info!("Order {} status: {}", current, update.status);
        state.status = Some(update.status);
        state.message = update.message.clone().unwrap_or_default();

        if update.status.is_terminal() {
            self.schedule_teardown(state);
        }
    }

    fn schedule_teardown(self: &Arc<Self>, state: &mut SessionState) {
        if state.teardown.is_some() {
            return;
        }
        let core = Arc::downgrade(self);
        let epoch = state.epoch;
        let grace = self.config.teardown_grace;
        debug!("Closing payment event stream in {:?}", grace);

        state.teardown = Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(core) = core.upgrade() {
                core.finish_teardown(epoch);
            }
        }));
    }

    fn finish_teardown(&self, epoch: u64) {
        let listener = {
            let mut state = self.lock_state();
            let terminal = state.status.map(|s| s.is_terminal()).unwrap_or(false);
            if state.epoch != epoch || !terminal {
                return;
            }
            state.teardown = None;
            state.listener.clone()
        };

        let Some(listener) = listener else {
            return;
        };
        if self.manager.release(&listener) {
            info!("Payment complete, event stream closed");
            self.record(TraceEntry::new(CLOSED_MANUALLY, None));
        } else {
            warn!("Payment complete, event stream was already closed");
        }
    }
}
