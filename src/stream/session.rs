//! Stream session worker.
//!
//! Each opened session owns one worker thread that connects, reads batches,
//! reconnects on transient loss, and forwards everything to a `SessionSink`.
//! Deliveries pass through a gate that `close` shuts, so once `close` returns
//! the sink is never called again. A full sink stalls the worker (and with it the
//! transport read) until the consumer catches up or the session is closed.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StreamConfig;
use crate::error::{ConfirmError, ConfirmResult, TransportError};
use crate::query::FilterExpression;
use crate::trace::StreamMessage;

use super::transport::{CredentialProvider, SubscriptionChannel, SubscriptionTransport};

/// Unique identifier for a stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a subscription session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// First connection attempt in progress.
    Connecting,
    /// Channel established and reading.
    Open,
    /// Waiting out a backoff delay after a transient failure.
    Reconnecting,
    /// Closed by the owner or after a fatal failure. Terminal.
    Closed,
}

/// Everything a session reports to its sink. Each event names its session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Newly received messages, in transport order.
    Batch {
        /// Originating session.
        session: SessionId,
        /// Non-empty batch as read from the transport.
        messages: Vec<StreamMessage>,
    },
    /// The session moved to a new lifecycle state.
    StateChanged {
        /// Originating session.
        session: SessionId,
        /// State entered.
        state: SessionState,
    },
    /// Terminal failure. The session closes right after.
    Failed {
        /// Originating session.
        session: SessionId,
        /// Cause reported by the transport or credential provider.
        error: TransportError,
    },
}

impl SessionEvent {
    /// Session that produced this event.
    #[must_use]
    pub const fn session(&self) -> SessionId {
        match self {
            Self::Batch { session, .. }
            | Self::StateChanged { session, .. }
            | Self::Failed { session, .. } => *session,
        }
    }
}

/// Receives session events.
///
/// Called from the session worker thread. Implementations must not block and must
/// not close the delivering session from inside `deliver`.
pub trait SessionSink: Send + Sync {
    /// Offer one event without blocking.
    ///
    /// `Full` hands the event back; the worker waits and offers it again.
    /// `Disconnected` means nobody is listening and the event is discarded.
    fn deliver(&self, event: SessionEvent) -> Result<(), TrySendError<SessionEvent>>;
}

impl SessionSink for Sender<SessionEvent> {
    fn deliver(&self, event: SessionEvent) -> Result<(), TrySendError<SessionEvent>> {
        self.try_send(event)
    }
}

#[derive(Debug)]
enum ControlMsg {
    Close,
}

struct Shared {
    id: SessionId,
    filter: FilterExpression,
    /// Delivery gate: `true` once closed. Held for the duration of every delivery.
    closed: Mutex<bool>,
    state: Mutex<SessionState>,
    finished: AtomicBool,
    dropped_batches: AtomicU64,
    reconnects: AtomicU64,
}

impl Shared {
    fn gate(&self) -> MutexGuard<'_, bool> {
        self.closed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the previous state.
    fn set_state(&self, next: SessionState) -> SessionState {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *state, next)
    }
}

/// Factory for stream sessions sharing one transport and credential source.
#[derive(Clone)]
pub struct StreamSession {
    cfg: StreamConfig,
    transport: Arc<dyn SubscriptionTransport>,
    credentials: Arc<dyn CredentialProvider>,
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession").field("cfg", &self.cfg).finish_non_exhaustive()
    }
}

impl StreamSession {
    /// Bind the transport and credential source shared by every opened session.
    #[must_use]
    pub fn new(
        cfg: StreamConfig,
        transport: Arc<dyn SubscriptionTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            cfg,
            transport,
            credentials,
        }
    }

    /// Tuning applied to opened sessions.
    #[must_use]
    pub const fn config(&self) -> &StreamConfig {
        &self.cfg
    }

    /// Open a session bound to `filter` and start delivering to `sink`.
    pub fn open(
        &self,
        filter: FilterExpression,
        sink: Arc<dyn SessionSink>,
    ) -> ConfirmResult<SessionHandle> {
        let shared = Arc::new(Shared {
            id: SessionId::new(),
            filter,
            closed: Mutex::new(false),
            state: Mutex::new(SessionState::Connecting),
            finished: AtomicBool::new(false),
            dropped_batches: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        });

        let (control_tx, control_rx) = bounded::<ControlMsg>(1);

        let worker = Worker {
            cfg: self.cfg.clone(),
            transport: Arc::clone(&self.transport),
            credentials: Arc::clone(&self.credentials),
            shared: Arc::clone(&shared),
            sink,
            control_rx,
        };

        info!(session = %shared.id, filter = %shared.filter, "opening stream session");

        let join = thread::Builder::new()
            .name("trace-confirm-session".to_string())
            .spawn(move || worker.run())
            .map_err(|e| ConfirmError::internal(format!("failed to spawn session worker: {e}")))?;

        Ok(SessionHandle {
            shared,
            control_tx,
            join: Mutex::new(Some(join)),
        })
    }
}

/// Handle to a live session. Dropping it closes the session.
pub struct SessionHandle {
    shared: Arc<Shared>,
    control_tx: Sender<ControlMsg>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.shared.id)
            .field("filter", &self.shared.filter)
            .field("state", &self.shared.state())
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    /// Session id stamped on every event.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    /// Filter the session is bound to for its whole lifetime.
    #[must_use]
    pub fn filter(&self) -> &FilterExpression {
        &self.shared.filter
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// True once `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.shared.gate()
    }

    /// True once the worker thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }

    /// Batches discarded because the sink was disconnected.
    #[must_use]
    pub fn dropped_batches(&self) -> u64 {
        self.shared.dropped_batches.load(Ordering::Relaxed)
    }

    /// Reconnect attempts made over the session's lifetime.
    #[must_use]
    pub fn reconnects(&self) -> u64 {
        self.shared.reconnects.load(Ordering::Relaxed)
    }

    /// Stop the session.
    ///
    /// Idempotent and non-blocking. Waits only for an in-flight delivery to finish;
    /// after it returns the sink is not invoked again.
    pub fn close(&self) {
        {
            let mut closed = self.shared.gate();
            if *closed {
                return;
            }
            *closed = true;
        }
        self.shared.set_state(SessionState::Closed);

        // Full only if a close is already queued.
        let _ = self.control_tx.try_send(ControlMsg::Close);
        debug!(session = %self.shared.id, "stream session closed");
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.close();

        if let Ok(mut guard) = self.join.lock() {
            // Detach: the worker notices the close within one poll interval.
            drop(guard.take());
        }
    }
}

struct Worker {
    cfg: StreamConfig,
    transport: Arc<dyn SubscriptionTransport>,
    credentials: Arc<dyn CredentialProvider>,
    shared: Arc<Shared>,
    sink: Arc<dyn SessionSink>,
    control_rx: Receiver<ControlMsg>,
}

enum ReadOutcome {
    Closed,
    Lost(TransportError),
    Fatal(TransportError),
}

enum Offer {
    Delivered,
    Disconnected,
    Closed,
}

impl Worker {
    fn run(self) {
        let mut failures: u32 = 0;

        loop {
            if self.close_requested() {
                break;
            }

            let credentials = match self.credentials.refresh() {
                Ok(credentials) => credentials,
                Err(err) => {
                    let err = match err {
                        TransportError::CredentialRenewal { .. } => err,
                        other => TransportError::CredentialRenewal {
                            message: other.to_string(),
                        },
                    };
                    self.fail(err);
                    break;
                }
            };
            if credentials.is_expired(Utc::now()) {
                self.fail(TransportError::CredentialRenewal {
                    message: format!(
                        "provider returned credentials that expired at {}",
                        credentials
                            .expires_at()
                            .map(|at| at.to_rfc3339())
                            .unwrap_or_default()
                    ),
                });
                break;
            }

            let mut channel = match self.transport.connect(&self.shared.filter, &credentials) {
                Ok(channel) => channel,
                Err(err) if err.is_transient() => {
                    failures = failures.saturating_add(1);
                    if self.backoff(failures, &err) {
                        continue;
                    }
                    break;
                }
                Err(err) => {
                    self.fail(err);
                    break;
                }
            };

            failures = 0;
            self.transition(SessionState::Open);
            info!(session = %self.shared.id, "stream session connected");

            let outcome = self.read_until_interrupted(channel.as_mut());
            channel.close();

            match outcome {
                ReadOutcome::Closed => break,
                ReadOutcome::Lost(err) => {
                    failures = failures.saturating_add(1);
                    if !self.backoff(failures, &err) {
                        break;
                    }
                }
                ReadOutcome::Fatal(err) => {
                    self.fail(err);
                    break;
                }
            }
        }

        self.transition(SessionState::Closed);
        self.shared.finished.store(true, Ordering::Release);
        debug!(session = %self.shared.id, "stream session worker exited");
    }

    fn read_until_interrupted(&self, channel: &mut dyn SubscriptionChannel) -> ReadOutcome {
        loop {
            if self.close_requested() {
                return ReadOutcome::Closed;
            }

            match channel.next_batch(self.cfg.poll_interval) {
                Ok(Some(messages)) if !messages.is_empty() => {
                    if !self.deliver_batch(messages) {
                        return ReadOutcome::Closed;
                    }
                }
                Ok(_) => {}
                Err(err) if err.is_transient() => return ReadOutcome::Lost(err),
                Err(err) => return ReadOutcome::Fatal(err),
            }
        }
    }

    fn close_requested(&self) -> bool {
        match self.control_rx.try_recv() {
            Ok(ControlMsg::Close) | Err(TryRecvError::Disconnected) => true,
            Err(TryRecvError::Empty) => *self.shared.gate(),
        }
    }

    /// Wait out the reconnect delay. Returns false if the session should stop.
    fn backoff(&self, failures: u32, cause: &TransportError) -> bool {
        let max = self.cfg.max_reconnect_attempts;
        if max != 0 && failures > max {
            self.fail(TransportError::RetriesExhausted { attempts: max });
            return false;
        }

        self.transition(SessionState::Reconnecting);
        self.shared.reconnects.fetch_add(1, Ordering::Relaxed);

        let delay = self.cfg.backoff_delay(failures);
        warn!(
            session = %self.shared.id,
            attempt = failures,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %cause,
            "stream transport lost; reconnecting"
        );

        match self.control_rx.recv_timeout(delay) {
            Err(RecvTimeoutError::Timeout) => !*self.shared.gate(),
            Ok(ControlMsg::Close) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Returns false if the session closed while the batch was pending.
    fn deliver_batch(&self, messages: Vec<StreamMessage>) -> bool {
        let count = messages.len();
        let event = SessionEvent::Batch {
            session: self.shared.id,
            messages,
        };

        match self.offer(event) {
            Offer::Delivered => true,
            Offer::Disconnected => {
                self.shared.dropped_batches.fetch_add(1, Ordering::Relaxed);
                warn!(session = %self.shared.id, messages = count, "sink disconnected; batch dropped");
                true
            }
            Offer::Closed => false,
        }
    }

    fn transition(&self, next: SessionState) {
        let changed = {
            let closed = self.shared.gate();
            if *closed {
                return;
            }
            self.shared.set_state(next) != next
        };
        if changed {
            let _ = self.offer(SessionEvent::StateChanged {
                session: self.shared.id,
                state: next,
            });
        }
    }

    fn fail(&self, error: TransportError) {
        warn!(session = %self.shared.id, error = %error, "stream session failed");
        let _ = self.offer(SessionEvent::Failed {
            session: self.shared.id,
            error,
        });
    }

    /// Hand `event` to the sink, waiting while it is full.
    ///
    /// The gate is held only for each attempt, so `close` never waits on a stalled
    /// consumer. Waiting ends early once the session is closed.
    fn offer(&self, mut event: SessionEvent) -> Offer {
        let mut stalled = false;
        loop {
            {
                let closed = self.shared.gate();
                if *closed {
                    return Offer::Closed;
                }
                match self.sink.deliver(event) {
                    Ok(()) => return Offer::Delivered,
                    Err(TrySendError::Disconnected(_)) => return Offer::Disconnected,
                    Err(TrySendError::Full(back)) => event = back,
                }
            }

            if !stalled {
                stalled = true;
                debug!(session = %self.shared.id, "sink full; waiting for consumer");
            }
            match self.control_rx.recv_timeout(self.cfg.poll_interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(ControlMsg::Close) | Err(RecvTimeoutError::Disconnected) => return Offer::Closed,
            }
        }
    }
}
