//! Confirmation controller.
//!
//! Orchestrates one confirmation attempt at a time:
//!
//! ```text
//! Idle -> AwaitingSignature -> Streaming(filter) -> Matched
//!   ^            |                  |                 |
//!   +-- signing failure / fatal stream error / reset -+
//! ```
//!
//! The controller owns the accumulated messages and the current `MatchState`.
//! Sessions push events into a bounded queue that only the controller drains, so
//! every mutation happens on the caller's thread.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ConfirmConfig, StreamArming};
use crate::error::{ConfirmError, ConfirmResult};
use crate::matcher::{self, MatchState};
use crate::presentation::{PresentationUpdate, Presenter, RenderView};
use crate::query::{FilterExpression, QueryBuilder};
use crate::stream::{
    CredentialProvider, SessionEvent, SessionHandle, SessionId, SessionState, StreamSession,
    SubscriptionTransport,
};
use crate::trace::{StreamMessage, TransactionId};
use crate::wallet::{SignOptions, TransactionEnvelope, WalletProvider};

/// Where the controller is in the confirmation flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ControllerState {
    /// Nothing submitted, or the last attempt ended.
    Idle,
    /// Payload captured; the wallet is signing.
    AwaitingSignature {
        /// Filter derived from the payload.
        filter: FilterExpression,
    },
    /// Transaction broadcast; watching the stream for it.
    Streaming {
        /// Filter the session is bound to.
        filter: FilterExpression,
        /// Active session.
        session: SessionId,
    },
    /// The transaction was seen. Streaming continues.
    Matched {
        /// Filter the session is bound to.
        filter: FilterExpression,
        /// Active session.
        session: SessionId,
    },
}

impl ControllerState {
    /// Filter of the current attempt, if any.
    #[must_use]
    pub fn filter(&self) -> Option<&FilterExpression> {
        match self {
            Self::Idle => None,
            Self::AwaitingSignature { filter }
            | Self::Streaming { filter, .. }
            | Self::Matched { filter, .. } => Some(filter),
        }
    }
}

/// Drives submissions, stream sessions, and matching for one UI.
pub struct ConfirmationController {
    cfg: ConfirmConfig,
    queries: QueryBuilder,
    sessions: StreamSession,
    presenter: Arc<dyn Presenter>,
    wallet: Option<Arc<dyn WalletProvider>>,
    account_name: Option<String>,

    state: ControllerState,
    session: Option<SessionHandle>,
    events_tx: Arc<Sender<SessionEvent>>,
    events_rx: Receiver<SessionEvent>,

    messages: Vec<StreamMessage>,
    transaction_id: Option<TransactionId>,
    match_state: MatchState,
}

impl fmt::Debug for ConfirmationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfirmationController")
            .field("state", &self.state)
            .field("account_name", &self.account_name)
            .field("transaction_id", &self.transaction_id)
            .field("messages", &self.messages.len())
            .field("found", &self.match_state.is_found())
            .finish_non_exhaustive()
    }
}

impl ConfirmationController {
    /// Create an idle controller. No session is opened until `submit`.
    #[must_use]
    pub fn new(
        cfg: ConfirmConfig,
        transport: Arc<dyn SubscriptionTransport>,
        credentials: Arc<dyn CredentialProvider>,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        let (events_tx, events_rx) = bounded(cfg.stream.event_queue_capacity.max(1));

        Self {
            queries: QueryBuilder::with_namespace(cfg.namespace.clone()),
            sessions: StreamSession::new(cfg.stream.clone(), transport, credentials),
            cfg,
            presenter,
            wallet: None,
            account_name: None,
            state: ControllerState::Idle,
            session: None,
            events_tx: Arc::new(events_tx),
            events_rx,
            messages: Vec::new(),
            transaction_id: None,
            match_state: MatchState::Waiting,
        }
    }

    /// Current position in the confirmation flow.
    #[must_use]
    pub const fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Latest match result. Never regresses from `Found` for the same target.
    #[must_use]
    pub const fn match_state(&self) -> &MatchState {
        &self.match_state
    }

    /// Every message received by the active session, in arrival order.
    #[must_use]
    pub fn messages(&self) -> &[StreamMessage] {
        &self.messages
    }

    /// Id returned by the wallet for the current submission.
    #[must_use]
    pub const fn transaction_id(&self) -> Option<&TransactionId> {
        self.transaction_id.as_ref()
    }

    /// Account name of the active user, if the lookup succeeded.
    #[must_use]
    pub fn account_name(&self) -> Option<&str> {
        self.account_name.as_deref()
    }

    /// Id of the active stream session.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(SessionHandle::id)
    }

    /// Lifecycle state of the active stream session.
    #[must_use]
    pub fn session_state(&self) -> Option<SessionState> {
        self.session.as_ref().map(SessionHandle::state)
    }

    /// Explorer link for the submitted transaction.
    #[must_use]
    pub fn explorer_url(&self) -> Option<String> {
        self.transaction_id
            .as_ref()
            .map(|id| self.cfg.explorer.transaction_url(id))
    }

    /// Install or clear the active user's wallet.
    ///
    /// The account name is fetched immediately; a failed lookup is logged and the
    /// wallet is kept, so the user can still submit.
    pub fn set_active_user(&mut self, wallet: Option<Arc<dyn WalletProvider>>) {
        match wallet {
            Some(wallet) => {
                self.account_name = match wallet.account_name() {
                    Ok(name) => {
                        info!(account = %name, "active user updated");
                        Some(name)
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to fetch account name for active user");
                        None
                    }
                };
                self.wallet = Some(wallet);
            }
            None => {
                debug!("active user cleared");
                self.wallet = None;
                self.account_name = None;
            }
        }
    }

    /// Sign and broadcast `payload`, then watch the stream for the transaction.
    ///
    /// Any session from a previous submission is closed first. Failures leave the
    /// controller `Idle` and are returned for the caller to report.
    pub fn submit(&mut self, payload: &str) -> ConfirmResult<TransactionId> {
        let Some(wallet) = self.wallet.clone() else {
            info!("submission without active user; requesting login");
            self.presenter.request_login();
            return Err(ConfirmError::NoActiveUser);
        };

        self.teardown();

        let filter = self.queries.build(payload);
        info!(filter = %filter, "submitting transaction");
        self.state = ControllerState::AwaitingSignature {
            filter: filter.clone(),
        };

        if self.cfg.arming == StreamArming::BeforeSignature {
            if let Err(err) = self.open_stream(filter.clone()) {
                self.state = ControllerState::Idle;
                return Err(err);
            }
        }

        let envelope = TransactionEnvelope {
            actor: self.account_name.clone(),
            key: self.cfg.event_key.clone(),
            data: payload.to_string(),
        };

        let signed = match wallet.sign_transaction(&envelope, SignOptions { broadcast: true }) {
            Ok(signed) => signed,
            Err(err) => {
                warn!(error = %err, "an error occurred while pushing transaction");
                self.teardown();
                self.state = ControllerState::Idle;
                return Err(err.into());
            }
        };

        info!(transaction = %signed.transaction_id, "transaction broadcast");
        self.transaction_id = Some(signed.transaction_id.clone());

        if self.session.is_none() {
            if let Err(err) = self.open_stream(filter.clone()) {
                self.state = ControllerState::Idle;
                return Err(err);
            }
        }

        let session = self
            .session_id()
            .ok_or_else(|| ConfirmError::internal("stream session missing after open"))?;
        self.state = ControllerState::Streaming { filter, session };

        // Batches that arrived while signing were queued without a target.
        if !self.messages.is_empty() {
            self.reevaluate();
        }

        Ok(signed.transaction_id)
    }

    /// Apply every queued session event without blocking. Returns how many were
    /// applied (stale events are discarded and not counted).
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            if self.handle_event(event) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait up to `timeout` for one session event and apply it.
    ///
    /// Returns true if an event from the active session was applied.
    pub fn wait_for_event(&mut self, timeout: Duration) -> bool {
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => self.handle_event(event),
            Err(_) => false,
        }
    }

    /// Close any session and return to `Idle`.
    pub fn reset(&mut self) {
        self.teardown();
        self.state = ControllerState::Idle;
    }

    fn open_stream(&mut self, filter: FilterExpression) -> ConfirmResult<()> {
        let sink = Arc::clone(&self.events_tx);
        let handle = self.sessions.open(filter, sink)?;
        self.session = Some(handle);
        self.publish(RenderView::Loading);
        Ok(())
    }

    fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
        // Anything still queued belongs to the closed session.
        let stale = self.events_rx.try_iter().count();
        if stale > 0 {
            debug!(events = stale, "discarded events from closed session");
        }
        self.messages.clear();
        self.transaction_id = None;
        self.match_state = MatchState::Waiting;
    }

    fn handle_event(&mut self, event: SessionEvent) -> bool {
        let active = self.session_id();
        if active != Some(event.session()) {
            debug!(session = %event.session(), "ignoring event from inactive session");
            return false;
        }

        match event {
            SessionEvent::Batch { messages, .. } => {
                self.messages.extend(messages);
                if self.transaction_id.is_some() {
                    self.reevaluate();
                }
            }
            SessionEvent::StateChanged { session, state } => {
                debug!(session = %session, state = ?state, "stream session state changed");
            }
            SessionEvent::Failed { session, error } => {
                warn!(session = %session, error = %error, "stream failed; confirmation stopped");
                if let Some(handle) = self.session.take() {
                    handle.close();
                }
                self.state = ControllerState::Idle;
                self.publish(RenderView::Error {
                    message: error.to_string(),
                });
            }
        }
        true
    }

    fn reevaluate(&mut self) {
        let next = matcher::evaluate(&self.messages, self.transaction_id.as_ref());

        // Found never regresses to Waiting for the same target.
        if next.is_found() || !self.match_state.is_found() {
            self.match_state = next;
        }

        if self.match_state.is_found() {
            if let ControllerState::Streaming { filter, session } = &self.state {
                info!(
                    transaction = ?self.transaction_id.as_ref().map(TransactionId::as_str),
                    "transaction confirmed on stream"
                );
                self.state = ControllerState::Matched {
                    filter: filter.clone(),
                    session: *session,
                };
            }
        }

        self.publish(RenderView::Results {
            state: self.match_state.clone(),
        });
    }

    fn publish(&self, view: RenderView) {
        self.presenter.present(PresentationUpdate {
            transaction_id: self.transaction_id.clone(),
            explorer_url: self.explorer_url(),
            view,
        });
    }
}
