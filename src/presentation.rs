//! Presentation collaborator seam.
//!
//! The controller publishes a `PresentationUpdate` on every state change. UIs either
//! implement `Presenter` directly or consume a `PresentationFeed` from their own thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::matcher::MatchState;
use crate::trace::TransactionId;

/// Shown while a submitted transaction has not been seen on the stream.
pub const WAITING_TEXT: &str = "Waiting for transaction...";

/// Which render slot the UI should show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "slot", rename_all = "snake_case")]
pub enum RenderView {
    /// Stream opened, nothing received yet.
    Loading,
    /// Fatal stream failure. A new submission is required.
    Error {
        /// Human-readable cause.
        message: String,
    },
    /// Current match result.
    Results {
        /// `Waiting` or the matched traces.
        state: MatchState,
    },
}

impl RenderView {
    /// Plain-text rendering, one entry per displayed line.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        match self {
            Self::Loading => vec!["Loading ....".to_string()],
            Self::Error { message } => vec![format!("Error! {message}")],
            Self::Results { state: MatchState::Waiting } => vec![WAITING_TEXT.to_string()],
            Self::Results { state: MatchState::Found(matches) } => {
                matches.iter().map(|m| m.display_line()).collect()
            }
        }
    }
}

/// One published view together with the transaction it concerns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationUpdate {
    /// Transaction being confirmed, once the wallet returned it.
    pub transaction_id: Option<TransactionId>,
    /// Explorer link for `transaction_id`.
    pub explorer_url: Option<String>,
    /// Slot to render.
    pub view: RenderView,
}

/// Receives controller output. Called on the controller's thread.
pub trait Presenter: Send + Sync {
    /// Show `update`. Must not block the controller for long.
    fn present(&self, update: PresentationUpdate);

    /// A submission was attempted without an active user.
    fn request_login(&self) {}
}

/// Items carried by a `PresentationFeed`.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenterEvent {
    /// A published view.
    Update(PresentationUpdate),
    /// The user must log in before submitting.
    LoginRequested,
}

/// `Presenter` that forwards into a bounded queue without blocking.
#[derive(Debug)]
pub struct ChannelPresenter {
    tx: Sender<PresenterEvent>,
    dropped: Arc<AtomicU64>,
}

impl ChannelPresenter {
    fn forward(&self, event: PresenterEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl Presenter for ChannelPresenter {
    fn present(&self, update: PresentationUpdate) {
        self.forward(PresenterEvent::Update(update));
    }

    fn request_login(&self) {
        self.forward(PresenterEvent::LoginRequested);
    }
}

/// Consumer side of a presentation queue.
#[derive(Debug)]
pub struct PresentationFeed {
    rx: Receiver<PresenterEvent>,
    dropped: Arc<AtomicU64>,
}

impl PresentationFeed {
    /// Receive the next event (blocking). `None` once the presenter is gone.
    pub fn recv(&self) -> Option<PresenterEvent> {
        self.rx.recv().ok()
    }

    /// Receive the next event, waiting at most `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<PresenterEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Receive the next event if one is queued.
    pub fn try_recv(&self) -> Option<PresenterEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain everything queued right now.
    pub fn drain(&self) -> Vec<PresenterEvent> {
        self.rx.try_iter().collect()
    }

    /// Events lost because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Create a connected presenter/feed pair.
#[must_use]
pub fn presentation_channel(capacity: usize) -> (ChannelPresenter, PresentationFeed) {
    let (tx, rx) = bounded(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        ChannelPresenter {
            tx,
            dropped: Arc::clone(&dropped),
        },
        PresentationFeed { rx, dropped },
    )
}
