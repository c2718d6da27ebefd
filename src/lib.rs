//! # trace-confirm - live transaction confirmation
//!
//! trace-confirm takes a key/value payload submitted as a ledger transaction and
//! watches a continuously updating search stream until the transaction shows up,
//! then surfaces its matching action.
//!
//! ## Core Concepts
//!
//! - **FilterExpression**: search query derived from the payload (`event.key:foo event.value:bar`)
//! - **StreamSession**: resilient subscription for one filter, reconnecting transparently
//! - **MatchState**: `Waiting` or `Found`, recomputed over every accumulated message
//! - **ConfirmationController**: the submit → sign → stream → match state machine
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trace_confirm::{presentation_channel, ConfirmConfig, ConfirmationController};
//! use trace_confirm::stream::{MemoryTransport, StaticCredentials};
//!
//! let (presenter, feed) = presentation_channel(64);
//! let mut controller = ConfirmationController::new(
//!     ConfirmConfig::from_env(),
//!     Arc::new(MemoryTransport::new()),
//!     Arc::new(StaticCredentials::new("token")),
//!     Arc::new(presenter),
//! );
//! controller.set_active_user(Some(wallet));
//! let tx_id = controller.submit("key=foo&value=bar")?;
//! while controller.wait_for_event(std::time::Duration::from_millis(100)) {}
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod controller;
pub mod error;
pub mod matcher;
pub mod payload;
pub mod presentation;
pub mod query;
pub mod stream;
pub mod trace;
pub mod wallet;

// Re-export primary types at crate root for convenience
pub use config::{ConfirmConfig, ExplorerConfig, StreamArming, StreamConfig};
pub use controller::{ConfirmationController, ControllerState};
pub use error::{ConfirmError, ConfirmResult, SigningError, TransportError};
pub use matcher::{abbreviate_id, evaluate, MatchState, MatchedTrace};
pub use payload::{Payload, PayloadField};
pub use presentation::{
    presentation_channel, ChannelPresenter, PresentationFeed, PresentationUpdate, Presenter,
    PresenterEvent, RenderView,
};
pub use query::{build, FilterExpression, QueryBuilder};
pub use stream::{SessionEvent, SessionHandle, SessionId, SessionState, StreamSession};
pub use trace::{MatchingAction, StreamMessage, TransactionId, TransactionTrace};
pub use wallet::{SignOptions, SignedTransaction, TransactionEnvelope, WalletProvider};
