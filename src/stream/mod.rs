//! Result stream subsystem.
//!
//! A `StreamSession` keeps one subscription alive per filter, hides reconnects
//! behind a worker thread, and pushes `SessionEvent`s to a sink (normally a
//! bounded crossbeam queue drained by the controller).

/// In-process transport.
pub mod memory;
/// Session worker, handle, and events.
pub mod session;
/// Transport and credential collaborator traits.
pub mod transport;

pub use memory::MemoryTransport;
pub use session::{SessionEvent, SessionHandle, SessionId, SessionSink, SessionState, StreamSession};
pub use transport::{
    CredentialProvider, Credentials, StaticCredentials, SubscriptionChannel, SubscriptionTransport,
};
