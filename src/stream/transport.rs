//! Subscription transport and credential collaborator seams.
//!
//! The physical channel (websocket, gRPC stream, ...) lives behind
//! `SubscriptionTransport`. Sessions only see batches and typed errors.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::TransportError;
use crate::query::FilterExpression;
use crate::trace::StreamMessage;

/// Access token for the subscription channel.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Wrap a token. `None` expiry means the token does not expire.
    #[must_use]
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Raw token presented to the transport.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Expiry instant, if the issuer set one.
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// True if the token is no longer valid at `now`. Sessions refuse to connect with it.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

// Keep tokens out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Renews channel credentials. Called before every connection attempt.
pub trait CredentialProvider: Send + Sync {
    /// Returns fresh credentials. Any error is fatal to the session.
    fn refresh(&self) -> Result<Credentials, TransportError>;
}

/// A provider that always hands out the same token.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    credentials: Credentials,
}

impl StaticCredentials {
    /// Provider for a non-expiring `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            credentials: Credentials::new(token, None),
        }
    }
}

impl CredentialProvider for StaticCredentials {
    fn refresh(&self) -> Result<Credentials, TransportError> {
        Ok(self.credentials.clone())
    }
}

/// Opens live channels bound to one filter.
pub trait SubscriptionTransport: Send + Sync {
    /// Open a channel delivering only traces matching `filter`.
    fn connect(
        &self,
        filter: &FilterExpression,
        credentials: &Credentials,
    ) -> Result<Box<dyn SubscriptionChannel>, TransportError>;
}

/// One established channel.
pub trait SubscriptionChannel: Send {
    /// Wait up to `timeout` for the next batch.
    ///
    /// `Ok(None)` means nothing arrived in time. Transient errors make the session
    /// reconnect; anything else terminates it.
    fn next_batch(&mut self, timeout: Duration) -> Result<Option<Vec<StreamMessage>>, TransportError>;

    /// Release the channel. Called once, on close or before reconnecting.
    fn close(&mut self) {}
}
