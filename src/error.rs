//! Error types for trace-confirm.
//!
//! Only the signing and transport boundaries can fail. Payload parsing and trace
//! matching are total and have no error type of their own.

use thiserror::Error;

/// Errors raised by the wallet collaborator while signing or broadcasting.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SigningError {
    /// The user or wallet declined to sign.
    #[error("Signature rejected: {reason}")]
    Rejected {
        /// Reason given by the wallet.
        reason: String,
    },

    /// Signed, but the network did not accept the transaction.
    #[error("Broadcast failed: {message}")]
    BroadcastFailed {
        /// Node or wallet error text.
        message: String,
    },

    /// The active user's account could not be resolved.
    #[error("Account name unavailable: {message}")]
    AccountUnavailable {
        /// Wallet error text.
        message: String,
    },
}

/// Errors raised at the subscription transport boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// A connection attempt failed. Transient.
    #[error("Connection failed: {message}")]
    ConnectFailed {
        /// Transport error text.
        message: String,
    },

    /// An established channel dropped. Transient.
    #[error("Connection lost: {message}")]
    ConnectionLost {
        /// Transport error text.
        message: String,
    },

    /// The backend refused the subscription, e.g. a malformed filter.
    #[error("Subscription rejected: {message}")]
    Rejected {
        /// Backend error text.
        message: String,
    },

    /// Credentials could not be refreshed, or came back already expired.
    #[error("Credential renewal failed: {message}")]
    CredentialRenewal {
        /// Provider error text.
        message: String,
    },

    /// More consecutive failures than `max_reconnect_attempts`.
    #[error("Reconnection gave up after {attempts} attempts")]
    RetriesExhausted {
        /// The configured attempt limit.
        attempts: u32,
    },

    /// A stream message did not have the expected shape.
    #[error("Failed to decode stream message: {message}")]
    Decode {
        /// Decoder error text.
        message: String,
    },
}

impl TransportError {
    /// Returns true if the session should reconnect rather than terminate.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectFailed { .. } | Self::ConnectionLost { .. })
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode {
            message: err.to_string(),
        }
    }
}

/// Top-level error type for trace-confirm.
#[derive(Debug, Error)]
pub enum ConfirmError {
    /// Signing or broadcast failed.
    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),

    /// The result stream failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// `submit` was called without a wallet.
    #[error("No active user; login required before submitting")]
    NoActiveUser,

    /// Unexpected condition inside the crate.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the condition.
        message: String,
    },
}

impl ConfirmError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a signing error.
    #[must_use]
    pub const fn is_signing(&self) -> bool {
        matches!(self, Self::Signing(_))
    }

    /// Returns true if this is a transport error.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns true if resubmitting may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Signing(e) => matches!(e, SigningError::BroadcastFailed { .. }),
            Self::Transport(e) => !matches!(e, TransportError::Rejected { .. }),
            Self::NoActiveUser => true, // after login
            Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for trace-confirm operations.
pub type ConfirmResult<T> = Result<T, ConfirmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_error_display() {
        let err = SigningError::Rejected {
            reason: "user cancelled".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("rejected"));
        assert!(msg.contains("user cancelled"));
    }

    #[test]
    fn test_transport_error_transient() {
        assert!(TransportError::ConnectionLost {
            message: "reset".to_string()
        }
        .is_transient());
        assert!(TransportError::ConnectFailed {
            message: "refused".to_string()
        }
        .is_transient());
        assert!(!TransportError::CredentialRenewal {
            message: "expired".to_string()
        }
        .is_transient());
        assert!(!TransportError::RetriesExhausted { attempts: 3 }.is_transient());
    }

    #[test]
    fn test_transport_error_retries_display() {
        let msg = format!("{}", TransportError::RetriesExhausted { attempts: 7 });
        assert!(msg.contains("7 attempts"));
    }

    #[test]
    fn test_decode_error_from_serde() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: TransportError = err.into();
        assert!(matches!(err, TransportError::Decode { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_confirm_error_from_signing() {
        let err: ConfirmError = SigningError::BroadcastFailed {
            message: "node down".to_string(),
        }
        .into();
        assert!(err.is_signing());
        assert!(err.is_retryable());

        let err: ConfirmError = SigningError::Rejected {
            reason: "no".to_string(),
        }
        .into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_confirm_error_from_transport() {
        let err: ConfirmError = TransportError::Rejected {
            message: "bad query".to_string(),
        }
        .into();
        assert!(err.is_transport());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_confirm_error_internal() {
        let err = ConfirmError::internal("unexpected state");
        assert!(!err.is_retryable());
        assert!(format!("{err}").contains("unexpected state"));
    }
}
