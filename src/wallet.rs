//! Wallet collaborator seam.
//!
//! Signing, broadcast, and chain-specific envelope encoding live behind
//! `WalletProvider`. The controller only hands over the envelope fields.

use serde::{Deserialize, Serialize};

use crate::error::SigningError;
use crate::trace::TransactionId;

/// Fields of the event transaction the wallet encodes and signs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    /// Authorizing account. `None` if the account lookup failed.
    pub actor: Option<String>,
    /// Event key configured for the deployment.
    pub key: String,
    /// Raw payload string, e.g. `key=foo&value=bar`.
    pub data: String,
}

/// Options passed to the wallet with each envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignOptions {
    /// Push the signed transaction to the network.
    pub broadcast: bool,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self { broadcast: true }
    }
}

/// Result of a successful signing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    /// Id assigned to the broadcast transaction.
    pub transaction_id: TransactionId,
}

/// The active user's wallet.
pub trait WalletProvider: Send + Sync {
    /// Account name of the logged-in user.
    fn account_name(&self) -> Result<String, SigningError>;

    /// Sign and (if requested) broadcast. May block on user approval.
    fn sign_transaction(
        &self,
        envelope: &TransactionEnvelope,
        options: SignOptions,
    ) -> Result<SignedTransaction, SigningError>;
}
