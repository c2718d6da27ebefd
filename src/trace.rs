//! Transaction trace data model delivered by the search stream.
//!
//! Messages use the search backend's result shape:
//!
//! ```json
//! {"searchTransactionsForward": {"trace": {"id": "...", "matchingActions": [
//!     {"account": "...", "name": "...", "json": {}}
//! ]}}}
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Ledger transaction identifier. Compared by exact string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Wrap a ledger-assigned id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TransactionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One effect of a transaction that matched the active filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingAction {
    /// Contract account that ran the action.
    pub account: String,
    /// Action name.
    pub name: String,
    /// Decoded action data.
    #[serde(default)]
    pub json: serde_json::Value,
}

impl fmt::Display for MatchingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} - {}", self.account, self.name, self.json)
    }
}

/// A ledger's record of one transaction's execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionTrace {
    /// Transaction id.
    pub id: TransactionId,
    /// Actions that matched the subscription filter, in execution order.
    #[serde(default)]
    pub matching_actions: Vec<MatchingAction>,
}

impl TransactionTrace {
    /// Build a trace from its parts.
    #[must_use]
    pub fn new(id: impl Into<TransactionId>, matching_actions: Vec<MatchingAction>) -> Self {
        Self {
            id: id.into(),
            matching_actions,
        }
    }
}

/// One event delivered by a subscription. Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SearchEnvelope", into = "SearchEnvelope")]
pub struct StreamMessage {
    trace: TransactionTrace,
    received_at: DateTime<Utc>,
}

impl StreamMessage {
    /// Wrap a trace, stamping it as received now.
    #[must_use]
    pub fn new(trace: TransactionTrace) -> Self {
        Self {
            trace,
            received_at: Utc::now(),
        }
    }

    /// Decode one search result.
    pub fn from_json(raw: &str) -> Result<Self, TransportError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Decode one search result from an already-parsed value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, TransportError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Trace carried by this message.
    #[must_use]
    pub const fn trace(&self) -> &TransactionTrace {
        &self.trace
    }

    /// Shorthand for `trace().id`.
    #[must_use]
    pub const fn trace_id(&self) -> &TransactionId {
        &self.trace.id
    }

    /// When the message was received (or built).
    #[must_use]
    pub const fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchEnvelope {
    search_transactions_forward: SearchResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SearchResult {
    trace: TransactionTrace,
}

impl From<SearchEnvelope> for StreamMessage {
    fn from(envelope: SearchEnvelope) -> Self {
        Self::new(envelope.search_transactions_forward.trace)
    }
}

impl From<StreamMessage> for SearchEnvelope {
    fn from(message: StreamMessage) -> Self {
        Self {
            search_transactions_forward: SearchResult {
                trace: message.trace,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const RESULT: &str = r#"{
        "searchTransactionsForward": {
            "trace": {
                "id": "abcdefgh12345678ijklmnop",
                "matchingActions": [
                    {"account": "dfuseiohooks", "name": "event", "json": {"auth_key": "", "data": "key=foo"}}
                ]
            }
        }
    }"#;

    #[test]
    fn decodes_search_result_shape() {
        let msg = StreamMessage::from_json(RESULT).unwrap();
        assert_eq!(msg.trace_id().as_str(), "abcdefgh12345678ijklmnop");
        let action = &msg.trace().matching_actions[0];
        assert_eq!(action.account, "dfuseiohooks");
        assert_eq!(action.name, "event");
        assert_eq!(action.json["data"], json!("key=foo"));
    }

    #[test]
    fn missing_actions_default_to_empty() {
        let msg = StreamMessage::from_value(json!({
            "searchTransactionsForward": {"trace": {"id": "t1"}}
        }))
        .unwrap();
        assert!(msg.trace().matching_actions.is_empty());
    }

    #[test]
    fn rejects_other_shapes() {
        let err = StreamMessage::from_value(json!({"trace": {"id": "t1"}})).unwrap_err();
        assert!(matches!(err, TransportError::Decode { .. }));
    }

    #[test]
    fn serializes_back_into_search_shape() {
        let msg = StreamMessage::new(TransactionTrace::new("t1", Vec::new()));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["searchTransactionsForward"]["trace"]["id"], json!("t1"));
    }

    #[test]
    fn action_display_includes_json() {
        let action = MatchingAction {
            account: "hooks".to_string(),
            name: "event".to_string(),
            json: json!({"data": "x"}),
        };
        assert_eq!(action.to_string(), r#"hooks:event - {"data":"x"}"#);
    }
}
