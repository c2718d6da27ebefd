//! Payload to search filter translation.
//!
//! Grammar: `clause (" " clause)*` with `clause = namespace "." name ":" value`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::payload::{Payload, PayloadField};

/// Namespace used by the search backend for hook events.
pub const DEFAULT_NAMESPACE: &str = "event";

/// Placeholder rendered for a field without a value. The clause is still emitted.
pub const MISSING_VALUE: &str = "undefined";

/// A structured search filter bound to one subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterExpression(String);

impl FilterExpression {
    /// Wrap an already-formatted filter.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Filter text as sent to the transport.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for a filter with no clauses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the space-separated clauses.
    pub fn clauses(&self) -> impl Iterator<Item = &str> {
        self.0.split(' ').filter(|c| !c.is_empty())
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds filters under a fixed namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryBuilder {
    namespace: String,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::with_namespace(DEFAULT_NAMESPACE)
    }
}

impl QueryBuilder {
    /// Builder prefixing every clause with `namespace`.
    #[must_use]
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Clause prefix.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Parse `raw` and build its filter.
    #[must_use]
    pub fn build(&self, raw: &str) -> FilterExpression {
        self.build_payload(&Payload::parse(raw))
    }

    /// Build a filter from an already-parsed payload. One clause per field, in order.
    #[must_use]
    pub fn build_payload(&self, payload: &Payload) -> FilterExpression {
        let clauses: Vec<String> = payload
            .fields()
            .iter()
            .map(|field| self.clause(field))
            .collect();
        FilterExpression(clauses.join(" "))
    }

    fn clause(&self, field: &PayloadField) -> String {
        let value = field.value.as_deref().unwrap_or(MISSING_VALUE);
        format!("{}.{}:{}", self.namespace, field.name, value)
    }
}

/// Build a filter under the default `event` namespace.
#[must_use]
pub fn build(raw: &str) -> FilterExpression {
    QueryBuilder::default().build(raw)
}
