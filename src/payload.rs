//! Key/value payload parsing.
//!
//! A payload is the raw form input, e.g. `key=foo&value=bar`. Parsing is total:
//! malformed pairs degrade to a field without a value instead of failing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One `name=value` pair of a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadField {
    /// Text before the first `=`. May be empty.
    pub name: String,
    /// `None` when the pair had no `=`.
    pub value: Option<String>,
}

impl PayloadField {
    fn parse(pair: &str) -> Self {
        let mut parts = pair.split('=');
        let name = parts.next().unwrap_or_default().to_string();
        // Anything after a second `=` is discarded.
        let value = parts.next().map(str::to_string);
        Self { name, value }
    }
}

/// An ordered sequence of payload fields. Names may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload {
    fields: Vec<PayloadField>,
}

impl Payload {
    /// Parse an `&`-separated list of `name=value` pairs.
    ///
    /// The empty string yields an empty payload. Every other input yields one field per
    /// `&`-separated segment, including empty segments.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            return Self::default();
        }
        Self {
            fields: raw.split('&').map(PayloadField::parse).collect(),
        }
    }

    /// Fields in input order.
    #[must_use]
    pub fn fields(&self) -> &[PayloadField] {
        &self.fields
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True for the empty payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            f.write_str(&field.name)?;
            if let Some(value) = &field.value {
                write!(f, "={value}")?;
            }
        }
        Ok(())
    }
}
