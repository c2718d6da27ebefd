//! Configuration for confirmation sessions.
//!
//! Every struct has a `Default` that works against the public Kylin explorer, and
//! `ConfirmConfig::from_env` overlays `TRACE_CONFIRM_*` environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::trace::TransactionId;

/// When the controller opens the result stream relative to signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamArming {
    /// Open the stream once the wallet returns a transaction id.
    #[default]
    AfterSignature,
    /// Open the stream as soon as the payload is captured, before signing.
    ///
    /// Catches confirmations that land before the wallet call returns.
    BeforeSignature,
}

impl FromStr for StreamArming {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "after_signature" | "after" => Ok(Self::AfterSignature),
            "before_signature" | "before" => Ok(Self::BeforeSignature),
            other => Err(format!("unknown stream arming '{other}'")),
        }
    }
}

/// Block explorer used to link a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// URL scheme, e.g. `https`.
    pub protocol: String,
    /// Explorer host name.
    pub host: String,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            protocol: "https".to_string(),
            host: "kylin.eosq.app".to_string(),
        }
    }
}

impl ExplorerConfig {
    /// Link to the transaction page, e.g. `https://kylin.eosq.app/tx/<id>`.
    #[must_use]
    pub fn transaction_url(&self, id: &TransactionId) -> String {
        format!("{}://{}/tx/{}", self.protocol, self.host, id)
    }
}

/// Stream session tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Upper bound on a single blocking transport read; also bounds close latency.
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
    /// First reconnect delay; doubles per consecutive failure.
    #[serde(with = "duration_ms")]
    pub reconnect_base_delay: Duration,
    /// Upper bound on any single reconnect delay.
    #[serde(with = "duration_ms")]
    pub reconnect_max_delay: Duration,
    /// Consecutive failed attempts before the session gives up. `0` retries forever.
    pub max_reconnect_attempts: u32,
    /// Capacity of the session-to-controller event queue.
    pub event_queue_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            reconnect_base_delay: Duration::from_secs(2),
            reconnect_max_delay: Duration::from_secs(60),
            max_reconnect_attempts: 10,
            event_queue_capacity: 1024,
        }
    }
}

impl StreamConfig {
    /// Exponential backoff for the given (1-based) consecutive failure count.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(6);
        self.reconnect_base_delay
            .saturating_mul(factor)
            .min(self.reconnect_max_delay)
    }
}

/// Top-level configuration for a `ConfirmationController`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmConfig {
    /// Prefix applied to every filter clause.
    pub namespace: String,
    /// Event key placed in the transaction envelope.
    pub event_key: String,
    /// When the result stream is opened relative to signing.
    pub arming: StreamArming,
    /// Explorer used for transaction links.
    pub explorer: ExplorerConfig,
    /// Session tuning.
    pub stream: StreamConfig,
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            namespace: crate::query::DEFAULT_NAMESPACE.to_string(),
            event_key: String::new(),
            arming: StreamArming::default(),
            explorer: ExplorerConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

impl ConfirmConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TRACE_CONFIRM_NAMESPACE`: filter clause prefix (default: event)
    /// - `TRACE_CONFIRM_EVENT_KEY`: envelope event key (default: empty)
    /// - `TRACE_CONFIRM_ARMING`: `after_signature` or `before_signature`
    /// - `TRACE_CONFIRM_EXPLORER_PROTOCOL`: explorer scheme (default: https)
    /// - `TRACE_CONFIRM_EXPLORER_HOST`: explorer host (default: kylin.eosq.app)
    /// - `TRACE_CONFIRM_POLL_INTERVAL_MS`: transport poll bound (default: 50)
    /// - `TRACE_CONFIRM_RECONNECT_BASE_MS`: first backoff delay (default: 2000)
    /// - `TRACE_CONFIRM_RECONNECT_MAX_MS`: backoff cap (default: 60000)
    /// - `TRACE_CONFIRM_MAX_RECONNECT_ATTEMPTS`: `0` for unlimited (default: 10)
    /// - `TRACE_CONFIRM_QUEUE_CAPACITY`: session event queue size (default: 1024)
    ///
    /// Unset or unparsable values keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            namespace: lookup("TRACE_CONFIRM_NAMESPACE").unwrap_or(defaults.namespace),
            event_key: lookup("TRACE_CONFIRM_EVENT_KEY").unwrap_or(defaults.event_key),
            arming: lookup("TRACE_CONFIRM_ARMING")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.arming),
            explorer: ExplorerConfig {
                protocol: lookup("TRACE_CONFIRM_EXPLORER_PROTOCOL")
                    .unwrap_or(defaults.explorer.protocol),
                host: lookup("TRACE_CONFIRM_EXPLORER_HOST").unwrap_or(defaults.explorer.host),
            },
            stream: StreamConfig {
                poll_interval: parsed("TRACE_CONFIRM_POLL_INTERVAL_MS")
                    .map_or(defaults.stream.poll_interval, Duration::from_millis),
                reconnect_base_delay: parsed("TRACE_CONFIRM_RECONNECT_BASE_MS")
                    .map_or(defaults.stream.reconnect_base_delay, Duration::from_millis),
                reconnect_max_delay: parsed("TRACE_CONFIRM_RECONNECT_MAX_MS")
                    .map_or(defaults.stream.reconnect_max_delay, Duration::from_millis),
                max_reconnect_attempts: parsed("TRACE_CONFIRM_MAX_RECONNECT_ATTEMPTS")
                    .and_then(|v| u32::try_from(v).ok())
                    .unwrap_or(defaults.stream.max_reconnect_attempts),
                event_queue_capacity: parsed("TRACE_CONFIRM_QUEUE_CAPACITY")
                    .and_then(|v| usize::try_from(v).ok())
                    .unwrap_or(defaults.stream.event_queue_capacity),
            },
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn default_config_targets_kylin_explorer() {
        let cfg = ConfirmConfig::default();
        assert_eq!(cfg.namespace, "event");
        assert_eq!(cfg.arming, StreamArming::AfterSignature);
        let id = TransactionId::new("abc123");
        assert_eq!(
            cfg.explorer.transaction_url(&id),
            "https://kylin.eosq.app/tx/abc123"
        );
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let cfg = StreamConfig {
            reconnect_base_delay: Duration::from_millis(100),
            reconnect_max_delay: Duration::from_millis(1000),
            ..StreamConfig::default()
        };
        assert_eq!(cfg.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(cfg.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(cfg.backoff_delay(3), Duration::from_millis(400));
        assert_eq!(cfg.backoff_delay(4), Duration::from_millis(800));
        assert_eq!(cfg.backoff_delay(5), Duration::from_millis(1000));
        assert_eq!(cfg.backoff_delay(40), Duration::from_millis(1000));
    }

    #[test]
    fn env_overrides_apply_and_bad_values_fall_back() {
        let vars: HashMap<&str, &str> = [
            ("TRACE_CONFIRM_NAMESPACE", "action"),
            ("TRACE_CONFIRM_ARMING", "before_signature"),
            ("TRACE_CONFIRM_EXPLORER_HOST", "eosq.app"),
            ("TRACE_CONFIRM_POLL_INTERVAL_MS", "5"),
            ("TRACE_CONFIRM_MAX_RECONNECT_ATTEMPTS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let cfg = ConfirmConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_string()));
        assert_eq!(cfg.namespace, "action");
        assert_eq!(cfg.arming, StreamArming::BeforeSignature);
        assert_eq!(cfg.explorer.host, "eosq.app");
        assert_eq!(cfg.explorer.protocol, "https");
        assert_eq!(cfg.stream.poll_interval, Duration::from_millis(5));
        assert_eq!(cfg.stream.max_reconnect_attempts, 10);
    }

    #[test]
    fn config_deserializes_with_partial_fields() {
        let cfg: ConfirmConfig = serde_json::from_str(
            r#"{"namespace":"event","stream":{"poll_interval":10,"max_reconnect_attempts":0}}"#,
        )
        .unwrap();
        assert_eq!(cfg.stream.poll_interval, Duration::from_millis(10));
        assert_eq!(cfg.stream.max_reconnect_attempts, 0);
        assert_eq!(cfg.stream.event_queue_capacity, 1024);
        assert_eq!(cfg.explorer, ExplorerConfig::default());
    }

    #[test]
    fn arming_parses_short_forms() {
        assert_eq!("before".parse::<StreamArming>(), Ok(StreamArming::BeforeSignature));
        assert_eq!(" AFTER ".parse::<StreamArming>(), Ok(StreamArming::AfterSignature));
        assert!("sometime".parse::<StreamArming>().is_err());
    }
}
