//! Consumer configuration.
//!
//! A [`ConsumerConfig`] is an immutable snapshot taken when a session is
//! created. It can be built in code, decoded from JSON, or read from the flat
//! string properties a test plan stores.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Receive timeout used when the configured one is not positive.
pub const DEFAULT_RECEIVE_TIMEOUT_MS: u64 = 1000;

/// Prefetch count meaning "no limit".
pub const UNLIMITED_PREFETCH: u16 = 0;

/// Property keys as stored in a test plan.
pub mod keys {
    pub const QUEUE: &str = "AMQPSampler.Queue";
    pub const ITERATIONS: &str = "AMQPSampler.Iterations";
    pub const PREFETCH_COUNT: &str = "AMQPConsumer.PrefetchCount";
    pub const READ_RESPONSE: &str = "AMQPConsumer.ReadResponse";
    pub const PURGE_QUEUE: &str = "AMQPConsumer.PurgeQueue";
    pub const AUTO_ACK: &str = "AMQPConsumer.AutoAck";
    pub const RECEIVE_TIMEOUT: &str = "AMQPConsumer.ReceiveTimeout";
}

fn default_read_response() -> bool {
    true
}

fn default_iterations() -> i64 {
    1
}

/// Settings for one consume session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerConfig {
    /// Queue to consume from.
    pub queue: String,
    /// Unacknowledged deliveries the broker may push ahead (0 = unlimited).
    #[serde(default)]
    pub prefetch_count: u16,
    /// Let the broker treat deliveries as acknowledged on send.
    #[serde(default)]
    pub auto_ack: bool,
    /// Capture body and properties of each delivery.
    #[serde(default = "default_read_response")]
    pub read_response: bool,
    /// Purge the queue on teardown.
    #[serde(default)]
    pub purge_on_end: bool,
    /// Per-receive timeout; non-positive values fall back to the default.
    #[serde(default)]
    pub receive_timeout_ms: i64,
    /// Deliveries pulled per sample; non-positive values count as one.
    #[serde(default = "default_iterations")]
    pub iterations: i64,
}

impl ConsumerConfig {
    /// Create a config for `queue` with default settings.
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            prefetch_count: UNLIMITED_PREFETCH,
            auto_ack: false,
            read_response: default_read_response(),
            purge_on_end: false,
            receive_timeout_ms: 0,
            iterations: default_iterations(),
        }
    }

    pub fn with_prefetch_count(mut self, count: u16) -> Self {
        self.prefetch_count = count;
        self
    }

    pub fn with_auto_ack(mut self, auto_ack: bool) -> Self {
        self.auto_ack = auto_ack;
        self
    }

    pub fn with_read_response(mut self, read: bool) -> Self {
        self.read_response = read;
        self
    }

    pub fn with_purge_on_end(mut self, purge: bool) -> Self {
        self.purge_on_end = purge;
        self
    }

    pub fn with_receive_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.receive_timeout_ms = timeout_ms;
        self
    }

    pub fn with_iterations(mut self, iterations: i64) -> Self {
        self.iterations = iterations;
        self
    }

    /// Effective per-receive timeout.
    pub fn receive_timeout(&self) -> Duration {
        match u64::try_from(self.receive_timeout_ms) {
            Ok(ms) if ms > 0 => Duration::from_millis(ms),
            _ => Duration::from_millis(DEFAULT_RECEIVE_TIMEOUT_MS),
        }
    }

    /// Effective number of deliveries pulled per sample.
    pub fn iterations_per_sample(&self) -> usize {
        usize::try_from(self.iterations).ok().filter(|n| *n > 0).unwrap_or(1)
    }

    /// Decode a config from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a config from flat test-plan properties.
    ///
    /// Booleans are true only for a case-insensitive `"true"`. Missing or
    /// empty values take their defaults; the queue is required.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            props
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let queue = get(keys::QUEUE).ok_or_else(|| ConfigError::MissingRequired {
            key: keys::QUEUE.to_string(),
        })?;

        let mut config = Self::new(queue);
        if let Some(value) = get(keys::PREFETCH_COUNT) {
            config.prefetch_count = parse_prefetch(value)?;
        }
        if let Some(value) = get(keys::AUTO_ACK) {
            config.auto_ack = parse_bool(value);
        }
        if let Some(value) = get(keys::READ_RESPONSE) {
            config.read_response = parse_bool(value);
        }
        if let Some(value) = get(keys::PURGE_QUEUE) {
            config.purge_on_end = parse_bool(value);
        }
        if let Some(value) = get(keys::RECEIVE_TIMEOUT) {
            config.receive_timeout_ms = parse_int(keys::RECEIVE_TIMEOUT, value)?;
        }
        if let Some(value) = get(keys::ITERATIONS) {
            config.iterations = parse_int(keys::ITERATIONS, value)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Render the config back into test-plan properties.
    pub fn to_properties(&self) -> HashMap<String, String> {
        HashMap::from([
            (keys::QUEUE.to_string(), self.queue.clone()),
            (keys::ITERATIONS.to_string(), self.iterations.to_string()),
            (keys::PREFETCH_COUNT.to_string(), self.prefetch_count.to_string()),
            (keys::READ_RESPONSE.to_string(), self.read_response.to_string()),
            (keys::PURGE_QUEUE.to_string(), self.purge_on_end.to_string()),
            (keys::AUTO_ACK.to_string(), self.auto_ack.to_string()),
            (keys::RECEIVE_TIMEOUT.to_string(), self.receive_timeout_ms.to_string()),
        ])
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: keys::QUEUE.to_string(),
            });
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}

fn parse_int(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: "expected an integer".to_string(),
    })
}

fn parse_prefetch(value: &str) -> Result<u16, ConfigError> {
    let count = parse_int(keys::PREFETCH_COUNT, value)?;
    u16::try_from(count).map_err(|_| ConfigError::InvalidValue {
        key: keys::PREFETCH_COUNT.to_string(),
        value: value.to_string(),
        reason: format!("expected a count between 0 and {}", u16::MAX),
    })
}
