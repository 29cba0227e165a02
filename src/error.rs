/// Error raised while building a [`ConsumerConfig`](crate::ConsumerConfig).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A configuration value could not be parsed or is out of range.
    #[error("invalid configuration for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
    /// A required configuration value is missing.
    #[error("missing required configuration: {key}")]
    MissingRequired { key: String },
    /// The JSON document could not be decoded.
    #[error("malformed configuration document: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Malformed(err.to_string())
    }
}
