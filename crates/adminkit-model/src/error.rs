//! Error types for model construction and configuration loading.

use thiserror::Error;

/// Errors raised when raw JSON cannot be turned into model types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModelError {
    /// The value is not a JSON object.
    #[error("record must be a JSON object, got {kind}")]
    NotAnObject {
        /// JSON kind that was found instead.
        kind: &'static str,
    },

    /// The record object has no `id` key.
    #[error("record has no id")]
    MissingId,

    /// The value cannot be used as an identifier.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}

/// Errors raised while loading or saving [`crate::AdminConfig`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Reading or writing the config file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for the config schema.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
