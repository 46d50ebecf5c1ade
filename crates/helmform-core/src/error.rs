//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A values overlay could not be parsed into a map
    #[error("failed to parse values: {message}\n---\n{fragment}")]
    InvalidValues { fragment: String, message: String },

    /// A `set`-style override has a malformed key path or value
    #[error("invalid override for key '{key}': {message}")]
    InvalidOverride { key: String, message: String },

    #[error("invalid chart at {path}: {message}")]
    InvalidChart { path: String, message: String },

    #[error("{kind} charts are not installable")]
    NotInstallable { kind: String },

    #[error("archive error: {message}")]
    Archive { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid version: {0}")]
    InvalidVersion(#[from] semver::Error),
}

impl CoreError {
    pub(crate) fn invalid_override(key: &str, message: impl Into<String>) -> Self {
        Self::InvalidOverride {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
