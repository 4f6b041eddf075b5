//! Error types for configuration and naming rules.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors. These are the only errors that make the driver
/// exit non-zero.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Errors from filename and title derivation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamingError {
    #[error("No recognized date pattern found in asset name: {0}")]
    MissingDateToken(String),

    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),
}
