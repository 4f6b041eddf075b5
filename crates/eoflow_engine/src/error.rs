//! Error types for the engine adapter.

use std::path::PathBuf;
use thiserror::Error;

/// Engine operation result type.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Failures talking to the remote compute engine.
///
/// These are transport and protocol failures only. A job that ran and
/// failed is not an error here; it is a `FAILED` poll state.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Connection, timeout or TLS failure
    #[error("Engine request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("Engine returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not match the expected shape
    #[error("Failed to decode engine response: {0}")]
    Decode(String),

    /// Engine refused the request (bad spec, unknown job, quota)
    #[error("Engine rejected request: {0}")]
    Rejected(String),

    /// Invalid base URL or path segment
    #[error("Invalid engine URL: {0}")]
    Url(String),

    /// Writing a fetched export locally failed
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Transient failures may succeed on a later run.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Network(_) => true,
            EngineError::Status { status, .. } => *status == 429 || *status >= 500,
            EngineError::Decode(_)
            | EngineError::Rejected(_)
            | EngineError::Url(_)
            | EngineError::Io { .. } => false,
        }
    }
}
