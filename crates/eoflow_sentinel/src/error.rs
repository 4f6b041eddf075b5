use eoflow_engine::EngineError;
use eoflow_ledger::LedgerError;
use eoflow_protocol::NamingError;
use eoflow_publish::PublishError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SentinelError>;

#[derive(Error, Debug)]
pub enum SentinelError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Naming(#[from] NamingError),

    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid sidecar {path}: {source}")]
    Sidecar {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl SentinelError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure of the external raster tooling.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("Failed to read {tool} output: {message}")]
    Decode { tool: String, message: String },

    #[error("Nothing to merge")]
    NoInputs,
}

impl MergeError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
