//! Error types for the ledger layer.

use std::path::PathBuf;
use thiserror::Error;

/// Ledger operation result type.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Ledger errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// IO error (file system operations)
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed or unwritable CSV content
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// The in-process writer mutex was poisoned by a panicking writer
    #[error("Ledger writer lock poisoned")]
    Poisoned,

    /// Another driver instance holds the run lock
    #[error("Ledger directory is locked by another run: {0}")]
    Locked(PathBuf),
}

impl LedgerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }
}
