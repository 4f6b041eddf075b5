//! Error types for catalog calls and the publish protocol.

use eoflow_protocol::NamingError;
use std::path::PathBuf;
use thiserror::Error;

/// A single catalog request failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Connection, timeout or TLS failure
    #[error("Catalog request failed: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("Catalog returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Another upload session for the asset is still open
    #[error("Upload already in progress: {0}")]
    UploadInProgress(String),

    /// Response body did not match the expected shape
    #[error("Failed to decode catalog response: {0}")]
    Decode(String),

    #[error("Invalid catalog URL: {0}")]
    Url(String),
}

impl CatalogError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// Network errors, 429 and 5xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            CatalogError::Network(_) => true,
            CatalogError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CatalogError::Status { status: 409, .. })
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            CatalogError::Status { status, .. } => Some(*status),
            CatalogError::UploadInProgress(_) => Some(409),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => CatalogError::status(status.as_u16(), err.to_string()),
            None => CatalogError::Network(err.to_string()),
        }
    }
}

/// Publish result type.
pub type Result<T> = std::result::Result<T, PublishError>;

/// Failure of one artifact publish.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error(transparent)]
    Catalog(CatalogError),

    /// Conflicting session and no force-abort requested
    #[error("Upload for {asset} already in progress (pass force to abort it): {detail}")]
    UploadInProgress { asset: String, detail: String },

    /// Local bytes disagree with the planned checksums, or the catalog did
    /// not confirm completion
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    /// Non-raster assets can only be attached to an existing item
    #[error("Item {collection}/{item} does not exist")]
    MissingItem { collection: String, item: String },

    /// Raster item creation needs the artifact footprint
    #[error("No bounds known for {0}")]
    MissingBounds(PathBuf),

    #[error("Unsupported footprint CRS EPSG:{0}")]
    UnsupportedCrs(u32),

    #[error(transparent)]
    Title(#[from] NamingError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Upload cancelled")]
    Cancelled,
}

impl From<CatalogError> for PublishError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::UploadInProgress(detail) => PublishError::UploadInProgress {
                asset: String::new(),
                detail,
            },
            other => PublishError::Catalog(other),
        }
    }
}

impl PublishError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, PublishError::UploadInProgress { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(CatalogError::Network("reset".into()).is_retryable());
        assert!(CatalogError::status(429, "slow down").is_retryable());
        assert!(CatalogError::status(502, "bad gateway").is_retryable());
        assert!(!CatalogError::status(400, "bad request").is_retryable());
        assert!(!CatalogError::status(404, "").is_retryable());
        assert!(!CatalogError::UploadInProgress("busy".into()).is_retryable());
    }

    #[test]
    fn test_conflict_maps_to_distinct_publish_error() {
        let err: PublishError = CatalogError::UploadInProgress("busy".into()).into();
        assert!(err.is_conflict());
        let err: PublishError = CatalogError::status(409, "exists").into();
        assert!(!err.is_conflict());
    }
}
