//! Publish Protocol: puts finished artifacts into the STAC catalog.
//!
//! - [`CatalogApi`]: the catalog contract; [`HttpCatalog`] talks to the real one
//! - [`Publisher`]: item/asset state machine plus the `current` alias
//! - [`Uploader`]: checksummed multipart upload sessions
//! - [`RetryPolicy`]: the one retry policy every catalog call goes through

pub mod api;
pub mod cancel;
pub mod checksum;
pub mod error;
pub mod geometry;
pub mod http;
pub mod payload;
pub mod publisher;
pub mod retry;
pub mod upload;

pub use api::{
    AssetKey, AssetPayload, CatalogApi, CatalogResult, CompletedPart, CreateUploadRequest,
    ItemPayload, PresignedUrl, UploadSession, UploadStatus, UploadSummary,
};
pub use cancel::CancellationToken;
pub use checksum::{md5_base64, sha256_multihash, UploadPlan};
pub use error::{CatalogError, PublishError, Result};
pub use geometry::{lv95_to_wgs84, RasterBounds};
pub use http::HttpCatalog;
pub use publisher::{Artifact, PublishReceipt, PublishSettings, Publisher};
pub use retry::RetryPolicy;
pub use upload::{UploadOptions, Uploader};
