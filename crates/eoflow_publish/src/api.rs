//! Catalog contract and its wire types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::CatalogError;

/// Result of one catalog call.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Address of one asset inside the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetKey {
    pub collection: String,
    pub item: String,
    pub asset: String,
}

impl AssetKey {
    pub fn new(
        collection: impl Into<String>,
        item: impl Into<String>,
        asset: impl Into<String>,
    ) -> Self {
        Self {
            collection: collection.into(),
            item: item.into(),
            asset: asset.into(),
        }
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.collection, self.item, self.asset)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<Vec<[f64; 2]>>,
}

impl Geometry {
    pub fn polygon(ring: Vec<[f64; 2]>) -> Self {
        Self {
            kind: "Polygon".to_string(),
            coordinates: vec![ring],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    pub rel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Link {
    pub fn new(rel: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            rel: rel.into(),
            title: None,
        }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemProperties {
    pub datetime: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPayload {
    pub id: String,
    pub geometry: Geometry,
    pub properties: ItemProperties,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetPayload {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub media_type: String,
    #[serde(rename = "proj:epsg", skip_serializing_if = "Option::is_none")]
    pub proj_epsg: Option<u32>,
    #[serde(rename = "eo:gsd", skip_serializing_if = "Option::is_none")]
    pub eo_gsd: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Md5Part {
    pub part_number: u32,
    pub md5: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUploadRequest {
    pub number_parts: u32,
    pub md5_parts: Vec<Md5Part>,
    #[serde(rename = "checksum:multihash")]
    pub multihash: String,
    pub update_interval: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignedUrl {
    pub part: u32,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    pub upload_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub urls: Vec<PresignedUrl>,
}

impl UploadSession {
    pub fn url_for(&self, part: u32) -> Option<&str> {
        self.urls
            .iter()
            .find(|u| u.part == part)
            .map(|u| u.url.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    pub etag: String,
    pub part_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub upload_id: String,
    #[serde(default)]
    pub status: String,
}

impl UploadSummary {
    pub fn status(&self) -> Option<UploadStatus> {
        self.status.parse().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadStatus {
    InProgress,
    Completed,
    Aborted,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::InProgress => "in-progress",
            UploadStatus::Completed => "completed",
            UploadStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-progress" => Ok(UploadStatus::InProgress),
            "completed" => Ok(UploadStatus::Completed),
            "aborted" => Ok(UploadStatus::Aborted),
            other => Err(format!("Unknown upload status: {other}")),
        }
    }
}

/// STAC-style catalog with multipart asset uploads.
///
/// `get_*` return `Ok(None)` for 404. A create that loses a race reports
/// 409 as [`CatalogError::Status`]; a conflicting upload session reports
/// [`CatalogError::UploadInProgress`].
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn get_item(&self, collection: &str, item: &str) -> CatalogResult<Option<Value>>;

    async fn put_item(&self, collection: &str, item: &str, payload: &ItemPayload)
        -> CatalogResult<()>;

    async fn get_asset(&self, key: &AssetKey) -> CatalogResult<Option<Value>>;

    async fn put_asset(&self, key: &AssetKey, payload: &AssetPayload) -> CatalogResult<()>;

    async fn create_upload(
        &self,
        key: &AssetKey,
        request: &CreateUploadRequest,
    ) -> CatalogResult<UploadSession>;

    async fn list_uploads(
        &self,
        key: &AssetKey,
        status: UploadStatus,
    ) -> CatalogResult<Vec<UploadSummary>>;

    /// PUT one part to its presigned URL; returns the ETag.
    async fn upload_part(&self, url: &str, data: Vec<u8>, content_md5: &str)
        -> CatalogResult<String>;

    async fn complete_upload(
        &self,
        key: &AssetKey,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> CatalogResult<UploadSummary>;

    async fn abort_upload(&self, key: &AssetKey, upload_id: &str) -> CatalogResult<UploadSummary>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_wire_format() {
        let request = CreateUploadRequest {
            number_parts: 1,
            md5_parts: vec![Md5Part {
                part_number: 1,
                md5: "XrY7u+Ae7tCTyyK7j1rNww==".to_string(),
            }],
            multihash: "1220ab".to_string(),
            update_interval: 30,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["checksum:multihash"], "1220ab");
        assert_eq!(json["md5_parts"][0]["part_number"], 1);
        assert_eq!(json["update_interval"], 30);
    }

    #[test]
    fn test_asset_payload_omits_raster_fields_for_text() {
        let payload = AssetPayload {
            id: "a.csv".to_string(),
            title: "A".to_string(),
            media_type: "text/csv".to_string(),
            proj_epsg: None,
            eo_gsd: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "text/csv");
        assert!(json.get("proj:epsg").is_none());
        assert!(json.get("eo:gsd").is_none());
    }

    #[test]
    fn test_upload_status_roundtrip() {
        for status in [
            UploadStatus::InProgress,
            UploadStatus::Completed,
            UploadStatus::Aborted,
        ] {
            assert_eq!(status.as_str().parse::<UploadStatus>().unwrap(), status);
        }
        let summary = UploadSummary {
            upload_id: "u".into(),
            status: "completed".into(),
        };
        assert_eq!(summary.status(), Some(UploadStatus::Completed));
    }

    #[test]
    fn test_session_url_lookup() {
        let session = UploadSession {
            upload_id: "u-1".into(),
            status: "in-progress".into(),
            urls: vec![
                PresignedUrl {
                    part: 2,
                    url: "https://s3/2".into(),
                },
                PresignedUrl {
                    part: 1,
                    url: "https://s3/1".into(),
                },
            ],
        };
        assert_eq!(session.url_for(1), Some("https://s3/1"));
        assert_eq!(session.url_for(3), None);
    }
}
