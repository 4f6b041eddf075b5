//! reqwest adapter for the STAC catalog API.
//!
//! ```text
//! GET/PUT  collections/{c}/items/{i}
//! GET/PUT  collections/{c}/items/{i}/assets/{a}
//! POST     collections/{c}/items/{i}/assets/{a}/uploads
//! GET      collections/{c}/items/{i}/assets/{a}/uploads?status=in-progress
//! POST     .../uploads/{id}/complete
//! POST     .../uploads/{id}/abort
//! PUT      {presigned url}          (no catalog auth, Content-MD5)
//! ```

use async_trait::async_trait;
use eoflow_protocol::defaults::UPLOAD_IN_PROGRESS_MARKER;
use eoflow_protocol::{CatalogConfig, Credentials};
use reqwest::header::ETAG;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::api::{
    AssetKey, AssetPayload, CatalogApi, CatalogResult, CompletedPart, CreateUploadRequest,
    ItemPayload, UploadSession, UploadStatus, UploadSummary,
};
use crate::error::CatalogError;

#[derive(Deserialize)]
struct UploadList {
    #[serde(default)]
    uploads: Vec<UploadSummary>,
}

pub struct HttpCatalog {
    base: Url,
    credentials: Option<Credentials>,
    http_client: reqwest::Client,
}

impl HttpCatalog {
    pub fn new(config: &CatalogConfig, credentials: Option<Credentials>) -> CatalogResult<Self> {
        let raw = config.base_url();
        let base = Url::parse(&raw).map_err(|e| CatalogError::Url(format!("{raw}: {e}")))?;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base,
            credentials,
            http_client,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> CatalogResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| CatalogError::Url(format!("{} cannot be a base", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn item_url(&self, collection: &str, item: &str) -> CatalogResult<Url> {
        self.endpoint(&["collections", collection, "items", item])
    }

    pub fn asset_url(&self, key: &AssetKey) -> CatalogResult<Url> {
        self.endpoint(&[
            "collections",
            &key.collection,
            "items",
            &key.item,
            "assets",
            &key.asset,
        ])
    }

    pub fn uploads_url(&self, key: &AssetKey, tail: &[&str]) -> CatalogResult<Url> {
        let mut segments = vec![
            "collections",
            key.collection.as_str(),
            "items",
            key.item.as_str(),
            "assets",
            key.asset.as_str(),
            "uploads",
        ];
        segments.extend_from_slice(tail);
        self.endpoint(&segments)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some(c) => request.basic_auth(&c.user, Some(&c.password)),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> CatalogResult<reqwest::Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT && body.contains(UPLOAD_IN_PROGRESS_MARKER) {
            return Err(CatalogError::UploadInProgress(body));
        }
        Err(CatalogError::status(status.as_u16(), body))
    }

    /// GET that maps 404 to `None`.
    async fn get_optional(&self, url: Url) -> CatalogResult<Option<Value>> {
        match self.send(self.http_client.get(url)).await {
            Ok(response) => Ok(Some(decode(response).await?)),
            Err(CatalogError::Status { status: 404, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> CatalogResult<T> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| CatalogError::Decode(e.to_string()))
}

#[async_trait]
impl CatalogApi for HttpCatalog {
    async fn get_item(&self, collection: &str, item: &str) -> CatalogResult<Option<Value>> {
        self.get_optional(self.item_url(collection, item)?).await
    }

    async fn put_item(
        &self,
        collection: &str,
        item: &str,
        payload: &ItemPayload,
    ) -> CatalogResult<()> {
        let url = self.item_url(collection, item)?;
        self.send(self.http_client.put(url).json(payload)).await?;
        Ok(())
    }

    async fn get_asset(&self, key: &AssetKey) -> CatalogResult<Option<Value>> {
        self.get_optional(self.asset_url(key)?).await
    }

    async fn put_asset(&self, key: &AssetKey, payload: &AssetPayload) -> CatalogResult<()> {
        let url = self.asset_url(key)?;
        self.send(self.http_client.put(url).json(payload)).await?;
        Ok(())
    }

    async fn create_upload(
        &self,
        key: &AssetKey,
        request: &CreateUploadRequest,
    ) -> CatalogResult<UploadSession> {
        let url = self.uploads_url(key, &[])?;
        let response = self.send(self.http_client.post(url).json(request)).await?;
        decode(response).await
    }

    async fn list_uploads(
        &self,
        key: &AssetKey,
        status: UploadStatus,
    ) -> CatalogResult<Vec<UploadSummary>> {
        let mut url = self.uploads_url(key, &[])?;
        url.query_pairs_mut().append_pair("status", status.as_str());
        let response = self.send(self.http_client.get(url)).await?;
        let list: UploadList = decode(response).await?;
        Ok(list.uploads)
    }

    async fn upload_part(
        &self,
        url: &str,
        data: Vec<u8>,
        content_md5: &str,
    ) -> CatalogResult<String> {
        let url = Url::parse(url).map_err(|e| CatalogError::Url(format!("{url}: {e}")))?;
        // Presigned URLs carry their own signature; no catalog credentials.
        let response = self
            .http_client
            .put(url)
            .header("Content-MD5", content_md5)
            .body(data)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::status(status.as_u16(), body));
        }
        response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| CatalogError::Decode("part upload response has no ETag".to_string()))
    }

    async fn complete_upload(
        &self,
        key: &AssetKey,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> CatalogResult<UploadSummary> {
        let url = self.uploads_url(key, &[upload_id, "complete"])?;
        let body = json!({ "parts": parts });
        let response = self.send(self.http_client.post(url).json(&body)).await?;
        decode(response).await
    }

    async fn abort_upload(&self, key: &AssetKey, upload_id: &str) -> CatalogResult<UploadSummary> {
        let url = self.uploads_url(key, &[upload_id, "abort"])?;
        let response = self.send(self.http_client.post(url)).await?;
        decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> HttpCatalog {
        HttpCatalog::new(&CatalogConfig::default(), None).unwrap()
    }

    fn key() -> AssetKey {
        AssetKey::new(
            "ch.swisstopo.swisseo_s2-sr_v100",
            "2024-03-15t235959",
            "swisseo_s2-sr_v100_mosaic_2024-03-15t235959_bands-10m.tif",
        )
    }

    #[test]
    fn test_item_url() {
        let url = catalog()
            .item_url("ch.swisstopo.swisseo_s2-sr_v100", "2024-03-15t235959")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://data.geo.admin.ch/api/stac/v0.9/collections/ch.swisstopo.swisseo_s2-sr_v100/items/2024-03-15t235959"
        );
    }

    #[test]
    fn test_upload_urls() {
        let catalog = catalog();
        let create = catalog.uploads_url(&key(), &[]).unwrap();
        assert!(create.as_str().ends_with(
            "/assets/swisseo_s2-sr_v100_mosaic_2024-03-15t235959_bands-10m.tif/uploads"
        ));
        let complete = catalog.uploads_url(&key(), &["u-1", "complete"]).unwrap();
        assert!(complete.as_str().ends_with("/uploads/u-1/complete"));
    }

    #[test]
    fn test_asset_url_escapes_segments() {
        let key = AssetKey::new("c", "i", "a b/c.tif");
        let url = catalog().asset_url(&key).unwrap();
        assert!(url.as_str().ends_with("/assets/a%20b%2Fc.tif"));
    }
}
