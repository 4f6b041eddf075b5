//! Publish protocol against the in-memory catalog.
//!
//! Covers item/asset upsert, checksummed multipart uploads, conflicting
//! sessions, retries, cancellation and the `current` alias.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use eoflow_protocol::naming::acquisition_time;
use eoflow_protocol::BoundingBox;
use eoflow_publish::{
    Artifact, AssetKey, AssetPayload, CancellationToken, CatalogApi, CatalogError, CatalogResult,
    CompletedPart, CreateUploadRequest, ItemPayload, PublishError, PublishSettings, Publisher,
    RasterBounds, RetryPolicy, UploadSession, UploadStatus, UploadSummary,
};
use eoflow_test_utils::{InMemoryCatalog, SAMPLE_LV95_BOUNDS};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const PRODUCT: &str = "swisseo_s2-sr_v100";
const COLLECTION: &str = "ch.swisstopo.swisseo_s2-sr_v100";
const PART_SIZE: u64 = 16;

fn settings(force_abort: bool) -> PublishSettings {
    PublishSettings {
        host: "catalog.invalid".to_string(),
        collection_prefix: "ch.swisstopo.".to_string(),
        part_size: PART_SIZE,
        update_interval_secs: 30,
        force_abort,
        title_suffix_markers: vec!["warnregions".to_string()],
        epsg: 2056,
    }
}

fn publisher(catalog: Arc<dyn CatalogApi>, force_abort: bool) -> Publisher {
    Publisher::new(
        catalog,
        settings(force_abort),
        RetryPolicy::fixed(3, Duration::ZERO),
    )
}

fn bounds() -> RasterBounds {
    let [min_x, min_y, max_x, max_y] = SAMPLE_LV95_BOUNDS;
    RasterBounds::new(BoundingBox::new(min_x, min_y, max_x, max_y), 2056)
}

fn raster_name(date: &str) -> String {
    format!("{PRODUCT}_mosaic_{date}t235959_bands-10m.tif")
}

/// Write a raster artifact whose bytes depend on `seed`.
fn write_raster(dir: &Path, date: &str, seed: u8) -> (Artifact, Vec<u8>) {
    let name = raster_name(date);
    let path = dir.join(&name);
    let bytes: Vec<u8> = (0..100u8).map(|i| i.wrapping_mul(7).wrapping_add(seed)).collect();
    std::fs::write(&path, &bytes).unwrap();
    let artifact = Artifact::new(path, acquired(&name))
        .with_bounds(bounds())
        .with_geocat_id("geo-1");
    (artifact, bytes)
}

fn acquired(name: &str) -> NaiveDateTime {
    acquisition_time(name).unwrap()
}

fn item_id(date: &str) -> String {
    format!("{date}t235959")
}

fn raster_key(date: &str) -> AssetKey {
    AssetKey::new(COLLECTION, item_id(date), raster_name(date))
}

fn statuses(catalog: &InMemoryCatalog, key: &AssetKey) -> Vec<Option<UploadStatus>> {
    catalog.uploads(key).iter().map(|u| u.status()).collect()
}

#[tokio::test]
async fn test_raster_publish_creates_item_asset_and_object() {
    let temp = TempDir::new().unwrap();
    let catalog = Arc::new(InMemoryCatalog::new());
    let (artifact, bytes) = write_raster(temp.path(), "2024-01-10", 1);

    let receipt = publisher(catalog.clone(), false)
        .try_publish(&artifact, &item_id("2024-01-10"), PRODUCT)
        .await
        .unwrap();

    let key = raster_key("2024-01-10");
    assert_eq!(receipt.key, key);
    assert!(receipt.item_created);
    assert!(!receipt.current_alias);

    let item = catalog.item(COLLECTION, &item_id("2024-01-10")).unwrap();
    assert_eq!(item["properties"]["datetime"], "2024-01-10T23:59:59Z");
    assert_eq!(item["geometry"]["type"], "Polygon");
    let links = item["links"].as_array().unwrap();
    assert!(links.iter().any(|l| l["rel"] == "describedby"));

    let asset = catalog.asset(&key).unwrap();
    assert_eq!(asset["title"], "BANDS-10M");
    assert_eq!(asset["proj:epsg"], 2056);
    assert_eq!(asset["eo:gsd"], 10);

    assert_eq!(catalog.object_bytes(&key), Some(bytes.clone()));
    let expected_parts = bytes.len().div_ceil(PART_SIZE as usize);
    assert_eq!(catalog.call_count("upload_part"), expected_parts);
    assert_eq!(statuses(&catalog, &key), vec![Some(UploadStatus::Completed)]);
}

#[tokio::test]
async fn test_republish_reuses_item_and_asset() {
    let temp = TempDir::new().unwrap();
    let catalog = Arc::new(InMemoryCatalog::new());
    let publisher = publisher(catalog.clone(), false);
    let (artifact, _) = write_raster(temp.path(), "2024-01-10", 1);

    publisher
        .try_publish(&artifact, &item_id("2024-01-10"), PRODUCT)
        .await
        .unwrap();
    let (artifact, bytes) = write_raster(temp.path(), "2024-01-10", 9);
    let receipt = publisher
        .try_publish(&artifact, &item_id("2024-01-10"), PRODUCT)
        .await
        .unwrap();

    assert!(!receipt.item_created);
    assert_eq!(catalog.call_count("put_item"), 1);
    assert_eq!(catalog.call_count("put_asset"), 1);
    assert_eq!(catalog.object_bytes(&raster_key("2024-01-10")), Some(bytes));
}

#[tokio::test]
async fn test_conflicting_session_without_force_fails_distinctly() {
    let temp = TempDir::new().unwrap();
    let catalog = Arc::new(InMemoryCatalog::new());
    let key = raster_key("2024-01-10");
    catalog.seed_in_progress_upload(&key);
    let (artifact, _) = write_raster(temp.path(), "2024-01-10", 1);

    let err = publisher(catalog.clone(), false)
        .try_publish(&artifact, &item_id("2024-01-10"), PRODUCT)
        .await
        .unwrap_err();

    match &err {
        PublishError::UploadInProgress { asset, .. } => assert_eq!(asset, &key.to_string()),
        other => panic!("expected a conflict, got {other:?}"),
    }
    assert!(err.is_conflict());
    assert_eq!(statuses(&catalog, &key), vec![Some(UploadStatus::InProgress)]);
    assert_eq!(catalog.call_count("abort_upload"), 0);
    assert!(catalog.object_bytes(&key).is_none());
}

#[tokio::test]
async fn test_conflicting_session_with_force_is_aborted_and_replaced() {
    let temp = TempDir::new().unwrap();
    let catalog = Arc::new(InMemoryCatalog::new());
    let key = raster_key("2024-01-10");
    catalog.seed_in_progress_upload(&key);
    let (artifact, bytes) = write_raster(temp.path(), "2024-01-10", 1);

    publisher(catalog.clone(), true)
        .try_publish(&artifact, &item_id("2024-01-10"), PRODUCT)
        .await
        .unwrap();

    assert_eq!(
        statuses(&catalog, &key),
        vec![Some(UploadStatus::Aborted), Some(UploadStatus::Completed)]
    );
    assert_eq!(catalog.object_bytes(&key), Some(bytes));
}

#[tokio::test]
async fn test_corrupted_part_rejects_completion_and_aborts() {
    let temp = TempDir::new().unwrap();
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.corrupt_stored_part(2);
    let (artifact, _) = write_raster(temp.path(), "2024-01-10", 1);

    let err = publisher(catalog.clone(), false)
        .try_publish(&artifact, &item_id("2024-01-10"), PRODUCT)
        .await
        .unwrap_err();

    match err {
        PublishError::Catalog(CatalogError::Status { status, body }) => {
            assert_eq!(status, 400);
            assert!(body.contains("part 2"), "body: {body}");
        }
        other => panic!("expected a rejected completion, got {other:?}"),
    }
    let key = raster_key("2024-01-10");
    assert_eq!(statuses(&catalog, &key), vec![Some(UploadStatus::Aborted)]);
    assert!(catalog.object_bytes(&key).is_none());
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let temp = TempDir::new().unwrap();
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.fail_next("upload_part", 503, 2);
    catalog.fail_next("put_item", 429, 1);
    let (artifact, bytes) = write_raster(temp.path(), "2024-01-10", 1);

    publisher(catalog.clone(), false)
        .try_publish(&artifact, &item_id("2024-01-10"), PRODUCT)
        .await
        .unwrap();

    let parts = bytes.len().div_ceil(PART_SIZE as usize);
    assert_eq!(catalog.call_count("upload_part"), parts + 2);
    assert_eq!(catalog.call_count("put_item"), 2);
    assert_eq!(catalog.object_bytes(&raster_key("2024-01-10")), Some(bytes));
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let temp = TempDir::new().unwrap();
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.fail_next("get_item", 503, 10);
    let (artifact, _) = write_raster(temp.path(), "2024-01-10", 1);

    let err = publisher(catalog.clone(), false)
        .try_publish(&artifact, &item_id("2024-01-10"), PRODUCT)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PublishError::Catalog(CatalogError::Status { status: 503, .. })
    ));
    assert_eq!(catalog.call_count("get_item"), 3);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let temp = TempDir::new().unwrap();
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.fail_next("put_asset", 403, 1);
    let (artifact, _) = write_raster(temp.path(), "2024-01-10", 1);

    let err = publisher(catalog.clone(), false)
        .try_publish(&artifact, &item_id("2024-01-10"), PRODUCT)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PublishError::Catalog(CatalogError::Status { status: 403, .. })
    ));
    assert_eq!(catalog.call_count("put_asset"), 1);
    assert_eq!(catalog.call_count("create_upload"), 0);
}

#[tokio::test]
async fn test_asset_created_concurrently_still_uploads() {
    let temp = TempDir::new().unwrap();
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.fail_next("put_asset", 409, 1);
    let (artifact, bytes) = write_raster(temp.path(), "2024-01-10", 1);

    let receipt = publisher(catalog.clone(), false)
        .try_publish(&artifact, &item_id("2024-01-10"), PRODUCT)
        .await
        .unwrap();

    let key = raster_key("2024-01-10");
    assert_eq!(receipt.key, key);
    assert_eq!(catalog.call_count("put_asset"), 1);
    assert_eq!(catalog.object_bytes(&key), Some(bytes));
    assert_eq!(statuses(&catalog, &key), vec![Some(UploadStatus::Completed)]);
}

#[tokio::test]
async fn test_current_alias_keeps_newest_acquisition() {
    let temp = TempDir::new().unwrap();
    let catalog = Arc::new(InMemoryCatalog::new());
    let publisher = publisher(catalog.clone(), false).with_current_alias([PRODUCT]);
    let alias_key = AssetKey::new(
        COLLECTION,
        PRODUCT,
        format!("{PRODUCT}_mosaic_current_bands-10m.tif"),
    );

    let (newer, newer_bytes) = write_raster(temp.path(), "2024-01-10", 1);
    let receipt = publisher
        .try_publish(&newer, &item_id("2024-01-10"), PRODUCT)
        .await
        .unwrap();
    assert!(receipt.current_alias);
    assert_eq!(catalog.object_bytes(&alias_key), Some(newer_bytes.clone()));

    let (older, _) = write_raster(temp.path(), "2024-01-05", 2);
    let receipt = publisher
        .try_publish(&older, &item_id("2024-01-05"), PRODUCT)
        .await
        .unwrap();
    assert!(!receipt.current_alias);
    assert_eq!(catalog.object_bytes(&alias_key), Some(newer_bytes));
    let alias = catalog.item(COLLECTION, PRODUCT).unwrap();
    assert_eq!(alias["properties"]["datetime"], "2024-01-10T23:59:59Z");

    // The dated item of the older artifact was still published.
    assert!(catalog.item(COLLECTION, &item_id("2024-01-05")).is_some());

    // Same acquisition time replaces the alias.
    let (same, same_bytes) = write_raster(temp.path(), "2024-01-10", 3);
    let receipt = publisher
        .try_publish(&same, &item_id("2024-01-10"), PRODUCT)
        .await
        .unwrap();
    assert!(receipt.current_alias);
    assert_eq!(catalog.object_bytes(&alias_key), Some(same_bytes));
    assert_eq!(catalog.asset(&alias_key).unwrap()["title"], "BANDS-10M");
}

#[tokio::test]
async fn test_alias_with_unreadable_datetime_is_replaced() {
    let temp = TempDir::new().unwrap();
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.seed_item(COLLECTION, PRODUCT, json!({"id": PRODUCT, "properties": {}}));
    let publisher = publisher(catalog.clone(), false).with_current_alias([PRODUCT]);
    let (artifact, _) = write_raster(temp.path(), "2024-01-05", 1);

    let receipt = publisher
        .try_publish(&artifact, &item_id("2024-01-05"), PRODUCT)
        .await
        .unwrap();

    assert!(receipt.current_alias);
    let alias = catalog.item(COLLECTION, PRODUCT).unwrap();
    assert_eq!(alias["properties"]["datetime"], "2024-01-05T23:59:59Z");
}

#[tokio::test]
async fn test_sidecar_needs_existing_item() {
    let temp = TempDir::new().unwrap();
    let catalog = Arc::new(InMemoryCatalog::new());
    let publisher = publisher(catalog.clone(), false);
    let name = format!("{PRODUCT}_mosaic_2024-01-10t235959_bands-10m_metadata.json");
    let path = temp.path().join(&name);
    std::fs::write(&path, br#"{"PRODUCT":"swisseo_s2-sr_v100"}"#).unwrap();
    let sidecar = Artifact::new(&path, acquired(&name));

    let err = publisher
        .try_publish(&sidecar, &item_id("2024-01-10"), PRODUCT)
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::MissingItem { .. }));
    assert_eq!(catalog.call_count("create_upload"), 0);

    let (raster, _) = write_raster(temp.path(), "2024-01-10", 1);
    publisher
        .try_publish(&raster, &item_id("2024-01-10"), PRODUCT)
        .await
        .unwrap();
    let parts_before = catalog.call_count("upload_part");
    publisher
        .try_publish(&sidecar, &item_id("2024-01-10"), PRODUCT)
        .await
        .unwrap();

    // Non-raster assets go up in a single part.
    assert_eq!(catalog.call_count("upload_part"), parts_before + 1);
    let key = AssetKey::new(COLLECTION, item_id("2024-01-10"), name.to_lowercase());
    let asset = catalog.asset(&key).unwrap();
    assert_eq!(asset["type"], "application/json");
    assert!(asset.get("proj:epsg").is_none());
}

#[tokio::test]
async fn test_raster_without_bounds_cannot_create_item() {
    let temp = TempDir::new().unwrap();
    let catalog = Arc::new(InMemoryCatalog::new());
    let name = raster_name("2024-01-10");
    let path = temp.path().join(&name);
    std::fs::write(&path, b"raster").unwrap();

    let err = publisher(catalog.clone(), false)
        .try_publish(
            &Artifact::new(&path, acquired(&name)),
            &item_id("2024-01-10"),
            PRODUCT,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::MissingBounds(p) if p == path));
}

#[tokio::test]
async fn test_cancelled_before_start_touches_nothing_remote() {
    let temp = TempDir::new().unwrap();
    let catalog = Arc::new(InMemoryCatalog::new());
    let token = CancellationToken::new();
    token.cancel();
    let (artifact, _) = write_raster(temp.path(), "2024-01-10", 1);

    let err = publisher(catalog.clone(), false)
        .with_cancellation(token)
        .try_publish(&artifact, &item_id("2024-01-10"), PRODUCT)
        .await
        .unwrap_err();

    assert!(matches!(err, PublishError::Cancelled));
    assert_eq!(catalog.call_count("create_upload"), 0);
}

/// Trips the token after the first part lands.
struct CancelAfterFirstPart {
    inner: Arc<InMemoryCatalog>,
    token: CancellationToken,
}

#[async_trait]
impl CatalogApi for CancelAfterFirstPart {
    async fn get_item(&self, collection: &str, item: &str) -> CatalogResult<Option<Value>> {
        self.inner.get_item(collection, item).await
    }

    async fn put_item(
        &self,
        collection: &str,
        item: &str,
        payload: &ItemPayload,
    ) -> CatalogResult<()> {
        self.inner.put_item(collection, item, payload).await
    }

    async fn get_asset(&self, key: &AssetKey) -> CatalogResult<Option<Value>> {
        self.inner.get_asset(key).await
    }

    async fn put_asset(&self, key: &AssetKey, payload: &AssetPayload) -> CatalogResult<()> {
        self.inner.put_asset(key, payload).await
    }

    async fn create_upload(
        &self,
        key: &AssetKey,
        request: &CreateUploadRequest,
    ) -> CatalogResult<UploadSession> {
        self.inner.create_upload(key, request).await
    }

    async fn list_uploads(
        &self,
        key: &AssetKey,
        status: UploadStatus,
    ) -> CatalogResult<Vec<UploadSummary>> {
        self.inner.list_uploads(key, status).await
    }

    async fn upload_part(
        &self,
        url: &str,
        data: Vec<u8>,
        content_md5: &str,
    ) -> CatalogResult<String> {
        let etag = self.inner.upload_part(url, data, content_md5).await?;
        self.token.cancel();
        Ok(etag)
    }

    async fn complete_upload(
        &self,
        key: &AssetKey,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> CatalogResult<UploadSummary> {
        self.inner.complete_upload(key, upload_id, parts).await
    }

    async fn abort_upload(&self, key: &AssetKey, upload_id: &str) -> CatalogResult<UploadSummary> {
        self.inner.abort_upload(key, upload_id).await
    }
}

#[tokio::test]
async fn test_cancellation_mid_upload_aborts_session() {
    let temp = TempDir::new().unwrap();
    let catalog = Arc::new(InMemoryCatalog::new());
    let token = CancellationToken::new();
    let api = Arc::new(CancelAfterFirstPart {
        inner: catalog.clone(),
        token: token.clone(),
    });
    let (artifact, _) = write_raster(temp.path(), "2024-01-10", 1);

    let err = publisher(api, false)
        .with_cancellation(token)
        .try_publish(&artifact, &item_id("2024-01-10"), PRODUCT)
        .await
        .unwrap_err();

    assert!(matches!(err, PublishError::Cancelled));
    let key = raster_key("2024-01-10");
    assert_eq!(catalog.call_count("upload_part"), 1);
    assert_eq!(statuses(&catalog, &key), vec![Some(UploadStatus::Aborted)]);
    assert!(catalog.object_bytes(&key).is_none());
}
