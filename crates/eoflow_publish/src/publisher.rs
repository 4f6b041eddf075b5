//! Per-artifact publish state machine.
//!
//! ```text
//! CHECK_ITEM -> CREATE_ITEM? -> CHECK_ASSET -> CREATE_ASSET_METADATA -> UPLOAD
//!   -> PUBLISH_CURRENT_ALIAS (products with publish_current)
//! ```

use chrono::NaiveDateTime;
use eoflow_protocol::naming::{current_alias_name, strip_collection_prefix, with_collection_prefix};
use eoflow_protocol::CatalogConfig;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::api::{AssetKey, CatalogApi};
use crate::cancel::CancellationToken;
use crate::error::{PublishError, Result};
use crate::geometry::{wgs84_ring, RasterBounds};
use crate::payload::{asset_payload, item_payload, parse_item_datetime, AssetMediaType, ItemSource};
use crate::retry::RetryPolicy;
use crate::upload::{UploadOptions, Uploader};

/// A local file to publish.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub acquired_at: NaiveDateTime,
    /// Required when the artifact has to create its item
    pub bounds: Option<RasterBounds>,
    pub geocat_id: Option<String>,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>, acquired_at: NaiveDateTime) -> Self {
        Self {
            path: path.into(),
            acquired_at,
            bounds: None,
            geocat_id: None,
        }
    }

    pub fn with_bounds(mut self, bounds: RasterBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_geocat_id(mut self, geocat_id: impl Into<String>) -> Self {
        self.geocat_id = Some(geocat_id.into());
        self
    }

    /// Lowercased file name, used as the asset key.
    pub fn asset_name(&self) -> Result<String> {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_lowercase())
            .ok_or_else(|| {
                PublishError::io(
                    &self.path,
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"),
                )
            })
    }

    pub fn media_type(&self) -> AssetMediaType {
        AssetMediaType::from_name(&self.path.to_string_lossy())
    }
}

#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub host: String,
    pub collection_prefix: String,
    pub part_size: u64,
    pub update_interval_secs: u64,
    pub force_abort: bool,
    pub title_suffix_markers: Vec<String>,
    pub epsg: u32,
}

impl PublishSettings {
    pub fn from_config(catalog: &CatalogConfig, epsg: u32) -> Self {
        Self {
            host: catalog.host.clone(),
            collection_prefix: catalog.collection_prefix.clone(),
            part_size: catalog.part_size_bytes,
            update_interval_secs: catalog.update_interval_secs,
            force_abort: catalog.force_abort,
            title_suffix_markers: catalog.title_suffix_markers.clone(),
            epsg,
        }
    }
}

/// What a successful publish did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub key: AssetKey,
    pub item_created: bool,
    pub upload_id: String,
    /// The `current` alias was republished from this artifact
    pub current_alias: bool,
}

pub struct Publisher {
    api: Arc<dyn CatalogApi>,
    retry: RetryPolicy,
    settings: PublishSettings,
    cancel: CancellationToken,
    current_alias_products: HashSet<String>,
}

impl Publisher {
    pub fn new(api: Arc<dyn CatalogApi>, settings: PublishSettings, retry: RetryPolicy) -> Self {
        Self {
            api,
            retry,
            settings,
            cancel: CancellationToken::new(),
            current_alias_products: HashSet::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Products that also maintain a `current` alias item.
    pub fn with_current_alias<I, S>(mut self, products: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.current_alias_products = products
            .into_iter()
            .map(|p| p.as_ref().to_lowercase())
            .collect();
        self
    }

    pub fn settings(&self) -> &PublishSettings {
        &self.settings
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Publish and log the outcome; `true` on success.
    pub async fn publish(&self, artifact: &Artifact, item_id: &str, product_id: &str) -> bool {
        match self.try_publish(artifact, item_id, product_id).await {
            Ok(receipt) => {
                info!(
                    asset = %receipt.key,
                    current_alias = receipt.current_alias,
                    "Published {}",
                    artifact.path.display()
                );
                true
            }
            Err(err) => {
                error!(
                    product = product_id,
                    item = item_id,
                    "Failed to publish {}: {}",
                    artifact.path.display(),
                    err
                );
                false
            }
        }
    }

    pub async fn try_publish(
        &self,
        artifact: &Artifact,
        item_id: &str,
        product_id: &str,
    ) -> Result<PublishReceipt> {
        let prefix = &self.settings.collection_prefix;
        let collection = with_collection_prefix(&product_id.to_lowercase(), prefix);
        let short_name = strip_collection_prefix(&collection, prefix).to_string();
        let item_id = item_id.to_lowercase();
        let asset = artifact.asset_name()?;

        let key = AssetKey::new(&collection, &item_id, &asset);
        let mut receipt = self.publish_as(artifact, &key, &short_name, false).await?;

        if self
            .current_alias_products
            .contains(&product_id.to_lowercase())
        {
            receipt.current_alias = self
                .publish_current(artifact, &collection, &short_name, &asset)
                .await?;
        }
        Ok(receipt)
    }

    async fn publish_as(
        &self,
        artifact: &Artifact,
        key: &AssetKey,
        short_name: &str,
        current: bool,
    ) -> Result<PublishReceipt> {
        let media_type = artifact.media_type();
        let item_created = self
            .ensure_item(artifact, key, short_name, media_type, current)
            .await?;

        let existing = self
            .retry
            .run("get_asset", || self.api.get_asset(key))
            .await?;
        if existing.is_none() {
            let payload = asset_payload(
                &key.asset,
                &self.settings.title_suffix_markers,
                current,
                self.settings.epsg,
            )?;
            match self
                .retry
                .run("put_asset", || self.api.put_asset(key, &payload))
                .await
            {
                Ok(()) => debug!(asset = %key, "Asset metadata created"),
                Err(err) if err.is_conflict() => {
                    debug!(asset = %key, "Asset created concurrently");
                }
                Err(err) => return Err(err.into()),
            }
        } else {
            debug!(asset = %key, "Asset exists, replacing its file");
        }

        let options = UploadOptions {
            part_size: self.settings.part_size,
            update_interval_secs: self.settings.update_interval_secs,
            force: self.settings.force_abort,
            multipart: media_type.is_raster(),
        };
        let summary = Uploader::new(self.api.as_ref(), &self.retry, &self.cancel)
            .upload(key, &artifact.path, &options)
            .await
            .map_err(|err| match err {
                PublishError::UploadInProgress { detail, .. } => PublishError::UploadInProgress {
                    asset: key.to_string(),
                    detail,
                },
                other => other,
            })?;

        Ok(PublishReceipt {
            key: key.clone(),
            item_created,
            upload_id: summary.upload_id,
            current_alias: false,
        })
    }

    /// Make sure the item exists. Rasters create it; alias items are
    /// always rewritten so their datetime follows the newest artifact.
    async fn ensure_item(
        &self,
        artifact: &Artifact,
        key: &AssetKey,
        short_name: &str,
        media_type: AssetMediaType,
        upsert: bool,
    ) -> Result<bool> {
        let existing = self
            .retry
            .run("get_item", || self.api.get_item(&key.collection, &key.item))
            .await?;

        if !media_type.is_raster() {
            return match existing {
                Some(_) => Ok(false),
                None => Err(PublishError::MissingItem {
                    collection: key.collection.clone(),
                    item: key.item.clone(),
                }),
            };
        }
        if existing.is_some() && !upsert {
            return Ok(false);
        }

        let bounds = artifact
            .bounds
            .ok_or_else(|| PublishError::MissingBounds(artifact.path.clone()))?;
        let source = ItemSource {
            collection: &key.collection,
            short_name,
            item_id: &key.item,
            acquired_at: artifact.acquired_at,
            host: &self.settings.host,
            geocat_id: artifact.geocat_id.as_deref(),
        };
        let payload = item_payload(&source, wgs84_ring(&bounds)?);

        match self
            .retry
            .run("put_item", || {
                self.api.put_item(&key.collection, &key.item, &payload)
            })
            .await
        {
            Ok(()) => {
                info!(collection = %key.collection, item = %key.item, "Item written");
                Ok(existing.is_none())
            }
            Err(err) if err.is_conflict() => {
                debug!(collection = %key.collection, item = %key.item, "Item created concurrently");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Republish under the alias item unless the alias already shows a
    /// newer acquisition. Returns whether the alias was written.
    async fn publish_current(
        &self,
        artifact: &Artifact,
        collection: &str,
        short_name: &str,
        asset: &str,
    ) -> Result<bool> {
        let alias_item = self
            .retry
            .run("get_item", || self.api.get_item(collection, short_name))
            .await?;

        let alias_time = alias_item.as_ref().and_then(|item| {
            item.pointer("/properties/datetime")
                .and_then(|v| v.as_str())
                .and_then(parse_item_datetime)
        });
        if let Some(alias_time) = alias_time {
            if alias_time > artifact.acquired_at {
                info!(
                    collection,
                    alias = %alias_time,
                    artifact = %artifact.acquired_at,
                    "Current alias is newer, leaving it"
                );
                return Ok(false);
            }
        } else if alias_item.is_some() {
            warn!(collection, "Current alias has no readable datetime, replacing it");
        }

        let key = AssetKey::new(collection, short_name, current_alias_name(asset));
        self.publish_as(artifact, &key, short_name, true).await?;
        Ok(true)
    }
}
