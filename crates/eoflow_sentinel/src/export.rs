//! Export Coordinator: submits one product as four quadrant jobs.

use chrono::{NaiveDate, Utc};
use eoflow_engine::{JobClient, JobHandle, JobKind, JobSpec};
use eoflow_ledger::{LedgerStore, ProductStatusRecord, RunningJob};
use eoflow_protocol::defaults::{DEFAULT_MAX_PIXELS, EXPECTED_PARTITIONS};
use eoflow_protocol::naming::{export_base_name, export_description, item_id_for, partition_filename};
use eoflow_protocol::{
    BoundingBox, PipelineConfig, ProcessorConfig, ProductConfig, ProductRunStatus,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Result, SentinelError};
use crate::readiness::SceneRange;

/// Per-export metadata written next to the processing outputs and
/// published with the raster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MetadataSidecar {
    pub product: String,
    pub item: String,
    pub asset: String,
    pub date_first_scene: NaiveDate,
    pub date_last_scene: NaiveDate,
    pub number_of_scenes: usize,
    pub date_item_generation: String,
    pub processor_hash_link: String,
    pub processor_release_version: String,
    pub geocat_id: String,
}

impl MetadataSidecar {
    pub fn path_for(processing_dir: &Path, base_name: &str) -> PathBuf {
        processing_dir.join(format!("{base_name}_metadata.json"))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SentinelError::io(parent, e))?;
        }
        let json = serde_json::to_vec_pretty(self).map_err(|source| SentinelError::Sidecar {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|e| SentinelError::io(path, e))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| SentinelError::io(path, e))?;
        serde_json::from_slice(&bytes).map_err(|source| SentinelError::Sidecar {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Jobs submitted for one product export.
#[derive(Debug, Clone)]
pub struct ExportGroup {
    pub product: String,
    pub item_id: String,
    pub base_name: String,
    pub partitions: Vec<JobHandle>,
    pub expected_partitions: usize,
}

pub struct ExportCoordinator {
    jobs: JobClient,
    ledger: Arc<LedgerStore>,
    config: Arc<PipelineConfig>,
    processor: ProcessorConfig,
}

impl ExportCoordinator {
    pub fn new(
        jobs: JobClient,
        ledger: Arc<LedgerStore>,
        config: Arc<PipelineConfig>,
        processor: ProcessorConfig,
    ) -> Self {
        Self {
            jobs,
            ledger,
            config,
            processor,
        }
    }

    /// Skip products that are still running or already exported up to
    /// `last_scene`.
    pub fn should_export(&self, product: &str, last_scene: NaiveDate) -> Result<bool> {
        let Some(status) = self.ledger.product_status(product)? else {
            return Ok(true);
        };
        if status.status == ProductRunStatus::Running {
            info!(product, "Previous export still running, skipping");
            return Ok(false);
        }
        if status.last_scene_date >= last_scene {
            info!(
                product,
                recorded = %status.last_scene_date,
                %last_scene,
                "Already exported, skipping"
            );
            return Ok(false);
        }
        Ok(true)
    }

    pub async fn submit_product(
        &self,
        product: &ProductConfig,
        scenes: &SceneRange,
        run_date: NaiveDate,
        region: BoundingBox,
    ) -> Result<ExportGroup> {
        let item_id = item_id_for(scenes.last);
        let base_name = export_base_name(&product.name, &item_id, &product.descriptor);
        let description = export_description(&product.name, &item_id);

        // Submit every partition before touching the ledger so a partial
        // submission never leaves an incomplete group behind.
        let mut partitions = Vec::with_capacity(EXPECTED_PARTITIONS);
        for (index, quadrant) in region.quadrants().into_iter().enumerate() {
            let spec = JobSpec::new(
                JobKind::Export,
                &description,
                partition_filename(&base_name, index + 1),
                &self.config.engine.destination,
            )
            .with_region(quadrant)
            .with_scale(product.spatial_scale)
            .with_crs(&self.config.merge.target_crs)
            .with_max_pixels(DEFAULT_MAX_PIXELS)
            .with_expression(product.expression.clone());

            match self.jobs.submit(spec).await {
                Ok(handle) => partitions.push(handle),
                Err(err) => {
                    self.cancel_submitted(&partitions).await;
                    return Err(err.into());
                }
            }
        }

        for handle in &partitions {
            self.ledger
                .append_running(&RunningJob::new(handle.job_id.clone(), &handle.filename))?;
        }

        self.ledger.upsert_product_status(&ProductStatusRecord {
            product: product.name.clone(),
            last_scene_date: scenes.last,
            run_date,
            status: ProductRunStatus::Running,
        })?;

        let sidecar = MetadataSidecar {
            product: product.name.clone(),
            item: item_id.clone(),
            asset: base_name.clone(),
            date_first_scene: scenes.first,
            date_last_scene: scenes.last,
            number_of_scenes: scenes.count,
            date_item_generation: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            processor_hash_link: self.processor.hash_link.clone(),
            processor_release_version: self.processor.release_version.clone(),
            geocat_id: product.geocat_id.clone(),
        };
        sidecar.write(&MetadataSidecar::path_for(
            &self.config.paths.processing_dir,
            &base_name,
        ))?;

        info!(
            product = %product.name,
            item = %item_id,
            partitions = partitions.len(),
            "Export submitted"
        );
        Ok(ExportGroup {
            product: product.name.clone(),
            item_id,
            base_name,
            partitions,
            expected_partitions: product.expected_partitions,
        })
    }

    async fn cancel_submitted(&self, handles: &[JobHandle]) {
        for handle in handles {
            if let Err(err) = self.jobs.cancel_handle(handle).await {
                warn!(job_id = %handle.job_id, "Failed to cancel orphaned partition: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_roundtrip_uses_upper_case_keys() {
        let temp = tempfile::TempDir::new().unwrap();
        let sidecar = MetadataSidecar {
            product: "swisseo_s2-sr_v100".to_string(),
            item: "2024-03-15t235959".to_string(),
            asset: "swisseo_s2-sr_v100_mosaic_2024-03-15t235959_bands-10m".to_string(),
            date_first_scene: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
            date_last_scene: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            number_of_scenes: 2,
            date_item_generation: "2024-03-16T01:00:00Z".to_string(),
            processor_hash_link: "https://example.org/commit/abc".to_string(),
            processor_release_version: "1.2.3".to_string(),
            geocat_id: "geo-1".to_string(),
        };
        let path = MetadataSidecar::path_for(temp.path(), &sidecar.asset);
        sidecar.write(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["DATE_LAST_SCENE"], "2024-03-15");
        assert_eq!(raw["NUMBER_OF_SCENES"], 2);
        assert_eq!(MetadataSidecar::read(&path).unwrap(), sidecar);
    }
}
