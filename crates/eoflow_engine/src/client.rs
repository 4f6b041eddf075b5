//! Job Client: thin adapter over a [`ComputeEngine`].
//!
//! No retries happen here. A failed submission is returned to the caller,
//! which knows whether the unit of work can be skipped until the next run.

use chrono::{NaiveDate, Utc};
use eoflow_protocol::{JobId, JobState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::engine::ComputeEngine;
use crate::error::{EngineError, Result};
use crate::types::{AssetListing, JobHandle, JobSpec, JobStatusReport, SourceAvailability};

#[derive(Clone)]
pub struct JobClient {
    engine: Arc<dyn ComputeEngine>,
}

impl JobClient {
    pub fn new(engine: Arc<dyn ComputeEngine>) -> Self {
        Self { engine }
    }

    pub async fn submit(&self, spec: JobSpec) -> Result<JobHandle> {
        let job_id = match self.engine.submit(&spec).await {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    filename = %spec.filename,
                    description = %spec.description,
                    transient = e.is_transient(),
                    "Job submission failed: {}",
                    e
                );
                return Err(e);
            }
        };
        info!(
            job_id = %job_id,
            filename = %spec.filename,
            kind = ?spec.kind,
            "Submitted job"
        );
        Ok(JobHandle {
            job_id,
            description: spec.description,
            filename: spec.filename,
            submitted_at: Utc::now(),
        })
    }

    pub async fn poll(&self, job_id: &JobId) -> Result<JobState> {
        let state = self.report(job_id).await?.poll_state();
        debug!(job_id = %job_id, state = %state, "Polled job");
        Ok(state)
    }

    pub async fn poll_handle(&self, handle: &JobHandle) -> Result<JobState> {
        self.poll(&handle.job_id).await
    }

    /// Full status report, used for history rows and failure reasons.
    pub async fn report(&self, job_id: &JobId) -> Result<JobStatusReport> {
        self.engine.status(job_id).await
    }

    pub async fn cancel(&self, job_id: &JobId) -> Result<()> {
        self.engine.cancel(job_id).await?;
        info!(job_id = %job_id, "Cancelled job");
        Ok(())
    }

    pub async fn cancel_handle(&self, handle: &JobHandle) -> Result<()> {
        self.cancel(&handle.job_id).await
    }

    pub async fn list_assets(&self, collection: &str) -> Result<Vec<AssetListing>> {
        self.engine.list_assets(collection).await
    }

    pub async fn source_availability(
        &self,
        collection: &str,
        date: NaiveDate,
    ) -> Result<SourceAvailability> {
        self.engine.source_availability(collection, date).await
    }

    pub async fn delete_asset(&self, collection: &str, asset_id: &str) -> Result<()> {
        self.engine.delete_asset(collection, asset_id).await?;
        info!(collection, asset_id, "Deleted engine asset");
        Ok(())
    }

    /// Download export `filename` from `destination` into
    /// `{target_dir}/{filename}.tif`. The file only appears once complete.
    pub async fn fetch_export(
        &self,
        destination: &str,
        filename: &str,
        target_dir: &Path,
    ) -> Result<PathBuf> {
        let object = export_object(filename);
        let bytes = self.engine.fetch_export(destination, &object).await?;

        std::fs::create_dir_all(target_dir).map_err(|e| EngineError::io(target_dir, e))?;
        let target = target_dir.join(&object);
        let partial = target_dir.join(format!("{object}.part"));
        std::fs::write(&partial, &bytes).map_err(|e| EngineError::io(&partial, e))?;
        std::fs::rename(&partial, &target).map_err(|e| EngineError::io(&target, e))?;
        info!(destination, filename, bytes = bytes.len(), "Fetched export");
        Ok(target)
    }

    pub async fn delete_export(&self, destination: &str, filename: &str) -> Result<()> {
        self.engine
            .delete_export(destination, &export_object(filename))
            .await?;
        debug!(destination, filename, "Deleted remote export");
        Ok(())
    }
}

fn export_object(filename: &str) -> String {
    format!("{filename}.tif")
}
