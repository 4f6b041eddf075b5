use async_trait::async_trait;
use chrono::NaiveDate;
use eoflow_protocol::JobId;

use crate::error::Result;
use crate::types::{AssetListing, JobSpec, JobStatusReport, SourceAvailability};

/// Contract of the remote compute engine.
///
/// Submission is fire-and-forget; status must be polled.
#[async_trait]
pub trait ComputeEngine: Send + Sync {
    async fn submit(&self, spec: &JobSpec) -> Result<JobId>;

    async fn status(&self, job_id: &JobId) -> Result<JobStatusReport>;

    async fn cancel(&self, job_id: &JobId) -> Result<()>;

    async fn list_assets(&self, collection: &str) -> Result<Vec<AssetListing>>;

    /// Candidate scenes and cloud cover the engine would use for `date`.
    async fn source_availability(
        &self,
        collection: &str,
        date: NaiveDate,
    ) -> Result<SourceAvailability>;

    async fn delete_asset(&self, collection: &str, asset_id: &str) -> Result<()>;

    /// Bytes of an exported object (`{filename}.tif`) in `destination`.
    async fn fetch_export(&self, destination: &str, object: &str) -> Result<Vec<u8>>;

    async fn delete_export(&self, destination: &str, object: &str) -> Result<()>;
}
