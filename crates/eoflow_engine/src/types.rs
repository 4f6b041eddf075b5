//! Value types exchanged with the remote compute engine.

use chrono::{DateTime, NaiveDate, Utc};
use eoflow_protocol::{BoundingBox, JobId, JobState};
use serde::{Deserialize, Serialize};

/// What a submitted job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Build one upstream collection asset for one date
    Generation,
    /// Export one partition of a downstream product to storage
    Export,
}

/// A unit of remote work.
///
/// `expression` is the declarative computation; the orchestrator never
/// looks inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub kind: JobKind,
    pub description: String,
    /// Output name without extension; also the running-ledger filename
    pub filename: String,
    /// Storage location the engine writes to
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pixels: Option<u64>,
    #[serde(default)]
    pub expression: serde_json::Value,
}

impl JobSpec {
    pub fn new(
        kind: JobKind,
        description: impl Into<String>,
        filename: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            description: description.into(),
            filename: filename.into(),
            destination: destination.into(),
            region: None,
            scale: None,
            crs: None,
            max_pixels: None,
            expression: serde_json::Value::Null,
        }
    }

    pub fn with_region(mut self, region: BoundingBox) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }

    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = Some(max_pixels);
        self
    }

    pub fn with_expression(mut self, expression: serde_json::Value) -> Self {
        self.expression = expression;
        self
    }
}

/// Handle to a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: JobId,
    pub description: String,
    pub filename: String,
    pub submitted_at: DateTime<Utc>,
}

/// Full status of one remote job as the engine reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobStatusReport {
    pub id: String,
    /// Raw engine state (`READY`, `RUNNING`, `COMPLETED`, `FAILED`, ...)
    pub state: String,
    pub description: String,
    pub priority: Option<i64>,
    pub creation_ts: Option<i64>,
    pub update_ts: Option<i64>,
    pub start_ts: Option<i64>,
    pub task_type: String,
    pub destination: String,
    pub attempt: Option<u32>,
    pub usage_seconds: Option<f64>,
    pub name: String,
    pub error_message: Option<String>,
}

impl JobStatusReport {
    pub fn poll_state(&self) -> JobState {
        JobState::from_engine_state(&self.state)
    }
}

/// One asset in an engine collection listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetListing {
    pub id: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl AssetListing {
    /// Acquisition date: `properties.date`, else a trailing `_YYYY-MM-DD` in the id.
    pub fn date(&self) -> Option<NaiveDate> {
        if let Some(raw) = self.properties.get("date").and_then(|v| v.as_str()) {
            if let Some(date) = raw.get(..10).and_then(|d| d.parse().ok()) {
                return Some(date);
            }
        }
        let tail = self.id.rsplit(['_', '/']).next()?;
        tail.parse().ok()
    }
}

/// Engine's view of source data for one (collection, date).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceAvailability {
    pub candidate_scenes: u32,
    /// Mean cloud cover over the region in percent, when known
    #[serde(default)]
    pub cloud_cover: Option<f64>,
}
