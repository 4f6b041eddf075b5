//! Row types of the four ledger files.

use chrono::NaiveDate;
use eoflow_protocol::{JobId, ProductRunStatus};
use serde::{Deserialize, Serialize};

/// A row type with a fixed CSV header.
pub trait LedgerRecord: Serialize + for<'de> Deserialize<'de> {
    const HEADER: &'static [&'static str];
}

/// One in-flight remote job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningJob {
    #[serde(rename = "JobId")]
    pub job_id: JobId,
    #[serde(rename = "Filename")]
    pub filename: String,
}

impl RunningJob {
    pub fn new(job_id: impl Into<JobId>, filename: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            filename: filename.into(),
        }
    }
}

impl LedgerRecord for RunningJob {
    const HEADER: &'static [&'static str] = &["JobId", "Filename"];
}

/// A job whose terminal state has been consumed.
///
/// Columns mirror the engine's task status report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
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
    pub id: String,
    pub name: String,
}

impl LedgerRecord for HistoryRecord {
    const HEADER: &'static [&'static str] = &[
        "state",
        "description",
        "priority",
        "creation_ts",
        "update_ts",
        "start_ts",
        "task_type",
        "destination",
        "attempt",
        "usage_seconds",
        "id",
        "name",
    ];
}

/// Last run of one product. Upserted by `product`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductStatusRecord {
    #[serde(rename = "Product")]
    pub product: String,
    #[serde(rename = "LastSceneDate")]
    pub last_scene_date: NaiveDate,
    #[serde(rename = "RunDate")]
    pub run_date: NaiveDate,
    #[serde(rename = "Status")]
    pub status: ProductRunStatus,
}

impl LedgerRecord for ProductStatusRecord {
    const HEADER: &'static [&'static str] = &["Product", "LastSceneDate", "RunDate", "Status"];
}

/// A (collection, date) pair known to have no usable source data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenylistEntry {
    pub collection: String,
    pub date: NaiveDate,
    pub reason: String,
}

impl DenylistEntry {
    pub fn new(collection: impl Into<String>, date: NaiveDate, reason: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            date,
            reason: reason.into(),
        }
    }
}

impl LedgerRecord for DenylistEntry {
    const HEADER: &'static [&'static str] = &["collection", "date", "reason"];
}
