//! Scriptable in-memory compute engine.
//!
//! Jobs stay `RUNNING` until a test moves them with [`FakeEngine::complete`]
//! or [`FakeEngine::fail`]. Completing a generation job publishes its asset
//! to the collection listing; completing an export job stores its partition
//! bytes remotely, where `fetch_export` reads them.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use eoflow_engine::{
    AssetListing, ComputeEngine, EngineError, JobKind, JobSpec, JobStatusReport, Result,
    SourceAvailability,
};
use eoflow_protocol::JobId;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone)]
struct FakeJob {
    spec: JobSpec,
    state: String,
    error_message: Option<String>,
    created: i64,
    updated: i64,
}

#[derive(Default)]
struct EngineState {
    next_id: u64,
    jobs: BTreeMap<JobId, FakeJob>,
    order: Vec<JobId>,
    assets: BTreeMap<String, Vec<AssetListing>>,
    availability: HashMap<(String, NaiveDate), SourceAvailability>,
    failing_submissions: usize,
    accepted_before_failing: usize,
    failing_status: usize,
    cancelled: Vec<JobId>,
    deleted: Vec<(String, String)>,
    /// `(destination, object)` -> bytes
    exports: BTreeMap<(String, String), Vec<u8>>,
    fetched: Vec<(String, String)>,
    deleted_exports: Vec<(String, String)>,
}

pub struct FakeEngine {
    state: Mutex<EngineState>,
    default_availability: SourceAvailability,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    /// Every date has one cloud-free candidate scene unless told otherwise.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            default_availability: SourceAvailability {
                candidate_scenes: 1,
                cloud_cover: Some(0.0),
            },
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().expect("fake engine state poisoned")
    }

    /// List an asset for `(collection, date)` as if it had been generated.
    pub fn add_asset(&self, collection: &str, date: NaiveDate) {
        let id = format!("{collection}/{}", date.format("%Y-%m-%d"));
        add_listing(&mut self.state(), collection, id, date);
    }

    pub fn set_availability(&self, collection: &str, date: NaiveDate, availability: SourceAvailability) {
        self.state()
            .availability
            .insert((collection.to_string(), date), availability);
    }

    /// The next `n` submissions fail with HTTP 503.
    pub fn fail_next_submissions(&self, n: usize) {
        self.state().failing_submissions = n;
    }

    /// Accept `accepted` more submissions, then fail the following `n`.
    pub fn fail_submissions_after(&self, accepted: usize, n: usize) {
        let mut state = self.state();
        state.accepted_before_failing = accepted;
        state.failing_submissions = n;
    }

    /// The next `n` status calls fail with HTTP 503.
    pub fn fail_next_status(&self, n: usize) {
        self.state().failing_status = n;
    }

    /// Specs of every accepted submission, in order.
    pub fn submitted(&self) -> Vec<(JobId, JobSpec)> {
        let state = self.state();
        state
            .order
            .iter()
            .filter_map(|id| state.jobs.get(id).map(|job| (id.clone(), job.spec.clone())))
            .collect()
    }

    pub fn submitted_count(&self) -> usize {
        self.state().order.len()
    }

    pub fn job_ids_for(&self, kind: JobKind) -> Vec<JobId> {
        self.submitted()
            .into_iter()
            .filter(|(_, spec)| spec.kind == kind)
            .map(|(id, _)| id)
            .collect()
    }

    /// Set a raw engine state (`READY`, `RUNNING`, `COMPLETED`, ...).
    pub fn set_state(&self, job_id: &JobId, state: &str) {
        if let Some(job) = self.state().jobs.get_mut(job_id) {
            job.state = state.to_string();
            job.updated = Utc::now().timestamp_millis();
        }
    }

    /// Shift a job's last update `hours` into the past.
    pub fn backdate(&self, job_id: &JobId, hours: i64) {
        if let Some(job) = self.state().jobs.get_mut(job_id) {
            job.updated -= hours * 3_600_000;
        }
    }

    pub fn complete(&self, job_id: &JobId) {
        let mut state = self.state();
        let Some(job) = state.jobs.get_mut(job_id) else {
            return;
        };
        job.state = "COMPLETED".to_string();
        job.updated = Utc::now().timestamp_millis();
        let spec = job.spec.clone();

        match spec.kind {
            JobKind::Generation => {
                let date = spec
                    .filename
                    .rsplit('_')
                    .next()
                    .and_then(|tail| tail.parse::<NaiveDate>().ok());
                if let Some(date) = date {
                    let id = format!("{}/{}", spec.destination, spec.filename);
                    add_listing(&mut state, &spec.destination, id, date);
                }
            }
            JobKind::Export => {
                let object = format!("{}.tif", spec.filename);
                let bytes = spec.filename.as_bytes().to_vec();
                state.exports.insert((spec.destination.clone(), object), bytes);
            }
        }
        debug!(job_id = %job_id, filename = %spec.filename, "Fake job completed");
    }

    pub fn complete_all(&self) {
        for (id, _) in self.submitted() {
            self.complete(&id);
        }
    }

    pub fn fail(&self, job_id: &JobId, message: &str) {
        if let Some(job) = self.state().jobs.get_mut(job_id) {
            job.state = "FAILED".to_string();
            job.error_message = Some(message.to_string());
            job.updated = Utc::now().timestamp_millis();
        }
    }

    /// Objects still held remotely in `destination`.
    pub fn remote_exports(&self, destination: &str) -> Vec<String> {
        self.state()
            .exports
            .keys()
            .filter(|(dest, _)| dest == destination)
            .map(|(_, object)| object.clone())
            .collect()
    }

    /// `(destination, object)` pairs downloaded, in order.
    pub fn fetched(&self) -> Vec<(String, String)> {
        self.state().fetched.clone()
    }

    /// `(destination, object)` pairs removed remotely.
    pub fn deleted_exports(&self) -> Vec<(String, String)> {
        self.state().deleted_exports.clone()
    }

    pub fn cancelled(&self) -> Vec<JobId> {
        self.state().cancelled.clone()
    }

    /// `(collection, asset_id)` pairs removed through the engine.
    pub fn deleted(&self) -> Vec<(String, String)> {
        self.state().deleted.clone()
    }
}

fn add_listing(state: &mut EngineState, collection: &str, id: String, date: NaiveDate) {
    let mut properties = serde_json::Map::new();
    properties.insert("date".to_string(), json!(date.format("%Y-%m-%d").to_string()));
    let listings = state.assets.entry(collection.to_string()).or_default();
    if !listings.iter().any(|l| l.id == id) {
        listings.push(AssetListing { id, properties });
    }
}

#[async_trait]
impl ComputeEngine for FakeEngine {
    async fn submit(&self, spec: &JobSpec) -> Result<JobId> {
        let mut state = self.state();
        if state.accepted_before_failing > 0 {
            state.accepted_before_failing -= 1;
        } else if state.failing_submissions > 0 {
            state.failing_submissions -= 1;
            return Err(EngineError::Status {
                status: 503,
                body: "engine unavailable".to_string(),
            });
        }
        state.next_id += 1;
        let id = JobId::new(format!("FAKE{:04}", state.next_id));
        state.jobs.insert(
            id.clone(),
            FakeJob {
                spec: spec.clone(),
                state: "RUNNING".to_string(),
                error_message: None,
                created: Utc::now().timestamp_millis(),
                updated: Utc::now().timestamp_millis(),
            },
        );
        state.order.push(id.clone());
        Ok(id)
    }

    async fn status(&self, job_id: &JobId) -> Result<JobStatusReport> {
        let mut state = self.state();
        if state.failing_status > 0 {
            state.failing_status -= 1;
            return Err(EngineError::Status {
                status: 503,
                body: "engine unavailable".to_string(),
            });
        }
        let job = state
            .jobs
            .get(job_id)
            .ok_or_else(|| EngineError::rejected(format!("unknown job {job_id}")))?;
        Ok(JobStatusReport {
            id: job_id.to_string(),
            state: job.state.clone(),
            description: job.spec.description.clone(),
            priority: Some(100),
            creation_ts: Some(job.created),
            update_ts: Some(job.updated),
            start_ts: Some(job.created),
            task_type: match job.spec.kind {
                JobKind::Generation => "INGEST_IMAGE".to_string(),
                JobKind::Export => "EXPORT_IMAGE".to_string(),
            },
            destination: job.spec.destination.clone(),
            attempt: Some(1),
            usage_seconds: Some(1.0),
            name: job.spec.filename.clone(),
            error_message: job.error_message.clone(),
        })
    }

    async fn cancel(&self, job_id: &JobId) -> Result<()> {
        let mut state = self.state();
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| EngineError::rejected(format!("unknown job {job_id}")))?;
        job.state = "CANCELLED".to_string();
        job.updated = Utc::now().timestamp_millis();
        state.cancelled.push(job_id.clone());
        Ok(())
    }

    async fn list_assets(&self, collection: &str) -> Result<Vec<AssetListing>> {
        Ok(self
            .state()
            .assets
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn source_availability(
        &self,
        collection: &str,
        date: NaiveDate,
    ) -> Result<SourceAvailability> {
        Ok(self
            .state()
            .availability
            .get(&(collection.to_string(), date))
            .copied()
            .unwrap_or(self.default_availability))
    }

    async fn delete_asset(&self, collection: &str, asset_id: &str) -> Result<()> {
        let mut state = self.state();
        if let Some(listings) = state.assets.get_mut(collection) {
            listings.retain(|l| l.id != asset_id);
        }
        state
            .deleted
            .push((collection.to_string(), asset_id.to_string()));
        Ok(())
    }
    async fn fetch_export(&self, destination: &str, object: &str) -> Result<Vec<u8>> {
        let mut state = self.state();
        let key = (destination.to_string(), object.to_string());
        let bytes = state
            .exports
            .get(&key)
            .cloned()
            .ok_or_else(|| EngineError::rejected(format!("no export {destination}/{object}")))?;
        state.fetched.push(key);
        Ok(bytes)
    }

    async fn delete_export(&self, destination: &str, object: &str) -> Result<()> {
        let mut state = self.state();
        let key = (destination.to_string(), object.to_string());
        state.exports.remove(&key);
        state.deleted_exports.push(key);
        Ok(())
    }
}
