//! CSV-backed ledger store.
//!
//! Every mutation is a read-entire-file, modify-in-memory, rewrite-whole-file
//! cycle (appends excepted). Cycles run under one mutex, so a store shared
//! between tasks keeps single-writer semantics. Rewrites go through a
//! temporary file and a rename, so a crash never leaves a half-written
//! ledger.

use chrono::NaiveDate;
use eoflow_protocol::defaults::{
    DENYLIST_FILE, HISTORY_LEDGER_FILE, PRODUCT_STATUS_FILE, RUNNING_LEDGER_FILE,
};
use eoflow_protocol::{JobId, ProductRunStatus};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::{LedgerError, Result};
use crate::records::{
    DenylistEntry, HistoryRecord, LedgerRecord, ProductStatusRecord, RunningJob,
};

/// Locations of the four ledger files.
#[derive(Debug, Clone)]
pub struct LedgerPaths {
    pub running: PathBuf,
    pub history: PathBuf,
    pub product_status: PathBuf,
    pub denylist: PathBuf,
}

impl LedgerPaths {
    /// Standard file names inside one state directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            running: dir.join(RUNNING_LEDGER_FILE),
            history: dir.join(HISTORY_LEDGER_FILE),
            product_status: dir.join(PRODUCT_STATUS_FILE),
            denylist: dir.join(DENYLIST_FILE),
        }
    }
}

/// Durable job and product bookkeeping.
pub struct LedgerStore {
    paths: LedgerPaths,
    write_lock: Mutex<()>,
}

impl LedgerStore {
    pub fn new(paths: LedgerPaths) -> Self {
        Self {
            paths,
            write_lock: Mutex::new(()),
        }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(LedgerPaths::in_dir(dir))
    }

    pub fn paths(&self) -> &LedgerPaths {
        &self.paths
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock.lock().map_err(|_| LedgerError::Poisoned)
    }

    // ------------------------------------------------------------------
    // Running-job ledger
    // ------------------------------------------------------------------

    /// All in-flight jobs in file order.
    pub fn running_jobs(&self) -> Result<Vec<RunningJob>> {
        let _guard = self.guard()?;
        read_records(&self.paths.running)
    }

    pub fn append_running(&self, job: &RunningJob) -> Result<()> {
        let _guard = self.guard()?;
        append_records(&self.paths.running, std::slice::from_ref(job))?;
        debug!(job_id = %job.job_id, filename = %job.filename, "Recorded running job");
        Ok(())
    }

    /// Running rows whose filename is exactly `filename`.
    pub fn running_with_filename(&self, filename: &str) -> Result<Vec<RunningJob>> {
        Ok(self
            .running_jobs()?
            .into_iter()
            .filter(|job| job.filename == filename)
            .collect())
    }

    /// Remove rows by job id, keeping the order of the rest. Returns the
    /// number of rows removed.
    pub fn remove_running(&self, job_ids: &[JobId]) -> Result<usize> {
        let _guard = self.guard()?;
        let drop: HashSet<&JobId> = job_ids.iter().collect();
        let rows: Vec<RunningJob> = read_records(&self.paths.running)?;
        let before = rows.len();
        let kept: Vec<RunningJob> = rows.into_iter().filter(|r| !drop.contains(&r.job_id)).collect();
        let removed = before - kept.len();
        if removed > 0 {
            write_records(&self.paths.running, &kept)?;
        }
        Ok(removed)
    }

    /// Append history rows, then drop the matching running rows.
    ///
    /// History is written first: a crash in between duplicates a history
    /// row instead of losing track of a job.
    pub fn move_to_history(&self, job_ids: &[JobId], records: &[HistoryRecord]) -> Result<usize> {
        {
            let _guard = self.guard()?;
            append_records(&self.paths.history, records)?;
        }
        let removed = self.remove_running(job_ids)?;
        info!(moved = removed, "Moved jobs from running ledger to history");
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Completed-job history
    // ------------------------------------------------------------------

    pub fn history(&self) -> Result<Vec<HistoryRecord>> {
        let _guard = self.guard()?;
        read_records(&self.paths.history)
    }

    pub fn append_history(&self, records: &[HistoryRecord]) -> Result<()> {
        let _guard = self.guard()?;
        append_records(&self.paths.history, records)
    }

    // ------------------------------------------------------------------
    // Product status
    // ------------------------------------------------------------------

    pub fn product_statuses(&self) -> Result<Vec<ProductStatusRecord>> {
        let _guard = self.guard()?;
        read_records(&self.paths.product_status)
    }

    pub fn product_status(&self, product: &str) -> Result<Option<ProductStatusRecord>> {
        Ok(self
            .product_statuses()?
            .into_iter()
            .find(|r| r.product == product))
    }

    /// Insert or replace the row for `record.product`.
    pub fn upsert_product_status(&self, record: &ProductStatusRecord) -> Result<()> {
        let _guard = self.guard()?;
        let mut rows: Vec<ProductStatusRecord> = read_records(&self.paths.product_status)?;
        match rows.iter_mut().find(|r| r.product == record.product) {
            Some(existing) => *existing = record.clone(),
            None => rows.push(record.clone()),
        }
        write_records(&self.paths.product_status, &rows)?;
        info!(
            product = %record.product,
            status = %record.status,
            last_scene = %record.last_scene_date,
            "Updated product status"
        );
        Ok(())
    }

    /// Flip a RUNNING product to complete. Returns false when the product has
    /// no row or is not running.
    pub fn mark_product_complete(&self, product: &str) -> Result<bool> {
        let _guard = self.guard()?;
        let mut rows: Vec<ProductStatusRecord> = read_records(&self.paths.product_status)?;
        let Some(row) = rows
            .iter_mut()
            .find(|r| r.product == product && r.status == ProductRunStatus::Running)
        else {
            return Ok(false);
        };
        row.status = ProductRunStatus::Complete;
        write_records(&self.paths.product_status, &rows)?;
        info!(product, "Product marked complete");
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Denylist
    // ------------------------------------------------------------------

    pub fn denylist(&self) -> Result<Vec<DenylistEntry>> {
        let _guard = self.guard()?;
        read_records(&self.paths.denylist)
    }

    pub fn is_denylisted(&self, collection: &str, date: NaiveDate) -> Result<bool> {
        Ok(self
            .denylist()?
            .iter()
            .any(|e| e.collection == collection && e.date == date))
    }

    /// Append an entry unless the pair is already listed. Returns whether a
    /// row was written.
    pub fn append_denylist(&self, entry: &DenylistEntry) -> Result<bool> {
        let _guard = self.guard()?;
        let existing: Vec<DenylistEntry> = read_records(&self.paths.denylist)?;
        if existing
            .iter()
            .any(|e| e.collection == entry.collection && e.date == entry.date)
        {
            return Ok(false);
        }
        append_records(&self.paths.denylist, std::slice::from_ref(entry))?;
        info!(
            collection = %entry.collection,
            date = %entry.date,
            reason = %entry.reason,
            "Denylisted date"
        );
        Ok(true)
    }
}

fn read_records<T: LedgerRecord>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| LedgerError::csv(path, e))?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row.map_err(|e| LedgerError::csv(path, e))?);
    }
    Ok(rows)
}

fn write_records<T: LedgerRecord>(path: &Path, rows: &[T]) -> Result<()> {
    ensure_parent(path)?;
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&tmp)
            .map_err(|e| LedgerError::csv(&tmp, e))?;
        writer
            .write_record(T::HEADER)
            .map_err(|e| LedgerError::csv(&tmp, e))?;
        for row in rows {
            writer.serialize(row).map_err(|e| LedgerError::csv(&tmp, e))?;
        }
        writer.flush().map_err(|e| LedgerError::io(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| LedgerError::io(path, e))
}

fn append_records<T: LedgerRecord>(path: &Path, rows: &[T]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    ensure_parent(path)?;
    let needs_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LedgerError::io(path, e))?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if needs_header {
        writer
            .write_record(T::HEADER)
            .map_err(|e| LedgerError::csv(path, e))?;
    }
    for row in rows {
        writer.serialize(row).map_err(|e| LedgerError::csv(path, e))?;
    }
    writer.flush().map_err(|e| LedgerError::io(path, e))
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| LedgerError::io(parent, e))
        }
        _ => Ok(()),
    }
}
