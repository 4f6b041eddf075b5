//! Readiness Gate: decides whether upstream collection dates are usable.
//!
//! A date is READY once the engine lists an asset for it and EMPTY once it
//! is denylisted. Anything else either has a generation job in flight
//! (PENDING) or gets one submitted now. The gate never blocks; a window
//! that is not settled is simply retried on the next run.
//!
//! Only no-data outcomes are denylisted. Cancelled or otherwise failed
//! generation jobs, and finished jobs whose asset never shows up in the
//! listing, are archived and the date reads MISSING so it is resubmitted.

use chrono::{Days, NaiveDate, Utc};
use eoflow_engine::{JobClient, JobKind, JobSpec, JobStatusReport};
use eoflow_ledger::{DenylistEntry, LedgerStore, RunningJob};
use eoflow_protocol::defaults::{REASON_CLOUDY, REASON_NO_CANDIDATE_SCENE};
use eoflow_protocol::defaults::DEFAULT_LISTING_LAG_HOURS;
use eoflow_protocol::naming::{collection_basename, generation_description};
use eoflow_protocol::{JobState, PipelineConfig, ReadinessStatus};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Result, SentinelError};
use crate::history::history_record;

/// Readiness of every date in a lookback window, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowReadiness {
    pub collection: String,
    pub dates: Vec<(NaiveDate, ReadinessStatus)>,
}

impl WindowReadiness {
    /// Every date is READY or EMPTY.
    pub fn is_ready(&self) -> bool {
        self.dates.iter().all(|(_, status)| status.is_settled())
    }

    pub fn ready_dates(&self) -> Vec<NaiveDate> {
        self.dates
            .iter()
            .filter(|(_, status)| *status == ReadinessStatus::Ready)
            .map(|(date, _)| *date)
            .collect()
    }

    pub fn unsettled_dates(&self) -> Vec<NaiveDate> {
        self.dates
            .iter()
            .filter(|(_, status)| !status.is_settled())
            .map(|(date, _)| *date)
            .collect()
    }

    /// Scene range the window contributes to an export, if any date is READY.
    pub fn scenes(&self) -> Option<SceneRange> {
        let ready = self.ready_dates();
        Some(SceneRange {
            first: *ready.first()?,
            last: *ready.last()?,
            count: ready.len(),
        })
    }
}

/// READY dates feeding one export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneRange {
    pub first: NaiveDate,
    pub last: NaiveDate,
    pub count: usize,
}

pub struct ReadinessGate {
    jobs: JobClient,
    ledger: Arc<LedgerStore>,
    config: Arc<PipelineConfig>,
}

impl ReadinessGate {
    pub fn new(jobs: JobClient, ledger: Arc<LedgerStore>, config: Arc<PipelineConfig>) -> Self {
        Self {
            jobs,
            ledger,
            config,
        }
    }

    pub async fn evaluate(&self, collection: &str, date: NaiveDate) -> Result<ReadinessStatus> {
        let assets = self.jobs.list_assets(collection).await?;
        if assets.iter().any(|asset| asset.date() == Some(date)) {
            debug!(collection, %date, "Asset listed");
            return Ok(ReadinessStatus::Ready);
        }

        if self
            .ledger
            .is_denylisted(collection_basename(collection), date)?
        {
            return Ok(ReadinessStatus::Empty);
        }

        let filename = generation_description(collection, date);
        if let Some(row) = self.ledger.running_with_filename(&filename)?.pop() {
            return self.check_running(collection, date, &row).await;
        }

        self.request_generation(collection, date, &filename).await
    }

    async fn check_running(
        &self,
        collection: &str,
        date: NaiveDate,
        row: &RunningJob,
    ) -> Result<ReadinessStatus> {
        let report = self.jobs.report(&row.job_id).await?;
        match report.poll_state() {
            JobState::Active => {
                debug!(collection, %date, job_id = %row.job_id, "Generation in progress");
                Ok(ReadinessStatus::Pending)
            }
            JobState::Succeeded => {
                let lag_hours = self
                    .config
                    .collection(collection)
                    .map_or(DEFAULT_LISTING_LAG_HOURS, |c| c.listing_lag_hours);
                if !listing_overdue(&report, lag_hours) {
                    debug!(collection, %date, job_id = %row.job_id, "Generation done, awaiting listing");
                    return Ok(ReadinessStatus::Pending);
                }
                warn!(
                    collection,
                    %date,
                    job_id = %row.job_id,
                    lag_hours,
                    "Generation succeeded but asset never listed, resubmitting next run"
                );
                self.ledger
                    .move_to_history(&[row.job_id.clone()], &[history_record(&report)])?;
                Ok(ReadinessStatus::Missing)
            }
            JobState::Failed => {
                let message = report
                    .error_message
                    .clone()
                    .filter(|m| !m.trim().is_empty());
                let no_data = !is_cancellation(&report)
                    && message.as_deref().is_some_and(|m| {
                        self.config
                            .collection(collection)
                            .is_some_and(|c| c.is_no_data_failure(m))
                    });
                self.ledger
                    .move_to_history(&[row.job_id.clone()], &[history_record(&report)])?;

                if no_data {
                    let reason = message.unwrap_or_default();
                    warn!(collection, %date, job_id = %row.job_id, reason = %reason, "Generation found no data");
                    self.ledger.append_denylist(&DenylistEntry::new(
                        collection_basename(collection),
                        date,
                        reason,
                    ))?;
                    return Ok(ReadinessStatus::Empty);
                }

                warn!(
                    collection,
                    %date,
                    job_id = %row.job_id,
                    state = %report.state,
                    reason = message.as_deref().unwrap_or(""),
                    "Generation did not finish, resubmitting next run"
                );
                Ok(ReadinessStatus::Missing)
            }
        }
    }

    async fn request_generation(
        &self,
        collection: &str,
        date: NaiveDate,
        filename: &str,
    ) -> Result<ReadinessStatus> {
        let collection_config = self
            .config
            .collection(collection)
            .ok_or_else(|| SentinelError::UnknownCollection(collection.to_string()))?;
        let basename = collection_basename(collection);

        let availability = self.jobs.source_availability(collection, date).await?;
        if availability.candidate_scenes == 0 {
            self.ledger.append_denylist(&DenylistEntry::new(
                basename,
                date,
                REASON_NO_CANDIDATE_SCENE,
            ))?;
            return Ok(ReadinessStatus::Empty);
        }
        if let (Some(threshold), Some(cover)) = (
            collection_config.cloud_cover_threshold,
            availability.cloud_cover,
        ) {
            if cover > threshold {
                info!(collection, %date, cover, threshold, "Too cloudy");
                self.ledger
                    .append_denylist(&DenylistEntry::new(basename, date, REASON_CLOUDY))?;
                return Ok(ReadinessStatus::Empty);
            }
        }

        let spec = JobSpec::new(JobKind::Generation, filename, filename, collection)
            .with_region(self.config.region)
            .with_expression(collection_config.generation.clone());
        match self.jobs.submit(spec).await {
            Ok(handle) => {
                self.ledger
                    .append_running(&RunningJob::new(handle.job_id, filename))?;
                Ok(ReadinessStatus::Pending)
            }
            // Already logged by the client; the window stays open until the
            // next run resubmits.
            Err(_) => Ok(ReadinessStatus::Missing),
        }
    }

    /// Evaluate `[date - (lookback - 1), date]`, oldest first.
    pub async fn evaluate_window(
        &self,
        collection: &str,
        date: NaiveDate,
        lookback_days: u32,
    ) -> Result<WindowReadiness> {
        let mut dates = Vec::with_capacity(lookback_days as usize);
        for offset in (0..lookback_days.max(1)).rev() {
            let day = date
                .checked_sub_days(Days::new(u64::from(offset)))
                .unwrap_or(date);
            let status = self.evaluate(collection, day).await?;
            dates.push((day, status));
        }

        let window = WindowReadiness {
            collection: collection.to_string(),
            dates,
        };
        info!(
            collection,
            %date,
            lookback_days,
            ready = window.is_ready(),
            ready_dates = window.ready_dates().len(),
            "Evaluated window"
        );
        Ok(window)
    }

    /// Move terminal gate rows for a READY date to history. Returns how many
    /// rows were moved.
    pub async fn cleanup_consumed(&self, collection: &str, date: NaiveDate) -> Result<usize> {
        let filename = generation_description(collection, date);
        let rows = self.ledger.running_with_filename(&filename)?;
        let mut job_ids = Vec::new();
        let mut records = Vec::new();
        for row in rows {
            let report = self.jobs.report(&row.job_id).await?;
            if report.poll_state().is_terminal() {
                records.push(history_record(&report));
                job_ids.push(row.job_id);
            }
        }
        if job_ids.is_empty() {
            return Ok(0);
        }
        Ok(self.ledger.move_to_history(&job_ids, &records)?)
    }

    /// Delete engine assets older than the collection's retention. Returns
    /// how many were deleted.
    pub async fn prune_expired(&self, collection: &str, date: NaiveDate) -> Result<usize> {
        let Some(retention) = self
            .config
            .collection(collection)
            .and_then(|c| c.retention_days)
        else {
            return Ok(0);
        };
        let Some(cutoff) = date.checked_sub_days(Days::new(u64::from(retention))) else {
            return Ok(0);
        };

        let mut deleted = 0;
        for asset in self.jobs.list_assets(collection).await? {
            if asset.date().is_some_and(|d| d < cutoff) {
                self.jobs.delete_asset(collection, &asset.id).await?;
                deleted += 1;
            }
        }
        if deleted > 0 {
            info!(collection, %cutoff, deleted, "Pruned expired assets");
        }
        Ok(deleted)
    }
}

fn is_cancellation(report: &JobStatusReport) -> bool {
    report.state.trim().to_uppercase().starts_with("CANCEL")
}

/// A finished job is overdue once its last update is older than the lag.
/// Reports without an update time never are.
fn listing_overdue(report: &JobStatusReport, lag_hours: u32) -> bool {
    let Some(updated_ms) = report.update_ts else {
        return false;
    };
    let lag_ms = i64::from(lag_hours) * 3_600_000;
    Utc::now().timestamp_millis() - updated_ms > lag_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_window_ready_only_when_settled() {
        let window = WindowReadiness {
            collection: "S2".to_string(),
            dates: vec![
                (day(1), ReadinessStatus::Ready),
                (day(2), ReadinessStatus::Empty),
                (day(3), ReadinessStatus::Ready),
            ],
        };
        assert!(window.is_ready());
        assert_eq!(window.ready_dates(), vec![day(1), day(3)]);
        assert_eq!(
            window.scenes(),
            Some(SceneRange {
                first: day(1),
                last: day(3),
                count: 2
            })
        );

        let pending = WindowReadiness {
            collection: "S2".to_string(),
            dates: vec![
                (day(1), ReadinessStatus::Ready),
                (day(2), ReadinessStatus::Pending),
                (day(3), ReadinessStatus::Missing),
            ],
        };
        assert!(!pending.is_ready());
        assert_eq!(pending.unsettled_dates(), vec![day(2), day(3)]);
    }

    fn report(state: &str, update_ts: Option<i64>) -> JobStatusReport {
        JobStatusReport {
            id: "J1".to_string(),
            state: state.to_string(),
            description: "S2_SR_2024-01-10".to_string(),
            priority: None,
            creation_ts: update_ts,
            update_ts,
            start_ts: update_ts,
            task_type: "INGEST_IMAGE".to_string(),
            destination: "projects/eo/assets/S2_SR".to_string(),
            attempt: Some(1),
            usage_seconds: None,
            name: "S2_SR_2024-01-10".to_string(),
            error_message: None,
        }
    }

    #[test]
    fn test_listing_overdue_after_lag() {
        let now = Utc::now().timestamp_millis();
        assert!(!listing_overdue(&report("COMPLETED", Some(now)), 24));
        assert!(!listing_overdue(&report("COMPLETED", Some(now - 23 * 3_600_000)), 24));
        assert!(listing_overdue(&report("COMPLETED", Some(now - 25 * 3_600_000)), 24));
        assert!(!listing_overdue(&report("COMPLETED", None), 0));
    }

    #[test]
    fn test_cancellation_states() {
        assert!(is_cancellation(&report("CANCELLED", None)));
        assert!(is_cancellation(&report("cancel_requested", None)));
        assert!(!is_cancellation(&report("FAILED", None)));
        assert!(!is_cancellation(&report("ERROR", None)));
    }

    #[test]
    fn test_all_empty_window_has_no_scenes() {
        let window = WindowReadiness {
            collection: "S2".to_string(),
            dates: vec![(day(1), ReadinessStatus::Empty)],
        };
        assert!(window.is_ready());
        assert_eq!(window.scenes(), None);
    }
}
