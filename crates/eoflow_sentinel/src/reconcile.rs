//! Completion Reconciler: turns finished partition jobs into merged rasters.
//!
//! Running rows are grouped by filename stem in ledger order. A group is
//! merged only when it holds exactly the expected number of partitions and
//! every one of them succeeded. Partition files are fetched from the
//! engine's export destination before merging. Ledger bookkeeping and
//! removal of the remote exports are deferred to
//! [`CompletionReconciler::finalize`], which the driver calls after the
//! artifact was published.

use chrono::NaiveDateTime;
use eoflow_engine::{JobClient, JobStatusReport};
use eoflow_ledger::{LedgerStore, RunningJob};
use eoflow_protocol::naming::{acquisition_time, split_partition};
use eoflow_protocol::{JobId, JobState, PipelineConfig};
use eoflow_publish::RasterBounds;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{MergeError, Result, SentinelError};
use crate::export::MetadataSidecar;
use crate::history::history_record;
use crate::raster::{MergeOutput, MergeRequest, RasterToolkit};

/// Running rows sharing one stem, ordered by partition number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionGroup {
    pub stem: String,
    pub product: String,
    pub rows: Vec<RunningJob>,
    pub expected: usize,
}

impl PartitionGroup {
    pub fn job_ids(&self) -> Vec<JobId> {
        self.rows.iter().map(|r| r.job_id.clone()).collect()
    }
}

/// A merged group waiting to be published.
#[derive(Debug, Clone)]
pub struct ReadyGroup {
    pub group: PartitionGroup,
    pub item_id: String,
    pub acquired_at: NaiveDateTime,
    pub artifact: PathBuf,
    pub bounds: RasterBounds,
    /// Present when the export wrote one
    pub sidecar: Option<PathBuf>,
    pub geocat_id: Option<String>,
    pub reports: Vec<JobStatusReport>,
    pub partition_files: Vec<PathBuf>,
    pub intermediates: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedGroup {
    pub stem: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub ready: Vec<ReadyGroup>,
    pub pending: Vec<String>,
    pub failed: Vec<FailedGroup>,
    /// Groups with fewer (or more) rows than expected
    pub incomplete: Vec<String>,
}

enum GroupPoll {
    Pending,
    Failed(String),
    Succeeded(Vec<JobStatusReport>),
}

pub struct CompletionReconciler {
    jobs: JobClient,
    ledger: Arc<LedgerStore>,
    config: Arc<PipelineConfig>,
    toolkit: Arc<dyn RasterToolkit>,
}

impl CompletionReconciler {
    pub fn new(
        jobs: JobClient,
        ledger: Arc<LedgerStore>,
        config: Arc<PipelineConfig>,
        toolkit: Arc<dyn RasterToolkit>,
    ) -> Self {
        Self {
            jobs,
            ledger,
            config,
            toolkit,
        }
    }

    /// Partition groups in FIFO order of their first row.
    pub fn groups(&self) -> Result<Vec<PartitionGroup>> {
        let rows = self.ledger.running_jobs()?;
        let mut order: Vec<String> = Vec::new();
        let mut by_stem: BTreeMap<String, Vec<(usize, RunningJob)>> = BTreeMap::new();
        for row in rows {
            let Some((stem, n)) = split_partition(&row.filename) else {
                continue;
            };
            let stem = stem.to_string();
            if !by_stem.contains_key(&stem) {
                order.push(stem.clone());
            }
            by_stem.entry(stem).or_default().push((n, row));
        }

        let mut groups = Vec::with_capacity(order.len());
        for stem in order {
            let mut rows = by_stem.remove(&stem).unwrap_or_default();
            rows.sort_by_key(|(n, _)| *n);
            let Some(product) = self.product_for(&stem) else {
                warn!(stem = %stem, "No product configured for export group, skipping");
                continue;
            };
            let expected = self
                .config
                .product(&product)
                .map(|p| p.expected_partitions)
                .unwrap_or(eoflow_protocol::defaults::EXPECTED_PARTITIONS);
            groups.push(PartitionGroup {
                stem,
                product,
                rows: rows.into_iter().map(|(_, row)| row).collect(),
                expected,
            });
        }
        Ok(groups)
    }

    fn sidecar_path(&self, stem: &str) -> PathBuf {
        MetadataSidecar::path_for(&self.config.paths.processing_dir, stem)
    }

    fn product_for(&self, stem: &str) -> Option<String> {
        let sidecar = self.sidecar_path(stem);
        if sidecar.exists() {
            match MetadataSidecar::read(&sidecar) {
                Ok(meta) => return Some(meta.product),
                Err(err) => warn!(stem, "Unreadable sidecar: {}", err),
            }
        }
        self.config.product_for_stem(stem).map(|p| p.name.clone())
    }

    pub async fn reconcile(&self) -> Result<ReconcileOutcome> {
        let mut outcome = ReconcileOutcome::default();
        for group in self.groups()? {
            if group.rows.len() != group.expected {
                debug!(
                    stem = %group.stem,
                    rows = group.rows.len(),
                    expected = group.expected,
                    "Group incomplete"
                );
                outcome.incomplete.push(group.stem);
                continue;
            }

            match self.poll_group(&group).await {
                GroupPoll::Pending => outcome.pending.push(group.stem),
                GroupPoll::Failed(reason) => {
                    warn!(stem = %group.stem, reason = %reason, "Export group failed");
                    outcome.failed.push(FailedGroup {
                        stem: group.stem,
                        reason,
                    });
                }
                GroupPoll::Succeeded(reports) => {
                    let stem = group.stem.clone();
                    match self.merge_group(group, reports).await {
                        Ok(ready) => outcome.ready.push(ready),
                        Err(err) => {
                            warn!(stem = %stem, "Merge failed: {}", err);
                            outcome.failed.push(FailedGroup {
                                stem,
                                reason: err.to_string(),
                            });
                        }
                    }
                }
            }
        }

        info!(
            ready = outcome.ready.len(),
            pending = outcome.pending.len(),
            failed = outcome.failed.len(),
            incomplete = outcome.incomplete.len(),
            "Reconciled export groups"
        );
        Ok(outcome)
    }

    async fn poll_group(&self, group: &PartitionGroup) -> GroupPoll {
        let mut reports = Vec::with_capacity(group.rows.len());
        let mut pending = false;
        let mut failures = Vec::new();
        for row in &group.rows {
            match self.jobs.report(&row.job_id).await {
                Ok(report) => {
                    match report.poll_state() {
                        JobState::Active => pending = true,
                        JobState::Failed => failures.push(format!(
                            "{} ({})",
                            row.filename,
                            report.error_message.as_deref().unwrap_or(&report.state)
                        )),
                        JobState::Succeeded => {}
                    }
                    reports.push(report);
                }
                Err(err) => {
                    warn!(job_id = %row.job_id, "Status poll failed: {}", err);
                    pending = true;
                }
            }
        }

        if !failures.is_empty() {
            GroupPoll::Failed(format!("partitions failed: {}", failures.join(", ")))
        } else if pending {
            GroupPoll::Pending
        } else {
            GroupPoll::Succeeded(reports)
        }
    }

    async fn merge_group(
        &self,
        group: PartitionGroup,
        reports: Vec<JobStatusReport>,
    ) -> Result<ReadyGroup> {
        let acquired_at = acquisition_time(&group.stem).ok_or_else(|| {
            eoflow_protocol::NamingError::MissingDateToken(group.stem.clone())
        })?;
        let item_id = acquired_at.format("%Y-%m-%dt%H%M%S").to_string();

        let paths = &self.config.paths;
        let destination = &self.config.engine.destination;
        let partition_files: Vec<PathBuf> = group
            .rows
            .iter()
            .map(|row| paths.export_dir.join(format!("{}.tif", row.filename)))
            .collect();
        for (row, file) in group.rows.iter().zip(&partition_files) {
            if file.exists() {
                debug!(file = %file.display(), "Partition already fetched");
                continue;
            }
            self.jobs
                .fetch_export(destination, &row.filename, &paths.export_dir)
                .await?;
        }
        for file in &partition_files {
            if !file.exists() {
                return Err(MergeError::io(
                    file,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "partition file missing"),
                )
                .into());
            }
        }
        std::fs::create_dir_all(&paths.output_dir)
            .map_err(|e| SentinelError::io(&paths.output_dir, e))?;

        let merge = &self.config.merge;
        let request = MergeRequest {
            inputs: partition_files.clone(),
            output: paths.output_dir.join(format!("{}.tif", group.stem)),
            target_crs: merge.target_crs.clone(),
            resolution: merge.resolution,
            nodata: merge.nodata,
            boundary_mask: merge.boundary_mask.clone(),
        };

        let toolkit = Arc::clone(&self.toolkit);
        let (output, bounds) = tokio::task::spawn_blocking(move || {
            let output: MergeOutput = toolkit.merge(&request)?;
            let bounds = toolkit.bounds(&output.artifact)?;
            Ok::<_, MergeError>((output, bounds))
        })
        .await
        .map_err(|e| SentinelError::io(&paths.output_dir, std::io::Error::other(e)))??;

        let sidecar = self.sidecar_path(&group.stem);
        let (sidecar, geocat_id) = if sidecar.exists() {
            let geocat_id = MetadataSidecar::read(&sidecar)
                .ok()
                .map(|m| m.geocat_id)
                .filter(|g| !g.is_empty());
            (Some(sidecar), geocat_id)
        } else {
            let geocat_id = self
                .config
                .product(&group.product)
                .map(|p| p.geocat_id.clone())
                .filter(|g| !g.is_empty());
            (None, geocat_id)
        };

        info!(stem = %group.stem, artifact = %output.artifact.display(), "Group merged");
        Ok(ReadyGroup {
            group,
            item_id,
            acquired_at,
            artifact: output.artifact,
            bounds,
            sidecar,
            geocat_id,
            reports,
            partition_files,
            intermediates: output.intermediates,
        })
    }

    /// Ledger cleanup for a published group: history, product status and
    /// local files.
    pub async fn finalize(&self, ready: &ReadyGroup) -> Result<()> {
        let records: Vec<_> = ready.reports.iter().map(history_record).collect();
        self.ledger
            .move_to_history(&ready.group.job_ids(), &records)?;
        if !self.ledger.mark_product_complete(&ready.group.product)? {
            debug!(product = %ready.group.product, "Product was not marked running");
        }

        let destination = &self.config.engine.destination;
        for row in &ready.group.rows {
            if let Err(err) = self.jobs.delete_export(destination, &row.filename).await {
                warn!(filename = %row.filename, "Failed to delete remote export: {}", err);
            }
        }
        for file in ready.partition_files.iter().chain(&ready.intermediates) {
            remove_if_present(file);
        }
        info!(stem = %ready.group.stem, "Export group finalized");
        Ok(())
    }
}

fn remove_if_present(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "Failed to remove: {}", e),
    }
}
