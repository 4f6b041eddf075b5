//! Pipeline Driver: one scheduled run, end to end.
//!
//! ```text
//! run lock -> readiness windows -> exports -> reconcile -> publish -> cleanup
//! ```
//!
//! Every unit of work (a collection window, a product, an artifact) fails on
//! its own: the failure is logged, counted in the [`RunReport`] and the run
//! moves on. Only the run lock is fatal.

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use eoflow_engine::{ComputeEngine, JobClient};
use eoflow_ledger::{LedgerStore, RunLock};
use eoflow_protocol::paths::run_lock_path;
use eoflow_protocol::{PipelineConfig, ProductConfig, RunEnvironment};
use eoflow_publish::{
    Artifact, CancellationToken, CatalogApi, PublishSettings, Publisher, RetryPolicy,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::export::ExportCoordinator;
use crate::raster::RasterToolkit;
use crate::readiness::{ReadinessGate, WindowReadiness};
use crate::reconcile::{CompletionReconciler, ReadyGroup};

/// Remote services and local tooling a run talks to.
#[derive(Clone)]
pub struct PipelineServices {
    pub engine: Arc<dyn ComputeEngine>,
    pub catalog: Arc<dyn CatalogApi>,
    pub toolkit: Arc<dyn RasterToolkit>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Abort conflicting upload sessions instead of failing the publish
    pub force_abort: bool,
    pub cancel: CancellationToken,
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub date: Option<NaiveDate>,
    pub windows_ready: usize,
    pub windows_not_ready: usize,
    pub groups_submitted: usize,
    pub groups_pending: usize,
    pub groups_failed: usize,
    pub artifacts_published: usize,
    pub publish_failures: usize,
    failures: Vec<String>,
}

impl RunReport {
    /// Units of work that failed this run, one line each.
    pub fn failed_units(&self) -> &[String] {
        &self.failures
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, unit: String) {
        self.failures.push(unit);
    }
}

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    ledger: Arc<LedgerStore>,
    gate: ReadinessGate,
    exports: ExportCoordinator,
    reconciler: CompletionReconciler,
    publisher: Publisher,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        env: RunEnvironment,
        services: PipelineServices,
        options: PipelineOptions,
    ) -> Self {
        let config = Arc::new(config);
        let ledger = Arc::new(LedgerStore::in_dir(&config.paths.state_dir));
        let jobs = JobClient::new(services.engine);

        let mut settings = PublishSettings::from_config(&config.catalog, config.merge.epsg);
        settings.force_abort |= options.force_abort;
        let publisher = Publisher::new(
            services.catalog,
            settings,
            RetryPolicy::from_config(&config.catalog.retry),
        )
        .with_cancellation(options.cancel)
        .with_current_alias(
            config
                .products
                .iter()
                .filter(|p| p.publish_current)
                .map(|p| p.name.clone()),
        );

        Self {
            gate: ReadinessGate::new(jobs.clone(), Arc::clone(&ledger), Arc::clone(&config)),
            exports: ExportCoordinator::new(
                jobs.clone(),
                Arc::clone(&ledger),
                Arc::clone(&config),
                env.processor,
            ),
            reconciler: CompletionReconciler::new(
                jobs,
                Arc::clone(&ledger),
                Arc::clone(&config),
                services.toolkit,
            ),
            publisher,
            ledger,
            config,
        }
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    pub async fn run(&self, date: NaiveDate) -> Result<RunReport> {
        let _lock = RunLock::acquire(&run_lock_path(&self.config.paths.state_dir))
            .context("Another run holds the state directory")?;
        info!(%date, "Run started");

        let mut report = RunReport {
            date: Some(date),
            ..Default::default()
        };

        let windows = self.evaluate_windows(date, &mut report).await;
        self.submit_exports(date, &windows, &mut report).await;
        let published = self.reconcile_and_publish(&mut report).await;
        self.cleanup(date, &windows, &published, &mut report).await;

        info!(
            %date,
            windows_ready = report.windows_ready,
            groups_submitted = report.groups_submitted,
            artifacts_published = report.artifacts_published,
            failures = report.failed_units().len(),
            "Run finished"
        );
        Ok(report)
    }

    async fn evaluate_windows(
        &self,
        date: NaiveDate,
        report: &mut RunReport,
    ) -> BTreeMap<String, WindowReadiness> {
        let mut windows = BTreeMap::new();
        for (collection, lookback) in self.config.collection_windows() {
            match self.gate.evaluate_window(&collection, date, lookback).await {
                Ok(window) => {
                    if window.is_ready() {
                        report.windows_ready += 1;
                    } else {
                        report.windows_not_ready += 1;
                    }
                    windows.insert(collection, window);
                }
                Err(err) => {
                    error!(collection = %collection, "Readiness check failed: {:#}", err);
                    report.windows_not_ready += 1;
                    report.fail(format!("window {collection}: {err}"));
                }
            }
        }
        windows
    }

    async fn submit_exports(
        &self,
        date: NaiveDate,
        windows: &BTreeMap<String, WindowReadiness>,
        report: &mut RunReport,
    ) {
        for product in &self.config.products {
            let Some(window) = windows.get(&product.collection) else {
                continue;
            };
            let window = product_window(window, product, date);
            if !window.is_ready() {
                info!(
                    product = %product.name,
                    unsettled = ?window.unsettled_dates(),
                    "Window not ready, skipping export"
                );
                continue;
            }
            let Some(scenes) = window.scenes() else {
                info!(product = %product.name, "No scenes in window, skipping export");
                continue;
            };

            let outcome = match self.exports.should_export(&product.name, scenes.last) {
                Ok(false) => continue,
                Ok(true) => {
                    self.exports
                        .submit_product(product, &scenes, date, self.config.region)
                        .await
                }
                Err(err) => Err(err),
            };
            match outcome {
                Ok(_) => report.groups_submitted += 1,
                Err(err) => {
                    error!(product = %product.name, "Export failed: {}", err);
                    report.fail(format!("export {}: {err}", product.name));
                }
            }
        }
    }

    async fn reconcile_and_publish(&self, report: &mut RunReport) -> Vec<ReadyGroup> {
        let outcome = match self.reconciler.reconcile().await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("Reconcile failed: {}", err);
                report.fail(format!("reconcile: {err}"));
                return Vec::new();
            }
        };
        report.groups_pending = outcome.pending.len() + outcome.incomplete.len();
        report.groups_failed = outcome.failed.len();
        for failed in &outcome.failed {
            report.fail(format!("group {}: {}", failed.stem, failed.reason));
        }

        let mut published = Vec::new();
        for ready in outcome.ready {
            if self.publish_group(&ready, report).await {
                published.push(ready);
            }
        }
        published
    }

    /// Raster first, then the sidecar. Both must land for the group to be
    /// finalized.
    async fn publish_group(&self, ready: &ReadyGroup, report: &mut RunReport) -> bool {
        let product = &ready.group.product;
        let mut raster = Artifact::new(&ready.artifact, ready.acquired_at).with_bounds(ready.bounds);
        if let Some(geocat_id) = &ready.geocat_id {
            raster = raster.with_geocat_id(geocat_id);
        }

        let mut artifacts = vec![raster];
        if let Some(sidecar) = &ready.sidecar {
            artifacts.push(Artifact::new(sidecar, ready.acquired_at));
        }

        for artifact in &artifacts {
            if self
                .publisher
                .publish(artifact, &ready.item_id, product)
                .await
            {
                report.artifacts_published += 1;
            } else {
                report.publish_failures += 1;
                report.fail(format!("publish {}", artifact.path.display()));
                return false;
            }
        }
        true
    }

    async fn cleanup(
        &self,
        date: NaiveDate,
        windows: &BTreeMap<String, WindowReadiness>,
        published: &[ReadyGroup],
        report: &mut RunReport,
    ) {
        for ready in published {
            if let Err(err) = self.reconciler.finalize(ready).await {
                error!(stem = %ready.group.stem, "Finalize failed: {}", err);
                report.fail(format!("finalize {}: {err}", ready.group.stem));
            }
        }

        for (collection, window) in windows {
            for day in window.ready_dates() {
                if let Err(err) = self.gate.cleanup_consumed(collection, day).await {
                    warn!(collection = %collection, %day, "Gate cleanup failed: {}", err);
                }
            }
            if let Err(err) = self.gate.prune_expired(collection, date).await {
                warn!(collection = %collection, "Pruning failed: {}", err);
                report.fail(format!("prune {collection}: {err}"));
            }
        }
    }
}

/// The part of a collection window a product covers.
fn product_window(window: &WindowReadiness, product: &ProductConfig, date: NaiveDate) -> WindowReadiness {
    let span = u64::from(product.temporal_coverage_days.max(1) - 1);
    let start = date.checked_sub_days(Days::new(span)).unwrap_or(date);
    WindowReadiness {
        collection: window.collection.clone(),
        dates: window
            .dates
            .iter()
            .filter(|(day, _)| *day >= start && *day <= date)
            .copied()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eoflow_protocol::ReadinessStatus;

    #[test]
    fn test_product_window_takes_trailing_days() {
        let day = |d: u32| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        let window = WindowReadiness {
            collection: "S2".to_string(),
            dates: vec![
                (day(1), ReadinessStatus::Pending),
                (day(2), ReadinessStatus::Ready),
                (day(3), ReadinessStatus::Empty),
            ],
        };
        let product = ProductConfig {
            name: "p".to_string(),
            collection: "S2".to_string(),
            temporal_coverage_days: 2,
            ..sample_product()
        };
        let narrowed = product_window(&window, &product, day(3));
        assert_eq!(narrowed.dates.len(), 2);
        assert!(narrowed.is_ready());
        assert!(!window.is_ready());
    }

    #[test]
    fn test_report_tracks_failures() {
        let mut report = RunReport::default();
        assert!(report.is_clean());
        report.fail("publish a.tif".to_string());
        assert_eq!(report.failed_units(), ["publish a.tif".to_string()]);
    }

    fn sample_product() -> ProductConfig {
        let config = PipelineConfig::from_toml_str(
            r#"
            [engine]
            base_url = "https://engine.example/"
            destination = "exports"

            [[collections]]
            id = "S2"

            [[products]]
            name = "p"
            collection = "S2"
            temporal_coverage_days = 1
            spatial_scale = 10.0
            "#,
        )
        .unwrap();
        config.products[0].clone()
    }
}
