//! eoflow Sentinel - run orchestration for derived raster products
//!
//! One run walks these stages, each owned by a module:
//!
//! - [`readiness`]: is every date in a collection window usable?
//! - [`export`]: submit a product as four quadrant export jobs
//! - [`reconcile`]: merge finished quadrants into one raster
//! - [`driver`]: ties the stages together and publishes the results
//!
//! Remote services are reached through traits ([`eoflow_engine::ComputeEngine`],
//! [`eoflow_publish::CatalogApi`], [`RasterToolkit`]) so a run can be driven
//! against in-memory fakes.

pub mod driver;
pub mod error;
pub mod export;
pub mod history;
pub mod raster;
pub mod readiness;
pub mod reconcile;

pub use driver::{Pipeline, PipelineOptions, PipelineServices, RunReport};
pub use error::{MergeError, Result, SentinelError};
pub use export::{ExportCoordinator, ExportGroup, MetadataSidecar};
pub use history::history_record;
pub use raster::{GdalToolkit, MergeOutput, MergeRequest, RasterToolkit};
pub use readiness::{ReadinessGate, SceneRange, WindowReadiness};
pub use reconcile::{
    CompletionReconciler, FailedGroup, PartitionGroup, ReadyGroup, ReconcileOutcome,
};
