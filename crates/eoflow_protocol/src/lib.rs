//! Shared vocabulary for the eoflow orchestrator.
//!
//! Everything the other crates agree on lives here: job and readiness
//! states, the pipeline configuration and run environment, the filename and
//! title rules that join work across runs, and canonical defaults.

pub mod config;
pub mod defaults;
pub mod error;
pub mod naming;
pub mod paths;
pub mod types;

pub use config::{
    CatalogConfig, CollectionConfig, Credentials, EngineConfig, MergeConfig, PathsConfig,
    PipelineConfig, ProcessorConfig, ProductConfig, RetryConfig, RunEnvironment,
};
pub use error::{ConfigError, NamingError};
pub use types::{BoundingBox, EnvironmentKind, JobId, JobState, ProductRunStatus, ReadinessStatus};
