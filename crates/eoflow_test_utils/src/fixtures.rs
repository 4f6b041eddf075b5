//! Sample profile and a ready-wired pipeline over the fakes.

use chrono::NaiveDate;
use eoflow_protocol::{
    EnvironmentKind, PathsConfig, PipelineConfig, ProcessorConfig, RunEnvironment,
};
use eoflow_sentinel::{Pipeline, PipelineOptions, PipelineServices};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use crate::catalog::InMemoryCatalog;
use crate::engine::FakeEngine;
use crate::raster::FakeRasterToolkit;

pub const SAMPLE_COLLECTION: &str = "projects/eo/assets/S2_SR";
pub const SAMPLE_PRODUCT: &str = "swisseo_s2-sr_v100";

const SAMPLE_PROFILE: &str = r#"
[engine]
base_url = "https://engine.invalid/api"
destination = "exports"

[catalog]
host = "catalog.invalid"
part_size_bytes = 16

[catalog.retry]
max_attempts = 3
delay_secs = 0

[processor]
hash_link = "https://example.org/eoflow/commit/0000000"
release_version = "0.1.0"

[[collections]]
id = "projects/eo/assets/S2_SR"
cloud_cover_threshold = 80.0

[[products]]
name = "swisseo_s2-sr_v100"
collection = "projects/eo/assets/S2_SR"
temporal_coverage_days = 3
geocat_id = "7ae5cd5b-e872-4719-92c0-dc2f86c4d471"
publish_current = true
"#;

/// Sample profile with every directory under `root`.
pub fn sample_config(root: &Path) -> PipelineConfig {
    let mut config =
        PipelineConfig::from_toml_str(SAMPLE_PROFILE).expect("sample profile parses");
    config.paths = PathsConfig {
        state_dir: root.join("state"),
        processing_dir: root.join("processing"),
        export_dir: root.join("exports"),
        output_dir: root.join("output"),
    };
    config
}

pub fn sample_environment() -> RunEnvironment {
    RunEnvironment {
        kind: EnvironmentKind::Dev,
        catalog_credentials: None,
        engine_token: None,
        processor: ProcessorConfig {
            hash_link: "https://example.org/eoflow/commit/0000000".to_string(),
            release_version: "0.1.0".to_string(),
        },
    }
}

pub fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

/// Temp directory, sample profile and the three fakes.
///
/// Completed export jobs stay on the fake engine until the reconciler
/// fetches them into the profile's export directory.
pub struct TestHarness {
    pub dir: TempDir,
    pub config: PipelineConfig,
    pub engine: Arc<FakeEngine>,
    pub catalog: Arc<InMemoryCatalog>,
    pub toolkit: Arc<FakeRasterToolkit>,
}

impl TestHarness {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let config = sample_config(dir.path());
        let engine = Arc::new(FakeEngine::new());
        Self {
            dir,
            config,
            engine,
            catalog: Arc::new(InMemoryCatalog::new()),
            toolkit: Arc::new(FakeRasterToolkit::new()),
        }
    }

    pub fn services(&self) -> PipelineServices {
        PipelineServices {
            engine: self.engine.clone(),
            catalog: self.catalog.clone(),
            toolkit: self.toolkit.clone(),
        }
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline_with(PipelineOptions::default())
    }

    pub fn pipeline_with(&self, options: PipelineOptions) -> Pipeline {
        Pipeline::new(
            self.config.clone(),
            sample_environment(),
            self.services(),
            options,
        )
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
