//! Canonical default values shared across the orchestrator crates.

pub const DEFAULT_PROFILE: &str = "dev";
pub const DEFAULT_CONFIG_DIR: &str = "configs";

// Ledger file names, relative to the state directory.
pub const RUNNING_LEDGER_FILE: &str = "running_tasks.csv";
pub const HISTORY_LEDGER_FILE: &str = "completed_tasks.csv";
pub const PRODUCT_STATUS_FILE: &str = "last_updates.csv";
pub const DENYLIST_FILE: &str = "empty_assets.csv";
pub const RUN_LOCK_FILE: &str = "eoflow.lock";

// Catalog service.
pub const DEFAULT_CATALOG_SCHEME: &str = "https";
pub const DEFAULT_CATALOG_HOST: &str = "data.geo.admin.ch";
pub const DEFAULT_CATALOG_API_PREFIX: &str = "/api/stac/v0.9/";
pub const DEFAULT_COLLECTION_PREFIX: &str = "ch.swisstopo.";
pub const DEFAULT_CATALOG_USER_ENV: &str = "EOFLOW_CATALOG_USER";
pub const DEFAULT_CATALOG_PASSWORD_ENV: &str = "EOFLOW_CATALOG_PASSWORD";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_UPLOAD_UPDATE_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_PART_SIZE_BYTES: u64 = 250 * 1024 * 1024;
pub const MAX_UPLOAD_PARTS: u64 = 100;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 20;
pub const DEFAULT_TITLE_SUFFIX_MARKERS: &[&str] = &["warnregions"];
pub const UPLOAD_IN_PROGRESS_MARKER: &str = "Upload already in progress";
pub const CURRENT_ALIAS_TOKEN: &str = "current";

// Export layout.
pub const EXPECTED_PARTITIONS: usize = 4;
pub const PARTITION_TAG: &str = "quadrant";
pub const ITEM_TIME_SUFFIX: &str = "t235959";
pub const DEFAULT_EXPORT_DESCRIPTOR: &str = "bands-10m";
pub const DEFAULT_MAX_PIXELS: u64 = 1_000_000_000_000;

// Raster output.
pub const DEFAULT_OUTPUT_CRS: &str = "EPSG:2056";
pub const DEFAULT_OUTPUT_EPSG: u32 = 2056;
pub const DEFAULT_NODATA: f64 = 9999.0;
pub const DEFAULT_REGION: [f64; 4] = [5.78, 45.70, 10.69, 47.89];

// Readiness.
pub const REASON_NO_CANDIDATE_SCENE: &str = "No candidate scene";
pub const REASON_CLOUDY: &str = "cloudy";
/// Generation failures whose message contains one of these mean the date has
/// no usable pixels and is denylisted. Other failures are retried.
pub const DEFAULT_NO_DATA_MARKERS: &[&str] = &["No valid pixels", "No candidate scene", "empty image"];
/// A SUCCEEDED generation job not listed after this long is resubmitted.
pub const DEFAULT_LISTING_LAG_HOURS: u32 = 24;
pub const DEFAULT_PROCESSOR_RELEASE: &str = "0.0.0";
