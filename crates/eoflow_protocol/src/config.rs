//! Pipeline configuration loaded from a TOML profile.
//!
//! A profile (`dev`, `int`, `prod`, ...) describes where ledgers live, how to
//! reach the engine and the catalog, and which products to build from which
//! upstream collections. Secrets never live in the file: the profile names
//! the environment variables holding them, and `RunEnvironment::resolve`
//! reads them once at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::defaults::*;
use crate::error::ConfigError;
use crate::types::{BoundingBox, EnvironmentKind};

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub environment: EnvironmentConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    pub engine: EngineConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    /// Export region in engine coordinates (lon/lat degrees).
    #[serde(default = "default_region")]
    pub region: BoundingBox,

    #[serde(default)]
    pub processor: ProcessorConfig,

    #[serde(default)]
    pub collections: Vec<CollectionConfig>,

    #[serde(default)]
    pub products: Vec<ProductConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub kind: EnvironmentKind,

    /// Variable holding the catalog user name
    #[serde(default = "default_catalog_user_env")]
    pub catalog_user_env: String,

    /// Variable holding the catalog password
    #[serde(default = "default_catalog_password_env")]
    pub catalog_password_env: String,

    /// Variable holding the engine bearer token, if the engine needs one
    #[serde(default)]
    pub engine_token_env: Option<String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            kind: EnvironmentKind::default(),
            catalog_user_env: default_catalog_user_env(),
            catalog_password_env: default_catalog_password_env(),
            engine_token_env: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Ledger files and the run lock
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Metadata sidecars and merge scratch files
    #[serde(default = "default_processing_dir")]
    pub processing_dir: PathBuf,

    /// Where the engine delivers partition rasters
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,

    /// Merged artifacts ready for publishing
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            processing_dir: default_processing_dir(),
            export_dir: default_export_dir(),
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the engine gateway
    pub base_url: String,

    /// Storage location the engine writes exports to
    #[serde(default = "default_destination")]
    pub destination: String,

    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_scheme")]
    pub scheme: String,

    #[serde(default = "default_catalog_host")]
    pub host: String,

    #[serde(default = "default_catalog_api_prefix")]
    pub api_prefix: String,

    #[serde(default = "default_collection_prefix")]
    pub collection_prefix: String,

    #[serde(default = "default_part_size")]
    pub part_size_bytes: u64,

    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,

    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,

    /// Abort a conflicting in-progress upload instead of failing
    #[serde(default)]
    pub force_abort: bool,

    #[serde(default = "default_title_suffix_markers")]
    pub title_suffix_markers: Vec<String>,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            scheme: default_catalog_scheme(),
            host: default_catalog_host(),
            api_prefix: default_catalog_api_prefix(),
            collection_prefix: default_collection_prefix(),
            part_size_bytes: default_part_size(),
            update_interval_secs: default_update_interval(),
            timeout_secs: default_http_timeout(),
            force_abort: false,
            title_suffix_markers: default_title_suffix_markers(),
            retry: RetryConfig::default(),
        }
    }
}

impl CatalogConfig {
    /// `{scheme}://{host}{api_prefix}` with exactly one trailing slash.
    pub fn base_url(&self) -> String {
        let prefix = self.api_prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{}://{}/", self.scheme, self.host)
        } else {
            format!("{}://{}/{}/", self.scheme, self.host, prefix)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay")]
    pub delay_secs: u64,

    /// Upper bound for the delay when `backoff_factor > 1`
    #[serde(default = "default_retry_delay")]
    pub max_delay_secs: u64,

    /// 1.0 keeps the delay fixed
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            delay_secs: default_retry_delay(),
            max_delay_secs: default_retry_delay(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Vector mask the merged raster is clipped to
    #[serde(default)]
    pub boundary_mask: Option<PathBuf>,

    #[serde(default = "default_output_crs")]
    pub target_crs: String,

    #[serde(default = "default_output_epsg")]
    pub epsg: u32,

    /// Output pixel size in target CRS units
    #[serde(default = "default_resolution")]
    pub resolution: f64,

    #[serde(default = "default_nodata")]
    pub nodata: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            boundary_mask: None,
            target_crs: default_output_crs(),
            epsg: default_output_epsg(),
            resolution: default_resolution(),
            nodata: default_nodata(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Link to the processor source revision
    #[serde(default)]
    pub hash_link: String,

    #[serde(default = "default_processor_release")]
    pub release_version: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            hash_link: String::new(),
            release_version: default_processor_release(),
        }
    }
}

/// An upstream collection the readiness gate watches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub id: String,

    /// Cloud cover percentage above which a date is denylisted
    #[serde(default)]
    pub cloud_cover_threshold: Option<f64>,

    /// Delete engine assets older than this many days
    #[serde(default)]
    pub retention_days: Option<u32>,

    /// Opaque generation recipe handed to the engine
    #[serde(default)]
    pub generation: serde_json::Value,

    /// Failure-message fragments that mark a date as having no data
    #[serde(default = "default_no_data_markers")]
    pub no_data_markers: Vec<String>,

    /// Hours a SUCCEEDED generation job may stay unlisted before resubmission
    #[serde(default = "default_listing_lag_hours")]
    pub listing_lag_hours: u32,
}

impl CollectionConfig {
    /// Whether a generation failure message means the date has no data.
    pub fn is_no_data_failure(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.no_data_markers
            .iter()
            .filter(|marker| !marker.trim().is_empty())
            .any(|marker| message.contains(&marker.to_lowercase()))
    }
}

/// A downstream product built from one upstream collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConfig {
    pub name: String,

    /// Upstream collection id (must be listed in `collections`)
    pub collection: String,

    /// Days of upstream data one product run covers
    #[serde(default = "default_temporal_coverage")]
    pub temporal_coverage_days: u32,

    /// Export pixel size in metres
    #[serde(default = "default_spatial_scale")]
    pub spatial_scale: f64,

    #[serde(default)]
    pub geocat_id: String,

    /// Filename descriptor after the item id (`bands-10m`)
    #[serde(default = "default_descriptor")]
    pub descriptor: String,

    #[serde(default = "default_expected_partitions")]
    pub expected_partitions: usize,

    /// Maintain the `current` alias item for this product
    #[serde(default)]
    pub publish_current: bool,

    /// Opaque export recipe handed to the engine
    #[serde(default)]
    pub expression: serde_json::Value,
}

fn default_catalog_user_env() -> String {
    DEFAULT_CATALOG_USER_ENV.to_string()
}
fn default_catalog_password_env() -> String {
    DEFAULT_CATALOG_PASSWORD_ENV.to_string()
}
fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}
fn default_processing_dir() -> PathBuf {
    PathBuf::from("processing")
}
fn default_export_dir() -> PathBuf {
    PathBuf::from("exports")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_destination() -> String {
    "exports".to_string()
}
fn default_http_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}
fn default_catalog_scheme() -> String {
    DEFAULT_CATALOG_SCHEME.to_string()
}
fn default_catalog_host() -> String {
    DEFAULT_CATALOG_HOST.to_string()
}
fn default_catalog_api_prefix() -> String {
    DEFAULT_CATALOG_API_PREFIX.to_string()
}
fn default_collection_prefix() -> String {
    DEFAULT_COLLECTION_PREFIX.to_string()
}
fn default_part_size() -> u64 {
    DEFAULT_PART_SIZE_BYTES
}
fn default_update_interval() -> u64 {
    DEFAULT_UPLOAD_UPDATE_INTERVAL_SECS
}
fn default_title_suffix_markers() -> Vec<String> {
    DEFAULT_TITLE_SUFFIX_MARKERS
        .iter()
        .map(|m| m.to_string())
        .collect()
}
fn default_no_data_markers() -> Vec<String> {
    DEFAULT_NO_DATA_MARKERS.iter().map(|m| m.to_string()).collect()
}
fn default_listing_lag_hours() -> u32 {
    DEFAULT_LISTING_LAG_HOURS
}
fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}
fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}
fn default_backoff_factor() -> f64 {
    1.0
}
fn default_output_crs() -> String {
    DEFAULT_OUTPUT_CRS.to_string()
}
fn default_output_epsg() -> u32 {
    DEFAULT_OUTPUT_EPSG
}
fn default_resolution() -> f64 {
    10.0
}
fn default_nodata() -> f64 {
    DEFAULT_NODATA
}
fn default_region() -> BoundingBox {
    let [min_x, min_y, max_x, max_y] = DEFAULT_REGION;
    BoundingBox::new(min_x, min_y, max_x, max_y)
}
fn default_processor_release() -> String {
    DEFAULT_PROCESSOR_RELEASE.to_string()
}
fn default_temporal_coverage() -> u32 {
    1
}
fn default_spatial_scale() -> f64 {
    10.0
}
fn default_descriptor() -> String {
    DEFAULT_EXPORT_DESCRIPTOR.to_string()
}
fn default_expected_partitions() -> usize {
    EXPECTED_PARTITIONS
}

impl PipelineConfig {
    /// Load and validate a profile.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.base_url.trim().is_empty() {
            return Err(ConfigError::invalid("engine.base_url must not be empty"));
        }
        if !self.region.is_valid() {
            return Err(ConfigError::invalid(format!(
                "region is not a valid rectangle: {:?}",
                self.region
            )));
        }
        if self.catalog.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("catalog.retry.max_attempts must be >= 1"));
        }
        if self.catalog.part_size_bytes == 0 {
            return Err(ConfigError::invalid("catalog.part_size_bytes must be > 0"));
        }

        let mut seen = std::collections::BTreeSet::new();
        for product in &self.products {
            if !seen.insert(product.name.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "product '{}' is listed twice",
                    product.name
                )));
            }
            if self.collection(&product.collection).is_none() {
                return Err(ConfigError::invalid(format!(
                    "product '{}' depends on unknown collection '{}'",
                    product.name, product.collection
                )));
            }
            if product.temporal_coverage_days == 0 {
                return Err(ConfigError::invalid(format!(
                    "product '{}' has temporal_coverage_days = 0",
                    product.name
                )));
            }
            if product.expected_partitions != EXPECTED_PARTITIONS {
                return Err(ConfigError::invalid(format!(
                    "product '{}' expects {} partitions but exports are split into {}",
                    product.name, product.expected_partitions, EXPECTED_PARTITIONS
                )));
            }
        }
        Ok(())
    }

    pub fn collection(&self, id: &str) -> Option<&CollectionConfig> {
        self.collections.iter().find(|c| c.id == id)
    }

    pub fn product(&self, name: &str) -> Option<&ProductConfig> {
        self.products.iter().find(|p| p.name == name)
    }

    /// Find the product whose export stems start with `{name}_mosaic_`.
    pub fn product_for_stem(&self, stem: &str) -> Option<&ProductConfig> {
        let lowered = stem.to_lowercase();
        self.products
            .iter()
            .filter(|p| lowered.starts_with(&format!("{}_mosaic_", p.name.to_lowercase())))
            .max_by_key(|p| p.name.len())
    }

    /// Lookback window per upstream collection: the widest temporal coverage
    /// among the products that consume it.
    pub fn collection_windows(&self) -> BTreeMap<String, u32> {
        let mut windows = BTreeMap::new();
        for product in &self.products {
            let entry = windows.entry(product.collection.clone()).or_insert(0);
            *entry = (*entry).max(product.temporal_coverage_days);
        }
        windows
    }
}

/// Catalog basic-auth credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything about the current run that is not in the profile itself.
///
/// Built once in `main` and passed down explicitly.
#[derive(Debug, Clone)]
pub struct RunEnvironment {
    pub kind: EnvironmentKind,
    pub catalog_credentials: Option<Credentials>,
    pub engine_token: Option<String>,
    pub processor: ProcessorConfig,
}

impl RunEnvironment {
    /// Resolve secrets through `lookup` (normally `std::env::var`).
    pub fn resolve<F>(config: &PipelineConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = &config.environment;
        let catalog_credentials = match (
            lookup(&env.catalog_user_env),
            lookup(&env.catalog_password_env),
        ) {
            (Some(user), Some(password)) => Some(Credentials { user, password }),
            _ => None,
        };
        let engine_token = env.engine_token_env.as_deref().and_then(&lookup);

        Self {
            kind: env.kind,
            catalog_credentials,
            engine_token,
            processor: config.processor.clone(),
        }
    }

    pub fn from_process_env(config: &PipelineConfig) -> Self {
        Self::resolve(config, |name| std::env::var(name).ok())
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs.max(self.delay_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[environment]
kind = "prod"

[engine]
base_url = "https://engine.example/api"

[catalog]
part_size_bytes = 5242880

[catalog.retry]
max_attempts = 5
delay_secs = 1

[[collections]]
id = "projects/eo/assets/S2_SR_HARMONIZED_SWISS"
cloud_cover_threshold = 80.0

[[products]]
name = "swisseo_s2-sr_v100"
collection = "projects/eo/assets/S2_SR_HARMONIZED_SWISS"
temporal_coverage_days = 3
publish_current = true

[[products]]
name = "swisseo_ndvi-z_v100"
collection = "projects/eo/assets/S2_SR_HARMONIZED_SWISS"
temporal_coverage_days = 5
"#;

    #[test]
    fn test_parse_sample_profile() {
        let config = PipelineConfig::from_toml_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.environment.kind, EnvironmentKind::Prod);
        assert_eq!(config.catalog.host, DEFAULT_CATALOG_HOST);
        assert_eq!(config.catalog.part_size_bytes, 5 * 1024 * 1024);
        assert_eq!(config.catalog.retry.max_attempts, 5);
        assert_eq!(config.products[0].expected_partitions, 4);
        assert_eq!(config.products[0].descriptor, "bands-10m");
        assert!(config.products[0].publish_current);
    }

    #[test]
    fn test_collection_windows_take_max_coverage() {
        let config = PipelineConfig::from_toml_str(SAMPLE).unwrap();
        let windows = config.collection_windows();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows["projects/eo/assets/S2_SR_HARMONIZED_SWISS"], 5);
    }

    #[test]
    fn test_no_data_markers_match_case_insensitively() {
        let config = PipelineConfig::from_toml_str(SAMPLE).unwrap();
        let collection = &config.collections[0];
        assert_eq!(collection.listing_lag_hours, DEFAULT_LISTING_LAG_HOURS);
        assert!(collection.is_no_data_failure("Image.reduce: no valid pixels in region"));
        assert!(!collection.is_no_data_failure("Computation timed out."));
        assert!(!collection.is_no_data_failure(""));
    }

    #[test]
    fn test_unknown_collection_rejected() {
        let broken = SAMPLE.replace(
            "collection = \"projects/eo/assets/S2_SR_HARMONIZED_SWISS\"\ntemporal_coverage_days = 5",
            "collection = \"L8\"\ntemporal_coverage_days = 5",
        );
        let config = PipelineConfig::from_toml_str(&broken).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown collection 'L8'"));
    }

    #[test]
    fn test_base_url_normalized() {
        let mut catalog = CatalogConfig::default();
        assert_eq!(catalog.base_url(), "https://data.geo.admin.ch/api/stac/v0.9/");
        catalog.api_prefix = "api/stac/v1".to_string();
        catalog.scheme = "http".to_string();
        catalog.host = "localhost:8080".to_string();
        assert_eq!(catalog.base_url(), "http://localhost:8080/api/stac/v1/");
    }

    #[test]
    fn test_product_for_stem_prefers_longest_name() {
        let config = PipelineConfig::from_toml_str(SAMPLE).unwrap();
        let product = config
            .product_for_stem("swisseo_s2-sr_v100_mosaic_2024-01-10t235959_bands-10m")
            .unwrap();
        assert_eq!(product.name, "swisseo_s2-sr_v100");
        assert!(config.product_for_stem("unknown_mosaic_x").is_none());
    }

    #[test]
    fn test_run_environment_resolves_secrets() {
        let config = PipelineConfig::from_toml_str(SAMPLE).unwrap();
        let env = RunEnvironment::resolve(&config, |name| match name {
            DEFAULT_CATALOG_USER_ENV => Some("svc".to_string()),
            DEFAULT_CATALOG_PASSWORD_ENV => Some("secret".to_string()),
            _ => None,
        });
        let creds = env.catalog_credentials.unwrap();
        assert_eq!(creds.user, "svc");
        assert!(!format!("{:?}", creds).contains("secret"));
        assert_eq!(env.kind, EnvironmentKind::Prod);

        let env = RunEnvironment::resolve(&config, |_| None);
        assert!(env.catalog_credentials.is_none());
    }

    #[test]
    fn test_load_reports_path() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("dev.toml");
        std::fs::write(&path, "not = [valid").unwrap();
        let err = PipelineConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
        assert!(err.to_string().contains("dev.toml"));
    }
}
