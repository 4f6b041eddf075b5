//! eoflow launcher
//!
//! ```text
//! eoflow [PROFILE] [DATE]
//! ```
//!
//! One scheduled run: readiness, exports, reconcile, publish, cleanup. Bad
//! arguments and bad profiles exit non-zero; failures inside the run are
//! logged and summarized, and the process still exits 0.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use eoflow_engine::HttpComputeEngine;
use eoflow_logging::{init_logging, LogConfig};
use eoflow_protocol::defaults::DEFAULT_PROFILE;
use eoflow_protocol::naming::parse_date;
use eoflow_protocol::paths::{default_config_dir, resolve_profile_path};
use eoflow_protocol::{PipelineConfig, RunEnvironment};
use eoflow_publish::{CancellationToken, HttpCatalog};
use eoflow_sentinel::{GdalToolkit, Pipeline, PipelineOptions, PipelineServices, RunReport};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "eoflow", about = "Derived raster product orchestrator", version)]
struct Cli {
    /// Config profile name (`{config_dir}/{profile}.toml`) or a path to a TOML file
    #[arg(default_value = DEFAULT_PROFILE)]
    profile: String,

    /// Processing date as YYYY-MM-DD (default: today, UTC)
    date: Option<String>,

    /// Directory holding the profiles
    #[arg(long, env = "EOFLOW_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Abort conflicting catalog upload sessions instead of failing
    #[arg(long)]
    force_abort: bool,

    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let date = match &cli.date {
        Some(raw) => match parse_date(raw) {
            Ok(date) => date,
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => Utc::now().date_naive(),
    };

    let config_dir = cli.config_dir.clone().unwrap_or_else(default_config_dir);
    let profile_path = resolve_profile_path(&config_dir, &cli.profile);
    let config = match PipelineConfig::load(&profile_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let log_config = LogConfig {
        verbose: cli.verbose,
        ..LogConfig::new("eoflow")
    };
    let _log_guard = match init_logging(log_config) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: file logging unavailable: {err:#}");
            None
        }
    };
    info!(
        profile = %profile_path.display(),
        %date,
        environment = %config.environment.kind,
        "eoflow starting"
    );

    match run(config, date, cli.force_abort) {
        Ok(report) => {
            summarize(&report);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: PipelineConfig, date: NaiveDate, force_abort: bool) -> Result<RunReport> {
    let env = RunEnvironment::from_process_env(&config);
    if env.catalog_credentials.is_none() {
        warn!("No catalog credentials in the environment, publishing anonymously");
    }

    let engine = HttpComputeEngine::new(&config.engine, env.engine_token.clone())
        .context("Failed to set up the compute engine client")?;
    let catalog = HttpCatalog::new(&config.catalog, env.catalog_credentials.clone())
        .context("Failed to set up the catalog client")?;
    let services = PipelineServices {
        engine: Arc::new(engine),
        catalog: Arc::new(catalog),
        toolkit: Arc::new(GdalToolkit::new(config.merge.epsg)),
    };

    let cancel = CancellationToken::new();
    let options = PipelineOptions {
        force_abort,
        cancel: cancel.clone(),
    };
    let pipeline = Pipeline::new(config, env, services, options);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    rt.block_on(async move {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, aborting open uploads");
                cancel.cancel();
            }
        });
        pipeline.run(date).await
    })
}

fn summarize(report: &RunReport) {
    info!(
        windows_ready = report.windows_ready,
        windows_not_ready = report.windows_not_ready,
        groups_submitted = report.groups_submitted,
        groups_pending = report.groups_pending,
        groups_failed = report.groups_failed,
        artifacts_published = report.artifacts_published,
        "Run summary"
    );
    if report.is_clean() {
        return;
    }
    warn!(
        failed = report.failed_units().len(),
        "Run finished with failures that need follow-up"
    );
    for unit in report.failed_units() {
        warn!("  {}", unit);
    }
}
