//! Logging bootstrap for eoflow binaries.
//!
//! Installs a tracing registry with two layers: a daily-rotated log file under
//! `~/.eoflow/logs` and stderr. Only the newest `retain_files` day files are
//! kept. `RUST_LOG` overrides the default filter for both layers.
//!
//! The returned [`LogGuard`] flushes the non-blocking file writer on drop;
//! keep it alive for the whole run.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str =
    "eoflow=info,eoflow_sentinel=info,eoflow_publish=info,eoflow_engine=info,eoflow_ledger=info";
pub const DEFAULT_RETAIN_FILES: usize = 30;
const LOG_SUFFIX: &str = "log";

/// Logging configuration shared by eoflow binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Mirror debug output to stderr
    pub verbose: bool,
    /// Write log files here instead of `~/.eoflow/logs`
    pub log_dir: Option<PathBuf>,
    /// Day files kept by the appender
    pub retain_files: usize,
}

impl<'a> LogConfig<'a> {
    pub fn new(app_name: &'a str) -> Self {
        Self {
            app_name,
            verbose: false,
            log_dir: None,
            retain_files: DEFAULT_RETAIN_FILES,
        }
    }
}

/// Flushes buffered log lines when dropped.
pub struct LogGuard {
    _worker: WorkerGuard,
    pub log_dir: PathBuf,
}

/// Initialize tracing with a daily file appender and stderr output.
pub fn init_logging(config: LogConfig<'_>) -> Result<LogGuard> {
    let log_dir = match config.log_dir {
        Some(dir) => dir,
        None => logs_dir()?,
    };
    let appender = daily_appender(&log_dir, config.app_name, config.retain_files)?;
    let (file_writer, worker) = tracing_appender::non_blocking(appender);

    let file_filter = filter_or(DEFAULT_LOG_FILTER.to_string());
    let console_filter = if config.verbose {
        filter_or(DEFAULT_LOG_FILTER.replace("=info", "=debug"))
    } else {
        filter_or(DEFAULT_LOG_FILTER.to_string())
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_filter),
        )
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(LogGuard {
        _worker: worker,
        log_dir,
    })
}

/// `{dir}/{app}.{YYYY-MM-DD}.log`, rotated daily, newest `retain_files` kept.
fn daily_appender(dir: &Path, app_name: &str, retain_files: usize) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(sanitize_name(app_name))
        .filename_suffix(LOG_SUFFIX)
        .max_log_files(retain_files.max(1))
        .build(dir)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))
}

fn filter_or(default: String) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// `$EOFLOW_HOME`, or `~/.eoflow`.
pub fn eoflow_home() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var("EOFLOW_HOME") {
        return Ok(PathBuf::from(override_path));
    }
    dirs::home_dir()
        .map(|home| home.join(".eoflow"))
        .context("Could not determine home directory; set EOFLOW_HOME")
}

pub fn logs_dir() -> Result<PathBuf> {
    Ok(eoflow_home()?.join("logs"))
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' { ch } else { '_' })
        .collect()
}
