// file: src/logging/logger.rs
// version: 2.0.0
// guid: j0k1l2m3-n4o5-6789-0123-456789jklmno

//! Logger initialization and configuration

use crate::error::SetupError;
use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Instrument;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging options resolved from the command line and environment
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub verbose: bool,
    pub quiet: bool,
    pub no_color: bool,
    /// `SETUP_LOG_LEVEL`, used when neither verbose nor quiet is set
    pub level: Option<String>,
    /// Directory for the run's log file; console only when `None` or unwritable
    pub log_dir: Option<PathBuf>,
}

/// Resolve the filter directive for the given options
pub fn filter_directive(options: &LogOptions) -> String {
    if options.quiet {
        return "error".to_string();
    }
    if options.verbose {
        return "debug".to_string();
    }
    match options.level.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some(level @ ("trace" | "debug" | "info" | "warn" | "error")) => level.to_string(),
        Some("warning") => "warn".to_string(),
        _ => "info".to_string(),
    }
}

/// Initialize the logging system.
///
/// Logs go to stderr and, when possible, to `<log_dir>/setup-<timestamp>.log`.
/// Returns the log file path when a file layer was installed.
pub fn init_logger(options: &LogOptions) -> Result<Option<PathBuf>> {
    let filter = EnvFilter::try_new(filter_directive(options))
        .map_err(|e| SetupError::config(format!("Invalid log level: {}", e)))?;

    let (file_layer, log_file, file_error) = match &options.log_dir {
        Some(dir) => match open_log_file(dir) {
            Ok((file, path)) => (
                Some(
                    fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                ),
                Some(path),
                None,
            ),
            Err(e) => (None, None, Some(e)),
        },
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(!options.no_color)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(file_layer)
        .try_init()
        .map_err(|e| SetupError::config(format!("Failed to initialize logger: {}", e)))?;

    if let Some(e) = file_error {
        tracing::warn!("File logging disabled: {}", e);
    }
    if let Some(path) = &log_file {
        tracing::debug!("Logging to {}", path.display());
    }

    Ok(log_file)
}

fn open_log_file(dir: &Path) -> std::io::Result<(fs::File, PathBuf)> {
    fs::create_dir_all(dir)?;
    let name = format!(
        "setup-{}.log",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let path = dir.join(name);
    let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((file, path))
}

/// Run a future inside an `operation` span carrying `name`
pub async fn with_async_operation_span<F, Fut, R>(operation: &str, f: F) -> R
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = R>,
{
    let span = tracing::info_span!("operation", name = operation);
    async move { f().await }.instrument(span).await
}
