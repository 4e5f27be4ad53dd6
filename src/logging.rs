//! Diagnostic logging for the `crosscontext` binary.
//!
//! Diagnostics never share a stream with results: `query` and `audit` print
//! JSON on stdout and `serve` answers requests there, so every layer here
//! writes to stderr or to the rotated file under `logs/`. The audit trail is
//! separate and is never routed through `tracing`.
//!
//! `RUST_LOG` overrides the default filter in both modes.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// File name prefix of the rotated log files.
pub const LOG_FILE_NAME: &str = "crosscontext.log";

/// Filter for the long-running `serve` mode.
const SERVE_FILTER: &str = "info";

/// Filter for one-shot commands; withheld-record notices stay quiet.
const CLI_FILTER: &str = "warn";

/// Keeps the file writer alive; dropping it flushes buffered lines.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

fn filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Logging for `serve`: JSON lines to `{logs_dir}/crosscontext.log.YYYY-MM-DD`
/// plus readable lines on stderr.
///
/// # Errors
///
/// Returns an error if `logs_dir` cannot be created or a subscriber is
/// already installed in this process.
pub fn init_production(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir).map_err(|e| {
        anyhow::anyhow!(
            "failed to create logs directory {}: {e}",
            logs_dir.display()
        )
    })?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, LOG_FILE_NAME));

    tracing_subscriber::registry()
        .with(filter_or(SERVE_FILTER))
        .with(tracing_subscriber::fmt::layer().json().with_writer(file_writer))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;

    Ok(LoggingGuard { _guard: guard })
}

/// Logging for `query` and `audit`: stderr only, warnings and above.
///
/// Does nothing if a subscriber is already installed.
pub fn init_cli() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_or(CLI_FILTER))
        .with_writer(std::io::stderr)
        .try_init();
}
