//! Structured logging setup using `tracing-subscriber` and `tracing-appender`.
//!
//! - [`init_cli`]: human-readable stderr output for interactive runs.
//! - [`init_file`]: JSON file layer (daily rotation) plus stderr, for
//!   unattended builds whose logs are collected afterwards.
//!
//! Both honour `RUST_LOG` and default to `info`.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// File name prefix of rotated log files.
pub const LOG_FILE: &str = "confine.log";

/// Keeps the non-blocking file writer alive. Dropping it flushes
/// pending entries.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Log JSON to `{logs_dir}/confine.log.YYYY-MM-DD` and text to stderr.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created.
pub fn init_file(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, LOG_FILE));

    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("a global subscriber is already installed")?;

    Ok(LoggingGuard { _guard: guard })
}

/// Log text to stderr only.
pub fn init_cli() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
}
