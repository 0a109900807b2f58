//! Global tracing subscriber for the `shepherd` binary.
//!
//! Output goes to the systemd journal when one is reachable, else to
//! `shepherd.log` in the configured log directory, rotated daily.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the filter directives, e.g. `shepherd=debug`.
pub const LOG_ENV: &str = "SHEPHERD_LOG";

const LOG_FILE: &str = "shepherd.log";

// Dropping the guard stops the background writer.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber. Fails if one is already installed.
pub fn init(log_dir: &Path) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(journald) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(filter())
                .with(journald)
                .try_init()?;
            tracing::debug!("Writing logs to the journal");
            return Ok(());
        }
    }

    init_file(log_dir)
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_file(log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = FILE_GUARD.set(guard);

    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()?;

    tracing::debug!("Writing logs to {}", log_dir.join(LOG_FILE).display());
    Ok(())
}
