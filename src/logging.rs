//! Logging setup.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Settings;

/// Console logging to stderr, plus a daily log file under `<data_dir>/logs`
/// when `log_to_file` is set. `RUST_LOG` wins over the configured level.
///
/// The returned guard flushes the file writer on drop; hold it until exit.
pub fn setup_logging(settings: &Settings, data_dir: &Path) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("anicat={}", settings.log_level)));

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(true);

    let mut guard = None;
    let file = if settings.log_to_file {
        let logs = data_dir.join("logs");
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("anicat")
            .filename_suffix("log")
            .max_log_files(7)
            .build(&logs)
            .with_context(|| format!("failed to open log directory {}", logs.display()))?;
        let (writer, worker) = tracing_appender::non_blocking(appender);
        guard = Some(worker);
        Some(fmt::layer().with_writer(writer).with_ansi(false))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .try_init()
        .context("failed to install log subscriber")?;
    Ok(guard)
}
