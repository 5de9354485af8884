use crate::error::{Error, Result};
use std::path::Path;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILE_PREFIX: &str = "oads-fetch";

/// Keeps the file writer alive; dropping it flushes buffered lines.
#[allow(dead_code)]
pub struct LoggerGuard(WorkerGuard);

fn env_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .parse_lossy(std::env::var("RUST_LOG").unwrap_or_default())
}

/// Installs the global subscriber: console output, plus a daily-rotated file
/// in `log_dir` when given. `RUST_LOG` overrides `level`.
pub fn init(level: LevelFilter, log_dir: Option<&Path>) -> Result<Option<LoggerGuard>> {
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter(level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix("log")
                .build(dir)
                .map_err(|e| Error::Config(format!("cannot log to {}: {e}", dir.display())))?;
            let (writer, guard) = NonBlocking::new(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(env_filter(level));
            (Some(layer), Some(LoggerGuard(guard)))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialised: {e}")))?;
    Ok(guard)
}

pub fn level(debug: bool) -> LevelFilter {
    if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    }
}
