//! Logging setup
//!
//! One subscriber per process: a stderr layer filtered by verbosity, plus an
//! optional file layer taken from `[logging] file`. File output goes through a
//! background writer thread so workers never block on disk.

use crate::config::LoggingConfig;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter directives for a verbosity level
///
/// `RUST_LOG`, when set, takes precedence over the flags.
pub fn filter_for(verbose: u8, quiet: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    if quiet {
        return EnvFilter::new("error");
    }

    match verbose {
        0 => EnvFilter::new("paper_harvest=info,warn"),
        1 => EnvFilter::new("paper_harvest=debug,info"),
        2 => EnvFilter::new("paper_harvest=trace,debug"),
        _ => EnvFilter::new("trace"),
    }
}

/// Opens a non-blocking, append-mode writer for `path`
///
/// Buffered lines are flushed when the returned guard is dropped.
pub fn file_writer(path: &Path) -> std::io::Result<(NonBlocking, WorkerGuard)> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path.file_name().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("log file path has no file name: {}", path.display()),
        )
    })?;

    std::fs::create_dir_all(dir)?;
    Ok(non_blocking(rolling::never(dir, file_name)))
}

/// Installs the global tracing subscriber
///
/// The returned guard must be held for as long as the process logs to a
/// file; dropping it flushes and stops the writer thread.
///
/// # Errors
///
/// Fails if the log file directory cannot be created.
pub fn init_logging(
    verbose: u8,
    quiet: bool,
    config: &LoggingConfig,
) -> std::io::Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let (writer, guard) = file_writer(Path::new(path))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);

    tracing_subscriber::registry()
        .with(filter_for(verbose, quiet))
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}
