//! Logging setup for the patchkit binary and embedders.
//!
//! Writes to a log file (truncated at session start) and to stderr, with
//! local-time timestamps. The level is configurable via `RUST_LOG` and
//! defaults to `info`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use time::format_description::well_known::Rfc3339;
use time::UtcOffset;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping this guard will flush and close the log file writer.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
    path: PathBuf,
}

impl LoggingGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Creates `log_dir` and truncates `log_dir/log_file`.
pub fn prepare_log_file(log_dir: &Path, log_file: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join(log_file);
    fs::write(&log_path, "")?;
    Ok(log_path)
}

/// Installs the global subscriber.
///
/// `console` adds a stderr layer next to the file layer. Fails if the log
/// file cannot be prepared or a global subscriber is already set.
pub fn init_logging(log_dir: &Path, log_file: &str, console: bool) -> io::Result<LoggingGuard> {
    let path = prepare_log_file(log_dir, log_file)?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_timer(local_timer())
        .with_target(true);

    let console_layer = console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_timer(local_timer())
            .with_target(false)
            .compact()
    });

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
        path,
    })
}

/// Local-offset RFC 3339 timestamps, falling back to UTC when the local
/// offset cannot be determined.
fn local_timer() -> OffsetTime<Rfc3339> {
    OffsetTime::local_rfc_3339().unwrap_or_else(|_| OffsetTime::new(UtcOffset::UTC, Rfc3339))
}
