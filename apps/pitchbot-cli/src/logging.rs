//! Logging initialization and log file management.
//!
//! Every command writes a JSON log file at
//! `.pitchbot/logs/<command>/<timestamp>.log`. One-shot commands also log
//! human-readable lines to stderr; the chat UI owns the terminal, so it logs
//! to the file only.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pitchbot_core::STATE_DIR;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Maximum age of log files before cleanup, in days.
const LOG_RETENTION_DAYS: u64 = 3;

/// Default filter for the log file when `RUST_LOG` is unset.
const FILE_DEFAULT_FILTER: &str = "info";

/// Default filter for stderr when `RUST_LOG` is unset.
const STDERR_DEFAULT_FILTER: &str = "warn";

/// Where a command's logs go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogTarget {
    /// Subdirectory under `.pitchbot/logs/`.
    pub command: &'static str,
    /// Also log to stderr.
    pub stderr: bool,
}

/// Initialize the global tracing subscriber.
///
/// Returns a [`WorkerGuard`] that must be held for the lifetime of the
/// program to ensure all buffered logs are flushed.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or the
/// log file cannot be opened.
pub fn init_tracing(workdir: &Path, target: LogTarget) -> Result<WorkerGuard> {
    let (subscriber, guard) = build_tracing(workdir, target)?;
    subscriber.init();
    Ok(guard)
}

/// Build the tracing subscriber layers without registering globally.
fn build_tracing(
    workdir: &Path,
    target: LogTarget,
) -> Result<(impl tracing::Subscriber + Send + Sync, WorkerGuard)> {
    let (non_blocking, guard) = open_log_writer(workdir, target.command)?;

    let stderr_layer = target.stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(STDERR_DEFAULT_FILTER))
    });

    let subscriber = tracing_subscriber::registry().with(stderr_layer).with(
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_filter(env_filter(FILE_DEFAULT_FILTER)),
    );

    Ok((subscriber, guard))
}

/// `RUST_LOG` if set and valid, otherwise `default`.
fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Create the log directory and file, returning a non-blocking writer and guard.
fn open_log_writer(
    workdir: &Path,
    command: &str,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let log_path = build_log_path(workdir, command);

    let log_dir = log_path.parent().context(format!(
        "failed to resolve parent directory for log path: {}",
        log_path.display(),
    ))?;

    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory: {}", log_dir.display()))?;

    let log_file = fs::File::create(&log_path)
        .with_context(|| format!("failed to create log file: {}", log_path.display()))?;

    Ok(tracing_appender::non_blocking(log_file))
}

fn logs_dir(workdir: &Path) -> PathBuf {
    workdir.join(STATE_DIR).join("logs")
}

/// Remove log files older than 3 days from `.pitchbot/logs/`.
///
/// Best-effort: runs before tracing is initialized, so problems with
/// individual files are reported with `eprintln!` and skipped.
pub fn cleanup_old_logs(workdir: &Path) {
    let logs_dir = logs_dir(workdir);
    if !logs_dir.is_dir() {
        return;
    }

    let cutoff = std::time::SystemTime::now()
        - std::time::Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60);

    remove_old_log_files(&logs_dir, cutoff);
    remove_empty_dirs(&logs_dir);
}

/// `.pitchbot/logs/<command>/<YYYYMMDD_HHMMSS>.log`.
fn build_log_path(workdir: &Path, command: &str) -> PathBuf {
    let timestamp = format_utc_timestamp(std::time::SystemTime::now());
    logs_dir(workdir)
        .join(command)
        .join(format!("{timestamp}.log"))
}

/// Format a [`SystemTime`](std::time::SystemTime) as `YYYYMMDD_HHMMSS` in UTC.
fn format_utc_timestamp(time: std::time::SystemTime) -> String {
    let secs = time
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let days = secs / 86400;
    let time_of_day = secs % 86400;
    let hours = time_of_day / 3600;
    let minutes = (time_of_day % 3600) / 60;
    let seconds = time_of_day % 60;

    let (year, month, day) = days_to_date(days);

    format!("{year:04}{month:02}{day:02}_{hours:02}{minutes:02}{seconds:02}")
}

/// Convert days since Unix epoch to (year, month, day) in the Gregorian calendar.
fn days_to_date(days_since_epoch: u64) -> (u64, u64, u64) {
    // civil_from_days (Howard Hinnant), epoch shifted to 0000-03-01.
    let z = days_since_epoch as i64 + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = (yoe as i64) + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };

    (y as u64, m, d)
}

fn remove_old_log_files(dir: &Path, cutoff: std::time::SystemTime) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!(
                "warning: failed to read log directory {}: {e}",
                dir.display()
            );
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();

        if path.is_dir() {
            remove_old_log_files(&path, cutoff);
            continue;
        }

        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }

        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                eprintln!(
                    "warning: failed to read metadata for {}: {e}",
                    path.display()
                );
                continue;
            }
        };

        if modified < cutoff
            && let Err(e) = fs::remove_file(&path)
        {
            eprintln!(
                "warning: failed to remove old log file {}: {e}",
                path.display(),
            );
        }
    }
}

/// Remove empty subdirectories under `dir`, keeping `dir` itself.
fn remove_empty_dirs(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            remove_empty_dirs(&path);
            // Fails for non-empty directories, which are kept.
            let _ = fs::remove_dir(&path);
        }
    }
}
