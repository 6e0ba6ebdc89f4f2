//! Process-wide `tracing` subscriber.
//!
//! Console output plus two optional rotating files: the info file receives
//! INFO and WARN (and DEBUG when `log.debug` is set), the error file receives
//! ERROR only. The console filter comes from `RUST_LOG`, falling back to
//! `info` (or `debug` when `log.debug` is set). File writes go through a
//! background worker; keep the returned [`LogGuards`] alive until exit so
//! buffered lines are flushed.

use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{LogConfig, LogFile, LogRotation};
use crate::error::AppError;

/// Flush guards for the file writers. Dropping them flushes and stops the
/// background workers.
#[derive(Debug)]
#[must_use = "dropping the guards stops file logging"]
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns [`AppError::Io`] if a log directory cannot be created,
/// [`AppError::Config`] if a log file cannot be opened, or
/// [`AppError::Internal`] if a subscriber is already installed.
pub fn init(config: &LogConfig) -> Result<LogGuards, AppError> {
    let default_level = if config.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let mut guards = Vec::new();

    let info_layer = rolling_writer(&config.info)?.map(|(writer, guard)| {
        guards.push(guard);
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(
                writer
                    .with_min_level(Level::WARN)
                    .with_max_level(info_max_level(config.debug)),
            )
    });
    let error_layer = rolling_writer(&config.error)?.map(|(writer, guard)| {
        guards.push(guard);
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer.with_max_level(Level::ERROR))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(info_layer)
        .with(error_layer)
        .try_init()
        .map_err(|e| AppError::Internal(format!("logger already initialized: {e}")))?;

    Ok(LogGuards { _guards: guards })
}

/// Most verbose level written to the info file.
fn info_max_level(debug: bool) -> Level {
    if debug { Level::DEBUG } else { Level::INFO }
}

/// Opens a rotating, non-blocking writer for `file`, creating parent
/// directories. An empty filename disables the file.
fn rolling_writer(file: &LogFile) -> Result<Option<(NonBlocking, WorkerGuard)>, AppError> {
    if file.filename.is_empty() {
        return Ok(None);
    }
    let path = Path::new(&file.filename);
    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let prefix = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| AppError::Config(format!("invalid log file name {:?}", file.filename)))?;
    let mut builder = RollingFileAppender::builder()
        .rotation(rotation(file.rotation))
        .filename_prefix(prefix);
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        builder = builder.filename_suffix(ext);
    }
    if file.max_files > 0 {
        builder = builder.max_log_files(file.max_files);
    }
    let appender = builder
        .build(dir)
        .map_err(|e| AppError::Config(format!("cannot open log file {}: {e}", file.filename)))?;
    Ok(Some(tracing_appender::non_blocking(appender)))
}

fn rotation(period: LogRotation) -> Rotation {
    match period {
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::io::Write;

    use super::*;

    fn log_file(path: &Path, rotation: LogRotation) -> LogFile {
        let Some(filename) = path.to_str() else {
            panic!("utf-8 temp path");
        };
        LogFile {
            filename: filename.to_string(),
            rotation,
            max_files: 3,
        }
    }

    #[test]
    fn empty_path_disables_file() {
        assert!(matches!(rolling_writer(&LogFile::default()), Ok(None)));
    }

    #[test]
    fn creates_parent_directories_and_writes() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let nested = dir.path().join("storage/nested");
        let file = log_file(&nested.join("info.log"), LogRotation::Never);
        let Ok(Some((mut writer, guard))) = rolling_writer(&file) else {
            panic!("writer should open");
        };
        assert!(writer.write_all(b"hello\n").is_ok());
        drop(guard);

        let Ok(contents) = std::fs::read_to_string(nested.join("info.log")) else {
            panic!("unrotated file keeps its name");
        };
        assert_eq!(contents, "hello\n");
    }

    #[test]
    fn rotated_files_carry_the_period() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let file = log_file(&dir.path().join("error.log"), LogRotation::Daily);
        let Ok(Some((mut writer, guard))) = rolling_writer(&file) else {
            panic!("writer should open");
        };
        assert!(writer.write_all(b"boom\n").is_ok());
        drop(guard);

        let Ok(entries) = std::fs::read_dir(dir.path()) else {
            panic!("read log dir");
        };
        let names: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        assert_eq!(names, vec![format!("error.{today}.log")]);
    }

    #[test]
    fn debug_reaches_info_file_only_when_enabled() {
        assert_eq!(info_max_level(false), Level::INFO);
        assert_eq!(info_max_level(true), Level::DEBUG);
    }
}
