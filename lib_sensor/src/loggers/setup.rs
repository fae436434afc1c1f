//! # Tracing Setup
//!
//! Installs the global subscriber:
//! - an `EnvFilter` from `RUST_LOG`, falling back to the configured level;
//! - a console layer with targets and ANSI colors;
//! - a JSON layer written to `<log_dir>/<file_prefix>.<date>` through a
//!   non-blocking writer.
//!
//! The returned [`WorkerGuard`] must stay alive for the life of `main`;
//! dropping it flushes and stops the file writer.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Log directory error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid log filter '{0}'")]
    Filter(String),
    #[error("Failed to install the tracing subscriber: {0}")]
    Init(String),
}

/// Where and how verbosely to log.
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub log_dir: PathBuf,
    pub log_level: String,
    /// File name prefix, usually the binary name.
    pub file_prefix: String,
}

/// Installs the global subscriber and returns the file writer's guard.
pub fn init_tracing(settings: &LogSettings) -> Result<WorkerGuard, LogError> {
    fs::create_dir_all(&settings.log_dir)?;

    // Keep only the newest file from earlier runs.
    let removed = prune_old_logs(&settings.log_dir, &settings.file_prefix)?;

    let file_appender = rolling::daily(&settings.log_dir, &settings.file_prefix);
    let (writer, guard) = non_blocking(file_appender);

    let console_layer = fmt::layer().with_target(true).with_ansi(true);
    let file_layer = fmt::layer().with_ansi(false).with_writer(writer).json();

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .map_err(|_| LogError::Filter(settings.log_level.clone()))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LogError::Init(e.to_string()))?;

    info!(
        level = %settings.log_level,
        dir = %settings.log_dir.display(),
        removed,
        "Logging initialized"
    );
    Ok(guard)
}

/// Deletes files in `log_dir` whose name starts with `prefix`, except the most
/// recently modified one. Returns how many were removed.
pub fn prune_old_logs(log_dir: &Path, prefix: &str) -> Result<usize, LogError> {
    let mut entries: Vec<(SystemTime, PathBuf)> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|e| e.file_name().to_string_lossy().starts_with(prefix))
        .filter_map(|e| {
            let modified = e.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, e.path()))
        })
        .collect();

    // Newest first
    entries.sort_by(|a, b| b.0.cmp(&a.0));

    let mut removed = 0;
    for (_, path) in entries.iter().skip(1) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Failed to delete old log file {:?}: {}", path, e),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    fn touch(dir: &Path, name: &str, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs)).unwrap();
        path
    }

    #[test]
    fn keeps_only_the_newest_matching_file() {
        let dir = tempfile::tempdir().unwrap();
        let oldest = touch(dir.path(), "sensor_ingest.2024-01-01", 300);
        let older = touch(dir.path(), "sensor_ingest.2024-01-02", 200);
        let newest = touch(dir.path(), "sensor_ingest.2024-01-03", 100);
        let other = touch(dir.path(), "server_sensor.2024-01-01", 400);

        assert_eq!(prune_old_logs(dir.path(), "sensor_ingest").unwrap(), 2);
        assert!(!oldest.exists());
        assert!(!older.exists());
        assert!(newest.exists());
        assert!(other.exists());
    }

    #[test]
    fn empty_directory_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(prune_old_logs(dir.path(), "server_sensor").unwrap(), 0);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(prune_old_logs(&missing, "x"), Err(LogError::Io(_))));
    }
}
