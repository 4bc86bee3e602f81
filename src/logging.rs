use std::path::PathBuf;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::{RelayError, Result};

pub const LOG_DIR_ENV: &str = "LOG_DIR";
const DEFAULT_FILTER: &str = "info";
const LOG_FILE_PREFIX: &str = "relay_logs";

pub struct FileLogger {
    log_directory: PathBuf,
    rotation: Rotation,
}

impl FileLogger {
    pub fn new(log_directory: PathBuf) -> Self {
        Self {
            log_directory,
            rotation: Rotation::DAILY,
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Non-blocking writer into a rolling file. Keep the guard alive for as
    /// long as logs should be flushed.
    pub fn setup_file_logging(&self) -> Result<(NonBlocking, WorkerGuard)> {
        std::fs::create_dir_all(&self.log_directory)
            .map_err(|e| RelayError::filesystem(&self.log_directory, e))?;

        let file_appender =
            RollingFileAppender::new(self.rotation.clone(), &self.log_directory, LOG_FILE_PREFIX);
        Ok(tracing_appender::non_blocking(file_appender))
    }
}

/// Install the global subscriber: `RUST_LOG` filter (default `info`),
/// console output, and a rolling file when `file_logger` is given.
pub fn setup_logging(file_logger: Option<&FileLogger>) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (file_layer, guard) = match file_logger {
        Some(logger) => {
            let (writer, guard) = logger.setup_file_logging()?;
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false); // Disable ANSI colors for file logs
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer()) // Console output
        .with(file_layer)
        .try_init()
        .map_err(|e| RelayError::Config(format!("Failed to install logger: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_logger_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");

        let logger = FileLogger::new(log_dir.clone()).with_rotation(Rotation::NEVER);
        let (_writer, _guard) = logger.setup_file_logging().unwrap();

        assert!(log_dir.is_dir());
    }
}
