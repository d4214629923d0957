//! This module defines the logging facilities, using tracing and tracing-subscriber.
//!
//! Logs will be displayed in the terminal and written to log files. By default, only the log files
//! of the last 15 runs will be kept.

use chrono::Local;
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_error::ErrorLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Logs the captured output of an external command line by line.
///
/// * `$output` - Captured bytes (stdout or stderr)
/// * `$name` - Stream label
/// * `$cmd` - Command line, for context
/// * `$level` - tracing macro to log with (`debug`, `info`, ...)
macro_rules! log_output {
    ($output:expr, $name:expr, $cmd:expr, $level:ident) => {
        for line in String::from_utf8_lossy(&$output)
            .lines()
            .filter(|l| !l.trim().is_empty())
        {
            tracing::$level!("{} [{}]: {}", $name, $cmd, line);
        }
    };
}
pub(crate) use log_output;

// -------------------------------------------------------------------------------------------------
// Logger
// -------------------------------------------------------------------------------------------------

/// Logging setup of a modterm run.
#[derive(Debug)]
pub(crate) struct Logger {
    /// 0 = info, 1 = debug, 2 = trace
    verbosity: u8,
    /// Directory the log files are written to
    log_dir: PathBuf,
    /// Number of log files to keep, including the one of the current run
    max_logs: usize,
}

#[derive(Debug, Default)]
pub(crate) struct LoggerBuilder {
    verbosity: Option<u8>,
    log_dir: Option<PathBuf>,
    max_logs: Option<usize>,
}

impl LoggerBuilder {
    pub(crate) fn with_verbosity(&mut self, verbosity: u8) -> &mut Self {
        let new = self;
        new.verbosity = Some(verbosity);
        new
    }

    pub(crate) fn with_log_dir<P: AsRef<Path>>(&mut self, log_dir: P) -> &mut Self {
        let new = self;
        new.log_dir = Some(log_dir.as_ref().to_path_buf());
        new
    }

    pub(crate) fn with_max_logs(&mut self, max_logs: usize) -> &mut Self {
        let new = self;
        new.max_logs = Some(max_logs);
        new
    }

    pub(crate) fn build(&self) -> Result<Logger> {
        Ok(Logger {
            verbosity: self.verbosity.unwrap_or(0).min(2),
            log_dir: self
                .log_dir
                .clone()
                .ok_or_else(|| eyre!("No log directory configured"))?,
            max_logs: self.max_logs.unwrap_or(15).max(1),
        })
    }
}

impl Logger {
    /// Installs the global subscriber.
    ///
    /// Events go to stderr and to a new log file in the log directory. Older log files beyond the
    /// configured maximum are removed first. `RUST_LOG` takes precedence over the verbosity.
    ///
    /// The returned guard flushes the file writer when dropped and must be held until exit.
    pub(crate) fn start(&self) -> Result<WorkerGuard> {
        fs::create_dir_all(&self.log_dir).wrap_err_with(|| {
            format!("Failed to create log directory at {:?}", self.log_dir)
        })?;

        // Make room for the log file of this run
        rotate_logs(&self.log_dir, self.max_logs - 1)?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let file_appender = tracing_appender::rolling::never(
            &self.log_dir,
            format!("modterm_{}.log", timestamp),
        );
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

        let level = match self.verbosity {
            0 => "modterm=info",
            1 => "modterm=debug",
            _ => "modterm=trace",
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_timer(ChronoLocal::rfc_3339())
                    .with_target(self.verbosity > 0)
                    .with_writer(std::io::stderr),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .with_timer(ChronoLocal::rfc_3339())
                    .with_ansi(false)
                    .with_writer(file_writer),
            )
            .with(ErrorLayer::default())
            .try_init()
            .wrap_err("Failed to initialize logging")?;

        Ok(guard)
    }
}

/// Rotate log files, keeping only the most recent ones.
///
/// # Arguments
///
/// * `log_dir` - Directory containing the log files
/// * `keep` - Number of log files to keep
fn rotate_logs<P: AsRef<Path>>(log_dir: P, keep: usize) -> Result<()> {
    // Get all log files
    let mut log_files: Vec<_> = fs::read_dir(&log_dir)
        .wrap_err_with(|| format!("Failed to read log directory {:?}", log_dir.as_ref()))?
        // Filter out entries which could not be read (should be zero).
        .filter_map(|entry| entry.ok())
        // Filter out entries with extensions other than .log
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "log"))
        .collect();

    // Sort by file name and reverse order -> newest first
    log_files.sort_by_key(|a| a.file_name());
    log_files.reverse();

    // Remove old logs
    for old_log in log_files.iter().skip(keep) {
        fs::remove_file(old_log.path())
            .wrap_err_with(|| format!("Failed to remove old log file {:?}", old_log.path()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_log_rotation() -> Result<()> {
        let temp_dir = tempdir()?;
        for i in 0..10 {
            // Simulate different timestamps
            let log_file = temp_dir
                .path()
                .join(format!("modterm_20241028_21441{}.log", i));
            File::create(&log_file)?;
        }
        for i in 0..5 {
            let log_file = temp_dir
                .path()
                .join(format!("modterm_20241028_21442{}.log", i));
            File::create(&log_file)?;
        }
        // Unrelated files are left alone
        File::create(temp_dir.path().join("notes.txt"))?;

        rotate_logs(temp_dir.path(), 10)?;

        let mut remaining_logs: Vec<_> = fs::read_dir(&temp_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .filter(|name| name.ends_with(".log"))
            .collect();
        remaining_logs.sort();

        assert_eq!(remaining_logs.len(), 10, "Should keep exactly 10 log files");
        assert_eq!(remaining_logs[0], "modterm_20241028_214415.log");
        assert_eq!(remaining_logs[9], "modterm_20241028_214424.log");
        assert!(temp_dir.path().join("notes.txt").exists());

        Ok(())
    }

    #[test]
    fn test_logger_builder() -> Result<()> {
        assert!(LoggerBuilder::default().build().is_err(), "log dir is required");

        let logger = LoggerBuilder::default()
            .with_verbosity(7)
            .with_log_dir("/tmp/modterm-logs")
            .with_max_logs(0)
            .build()?;
        assert_eq!(logger.verbosity, 2);
        assert_eq!(logger.max_logs, 1);
        Ok(())
    }
}
