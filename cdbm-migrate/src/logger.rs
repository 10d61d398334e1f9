//! Error log sinks.
//!
//! The engine reports every step and rollback failure to a
//! [`MigrationLogger`] in addition to `tracing`. Logging is best-effort: a
//! sink never surfaces its own failures.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use crate::error::MigrationError;

/// A sink for failures encountered while migrating.
pub trait MigrationLogger: Send + Sync {
    /// Record `err`, observed at `at`.
    fn log_error(&self, at: DateTime<Utc>, err: &MigrationError);

    /// Record a progress event, such as a version rolled back.
    fn log_event(&self, _at: DateTime<Utc>, _message: &str) {}
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl MigrationLogger for NoopLogger {
    fn log_error(&self, _at: DateTime<Utc>, _err: &MigrationError) {}
}

/// Appends `"<timestamp>: <error>"` lines to a file.
#[derive(Debug, Clone)]
pub struct FileLogger {
    path: PathBuf,
}

impl FileLogger {
    /// Log to `path`, creating parent directories on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }

    fn write_line(&self, line: &str) {
        if let Err(e) = self.append(line) {
            warn!(path = %self.path.display(), error = %e, "Failed to write migration log");
        }
    }
}

impl MigrationLogger for FileLogger {
    fn log_error(&self, at: DateTime<Utc>, err: &MigrationError) {
        self.write_line(&format_entry(at, err));
    }

    fn log_event(&self, at: DateTime<Utc>, message: &str) {
        self.write_line(&format_entry(at, message));
    }
}

/// Render one log line.
pub fn format_entry(at: DateTime<Utc>, message: impl fmt::Display) -> String {
    format!("{}: {}", at.to_rfc3339_opts(SecondsFormat::Secs, true), message)
}
