//! Error types for the migration engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::migration::{MigrationDirection, UnitKind};

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database operation error.
    #[error("Database error: {0}")]
    Database(String),

    /// Invalid engine configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The migrations directory does not exist.
    #[error("migrations directory '{}' does not exist", .0.display())]
    MissingMigrationsDir(PathBuf),

    /// A file in the migrations directory does not follow
    /// `<version>_<description>.<up|down>.sql`.
    #[error("invalid migration file name '{file}': {reason}")]
    InvalidFileName {
        /// Offending file name.
        file: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A migration version is zero or negative.
    #[error("migration version {version} in '{source_name}' is below the minimum version 1")]
    VersionBelowMinimum {
        /// File name or custom migration label.
        source_name: String,
        /// Parsed version.
        version: i64,
    },

    /// Two migration units claim the same version.
    #[error("version collision at {version}: {detail}")]
    VersionCollision {
        /// Contested version.
        version: i64,
        /// Which units collide.
        detail: String,
    },

    /// A file-based version lacks its up or down script.
    #[error("migration {version} is missing its {missing} file")]
    IncompleteFilePair {
        /// Version with the missing half.
        version: i64,
        /// `up` or `down`.
        missing: &'static str,
    },

    /// The merged catalog skips versions.
    #[error(
        "migration versions must be contiguous from 1, missing: {}",
        gap_summary(.missing, *.total)
    )]
    VersionGap {
        /// The first absent versions, capped at [`MAX_REPORTED_GAPS`].
        missing: Vec<i64>,
        /// Total number of absent versions.
        total: u64,
    },

    /// A custom migration was registered without both procedures.
    #[error("custom migration {0} must define both up and down")]
    IncompleteCustomMigration(i64),

    /// Neither files nor custom migrations were found.
    #[error("no sql files or custom migrations found")]
    EmptyCatalog,

    /// The requested target is not in the catalog.
    #[error("target version {target} does not exist (latest version is {latest})")]
    TargetNotFound {
        /// Requested target.
        target: i64,
        /// Highest catalog version.
        latest: i64,
    },

    /// The recorded version is past the end of the catalog.
    #[error(
        "database is at version {version} but the latest migration is {latest}; the migrations directory does not match this database"
    )]
    VersionNotInCatalog {
        /// Version recorded in the tracking table.
        version: i64,
        /// Highest catalog version.
        latest: i64,
    },

    /// The tracking table has not been created yet.
    #[error("tracking table '{0}' not found")]
    TrackingTableNotFound(String),

    /// The schema state is dirty and the reset override was not given.
    #[error(
        "database is dirty at version {version} (direction: {}); must set --reset-dirty-flag to reset migrations dirty flag. Use 'cdbm status' to see current status of migration",
        direction_label(.direction)
    )]
    DirtyState {
        /// Version recorded as dirty.
        version: i64,
        /// Direction that was in progress.
        direction: Option<MigrationDirection>,
    },

    /// Error raised from inside a custom migration procedure.
    #[error("{0}")]
    Custom(String),

    /// A migration step failed.
    #[error(
        "{kind} migration {version} failed going {direction}: {source}{}",
        bookkeeping_suffix(.bookkeeping)
    )]
    StepFailed {
        /// Version of the unit that failed.
        version: i64,
        /// Kind of the unit that failed.
        kind: UnitKind,
        /// Direction being applied.
        direction: MigrationDirection,
        /// Underlying failure.
        #[source]
        source: Box<MigrationError>,
        /// Failure to record the dirty state, if any.
        bookkeeping: Option<Box<MigrationError>>,
    },

    /// The corrective down-step of a dirty resume failed.
    #[error(
        "failed to reset dirty migration {version}: {source}{}",
        bookkeeping_suffix(.bookkeeping)
    )]
    ResetFailed {
        /// Version whose down-step was attempted.
        version: i64,
        /// Underlying failure.
        #[source]
        source: Box<MigrationError>,
        /// Failure to record the dirty state, if any.
        bookkeeping: Option<Box<MigrationError>>,
    },

    /// Writing the schema state failed.
    #[error("failed to record schema state at version {version}: {source}")]
    Bookkeeping {
        /// Version being recorded.
        version: i64,
        /// Underlying failure.
        #[source]
        source: Box<MigrationError>,
    },

    /// A step failed and the run was rolled back cleanly.
    #[error("{failure} but successfully rolled back to version: '{version}'")]
    RolledBack {
        /// The step failure that triggered the rollback.
        #[source]
        failure: Box<MigrationError>,
        /// Version restored.
        version: i64,
    },

    /// A step failed and the rollback failed as well.
    #[error("{failure} and rollback failed: {rollback}")]
    RollbackFailed {
        /// The step failure that triggered the rollback.
        #[source]
        failure: Box<MigrationError>,
        /// The rollback failure.
        rollback: Box<MigrationError>,
    },

    /// General migration error.
    #[error("{0}")]
    Other(String),
}

impl MigrationError {
    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an error from inside a custom migration.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create a general error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether this is the distinguished "tracking table not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TrackingTableNotFound(_))
    }

    /// Whether this error was raised before the database was touched.
    pub fn is_catalog_error(&self) -> bool {
        matches!(
            self,
            Self::MissingMigrationsDir(_)
                | Self::InvalidFileName { .. }
                | Self::VersionBelowMinimum { .. }
                | Self::VersionCollision { .. }
                | Self::IncompleteFilePair { .. }
                | Self::VersionGap { .. }
                | Self::IncompleteCustomMigration(_)
                | Self::EmptyCatalog
        )
    }

    /// Whether the run ended with the database left in a dirty state.
    pub fn leaves_dirty(&self) -> bool {
        matches!(
            self,
            Self::StepFailed { .. } | Self::ResetFailed { .. } | Self::RollbackFailed { .. }
        )
    }
}

/// Most absent versions listed in a [`MigrationError::VersionGap`].
pub const MAX_REPORTED_GAPS: usize = 10;

fn gap_summary(missing: &[i64], total: u64) -> String {
    let listed = missing
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let rest = total.saturating_sub(missing.len() as u64);
    if rest > 0 {
        format!("{listed} and {rest} more")
    } else {
        listed
    }
}

fn direction_label(direction: &Option<MigrationDirection>) -> &'static str {
    direction.map_or("unknown", |d| d.as_str())
}

fn bookkeeping_suffix(bookkeeping: &Option<Box<MigrationError>>) -> String {
    match bookkeeping {
        Some(err) => format!(" and {err}"),
        None => String::new(),
    }
}
