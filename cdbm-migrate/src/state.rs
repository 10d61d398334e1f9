//! Schema state tracking.
//!
//! The tracking table holds at most one row describing the last recorded
//! version, whether it is dirty, the direction in progress when it became
//! dirty, and whether that version is a custom migration.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::database::{Database, SqlValue};
use crate::dialect::{DEFAULT_TABLE_NAME, Dialect, validate_table_name};
use crate::error::{MigrateResult, MigrationError};
use crate::migration::MigrationDirection;

/// Current position of the database in the version sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SchemaState {
    /// No row: nothing has been applied.
    NoEntry,
    /// The last operation completed.
    Clean {
        /// Recorded version.
        version: i64,
        /// Whether that version is a custom migration.
        is_custom: bool,
    },
    /// The last operation did not complete.
    Dirty {
        /// Version that was being applied or reverted.
        version: i64,
        /// Direction in progress.
        direction: Option<MigrationDirection>,
        /// Whether that version is a custom migration.
        is_custom: bool,
    },
}

impl SchemaState {
    /// Build a clean state, or `NoEntry` for version 0.
    pub fn clean(version: i64, is_custom: bool) -> Self {
        if version <= 0 {
            Self::NoEntry
        } else {
            Self::Clean { version, is_custom }
        }
    }

    /// Recorded version, 0 when there is no entry.
    pub fn version(&self) -> i64 {
        match self {
            Self::NoEntry => 0,
            Self::Clean { version, .. } | Self::Dirty { version, .. } => *version,
        }
    }

    /// Check if a row exists.
    pub fn has_entry(&self) -> bool {
        !matches!(self, Self::NoEntry)
    }

    /// Check if the state is dirty.
    pub fn is_dirty(&self) -> bool {
        matches!(self, Self::Dirty { .. })
    }

    /// Whether the recorded version is a custom migration.
    pub fn is_custom(&self) -> bool {
        match self {
            Self::NoEntry => false,
            Self::Clean { is_custom, .. } | Self::Dirty { is_custom, .. } => *is_custom,
        }
    }

    /// Direction in progress when the state became dirty.
    pub fn dirty_direction(&self) -> Option<MigrationDirection> {
        match self {
            Self::Dirty { direction, .. } => *direction,
            _ => None,
        }
    }

    /// Row representation, `None` for `NoEntry`.
    pub fn record(&self) -> Option<SchemaRecord> {
        match *self {
            Self::NoEntry => None,
            Self::Clean { version, is_custom } => Some(SchemaRecord {
                version,
                dirty: false,
                dirty_state: String::new(),
                is_custom,
            }),
            Self::Dirty {
                version,
                direction,
                is_custom,
            } => Some(SchemaRecord {
                version,
                dirty: true,
                dirty_state: direction.map(|d| d.as_str().to_string()).unwrap_or_default(),
                is_custom,
            }),
        }
    }
}

impl From<SchemaRecord> for SchemaState {
    fn from(record: SchemaRecord) -> Self {
        if record.dirty {
            Self::Dirty {
                version: record.version,
                direction: MigrationDirection::parse(&record.dirty_state),
                is_custom: record.is_custom,
            }
        } else {
            Self::Clean {
                version: record.version,
                is_custom: record.is_custom,
            }
        }
    }
}

impl fmt::Display for SchemaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.record() {
            None => write!(f, "No migration entry"),
            Some(record) => write!(
                f,
                "migration state - version:{} / dirty:{} / dirty state:{}",
                record.version, record.dirty, record.dirty_state
            ),
        }
    }
}

/// A row of the tracking table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRecord {
    /// Recorded version.
    pub version: i64,
    /// Dirty flag.
    pub dirty: bool,
    /// `Up`, `Down` or empty.
    pub dirty_state: String,
    /// Whether the version is a custom migration.
    pub is_custom: bool,
}

/// Persistent storage of the schema state.
#[async_trait::async_trait]
pub trait SchemaStateStore: Send + Sync {
    /// Read the state, creating the tracking table when it is absent.
    async fn load(&self) -> MigrateResult<SchemaState>;

    /// Insert the first row.
    async fn insert(&self, record: &SchemaRecord) -> MigrateResult<()>;

    /// Overwrite the row.
    async fn update(&self, record: &SchemaRecord) -> MigrateResult<()>;

    /// Remove the row.
    async fn delete(&self) -> MigrateResult<()>;

    /// Move the persisted state from `from` to `to`, choosing between insert,
    /// update and delete.
    async fn save(&self, from: &SchemaState, to: &SchemaState) -> MigrateResult<()> {
        match (from.has_entry(), to.record()) {
            (_, None) => {
                if from.has_entry() {
                    self.delete().await?;
                }
                Ok(())
            }
            (false, Some(record)) => self.insert(&record).await,
            (true, Some(record)) => self.update(&record).await,
        }
    }
}

/// Schema state stored in a table of the target database.
pub struct SqlSchemaStateStore {
    db: Arc<dyn Database>,
    dialect: Dialect,
    table: String,
}

impl SqlSchemaStateStore {
    /// Create a store using the default table name.
    pub fn new(db: Arc<dyn Database>, dialect: Dialect) -> Self {
        Self {
            db,
            dialect,
            table: DEFAULT_TABLE_NAME.to_string(),
        }
    }

    /// Use a different tracking table.
    pub fn with_table(mut self, table: impl Into<String>) -> MigrateResult<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        self.table = table;
        Ok(self)
    }

    /// Name of the tracking table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Check that the tracking table exists.
    ///
    /// Returns [`MigrationError::TrackingTableNotFound`] when it does not.
    pub async fn probe(&self) -> MigrateResult<()> {
        let found = self
            .db
            .query_row(
                self.dialect.table_exists_sql(),
                &[SqlValue::from(self.table.as_str())],
            )
            .await?;

        match found {
            Some(_) => Ok(()),
            None => Err(MigrationError::TrackingTableNotFound(self.table.clone())),
        }
    }

    /// Create the tracking table.
    pub async fn create_table(&self) -> MigrateResult<()> {
        debug!(table = %self.table, "Creating tracking table");
        self.db
            .batch_execute(&self.dialect.create_table_sql(&self.table))
            .await
    }

    /// Read the state without creating anything.
    pub async fn read(&self) -> MigrateResult<SchemaState> {
        let row = self
            .db
            .query_row(&self.dialect.select_state_sql(&self.table), &[])
            .await?;

        let Some(row) = row else {
            return Ok(SchemaState::NoEntry);
        };

        let record = SchemaRecord {
            version: row.get_i64(0)?,
            dirty: row.get_bool(1)?,
            dirty_state: row.get_opt_string(2)?.unwrap_or_default(),
            is_custom: row.get_bool(3)?,
        };
        Ok(record.into())
    }

    fn params(record: &SchemaRecord) -> [SqlValue; 4] {
        [
            SqlValue::Int(record.version),
            SqlValue::Bool(record.dirty),
            SqlValue::Text(record.dirty_state.clone()),
            SqlValue::Bool(record.is_custom),
        ]
    }
}

#[async_trait::async_trait]
impl SchemaStateStore for SqlSchemaStateStore {
    async fn load(&self) -> MigrateResult<SchemaState> {
        match self.probe().await {
            Ok(()) => self.read().await,
            Err(e) if e.is_not_found() => {
                self.create_table().await?;
                Ok(SchemaState::NoEntry)
            }
            Err(e) => Err(e),
        }
    }

    async fn insert(&self, record: &SchemaRecord) -> MigrateResult<()> {
        debug!(version = record.version, dirty = record.dirty, "Inserting schema state");
        self.db
            .execute(
                &self.dialect.insert_state_sql(&self.table),
                &Self::params(record),
            )
            .await?;
        Ok(())
    }

    async fn update(&self, record: &SchemaRecord) -> MigrateResult<()> {
        debug!(version = record.version, dirty = record.dirty, "Updating schema state");
        self.db
            .execute(
                &self.dialect.update_state_sql(&self.table),
                &Self::params(record),
            )
            .await?;
        Ok(())
    }

    async fn delete(&self) -> MigrateResult<()> {
        debug!(table = %self.table, "Deleting schema state");
        self.db
            .execute(&self.dialect.delete_state_sql(&self.table), &[])
            .await?;
        Ok(())
    }
}
