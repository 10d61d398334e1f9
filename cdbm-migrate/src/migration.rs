//! Migration units: file-based scripts and custom procedures.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::{MigrateResult, MigrationError};

/// Direction of a migration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigrationDirection {
    /// Apply the unit.
    Up,
    /// Revert the unit.
    Down,
    /// Record a version without running anything.
    Force,
}

impl MigrationDirection {
    /// The label stored in the tracking table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "Up",
            Self::Down => "Down",
            Self::Force => "Force",
        }
    }

    /// Parse a stored label. Empty strings and unknown labels yield `None`.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim() {
            "Up" | "up" => Some(Self::Up),
            "Down" | "down" => Some(Self::Down),
            "Force" | "force" => Some(Self::Force),
            _ => None,
        }
    }
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Version recorded after a unit at `version` succeeds in `direction`.
///
/// Up and Force record the unit's own version; Down records the version
/// below it. A result of 0 means the tracking row is removed.
pub fn resulting_version(version: i64, direction: MigrationDirection) -> i64 {
    match direction {
        MigrationDirection::Up | MigrationDirection::Force => version,
        MigrationDirection::Down => version - 1,
    }
}

/// Body of a custom migration procedure.
pub type MigrationFn =
    Arc<dyn for<'a> Fn(&'a dyn Database) -> BoxFuture<'a, MigrateResult<()>> + Send + Sync>;

/// A migration implemented as code rather than SQL files.
#[derive(Clone)]
pub struct CustomMigration {
    up: MigrationFn,
    down: MigrationFn,
}

impl CustomMigration {
    /// Create a custom migration from its up and down procedures.
    ///
    /// ```rust,ignore
    /// use futures::FutureExt;
    ///
    /// let migration = CustomMigration::new(
    ///     |db| async move { db.batch_execute("INSERT INTO t VALUES (1)").await }.boxed(),
    ///     |db| async move { db.batch_execute("DELETE FROM t").await }.boxed(),
    /// );
    /// ```
    pub fn new<U, D>(up: U, down: D) -> Self
    where
        U: for<'a> Fn(&'a dyn Database) -> BoxFuture<'a, MigrateResult<()>> + Send + Sync + 'static,
        D: for<'a> Fn(&'a dyn Database) -> BoxFuture<'a, MigrateResult<()>> + Send + Sync + 'static,
    {
        Self {
            up: Arc::new(up),
            down: Arc::new(down),
        }
    }

    /// Start building a custom migration whose halves are supplied separately.
    pub fn builder() -> CustomMigrationBuilder {
        CustomMigrationBuilder::default()
    }

    /// Run the procedure for `direction`. Force runs nothing.
    pub async fn run(&self, db: &dyn Database, direction: MigrationDirection) -> MigrateResult<()> {
        match direction {
            MigrationDirection::Up => (self.up)(db).await,
            MigrationDirection::Down => (self.down)(db).await,
            MigrationDirection::Force => Ok(()),
        }
    }
}

impl fmt::Debug for CustomMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomMigration").finish_non_exhaustive()
    }
}

/// Builder for a [`CustomMigration`] that rejects a missing half.
#[derive(Default)]
pub struct CustomMigrationBuilder {
    up: Option<MigrationFn>,
    down: Option<MigrationFn>,
}

impl CustomMigrationBuilder {
    /// Set the up procedure.
    pub fn up<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a dyn Database) -> BoxFuture<'a, MigrateResult<()>> + Send + Sync + 'static,
    {
        self.up = Some(Arc::new(f));
        self
    }

    /// Set the down procedure.
    pub fn down<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a dyn Database) -> BoxFuture<'a, MigrateResult<()>> + Send + Sync + 'static,
    {
        self.down = Some(Arc::new(f));
        self
    }

    /// Finish the migration registered at `version`.
    pub fn build(self, version: i64) -> MigrateResult<CustomMigration> {
        match (self.up, self.down) {
            (Some(up), Some(down)) => Ok(CustomMigration { up, down }),
            _ => Err(MigrationError::IncompleteCustomMigration(version)),
        }
    }
}

/// Custom migrations keyed by version.
#[derive(Debug, Clone, Default)]
pub struct CustomMigrations {
    entries: BTreeMap<i64, CustomMigration>,
}

impl CustomMigrations {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a migration at `version`.
    pub fn with(mut self, version: i64, migration: CustomMigration) -> Self {
        self.entries.insert(version, migration);
        self
    }

    /// Register a migration at `version`.
    pub fn insert(&mut self, version: i64, migration: CustomMigration) {
        self.entries.insert(version, migration);
    }

    /// Get the migration at `version`.
    pub fn get(&self, version: i64) -> Option<&CustomMigration> {
        self.entries.get(&version)
    }

    /// Number of registered migrations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in ascending version order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &CustomMigration)> {
        self.entries.iter().map(|(v, m)| (*v, m))
    }
}

/// Kind of a migration unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitKind {
    /// SQL file pair.
    File,
    /// Custom procedure.
    Custom,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => f.write_str("file"),
            Self::Custom => f.write_str("custom"),
        }
    }
}

/// One version's worth of change.
#[derive(Debug, Clone)]
pub enum MigrationUnit {
    /// Executed by the step runner from `<version>_<description>.<up|down>.sql`.
    File {
        /// Version number.
        version: i64,
        /// Description part of the file name.
        description: String,
    },
    /// Executed in-process.
    Custom {
        /// Version number.
        version: i64,
        /// The procedures.
        migration: CustomMigration,
    },
}

impl MigrationUnit {
    /// Version of this unit.
    pub fn version(&self) -> i64 {
        match self {
            Self::File { version, .. } | Self::Custom { version, .. } => *version,
        }
    }

    /// Kind of this unit.
    pub fn kind(&self) -> UnitKind {
        match self {
            Self::File { .. } => UnitKind::File,
            Self::Custom { .. } => UnitKind::Custom,
        }
    }

    /// Check if this is a custom unit.
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom { .. })
    }

    /// Human readable label for logs.
    pub fn label(&self) -> String {
        match self {
            Self::File {
                version,
                description,
            } => format!("{version}_{description}"),
            Self::Custom { version, .. } => format!("{version} (custom)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;

    use super::*;

    fn noop() -> CustomMigration {
        CustomMigration::new(|_| async { Ok(()) }.boxed(), |_| async { Ok(()) }.boxed())
    }

    #[test]
    fn test_resulting_version() {
        assert_eq!(resulting_version(3, MigrationDirection::Up), 3);
        assert_eq!(resulting_version(3, MigrationDirection::Down), 2);
        assert_eq!(resulting_version(1, MigrationDirection::Down), 0);
        assert_eq!(resulting_version(5, MigrationDirection::Force), 5);
    }

    #[test]
    fn test_direction_labels() {
        assert_eq!(MigrationDirection::Up.to_string(), "Up");
        assert_eq!(MigrationDirection::parse("Down"), Some(MigrationDirection::Down));
        assert_eq!(MigrationDirection::parse(""), None);
        assert_eq!(MigrationDirection::parse("sideways"), None);
    }

    #[test]
    fn test_builder_requires_both_halves() {
        let err = CustomMigration::builder()
            .up(|_| async { Ok(()) }.boxed())
            .build(4)
            .unwrap_err();
        assert!(matches!(err, MigrationError::IncompleteCustomMigration(4)));

        assert!(
            CustomMigration::builder()
                .up(|_| async { Ok(()) }.boxed())
                .down(|_| async { Ok(()) }.boxed())
                .build(4)
                .is_ok()
        );
    }

    #[test]
    fn test_unit_accessors() {
        let file = MigrationUnit::File {
            version: 2,
            description: "add_users".into(),
        };
        let custom = MigrationUnit::Custom {
            version: 3,
            migration: noop(),
        };

        assert_eq!(file.version(), 2);
        assert_eq!(file.kind(), UnitKind::File);
        assert_eq!(file.label(), "2_add_users");
        assert!(custom.is_custom());
        assert_eq!(custom.kind().to_string(), "custom");
    }

    #[test]
    fn test_registry_orders_versions() {
        let customs = CustomMigrations::new().with(5, noop()).with(2, noop());
        let versions: Vec<i64> = customs.iter().map(|(v, _)| v).collect();
        assert_eq!(versions, vec![2, 5]);
        assert_eq!(customs.len(), 2);
    }
}
