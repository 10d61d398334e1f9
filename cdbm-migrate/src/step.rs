//! Execution of file-based migration steps.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::catalog::parse_file_name;
use crate::database::Database;
use crate::dialect::Dialect;
use crate::error::{MigrateResult, MigrationError};
use crate::migration::MigrationDirection;

/// Runs the SQL side of file-based migration units.
#[async_trait::async_trait]
pub trait StepRunner: Send + Sync {
    /// Apply the file of `version` in `direction`. `Force` runs nothing.
    async fn step(&self, version: i64, direction: MigrationDirection) -> MigrateResult<()>;

    /// Drop every table in the database.
    async fn drop_all(&self) -> MigrateResult<()>;
}

/// Reads `<version>_<description>.<up|down>.sql` scripts from a directory and
/// executes them through a [`Database`].
pub struct SqlFileStepRunner {
    db: Arc<dyn Database>,
    dialect: Dialect,
    migrations_dir: PathBuf,
    use_transaction: bool,
}

impl SqlFileStepRunner {
    /// Create a runner over `migrations_dir`. Scripts run in a transaction.
    pub fn new(db: Arc<dyn Database>, dialect: Dialect, migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            db,
            dialect,
            migrations_dir: migrations_dir.into(),
            use_transaction: true,
        }
    }

    /// Set whether each script is wrapped in a transaction.
    pub fn use_transaction(mut self, enabled: bool) -> Self {
        self.use_transaction = enabled;
        self
    }

    /// Directory scripts are read from.
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Locate the script for `version` in `direction`.
    pub async fn script_path(
        &self,
        version: i64,
        direction: MigrationDirection,
    ) -> MigrateResult<PathBuf> {
        let mut entries = tokio::fs::read_dir(&self.migrations_dir)
            .await
            .map_err(MigrationError::Io)?;

        while let Some(entry) = entries.next_entry().await.map_err(MigrationError::Io)? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Ok(parsed) = parse_file_name(name) {
                if parsed.version == version && parsed.direction == direction {
                    return Ok(entry.path());
                }
            }
        }

        Err(MigrationError::IncompleteFilePair {
            version,
            missing: match direction {
                MigrationDirection::Down => "down",
                _ => "up",
            },
        })
    }

    async fn run_script(&self, sql: &str) -> MigrateResult<()> {
        if !self.use_transaction {
            return self.db.batch_execute(sql).await;
        }

        self.db.batch_execute("BEGIN").await?;
        if let Err(e) = self.db.batch_execute(sql).await {
            if let Err(rollback) = self.db.batch_execute("ROLLBACK").await {
                warn!(error = %rollback, "Failed to roll back migration transaction");
            }
            return Err(e);
        }
        self.db.batch_execute("COMMIT").await
    }
}

#[async_trait::async_trait]
impl StepRunner for SqlFileStepRunner {
    async fn step(&self, version: i64, direction: MigrationDirection) -> MigrateResult<()> {
        if direction == MigrationDirection::Force {
            debug!(version, "Force step, nothing to execute");
            return Ok(());
        }

        let path = self.script_path(version, direction).await?;
        let sql = tokio::fs::read_to_string(&path)
            .await
            .map_err(MigrationError::Io)?;

        if sql.trim().is_empty() {
            debug!(version, %direction, path = %path.display(), "Empty migration script");
            return Ok(());
        }

        debug!(version, %direction, path = %path.display(), "Executing migration script");
        self.run_script(&sql).await
    }

    async fn drop_all(&self) -> MigrateResult<()> {
        let rows = self.db.query(self.dialect.list_tables_sql(), &[]).await?;
        for row in rows {
            let table = row.get_string(0)?;
            debug!(table = %table, "Dropping table");
            self.db
                .batch_execute(&self.dialect.drop_table_sql(&table))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::database::{SqlRow, SqlValue};

    #[derive(Default)]
    struct ScriptDb {
        executed: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    #[async_trait::async_trait]
    impl Database for ScriptDb {
        async fn query(&self, _sql: &str, _params: &[SqlValue]) -> MigrateResult<Vec<SqlRow>> {
            Ok(vec![
                SqlRow::new(vec![SqlValue::from("users")]),
                SqlRow::new(vec![SqlValue::from("schema_migrations")]),
            ])
        }

        async fn execute(&self, sql: &str, _params: &[SqlValue]) -> MigrateResult<u64> {
            self.executed.lock().push(sql.to_string());
            Ok(0)
        }

        async fn batch_execute(&self, sql: &str) -> MigrateResult<()> {
            self.executed.lock().push(sql.to_string());
            match self.fail_on {
                Some(needle) if sql.contains(needle) => Err(MigrationError::database("boom")),
                _ => Ok(()),
            }
        }
    }

    fn write_pair(dir: &Path, version: i64, up: &str, down: &str) {
        std::fs::write(dir.join(format!("{version:06}_step.up.sql")), up).unwrap();
        std::fs::write(dir.join(format!("{version:06}_step.down.sql")), down).unwrap();
    }

    #[tokio::test]
    async fn test_step_runs_in_transaction() {
        let dir = tempfile::tempdir().unwrap();
        write_pair(dir.path(), 1, "CREATE TABLE a (id INT);", "DROP TABLE a;");

        let db = Arc::new(ScriptDb::default());
        let runner = SqlFileStepRunner::new(db.clone(), Dialect::Sqlite, dir.path());

        runner.step(1, MigrationDirection::Down).await.unwrap();
        assert_eq!(
            *db.executed.lock(),
            vec!["BEGIN", "DROP TABLE a;", "COMMIT"]
        );
    }

    #[tokio::test]
    async fn test_failed_script_rolls_back_transaction() {
        let dir = tempfile::tempdir().unwrap();
        write_pair(dir.path(), 1, "CREATE TABLE a (id INT);", "DROP TABLE a;");

        let db = Arc::new(ScriptDb {
            fail_on: Some("CREATE"),
            ..Default::default()
        });
        let runner = SqlFileStepRunner::new(db.clone(), Dialect::Sqlite, dir.path());

        assert!(runner.step(1, MigrationDirection::Up).await.is_err());
        assert_eq!(
            *db.executed.lock(),
            vec!["BEGIN", "CREATE TABLE a (id INT);", "ROLLBACK"]
        );
    }

    #[tokio::test]
    async fn test_force_and_empty_scripts_execute_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_pair(dir.path(), 1, "", "  \n");

        let db = Arc::new(ScriptDb::default());
        let runner =
            SqlFileStepRunner::new(db.clone(), Dialect::Sqlite, dir.path()).use_transaction(false);

        runner.step(1, MigrationDirection::Up).await.unwrap();
        runner.step(1, MigrationDirection::Force).await.unwrap();
        assert!(db.executed.lock().is_empty());
    }

    #[tokio::test]
    async fn test_missing_script() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SqlFileStepRunner::new(Arc::new(ScriptDb::default()), Dialect::Sqlite, dir.path());

        let err = runner.step(7, MigrationDirection::Up).await.unwrap_err();
        assert!(matches!(err, MigrationError::IncompleteFilePair { version: 7, .. }));
    }

    #[tokio::test]
    async fn test_drop_all_drops_listed_tables() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(ScriptDb::default());
        let runner = SqlFileStepRunner::new(db.clone(), Dialect::Postgres, dir.path());

        runner.drop_all().await.unwrap();
        assert_eq!(
            *db.executed.lock(),
            vec![
                "DROP TABLE IF EXISTS \"users\" CASCADE",
                "DROP TABLE IF EXISTS \"schema_migrations\" CASCADE",
            ]
        );
    }
}
