//! Migration engine implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::catalog::Catalog;
use crate::database::Database;
use crate::dialect::{DEFAULT_TABLE_NAME, Dialect, validate_table_name};
use crate::error::{MigrateResult, MigrationError};
use crate::logger::{MigrationLogger, NoopLogger};
use crate::migration::{
    CustomMigrations, MigrationDirection, MigrationUnit, UnitKind, resulting_version,
};
use crate::state::{SchemaState, SchemaStateStore, SqlSchemaStateStore};
use crate::step::{SqlFileStepRunner, StepRunner};

/// Configuration for the migration engine.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Path to the migrations directory.
    pub migrations_dir: PathBuf,
    /// Version to migrate to; `None` means the latest.
    pub target_version: Option<i64>,
    /// Roll back to the starting version when an Up step fails.
    pub rollback_on_failure: bool,
    /// Allow a dirty database to be migrated.
    pub reset_dirty_flag: bool,
    /// Continue when the corrective down-step of a dirty resume fails.
    pub skip_reset_on_failure: bool,
    /// Name of the tracking table.
    pub table_name: String,
    /// Wrap each SQL file in a transaction.
    pub use_transaction: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("./migrations"),
            target_version: None,
            rollback_on_failure: false,
            reset_dirty_flag: false,
            skip_reset_on_failure: false,
            table_name: DEFAULT_TABLE_NAME.to_string(),
            use_transaction: true,
        }
    }
}

impl MigrationConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the migrations directory.
    pub fn migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    /// Set the target version.
    pub fn target_version(mut self, version: Option<i64>) -> Self {
        self.target_version = version;
        self
    }

    /// Enable rollback on failure.
    pub fn rollback_on_failure(mut self, enabled: bool) -> Self {
        self.rollback_on_failure = enabled;
        self
    }

    /// Allow migrating a dirty database.
    pub fn reset_dirty_flag(mut self, enabled: bool) -> Self {
        self.reset_dirty_flag = enabled;
        self
    }

    /// Continue past a failed corrective down-step.
    pub fn skip_reset_on_failure(mut self, enabled: bool) -> Self {
        self.skip_reset_on_failure = enabled;
        self
    }

    /// Set the tracking table name.
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    /// Set whether SQL files run in a transaction.
    pub fn use_transaction(mut self, enabled: bool) -> Self {
        self.use_transaction = enabled;
        self
    }
}

/// A unit applied during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedStep {
    /// Version of the unit.
    pub version: i64,
    /// Direction applied.
    pub direction: MigrationDirection,
    /// Kind of the unit.
    pub kind: UnitKind,
}

/// Result of a migration run.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    /// Direction of the run, `None` when nothing had to change.
    pub direction: Option<MigrationDirection>,
    /// Version recorded when the run started.
    pub starting_version: i64,
    /// Version recorded when the run ended.
    pub final_version: i64,
    /// Whether the dirty flag was cleared before stepping.
    pub dirty_reset: bool,
    /// Version whose down-step was run to correct a dirty state.
    pub corrected_version: Option<i64>,
    /// Units applied, in order.
    pub applied: Vec<AppliedStep>,
    /// Total duration in milliseconds.
    pub duration_ms: i64,
}

impl MigrationReport {
    fn unchanged(version: i64) -> Self {
        Self {
            direction: None,
            starting_version: version,
            final_version: version,
            dirty_reset: false,
            corrected_version: None,
            applied: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Check if the run changed nothing.
    pub fn is_no_change(&self) -> bool {
        self.applied.is_empty() && self.corrected_version.is_none() && !self.dirty_reset
    }

    /// Get a summary of the result.
    pub fn summary(&self) -> String {
        if self.is_no_change() {
            return "No Change".to_string();
        }

        let mut parts = Vec::new();

        if let Some(version) = self.corrected_version {
            parts.push(format!("reset dirty version {version}"));
        }

        if !self.applied.is_empty() {
            let direction = self.direction.map_or("", |d| d.as_str());
            parts.push(format!("{} applied {}", self.applied.len(), direction));
        }

        format!(
            "{} ({} -> {}) in {}ms",
            parts.join(", "),
            self.starting_version,
            self.final_version,
            self.duration_ms
        )
    }
}

/// Per-invocation state of a migration run.
#[derive(Debug, Clone)]
pub struct MigrationRunContext {
    /// Direction of the walk.
    pub direction: MigrationDirection,
    /// Resolved target version.
    pub target_version: i64,
    /// Version recorded when the run started.
    pub starting_version: i64,
    /// Version rollback restores; the starting version, less one after a
    /// dirty correction.
    pub floor: i64,
    /// Last state written to the store.
    pub state: SchemaState,
}

/// The main migration engine.
pub struct MigrationEngine<S: SchemaStateStore, R: StepRunner> {
    pub(crate) config: MigrationConfig,
    pub(crate) db: Arc<dyn Database>,
    pub(crate) store: S,
    pub(crate) runner: R,
    pub(crate) logger: Arc<dyn MigrationLogger>,
    pub(crate) custom: CustomMigrations,
}

impl MigrationEngine<SqlSchemaStateStore, SqlFileStepRunner> {
    /// Create an engine that keeps its state in the target database and runs
    /// SQL files from the configured directory.
    pub fn for_database(
        config: MigrationConfig,
        db: Arc<dyn Database>,
        dialect: Dialect,
    ) -> MigrateResult<Self> {
        validate_table_name(&config.table_name)?;

        let store = SqlSchemaStateStore::new(db.clone(), dialect).with_table(&config.table_name)?;
        let runner = SqlFileStepRunner::new(db.clone(), dialect, &config.migrations_dir)
            .use_transaction(config.use_transaction);

        Ok(Self::new(config, db, store, runner))
    }
}

impl<S: SchemaStateStore, R: StepRunner> MigrationEngine<S, R> {
    /// Create a new migration engine.
    pub fn new(config: MigrationConfig, db: Arc<dyn Database>, store: S, runner: R) -> Self {
        Self {
            config,
            db,
            store,
            runner,
            logger: Arc::new(NoopLogger),
            custom: CustomMigrations::new(),
        }
    }

    /// Report failures to `logger`.
    pub fn with_logger(mut self, logger: Arc<dyn MigrationLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Register custom migrations.
    pub fn with_custom_migrations(mut self, custom: CustomMigrations) -> Self {
        self.custom = custom;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Get the state store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the step runner.
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Build the catalog from the migrations directory and the registered
    /// custom migrations.
    pub async fn catalog(&self) -> MigrateResult<Catalog> {
        Catalog::load(&self.config.migrations_dir, &self.custom).await
    }

    /// Read the current schema state.
    pub async fn status(&self) -> MigrateResult<SchemaState> {
        self.store.load().await
    }

    /// Drop every table through the step runner.
    pub async fn drop_all(&self) -> MigrateResult<()> {
        self.runner.drop_all().await?;
        info!("Dropped all tables");
        Ok(())
    }

    /// Record `version` as clean without running any migration body.
    pub async fn force(&self, version: i64) -> MigrateResult<SchemaState> {
        let catalog = self.catalog().await?;
        let version = catalog.resolve_target(Some(version))?;
        let state = self.store.load().await?;

        if version > 0 {
            self.runner.step(version, MigrationDirection::Force).await?;
        }

        let forced = SchemaState::clean(version, catalog.is_custom(version));
        self.store
            .save(&state, &forced)
            .await
            .map_err(|e| bookkeeping(version, e))?;

        info!(version, "Forced schema version");
        Ok(forced)
    }

    /// Migrate to the configured target version.
    pub async fn migrate(&self) -> MigrateResult<MigrationReport> {
        let start = Instant::now();

        let catalog = self.catalog().await?;
        let target = catalog.resolve_target(self.config.target_version)?;

        let mut state = self.store.load().await?;
        let starting_version = state.version();
        let was_dirty = state.is_dirty();

        debug!(%state, target, latest = catalog.latest(), "Loaded schema state");

        if starting_version > catalog.latest() {
            return Err(MigrationError::VersionNotInCatalog {
                version: starting_version,
                latest: catalog.latest(),
            });
        }

        if let SchemaState::Dirty {
            version,
            direction,
            is_custom,
        } = state
        {
            if !self.config.reset_dirty_flag {
                return Err(MigrationError::DirtyState { version, direction });
            }

            let cleared = SchemaState::Clean { version, is_custom };
            self.store
                .save(&state, &cleared)
                .await
                .map_err(|e| bookkeeping(version, e))?;
            state = cleared;
            info!(version, "Cleared dirty flag");
        }

        if !was_dirty && starting_version == target {
            info!(version = target, "No Change");
            return Ok(MigrationReport::unchanged(target));
        }

        let direction = if starting_version < target || (was_dirty && starting_version == target) {
            MigrationDirection::Up
        } else {
            MigrationDirection::Down
        };

        let mut ctx = MigrationRunContext {
            direction,
            target_version: target,
            starting_version,
            floor: starting_version,
            state,
        };

        let mut report = MigrationReport {
            direction: Some(direction),
            starting_version,
            final_version: starting_version,
            dirty_reset: was_dirty,
            corrected_version: None,
            applied: Vec::new(),
            duration_ms: 0,
        };

        if was_dirty {
            self.correct_dirty(&catalog, &mut ctx).await?;
            report.corrected_version = Some(starting_version);
        }

        let result = self.walk(&catalog, &mut ctx, &mut report).await;

        report.final_version = ctx.state.version();
        report.duration_ms = start.elapsed().as_millis() as i64;
        result?;

        info!(summary = %report.summary(), "Migration complete");
        Ok(report)
    }

    /// Undo the unit at the dirty version before resuming.
    async fn correct_dirty(
        &self,
        catalog: &Catalog,
        ctx: &mut MigrationRunContext,
    ) -> MigrateResult<()> {
        let version = ctx.starting_version;
        let baseline = resulting_version(version, MigrationDirection::Down);

        let outcome = match catalog.get(version) {
            Some(unit) => self.apply(unit, MigrationDirection::Down).await,
            None => Err(MigrationError::other(format!(
                "no migration unit at dirty version {version}"
            ))),
        };

        match outcome {
            Ok(()) => {
                info!(version, "Reset dirty migration");
            }
            Err(e) if self.config.skip_reset_on_failure => {
                let err = MigrationError::ResetFailed {
                    version,
                    source: Box::new(e),
                    bookkeeping: None,
                };
                warn!(error = %err, "Skipping failed reset of dirty migration");
                self.log(&err);
            }
            Err(e) => {
                let dirty = SchemaState::Dirty {
                    version,
                    direction: Some(MigrationDirection::Down),
                    is_custom: catalog.is_custom(version),
                };
                let recorded = self.store.save(&ctx.state, &dirty).await;
                if recorded.is_ok() {
                    ctx.state = dirty;
                }

                let err = MigrationError::ResetFailed {
                    version,
                    source: Box::new(e),
                    bookkeeping: recorded.err().map(|e| Box::new(bookkeeping(version, e))),
                };
                error!(error = %err, "Failed to reset dirty migration");
                self.log(&err);
                return Err(err);
            }
        }

        let corrected = SchemaState::clean(baseline, catalog.is_custom(baseline));
        self.store
            .save(&ctx.state, &corrected)
            .await
            .map_err(|e| self.logged(bookkeeping(baseline, e)))?;
        ctx.state = corrected;
        ctx.floor = baseline;

        Ok(())
    }

    /// Step through the catalog from the current state to the target.
    async fn walk(
        &self,
        catalog: &Catalog,
        ctx: &mut MigrationRunContext,
        report: &mut MigrationReport,
    ) -> MigrateResult<()> {
        let from = ctx.state.version();
        let target = ctx.target_version;

        let units: Vec<&MigrationUnit> = match ctx.direction {
            MigrationDirection::Down => catalog
                .units()
                .iter()
                .rev()
                .filter(|u| u.version() <= from && u.version() > target)
                .collect(),
            _ => catalog
                .units()
                .iter()
                .filter(|u| u.version() > from && u.version() <= target)
                .collect(),
        };

        for unit in units {
            let version = unit.version();
            let direction = ctx.direction;

            if let Err(e) = self.apply(unit, direction).await {
                let failure = self.record_failure(ctx, unit, direction, e).await;

                if direction == MigrationDirection::Up && self.config.rollback_on_failure {
                    return Err(self.rollback(catalog, ctx, version, failure).await);
                }
                return Err(failure);
            }

            let resulting = resulting_version(version, direction);
            let next = SchemaState::clean(resulting, catalog.is_custom(resulting));
            self.store
                .save(&ctx.state, &next)
                .await
                .map_err(|e| self.logged(bookkeeping(resulting, e)))?;
            ctx.state = next;

            info!(version, %direction, kind = %unit.kind(), "Applied migration");
            report.applied.push(AppliedStep {
                version,
                direction,
                kind: unit.kind(),
            });
        }

        Ok(())
    }

    /// Persist the dirty state for a failed unit and build the step error.
    async fn record_failure(
        &self,
        ctx: &mut MigrationRunContext,
        unit: &MigrationUnit,
        direction: MigrationDirection,
        source: MigrationError,
    ) -> MigrationError {
        let version = unit.version();
        let dirty = SchemaState::Dirty {
            version,
            direction: Some(direction),
            is_custom: unit.is_custom(),
        };

        let recorded = self.store.save(&ctx.state, &dirty).await;
        if recorded.is_ok() {
            ctx.state = dirty;
        }

        let err = MigrationError::StepFailed {
            version,
            kind: unit.kind(),
            direction,
            source: Box::new(source),
            bookkeeping: recorded.err().map(|e| Box::new(bookkeeping(version, e))),
        };
        error!(error = %err, "Migration step failed");
        self.log(&err);
        err
    }

    /// Run one unit in `direction`.
    pub(crate) async fn apply(
        &self,
        unit: &MigrationUnit,
        direction: MigrationDirection,
    ) -> MigrateResult<()> {
        debug!(unit = %unit.label(), %direction, "Applying migration unit");
        match unit {
            MigrationUnit::File { version, .. } => self.runner.step(*version, direction).await,
            MigrationUnit::Custom { migration, .. } => {
                migration.run(self.db.as_ref(), direction).await
            }
        }
    }

    pub(crate) fn log(&self, err: &MigrationError) {
        self.logger.log_error(Utc::now(), err);
    }

    pub(crate) fn logged(&self, err: MigrationError) -> MigrationError {
        self.log(&err);
        err
    }
}

pub(crate) fn bookkeeping(version: i64, source: MigrationError) -> MigrationError {
    MigrationError::Bookkeeping {
        version,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = MigrationConfig::new()
            .migrations_dir("/tmp/migrations")
            .target_version(Some(4))
            .rollback_on_failure(true)
            .reset_dirty_flag(true)
            .skip_reset_on_failure(true)
            .table_name("tracking")
            .use_transaction(false);

        assert_eq!(config.migrations_dir, PathBuf::from("/tmp/migrations"));
        assert_eq!(config.target_version, Some(4));
        assert!(config.rollback_on_failure);
        assert!(config.reset_dirty_flag);
        assert!(config.skip_reset_on_failure);
        assert_eq!(config.table_name, "tracking");
        assert!(!config.use_transaction);
    }

    #[test]
    fn test_config_defaults() {
        let config = MigrationConfig::default();
        assert_eq!(config.target_version, None);
        assert!(!config.rollback_on_failure);
        assert!(!config.skip_reset_on_failure);
        assert_eq!(config.table_name, "schema_migrations");
        assert!(config.use_transaction);
    }

    #[test]
    fn test_report_summary() {
        assert_eq!(MigrationReport::unchanged(3).summary(), "No Change");

        let report = MigrationReport {
            direction: Some(MigrationDirection::Up),
            starting_version: 0,
            final_version: 2,
            dirty_reset: false,
            corrected_version: None,
            applied: vec![
                AppliedStep {
                    version: 1,
                    direction: MigrationDirection::Up,
                    kind: UnitKind::File,
                },
                AppliedStep {
                    version: 2,
                    direction: MigrationDirection::Up,
                    kind: UnitKind::Custom,
                },
            ],
            duration_ms: 12,
        };
        assert!(!report.is_no_change());
        assert_eq!(report.summary(), "2 applied Up (0 -> 2) in 12ms");
    }
}
