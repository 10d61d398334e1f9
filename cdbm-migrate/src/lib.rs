//! # cdbm-migrate
//!
//! Versioned migration engine for cdbm.
//!
//! This crate provides functionality for:
//! - Merging SQL file pairs and custom code migrations into one ordered
//!   version sequence
//! - Tracking the schema state (version, dirty flag, direction in progress)
//!   in the target database
//! - Stepping up or down one version at a time, persisting progress after
//!   every step
//! - Refusing to migrate a dirty database unless told to, and undoing the
//!   half-applied version before resuming
//! - Rolling back to the starting version when an Up run fails
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ SQL files +  │────▶│   Catalog    │────▶│   Target     │
//! │ custom fns   │     └──────────────┘     └──────────────┘
//! └──────────────┘                                 │
//!                                                  ▼
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Schema state │────▶│  Dirty gate  │────▶│    Runner    │──▶ Rollback
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use cdbm_migrate::{CustomMigration, CustomMigrations, Dialect, MigrationConfig, MigrationEngine};
//! use futures::FutureExt;
//!
//! async fn run(db: Arc<dyn cdbm_migrate::Database>) -> cdbm_migrate::MigrateResult<()> {
//!     let config = MigrationConfig::new()
//!         .migrations_dir("./migrations")
//!         .rollback_on_failure(true);
//!
//!     let custom = CustomMigrations::new().with(
//!         3,
//!         CustomMigration::new(
//!             |db| async move { db.batch_execute("UPDATE users SET active = TRUE").await }.boxed(),
//!             |db| async move { db.batch_execute("UPDATE users SET active = FALSE").await }.boxed(),
//!         ),
//!     );
//!
//!     let engine = MigrationEngine::for_database(config, db, Dialect::Postgres)?
//!         .with_custom_migrations(custom);
//!
//!     let report = engine.migrate().await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```
//!
//! ## Migration Files
//!
//! ```text
//! migrations/
//! ├── 000001_create_users.up.sql
//! ├── 000001_create_users.down.sql
//! ├── 000002_add_email_index.up.sql
//! └── 000002_add_email_index.down.sql
//! ```

pub mod catalog;
pub mod database;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod logger;
pub mod migration;
mod rollback;
pub mod state;
pub mod step;

// Re-exports
pub use catalog::{Catalog, MigrationFileName, parse_file_name};
pub use database::{Database, SqlRow, SqlValue};
pub use dialect::{DEFAULT_TABLE_NAME, Dialect};
pub use engine::{
    AppliedStep, MigrationConfig, MigrationEngine, MigrationReport, MigrationRunContext,
};
pub use error::{MAX_REPORTED_GAPS, MigrateResult, MigrationError};
pub use logger::{FileLogger, MigrationLogger, NoopLogger};
pub use migration::{
    CustomMigration, CustomMigrationBuilder, CustomMigrations, MigrationDirection, MigrationFn,
    MigrationUnit, UnitKind, resulting_version,
};
pub use state::{SchemaRecord, SchemaState, SchemaStateStore, SqlSchemaStateStore};
pub use step::{SqlFileStepRunner, StepRunner};
