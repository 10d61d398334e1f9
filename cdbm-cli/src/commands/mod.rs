//! CLI command implementations.

use std::path::PathBuf;
use std::sync::Arc;

use cdbm_migrate::{
    CustomMigrations, DEFAULT_TABLE_NAME, FileLogger, MigrationLogger, NoopLogger,
};

use crate::cli::GlobalArgs;
use crate::config::Config;
use crate::connect::{self, Connection};
use crate::error::{CliError, CliResult};

pub mod drop;
pub mod force;
pub mod logs;
pub mod migrate;
pub mod status;
pub mod version;

/// Resolved settings shared by the commands of one invocation.
pub struct Context {
    /// Global flags.
    pub global: GlobalArgs,
    /// Loaded configuration file (or defaults).
    pub config: Config,
    /// Custom migrations compiled into this binary.
    pub custom: CustomMigrations,
}

impl Context {
    /// Load the configuration for `global`.
    pub fn load(global: GlobalArgs) -> CliResult<Self> {
        let config = Config::resolve(&global)?;
        Ok(Self {
            global,
            config,
            custom: CustomMigrations::new(),
        })
    }

    /// Register custom migrations for `migrate` and `force`.
    pub fn with_custom_migrations(mut self, custom: CustomMigrations) -> Self {
        self.custom = custom;
        self
    }

    /// Migrations directory from the flag or the config file.
    pub fn migrations_dir(&self, flag: Option<PathBuf>) -> CliResult<PathBuf> {
        flag.or_else(|| self.config.migrate.migrations_dir.clone())
            .ok_or_else(|| CliError::config("--migrations-dir is required"))
    }

    /// Tracking table name from the flag, the config file, or the default.
    pub fn table_name(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.config.migrate.table_name.clone())
            .unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string())
    }

    /// Error log path from `--log-file` or `[logs] log_file`.
    pub fn log_file(&self) -> Option<PathBuf> {
        self.global
            .log_file
            .clone()
            .or_else(|| self.config.logs.log_file.clone())
    }

    /// Logger for the migration engine.
    pub fn logger(&self) -> Arc<dyn MigrationLogger> {
        match self.log_file() {
            Some(path) => Arc::new(FileLogger::new(path)),
            None => Arc::new(NoopLogger),
        }
    }

    /// Connect to the first reachable database.
    pub async fn connect(&self) -> CliResult<Connection> {
        connect::establish(&self.global, &self.config).await
    }
}
