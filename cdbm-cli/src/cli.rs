//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

use cdbm_migrate::Dialect;

/// cdbm - versioned database migrations
#[derive(Parser, Debug)]
#[command(name = "cdbm")]
#[command(version)]
#[command(about = "cdbm - versioned database migrations for PostgreSQL, CockroachDB and SQLite", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply or revert migrations up to a target version
    Migrate(MigrateArgs),

    /// Show the recorded schema state
    Status(StatusArgs),

    /// Drop every table in the database
    Drop(DropArgs),

    /// Record a version as clean without running any migration
    Force(ForceArgs),

    /// Print the migration error log
    Logs,

    /// Display version information
    Version,
}

// =============================================================================
// Global Options
// =============================================================================

/// Options shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Name of an environment variable holding the configuration file path
    #[arg(long = "env", value_name = "VAR", global = true)]
    pub env_var: Option<String>,

    /// Database protocol
    #[arg(long, global = true)]
    pub db_protocol: Option<DbProtocol>,

    /// Database name (a file path for SQLite)
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Database host
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Database port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Database user
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Database password
    #[arg(long, env = "CDBM_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// SSL mode (disable, prefer, require)
    #[arg(long, global = true)]
    pub ssl_mode: Option<String>,

    /// PEM file with the CA certificates that sign the server certificate
    #[arg(long, global = true)]
    pub ssl_root_cert: Option<PathBuf>,

    /// PEM client certificate
    #[arg(long, global = true, requires = "ssl_key")]
    pub ssl_cert: Option<PathBuf>,

    /// PEM private key for --ssl-cert
    #[arg(long, global = true, requires = "ssl_cert")]
    pub ssl_key: Option<PathBuf>,

    /// Fall back to the configured connections when --database fails
    #[arg(long, global = true)]
    pub use_file_on_fail: bool,

    /// Path of the migration error log
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Supported database protocols
#[derive(ValueEnum, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DbProtocol {
    Postgres,
    Cockroachdb,
    Sqlite,
}

impl DbProtocol {
    /// Tracking-table dialect for this protocol.
    pub fn dialect(&self) -> Dialect {
        match self {
            DbProtocol::Postgres | DbProtocol::Cockroachdb => Dialect::Postgres,
            DbProtocol::Sqlite => Dialect::Sqlite,
        }
    }
}

impl std::fmt::Display for DbProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbProtocol::Postgres => write!(f, "postgres"),
            DbProtocol::Cockroachdb => write!(f, "cockroachdb"),
            DbProtocol::Sqlite => write!(f, "sqlite"),
        }
    }
}

// =============================================================================
// Migrate Command
// =============================================================================

/// Arguments for the `migrate` command
#[derive(Args, Debug, Clone, Default)]
pub struct MigrateArgs {
    /// Version to migrate to (defaults to the latest)
    #[arg(short, long, allow_negative_numbers = true)]
    pub target_version: Option<i64>,

    /// Directory holding the migration files
    #[arg(short, long)]
    pub migrations_dir: Option<PathBuf>,

    /// Source protocol of the migration files
    #[arg(short = 'p', long)]
    pub migrations_protocol: Option<String>,

    /// Roll back to the starting version when an up-migration fails
    #[arg(short = 'f', long)]
    pub rollback_on_failure: bool,

    /// Clear a dirty state and undo the half-applied version before migrating
    #[arg(short = 'r', long)]
    pub reset_dirty_flag: bool,

    /// Continue when undoing a dirty version fails
    #[arg(long)]
    pub skip_reset_on_failure: bool,

    /// Name of the tracking table
    #[arg(long)]
    pub table_name: Option<String>,

    /// Run migration files outside a transaction
    #[arg(long)]
    pub no_transaction: bool,
}

// =============================================================================
// Status Command
// =============================================================================

/// Arguments for the `status` command
#[derive(Args, Debug, Clone, Default)]
pub struct StatusArgs {
    /// Print the state as JSON
    #[arg(long)]
    pub json: bool,

    /// Name of the tracking table
    #[arg(long)]
    pub table_name: Option<String>,
}

// =============================================================================
// Drop Command
// =============================================================================

/// Arguments for the `drop` command
#[derive(Args, Debug, Clone, Default)]
pub struct DropArgs {
    /// Skip the confirmation prompt
    #[arg(long)]
    pub confirm: bool,
}

// =============================================================================
// Force Command
// =============================================================================

/// Arguments for the `force` command
#[derive(Args, Debug, Clone)]
pub struct ForceArgs {
    /// Version to record (0 clears the tracking table)
    #[arg(id = "force_version", value_name = "VERSION", allow_negative_numbers = true)]
    pub version: i64,

    /// Directory holding the migration files
    #[arg(short, long)]
    pub migrations_dir: Option<PathBuf>,

    /// Name of the tracking table
    #[arg(long)]
    pub table_name: Option<String>,
}
