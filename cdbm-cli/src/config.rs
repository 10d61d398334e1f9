//! CLI configuration handling.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cli::{DbProtocol, GlobalArgs};
use crate::error::{CliError, CliResult};

/// Default config file name (looked up in the working directory)
pub const CONFIG_FILE_NAME: &str = "cdbm.toml";

/// Environment variable holding the config file path
pub const CONFIG_ENV_VAR: &str = "CDBM_CONFIG";

/// The only supported source protocol for migration files
pub const FILE_PROTOCOL: &str = "file://";

/// cdbm configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database protocol (postgres, cockroachdb, sqlite)
    pub db_protocol: Option<DbProtocol>,

    /// Migration settings
    pub migrate: MigrateSection,

    /// Error log settings
    pub logs: LogsSection,

    /// Connections, tried in order
    pub connections: Vec<ConnectionConfig>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Locate and load the configuration for this invocation.
    ///
    /// Lookup order: `--config`, the variable named by `--env`, `CDBM_CONFIG`,
    /// then `./cdbm.toml`. No file at all yields the defaults.
    pub fn resolve(global: &GlobalArgs) -> CliResult<Self> {
        match locate(global)? {
            Some(path) => {
                debug!(path = %path.display(), "Loading configuration");
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }
}

fn locate(global: &GlobalArgs) -> CliResult<Option<PathBuf>> {
    if let Some(path) = &global.config {
        return Ok(Some(path.clone()));
    }

    if let Some(var) = &global.env_var {
        let value = std::env::var(var).map_err(|_| {
            CliError::config(format!("environment variable {} is not set", var))
        })?;
        return Ok(Some(PathBuf::from(value)));
    }

    if let Ok(value) = std::env::var(CONFIG_ENV_VAR) {
        if !value.is_empty() {
            return Ok(Some(PathBuf::from(value)));
        }
    }

    let default = PathBuf::from(CONFIG_FILE_NAME);
    Ok(default.exists().then_some(default))
}

/// `[migrate]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MigrateSection {
    /// Directory for migration files
    pub migrations_dir: Option<PathBuf>,

    /// Source protocol of the migration files
    pub migrations_protocol: String,

    /// Target version (absent means latest)
    pub target_version: Option<i64>,

    /// Roll back a failed up-run
    pub rollback_on_failure: bool,

    /// Allow migrating a dirty database
    pub reset_dirty_flag: bool,

    /// Continue when undoing a dirty version fails
    pub skip_reset_on_failure: bool,

    /// Tracking table name
    pub table_name: Option<String>,

    /// Wrap each migration file in a transaction
    pub use_transaction: bool,
}

impl Default for MigrateSection {
    fn default() -> Self {
        Self {
            migrations_dir: None,
            migrations_protocol: FILE_PROTOCOL.to_string(),
            target_version: None,
            rollback_on_failure: false,
            reset_dirty_flag: false,
            skip_reset_on_failure: false,
            table_name: None,
            use_transaction: true,
        }
    }
}

/// `[logs]` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogsSection {
    /// Error log file
    pub log_file: Option<PathBuf>,
}

/// One `[[connections]]` entry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Label used in log lines
    pub name: Option<String>,
    /// Host
    pub host: Option<String>,
    /// Port
    pub port: Option<u16>,
    /// User
    pub user: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Database name, or file path for SQLite
    pub database: Option<String>,
    /// SSL mode (disable, prefer, require)
    pub ssl_mode: Option<String>,
    /// CA certificates for verifying the server
    pub ssl_root_cert: Option<PathBuf>,
    /// Client certificate
    pub ssl_cert: Option<PathBuf>,
    /// Client private key
    pub ssl_key: Option<PathBuf>,
}

impl ConnectionConfig {
    /// Label for log lines.
    pub fn label(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("connection #{}", index + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            db_protocol = "cockroachdb"

            [migrate]
            migrations_dir = "db/migrations"
            target_version = 4
            rollback_on_failure = true
            use_transaction = false

            [logs]
            log_file = "logs/cdbm.log"

            [[connections]]
            name = "primary"
            host = "db1"
            port = 26257
            user = "root"
            database = "app"

            [[connections]]
            host = "db2"
            database = "app"
            ssl_mode = "require"
            ssl_root_cert = "certs/ca.crt"
            ssl_cert = "certs/client.root.crt"
            ssl_key = "certs/client.root.key"
            "#,
        )
        .unwrap();

        assert_eq!(config.db_protocol, Some(DbProtocol::Cockroachdb));
        assert_eq!(config.migrate.target_version, Some(4));
        assert!(config.migrate.rollback_on_failure);
        assert!(!config.migrate.use_transaction);
        assert_eq!(config.migrate.migrations_protocol, FILE_PROTOCOL);
        assert_eq!(config.logs.log_file, Some(PathBuf::from("logs/cdbm.log")));
        assert_eq!(config.connections.len(), 2);
        assert_eq!(config.connections[0].label(0), "primary");
        assert_eq!(config.connections[1].label(1), "connection #2");
        assert_eq!(
            config.connections[1].ssl_root_cert,
            Some(PathBuf::from("certs/ca.crt"))
        );
        assert!(config.connections[0].ssl_key.is_none());
    }

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.db_protocol.is_none());
        assert!(config.migrate.use_transaction);
        assert!(config.connections.is_empty());
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "db_protocol = \"sqlite\"\n").unwrap();

        let global = GlobalArgs {
            config: Some(path),
            ..Default::default()
        };
        let config = Config::resolve(&global).unwrap();
        assert_eq!(config.db_protocol, Some(DbProtocol::Sqlite));
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let global = GlobalArgs {
            config: Some(PathBuf::from("/nonexistent/cdbm.toml")),
            ..Default::default()
        };
        assert!(matches!(
            Config::resolve(&global),
            Err(CliError::Config(_))
        ));
    }
}
