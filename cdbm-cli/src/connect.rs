//! Connection establishment with fallback across configured connections.

use std::path::Path;
use std::sync::Arc;

use cdbm_migrate::{Database, Dialect};
use cdbm_postgres::{PgConfig, PgConfigBuilder, PgDatabase, SslMode};
use cdbm_sqlite::{SqliteConfig, SqliteDatabase};
use tracing::{info, warn};

use crate::cli::{DbProtocol, GlobalArgs};
use crate::config::{Config, ConnectionConfig};
use crate::error::{CliError, CliResult};

/// Message when there was nothing to try, or nothing worked.
pub const NO_CONNECTION: &str = "no connection to database was established";

/// Something that can be connected to.
#[derive(Debug, Clone)]
pub enum Target {
    /// PostgreSQL or CockroachDB server.
    Postgres(PgConfig),
    /// SQLite file.
    Sqlite(SqliteConfig),
}

/// A connection candidate and the label used when reporting it.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Label for log lines.
    pub label: String,
    /// Connection target.
    pub target: Target,
}

/// An open database handle.
pub struct Connection {
    /// Handle for the migration engine.
    pub db: Arc<dyn Database>,
    /// Tracking-table dialect.
    pub dialect: Dialect,
    /// Label of the candidate that succeeded.
    pub label: String,
}

/// Resolve the protocol from the flags or the config file.
pub fn protocol(global: &GlobalArgs, config: &Config) -> CliResult<DbProtocol> {
    global.db_protocol.or(config.db_protocol).ok_or_else(|| {
        CliError::config("--db-protocol is required (postgres, cockroachdb or sqlite)")
    })
}

/// List the candidates to try, in order.
///
/// A `--database` flag goes first. The configured connections follow it
/// only with `--use-file-on-fail`; without the flag they are the whole list.
pub fn plan(global: &GlobalArgs, config: &Config) -> CliResult<Vec<Candidate>> {
    let protocol = protocol(global, config)?;
    let mut candidates = Vec::new();

    if let Some(database) = &global.database {
        candidates.push(flag_candidate(protocol, global, database)?);
        if !global.use_file_on_fail {
            return Ok(candidates);
        }
    }

    for (index, conn) in config.connections.iter().enumerate() {
        candidates.push(Candidate {
            label: conn.label(index),
            target: config_target(protocol, conn)?,
        });
    }

    Ok(candidates)
}

fn flag_candidate(
    protocol: DbProtocol,
    global: &GlobalArgs,
    database: &str,
) -> CliResult<Candidate> {
    let target = match protocol {
        DbProtocol::Sqlite => Target::Sqlite(SqliteConfig::from_url(database)?),
        DbProtocol::Postgres | DbProtocol::Cockroachdb => {
            let (Some(host), Some(user), Some(port)) = (&global.host, &global.user, global.port)
            else {
                return Err(CliError::config(
                    "--host, --user and --port are required when --database is given",
                ));
            };

            let mut builder = PgConfig::builder()
                .host(host)
                .port(port)
                .user(user)
                .database(database);
            if let Some(password) = &global.password {
                builder = builder.password(password);
            }
            let builder = with_tls(
                builder,
                global.ssl_mode.as_deref(),
                global.ssl_root_cert.as_deref(),
                global.ssl_cert.as_deref(),
                global.ssl_key.as_deref(),
            )?;
            Target::Postgres(builder.build()?)
        }
    };

    Ok(Candidate {
        label: "command line".to_string(),
        target,
    })
}

fn config_target(protocol: DbProtocol, conn: &ConnectionConfig) -> CliResult<Target> {
    let database = conn
        .database
        .as_deref()
        .ok_or_else(|| CliError::config("every [[connections]] entry needs a database"))?;

    match protocol {
        DbProtocol::Sqlite => Ok(Target::Sqlite(SqliteConfig::from_url(database)?)),
        DbProtocol::Postgres | DbProtocol::Cockroachdb => {
            let mut builder = PgConfig::builder().database(database);
            if let Some(host) = &conn.host {
                builder = builder.host(host);
            }
            if let Some(port) = conn.port {
                builder = builder.port(port);
            }
            if let Some(user) = &conn.user {
                builder = builder.user(user);
            }
            if let Some(password) = &conn.password {
                builder = builder.password(password);
            }
            let builder = with_tls(
                builder,
                conn.ssl_mode.as_deref(),
                conn.ssl_root_cert.as_deref(),
                conn.ssl_cert.as_deref(),
                conn.ssl_key.as_deref(),
            )?;
            Ok(Target::Postgres(builder.build()?))
        }
    }
}

fn with_tls(
    mut builder: PgConfigBuilder,
    ssl_mode: Option<&str>,
    root_cert: Option<&Path>,
    cert: Option<&Path>,
    key: Option<&Path>,
) -> CliResult<PgConfigBuilder> {
    if let Some(mode) = ssl_mode {
        builder = builder.ssl_mode(mode.parse::<SslMode>()?);
    }
    if let Some(path) = root_cert {
        builder = builder.ssl_root_cert(path);
    }
    if let Some(path) = cert {
        builder = builder.ssl_cert(path);
    }
    if let Some(path) = key {
        builder = builder.ssl_key(path);
    }
    Ok(builder)
}

async fn open(target: &Target) -> CliResult<(Arc<dyn Database>, Dialect)> {
    match target {
        Target::Postgres(config) => Ok((
            PgDatabase::connect(config).await?.into_shared(),
            Dialect::Postgres,
        )),
        Target::Sqlite(config) => Ok((
            SqliteDatabase::open(config).await?.into_shared(),
            Dialect::Sqlite,
        )),
    }
}

/// Try each candidate in order; the first success wins.
pub async fn establish(global: &GlobalArgs, config: &Config) -> CliResult<Connection> {
    let mut last_error = None;

    for candidate in plan(global, config)? {
        match open(&candidate.target).await {
            Ok((db, dialect)) => {
                info!(connection = %candidate.label, "Connected");
                return Ok(Connection {
                    db,
                    dialect,
                    label: candidate.label,
                });
            }
            Err(e) => {
                warn!(connection = %candidate.label, error = %e, "Connection failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| CliError::database(NO_CONNECTION)))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn pg_connection(name: &str) -> ConnectionConfig {
        ConnectionConfig {
            name: Some(name.to_string()),
            host: Some("db".to_string()),
            database: Some("app".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_protocol_required() {
        let err = plan(&GlobalArgs::default(), &Config::default()).unwrap_err();
        assert!(err.to_string().contains("--db-protocol is required"));
    }

    #[test]
    fn test_flag_database_needs_host_user_port() {
        let global = GlobalArgs {
            db_protocol: Some(DbProtocol::Postgres),
            database: Some("app".to_string()),
            host: Some("localhost".to_string()),
            ..Default::default()
        };
        let err = plan(&global, &Config::default()).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_flag_database_without_fallback() {
        let global = GlobalArgs {
            db_protocol: Some(DbProtocol::Sqlite),
            database: Some("app.db".to_string()),
            ..Default::default()
        };
        let config = Config {
            connections: vec![ConnectionConfig {
                database: Some("other.db".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };

        let candidates = plan(&global, &config).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].label, "command line");
    }

    #[test]
    fn test_fallback_appends_configured_connections() {
        let global = GlobalArgs {
            db_protocol: Some(DbProtocol::Postgres),
            database: Some("app".to_string()),
            host: Some("localhost".to_string()),
            user: Some("postgres".to_string()),
            port: Some(5432),
            use_file_on_fail: true,
            ..Default::default()
        };
        let config = Config {
            connections: vec![pg_connection("primary"), pg_connection("replica")],
            ..Default::default()
        };

        let labels: Vec<_> = plan(&global, &config)
            .unwrap()
            .into_iter()
            .map(|c| c.label)
            .collect();
        assert_eq!(labels, vec!["command line", "primary", "replica"]);
    }

    #[test]
    fn test_tls_options_reach_pg_config() {
        let global = GlobalArgs {
            db_protocol: Some(DbProtocol::Cockroachdb),
            database: Some("app".to_string()),
            host: Some("db".to_string()),
            user: Some("migrator".to_string()),
            port: Some(26257),
            ssl_mode: Some("require".to_string()),
            ssl_root_cert: Some("certs/ca.crt".into()),
            ssl_cert: Some("certs/client.crt".into()),
            ssl_key: Some("certs/client.key".into()),
            ..Default::default()
        };

        let candidates = plan(&global, &Config::default()).unwrap();
        let Target::Postgres(config) = &candidates[0].target else {
            panic!("expected a postgres target");
        };
        assert_eq!(config.ssl_mode, SslMode::Require);
        assert_eq!(config.ssl_root_cert, Some(PathBuf::from("certs/ca.crt")));
        assert_eq!(config.ssl_key, Some(PathBuf::from("certs/client.key")));
    }

    #[test]
    fn test_connection_entry_client_cert_needs_key() {
        let config = Config {
            db_protocol: Some(DbProtocol::Postgres),
            connections: vec![ConnectionConfig {
                ssl_cert: Some("certs/client.crt".into()),
                ..pg_connection("primary")
            }],
            ..Default::default()
        };

        let err = plan(&GlobalArgs::default(), &config).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
        assert!(err.to_string().contains("ssl_cert and ssl_key"));
    }

    #[tokio::test]
    async fn test_nothing_configured() {
        let global = GlobalArgs {
            db_protocol: Some(DbProtocol::Postgres),
            ..Default::default()
        };
        let err = establish(&global, &Config::default()).await.err().unwrap();
        assert_eq!(err.to_string(), format!("Database error: {}", NO_CONNECTION));
    }

    #[tokio::test]
    async fn test_first_working_connection_wins() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing").join("nested").join("app.db");
        let good = dir.path().join("app.db");

        let config = Config {
            db_protocol: Some(DbProtocol::Sqlite),
            connections: vec![
                ConnectionConfig {
                    name: Some("broken".to_string()),
                    database: Some(missing.display().to_string()),
                    ..Default::default()
                },
                ConnectionConfig {
                    name: Some("local".to_string()),
                    database: Some(good.display().to_string()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let conn = establish(&GlobalArgs::default(), &config).await.ok().unwrap();
        assert_eq!(conn.label, "local");
        assert_eq!(conn.dialect, Dialect::Sqlite);
    }
}
