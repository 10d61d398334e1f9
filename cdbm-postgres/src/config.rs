//! PostgreSQL connection configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{PgError, PgResult};

/// PostgreSQL connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgConfig {
    /// Host.
    pub host: String,
    /// Port (default: 5432).
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Username.
    pub user: String,
    /// Password.
    pub password: Option<String>,
    /// SSL mode.
    pub ssl_mode: SslMode,
    /// PEM file with the certificates that sign the server certificate.
    pub ssl_root_cert: Option<PathBuf>,
    /// PEM client certificate chain.
    pub ssl_cert: Option<PathBuf>,
    /// PEM private key for `ssl_cert`.
    pub ssl_key: Option<PathBuf>,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Application name (shown in pg_stat_activity).
    pub application_name: Option<String>,
}

/// SSL mode for connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// Disable SSL.
    Disable,
    /// Use SSL when certificate files are configured, plain text otherwise.
    #[default]
    Prefer,
    /// Require SSL with a verified server certificate.
    Require,
}

impl SslMode {
    fn to_pg(self) -> tokio_postgres::config::SslMode {
        match self {
            Self::Disable => tokio_postgres::config::SslMode::Disable,
            Self::Prefer => tokio_postgres::config::SslMode::Prefer,
            Self::Require => tokio_postgres::config::SslMode::Require,
        }
    }
}

impl FromStr for SslMode {
    type Err = PgError;

    fn from_str(s: &str) -> PgResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disable" => Ok(Self::Disable),
            "prefer" => Ok(Self::Prefer),
            "require" => Ok(Self::Require),
            other => Err(PgError::config(format!(
                "invalid sslmode: {} (expected disable, prefer or require)",
                other
            ))),
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disable => f.write_str("disable"),
            Self::Prefer => f.write_str("prefer"),
            Self::Require => f.write_str("require"),
        }
    }
}

impl PgConfig {
    /// Create a new configuration from a database URL.
    ///
    /// Accepts the `postgres`, `postgresql` and `cockroachdb` schemes.
    pub fn from_url(url: impl AsRef<str>) -> PgResult<Self> {
        let parsed = url::Url::parse(url.as_ref())
            .map_err(|e| PgError::config(format!("invalid database URL: {}", e)))?;

        if !matches!(parsed.scheme(), "postgresql" | "postgres" | "cockroachdb") {
            return Err(PgError::config(format!(
                "invalid scheme: expected 'postgresql', 'postgres' or 'cockroachdb', got '{}'",
                parsed.scheme()
            )));
        }

        let mut builder = PgConfig::builder()
            .host(
                parsed
                    .host_str()
                    .ok_or_else(|| PgError::config("missing host in URL"))?,
            )
            .port(parsed.port().unwrap_or(5432))
            .database(parsed.path().trim_start_matches('/'));

        if !parsed.username().is_empty() {
            builder = builder.user(parsed.username());
        }
        if let Some(password) = parsed.password() {
            builder = builder.password(password);
        }

        for (key, value) in parsed.query_pairs() {
            match &*key {
                "sslmode" => builder = builder.ssl_mode(value.parse()?),
                "connect_timeout" => {
                    let secs: u64 = value
                        .parse()
                        .map_err(|_| PgError::config("invalid connect_timeout"))?;
                    builder = builder.connect_timeout(Duration::from_secs(secs));
                }
                "application_name" => builder = builder.application_name(&*value),
                "sslrootcert" => builder = builder.ssl_root_cert(&*value),
                "sslcert" => builder = builder.ssl_cert(&*value),
                "sslkey" => builder = builder.ssl_key(&*value),
                _ => {}
            }
        }

        builder.build()
    }

    /// Create a builder for configuration.
    pub fn builder() -> PgConfigBuilder {
        PgConfigBuilder::new()
    }

    /// Connection target for log lines, without the password.
    pub fn redacted(&self) -> String {
        format!(
            "postgresql://{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }

    /// Convert to tokio-postgres config.
    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config.host(&self.host);
        config.port(self.port);
        config.dbname(&self.database);
        config.user(&self.user);
        config.ssl_mode(self.ssl_mode.to_pg());

        if let Some(ref password) = self.password {
            config.password(password);
        }

        if let Some(ref app_name) = self.application_name {
            config.application_name(app_name);
        }

        config.connect_timeout(self.connect_timeout);

        config
    }
}

/// Builder for PostgreSQL configuration.
#[derive(Debug, Default)]
pub struct PgConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    user: Option<String>,
    password: Option<String>,
    ssl_mode: Option<SslMode>,
    ssl_root_cert: Option<PathBuf>,
    ssl_cert: Option<PathBuf>,
    ssl_key: Option<PathBuf>,
    connect_timeout: Option<Duration>,
    application_name: Option<String>,
}

impl PgConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the database name.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the username.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the SSL mode.
    pub fn ssl_mode(mut self, mode: SslMode) -> Self {
        self.ssl_mode = Some(mode);
        self
    }

    /// Set the root certificate file.
    pub fn ssl_root_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ssl_root_cert = Some(path.into());
        self
    }

    /// Set the client certificate file.
    pub fn ssl_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ssl_cert = Some(path.into());
        self
    }

    /// Set the client private key file.
    pub fn ssl_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.ssl_key = Some(path.into());
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the application name.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> PgResult<PgConfig> {
        let database = self
            .database
            .filter(|d| !d.is_empty())
            .ok_or_else(|| PgError::config("database name is required"))?;

        if self.ssl_cert.is_some() != self.ssl_key.is_some() {
            return Err(PgError::config(
                "ssl_cert and ssl_key must be given together",
            ));
        }

        Ok(PgConfig {
            host: self.host.unwrap_or_else(|| "localhost".to_string()),
            port: self.port.unwrap_or(5432),
            database,
            user: self.user.unwrap_or_else(|| "postgres".to_string()),
            password: self.password,
            ssl_mode: self.ssl_mode.unwrap_or_default(),
            ssl_root_cert: self.ssl_root_cert,
            ssl_cert: self.ssl_cert,
            ssl_key: self.ssl_key,
            connect_timeout: self.connect_timeout.unwrap_or(Duration::from_secs(30)),
            application_name: self
                .application_name
                .or_else(|| Some("cdbm".to_string())),
        })
    }
}
