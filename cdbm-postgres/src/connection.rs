//! PostgreSQL database handle.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use cdbm_migrate::{Database, MigrateResult, SqlRow, SqlValue};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Statement};
use tracing::{debug, error, info};

use crate::config::PgConfig;
use crate::error::{PgError, PgResult};
use crate::tls;
use crate::types::{PgParam, from_pg_row, to_pg_params};

/// Drive the connection half in the background until the client is dropped.
fn spawn_connection<C>(connection: C)
where
    C: Future<Output = Result<(), tokio_postgres::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!(error = %e, "PostgreSQL connection closed with error");
        }
    });
}

/// A single client connection used for a whole migration run.
///
/// Works against PostgreSQL and CockroachDB.
pub struct PgDatabase {
    client: Client,
}

impl PgDatabase {
    /// Connect with the given configuration.
    pub async fn connect(config: &PgConfig) -> PgResult<Self> {
        let use_tls = tls::wants_tls(config);
        debug!(target = %config.redacted(), tls = use_tls, "Connecting to PostgreSQL");

        let pg_config = config.to_pg_config();
        let failed = |e: tokio_postgres::Error| {
            PgError::connection(format!("{}: {}", config.redacted(), e))
        };

        let client = if use_tls {
            let (client, connection) = pg_config
                .connect(tls::make_connector(config)?)
                .await
                .map_err(failed)?;
            spawn_connection(connection);
            client
        } else {
            let (client, connection) = pg_config.connect(NoTls).await.map_err(failed)?;
            spawn_connection(connection);
            client
        };

        info!(
            host = %config.host,
            database = %config.database,
            tls = use_tls,
            "Connected to PostgreSQL"
        );
        Ok(Self { client })
    }

    /// Connect using a database URL.
    pub async fn from_url(url: &str) -> PgResult<Self> {
        Self::connect(&PgConfig::from_url(url)?).await
    }

    /// Wrap this handle for use by the migration engine.
    pub fn into_shared(self) -> Arc<dyn Database> {
        Arc::new(self)
    }

    /// Get the underlying tokio-postgres client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Prepare `sql` and convert `params` to the types the server expects.
    async fn bind(&self, sql: &str, params: &[SqlValue]) -> PgResult<(Statement, Vec<PgParam>)> {
        let stmt = self.client.prepare(sql).await?;
        let pg_params = to_pg_params(params, stmt.params())?;
        Ok((stmt, pg_params))
    }

    async fn query_rows(&self, sql: &str, params: &[SqlValue]) -> PgResult<Vec<SqlRow>> {
        debug!(sql = %sql, "Executing query");

        let (stmt, pg_params) = self.bind(sql, params).await?;
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            pg_params.iter().map(|p| p.as_ref() as _).collect();

        let rows = self.client.query(&stmt, &param_refs).await?;
        rows.iter().map(from_pg_row).collect()
    }

    async fn execute_params(&self, sql: &str, params: &[SqlValue]) -> PgResult<u64> {
        debug!(sql = %sql, "Executing statement");

        let (stmt, pg_params) = self.bind(sql, params).await?;
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            pg_params.iter().map(|p| p.as_ref() as _).collect();

        Ok(self.client.execute(&stmt, &param_refs).await?)
    }

    async fn execute_script(&self, sql: &str) -> PgResult<()> {
        debug!(len = sql.len(), "Executing batch");
        self.client.batch_execute(sql).await?;
        Ok(())
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn query(&self, sql: &str, params: &[SqlValue]) -> MigrateResult<Vec<SqlRow>> {
        Ok(self.query_rows(sql, params).await?)
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> MigrateResult<u64> {
        Ok(self.execute_params(sql, params).await?)
    }

    async fn batch_execute(&self, sql: &str) -> MigrateResult<()> {
        Ok(self.execute_script(sql).await?)
    }
}
