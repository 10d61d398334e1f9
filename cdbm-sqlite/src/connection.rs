//! SQLite database handle.

use std::sync::Arc;

use async_trait::async_trait;
use cdbm_migrate::{Database, MigrateResult, SqlRow, SqlValue};
use rusqlite::params_from_iter;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::config::{DatabasePath, SqliteConfig};
use crate::error::{SqliteError, SqliteResult};
use crate::types::{from_sqlite_value, to_sqlite_value};

/// A single SQLite connection used for a whole migration run.
#[derive(Clone)]
pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    /// Open a database with the given configuration.
    pub async fn open(config: &SqliteConfig) -> SqliteResult<Self> {
        let init_sql = config.init_sql();

        let conn = match &config.path {
            DatabasePath::Memory => Connection::open_in_memory().await?,
            DatabasePath::File(path) => {
                debug!(path = %path.display(), "Opening SQLite database");
                Connection::open(path).await?
            }
        };

        conn.call(move |conn| {
            conn.execute_batch(&init_sql)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Open a fresh in-memory database.
    pub async fn memory() -> SqliteResult<Self> {
        Self::open(&SqliteConfig::memory()).await
    }

    /// Open a database from a URL or path.
    pub async fn from_url(url: &str) -> SqliteResult<Self> {
        Self::open(&SqliteConfig::from_url(url)?).await
    }

    /// Wrap this handle for use by the migration engine.
    pub fn into_shared(self) -> Arc<dyn Database> {
        Arc::new(self)
    }

    async fn query_rows(&self, sql: &str, params: &[SqlValue]) -> SqliteResult<Vec<SqlRow>> {
        let sql = sql.to_string();
        let params: Vec<_> = params.iter().map(to_sqlite_value).collect();
        debug!(sql = %sql, "Executing query");

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let columns = stmt.column_count();

                let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
                    let mut values = Vec::with_capacity(columns);
                    for i in 0..columns {
                        values.push(from_sqlite_value(row.get_ref(i)?));
                    }
                    Ok(SqlRow::new(values))
                })?;

                let results: Result<Vec<_>, _> = rows.collect();
                Ok(results?)
            })
            .await
            .map_err(SqliteError::from)
    }

    async fn execute_params(&self, sql: &str, params: &[SqlValue]) -> SqliteResult<u64> {
        let sql = sql.to_string();
        let params: Vec<_> = params.iter().map(to_sqlite_value).collect();
        debug!(sql = %sql, "Executing statement");

        self.conn
            .call(move |conn| {
                let affected = conn.execute(&sql, params_from_iter(params.iter()))?;
                Ok(affected as u64)
            })
            .await
            .map_err(SqliteError::from)
    }

    async fn execute_script(&self, sql: &str) -> SqliteResult<()> {
        let sql = sql.to_string();
        debug!(len = sql.len(), "Executing script");

        self.conn
            .call(move |conn| {
                conn.execute_batch(&sql)?;
                Ok(())
            })
            .await
            .map_err(SqliteError::from)
    }
}

#[async_trait]
impl Database for SqliteDatabase {
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
