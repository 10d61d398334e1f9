//! PostgreSQL backend for the cdbm migration engine.
//!
//! Provides [`PgDatabase`], a [`cdbm_migrate::Database`] over a single
//! `tokio-postgres` client. CockroachDB speaks the same wire protocol and is
//! served by the same type. `sslmode=require` connects through a rustls
//! connector (see [`tls`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use cdbm_migrate::{Dialect, MigrationConfig, MigrationEngine};
//! use cdbm_postgres::{PgConfig, PgDatabase};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PgConfig::from_url("postgresql://postgres@localhost/app")?;
//!     let db = PgDatabase::connect(&config).await?.into_shared();
//!
//!     let engine = MigrationEngine::for_database(MigrationConfig::new(), db, Dialect::Postgres)?;
//!     println!("{}", engine.migrate().await?.summary());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod tls;
pub mod types;

pub use config::{PgConfig, PgConfigBuilder, SslMode};
pub use connection::PgDatabase;
pub use error::{PgError, PgResult};
