//! SQLite backend for the cdbm migration engine.
//!
//! Wraps a single `tokio-rusqlite` connection behind the
//! [`cdbm_migrate::Database`] trait so that the engine, the schema state
//! store and custom migrations can run against SQLite.
//!
//! # Example
//!
//! ```rust,ignore
//! use cdbm_migrate::{Dialect, MigrationConfig, MigrationEngine};
//! use cdbm_sqlite::SqliteDatabase;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = SqliteDatabase::from_url("sqlite://./app.db").await?.into_shared();
//!     let engine = MigrationEngine::for_database(MigrationConfig::new(), db, Dialect::Sqlite)?;
//!     println!("{}", engine.migrate().await?.summary());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod types;

pub use config::{DatabasePath, JournalMode, SqliteConfig};
pub use connection::SqliteDatabase;
pub use error::{SqliteError, SqliteResult};
