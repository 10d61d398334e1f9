//! SQL dialects for the tracking table and the drop command.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateResult, MigrationError};

/// Default name of the tracking table.
pub const DEFAULT_TABLE_NAME: &str = "schema_migrations";

/// Database engine family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL and CockroachDB.
    Postgres,
    /// SQLite.
    Sqlite,
}

impl Dialect {
    /// Positional parameter placeholder (1-based).
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Self::Postgres => format!("${n}"),
            Self::Sqlite => format!("?{n}"),
        }
    }

    /// Probe returning one row when the table named by the first parameter
    /// exists.
    pub fn table_exists_sql(&self) -> &'static str {
        match self {
            Self::Postgres => {
                "SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name::text = $1"
            }
            Self::Sqlite => "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        }
    }

    /// Statement creating the tracking table.
    pub fn create_table_sql(&self, table: &str) -> String {
        let table = quote_ident(table);
        match self {
            Self::Postgres => format!(
                "CREATE TABLE IF NOT EXISTS {table} (\n    \
                 version INT8 NOT NULL PRIMARY KEY,\n    \
                 dirty BOOLEAN NOT NULL,\n    \
                 dirty_state TEXT,\n    \
                 is_custom_migration BOOLEAN NOT NULL DEFAULT FALSE\n)"
            ),
            Self::Sqlite => format!(
                "CREATE TABLE IF NOT EXISTS {table} (\n    \
                 version INTEGER NOT NULL PRIMARY KEY,\n    \
                 dirty BOOLEAN NOT NULL,\n    \
                 dirty_state TEXT,\n    \
                 is_custom_migration BOOLEAN NOT NULL DEFAULT 0\n)"
            ),
        }
    }

    /// Single-row select of the schema state.
    pub fn select_state_sql(&self, table: &str) -> String {
        format!(
            "SELECT version, dirty, dirty_state, is_custom_migration FROM {} LIMIT 1",
            quote_ident(table)
        )
    }

    /// Insert of the first schema state row.
    pub fn insert_state_sql(&self, table: &str) -> String {
        format!(
            "INSERT INTO {} (version, dirty, dirty_state, is_custom_migration) VALUES ({}, {}, {}, {})",
            quote_ident(table),
            self.placeholder(1),
            self.placeholder(2),
            self.placeholder(3),
            self.placeholder(4),
        )
    }

    /// Update of the schema state. The table holds a single row, so there is
    /// no `WHERE` clause.
    pub fn update_state_sql(&self, table: &str) -> String {
        format!(
            "UPDATE {} SET version = {}, dirty = {}, dirty_state = {}, is_custom_migration = {}",
            quote_ident(table),
            self.placeholder(1),
            self.placeholder(2),
            self.placeholder(3),
            self.placeholder(4),
        )
    }

    /// Removal of the schema state row.
    pub fn delete_state_sql(&self, table: &str) -> String {
        format!("DELETE FROM {}", quote_ident(table))
    }

    /// Query listing the user tables in the current schema.
    pub fn list_tables_sql(&self) -> &'static str {
        match self {
            Self::Postgres => {
                "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_type = 'BASE TABLE'"
            }
            Self::Sqlite => {
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'"
            }
        }
    }

    /// Statement dropping one table.
    pub fn drop_table_sql(&self, table: &str) -> String {
        match self {
            Self::Postgres => format!("DROP TABLE IF EXISTS {} CASCADE", quote_ident(table)),
            Self::Sqlite => format!("DROP TABLE IF EXISTS {}", quote_ident(table)),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => f.write_str("postgres"),
            Self::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// Quote an identifier with double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Check that a tracking table name is a plain identifier.
pub fn validate_table_name(name: &str) -> MigrateResult<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');

    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') || name.len() > 63 {
        return Err(MigrationError::config(format!(
            "invalid tracking table name '{name}': expected letters, digits and underscores"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(2), "$2");
        assert_eq!(Dialect::Sqlite.placeholder(2), "?2");
    }

    #[test]
    fn test_update_has_no_where_clause() {
        let sql = Dialect::Postgres.update_state_sql(DEFAULT_TABLE_NAME);
        assert!(sql.starts_with("UPDATE \"schema_migrations\" SET version = $1"));
        assert!(!sql.contains("WHERE"));
    }

    #[test]
    fn test_create_table_columns() {
        for dialect in [Dialect::Postgres, Dialect::Sqlite] {
            let sql = dialect.create_table_sql("tracking");
            assert!(sql.contains("\"tracking\""));
            assert!(sql.contains("dirty_state TEXT"));
            assert!(sql.contains("is_custom_migration"));
        }
    }

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("schema_migrations").is_ok());
        assert!(validate_table_name("_v2").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("1abc").is_err());
        assert!(validate_table_name("bad name").is_err());
        assert!(validate_table_name("x\"; DROP TABLE y; --").is_err());
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
