//! Database handle abstraction shared by the engine, the state store and
//! custom migration procedures.

use std::fmt;

use crate::error::{MigrateResult, MigrationError};

/// A parameter or column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Text value.
    Text(String),
}

impl SqlValue {
    /// Check if the value is `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A single result row, accessed by column position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlRow {
    values: Vec<SqlValue>,
}

impl SqlRow {
    /// Create a row from its column values.
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a raw column value.
    pub fn get(&self, idx: usize) -> Option<&SqlValue> {
        self.values.get(idx)
    }

    fn value(&self, idx: usize) -> MigrateResult<&SqlValue> {
        self.values
            .get(idx)
            .ok_or_else(|| MigrationError::database(format!("column {idx} out of range")))
    }

    /// Read an integer column.
    pub fn get_i64(&self, idx: usize) -> MigrateResult<i64> {
        match self.value(idx)? {
            SqlValue::Int(i) => Ok(*i),
            other => Err(type_mismatch(idx, "integer", other)),
        }
    }

    /// Read a boolean column. Integer 0/1 is accepted for engines without a
    /// native boolean type.
    pub fn get_bool(&self, idx: usize) -> MigrateResult<bool> {
        match self.value(idx)? {
            SqlValue::Bool(b) => Ok(*b),
            SqlValue::Int(i) => Ok(*i != 0),
            other => Err(type_mismatch(idx, "boolean", other)),
        }
    }

    /// Read a nullable text column.
    pub fn get_opt_string(&self, idx: usize) -> MigrateResult<Option<String>> {
        match self.value(idx)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => Ok(Some(s.clone())),
            other => Err(type_mismatch(idx, "text", other)),
        }
    }

    /// Read a non-null text column.
    pub fn get_string(&self, idx: usize) -> MigrateResult<String> {
        self.get_opt_string(idx)?
            .ok_or_else(|| MigrationError::database(format!("column {idx} is NULL")))
    }
}

fn type_mismatch(idx: usize, expected: &str, found: &SqlValue) -> MigrationError {
    MigrationError::database(format!(
        "column {idx}: expected {expected}, found {found}"
    ))
}

/// A live connection to the target database.
///
/// Implemented by the backend crates; custom migration procedures receive a
/// `&dyn Database` for their bodies.
#[async_trait::async_trait]
pub trait Database: Send + Sync {
    /// Run a query and collect every row.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> MigrateResult<Vec<SqlRow>>;

    /// Run a query and return its first row, if any.
    async fn query_row(&self, sql: &str, params: &[SqlValue]) -> MigrateResult<Option<SqlRow>> {
        Ok(self.query(sql, params).await?.into_iter().next())
    }

    /// Execute a single statement and return the number of affected rows.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> MigrateResult<u64>;

    /// Execute a script of one or more statements without parameters.
    async fn batch_execute(&self, sql: &str) -> MigrateResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_accessors() {
        let row = SqlRow::new(vec![
            SqlValue::Int(3),
            SqlValue::Int(1),
            SqlValue::Null,
            SqlValue::Bool(false),
        ]);

        assert_eq!(row.get_i64(0).unwrap(), 3);
        assert!(row.get_bool(1).unwrap());
        assert_eq!(row.get_opt_string(2).unwrap(), None);
        assert!(!row.get_bool(3).unwrap());
        assert!(row.get_i64(9).is_err());
        assert!(row.get_i64(3).is_err());
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(SqlValue::from(Some("Up")), SqlValue::Text("Up".into()));
        assert_eq!(SqlValue::from(None::<String>), SqlValue::Null);
        assert_eq!(SqlValue::from(7i32), SqlValue::Int(7));
        assert!(SqlValue::Null.is_null());
    }
}
