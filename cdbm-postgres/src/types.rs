//! Type conversion between engine values and PostgreSQL types.

use cdbm_migrate::{SqlRow, SqlValue};
use tokio_postgres::Row;
use tokio_postgres::types::{ToSql, Type};

use crate::error::{PgError, PgResult};

/// Boxed parameter ready to bind.
pub type PgParam = Box<dyn ToSql + Sync + Send>;

/// Convert a value to a parameter of the statement's declared type.
///
/// Integers are narrowed for `INT2`/`INT4` parameters and `NULL` is typed to
/// match the parameter so the server accepts it.
pub fn to_pg_param(value: &SqlValue, ty: &Type) -> PgResult<PgParam> {
    let param: PgParam = match value {
        SqlValue::Null => match *ty {
            Type::BOOL => Box::new(None::<bool>),
            Type::INT2 => Box::new(None::<i16>),
            Type::INT4 => Box::new(None::<i32>),
            Type::INT8 => Box::new(None::<i64>),
            _ => Box::new(None::<String>),
        },
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::Int(i) => match *ty {
            Type::INT2 => Box::new(narrow::<i16>(*i, ty)?),
            Type::INT4 => Box::new(narrow::<i32>(*i, ty)?),
            _ => Box::new(*i),
        },
        SqlValue::Text(s) => Box::new(s.clone()),
    };
    Ok(param)
}

fn narrow<T: TryFrom<i64>>(value: i64, ty: &Type) -> PgResult<T> {
    T::try_from(value)
        .map_err(|_| PgError::type_conversion(format!("{} does not fit in {}", value, ty)))
}

/// Convert a whole parameter list against the statement's parameter types.
pub fn to_pg_params(values: &[SqlValue], types: &[Type]) -> PgResult<Vec<PgParam>> {
    if values.len() != types.len() {
        return Err(PgError::type_conversion(format!(
            "statement expects {} parameters, got {}",
            types.len(),
            values.len()
        )));
    }

    values
        .iter()
        .zip(types)
        .map(|(value, ty)| to_pg_param(value, ty))
        .collect()
}

/// Convert a driver row into an engine row.
pub fn from_pg_row(row: &Row) -> PgResult<SqlRow> {
    let mut values = Vec::with_capacity(row.len());

    for (idx, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value: SqlValue = match *ty {
            Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.into(),
            Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(i64::from).into(),
            Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.into(),
            Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.into(),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
                row.try_get::<_, Option<String>>(idx)?.into()
            }
            _ => {
                return Err(PgError::type_conversion(format!(
                    "unsupported type {} for column {}",
                    ty,
                    column.name()
                )));
            }
        };
        values.push(value);
    }

    Ok(SqlRow::new(values))
}
