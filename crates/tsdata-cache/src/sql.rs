//! Storage adapter between polars frames and SQLite statements.
//!
//! Identifiers reaching this module have already been validated against
//! [`is_valid_identifier`](tsdata_core::schema::is_valid_identifier); they are
//! still double-quoted so reserved words such as `desc` work as column names.
//! Values are always bound as parameters.

use polars::prelude::*;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, params_from_iter};
use tsdata_core::{CellValue, ColumnType, DataError, Result, TableSchema};

/// Map a rusqlite error to [`DataError::Storage`].
pub(crate) fn storage(e: rusqlite::Error) -> DataError {
    DataError::Storage(e.to_string())
}

/// Quote a validated identifier.
pub(crate) fn quote(name: &str) -> String {
    format!("\"{name}\"")
}

/// Comma-separated, quoted column list.
pub(crate) fn column_list<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names.into_iter().map(quote).collect::<Vec<_>>().join(", ")
}

/// `?1, ?2, ...` placeholders for `n` parameters.
pub(crate) fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

/// Convert a filter value into a bindable SQL value.
pub(crate) fn bind_cell(cell: &CellValue) -> Value {
    match cell {
        CellValue::Null => Value::Null,
        CellValue::Text(s) => Value::Text(s.clone()),
        CellValue::Real(v) => Value::Real(*v),
        CellValue::Integer(v) => Value::Integer(*v),
    }
}

/// Column names of `df` plus its rows as bindable values, cast to the schema's types.
///
/// Every column of `df` must already be declared in `schema`.
pub(crate) fn frame_rows(
    df: &DataFrame,
    schema: &TableSchema,
) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
    let mut names = Vec::with_capacity(df.width());
    let mut rows: Vec<Vec<Value>> = (0..df.height())
        .map(|_| Vec::with_capacity(df.width()))
        .collect();

    for column in df.get_columns() {
        let name = column.name().as_str();
        let kind = schema
            .column_type(name)
            .ok_or_else(|| DataError::Schema(format!("Column {name} is not part of the table schema")))?;
        let values = column_values(column, kind)?;
        for (row, value) in rows.iter_mut().zip(values) {
            row.push(value);
        }
        names.push(name.to_string());
    }

    Ok((names, rows))
}

fn column_values(column: &Column, kind: ColumnType) -> Result<Vec<Value>> {
    let name = column.name().clone();
    let cast = column
        .cast(&kind.dtype())
        .map_err(|e| DataError::Schema(format!("Cannot store {name} as {}: {e}", kind.sql_type())))?;
    let schema_err = |e: PolarsError| DataError::Schema(format!("{name}: {e}"));

    let values = match kind {
        ColumnType::Text => cast
            .str()
            .map_err(schema_err)?
            .into_iter()
            .map(|v| v.map_or(Value::Null, |s| Value::Text(s.to_string())))
            .collect(),
        ColumnType::Real => cast
            .f64()
            .map_err(schema_err)?
            .into_iter()
            .map(|v| match v {
                Some(f) if !f.is_nan() => Value::Real(f),
                _ => Value::Null,
            })
            .collect(),
        ColumnType::Integer => cast
            .i64()
            .map_err(schema_err)?
            .into_iter()
            .map(|v| v.map_or(Value::Null, Value::Integer))
            .collect(),
    };
    Ok(values)
}

/// Accumulates one result column while rows are read.
enum ColumnBuffer {
    Text(Vec<Option<String>>),
    Real(Vec<Option<f64>>),
    Integer(Vec<Option<i64>>),
}

impl ColumnBuffer {
    const fn new(kind: ColumnType) -> Self {
        match kind {
            ColumnType::Text => Self::Text(Vec::new()),
            ColumnType::Real => Self::Real(Vec::new()),
            ColumnType::Integer => Self::Integer(Vec::new()),
        }
    }

    // SQLite type affinity is loose; convert whatever was stored to the declared type.
    fn push(&mut self, value: ValueRef<'_>) {
        match self {
            Self::Text(buf) => buf.push(match value {
                ValueRef::Null => None,
                ValueRef::Integer(i) => Some(i.to_string()),
                ValueRef::Real(f) => Some(f.to_string()),
                ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
            }),
            Self::Real(buf) => buf.push(match value {
                ValueRef::Integer(i) => Some(i as f64),
                ValueRef::Real(f) => Some(f),
                ValueRef::Text(t) => std::str::from_utf8(t).ok().and_then(|s| s.trim().parse().ok()),
                ValueRef::Null | ValueRef::Blob(_) => None,
            }),
            Self::Integer(buf) => buf.push(match value {
                ValueRef::Integer(i) => Some(i),
                ValueRef::Real(f) => Some(f as i64),
                ValueRef::Text(t) => std::str::from_utf8(t).ok().and_then(|s| s.trim().parse().ok()),
                ValueRef::Null | ValueRef::Blob(_) => None,
            }),
        }
    }

    fn into_column(self, name: &str) -> Column {
        match self {
            Self::Text(v) => Column::new(name.into(), v),
            Self::Real(v) => Column::new(name.into(), v),
            Self::Integer(v) => Column::new(name.into(), v),
        }
    }
}

/// Run a `SELECT` returning the schema's columns in declaration order and collect it into a frame.
pub(crate) fn query_frame(
    conn: &Connection,
    sql: &str,
    params: &[Value],
    schema: &TableSchema,
) -> Result<DataFrame> {
    let mut stmt = conn.prepare(sql).map_err(storage)?;
    let mut buffers: Vec<ColumnBuffer> = schema
        .columns()
        .map(|(_, kind)| ColumnBuffer::new(kind))
        .collect();

    let mut rows = stmt.query(params_from_iter(params.iter())).map_err(storage)?;
    while let Some(row) = rows.next().map_err(storage)? {
        for (i, buffer) in buffers.iter_mut().enumerate() {
            buffer.push(row.get_ref(i).map_err(storage)?);
        }
    }

    let columns = schema
        .names()
        .into_iter()
        .zip(buffers)
        .map(|(name, buffer)| buffer.into_column(name))
        .collect();

    DataFrame::new(columns).map_err(|e| DataError::Other(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TableSchema {
        TableSchema::new()
            .column("symbol", ColumnType::Text)
            .column("price", ColumnType::Real)
            .column("employees", ColumnType::Integer)
    }

    #[test]
    fn test_statement_fragments() {
        assert_eq!(column_list(["a", "desc"]), "\"a\", \"desc\"");
        assert_eq!(placeholders(3), "?1, ?2, ?3");
    }

    #[test]
    fn test_frame_rows_casts_to_schema() {
        let df = DataFrame::new(vec![
            Column::new("price".into(), vec![Some(1i64), None]),
            Column::new("symbol".into(), vec!["A", "B"]),
        ])
        .unwrap();

        let (names, rows) = frame_rows(&df, &schema()).unwrap();
        assert_eq!(names, vec!["price", "symbol"]);
        assert_eq!(rows[0], vec![Value::Real(1.0), Value::Text("A".into())]);
        assert_eq!(rows[1], vec![Value::Null, Value::Text("B".into())]);
    }

    #[test]
    fn test_query_frame_converts_affinity() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (symbol TEXT, price REAL, employees INTEGER);
             INSERT INTO t VALUES (7, '12.5', 3.0), (NULL, NULL, NULL);",
        )
        .unwrap();

        let df = query_frame(
            &conn,
            "SELECT \"symbol\", \"price\", \"employees\" FROM t",
            &[],
            &schema(),
        )
        .unwrap();

        assert_eq!(df.height(), 2);
        assert_eq!(df.column("symbol").unwrap().str().unwrap().get(0), Some("7"));
        assert_eq!(df.column("price").unwrap().f64().unwrap().get(0), Some(12.5));
        assert_eq!(df.column("employees").unwrap().i64().unwrap().get(0), Some(3));
        assert_eq!(df.column("price").unwrap().null_count(), 1);
    }
}
