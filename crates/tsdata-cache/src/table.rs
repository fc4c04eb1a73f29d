//! Schema-defined SQLite table cache.

use polars::prelude::*;
use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{Span, debug};
use tsdata_core::dates::{compact, parse_date, with_date_column};
use tsdata_core::schema::is_valid_identifier;
use tsdata_core::{CacheContext, CellValue, DataError, Result, TableSchema};

use crate::sql::{bind_cell, column_list, frame_rows, placeholders, query_frame, quote, storage};

/// Name of the column [`TableCache::fetch_date_range`] scans.
pub const DATE_COLUMN: &str = "date";

/// Primary key of tables keyed by ticker.
pub const DEFAULT_PRIMARY_KEY: &str = "symbol";

/// A relational table with a declared schema and a designated primary key.
///
/// The table is created on construction if it does not exist yet. Rows are
/// either replaced wholesale with [`write_dataframe`](Self::write_dataframe) or
/// merged by primary key with [`update_or_insert`](Self::update_or_insert).
#[derive(Debug)]
pub struct TableCache {
    conn: Mutex<Connection>,
    schema: TableSchema,
    table_name: String,
    primary_key: String,
    span: Span,
}

impl TableCache {
    /// Open or create `table_name` in the database file at `path`.
    ///
    /// Missing parent directories are created.
    ///
    /// # Arguments
    /// * `schema` - Declared columns of the table
    /// * `path` - Path to the SQLite database file
    /// * `table_name` - Name of the table
    /// * `primary_key` - Column used by [`update_or_insert`](Self::update_or_insert)
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] for an empty or invalid table name, an
    /// invalid schema, a primary key outside the schema, or an unwritable location;
    /// [`DataError::Storage`] if the database cannot be opened.
    pub fn open(
        schema: TableSchema,
        path: impl AsRef<Path>,
        table_name: &str,
        primary_key: &str,
    ) -> Result<Self> {
        Self::validate(&schema, table_name, primary_key)?;
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DataError::Configuration(format!("Cannot create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path).map_err(storage)?;
        Self::with_connection(conn, schema, table_name, primary_key, Span::current())
    }

    /// Open or create `table_name` in the database described by `context`.
    ///
    /// Logs are emitted under the context's span.
    ///
    /// # Errors
    /// See [`open`](Self::open).
    pub fn open_in(
        context: &CacheContext,
        schema: TableSchema,
        table_name: &str,
        primary_key: &str,
    ) -> Result<Self> {
        Self::validate(&schema, table_name, primary_key)?;
        context.ensure_cache_dir()?;
        let conn = Connection::open(context.database_path()).map_err(storage)?;
        Self::with_connection(conn, schema, table_name, primary_key, context.span().clone())
    }

    /// Create a table in a private in-memory database.
    ///
    /// Useful for testing; data is lost when the cache is dropped.
    ///
    /// # Errors
    /// See [`open`](Self::open).
    pub fn in_memory(schema: TableSchema, table_name: &str, primary_key: &str) -> Result<Self> {
        Self::validate(&schema, table_name, primary_key)?;
        let conn = Connection::open_in_memory().map_err(storage)?;
        Self::with_connection(conn, schema, table_name, primary_key, Span::current())
    }

    fn validate(schema: &TableSchema, table_name: &str, primary_key: &str) -> Result<()> {
        if table_name.is_empty() {
            return Err(DataError::Configuration(
                "Table name must not be empty".to_string(),
            ));
        }
        if !is_valid_identifier(table_name) {
            return Err(DataError::Configuration(format!(
                "Invalid table name: {table_name:?}"
            )));
        }
        schema.validate()?;
        if !schema.contains(primary_key) {
            return Err(DataError::Configuration(format!(
                "Primary key {primary_key} is not a column of {table_name}"
            )));
        }
        Ok(())
    }

    fn with_connection(
        conn: Connection,
        schema: TableSchema,
        table_name: &str,
        primary_key: &str,
        span: Span,
    ) -> Result<Self> {
        let cache = Self {
            conn: Mutex::new(conn),
            schema,
            table_name: table_name.to_string(),
            primary_key: primary_key.to_string(),
            span,
        };
        {
            let conn = cache.lock()?;
            cache.create_table(&conn)?;
        }
        cache.span.in_scope(|| debug!(table = %cache.table_name, "Table cache ready"));
        Ok(cache)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DataError::Storage(e.to_string()))
    }

    fn create_table(&self, conn: &Connection) -> Result<()> {
        let columns = self
            .schema
            .columns()
            .map(|(name, kind)| format!("{} {}", quote(name), kind.sql_type()))
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} ({columns})",
                quote(&self.table_name)
            ),
            [],
        )
        .map_err(storage)?;

        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS {} ON {}({})",
                quote(&format!("idx_{}_{}", self.table_name, self.primary_key)),
                quote(&self.table_name),
                quote(&self.primary_key)
            ),
            [],
        )
        .map_err(storage)?;
        Ok(())
    }

    fn select_sql(&self) -> String {
        format!(
            "SELECT {} FROM {}",
            column_list(self.schema.names()),
            quote(&self.table_name)
        )
    }

    /// Name of the underlying table.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Declared schema.
    #[must_use]
    pub const fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Primary key column.
    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Read every row of the table.
    ///
    /// Columns come back in schema order; row order is storage order.
    ///
    /// # Errors
    /// Returns [`DataError::Storage`] if the query fails.
    pub fn read_dataframe(&self) -> Result<DataFrame> {
        let _enter = self.span.enter();
        let conn = self.lock()?;
        let df = query_frame(&conn, &self.select_sql(), &[], &self.schema)?;
        debug!(table = %self.table_name, rows = df.height(), "Read table");
        Ok(df)
    }

    /// Read the rows where every filter column equals its value.
    ///
    /// An empty filter list reads the whole table. A [`CellValue::Null`] filter
    /// matches NULL cells.
    ///
    /// # Errors
    /// Returns [`DataError::Query`] if a filter names a column outside the schema.
    pub fn read_rows(&self, filters: &[(&str, CellValue)]) -> Result<DataFrame> {
        if filters.is_empty() {
            return self.read_dataframe();
        }

        let mut clauses = Vec::with_capacity(filters.len());
        let mut params = Vec::with_capacity(filters.len());
        for (column, value) in filters {
            if !self.schema.contains(column) {
                return Err(DataError::Query(format!(
                    "Unknown filter column {column:?} for table {}",
                    self.table_name
                )));
            }
            params.push(bind_cell(value));
            clauses.push(format!("{} IS ?{}", quote(column), params.len()));
        }

        let sql = format!("{} WHERE {}", self.select_sql(), clauses.join(" AND "));
        let _enter = self.span.enter();
        let conn = self.lock()?;
        let df = query_frame(&conn, &sql, &params, &self.schema)?;
        debug!(table = %self.table_name, filters = filters.len(), rows = df.height(), "Read filtered rows");
        Ok(df)
    }

    /// Rows whose `date` lies in `[start, end]`, ordered by date.
    ///
    /// Bounds and stored dates may each be `YYYYMMDD` or `YYYY-MM-DD`; both sides
    /// are compared in the compact form. The returned `date` column is a polars
    /// `Date`.
    ///
    /// # Errors
    /// Returns [`DataError::Schema`] if the table has no `date` column and
    /// [`DataError::Query`] for empty or unparseable bounds or `start > end`.
    pub fn fetch_date_range(&self, start: &str, end: &str) -> Result<DataFrame> {
        if !self.schema.contains(DATE_COLUMN) {
            return Err(DataError::Schema(format!(
                "Table {} has no {DATE_COLUMN} column",
                self.table_name
            )));
        }
        let (start, end) = (start.trim(), end.trim());
        if start.is_empty() || end.is_empty() {
            return Err(DataError::Query("Date range bounds must not be empty".to_string()));
        }
        let bound = |raw: &str| parse_date(raw).map_err(|e| DataError::Query(e.to_string()));
        let (first, last) = (bound(start)?, bound(end)?);
        if first > last {
            return Err(DataError::Query(format!(
                "Date range start {start} is after end {end}"
            )));
        }

        let sql = format!(
            "{} WHERE REPLACE({date}, '-', '') BETWEEN ?1 AND ?2 ORDER BY REPLACE({date}, '-', '') ASC",
            self.select_sql(),
            date = quote(DATE_COLUMN)
        );
        let (start, end) = (compact(first), compact(last));
        let params = [Value::Text(start.clone()), Value::Text(end.clone())];

        let _enter = self.span.enter();
        let df = {
            let conn = self.lock()?;
            query_frame(&conn, &sql, &params, &self.schema)?
        };
        debug!(table = %self.table_name, %start, %end, rows = df.height(), "Fetched date range");
        with_date_column(df, DATE_COLUMN)
    }

    /// Replace the whole table with `df`.
    ///
    /// The table is dropped, recreated from the schema and filled in a single
    /// transaction. Schema columns missing from `df` are stored as NULL.
    ///
    /// # Errors
    /// Returns [`DataError::Schema`] if `df` has columns outside the schema or values
    /// that cannot be stored as their declared type; [`DataError::Storage`] if a
    /// statement fails.
    pub fn write_dataframe(&self, df: &DataFrame) -> Result<()> {
        self.schema.check_frame(df)?;
        let (names, rows) = frame_rows(df, &self.schema)?;

        let _enter = self.span.enter();
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(storage)?;
        tx.execute(&format!("DROP TABLE IF EXISTS {}", quote(&self.table_name)), [])
            .map_err(storage)?;
        self.create_table(&tx)?;
        if !names.is_empty() {
            let mut stmt = tx.prepare(&self.insert_sql(&names)).map_err(storage)?;
            for row in &rows {
                stmt.execute(params_from_iter(row.iter())).map_err(storage)?;
            }
        }
        tx.commit().map_err(storage)?;

        debug!(table = %self.table_name, rows = rows.len(), "Replaced table contents");
        Ok(())
    }

    /// Upsert the rows of `df` by primary key.
    ///
    /// For each row, any stored row with the same primary-key value is deleted and
    /// the new row inserted. The whole batch runs in one transaction, so readers
    /// never observe a partially applied batch.
    ///
    /// # Errors
    /// Returns [`DataError::Schema`] if `df` lacks the primary-key column or has
    /// columns outside the schema; [`DataError::Storage`] if a statement fails.
    pub fn update_or_insert(&self, df: &DataFrame) -> Result<()> {
        self.schema.check_frame(df)?;
        let (names, rows) = frame_rows(df, &self.schema)?;
        let key_index = names
            .iter()
            .position(|n| *n == self.primary_key)
            .ok_or_else(|| {
                DataError::Schema(format!(
                    "Upsert into {} requires the {} column",
                    self.table_name, self.primary_key
                ))
            })?;

        let delete_sql = format!(
            "DELETE FROM {} WHERE {} IS ?1",
            quote(&self.table_name),
            quote(&self.primary_key)
        );

        let _enter = self.span.enter();
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(storage)?;
        {
            let mut delete = tx.prepare(&delete_sql).map_err(storage)?;
            let mut insert = tx.prepare(&self.insert_sql(&names)).map_err(storage)?;
            for row in &rows {
                delete.execute([&row[key_index]]).map_err(storage)?;
                insert.execute(params_from_iter(row.iter())).map_err(storage)?;
            }
        }
        tx.commit().map_err(storage)?;

        debug!(table = %self.table_name, rows = rows.len(), "Upserted rows");
        Ok(())
    }

    fn insert_sql(&self, names: &[String]) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(&self.table_name),
            column_list(names.iter().map(String::as_str)),
            placeholders(names.len())
        )
    }

    /// Number of stored rows.
    ///
    /// # Errors
    /// Returns [`DataError::Storage`] if the query fails.
    pub fn row_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", quote(&self.table_name)),
                [],
                |row| row.get(0),
            )
            .map_err(storage)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, NaiveDate};
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use tsdata_core::ColumnType;

    fn quote_schema() -> TableSchema {
        TableSchema::new()
            .column("symbol", ColumnType::Text)
            .column("name", ColumnType::Text)
            .column("price", ColumnType::Real)
    }

    fn bar_schema() -> TableSchema {
        TableSchema::new()
            .column("date", ColumnType::Text)
            .column("close", ColumnType::Real)
            .column("volume", ColumnType::Integer)
    }

    fn quotes() -> DataFrame {
        DataFrame::new(vec![
            Column::new("symbol".into(), vec!["AAPL", "MSFT", "GOOGL"]),
            Column::new("name".into(), vec!["Apple", "Microsoft", "Alphabet"]),
            Column::new("price".into(), vec![150.0, 300.0, 2800.0]),
        ])
        .unwrap()
    }

    fn bars(dates: &[&str]) -> DataFrame {
        let closes: Vec<f64> = (0..dates.len()).map(|i| 10.0 + i as f64).collect();
        let volumes: Vec<i64> = (0..dates.len()).map(|i| 1000 * (i as i64 + 1)).collect();
        DataFrame::new(vec![
            Column::new("date".into(), dates.to_vec()),
            Column::new("close".into(), closes),
            Column::new("volume".into(), volumes),
        ])
        .unwrap()
    }

    fn sorted(df: &DataFrame, by: &str) -> DataFrame {
        df.sort([by], SortMultipleOptions::default()).unwrap()
    }

    #[test]
    fn test_construction_errors() {
        assert!(matches!(
            TableCache::in_memory(quote_schema(), "", "symbol"),
            Err(DataError::Configuration(_))
        ));
        assert!(matches!(
            TableCache::in_memory(quote_schema(), "quotes; DROP", "symbol"),
            Err(DataError::Configuration(_))
        ));
        assert!(matches!(
            TableCache::in_memory(quote_schema(), "quotes", "ts_code"),
            Err(DataError::Configuration(_))
        ));
    }

    #[test]
    fn test_write_then_filter_single_symbol() {
        let cache = TableCache::in_memory(quote_schema(), "quotes", DEFAULT_PRIMARY_KEY).unwrap();
        cache.write_dataframe(&quotes()).unwrap();

        let msft = cache.read_rows(&[("symbol", "MSFT".into())]).unwrap();
        assert_eq!(msft.height(), 1);
        assert_eq!(msft.column("price").unwrap().f64().unwrap().get(0), Some(300.0));
    }

    #[test]
    fn test_write_read_roundtrip() {
        let cache = TableCache::in_memory(quote_schema(), "quotes", "symbol").unwrap();
        cache.write_dataframe(&quotes()).unwrap();

        let read = cache.read_dataframe().unwrap();
        assert!(sorted(&read, "symbol").equals(&sorted(&quotes(), "symbol")));
        assert_eq!(cache.row_count().unwrap(), 3);
    }

    #[test]
    fn test_write_replaces_previous_contents() {
        let cache = TableCache::in_memory(quote_schema(), "quotes", "symbol").unwrap();
        cache.write_dataframe(&quotes()).unwrap();

        let single = DataFrame::new(vec![
            Column::new("symbol".into(), vec!["TSLA"]),
            Column::new("price".into(), vec![250.0]),
        ])
        .unwrap();
        cache.write_dataframe(&single).unwrap();

        let read = cache.read_dataframe().unwrap();
        assert_eq!(read.height(), 1);
        assert_eq!(read.column("name").unwrap().null_count(), 1);
    }

    #[test]
    fn test_write_rejects_unknown_columns() {
        let cache = TableCache::in_memory(quote_schema(), "quotes", "symbol").unwrap();
        let df = quotes()
            .hstack(&[Column::new("volume".into(), vec![1i64, 2, 3])])
            .unwrap();
        assert!(matches!(cache.write_dataframe(&df), Err(DataError::Schema(_))));
        assert_eq!(cache.row_count().unwrap(), 0);
    }

    #[test]
    fn test_read_rows_conjunction() {
        let cache = TableCache::in_memory(quote_schema(), "quotes", "symbol").unwrap();
        let df = DataFrame::new(vec![
            Column::new("symbol".into(), vec!["AAPL", "AAPL", "MSFT"]),
            Column::new("name".into(), vec!["Apple", "Apple Inc", "Apple"]),
            Column::new("price".into(), vec![150.0, 151.0, 300.0]),
        ])
        .unwrap();
        cache.write_dataframe(&df).unwrap();

        let rows = cache
            .read_rows(&[("symbol", "AAPL".into()), ("name", "Apple".into())])
            .unwrap();
        assert_eq!(rows.height(), 1);
        assert_eq!(rows.column("price").unwrap().f64().unwrap().get(0), Some(150.0));

        let none = cache
            .read_rows(&[("symbol", "MSFT".into()), ("price", 150.0.into())])
            .unwrap();
        assert_eq!(none.height(), 0);
        assert_eq!(none.width(), 3);
    }

    #[test]
    fn test_read_rows_empty_filter_reads_all() {
        let cache = TableCache::in_memory(quote_schema(), "quotes", "symbol").unwrap();
        cache.write_dataframe(&quotes()).unwrap();
        assert_eq!(cache.read_rows(&[]).unwrap().height(), 3);
    }

    #[test]
    fn test_read_rows_null_filter() {
        let cache = TableCache::in_memory(quote_schema(), "quotes", "symbol").unwrap();
        let df = DataFrame::new(vec![
            Column::new("symbol".into(), vec!["AAPL", "MSFT"]),
            Column::new("name".into(), vec![Some("Apple"), None]),
        ])
        .unwrap();
        cache.write_dataframe(&df).unwrap();

        let rows = cache.read_rows(&[("name", CellValue::Null)]).unwrap();
        assert_eq!(rows.height(), 1);
        assert_eq!(rows.column("symbol").unwrap().str().unwrap().get(0), Some("MSFT"));
    }

    #[test]
    fn test_read_rows_unknown_column() {
        let cache = TableCache::in_memory(quote_schema(), "quotes", "symbol").unwrap();
        assert!(matches!(
            cache.read_rows(&[("ticker", "AAPL".into())]),
            Err(DataError::Query(_))
        ));
    }

    #[test]
    fn test_update_or_insert_keeps_latest_row() {
        let cache = TableCache::in_memory(quote_schema(), "quotes", "symbol").unwrap();
        cache.write_dataframe(&quotes()).unwrap();

        for price in [301.0, 302.5] {
            let update = DataFrame::new(vec![
                Column::new("symbol".into(), vec!["MSFT"]),
                Column::new("price".into(), vec![price]),
            ])
            .unwrap();
            cache.update_or_insert(&update).unwrap();
        }

        let msft = cache.read_rows(&[("symbol", "MSFT".into())]).unwrap();
        assert_eq!(msft.height(), 1);
        assert_eq!(msft.column("price").unwrap().f64().unwrap().get(0), Some(302.5));
        assert_eq!(cache.row_count().unwrap(), 3);
    }

    #[test]
    fn test_update_or_insert_collapses_duplicates_in_batch() {
        let cache = TableCache::in_memory(quote_schema(), "quotes", "symbol").unwrap();
        let batch = DataFrame::new(vec![
            Column::new("symbol".into(), vec!["NVDA", "NVDA", "AMD"]),
            Column::new("price".into(), vec![100.0, 120.0, 90.0]),
        ])
        .unwrap();
        cache.update_or_insert(&batch).unwrap();

        let nvda = cache.read_rows(&[("symbol", "NVDA".into())]).unwrap();
        assert_eq!(nvda.height(), 1);
        assert_eq!(nvda.column("price").unwrap().f64().unwrap().get(0), Some(120.0));
        assert_eq!(cache.row_count().unwrap(), 2);
    }

    #[test]
    fn test_update_or_insert_requires_primary_key() {
        let cache = TableCache::in_memory(quote_schema(), "quotes", "symbol").unwrap();
        let df = DataFrame::new(vec![Column::new("price".into(), vec![1.0])]).unwrap();
        assert!(matches!(cache.update_or_insert(&df), Err(DataError::Schema(_))));
    }

    #[test]
    fn test_fetch_date_range_inclusive_and_sorted() {
        let cache = TableCache::in_memory(bar_schema(), "SH600000", "date").unwrap();
        cache
            .write_dataframe(&bars(&["20240105", "20240102", "20240110", "20240103", "20231229"]))
            .unwrap();

        let range = cache.fetch_date_range("20240102", "20240105").unwrap();
        let dates = range.column("date").unwrap();
        assert_eq!(dates.dtype(), &DataType::Date);

        let as_text = dates.cast(&DataType::String).unwrap();
        let values: Vec<&str> = as_text.str().unwrap().into_no_null_iter().collect();
        assert_eq!(values, vec!["2024-01-02", "2024-01-03", "2024-01-05"]);
    }

    #[test]
    fn test_fetch_date_range_errors() {
        let quotes = TableCache::in_memory(quote_schema(), "quotes", "symbol").unwrap();
        assert!(matches!(
            quotes.fetch_date_range("20240101", "20240131"),
            Err(DataError::Schema(_))
        ));

        let bars = TableCache::in_memory(bar_schema(), "bars", "date").unwrap();
        assert!(matches!(bars.fetch_date_range("", "20240131"), Err(DataError::Query(_))));
        assert!(matches!(
            bars.fetch_date_range("20240131", "20240101"),
            Err(DataError::Query(_))
        ));
        assert_eq!(bars.fetch_date_range("20240101", "20240131").unwrap().height(), 0);
        assert!(matches!(
            bars.fetch_date_range("2024/01/01", "20240131"),
            Err(DataError::Query(_))
        ));
        assert!(matches!(
            bars.fetch_date_range("2024-01-31", "20240101"),
            Err(DataError::Query(_))
        ));
    }

    #[test]
    fn test_fetch_date_range_iso_bounds_on_compact_dates() {
        let cache = TableCache::in_memory(bar_schema(), "SH600000", "date").unwrap();
        cache
            .write_dataframe(&bars(&["20240102", "20240103", "20240105", "20240108"]))
            .unwrap();

        let range = cache.fetch_date_range("2024-01-02", "2024-01-05").unwrap();
        assert_eq!(range.height(), 3);
        let volumes: Vec<i64> = range.column("volume").unwrap().i64().unwrap().into_no_null_iter().collect();
        assert_eq!(volumes, vec![1000, 2000, 3000]);
    }

    #[test]
    fn test_fetch_date_range_compact_bounds_on_iso_dates() {
        let cache = TableCache::in_memory(bar_schema(), "bars", "date").unwrap();
        cache
            .write_dataframe(&bars(&["2024-01-10", "2024-01-02", "2024-02-01"]))
            .unwrap();

        let range = cache.fetch_date_range("20240101", "20240131").unwrap();
        let as_text = range.column("date").unwrap().cast(&DataType::String).unwrap();
        let values: Vec<&str> = as_text.str().unwrap().into_no_null_iter().collect();
        assert_eq!(values, vec!["2024-01-02", "2024-01-10"]);
    }

    fn price_of(df: &DataFrame, symbol: &str) -> Option<f64> {
        let symbols = df.column("symbol").unwrap().str().unwrap().clone();
        let prices = df.column("price").unwrap().f64().unwrap().clone();
        symbols
            .into_iter()
            .zip(prices.into_iter())
            .find_map(|(s, p)| (s == Some(symbol)).then_some(p).flatten())
    }

    const TICKERS: [&str; 4] = ["AAPL", "MSFT", "NVDA", "TSLA"];

    proptest! {
        #[test]
        fn prop_upserts_keep_one_row_per_key(
            updates in prop::collection::vec((0..TICKERS.len(), -1.0e6..1.0e6f64), 1..20)
        ) {
            let cache = TableCache::in_memory(quote_schema(), "quotes", "symbol").unwrap();
            let mut latest = BTreeMap::new();
            for (ticker, price) in updates {
                let row = DataFrame::new(vec![
                    Column::new("symbol".into(), vec![TICKERS[ticker]]),
                    Column::new("price".into(), vec![price]),
                ])
                .unwrap();
                cache.update_or_insert(&row).unwrap();
                latest.insert(TICKERS[ticker], price);
            }

            let stored = cache.read_dataframe().unwrap();
            prop_assert_eq!(stored.height(), latest.len());
            for (symbol, price) in latest {
                prop_assert_eq!(price_of(&stored, symbol), Some(price));
            }
        }

        #[test]
        fn prop_write_then_read_returns_same_rows(
            rows in prop::collection::btree_map(
                "[A-Z]{1,5}",
                (prop::option::of("[a-z ]{0,8}"), -1.0e9..1.0e9f64),
                1..12,
            )
        ) {
            let symbols: Vec<&str> = rows.keys().map(String::as_str).collect();
            let names: Vec<Option<&str>> = rows.values().map(|(n, _)| n.as_deref()).collect();
            let prices: Vec<f64> = rows.values().map(|(_, p)| *p).collect();
            let df = DataFrame::new(vec![
                Column::new("symbol".into(), symbols),
                Column::new("name".into(), names),
                Column::new("price".into(), prices),
            ])
            .unwrap();

            let cache = TableCache::in_memory(quote_schema(), "quotes", "symbol").unwrap();
            cache.write_dataframe(&df).unwrap();
            let read = cache.read_dataframe().unwrap();
            prop_assert!(sorted(&read, "symbol").equals_missing(&df));
        }

        #[test]
        fn prop_filters_are_a_conjunction(
            rows in prop::collection::vec((0..3usize, 0..3usize), 0..15),
            symbol in 0..3usize,
            name in 0..3usize,
        ) {
            let label = |i: usize| ["a", "b", "c"][i];
            let df = DataFrame::new(vec![
                Column::new("symbol".into(), rows.iter().map(|(s, _)| label(*s)).collect::<Vec<_>>()),
                Column::new("name".into(), rows.iter().map(|(_, n)| label(*n)).collect::<Vec<_>>()),
            ])
            .unwrap();
            let cache = TableCache::in_memory(quote_schema(), "quotes", "symbol").unwrap();
            cache.write_dataframe(&df).unwrap();

            let matched = cache
                .read_rows(&[("symbol", label(symbol).into()), ("name", label(name).into())])
                .unwrap();
            let expected = rows.iter().filter(|&&(s, n)| s == symbol && n == name).count();
            prop_assert_eq!(matched.height(), expected);
        }

        #[test]
        fn prop_date_range_is_inclusive_and_sorted(
            offsets in prop::collection::btree_set(0..60u64, 0..20),
            a in 0..60u64,
            b in 0..60u64,
            iso_storage in any::<bool>(),
        ) {
            let day = |offset: u64| NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Days::new(offset);
            let stored_format = if iso_storage { "%Y-%m-%d" } else { "%Y%m%d" };
            let bound_format = if iso_storage { "%Y%m%d" } else { "%Y-%m-%d" };
            let stored: Vec<String> = offsets.iter().rev().map(|&o| day(o).format(stored_format).to_string()).collect();
            let refs: Vec<&str> = stored.iter().map(String::as_str).collect();

            let cache = TableCache::in_memory(bar_schema(), "bars", "date").unwrap();
            cache.write_dataframe(&bars(&refs)).unwrap();

            let (lo, hi) = (a.min(b), a.max(b));
            let range = cache
                .fetch_date_range(
                    &day(lo).format(bound_format).to_string(),
                    &day(hi).format(bound_format).to_string(),
                )
                .unwrap();
            let as_text = range.column("date").unwrap().cast(&DataType::String).unwrap();
            let got: Vec<String> = as_text.str().unwrap().into_no_null_iter().map(str::to_string).collect();
            let expected: Vec<String> = offsets
                .iter()
                .filter(|&&o| (lo..=hi).contains(&o))
                .map(|&o| day(o).format("%Y-%m-%d").to_string())
                .collect();
            prop_assert_eq!(got, expected);
        }
    }

    #[test]
    fn test_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("equity.db");

        let cache = TableCache::open(quote_schema(), &path, "quotes", "symbol").unwrap();
        cache.write_dataframe(&quotes()).unwrap();
        drop(cache);

        let reopened = TableCache::open(quote_schema(), &path, "quotes", "symbol").unwrap();
        assert_eq!(reopened.row_count().unwrap(), 3);
    }

    #[test]
    fn test_open_in_context() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = CacheContext::new("test").with_cache_dir(dir.path().join("tushare"));

        let cache = TableCache::open_in(&ctx, quote_schema(), "quotes", "symbol").unwrap();
        cache.write_dataframe(&quotes()).unwrap();
        assert!(ctx.database_path().exists());
    }
}
