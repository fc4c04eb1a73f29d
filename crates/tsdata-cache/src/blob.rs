//! Keyed blob cache with calendar-aware expiry.

use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use rusqlite::{Connection, OptionalExtension, params};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{Instrument, debug, info, warn};
use tsdata_core::dates::normalize_timestamp;
use tsdata_core::schema::is_valid_identifier;
use tsdata_core::{
    CacheContext, CorruptionPolicy, DataError, NormalizedSymbol, ReportType, Result, TableCodec,
};

use crate::codec::{ParquetCodec, open, seal};
use crate::sql::{quote, storage};
use crate::ttl::TtlPolicy;

/// Source of the current time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Caches one frame per `(market, symbol, report type)`.
///
/// Entries live in a single `(key TEXT PRIMARY KEY, timestamp REAL, data BLOB)`
/// table. An entry is served until its [`TtlPolicy`] expires; after that the next
/// [`load_cached_data`](Self::load_cached_data) fetches and overwrites it.
/// Fetch errors are returned unchanged and never cached.
pub struct BlobCache {
    conn: Mutex<Connection>,
    table_name: String,
    codec: Arc<dyn TableCodec>,
    context: CacheContext,
    clock: Clock,
}

impl fmt::Debug for BlobCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobCache")
            .field("table_name", &self.table_name)
            .field("codec", &self.codec)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl BlobCache {
    /// Open or create `table_name` in the database described by `context`.
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] for an empty or invalid table name or an
    /// unwritable cache directory; [`DataError::Storage`] if the database cannot be
    /// opened.
    pub fn open(table_name: &str, context: &CacheContext) -> Result<Self> {
        Self::validate(table_name)?;
        context.ensure_cache_dir()?;
        let conn = Connection::open(context.database_path()).map_err(storage)?;
        Self::with_connection(conn, table_name, context)
    }

    /// Create the cache in a private in-memory database.
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] for an empty or invalid table name.
    pub fn in_memory(table_name: &str, context: &CacheContext) -> Result<Self> {
        Self::validate(table_name)?;
        let conn = Connection::open_in_memory().map_err(storage)?;
        Self::with_connection(conn, table_name, context)
    }

    fn validate(table_name: &str) -> Result<()> {
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
        Ok(())
    }

    fn with_connection(conn: Connection, table_name: &str, context: &CacheContext) -> Result<Self> {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY, timestamp REAL, data BLOB)",
                quote(table_name)
            ),
            [],
        )
        .map_err(storage)?;

        Ok(Self {
            conn: Mutex::new(conn),
            table_name: table_name.to_string(),
            codec: Arc::new(ParquetCodec),
            context: context.clone(),
            clock: Arc::new(Utc::now),
        })
    }

    /// Use `codec` for new entries.
    ///
    /// Entries written by a different codec or version are treated as corrupt.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn TableCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Replace the wall clock, e.g. with a fixed time in tests.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Name of the underlying table.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Cache key of `symbol` under `report_type`: market, base symbol and tag concatenated.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidSymbol`] for an empty symbol.
    pub fn key(symbol: &str, report_type: &ReportType) -> Result<String> {
        Ok(NormalizedSymbol::parse(symbol)?.cache_key(report_type))
    }

    /// Return the cached frame for `symbol` or fetch, store and return a fresh one.
    ///
    /// `fetch` is called at most once, and only when the entry is missing, expired
    /// or (under [`CorruptionPolicy::Refetch`]) unreadable. Its error is returned
    /// unchanged and nothing is stored.
    ///
    /// # Errors
    /// Returns [`DataError::CacheCorruption`] for an undecodable entry under
    /// [`CorruptionPolicy::Propagate`], [`DataError::Storage`] on store failures, or
    /// whatever `fetch` returned.
    pub fn load_cached_data<F>(
        &self,
        symbol: &str,
        report_type: &ReportType,
        fetch: F,
    ) -> Result<DataFrame>
    where
        F: FnOnce(&str, &ReportType) -> Result<DataFrame>,
    {
        let key = Self::key(symbol, report_type)?;
        if let Some(df) = self.lookup(&key, report_type)? {
            return Ok(df);
        }

        self.context.span().in_scope(|| {
            info!(table = %self.table_name, %key, "Generating new {report_type} data");
        });
        let df = self.context.span().in_scope(|| fetch(symbol, report_type))?;
        self.store(&key, &df)?;
        Ok(df)
    }

    /// Async variant of [`load_cached_data`](Self::load_cached_data).
    ///
    /// Storage access stays synchronous; only `fetch` is awaited.
    ///
    /// # Errors
    /// See [`load_cached_data`](Self::load_cached_data).
    pub async fn load_cached_data_async<F, Fut>(
        &self,
        symbol: &str,
        report_type: &ReportType,
        fetch: F,
    ) -> Result<DataFrame>
    where
        F: FnOnce(String, ReportType) -> Fut,
        Fut: Future<Output = Result<DataFrame>>,
    {
        let key = Self::key(symbol, report_type)?;
        if let Some(df) = self.lookup(&key, report_type)? {
            return Ok(df);
        }

        self.context.span().in_scope(|| {
            info!(table = %self.table_name, %key, "Generating new {report_type} data");
        });
        let df = fetch(symbol.to_string(), report_type.clone())
            .instrument(self.context.span().clone())
            .await?;
        self.store(&key, &df)?;
        Ok(df)
    }

    /// Store `df` for `symbol` under `report_type`, replacing any entry.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidSymbol`] for an empty symbol and
    /// [`DataError::Storage`] on store failures.
    pub fn refresh(&self, symbol: &str, report_type: &ReportType, df: &DataFrame) -> Result<()> {
        let key = Self::key(symbol, report_type)?;
        self.store(&key, df)
    }

    /// When the entry for `symbol` was last stored, if there is one.
    ///
    /// # Errors
    /// Returns [`DataError::Storage`] on store failures.
    pub fn stored_at(&self, symbol: &str, report_type: &ReportType) -> Result<Option<DateTime<Utc>>> {
        let key = Self::key(symbol, report_type)?;
        let conn = self.lock()?;
        let timestamp: Option<Option<f64>> = conn
            .query_row(
                &format!("SELECT timestamp FROM {} WHERE key = ?1", quote(&self.table_name)),
                [&key],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage)?;
        Ok(timestamp.flatten().and_then(from_epoch_seconds))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DataError::Storage(e.to_string()))
    }

    fn lookup(&self, key: &str, report_type: &ReportType) -> Result<Option<DataFrame>> {
        let _enter = self.context.span().enter();
        let row: Option<(Option<f64>, Option<Vec<u8>>)> = {
            let conn = self.lock()?;
            conn.query_row(
                &format!(
                    "SELECT timestamp, data FROM {} WHERE key = ?1",
                    quote(&self.table_name)
                ),
                [key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(storage)?
        };

        let Some((timestamp, data)) = row else {
            debug!(table = %self.table_name, key, "Cache miss");
            return Ok(None);
        };

        let decoded = match (timestamp.and_then(from_epoch_seconds), data) {
            (Some(stored), Some(data)) => {
                let policy = TtlPolicy::for_report(report_type, self.context.fixed_ttl());
                if policy.is_stale_at(stored, (self.clock)(), self.context.timezone()) {
                    debug!(table = %self.table_name, key, %stored, "Cache entry expired");
                    return Ok(None);
                }
                open(self.codec.as_ref(), &data)
            }
            (None, _) => Err("invalid timestamp".to_string()),
            (_, None) => Err("missing payload".to_string()),
        };

        match decoded {
            Ok(df) => {
                debug!(table = %self.table_name, key, rows = df.height(), "Loading {report_type} data from cache");
                Ok(Some(df))
            }
            Err(reason) => match self.context.corruption_policy() {
                CorruptionPolicy::Propagate => Err(DataError::corruption(key, reason)),
                CorruptionPolicy::Refetch => {
                    warn!(table = %self.table_name, key, %reason, "Discarding corrupt cache entry");
                    Ok(None)
                }
            },
        }
    }

    fn store(&self, key: &str, df: &DataFrame) -> Result<()> {
        let _enter = self.context.span().enter();
        let blob = seal(self.codec.as_ref(), df)?;
        let timestamp = epoch_seconds((self.clock)());

        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (key, timestamp, data) VALUES (?1, ?2, ?3)",
                quote(&self.table_name)
            ),
            params![key, timestamp, blob],
        )
        .map_err(storage)?;

        debug!(table = %self.table_name, key, bytes = blob.len(), "Stored cache entry");
        Ok(())
    }
}

/// Fractional seconds since the Unix epoch.
fn epoch_seconds(t: DateTime<Utc>) -> f64 {
    t.timestamp_micros() as f64 / 1e6
}

/// Read a stored timestamp; millisecond values written by other tools are accepted.
fn from_epoch_seconds(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    let whole = value.trunc() as i64;
    let scale = if normalize_timestamp(whole).ok()? == whole {
        1e6
    } else {
        1e3
    };
    DateTime::from_timestamp_micros((value * scale).round() as i64)
}
