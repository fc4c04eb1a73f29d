//! Daily price history, cached per symbol in a table keyed by date.

use chrono::{Days, NaiveDate, TimeDelta};
use polars::prelude::*;
use tracing::{info, instrument, warn};
use tsdata_cache::TableCache;
use tsdata_core::dates::{compact, last_closing_day, with_date_column, working_days};
use tsdata_core::{
    ApiRequest, CacheContext, ColumnType, NormalizedSymbol, Result, TableSchema, TableSource,
};

use crate::frame::{date_days, rename_columns};

/// Columns of a price history table.
#[must_use]
pub fn history_schema() -> TableSchema {
    TableSchema::new()
        .column("date", ColumnType::Text)
        .column("open", ColumnType::Real)
        .column("high", ColumnType::Real)
        .column("low", ColumnType::Real)
        .column("close", ColumnType::Real)
        .column("volume", ColumnType::Real)
        .column("vwap", ColumnType::Real)
        .column("change", ColumnType::Real)
        .column("change_percent", ColumnType::Real)
        .column("amount", ColumnType::Real)
}

/// Table holding the history of `symbol`: market code followed by base symbol.
///
/// Characters that are not valid in table names are replaced by `_`.
#[must_use]
pub fn history_table(symbol: &NormalizedSymbol) -> String {
    symbol
        .partition()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Parameters of a price history request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoricalQuery {
    /// Raw ticker, e.g. `600000.SH` or `00700`.
    pub symbol: String,
    /// First day of the range, inclusive.
    pub start_date: NaiveDate,
    /// Last day of the range, inclusive.
    pub end_date: NaiveDate,
    /// Serve from and refresh the local table.
    pub use_cache: bool,
    /// Today's date, used to decide whether the cached history is current.
    pub as_of: NaiveDate,
}

impl HistoricalQuery {
    /// Query `[start_date, end_date]` for `symbol`, cached, as of today.
    #[must_use]
    pub fn new(symbol: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            start_date,
            end_date,
            use_cache: true,
            as_of: chrono::Local::now().date_naive(),
        }
    }

    /// Enable or disable the local table.
    #[must_use]
    pub const fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Evaluate freshness as of `today`.
    #[must_use]
    pub const fn as_of(mut self, today: NaiveDate) -> Self {
        self.as_of = today;
        self
    }
}

/// Daily bars for the query's symbol and range, oldest first.
///
/// With caching enabled, the stored history is re-downloaded in full when its
/// newest bar predates the last closing day; the range is then served from the
/// table if it has any rows or was just refreshed. Otherwise the history is
/// downloaded, written and the range read back.
///
/// # Errors
/// Returns [`DataError::InvalidSymbol`](tsdata_core::DataError::InvalidSymbol) for
/// an empty symbol, cache errors, or the source's error.
#[instrument(skip(source, context), fields(symbol = %query.symbol))]
pub async fn equity_historical(
    source: &dyn TableSource,
    context: &CacheContext,
    query: &HistoricalQuery,
) -> Result<DataFrame> {
    let symbol = NormalizedSymbol::parse(&query.symbol)?;
    let cache = TableCache::open_in(context, history_schema(), &history_table(&symbol), "date")?;
    let start = compact(query.start_date);
    let end = compact(query.end_date);

    if query.use_cache {
        let refreshed = refresh_if_behind(source, &cache, &symbol, query.as_of).await?;
        let cached = cache.fetch_date_range(&start, &end)?;
        if cached.height() > 0 || refreshed {
            info!("Getting equity {} historical data from cache", symbol.qualified());
            return Ok(cached);
        }
    }

    let history = download(source, &symbol).await?;
    cache.write_dataframe(&history)?;
    cache.fetch_date_range(&start, &end)
}

/// Re-download the history when its newest bar predates the last closing day.
///
/// Returns whether the table was rewritten.
async fn refresh_if_behind(
    source: &dyn TableSource,
    cache: &TableCache,
    symbol: &NormalizedSymbol,
    today: NaiveDate,
) -> Result<bool> {
    let expected = last_closing_day(today);
    let latest = latest_date(cache, expected)?;
    if latest.is_some_and(|d| d >= expected) {
        return Ok(false);
    }

    match latest {
        Some(last) => warn!(
            missing = working_days(last + Days::new(1), expected),
            "Cache for {} is not up-to-date. Last date in cache: {last}, expected: {expected}",
            symbol.qualified()
        ),
        None => info!("No cached history for {}", symbol.qualified()),
    }
    let history = download(source, symbol).await?;
    cache.write_dataframe(&history)?;
    Ok(true)
}

/// Newest stored bar on or before `until`.
fn latest_date(cache: &TableCache, until: NaiveDate) -> Result<Option<NaiveDate>> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    let limit = (until - epoch).num_days();
    let stored = with_date_column(cache.read_dataframe()?, "date")?;
    let latest = date_days(&stored, "date")?
        .into_iter()
        .flatten()
        .filter(|days| i64::from(*days) <= limit)
        .max();
    Ok(latest.and_then(|days| epoch.checked_add_signed(TimeDelta::days(i64::from(days)))))
}

async fn download(source: &dyn TableSource, symbol: &NormalizedSymbol) -> Result<DataFrame> {
    let api = if symbol.market().is_hong_kong() {
        "hk_daily"
    } else {
        "daily"
    };
    let raw = source
        .query(ApiRequest::new(api).param("ts_code", symbol.qualified()))
        .await?;
    info!("Downloaded historical data {}: {}", symbol.qualified(), raw.height());

    let renamed = rename_columns(
        raw,
        &[
            ("trade_date", "date"),
            ("vol", "volume"),
            ("pct_chg", "change_percent"),
        ],
    )?;
    history_schema().project(&renamed)
}
