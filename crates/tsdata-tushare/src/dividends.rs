//! Cash dividend history, cached per symbol until the next calendar year.

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::instrument;
use tsdata_cache::BlobCache;
use tsdata_core::dates::with_date_column;
use tsdata_core::{ApiRequest, CacheContext, NormalizedSymbol, ReportType, Result, TableSource};

use crate::frame::{date_days, epoch_days, filter_rows, polars_err, rename_columns};

/// Blob cache table of dividend histories.
pub const DIVIDEND_TABLE: &str = "historical_dividends";

/// Dividends paid by `symbol`, optionally limited to ex-dividend dates within
/// `[start_date, end_date]`.
///
/// The range applies only when both bounds are given. Rows without an
/// ex-dividend date never match a range. `ex_dividend_date` is returned as a
/// `Date` column and `amount` holds the cash dividend per share.
///
/// # Errors
/// Returns cache errors or the source's error.
#[instrument(skip(source, context))]
pub async fn historical_dividends(
    source: &dyn TableSource,
    context: &CacheContext,
    symbol: &str,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    use_cache: bool,
) -> Result<DataFrame> {
    let cache = BlobCache::open(DIVIDEND_TABLE, context)?;
    let data = if use_cache {
        cache
            .load_cached_data_async(symbol, &ReportType::Annual, |symbol, _| async move {
                fetch_dividends(source, &symbol).await
            })
            .await?
    } else {
        let fresh = fetch_dividends(source, symbol).await?;
        cache.refresh(symbol, &ReportType::Annual, &fresh)?;
        fresh
    };

    let (Some(start), Some(end)) = (start_date, end_date) else {
        return Ok(data);
    };
    let (start, end) = (epoch_days(start), epoch_days(end));
    let keep: Vec<bool> = date_days(&data, "ex_dividend_date")?
        .into_iter()
        .map(|d| d.is_some_and(|d| (start..=end).contains(&d)))
        .collect();
    filter_rows(&data, keep)
}

async fn fetch_dividends(source: &dyn TableSource, symbol: &str) -> Result<DataFrame> {
    let symbol = NormalizedSymbol::parse(symbol)?;
    let raw = source
        .query(ApiRequest::new("dividend").param("ts_code", symbol.qualified()))
        .await?;

    let paying = match raw.column("cash_div") {
        Ok(cash) => {
            let cash = cash.cast(&DataType::Float64).map_err(polars_err)?;
            let keep: Vec<bool> = cash
                .f64()
                .map_err(polars_err)?
                .into_iter()
                .map(|v| v != Some(0.0))
                .collect();
            filter_rows(&raw, keep)?
        }
        Err(_) => raw,
    };
    let renamed = rename_columns(
        paying,
        &[("cash_div", "amount"), ("ex_date", "ex_dividend_date")],
    )?;
    if renamed.get_column_index("ex_dividend_date").is_none() {
        return Ok(renamed);
    }
    with_date_column(renamed, "ex_dividend_date")
}
