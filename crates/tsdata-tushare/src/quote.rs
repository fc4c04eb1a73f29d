//! Real-time quotes for one or more symbols.

use polars::prelude::*;
use tracing::{info, instrument};
use tsdata_cache::BlobCache;
use tsdata_core::{
    ApiRequest, CacheContext, ColumnType, NormalizedSymbol, ReportType, Result, TableSchema,
    TableSource,
};

use crate::batch::{Batch, collect, split_symbols};
use crate::frame::rename_columns;

/// Blob cache table holding the latest quote of each symbol.
pub const QUOTE_TABLE: &str = "equity_quote";

/// Report tag quotes are cached under; it expires after the context's fixed TTL.
pub const QUOTE_REPORT: &str = "quote";

/// Columns of a quote row.
#[must_use]
pub fn quote_schema() -> TableSchema {
    TableSchema::new()
        .column("ts_code", ColumnType::Text)
        .column("name", ColumnType::Text)
        .column("bid", ColumnType::Real)
        .column("ask", ColumnType::Real)
        .column("last_price", ColumnType::Real)
        .column("open", ColumnType::Real)
        .column("high", ColumnType::Real)
        .column("low", ColumnType::Real)
        .column("volume", ColumnType::Real)
        .column("prev_close", ColumnType::Real)
}

/// Quotes for a comma-separated list of symbols.
///
/// Symbols are requested one after another. A symbol that fails is reported in
/// [`Batch::warnings`]; the call fails only if every symbol did.
///
/// # Errors
/// Returns the failure of a lone symbol unchanged,
/// [`DataError::Other`](tsdata_core::DataError::Other) listing several failures, or
/// [`DataError::NoData`](tsdata_core::DataError::NoData) when nothing was found.
#[instrument(skip(source, context))]
pub async fn equity_quote(
    source: &dyn TableSource,
    context: &CacheContext,
    symbols: &str,
    use_cache: bool,
) -> Result<Batch> {
    let cache = BlobCache::open(QUOTE_TABLE, context)?;
    let report = ReportType::from(QUOTE_REPORT);

    let mut results = Vec::new();
    for symbol in split_symbols(symbols) {
        let result = if use_cache {
            cache
                .load_cached_data_async(symbol, &report, |symbol, _| async move {
                    fetch_quote(source, &symbol).await
                })
                .await
        } else {
            match fetch_quote(source, symbol).await {
                Ok(fresh) => cache.refresh(symbol, &report, &fresh).map(|()| fresh),
                Err(e) => Err(e),
            }
        };
        results.push((symbol, result));
    }
    collect(results, &quote_schema())
}

async fn fetch_quote(source: &dyn TableSource, symbol: &str) -> Result<DataFrame> {
    let symbol = NormalizedSymbol::parse(symbol)?;
    let api = if symbol.market().is_hong_kong() {
        "rt_hk_k"
    } else {
        "rt_k"
    };
    info!("Getting equity quote data for {}", symbol.qualified());
    let raw = source
        .query(ApiRequest::new(api).param("ts_code", symbol.qualified()))
        .await?;

    let renamed = rename_columns(
        raw,
        &[
            ("close", "last_price"),
            ("vol", "volume"),
            ("pre_close", "prev_close"),
            ("bid_price1", "bid"),
            ("ask_price1", "ask"),
        ],
    )?;
    quote_schema().project(&renamed)
}
