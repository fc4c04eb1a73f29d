//! Company profiles, one stored row per listing.

use futures::future::join_all;
use polars::prelude::*;
use tracing::{debug, instrument};
use tsdata_cache::TableCache;
use tsdata_core::{
    ApiRequest, CacheContext, CellValue, ColumnType, NormalizedSymbol, Result, TableSchema,
    TableSource,
};

use crate::batch::{Batch, collect, split_symbols};
use crate::frame::{polars_err, rename_columns, text_values};

/// Table holding company profiles.
pub const PROFILE_TABLE: &str = "equity_profile";

/// Listing fields merged into the company record.
const LISTING_FIELDS: &[&str] = &[
    "fullname",
    "enname",
    "cn_spell",
    "market",
    "list_status",
    "list_date",
    "delist_date",
    "curr_type",
];

/// Columns of a company profile.
#[must_use]
pub fn profile_schema() -> TableSchema {
    let text = |name| (name, ColumnType::Text);
    TableSchema::from_columns([
        text("ts_code"),
        text("com_name"),
        text("isin"),
        text("exchange"),
        text("introduction"),
        text("chairman"),
        text("website"),
        text("office"),
        text("city"),
        text("province"),
        ("employees", ColumnType::Integer),
        text("list_status"),
        text("market"),
        text("com_id"),
        text("manager"),
        text("secretary"),
        ("reg_capital", ColumnType::Real),
        text("setup_date"),
        text("email"),
        text("ann_date"),
        text("business_scope"),
        text("main_business"),
        text("fullname"),
        text("enname"),
        text("cn_spell"),
        text("list_date"),
        text("delist_date"),
        ("trade_unit", ColumnType::Real),
        text("curr_type"),
    ])
}

/// Profiles for a comma-separated list of symbols.
///
/// Symbols are processed concurrently. With caching enabled a stored profile
/// is served as is; otherwise the company record is downloaded, merged with the
/// listing record and upserted.
///
/// # Errors
/// Returns the failure of a lone symbol unchanged,
/// [`DataError::Other`](tsdata_core::DataError::Other) listing several failures, or
/// [`DataError::NoData`](tsdata_core::DataError::NoData) when nothing was found.
#[instrument(skip(source, context))]
pub async fn equity_profile(
    source: &dyn TableSource,
    context: &CacheContext,
    symbols: &str,
    use_cache: bool,
) -> Result<Batch> {
    let cache = TableCache::open_in(context, profile_schema(), PROFILE_TABLE, "ts_code")?;
    let symbols = split_symbols(symbols);

    let results = join_all(
        symbols
            .iter()
            .map(|symbol| profile_one(source, &cache, symbol, use_cache)),
    )
    .await;
    collect(symbols.into_iter().zip(results).collect(), cache.schema())
}

async fn profile_one(
    source: &dyn TableSource,
    cache: &TableCache,
    symbol: &str,
    use_cache: bool,
) -> Result<DataFrame> {
    let ts_code = NormalizedSymbol::parse(symbol)?.qualified().to_string();
    if use_cache {
        let stored = cache.read_rows(&[("ts_code", CellValue::from(ts_code.as_str()))])?;
        if stored.height() > 0 {
            debug!("Profile of {ts_code} served from cache");
            return Ok(stored);
        }
    }

    let company = source
        .query(ApiRequest::new("stock_company").param("ts_code", ts_code.as_str()))
        .await?;
    let listing = source
        .query(
            ApiRequest::new("stock_basic")
                .param("ts_code", ts_code.as_str())
                .fields([
                    "ts_code",
                    "fullname",
                    "enname",
                    "cnspell",
                    "market",
                    "list_status",
                    "list_date",
                    "delist_date",
                    "curr_type",
                ]),
        )
        .await?;

    let merged = merge_listing(company, rename_columns(listing, &[("cnspell", "cn_spell")])?)?;
    let profile = cache.schema().project(&merged)?;
    cache.update_or_insert(&profile)?;
    Ok(profile)
}

/// Add the first listing row's fields to every company row that lacks them.
fn merge_listing(mut company: DataFrame, listing: DataFrame) -> Result<DataFrame> {
    let height = company.height();
    for field in LISTING_FIELDS {
        if company.get_column_index(field).is_some() {
            continue;
        }
        let value = text_values(&listing, field)?.into_iter().next().flatten();
        company
            .with_column(Column::new((*field).into(), vec![value.as_deref(); height]))
            .map_err(polars_err)?;
    }
    Ok(company)
}
