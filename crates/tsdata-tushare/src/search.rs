//! Directory of listed A-share and Hong Kong equities.

use polars::prelude::DataFrame;
use tracing::{info, instrument};
use tsdata_cache::TableCache;
use tsdata_core::{ApiRequest, CacheContext, ColumnType, Result, TableSchema, TableSource};

use crate::frame::{filter_rows, polars_err, stack, text_values, with_constant};

/// Table holding the symbol directory.
pub const SYMBOL_TABLE: &str = "symbols";

const STOCK_BASIC_FIELDS: &[&str] = &[
    "ts_code",
    "symbol",
    "name",
    "area",
    "industry",
    "fullname",
    "enname",
    "cnspell",
    "market",
    "exchange",
    "curr_type",
    "list_status",
    "list_date",
    "delist_date",
    "is_hs",
    "act_name",
    "act_ent_type",
];

/// Columns of the symbol directory, all text.
#[must_use]
pub fn symbol_schema() -> TableSchema {
    TableSchema::from_columns(
        STOCK_BASIC_FIELDS
            .iter()
            .copied()
            .chain(["trade_unit", "isin"])
            .map(|name| (name, ColumnType::Text)),
    )
}

/// Parameters of a directory search.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchQuery {
    /// Case-insensitive text matched against `ts_code`, `symbol` and `name`.
    pub query: Option<String>,
    /// Keep at most this many matches.
    pub limit: Option<usize>,
    /// Refresh the directory from the source first.
    pub refresh: bool,
}

impl SearchQuery {
    /// Search for `query`.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    /// Set or remove the match limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Force a refresh of the stored directory.
    #[must_use]
    pub const fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }
}

/// The full symbol directory.
///
/// With caching enabled a non-empty stored directory is returned; otherwise
/// listed A-shares (`stock_basic`) and Hong Kong listings (`hk_basic`) are
/// downloaded, concatenated and stored, replacing the previous directory.
///
/// # Errors
/// Returns cache errors or the source's error.
#[instrument(skip(source, context))]
pub async fn symbols(source: &dyn TableSource, context: &CacheContext, use_cache: bool) -> Result<DataFrame> {
    let cache = TableCache::open_in(context, symbol_schema(), SYMBOL_TABLE, "ts_code")?;
    if use_cache {
        let data = cache.read_dataframe()?;
        if data.height() > 0 {
            info!("Loading symbols from cache");
            return Ok(data);
        }
    }

    info!("Generating symbols");
    let schema = symbol_schema();
    let listed = source
        .query(
            ApiRequest::new("stock_basic")
                .param("exchange", "")
                .param("list_status", "L")
                .fields(STOCK_BASIC_FIELDS.iter().copied()),
        )
        .await?;
    let hong_kong = hong_kong_listing(source.query(ApiRequest::new("hk_basic")).await?)?;

    let frames = vec![schema.project(&listed)?, schema.project(&hong_kong)?];
    let data = stack(frames)?.unwrap_or_else(DataFrame::empty);
    cache.write_dataframe(&data)?;
    Ok(data)
}

/// Search the symbol directory.
///
/// # Errors
/// See [`symbols`].
#[instrument(skip(source, context))]
pub async fn equity_search(
    source: &dyn TableSource,
    context: &CacheContext,
    query: &SearchQuery,
) -> Result<DataFrame> {
    let mut data = symbols(source, context, !query.refresh).await?;

    if let Some(needle) = query.query.as_deref().map(str::to_lowercase).filter(|q| !q.is_empty()) {
        let columns = [
            text_values(&data, "ts_code")?,
            text_values(&data, "symbol")?,
            text_values(&data, "name")?,
        ];
        let keep: Vec<bool> = (0..data.height())
            .map(|row| {
                columns.iter().any(|values| {
                    values[row]
                        .as_deref()
                        .is_some_and(|v| v.to_lowercase().contains(&needle))
                })
            })
            .collect();
        data = filter_rows(&data, keep)?;
    }
    if let Some(limit) = query.limit {
        data = data.head(Some(limit));
    }
    Ok(data)
}

/// Derive `symbol` and `exchange` for Hong Kong listings.
fn hong_kong_listing(raw: DataFrame) -> Result<DataFrame> {
    let symbols: Vec<Option<String>> = text_values(&raw, "ts_code")?
        .into_iter()
        .map(|code| code.map(|c| c.trim_end_matches(".HK").to_string()))
        .collect();
    let mut df = with_constant(raw, "exchange", "HKEX")?;
    df.with_column(polars::prelude::Column::new("symbol".into(), symbols))
        .map_err(polars_err)?;
    Ok(df)
}
