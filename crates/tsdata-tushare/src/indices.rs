//! Listing of available market indices.

use polars::prelude::DataFrame;
use tracing::{info, instrument};
use tsdata_cache::TableCache;
use tsdata_core::{ApiRequest, CacheContext, ColumnType, Result, TableSchema, TableSource};

use crate::frame::with_constant;

/// Table holding the index listing.
pub const INDEX_TABLE: &str = "indices";

/// Columns of the index listing.
#[must_use]
pub fn index_schema() -> TableSchema {
    TableSchema::new()
        .column("ts_code", ColumnType::Text)
        .column("name", ColumnType::Text)
        .column("fullname", ColumnType::Text)
        .column("market", ColumnType::Text)
        .column("publisher", ColumnType::Text)
        .column("index_type", ColumnType::Text)
        .column("category", ColumnType::Text)
        .column("base_date", ColumnType::Text)
        .column("base_point", ColumnType::Real)
        .column("list_date", ColumnType::Text)
        .column("weight_rule", ColumnType::Text)
        .column("desc", ColumnType::Text)
        .column("exp_date", ColumnType::Text)
        .column("currency", ColumnType::Text)
}

/// All indices known to the source, priced in CNY.
///
/// With caching enabled a non-empty stored listing is returned as is;
/// otherwise the listing is downloaded and replaces the stored one.
///
/// # Errors
/// Returns cache errors or the source's error.
#[instrument(skip(source, context))]
pub async fn available_indices(
    source: &dyn TableSource,
    context: &CacheContext,
    use_cache: bool,
) -> Result<DataFrame> {
    let cache = TableCache::open_in(context, index_schema(), INDEX_TABLE, "ts_code")?;
    if use_cache {
        let data = cache.read_dataframe()?;
        if data.height() > 0 {
            info!("Loading indices from cache");
            return Ok(data);
        }
    }

    info!("Generating new indices data");
    let raw = source.query(ApiRequest::new("index_basic")).await?;
    let data = index_schema().project(&with_constant(raw, "currency", "CNY")?)?;
    cache.write_dataframe(&data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSource, temp_context};
    use polars::prelude::*;

    fn listing() -> DataFrame {
        DataFrame::new(vec![
            Column::new("ts_code".into(), vec!["000001.SH", "399001.SZ"]),
            Column::new("name".into(), vec!["SSE Composite", "SZSE Component"]),
            Column::new("market".into(), vec!["SSE", "SZSE"]),
            Column::new("base_point".into(), vec![100.0, 1000.0]),
            Column::new("desc".into(), vec![None::<&str>, Some("component")]),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_listing_cached_after_first_fetch() {
        let (_dir, ctx) = temp_context();
        let source = FakeSource::new().with_table("index_basic", listing());

        let first = available_indices(&source, &ctx, true).await.unwrap();
        assert_eq!(first.shape(), (2, 14));
        let currency: Vec<Option<&str>> = first.column("currency").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(currency, vec![Some("CNY"), Some("CNY")]);

        let second = available_indices(&source, &ctx, true).await.unwrap();
        assert!(first.equals_missing(&second));
        assert_eq!(source.calls("index_basic"), 1);

        available_indices(&source, &ctx, false).await.unwrap();
        assert_eq!(source.calls("index_basic"), 2);
    }
}
