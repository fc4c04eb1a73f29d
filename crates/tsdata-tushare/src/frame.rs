//! Small frame shaping helpers shared by the fetchers.

use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::HashSet;
use tsdata_core::{DataError, Result};

pub(crate) fn polars_err(e: PolarsError) -> DataError {
    DataError::Other(e.to_string())
}

/// Rename columns; pairs whose source column is absent are skipped.
pub(crate) fn rename_columns(mut df: DataFrame, pairs: &[(&str, &str)]) -> Result<DataFrame> {
    for (from, to) in pairs {
        if from != to && df.get_column_index(from).is_some() {
            df.rename(from, (*to).into()).map_err(polars_err)?;
        }
    }
    Ok(df)
}

/// Values of a column as text, or `None` per row if the column is absent.
pub(crate) fn text_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let Ok(column) = df.column(name) else {
        return Ok(vec![None; df.height()]);
    };
    let column = column.cast(&DataType::String).map_err(polars_err)?;
    Ok(column
        .str()
        .map_err(polars_err)?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Days between 1970-01-01 and `date`, the physical value of a polars `Date`.
pub(crate) fn epoch_days(date: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    (date - epoch).num_days() as i32
}

/// Values of a `Date` column as days since 1970-01-01.
pub(crate) fn date_days(df: &DataFrame, name: &str) -> Result<Vec<Option<i32>>> {
    let days = df
        .column(name)
        .map_err(polars_err)?
        .cast(&DataType::Int32)
        .map_err(polars_err)?;
    Ok(days.i32().map_err(polars_err)?.into_iter().collect())
}

/// Keep rows for which `keep` returns true.
pub(crate) fn filter_rows<I>(df: &DataFrame, keep: I) -> Result<DataFrame>
where
    I: IntoIterator<Item = bool>,
{
    let mask: BooleanChunked = keep.into_iter().collect();
    df.filter(&mask).map_err(polars_err)
}

/// Keep the first row for each value of `column`.
pub(crate) fn dedupe_first(df: &DataFrame, column: &str) -> Result<DataFrame> {
    if df.get_column_index(column).is_none() {
        return Ok(df.clone());
    }
    let mut seen = HashSet::new();
    let keep: Vec<bool> = text_values(df, column)?
        .into_iter()
        .map(|v| seen.insert(v))
        .collect();
    filter_rows(df, keep)
}

/// Add or replace a column holding `value` in every row.
pub(crate) fn with_constant(mut df: DataFrame, name: &str, value: &str) -> Result<DataFrame> {
    let column = Column::new(name.into(), vec![value; df.height()]);
    df.with_column(column).map_err(polars_err)?;
    Ok(df)
}

/// Stack frames that share a schema.
pub(crate) fn stack(frames: Vec<DataFrame>) -> Result<Option<DataFrame>> {
    let mut iter = frames.into_iter();
    let Some(mut acc) = iter.next() else {
        return Ok(None);
    };
    for df in iter {
        acc.vstack_mut(&df).map_err(polars_err)?;
    }
    Ok(Some(acc))
}
