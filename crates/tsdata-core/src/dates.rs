//! Date parsing and trading-calendar helpers.
//!
//! Tushare exchanges dates as `YYYYMMDD` strings while callers usually speak
//! `YYYY-MM-DD`; these helpers convert between the two and build polars
//! `Date` columns.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use polars::prelude::*;

use crate::error::{DataError, Result};

/// Compact date format used by Tushare (`20240131`).
pub const COMPACT_FORMAT: &str = "%Y%m%d";

/// ISO date format (`2024-01-31`).
pub const ISO_FORMAT: &str = "%Y-%m-%d";

/// Second-resolution timestamps above this value are read as milliseconds.
const MAX_SECONDS: i64 = 2_534_023_008;

/// Millisecond timestamps above this value are rejected.
const MAX_MILLISECONDS: i64 = 2_534_023_008_000;

/// Convert `YYYY-MM-DD` into `YYYYMMDD`; any other input is returned unchanged.
#[must_use]
pub fn normalize_date(date: &str) -> String {
    NaiveDate::parse_from_str(date, ISO_FORMAT)
        .map(|d| d.format(COMPACT_FORMAT).to_string())
        .unwrap_or_else(|_| date.to_string())
}

/// Parse a date in either `YYYYMMDD` or `YYYY-MM-DD` form.
///
/// # Errors
/// Returns [`DataError::Parse`] if neither format matches.
pub fn parse_date(date: &str) -> Result<NaiveDate> {
    let date = date.trim();
    let format = if date.len() == 8 && date.chars().all(|c| c.is_ascii_digit()) {
        COMPACT_FORMAT
    } else {
        ISO_FORMAT
    };
    NaiveDate::parse_from_str(date, format)
        .map_err(|e| DataError::Parse(format!("Invalid date {date:?}: {e}")))
}

/// Format a date as `YYYYMMDD`.
#[must_use]
pub fn compact(date: NaiveDate) -> String {
    date.format(COMPACT_FORMAT).to_string()
}

/// The last weekday strictly before `today`.
///
/// Exchange holidays are not modelled; only weekends are skipped.
#[must_use]
pub fn last_closing_day(today: NaiveDate) -> NaiveDate {
    let mut day = today - Days::new(1);
    while is_weekend(day) {
        day = day - Days::new(1);
    }
    day
}

/// Number of weekdays in `[start, end]`; zero if `start > end`.
#[must_use]
pub fn working_days(start: NaiveDate, end: NaiveDate) -> usize {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !is_weekend(*d))
        .count()
}

fn is_weekend(day: NaiveDate) -> bool {
    matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Normalize a Unix timestamp that may be in seconds or milliseconds to seconds.
///
/// # Errors
/// Returns [`DataError::Parse`] for negative values or values beyond year 2100 in
/// milliseconds.
pub fn normalize_timestamp(value: i64) -> Result<i64> {
    if value > MAX_MILLISECONDS {
        Err(DataError::Parse(format!("Timestamp value too large: {value}")))
    } else if value > MAX_SECONDS {
        Ok(value / 1000)
    } else if value >= 0 {
        Ok(value)
    } else {
        Err(DataError::Parse(format!(
            "Timestamp is before the Unix epoch: {value}"
        )))
    }
}

/// Build a polars `Date` column from optional dates.
///
/// # Errors
/// Returns [`DataError::Other`] if the cast to `Date` fails.
pub fn date_column(name: &str, dates: &[Option<NaiveDate>]) -> Result<Column> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    let days: Vec<Option<i32>> = dates
        .iter()
        .map(|d| d.map(|d| (d - epoch).num_days() as i32))
        .collect();
    Column::new(name.into(), days)
        .cast(&DataType::Date)
        .map_err(|e| DataError::Other(e.to_string()))
}

/// Replace a string column of `YYYYMMDD` / `YYYY-MM-DD` values with a `Date` column.
///
/// # Errors
/// Returns [`DataError::Schema`] if the column is missing and [`DataError::Parse`]
/// if a value is not a date.
pub fn with_date_column(mut df: DataFrame, name: &str) -> Result<DataFrame> {
    let raw = df
        .column(name)
        .map_err(|_| DataError::Schema(format!("Missing {name} column")))?
        .cast(&DataType::String)
        .map_err(|e| DataError::Schema(e.to_string()))?;
    let dates = raw
        .str()
        .map_err(|e| DataError::Schema(e.to_string()))?
        .into_iter()
        .map(|v| v.map(parse_date).transpose())
        .collect::<Result<Vec<_>>>()?;

    df.with_column(date_column(name, &dates)?)
        .map_err(|e| DataError::Other(e.to_string()))?;
    Ok(df)
}
