//! Multi-symbol results with per-symbol failures reported as warnings.

use polars::prelude::DataFrame;
use tracing::warn;
use tsdata_core::{DataError, Result, TableSchema};

use crate::frame::stack;

/// Rows gathered for several symbols.
#[derive(Clone, Debug)]
pub struct Batch {
    /// Rows of every symbol that succeeded, in request order.
    pub data: DataFrame,
    /// One message per symbol that failed.
    pub warnings: Vec<String>,
}

/// Split a comma-separated symbol list, dropping blanks.
pub(crate) fn split_symbols(symbols: &str) -> Vec<&str> {
    symbols
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Combine per-symbol results.
///
/// Successful frames are conformed to `schema` and stacked. If every symbol
/// failed, a single failure is returned unchanged and several are joined into
/// one error; if nothing failed and nothing was found the result is
/// [`DataError::NoData`].
pub(crate) fn collect(results: Vec<(&str, Result<DataFrame>)>, schema: &TableSchema) -> Result<Batch> {
    let mut frames = Vec::new();
    let mut errors = Vec::new();
    for (symbol, result) in results {
        match result {
            Ok(df) if df.height() > 0 => frames.push(schema.project(&df)?),
            Ok(_) => {}
            Err(e) => errors.push((symbol, e)),
        }
    }

    let Some(data) = stack(frames)? else {
        return match errors.len() {
            0 => Err(DataError::NoData("No data was returned for any symbol".to_string())),
            1 => Err(errors.remove(0).1),
            _ => Err(DataError::Other(
                errors
                    .iter()
                    .map(|(symbol, e)| message(symbol, e))
                    .collect::<Vec<_>>()
                    .join("\n"),
            )),
        };
    };

    let warnings: Vec<String> = errors.iter().map(|(symbol, e)| message(symbol, e)).collect();
    for warning in &warnings {
        warn!("{warning}");
    }
    Ok(Batch { data, warnings })
}

fn message(symbol: &str, e: &DataError) -> String {
    format!("Error getting data for {symbol} -> {e}")
}
