#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/finanalyzer/tsdata/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Tushare Pro data provider.
//!
//! [`TushareClient`] implements [`TableSource`](tsdata_core::TableSource) over the
//! Tushare Pro HTTP API. Each dataset module pairs a fetch against any table
//! source with the cache that keeps its results:
//!
//! - [`historical`] - Daily bars in a per-symbol table cache
//! - [`fundamentals`] - Income statements, balance sheets and cash flows in blob caches
//! - [`quote`] - Real-time quotes in a short-lived blob cache
//! - [`dividends`] - Cash dividends in a yearly blob cache
//! - [`indices`] - Index listing in a table cache
//! - [`search`] - Symbol directory in a table cache
//! - [`profile`] - Company profiles upserted into a table cache

/// Multi-symbol results.
pub mod batch;
/// HTTP client.
pub mod client;
/// Cash dividends.
pub mod dividends;
/// Financial statements.
pub mod fundamentals;
/// Daily price history.
pub mod historical;
/// Index listing.
pub mod indices;
/// Company profiles.
pub mod profile;
/// Real-time quotes.
pub mod quote;
/// Symbol directory.
pub mod search;

mod frame;
mod wire;

#[cfg(test)]
mod testing;

pub use batch::Batch;
pub use client::{TUSHARE_API_URL, TushareClient};
pub use dividends::historical_dividends;
pub use fundamentals::{StatementKind, StatementQuery, financial_statement};
pub use historical::{HistoricalQuery, equity_historical};
pub use indices::available_indices;
pub use profile::equity_profile;
pub use quote::equity_quote;
pub use search::{SearchQuery, equity_search, symbols};
pub use wire::RATE_LIMIT_CODE;
