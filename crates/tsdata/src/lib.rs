#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/finanalyzer/tsdata/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Cached Tushare Pro market data.
//!
//! This crate re-exports the core types, the caches and the Tushare fetchers,
//! and provides [`TushareProvider`], which binds one table source to one
//! [`CacheContext`] so callers do not have to pass both around.
//!
//! # Example
//!
//! ```rust,no_run
//! use tsdata::{CacheContext, ProviderConfig, StatementQuery, TushareProvider};
//!
//! # async fn run() -> tsdata::Result<()> {
//! let provider = TushareProvider::new(
//!     ProviderConfig::new("your-token").with_context(CacheContext::new("tushare")),
//! )?;
//!
//! let income = provider.income_statement(&StatementQuery::new("600519.SH")).await?;
//! println!("{income}");
//! # Ok(())
//! # }
//! ```

// Core types and traits
pub use tsdata_core::*;

// Caches
pub use tsdata_cache::{BlobCache, ParquetCodec, TableCache, TtlPolicy};

// Fetchers
pub use tsdata_tushare::{
    Batch, HistoricalQuery, RATE_LIMIT_CODE, SearchQuery, StatementKind, StatementQuery,
    TUSHARE_API_URL, TushareClient,
};

mod provider;
pub use provider::{ProviderConfig, TushareProvider};
