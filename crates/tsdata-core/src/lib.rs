#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/finanalyzer/tsdata/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for the tsdata cache and fetchers.
//!
//! This crate provides the foundational abstractions:
//!
//! - [`TableSource`](provider::TableSource) - Remote table endpoint used by fetchers
//! - [`TableCodec`](codec::TableCodec) - Serialization of frames into cache blobs
//! - [`TableSchema`](schema::TableSchema) - Explicit column descriptors for table caches
//! - [`CacheContext`](context::CacheContext) - Injectable cache configuration and logging span
//! - [`NormalizedSymbol`](symbol::NormalizedSymbol) - Cache partitioning key for tickers

/// Blob codec trait.
pub mod codec;
/// Cache configuration and logging context.
pub mod context;
/// Date parsing and trading-calendar helpers.
pub mod dates;
/// Error types for cache and fetch operations.
pub mod error;
/// Remote table source trait and request type.
pub mod provider;
/// Report types and statement periods.
pub mod report;
/// Table schema descriptors and cell values.
pub mod schema;
/// Symbol normalization.
pub mod symbol;

// Re-export commonly used items at crate root
pub use codec::TableCodec;
pub use context::{CacheContext, CorruptionPolicy};
pub use error::{DataError, Result};
pub use provider::{ApiRequest, TableSource};
pub use report::{PeriodType, ReportType};
pub use schema::{CellValue, ColumnType, TableSchema};
pub use symbol::{Market, NormalizedSymbol};
