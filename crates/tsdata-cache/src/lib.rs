#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/finanalyzer/tsdata/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! SQLite-backed caches for fetched market data.
//!
//! - [`TableCache`] - Schema-defined table with filtered reads and upsert by primary key
//! - [`BlobCache`] - Keyed frames with calendar-aware expiry
//! - [`ParquetCodec`] - Default blob payload codec

/// Keyed blob cache.
pub mod blob;
/// Blob payload codec.
pub mod codec;
/// Table cache.
pub mod table;
/// Expiry policies.
pub mod ttl;

mod sql;

pub use blob::{BlobCache, Clock};
pub use codec::ParquetCodec;
pub use table::{DEFAULT_PRIMARY_KEY, TableCache};
pub use ttl::{TtlPolicy, constant_ttl, next_quarter_start, next_year_start};
