//! Codec trait for blob cache payloads.
//!
//! A blob cache stores frames as opaque bytes. The [`TableCodec`] trait makes
//! the storage format explicit: each codec names its format and version so
//! stored entries can be recognised and safely evolved.

use polars::prelude::DataFrame;
use std::fmt::Debug;

use crate::error::Result;

/// Serialization of frames into blob cache payloads.
pub trait TableCodec: Send + Sync + Debug {
    /// Short, stable name of the payload format (e.g. `"parquet"`).
    fn format(&self) -> &'static str;

    /// Version of the payload layout produced by [`encode`](Self::encode).
    fn version(&self) -> u16;

    /// Encode a frame into bytes.
    fn encode(&self, table: &DataFrame) -> Result<Vec<u8>>;

    /// Decode bytes produced by [`encode`](Self::encode).
    fn decode(&self, bytes: &[u8]) -> Result<DataFrame>;
}
