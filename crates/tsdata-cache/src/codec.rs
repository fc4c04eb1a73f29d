//! Parquet payload codec and the versioned blob envelope.
//!
//! Every blob written by [`BlobCache`](crate::BlobCache) is laid out as:
//!
//! ```text
//! "TSDC" | format length (u8) | format name | version (u16, big endian) | payload
//! ```
//!
//! so entries written by another codec, or by an older layout, are detected
//! instead of being misread.

use polars::prelude::*;
use std::io::Cursor;
use tsdata_core::{DataError, Result, TableCodec};

const MAGIC: &[u8; 4] = b"TSDC";

/// Frames encoded as Parquet files.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParquetCodec;

impl TableCodec for ParquetCodec {
    fn format(&self) -> &'static str {
        "parquet"
    }

    fn version(&self) -> u16 {
        1
    }

    fn encode(&self, table: &DataFrame) -> Result<Vec<u8>> {
        // Parquet cannot describe a file without columns.
        if table.width() == 0 {
            return Ok(Vec::new());
        }
        let mut buf = Vec::new();
        let mut table = table.clone();
        ParquetWriter::new(&mut buf)
            .finish(&mut table)
            .map_err(|e| DataError::Other(format!("Parquet encode failed: {e}")))?;
        Ok(buf)
    }

    fn decode(&self, bytes: &[u8]) -> Result<DataFrame> {
        if bytes.is_empty() {
            return Ok(DataFrame::empty());
        }
        ParquetReader::new(Cursor::new(bytes))
            .finish()
            .map_err(|e| DataError::Parse(format!("Parquet decode failed: {e}")))
    }
}

/// Encode `table` with `codec` and wrap it in an envelope.
pub(crate) fn seal(codec: &dyn TableCodec, table: &DataFrame) -> Result<Vec<u8>> {
    let format = codec.format().as_bytes();
    let format_len = u8::try_from(format.len())
        .map_err(|_| DataError::Configuration(format!("Codec name too long: {}", codec.format())))?;
    let payload = codec.encode(table)?;

    let mut blob = Vec::with_capacity(MAGIC.len() + 1 + format.len() + 2 + payload.len());
    blob.extend_from_slice(MAGIC);
    blob.push(format_len);
    blob.extend_from_slice(format);
    blob.extend_from_slice(&codec.version().to_be_bytes());
    blob.extend_from_slice(&payload);
    Ok(blob)
}

/// Check the envelope of `blob` against `codec` and decode its payload.
///
/// Any mismatch is reported as the reason string of a corruption error.
pub(crate) fn open(codec: &dyn TableCodec, blob: &[u8]) -> std::result::Result<DataFrame, String> {
    let rest = blob
        .strip_prefix(MAGIC.as_slice())
        .ok_or_else(|| "missing envelope header".to_string())?;
    let (&format_len, rest) = rest
        .split_first()
        .ok_or_else(|| "truncated envelope".to_string())?;
    let format_len = usize::from(format_len);
    if rest.len() < format_len + 2 {
        return Err("truncated envelope".to_string());
    }
    let (format, rest) = rest.split_at(format_len);
    let (version, payload) = rest.split_at(2);

    if format != codec.format().as_bytes() {
        return Err(format!(
            "stored format {:?} does not match codec {:?}",
            String::from_utf8_lossy(format),
            codec.format()
        ));
    }
    let version = u16::from_be_bytes([version[0], version[1]]);
    if version != codec.version() {
        return Err(format!(
            "stored {} version {version} does not match codec version {}",
            codec.format(),
            codec.version()
        ));
    }

    codec.decode(payload).map_err(|e| e.to_string())
}
