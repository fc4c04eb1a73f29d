//! Error types for cache and fetch operations.
//!
//! This module defines [`DataError`] which covers every failure the caches can
//! report, plus the errors raised by remote fetchers. Errors returned by fetch
//! callbacks flow through the caches untouched.

use thiserror::Error;

/// Errors that can occur during cache and data operations.
#[derive(Error, Debug)]
pub enum DataError {
    /// Invalid cache construction parameters (empty table name, unwritable path, ...).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The operation needs a column or shape the table does not have.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A filter or range query references unknown columns or malformed bounds.
    #[error("Query error: {0}")]
    Query(String),

    /// The underlying store is unreachable or broken at the file level.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A stored payload could not be decoded.
    #[error("Corrupt cache entry {key}: {reason}")]
    CacheCorruption {
        /// Cache key of the corrupt entry.
        key: String,
        /// What went wrong while decoding.
        reason: String,
    },

    /// The symbol lacks a market suffix where one is required, or is empty.
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Network-related errors (connection failures, timeouts, etc.).
    #[error("Network error: {0}")]
    Network(String),

    /// Rate limit exceeded by a provider.
    #[error("Rate limited by {provider}: retry after {retry_after:?}")]
    RateLimited {
        /// The provider that rate limited the request.
        provider: String,
        /// Suggested time to wait before retrying.
        retry_after: Option<std::time::Duration>,
    },

    /// The remote API answered with a non-zero status code.
    #[error("API error {code}: {message}")]
    Api {
        /// Status code reported by the API.
        code: i64,
        /// Message reported by the API.
        message: String,
    },

    /// Error parsing data from a provider.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The request succeeded but produced no rows.
    #[error("No data: {0}")]
    NoData(String),

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl DataError {
    /// Build a [`DataError::CacheCorruption`] for `key`.
    pub fn corruption(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::CacheCorruption {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias using [`DataError`].
pub type Result<T> = std::result::Result<T, DataError>;
