//! Report types and statement periods.
//!
//! [`ReportType`] is the dataset-granularity tag a blob cache entry is keyed by;
//! it also selects the entry's expiry policy. [`PeriodType`] is the reporting
//! period a caller asks fundamentals for.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DataError, Result};

/// Dataset-granularity tag used in blob cache keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportType {
    /// Refreshed at the start of each calendar year.
    Annual,
    /// Refreshed at the start of each calendar quarter.
    Quarter,
    /// Any other tag; refreshed after the context's fixed TTL.
    Other(String),
}

impl ReportType {
    /// The tag as stored in cache keys.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Annual => "annual",
            Self::Quarter => "quarter",
            Self::Other(tag) => tag,
        }
    }
}

impl From<&str> for ReportType {
    fn from(s: &str) -> Self {
        match s {
            "annual" => Self::Annual,
            "quarter" => Self::Quarter,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Period type for fundamental financial data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodType {
    /// Annual reporting period.
    #[default]
    Annual,
    /// Quarterly reporting period.
    Quarter,
}

impl FromStr for PeriodType {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "annual" => Ok(Self::Annual),
            "quarter" => Ok(Self::Quarter),
            other => Err(DataError::Query(format!("Invalid period: {other}"))),
        }
    }
}
