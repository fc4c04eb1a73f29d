//! Remote table source trait.
//!
//! Fetchers never talk HTTP directly; they issue [`ApiRequest`]s against a
//! [`TableSource`] and receive a raw frame back. The Tushare client is one
//! implementation, test fakes are another.

use async_trait::async_trait;
use polars::prelude::DataFrame;
use std::collections::BTreeMap;
use std::fmt::{self, Debug};

use crate::error::Result;

/// A request for one remote table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApiRequest {
    /// Remote endpoint name (e.g. `daily`, `income`).
    pub api_name: String,
    /// Query parameters.
    pub params: BTreeMap<String, String>,
    /// Requested fields; empty means the endpoint's defaults.
    pub fields: Vec<String>,
}

impl ApiRequest {
    /// Create a request for `api_name` with no parameters.
    #[must_use]
    pub fn new(api_name: impl Into<String>) -> Self {
        Self {
            api_name: api_name.into(),
            ..Default::default()
        }
    }

    /// Add a query parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Request only these fields.
    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

impl fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.api_name)?;
        for (key, value) in &self.params {
            write!(f, " {key}={value}")?;
        }
        Ok(())
    }
}

/// A remote endpoint that answers [`ApiRequest`]s with tables.
#[async_trait]
pub trait TableSource: Send + Sync + Debug {
    /// Returns the name of this source (e.g. "Tushare").
    fn name(&self) -> &str;

    /// Fetch one table.
    async fn query(&self, request: ApiRequest) -> Result<DataFrame>;
}
