//! HTTP client for the Tushare Pro API.

use async_trait::async_trait;
use polars::prelude::DataFrame;
use reqwest::{Client, StatusCode};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};
use tsdata_core::{ApiRequest, DataError, Result, TableSource};

use crate::wire::{RequestBody, Response};

/// Default Tushare Pro endpoint.
pub const TUSHARE_API_URL: &str = "http://api.tushare.pro";

/// Tushare Pro client.
///
/// Every endpoint is a `POST` of `{api_name, token, params, fields}` to a single
/// URL; the answer is converted into a frame by [`TableSource::query`].
#[derive(Clone)]
pub struct TushareClient {
    client: Client,
    token: String,
    endpoint: String,
}

impl fmt::Debug for TushareClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TushareClient")
            .field("endpoint", &self.endpoint)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl TushareClient {
    /// Create a client with the given API token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_client(Client::new(), token)
    }

    /// Create a client with a custom HTTP client.
    #[must_use]
    pub fn with_client(client: Client, token: impl Into<String>) -> Self {
        Self {
            client,
            token: token.into(),
            endpoint: TUSHARE_API_URL.to_string(),
        }
    }

    /// Post to `endpoint` instead of [`TUSHARE_API_URL`].
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Abort requests that take longer than `timeout`.
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] if the HTTP client cannot be built.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataError::Configuration(e.to_string()))?;
        Ok(self)
    }

    /// The endpoint requests are posted to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, request: &ApiRequest) -> Result<Response> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&RequestBody::new(request, &self.token))
            .send()
            .await
            .map_err(|e| DataError::Network(e.to_string()))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(DataError::RateLimited {
                provider: self.name().to_string(),
                retry_after: None,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(DataError::Network(format!("HTTP {status}: {text}")));
        }

        let text = response
            .text()
            .await
            .map_err(|e| DataError::Network(e.to_string()))?;

        serde_json::from_str(&text).map_err(|e| DataError::Parse(format!("{e}: {text}")))
    }
}

#[async_trait]
impl TableSource for TushareClient {
    fn name(&self) -> &str {
        "Tushare"
    }

    #[instrument(skip(self), fields(api = %request.api_name))]
    async fn query(&self, request: ApiRequest) -> Result<DataFrame> {
        debug!("Tushare request: {request}");
        let df = self.post(&request).await?.into_frame(self.name())?;
        debug!(rows = df.height(), "Tushare response");
        Ok(df)
    }
}
