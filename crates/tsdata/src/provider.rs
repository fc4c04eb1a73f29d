//! Provider facade binding a table source to a cache context.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use polars::prelude::DataFrame;
use tracing::debug;

use tsdata_core::{CacheContext, DataError, Result, TableSource};
use tsdata_tushare::{
    Batch, HistoricalQuery, SearchQuery, StatementKind, StatementQuery, TushareClient, dividends,
    fundamentals, historical, indices, profile, quote, search,
};

/// Settings for [`TushareProvider::new`].
#[derive(Clone)]
pub struct ProviderConfig {
    /// Tushare Pro token, used verbatim.
    pub api_key: String,
    /// Where and how results are cached.
    pub context: CacheContext,
    /// Endpoint override; the public Tushare URL when `None`.
    pub endpoint: Option<String>,
    /// Per-request timeout.
    pub timeout: Option<Duration>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"[REDACTED]")
            .field("context", &self.context)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderConfig {
    /// Config for `api_key` with the default cache context.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            context: CacheContext::default(),
            endpoint: None,
            timeout: None,
        }
    }

    /// Set the cache context.
    #[must_use]
    pub fn with_context(mut self, context: CacheContext) -> Self {
        self.context = context;
        self
    }

    /// Send requests to `endpoint` instead of the public API.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Abort requests that take longer than `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Cached access to every Tushare dataset through one source and one context.
///
/// Cloning is cheap; clones share the source.
#[derive(Clone)]
pub struct TushareProvider {
    source: Arc<dyn TableSource>,
    context: CacheContext,
}

impl fmt::Debug for TushareProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TushareProvider")
            .field("source", &self.source.name())
            .field("context", &self.context)
            .finish()
    }
}

impl TushareProvider {
    /// Build a provider backed by the Tushare HTTP client.
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] for an empty API key or a client that
    /// cannot be built.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(DataError::Configuration(
                "Tushare API key is empty".to_string(),
            ));
        }

        let mut client = TushareClient::new(config.api_key);
        if let Some(endpoint) = config.endpoint {
            client = client.with_endpoint(endpoint);
        }
        if let Some(timeout) = config.timeout {
            client = client.with_timeout(timeout)?;
        }
        debug!(endpoint = client.endpoint(), "Configured Tushare provider");
        Ok(Self::with_source(Arc::new(client), config.context))
    }

    /// Build a provider over any table source.
    #[must_use]
    pub fn with_source(source: Arc<dyn TableSource>, context: CacheContext) -> Self {
        Self { source, context }
    }

    /// The cache context.
    #[must_use]
    pub const fn context(&self) -> &CacheContext {
        &self.context
    }

    /// The table source.
    #[must_use]
    pub fn source(&self) -> &dyn TableSource {
        self.source.as_ref()
    }

    /// Daily bars. See [`historical::equity_historical`].
    ///
    /// # Errors
    /// Returns cache errors or the source's error.
    pub async fn historical(&self, query: &HistoricalQuery) -> Result<DataFrame> {
        historical::equity_historical(self.source(), &self.context, query).await
    }

    /// One financial statement. See [`fundamentals::financial_statement`].
    ///
    /// # Errors
    /// Returns cache errors or the source's error.
    pub async fn statement(&self, kind: StatementKind, query: &StatementQuery) -> Result<DataFrame> {
        fundamentals::financial_statement(self.source(), &self.context, kind, query).await
    }

    /// Income statements.
    ///
    /// # Errors
    /// See [`statement`](Self::statement).
    pub async fn income_statement(&self, query: &StatementQuery) -> Result<DataFrame> {
        self.statement(StatementKind::Income, query).await
    }

    /// Balance sheets.
    ///
    /// # Errors
    /// See [`statement`](Self::statement).
    pub async fn balance_sheet(&self, query: &StatementQuery) -> Result<DataFrame> {
        self.statement(StatementKind::BalanceSheet, query).await
    }

    /// Cash flow statements.
    ///
    /// # Errors
    /// See [`statement`](Self::statement).
    pub async fn cash_flow(&self, query: &StatementQuery) -> Result<DataFrame> {
        self.statement(StatementKind::CashFlow, query).await
    }

    /// Quotes for comma-separated symbols. See [`quote::equity_quote`].
    ///
    /// # Errors
    /// Fails only when every symbol failed or nothing was found.
    pub async fn quote(&self, symbols: &str, use_cache: bool) -> Result<Batch> {
        quote::equity_quote(self.source(), &self.context, symbols, use_cache).await
    }

    /// Cash dividends. See [`dividends::historical_dividends`].
    ///
    /// # Errors
    /// Returns cache errors or the source's error.
    pub async fn dividends(
        &self,
        symbol: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        use_cache: bool,
    ) -> Result<DataFrame> {
        dividends::historical_dividends(
            self.source(),
            &self.context,
            symbol,
            start_date,
            end_date,
            use_cache,
        )
        .await
    }

    /// Index listing. See [`indices::available_indices`].
    ///
    /// # Errors
    /// Returns cache errors or the source's error.
    pub async fn indices(&self, use_cache: bool) -> Result<DataFrame> {
        indices::available_indices(self.source(), &self.context, use_cache).await
    }

    /// Symbol directory search. See [`search::equity_search`].
    ///
    /// # Errors
    /// Returns cache errors or the source's error.
    pub async fn search(&self, query: &SearchQuery) -> Result<DataFrame> {
        search::equity_search(self.source(), &self.context, query).await
    }

    /// Company profiles for comma-separated symbols. See [`profile::equity_profile`].
    ///
    /// # Errors
    /// Fails only when every symbol failed or nothing was found.
    pub async fn profile(&self, symbols: &str, use_cache: bool) -> Result<Batch> {
        profile::equity_profile(self.source(), &self.context, symbols, use_cache).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use polars::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tsdata_core::ApiRequest;

    /// Serves the same index listing for every request.
    #[derive(Debug, Default)]
    struct StaticSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TableSource for StaticSource {
        fn name(&self) -> &str {
            "Static"
        }

        async fn query(&self, request: ApiRequest) -> Result<DataFrame> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match request.api_name.as_str() {
                "index_basic" => Ok(DataFrame::new(vec![
                    Column::new("ts_code".into(), vec!["000300.SH"]),
                    Column::new("name".into(), vec!["CSI 300"]),
                ])
                .unwrap()),
                other => Err(DataError::Api {
                    code: 40001,
                    message: format!("{other} not served"),
                }),
            }
        }
    }

    #[test]
    fn test_empty_key_rejected() {
        let err = TushareProvider::new(ProviderConfig::new("  ")).unwrap_err();
        assert!(matches!(err, DataError::Configuration(_)));
    }

    #[test]
    fn test_config_debug_redacts_key() {
        let config = ProviderConfig::new("secret-token").with_timeout(Duration::from_secs(5));
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret-token"));

        let provider = TushareProvider::new(config.with_endpoint("http://localhost:7000")).unwrap();
        assert_eq!(provider.source().name(), "Tushare");
    }

    #[tokio::test]
    async fn test_provider_uses_its_context() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(StaticSource::default());
        let provider = TushareProvider::with_source(
            source.clone(),
            CacheContext::new("test").with_cache_dir(dir.path()),
        );

        let first = provider.indices(true).await.unwrap();
        let second = provider.clone().indices(true).await.unwrap();
        assert_eq!(first.height(), 1);
        assert!(first.equals_missing(&second));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(provider.context().database_path().starts_with(dir.path()));

        let err = provider.quote("600000.SH", true).await.unwrap_err();
        assert!(matches!(err, DataError::Api { code: 40001, .. }));
    }
}
