//! In-process table source for fetcher tests.

use async_trait::async_trait;
use polars::prelude::DataFrame;
use std::collections::HashMap;
use std::sync::Mutex;
use tsdata_core::{ApiRequest, CacheContext, DataError, Result, TableSource};

/// Answers requests from canned frames and records every request it sees.
///
/// Frames are looked up by `api_name` plus the `ts_code` parameter first, then by
/// `api_name` alone.
#[derive(Debug, Default)]
pub(crate) struct FakeSource {
    tables: HashMap<String, DataFrame>,
    failures: HashMap<String, i64>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl FakeSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_table(mut self, api_name: &str, df: DataFrame) -> Self {
        self.tables.insert(api_name.to_string(), df);
        self
    }

    pub(crate) fn with_table_for(mut self, api_name: &str, ts_code: &str, df: DataFrame) -> Self {
        self.tables.insert(format!("{api_name}|{ts_code}"), df);
        self
    }

    pub(crate) fn with_failure(mut self, api_name: &str, ts_code: &str, code: i64) -> Self {
        self.failures.insert(format!("{api_name}|{ts_code}"), code);
        self
    }

    /// Number of requests made to `api_name`.
    pub(crate) fn calls(&self, api_name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.api_name == api_name)
            .count()
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TableSource for FakeSource {
    fn name(&self) -> &str {
        "Fake"
    }

    async fn query(&self, request: ApiRequest) -> Result<DataFrame> {
        let ts_code = request.params.get("ts_code").cloned().unwrap_or_default();
        let specific = format!("{}|{ts_code}", request.api_name);
        self.calls.lock().unwrap().push(request.clone());

        if let Some(code) = self.failures.get(&specific) {
            return Err(DataError::Api {
                code: *code,
                message: format!("{} failed for {ts_code}", request.api_name),
            });
        }
        self.tables
            .get(&specific)
            .or_else(|| self.tables.get(&request.api_name))
            .cloned()
            .ok_or_else(|| DataError::NoData(specific))
    }
}

/// Context rooted in a fresh temporary directory.
pub(crate) fn temp_context() -> (tempfile::TempDir, CacheContext) {
    let dir = tempfile::tempdir().unwrap();
    let ctx = CacheContext::new("test").with_cache_dir(dir.path());
    (dir, ctx)
}
