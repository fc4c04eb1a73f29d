//! Income statements, balance sheets and cash flow statements.
//!
//! Raw statements are cached whole per symbol under the `quarter` report type,
//! so they refresh when a new quarter starts. Period filtering, row limits and
//! column shaping are applied on every call.

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use tracing::instrument;
use tsdata_cache::BlobCache;
use tsdata_core::dates::{date_column, parse_date};
use tsdata_core::{
    ApiRequest, CacheContext, DataError, NormalizedSymbol, PeriodType, ReportType, Result, TableSource,
};

use crate::frame::{dedupe_first, filter_rows, polars_err, rename_columns, text_values};

/// Statements returned when no limit is given.
pub const DEFAULT_LIMIT: usize = 5;

/// Which financial statement to fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Income statement.
    Income,
    /// Balance sheet.
    BalanceSheet,
    /// Cash flow statement.
    CashFlow,
}

impl StatementKind {
    /// Blob cache table of this statement.
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Income => "income_statement",
            Self::BalanceSheet => "balance_sheet",
            Self::CashFlow => "cash_flow",
        }
    }

    /// Tushare endpoint for A-shares.
    #[must_use]
    pub const fn api_name(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::BalanceSheet => "balancesheet",
            Self::CashFlow => "cashflow",
        }
    }

    /// Tushare endpoint for Hong Kong listings.
    #[must_use]
    pub const fn hk_api_name(self) -> &'static str {
        match self {
            Self::Income => "hk_income",
            Self::BalanceSheet => "hk_balancesheet",
            Self::CashFlow => "hk_cashflow",
        }
    }

    /// Raw columns kept in the shaped output and their output names.
    #[must_use]
    pub const fn columns(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Income => &[("total_revenue", "total_revenue"), ("n_income", "net_income")],
            Self::BalanceSheet => &[
                ("total_assets", "total_assets"),
                ("total_liab", "total_liabilities"),
            ],
            Self::CashFlow => &[
                ("n_cashflow_act", "net_cash_from_operating_activities"),
                ("n_cashflow_inv_act", "net_cash_from_investing_activities"),
                ("n_cash_flows_fnc_act", "net_cash_from_financing_activities"),
            ],
        }
    }
}

/// Parameters of a statement request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatementQuery {
    /// Raw ticker.
    pub symbol: String,
    /// Annual keeps fiscal year-end statements only.
    pub period: PeriodType,
    /// Keep at most this many statements, newest first.
    pub limit: Option<usize>,
    /// Serve from the blob cache.
    pub use_cache: bool,
}

impl StatementQuery {
    /// Annual statements for `symbol`, limited to [`DEFAULT_LIMIT`], cached.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            period: PeriodType::Annual,
            limit: Some(DEFAULT_LIMIT),
            use_cache: true,
        }
    }

    /// Set the reporting period.
    #[must_use]
    pub const fn with_period(mut self, period: PeriodType) -> Self {
        self.period = period;
        self
    }

    /// Set or remove the row limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Enable or disable the blob cache.
    #[must_use]
    pub const fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }
}

/// Fetch and shape one financial statement.
///
/// The output holds the statement's value columns plus `fiscal_year`,
/// `period_ending` (a `Date`) and `fiscal_period` (`Q1`, `Q2`, `Q3` or `FY`).
///
/// # Errors
/// Returns cache errors, the source's error, or
/// [`DataError::Schema`] if the statement lacks
/// `end_date`.
#[instrument(skip(source, context), fields(symbol = %query.symbol))]
pub async fn financial_statement(
    source: &dyn TableSource,
    context: &CacheContext,
    kind: StatementKind,
    query: &StatementQuery,
) -> Result<DataFrame> {
    let cache = BlobCache::open(kind.table_name(), context)?;
    let raw = if query.use_cache {
        cache
            .load_cached_data_async(&query.symbol, &ReportType::Quarter, |symbol, _| async move {
                fetch_statement(source, kind, &symbol).await
            })
            .await?
    } else {
        let fresh = fetch_statement(source, kind, &query.symbol).await?;
        cache.refresh(&query.symbol, &ReportType::Quarter, &fresh)?;
        fresh
    };

    let mut data = raw;
    if query.period == PeriodType::Annual {
        let keep: Vec<bool> = text_values(&data, "end_date")?
            .iter()
            .map(|v| v.as_deref().is_some_and(|d| d.ends_with("1231")))
            .collect();
        data = filter_rows(&data, keep)?;
    }
    if let Some(limit) = query.limit {
        data = data.head(Some(limit));
    }
    shape(&data, kind)
}

async fn fetch_statement(
    source: &dyn TableSource,
    kind: StatementKind,
    symbol: &str,
) -> Result<DataFrame> {
    let symbol = NormalizedSymbol::parse(symbol)?;
    if symbol.market().is_hong_kong() {
        source
            .query(ApiRequest::new(kind.hk_api_name()).param("ts_code", symbol.qualified()))
            .await
    } else {
        let raw = source
            .query(ApiRequest::new(kind.api_name()).param("ts_code", symbol.qualified()))
            .await?;
        dedupe_first(&raw, "end_date")
    }
}

/// Select and rename the statement's columns and derive the fiscal fields.
fn shape(data: &DataFrame, kind: StatementKind) -> Result<DataFrame> {
    if data.get_column_index("end_date").is_none() {
        return Err(DataError::Schema(
            "Statement has no end_date column".to_string(),
        ));
    }

    let renamed = rename_columns(data.clone(), kind.columns())?;
    let mut columns = Vec::with_capacity(kind.columns().len() + 3);
    for (_, name) in kind.columns() {
        let column = match renamed.column(name) {
            Ok(c) => c.cast(&DataType::Float64).map_err(polars_err)?,
            Err(_) => Column::full_null((*name).into(), data.height(), &DataType::Float64),
        };
        columns.push(column);
    }

    let end_dates = text_values(data, "end_date")?
        .iter()
        .map(|v| v.as_deref().map(parse_date).transpose())
        .collect::<Result<Vec<_>>>()?;
    let end_types = text_values(data, "end_type")?;

    let fiscal_years: Vec<Option<i64>> = end_dates
        .iter()
        .map(|d| d.map(|d| i64::from(d.year())))
        .collect();
    let fiscal_periods: Vec<Option<&str>> = end_dates
        .iter()
        .zip(&end_types)
        .map(|(date, end_type)| fiscal_period(end_type.as_deref(), *date))
        .collect();

    columns.push(Column::new("fiscal_year".into(), fiscal_years));
    columns.push(date_column("period_ending", &end_dates)?);
    columns.push(Column::new("fiscal_period".into(), fiscal_periods));

    DataFrame::new(columns).map_err(polars_err)
}

/// Fiscal period label from Tushare's `end_type` (1-4), falling back to the
/// month of the period end.
fn fiscal_period(end_type: Option<&str>, end_date: Option<NaiveDate>) -> Option<&'static str> {
    let quarter = match end_type.map(str::trim) {
        Some("1") => 1,
        Some("2") => 2,
        Some("3") => 3,
        Some("4") => 4,
        _ => end_date.map(|d| (d.month() + 2) / 3)?,
    };
    match quarter {
        1 => Some("Q1"),
        2 => Some("Q2"),
        3 => Some("Q3"),
        4 => Some("FY"),
        _ => None,
    }
}
