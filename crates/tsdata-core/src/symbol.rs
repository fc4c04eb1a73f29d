//! Symbol normalization.
//!
//! Raw tickers arrive in many shapes (`601006`, `601006.SH`, `0700.HKI`, `AAPL`).
//! Caches only need a stable partition for them, so this module maps a raw
//! string to a [`NormalizedSymbol`]: the `(base, qualified, market)` triple.
//!
//! [`NormalizedSymbol::parse`] is the lenient classifier that infers a market
//! from the code pattern. [`NormalizedSymbol::parse_strict`] insists on an
//! explicit `.MARKET` suffix.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DataError, Result};
use crate::report::ReportType;

/// Market a symbol trades on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    /// Shanghai Stock Exchange (`SH`).
    Shanghai,
    /// Shenzhen Stock Exchange (`SZ`).
    Shenzhen,
    /// Beijing Stock Exchange (`BJ`).
    Beijing,
    /// Hong Kong Exchanges (`HK`).
    HongKong,
    /// Singapore Exchange (`SI`).
    Singapore,
    /// US markets (`US`).
    Us,
    /// Any other explicit suffix.
    Other(String),
}

impl Market {
    /// Parse a market suffix. `HKI` is an alias of `HK`.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.to_ascii_uppercase().as_str() {
            "SH" => Self::Shanghai,
            "SZ" => Self::Shenzhen,
            "BJ" => Self::Beijing,
            "HK" | "HKI" => Self::HongKong,
            "SI" => Self::Singapore,
            "US" => Self::Us,
            other => Self::Other(other.to_string()),
        }
    }

    /// The suffix code of this market.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Shanghai => "SH",
            Self::Shenzhen => "SZ",
            Self::Beijing => "BJ",
            Self::HongKong => "HK",
            Self::Singapore => "SI",
            Self::Us => "US",
            Self::Other(code) => code,
        }
    }

    /// Returns true for the Hong Kong market.
    #[must_use]
    pub const fn is_hong_kong(&self) -> bool {
        matches!(self, Self::HongKong)
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A symbol split into its base code, qualified form and market.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedSymbol {
    base: String,
    qualified: String,
    market: Market,
}

impl NormalizedSymbol {
    /// Normalize a raw symbol, inferring the market when no suffix is given.
    ///
    /// Rules, first match wins:
    /// 1. `BASE.MARKET` keeps the explicit market, upper-cased (`600519.sh` is
    ///    keyed as `SH600519`; `HKI` becomes `HK`).
    /// 2. six characters starting with `6` is Shanghai.
    /// 3. six characters starting with `4`, `8` or `9` is Beijing.
    /// 4. six characters starting with `00` or `300` is Shenzhen.
    /// 5. four digits, or five digits starting with `0`, is Hong Kong.
    /// 6. ending in `SI` is Singapore.
    /// 7. anything else is US.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidSymbol`] for blank input or a malformed suffix:
    /// an empty base (`.SH`), an empty market (`600000.`) or more than one `.`.
    pub fn parse(raw: &str) -> Result<Self> {
        let symbol = raw.trim();
        if symbol.is_empty() {
            return Err(DataError::InvalidSymbol("empty symbol".to_string()));
        }
        if symbol.contains('.') {
            return Self::from_suffixed(symbol);
        }
        Ok(Self::new(symbol, classify(symbol)))
    }

    /// Normalize a symbol that must carry an explicit market suffix.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidSymbol`] if no `.MARKET` suffix is present.
    pub fn parse_strict(raw: &str) -> Result<Self> {
        let symbol = raw.trim();
        if !symbol.contains('.') {
            return Err(DataError::InvalidSymbol(format!(
                "Symbol '{symbol}' must include a market suffix (e.g., .SH, .SZ, .HK)"
            )));
        }
        Self::from_suffixed(symbol)
    }

    fn from_suffixed(symbol: &str) -> Result<Self> {
        match symbol.split_once('.') {
            Some((base, market)) if !base.is_empty() && !market.is_empty() && !market.contains('.') => {
                Ok(Self::new(base, Market::from_code(market)))
            }
            _ => Err(DataError::InvalidSymbol(format!(
                "Symbol '{symbol}' is not of the form BASE.MARKET"
            ))),
        }
    }

    fn new(base: &str, market: Market) -> Self {
        Self {
            base: base.to_string(),
            qualified: format!("{base}.{market}"),
            market,
        }
    }

    /// The bare code, e.g. `601006`.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The code with its market suffix, e.g. `601006.SH`.
    #[must_use]
    pub fn qualified(&self) -> &str {
        &self.qualified
    }

    /// The market of this symbol.
    #[must_use]
    pub const fn market(&self) -> &Market {
        &self.market
    }

    /// Market-prefixed partition name, e.g. `SH601006`.
    #[must_use]
    pub fn partition(&self) -> String {
        format!("{}{}", self.market, self.base)
    }

    /// Blob cache key for this symbol and report type: `{market}{base}{report_type}`.
    #[must_use]
    pub fn cache_key(&self, report_type: &ReportType) -> String {
        format!("{}{}{}", self.market, self.base, report_type)
    }
}

fn classify(symbol: &str) -> Market {
    let len = symbol.chars().count();
    let all_digits = symbol.chars().all(|c| c.is_ascii_digit());

    if len == 6 && symbol.starts_with('6') {
        Market::Shanghai
    } else if len == 6 && symbol.starts_with(['4', '8', '9']) {
        Market::Beijing
    } else if len == 6 && (symbol.starts_with("00") || symbol.starts_with("300")) {
        Market::Shenzhen
    } else if (len == 4 && all_digits) || (len == 5 && all_digits && symbol.starts_with('0')) {
        Market::HongKong
    } else if symbol.ends_with("SI") {
        Market::Singapore
    } else {
        Market::Us
    }
}

/// Return the base code of a symbol that must carry a market suffix.
///
/// # Errors
/// Returns [`DataError::InvalidSymbol`] if the suffix is missing.
pub fn symbol_base(raw: &str) -> Result<String> {
    NormalizedSymbol::parse_strict(raw).map(|s| s.base)
}

impl fmt::Display for NormalizedSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified)
    }
}

impl FromStr for NormalizedSymbol {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
