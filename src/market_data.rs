use crate::config::LookbackPeriod;
use crate::error::{PipelineError, PipelineResult};
use crate::http_client::build_blocking_client;
use crate::models::{ColumnLabel, Fundamentals, InstrumentProfile, RawTable};
use crate::retry::{retry_with_backoff, RetryPolicy};
use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use log::{debug, info, warn};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const YAHOO_BASE_URL_ENV: &str = "RISEPROB_YAHOO_BASE_URL";
const DEFAULT_YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const HISTORY_COLUMNS: [&str; 7] = ["Date", "Open", "High", "Low", "Close", "Adj Close", "Volume"];

/// Source of daily price history and instrument profiles.
///
/// Unknown symbols must produce an empty table rather than an error so that a
/// single bad ticker never aborts a screen.
pub trait MarketDataProvider {
    fn fetch_history(
        &self,
        symbol: &str,
        period: LookbackPeriod,
        interval: &str,
    ) -> PipelineResult<RawTable>;

    fn fetch_profile(&self, symbol: &str) -> PipelineResult<InstrumentProfile>;
}

impl<P: MarketDataProvider + ?Sized> MarketDataProvider for &P {
    fn fetch_history(
        &self,
        symbol: &str,
        period: LookbackPeriod,
        interval: &str,
    ) -> PipelineResult<RawTable> {
        (**self).fetch_history(symbol, period, interval)
    }

    fn fetch_profile(&self, symbol: &str) -> PipelineResult<InstrumentProfile> {
        (**self).fetch_profile(symbol)
    }
}

impl<P: MarketDataProvider + ?Sized> MarketDataProvider for Box<P> {
    fn fetch_history(
        &self,
        symbol: &str,
        period: LookbackPeriod,
        interval: &str,
    ) -> PipelineResult<RawTable> {
        (**self).fetch_history(symbol, period, interval)
    }

    fn fetch_profile(&self, symbol: &str) -> PipelineResult<InstrumentProfile> {
        (**self).fetch_profile(symbol)
    }
}

// ---------------------------------------------------------------------------
// Yahoo Finance
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: Option<ChartMeta>,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Option<ChartIndicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    gmtoffset: Option<i32>,
    long_name: Option<String>,
    short_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
    #[serde(default)]
    adjclose: Vec<ChartAdjClose>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteEnvelope {
    quote_response: QuoteResponse,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    result: Vec<QuoteEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteEntry {
    long_name: Option<String>,
    short_name: Option<String>,
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<f64>,
    price_to_book: Option<f64>,
    /// Percent (2.5 means 2.5%).
    dividend_yield: Option<f64>,
    /// Fraction (0.025 means 2.5%).
    trailing_annual_dividend_yield: Option<f64>,
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

impl QuoteEntry {
    fn into_profile(self) -> InstrumentProfile {
        let yield_pct = positive(self.dividend_yield)
            .or_else(|| positive(self.trailing_annual_dividend_yield).map(|v| v * 100.0));
        InstrumentProfile {
            display_name: self.long_name.or(self.short_name),
            fundamentals: Fundamentals {
                earnings_multiple: positive(self.trailing_pe),
                book_multiple: positive(self.price_to_book),
                yield_pct,
            },
        }
    }
}

fn cell(value: Option<f64>) -> Value {
    value
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn value_at(values: &[Option<f64>], index: usize) -> Option<f64> {
    values.get(index).copied().flatten()
}

/// Flattens a chart result into a raw table with provider-local dates.
fn chart_to_table(result: ChartResult) -> RawTable {
    let offset_seconds = result.meta.as_ref().and_then(|m| m.gmtoffset).unwrap_or(0);
    let offset = FixedOffset::east_opt(offset_seconds).unwrap_or_else(|| Utc.fix());
    let indicators = result.indicators;
    let (quote, adjclose) = match indicators {
        Some(mut ind) => {
            let quote = if ind.quote.is_empty() {
                ChartQuote::default()
            } else {
                ind.quote.swap_remove(0)
            };
            let adj = if ind.adjclose.is_empty() {
                ChartAdjClose::default()
            } else {
                ind.adjclose.swap_remove(0)
            };
            (quote, adj)
        }
        None => (ChartQuote::default(), ChartAdjClose::default()),
    };

    let rows = result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(index, ts)| {
            let date = DateTime::<Utc>::from_timestamp(*ts, 0)?.with_timezone(&offset);
            Some(vec![
                Value::String(date.to_rfc3339()),
                cell(value_at(&quote.open, index)),
                cell(value_at(&quote.high, index)),
                cell(value_at(&quote.low, index)),
                cell(value_at(&quote.close, index)),
                cell(value_at(&adjclose.adjclose, index)),
                cell(value_at(&quote.volume, index)),
            ])
        })
        .collect();

    RawTable::new(
        HISTORY_COLUMNS.iter().map(|c| ColumnLabel::new(*c)).collect(),
        rows,
    )
}

/// Blocking Yahoo Finance client (chart and quote endpoints).
pub struct YahooClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

enum FetchError {
    NotFound,
    Transient(String),
    Fatal(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::NotFound => write!(f, "not found"),
            FetchError::Transient(msg) | FetchError::Fatal(msg) => write!(f, "{}", msg),
        }
    }
}

impl YahooClient {
    pub fn new() -> Result<Self> {
        let base_url = std::env::var(YAHOO_BASE_URL_ENV)
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_YAHOO_BASE_URL.to_string());
        Self::with_base_url(base_url)
    }

    pub fn with_base_url<S: Into<String>>(base_url: S) -> Result<Self> {
        let base_url = base_url.into();
        let http = build_blocking_client(&base_url, Some(REQUEST_TIMEOUT))
            .context("failed to create market data HTTP client")?;
        Ok(Self {
            http,
            base_url,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        retry_with_backoff(
            url,
            self.retry,
            || {
                let response = self
                    .http
                    .get(url)
                    .query(query)
                    .send()
                    .map_err(|err| FetchError::Transient(err.to_string()))?;
                let status = response.status();
                if status == StatusCode::NOT_FOUND {
                    return Err(FetchError::NotFound);
                }
                if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    return Err(FetchError::Transient(format!("HTTP {}", status)));
                }
                if !status.is_success() {
                    return Err(FetchError::Fatal(format!("HTTP {}", status)));
                }
                response
                    .json::<T>()
                    .map_err(|err| FetchError::Fatal(format!("invalid payload: {}", err)))
            },
            |err| matches!(err, FetchError::Transient(_)),
        )
    }

    fn fetch_chart(
        &self,
        symbol: &str,
        range: &str,
        interval: &str,
    ) -> PipelineResult<Option<ChartResult>> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        let envelope: ChartEnvelope = match self.get_json(
            &url,
            &[("range", range), ("interval", interval), ("includeAdjustedClose", "true")],
        ) {
            Ok(envelope) => envelope,
            Err(FetchError::NotFound) => {
                warn!("Yahoo has no chart for {}", symbol);
                return Ok(None);
            }
            Err(err) => return Err(PipelineError::data_unavailable(symbol, err.to_string())),
        };

        if let Some(error) = envelope.chart.error {
            warn!(
                "Yahoo chart error for {}: {} {}",
                symbol,
                error.code.unwrap_or_default(),
                error.description.unwrap_or_default()
            );
            return Ok(None);
        }
        Ok(envelope
            .chart
            .result
            .and_then(|mut results| (!results.is_empty()).then(|| results.swap_remove(0))))
    }
}

impl MarketDataProvider for YahooClient {
    fn fetch_history(
        &self,
        symbol: &str,
        period: LookbackPeriod,
        interval: &str,
    ) -> PipelineResult<RawTable> {
        debug!("Fetching {} history for {} at {}", period, symbol, interval);
        let table = self
            .fetch_chart(symbol, period.as_str(), interval)?
            .map(chart_to_table)
            .unwrap_or_default();
        info!("Fetched {} row(s) for {}", table.len(), symbol);
        Ok(table)
    }

    fn fetch_profile(&self, symbol: &str) -> PipelineResult<InstrumentProfile> {
        let url = format!("{}/v7/finance/quote", self.base_url);
        match self.get_json::<QuoteEnvelope>(&url, &[("symbols", symbol)]) {
            Ok(envelope) => {
                if let Some(entry) = envelope.quote_response.result.into_iter().next() {
                    return Ok(entry.into_profile());
                }
            }
            Err(err) => debug!("Quote lookup for {} failed: {}", symbol, err),
        }

        // The quote endpoint is often gated; the chart metadata still has names.
        let meta = self
            .fetch_chart(symbol, "5d", "1d")?
            .and_then(|result| result.meta);
        Ok(InstrumentProfile {
            display_name: meta.and_then(|m| m.long_name.or(m.short_name)),
            fundamentals: Fundamentals::default(),
        })
    }
}

// ---------------------------------------------------------------------------
// JSON fixture directory
// ---------------------------------------------------------------------------

/// Reads `<dir>/<symbol>.json` (a serialized `RawTable`) and the optional
/// `<dir>/<symbol>.profile.json`. Missing files mean an unknown symbol.
pub struct JsonDirectoryProvider {
    root: PathBuf,
}

impl JsonDirectoryProvider {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn file_for(&self, symbol: &str, suffix: &str) -> PathBuf {
        let safe: String = symbol
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.root.join(format!("{}{}", safe, suffix))
    }

    fn read_json<T: for<'de> Deserialize<'de>>(
        &self,
        symbol: &str,
        path: &Path,
    ) -> PipelineResult<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path).map_err(|err| {
            PipelineError::data_unavailable(symbol, format!("{}: {}", path.display(), err))
        })?;
        serde_json::from_str(&text).map(Some).map_err(|err| {
            PipelineError::data_unavailable(symbol, format!("{}: {}", path.display(), err))
        })
    }
}

impl MarketDataProvider for JsonDirectoryProvider {
    fn fetch_history(
        &self,
        symbol: &str,
        _period: LookbackPeriod,
        _interval: &str,
    ) -> PipelineResult<RawTable> {
        let path = self.file_for(symbol, ".json");
        let table = self.read_json::<RawTable>(symbol, &path)?;
        if table.is_none() {
            warn!("No fixture for {} at {}", symbol, path.display());
        }
        Ok(table.unwrap_or_default())
    }

    fn fetch_profile(&self, symbol: &str) -> PipelineResult<InstrumentProfile> {
        let path = self.file_for(symbol, ".profile.json");
        Ok(self
            .read_json::<InstrumentProfile>(symbol, &path)?
            .unwrap_or_default())
    }
}
