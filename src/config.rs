use crate::error::{PipelineError, PipelineResult};
use crate::forecast::ForecastConfig;
use crate::models::Horizon;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::env;
use std::fmt;

pub const SETTINGS_ENV_PREFIX: &str = "RISEPROB_";
pub const DEFAULT_PROMOTION_THRESHOLD: f64 = 85.0;
pub const DEFAULT_WATCHLIST: &str = "7203, 9984, 8306, 7974, 6920";
pub const DEFAULT_SYMBOL_SUFFIX: &str = ".T";
pub const DEFAULT_REFERENCE_SYMBOL: &str = "JPY=X";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookbackPeriod {
    OneYear,
    TwoYears,
    #[default]
    ThreeYears,
    FiveYears,
}

impl LookbackPeriod {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1y" => Ok(Self::OneYear),
            "2y" => Ok(Self::TwoYears),
            "3y" => Ok(Self::ThreeYears),
            "5y" => Ok(Self::FiveYears),
            other => Err(anyhow!(
                "LOOKBACK must be one of 1y, 2y, 3y, 5y (value: {})",
                other
            )),
        }
    }

    /// Provider period token.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneYear => "1y",
            Self::TwoYears => "2y",
            Self::ThreeYears => "3y",
            Self::FiveYears => "5y",
        }
    }
}

impl fmt::Display for LookbackPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizonSet {
    /// 3, 6 and 12 months.
    Quarterly,
    /// 1, 3, 6 months and 1 year.
    Standard,
    /// 3 days, 1 week, 1 month and 1 year.
    Short,
}

impl HorizonSet {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "quarterly" => Ok(Self::Quarterly),
            "standard" => Ok(Self::Standard),
            "short" => Ok(Self::Short),
            other => Err(anyhow!(
                "HORIZONS must be quarterly, standard or short (value: {})",
                other
            )),
        }
    }

    pub fn horizons(self) -> Vec<Horizon> {
        let table: &[(&str, i64)] = match self {
            Self::Quarterly => &[("3M", 90), ("6M", 180), ("12M", 365)],
            Self::Standard => &[("1M", 30), ("3M", 90), ("6M", 180), ("1Y", 365)],
            Self::Short => &[("3d", 3), ("1w", 7), ("1M", 30), ("1Y", 365)],
        };
        table
            .iter()
            .map(|(label, days)| Horizon::new(*label, *days))
            .collect()
    }
}

/// Immutable settings for one screening or detail run.
#[derive(Debug, Clone)]
pub struct ScreeningConfig {
    pub lookback: LookbackPeriod,
    pub interval: String,
    pub horizons: Vec<Horizon>,
    pub promotion_threshold: f64,
    pub anomaly_threshold: f64,
    pub symbol_suffix: String,
    pub reference_symbol: String,
    pub forecast: ForecastConfig,
    pub parallel: bool,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            lookback: LookbackPeriod::default(),
            interval: "1d".to_string(),
            horizons: HorizonSet::Quarterly.horizons(),
            promotion_threshold: DEFAULT_PROMOTION_THRESHOLD,
            anomaly_threshold: crate::anomaly::DEFAULT_ANOMALY_THRESHOLD_PCT,
            symbol_suffix: DEFAULT_SYMBOL_SUFFIX.to_string(),
            reference_symbol: DEFAULT_REFERENCE_SYMBOL.to_string(),
            forecast: ForecastConfig::default(),
            parallel: false,
        }
    }
}

impl ScreeningConfig {
    /// Builds a configuration from a settings map; absent keys keep defaults.
    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = optional_setting(settings, "LOOKBACK") {
            config.lookback = LookbackPeriod::parse(raw)?;
        }
        if let Some(raw) = optional_setting(settings, "HORIZONS") {
            config.horizons = HorizonSet::parse(raw)?.horizons();
        }
        if let Some(value) =
            optional_setting_f64(settings, "PROMOTION_THRESHOLD", Some(0.0), Some(100.0))?
        {
            config.promotion_threshold = value;
        }
        if let Some(value) =
            optional_setting_f64(settings, "ANOMALY_THRESHOLD", Some(0.0), None)?
        {
            config.anomaly_threshold = value;
        }
        if let Some(value) =
            optional_setting_f64(settings, "CHANGEPOINT_FLEXIBILITY", Some(0.0), None)?
        {
            config.forecast.changepoint_flexibility = value;
        }
        if let Some(value) = optional_setting_usize(settings, "MIN_SAMPLES", 2)? {
            config.forecast.min_samples = value;
        }
        if let Some(raw) = settings.get("SYMBOL_SUFFIX") {
            config.symbol_suffix = raw.trim().to_string();
        }
        if let Some(raw) = optional_setting(settings, "REFERENCE_SYMBOL") {
            config.reference_symbol = raw.to_string();
        }
        if let Some(raw) = optional_setting(settings, "PARALLEL") {
            config.parallel = parse_bool_setting("PARALLEL", raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Settings from `RISEPROB_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_settings_map(&env_settings())
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if !(0.0..=100.0).contains(&self.promotion_threshold) {
            return Err(PipelineError::Configuration(format!(
                "promotion threshold must be within 0..=100 (value: {})",
                self.promotion_threshold
            )));
        }
        if !(self.anomaly_threshold.is_finite() && self.anomaly_threshold > 0.0) {
            return Err(PipelineError::Configuration(format!(
                "anomaly threshold must be a positive percentage (value: {})",
                self.anomaly_threshold
            )));
        }
        if self.horizons.is_empty() {
            return Err(PipelineError::Configuration(
                "at least one horizon is required".to_string(),
            ));
        }
        if let Some(bad) = self.horizons.iter().find(|h| h.days < 1) {
            return Err(PipelineError::Configuration(format!(
                "horizon {} must be at least one day ahead (value: {})",
                bad.label, bad.days
            )));
        }
        let furthest = self.horizons.iter().map(|h| h.days).max().unwrap_or(0);
        if furthest > self.forecast.future_periods {
            return Err(PipelineError::Configuration(format!(
                "horizon of {} day(s) exceeds the {} forecast day(s)",
                furthest, self.forecast.future_periods
            )));
        }
        if self.forecast.min_samples < 2 {
            return Err(PipelineError::Configuration(format!(
                "minimum samples must be >= 2 (value: {})",
                self.forecast.min_samples
            )));
        }
        self.forecast.validate()
    }

    /// Provider symbol for a watchlist code (`7203` → `7203.T`). Codes that
    /// already carry an exchange or instrument marker are used verbatim.
    pub fn provider_symbol(&self, code: &str) -> String {
        let trimmed = code.trim();
        if self.symbol_suffix.is_empty() || trimmed.contains('.') || trimmed.contains('=') {
            trimmed.to_string()
        } else {
            format!("{}{}", trimmed, self.symbol_suffix)
        }
    }
}

/// Splits a comma separated watchlist, dropping blanks.
pub fn parse_ticker_list(raw: &str) -> PipelineResult<Vec<String>> {
    let tickers: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|ticker| !ticker.is_empty())
        .map(str::to_string)
        .collect();
    if tickers.is_empty() {
        return Err(PipelineError::Configuration(
            "ticker list is empty".to_string(),
        ));
    }
    Ok(tickers)
}

pub fn env_settings() -> HashMap<String, String> {
    env::vars()
        .filter_map(|(key, value)| {
            key.strip_prefix(SETTINGS_ENV_PREFIX)
                .map(|name| (name.to_string(), value))
        })
        .collect()
}

fn optional_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn optional_setting_f64(
    settings: &HashMap<String, String>,
    key: &str,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<Option<f64>> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(None);
    };
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Setting {} must be a number (value: {})", key, raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Setting {} must be finite (value: {})", key, raw));
    }
    if let Some(min_value) = min {
        if value < min_value {
            return Err(anyhow!(
                "Setting {} must be >= {} (value: {})",
                key,
                min_value,
                raw
            ));
        }
    }
    if let Some(max_value) = max {
        if value > max_value {
            return Err(anyhow!(
                "Setting {} must be <= {} (value: {})",
                key,
                max_value,
                raw
            ));
        }
    }
    Ok(Some(value))
}

fn optional_setting_usize(
    settings: &HashMap<String, String>,
    key: &str,
    min: usize,
) -> Result<Option<usize>> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(None);
    };
    let value = raw
        .parse::<usize>()
        .map_err(|_| anyhow!("Setting {} must be an integer (value: {})", key, raw))?;
    if value < min {
        return Err(anyhow!(
            "Setting {} must be >= {} (value: {})",
            key,
            min,
            raw
        ));
    }
    Ok(Some(value))
}

fn parse_bool_setting(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("Setting {} must be a boolean (value: {})", key, raw)),
    }
}
