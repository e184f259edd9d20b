use crate::config::ScreeningConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::forecast::{ForecastAdapter, ForecastModel, ForecastTable};
use crate::market_data::MarketDataProvider;
use crate::models::{
    CanonicalSeries, Horizon, ProbabilityResult, RawTable, ScreeningOutcome, ScreeningRecord,
    SkippedTicker,
};
use crate::normalizer::normalize_close;
use crate::probability::evaluate_horizon;
use crate::progress::{ProgressReporter, TickerResult};
use chrono::NaiveDate;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Probabilities for every horizon, read from the forecast row closest to
/// each target date, plus the promotion flag (any horizon at or above
/// `promotion_threshold`).
pub fn evaluate_horizons(
    current_price: f64,
    last_date: NaiveDate,
    forecast: &ForecastTable,
    horizons: &[Horizon],
    promotion_threshold: f64,
) -> PipelineResult<(Vec<ProbabilityResult>, bool)> {
    let mut results = Vec::with_capacity(horizons.len());
    for horizon in horizons {
        let target = horizon.target_date(last_date);
        let row = forecast.closest_row(target).ok_or_else(|| {
            PipelineError::forecast_unavailable(format!(
                "no forecast row near {} for horizon {}",
                target, horizon.label
            ))
        })?;
        results.push(evaluate_horizon(horizon, last_date, current_price, row));
    }
    let promoted = results
        .iter()
        .any(|result| result.rise_probability >= promotion_threshold);
    Ok((results, promoted))
}

/// Raw history for one provider symbol. An empty fetch is `DataUnavailable`.
pub fn fetch_raw_history<P: MarketDataProvider + ?Sized>(
    provider: &P,
    config: &ScreeningConfig,
    symbol: &str,
) -> PipelineResult<RawTable> {
    let raw = provider.fetch_history(symbol, config.lookback, &config.interval)?;
    if raw.is_empty() {
        return Err(PipelineError::data_unavailable(
            symbol,
            "provider returned no rows",
        ));
    }
    Ok(raw)
}

/// Close series of a fetched table; a table without a usable row is
/// `DataUnavailable`.
pub fn close_series_from(symbol: &str, raw: &RawTable) -> PipelineResult<CanonicalSeries> {
    let series = normalize_close(raw);
    if series.is_empty() {
        return Err(PipelineError::data_unavailable(
            symbol,
            format!("none of {} row(s) could be parsed", raw.len()),
        ));
    }
    Ok(series)
}

pub fn load_close_series<P: MarketDataProvider + ?Sized>(
    provider: &P,
    config: &ScreeningConfig,
    symbol: &str,
) -> PipelineResult<CanonicalSeries> {
    let raw = fetch_raw_history(provider, config, symbol)?;
    close_series_from(symbol, &raw)
}

/// Provider display name, or the code itself when the profile is unavailable.
pub fn display_name_for<P: MarketDataProvider + ?Sized>(
    provider: &P,
    symbol: &str,
    code: &str,
) -> String {
    match provider.fetch_profile(symbol) {
        Ok(profile) => profile
            .display_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| code.to_string()),
        Err(err) => {
            debug!("Profile lookup for {} failed: {}", symbol, err);
            code.to_string()
        }
    }
}

/// Runs the fetch → normalize → forecast → probability chain over a
/// watchlist.
pub struct Screener<'a, P: ?Sized, M> {
    provider: &'a P,
    adapter: &'a ForecastAdapter<M>,
    config: &'a ScreeningConfig,
}

impl<'a, P, M> Screener<'a, P, M>
where
    P: MarketDataProvider + Sync + ?Sized,
    M: ForecastModel + Sync,
{
    pub fn new(
        provider: &'a P,
        adapter: &'a ForecastAdapter<M>,
        config: &'a ScreeningConfig,
    ) -> Self {
        Self {
            provider,
            adapter,
            config,
        }
    }

    /// Screens one watchlist code.
    pub fn screen_ticker(&self, code: &str) -> PipelineResult<ScreeningRecord> {
        let symbol = self.config.provider_symbol(code);
        let series = load_close_series(self.provider, self.config, &symbol)?;
        let Some(last) = series.last().copied() else {
            return Err(PipelineError::data_unavailable(&symbol, "empty series"));
        };

        let forecast = self.adapter.forecast(&symbol, &series)?;
        let (probabilities, promoted) = evaluate_horizons(
            last.value,
            last.date,
            &forecast,
            &self.config.horizons,
            self.config.promotion_threshold,
        )?;

        Ok(ScreeningRecord {
            display_name: display_name_for(self.provider, &symbol, code),
            ticker: symbol,
            current_price: last.value,
            last_date: last.date,
            probabilities,
            promoted,
        })
    }

    /// Screens every code in order. Failed tickers are logged and recorded
    /// as skipped; only configuration problems abort the run.
    pub fn run(
        &self,
        codes: &[String],
        progress: &dyn ProgressReporter,
    ) -> PipelineResult<ScreeningOutcome> {
        self.config.validate()?;
        if codes.is_empty() {
            return Err(PipelineError::Configuration(
                "ticker list is empty".to_string(),
            ));
        }

        let total = codes.len();
        info!(
            "Screening {} ticker(s) over {} horizon(s){}",
            total,
            self.config.horizons.len(),
            if self.config.parallel { " in parallel" } else { "" }
        );

        let started = AtomicUsize::new(0);
        let screen_one = |code: &String| {
            let position = started.fetch_add(1, Ordering::SeqCst) + 1;
            progress.ticker_started(position, total, code);
            let result = self.screen_ticker(code);
            let status = match &result {
                Ok(record) => TickerResult::Screened {
                    promoted: record.promoted,
                },
                Err(_) => TickerResult::Skipped,
            };
            progress.ticker_finished(code, status);
            result
        };

        let results: Vec<PipelineResult<ScreeningRecord>> = if self.config.parallel {
            codes.par_iter().map(screen_one).collect()
        } else {
            codes.iter().map(screen_one).collect()
        };
        progress.finished();

        let mut outcome = ScreeningOutcome::default();
        for (code, result) in codes.iter().zip(results) {
            match result {
                Ok(record) => outcome.records.push(record),
                Err(err) if err.is_skippable() => {
                    warn!("Skipping {}: {}", code, err);
                    outcome.skipped.push(SkippedTicker {
                        ticker: code.clone(),
                        kind: err.kind().to_string(),
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        info!(
            "Screened {} ticker(s): {} promoted, {} skipped",
            outcome.records.len(),
            outcome.promoted().count(),
            outcome.skipped.len()
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HorizonSet;
    use crate::models::ForecastRow;
    use chrono::Duration;

    fn anchor() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()
    }

    fn row(days_ahead: i64, yhat: f64, half_width: f64) -> ForecastRow {
        ForecastRow {
            date: anchor() + Duration::days(days_ahead),
            yhat,
            yhat_lower: yhat - half_width,
            yhat_upper: yhat + half_width,
            trend: yhat,
            yearly: None,
            weekly: None,
        }
    }

    /// 3M row barely above current, 6M row far above with a tight band,
    /// 12M row below.
    fn fabricated_forecast() -> ForecastTable {
        ForecastTable::new(
            vec![
                row(0, 100.0, 5.0),
                row(90, 101.0, 12.8),
                row(180, 120.0, 12.8),
                row(365, 95.0, 12.8),
            ],
            anchor(),
        )
    }

    #[test]
    fn one_horizon_above_threshold_promotes() {
        let horizons = HorizonSet::Quarterly.horizons();
        let (results, promoted) =
            evaluate_horizons(100.0, anchor(), &fabricated_forecast(), &horizons, 85.0).unwrap();

        let labels: Vec<&str> = results.iter().map(|r| r.horizon_label.as_str()).collect();
        assert_eq!(labels, vec!["3M", "6M", "12M"]);
        // sigma = 25.6 / 2.56 = 10; z(6M) = 2.0
        assert!(results[1].rise_probability >= 85.0);
        assert!(results[0].rise_probability < 85.0);
        assert!(results[2].rise_probability < 85.0);
        assert!(promoted);
        assert_eq!(results[1].target_date, anchor() + Duration::days(180));
    }

    #[test]
    fn probability_equal_to_threshold_promotes() {
        let horizons = vec![Horizon::new("6M", 180)];
        let forecast = fabricated_forecast();
        let (results, _) = evaluate_horizons(100.0, anchor(), &forecast, &horizons, 85.0).unwrap();
        let exact = results[0].rise_probability;

        let (_, promoted) = evaluate_horizons(100.0, anchor(), &forecast, &horizons, exact).unwrap();
        assert!(promoted);

        let above = exact + 1e-9;
        let (_, promoted) = evaluate_horizons(100.0, anchor(), &forecast, &horizons, above).unwrap();
        assert!(!promoted);
    }

    #[test]
    fn nothing_above_threshold_is_not_promoted() {
        let horizons = vec![Horizon::new("3M", 90), Horizon::new("12M", 365)];
        let (_, promoted) =
            evaluate_horizons(100.0, anchor(), &fabricated_forecast(), &horizons, 85.0).unwrap();
        assert!(!promoted);
    }

    #[test]
    fn horizon_reads_closest_row() {
        let horizons = vec![Horizon::new("5M", 150)];
        let (results, _) =
            evaluate_horizons(100.0, anchor(), &fabricated_forecast(), &horizons, 85.0).unwrap();
        // 150 is nearer to 180 than to 90.
        assert_eq!(results[0].predicted_value, 120.0);
    }

    #[test]
    fn empty_forecast_is_unavailable() {
        let empty = ForecastTable::new(Vec::new(), anchor());
        let horizons = vec![Horizon::new("3M", 90)];
        assert!(matches!(
            evaluate_horizons(100.0, anchor(), &empty, &horizons, 85.0),
            Err(PipelineError::ForecastUnavailable { .. })
        ));
    }
}
