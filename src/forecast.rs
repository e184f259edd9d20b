use crate::error::{PipelineError, PipelineResult};
use crate::models::{CanonicalSeries, ForecastRow};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use log::debug;

pub const DEFAULT_CHANGEPOINT_FLEXIBILITY: f64 = 0.05;
pub const DEFAULT_FUTURE_PERIODS: i64 = 366;
pub const DEFAULT_INTERVAL_WIDTH: f64 = 0.80;
pub const DEFAULT_MIN_SAMPLES: usize = 50;

/// Decomposition settings handed to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastConfig {
    /// How readily the trend bends to recent data.
    pub changepoint_flexibility: f64,
    pub yearly_seasonality: bool,
    pub weekly_seasonality: bool,
    pub daily_seasonality: bool,
    /// Width of the `[yhat_lower, yhat_upper]` band as a probability mass.
    pub interval_width: f64,
    /// Calendar days forecast past the last observation.
    pub future_periods: i64,
    /// The adapter refuses series with this many points or fewer.
    pub min_samples: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            changepoint_flexibility: DEFAULT_CHANGEPOINT_FLEXIBILITY,
            yearly_seasonality: true,
            weekly_seasonality: true,
            daily_seasonality: false,
            interval_width: DEFAULT_INTERVAL_WIDTH,
            future_periods: DEFAULT_FUTURE_PERIODS,
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }
}

impl ForecastConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        if !(self.changepoint_flexibility.is_finite() && self.changepoint_flexibility > 0.0) {
            return Err(PipelineError::Configuration(format!(
                "changepoint flexibility must be a positive number (value: {})",
                self.changepoint_flexibility
            )));
        }
        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return Err(PipelineError::Configuration(format!(
                "interval width must be within (0, 1) (value: {})",
                self.interval_width
            )));
        }
        if self.future_periods < 1 {
            return Err(PipelineError::Configuration(format!(
                "future periods must be >= 1 (value: {})",
                self.future_periods
            )));
        }
        Ok(())
    }
}

/// Trend/seasonality model seam. Implementations fit on a canonical series
/// and predict arbitrary dates, history included.
pub trait ForecastModel {
    type Fitted;

    fn fit(&self, series: &CanonicalSeries, config: &ForecastConfig)
        -> PipelineResult<Self::Fitted>;

    fn predict(&self, fitted: &Self::Fitted, dates: &[NaiveDate])
        -> PipelineResult<Vec<ForecastRow>>;
}

/// Forecast rows covering history plus the future horizon, sorted by date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastTable {
    rows: Vec<ForecastRow>,
    last_observed: Option<NaiveDate>,
}

impl ForecastTable {
    pub fn new(mut rows: Vec<ForecastRow>, last_observed: NaiveDate) -> Self {
        rows.sort_by(|a, b| a.date.cmp(&b.date));
        Self {
            rows,
            last_observed: Some(last_observed),
        }
    }

    pub fn rows(&self) -> &[ForecastRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last_observed(&self) -> Option<NaiveDate> {
        self.last_observed
    }

    pub fn future_rows(&self) -> impl Iterator<Item = &ForecastRow> {
        let cutoff = self.last_observed;
        self.rows
            .iter()
            .filter(move |row| cutoff.map_or(true, |last| row.date > last))
    }

    /// Row whose date is nearest to `target`; the earlier row wins a tie.
    pub fn closest_row(&self, target: NaiveDate) -> Option<&ForecastRow> {
        if self.rows.is_empty() {
            return None;
        }
        let index = self.rows.partition_point(|row| row.date < target);
        let after = self.rows.get(index);
        let before = index.checked_sub(1).and_then(|i| self.rows.get(i));
        match (before, after) {
            (Some(b), Some(a)) => {
                let distance_before = (target - b.date).num_days();
                let distance_after = (a.date - target).num_days();
                if distance_after < distance_before {
                    Some(a)
                } else {
                    Some(b)
                }
            }
            (Some(b), None) => Some(b),
            (None, Some(a)) => Some(a),
            (None, None) => None,
        }
    }
}

/// Runs a `ForecastModel` over a canonical series with input validation and
/// output invariant checks.
pub struct ForecastAdapter<M> {
    model: M,
    config: ForecastConfig,
}

impl<M: ForecastModel> ForecastAdapter<M> {
    pub fn new(model: M, config: ForecastConfig) -> Self {
        Self { model, config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn forecast(&self, symbol: &str, series: &CanonicalSeries) -> PipelineResult<ForecastTable> {
        if series.len() <= self.config.min_samples {
            return Err(PipelineError::InsufficientSamples {
                symbol: symbol.to_string(),
                found: series.len(),
                required: self.config.min_samples,
            });
        }
        if series.values().any(|value| !value.is_finite()) {
            return Err(PipelineError::forecast_unavailable(format!(
                "{} contains non-finite values",
                symbol
            )));
        }
        if series.distinct_value_count() < 2 {
            return Err(PipelineError::forecast_unavailable(format!(
                "{} has fewer than two distinct values",
                symbol
            )));
        }
        let Some(last) = series.last().map(|point| point.date) else {
            return Err(PipelineError::data_unavailable(symbol, "empty series"));
        };

        let fitted = self.model.fit(series, &self.config)?;
        let dates = forecast_dates(series, self.config.future_periods);
        let rows = self.model.predict(&fitted, &dates)?;

        if rows.len() != dates.len() {
            return Err(PipelineError::forecast_unavailable(format!(
                "model returned {} row(s) for {} date(s)",
                rows.len(),
                dates.len()
            )));
        }
        if let Some(bad) = rows
            .iter()
            .find(|row| !row.yhat.is_finite() || !row.band_is_ordered())
        {
            return Err(PipelineError::forecast_unavailable(format!(
                "model produced an invalid band on {}",
                bad.date
            )));
        }

        let table = ForecastTable::new(rows, last);
        debug!(
            "Forecast for {}: {} history row(s), {} future row(s)",
            symbol,
            series.len(),
            table.future_rows().count()
        );
        Ok(table)
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// History dates followed by the calendar days up to `future_periods` past
/// the last observation.
///
/// A history without a single weekend date leaves the weekly seasonality
/// unconstrained on Saturday and Sunday, so the future skips weekends too and
/// a weekend horizon target resolves to the nearest trading day.
pub fn forecast_dates(series: &CanonicalSeries, future_periods: i64) -> Vec<NaiveDate> {
    let mut dates: Vec<NaiveDate> = series.dates().collect();
    let trading_days_only = !dates.is_empty() && !dates.iter().any(|date| is_weekend(*date));
    if let Some(last) = series.last().map(|point| point.date) {
        dates.extend(
            (1..=future_periods)
                .map(|offset| last + Duration::days(offset))
                .filter(|date| !(trading_days_only && is_weekend(*date))),
        );
    }
    dates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 2).unwrap() + Duration::days(offset)
    }

    fn flat_row(date: NaiveDate, value: f64) -> ForecastRow {
        ForecastRow {
            date,
            yhat: value,
            yhat_lower: value - 1.0,
            yhat_upper: value + 1.0,
            trend: value,
            yearly: None,
            weekly: None,
        }
    }

    /// Echoes the last observed value with a fixed band.
    struct LastValueModel;

    impl ForecastModel for LastValueModel {
        type Fitted = f64;

        fn fit(&self, series: &CanonicalSeries, _config: &ForecastConfig) -> PipelineResult<f64> {
            Ok(series.last().map(|p| p.value).unwrap_or_default())
        }

        fn predict(&self, fitted: &f64, dates: &[NaiveDate]) -> PipelineResult<Vec<ForecastRow>> {
            Ok(dates.iter().map(|d| flat_row(*d, *fitted)).collect())
        }
    }

    struct InvertedBandModel;

    impl ForecastModel for InvertedBandModel {
        type Fitted = ();

        fn fit(&self, _series: &CanonicalSeries, _config: &ForecastConfig) -> PipelineResult<()> {
            Ok(())
        }

        fn predict(&self, _fitted: &(), dates: &[NaiveDate]) -> PipelineResult<Vec<ForecastRow>> {
            Ok(dates
                .iter()
                .map(|d| ForecastRow {
                    yhat_lower: 2.0,
                    yhat_upper: 0.0,
                    ..flat_row(*d, 1.0)
                })
                .collect())
        }
    }

    fn series(len: usize) -> CanonicalSeries {
        CanonicalSeries::from_pairs((0..len).map(|i| (day(i as i64), 100.0 + i as f64)))
    }

    #[test]
    fn defaults_are_fixed() {
        let config = ForecastConfig::default();
        assert_eq!(config.changepoint_flexibility, 0.05);
        assert!(config.yearly_seasonality && config.weekly_seasonality);
        assert!(!config.daily_seasonality);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn covers_history_and_future() {
        let adapter = ForecastAdapter::new(LastValueModel, ForecastConfig::default());
        let table = adapter.forecast("T", &series(60)).unwrap();
        assert_eq!(table.len(), 60 + 366);
        assert_eq!(table.last_observed(), Some(day(59)));
        assert_eq!(table.future_rows().count(), 366);
        assert_eq!(table.rows().last().unwrap().date, day(59 + 366));
    }

    #[test]
    fn trading_day_history_forecasts_trading_days() {
        // day(0) is a Monday.
        let weekdays = CanonicalSeries::from_pairs(
            (0..84)
                .map(day)
                .filter(|date| !is_weekend(*date))
                .enumerate()
                .map(|(i, date)| (date, 100.0 + i as f64)),
        );
        let last = weekdays.last().unwrap().date;
        assert_eq!(last.weekday(), Weekday::Fri);

        let adapter = ForecastAdapter::new(LastValueModel, ForecastConfig::default());
        let table = adapter.forecast("T", &weekdays).unwrap();
        assert!(table.rows().iter().all(|row| !is_weekend(row.date)));
        assert!(table.future_rows().count() < 366);
        assert!(table.rows().last().unwrap().date <= last + Duration::days(366));

        let saturday = last + Duration::days(1);
        let sunday = last + Duration::days(2);
        assert_eq!(table.closest_row(saturday).unwrap().date, last);
        assert_eq!(table.closest_row(sunday).unwrap().date, last + Duration::days(3));
    }

    #[test]
    fn calendar_day_history_keeps_weekends() {
        let dates = forecast_dates(&series(60), 7);
        assert_eq!(dates.len(), 67);
        assert!(dates[60..].iter().any(|date| is_weekend(*date)));
    }

    #[test]
    fn short_series_is_insufficient() {
        let adapter = ForecastAdapter::new(LastValueModel, ForecastConfig::default());
        let err = adapter.forecast("T", &series(50)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientSamples { found: 50, required: 50, .. }
        ));
    }

    #[test]
    fn constant_series_is_unavailable() {
        let adapter = ForecastAdapter::new(LastValueModel, ForecastConfig::default());
        let flat = CanonicalSeries::from_pairs((0..80).map(|i| (day(i), 42.0)));
        assert!(matches!(
            adapter.forecast("T", &flat),
            Err(PipelineError::ForecastUnavailable { .. })
        ));
    }

    #[test]
    fn inverted_band_is_rejected() {
        let adapter = ForecastAdapter::new(InvertedBandModel, ForecastConfig::default());
        assert!(matches!(
            adapter.forecast("T", &series(60)),
            Err(PipelineError::ForecastUnavailable { .. })
        ));
    }

    #[test]
    fn closest_row_prefers_nearest_then_earlier() {
        let table = ForecastTable::new(
            vec![flat_row(day(0), 1.0), flat_row(day(4), 2.0), flat_row(day(10), 3.0)],
            day(0),
        );
        assert_eq!(table.closest_row(day(1)).unwrap().date, day(0));
        assert_eq!(table.closest_row(day(2)).unwrap().date, day(0));
        assert_eq!(table.closest_row(day(3)).unwrap().date, day(4));
        assert_eq!(table.closest_row(day(7)).unwrap().date, day(4));
        assert_eq!(table.closest_row(day(40)).unwrap().date, day(10));
        assert_eq!(table.closest_row(day(-5)).unwrap().date, day(0));
        assert!(ForecastTable::default().closest_row(day(0)).is_none());
    }
}
