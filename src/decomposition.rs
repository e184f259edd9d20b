//! Additive trend + seasonality model.
//!
//! `y(t) = trend(t) + yearly(t) + weekly(t)` where the trend is piecewise
//! linear with regularised changepoints and each seasonality is a truncated
//! Fourier series. Coefficients come from one ridge-penalised least-squares
//! solve. Future uncertainty grows with the horizon as the trend may keep
//! changing at the rate observed in history.

use crate::error::{PipelineError, PipelineResult};
use crate::forecast::{ForecastConfig, ForecastModel};
use crate::models::{CanonicalSeries, ForecastRow};
use chrono::NaiveDate;
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use statrs::function::erf::erf_inv;
use std::f64::consts::{PI, SQRT_2};

const MAX_CHANGEPOINTS: usize = 25;
const CHANGEPOINT_RANGE: f64 = 0.8;
const YEARLY_PERIOD_DAYS: f64 = 365.25;
const YEARLY_ORDER: usize = 10;
const WEEKLY_PERIOD_DAYS: f64 = 7.0;
const WEEKLY_ORDER: usize = 3;
const SEASONALITY_PRIOR_SCALE: f64 = 10.0;

/// Ridge strength on changepoint deltas is `TREND_PENALTY / flexibility²`.
const TREND_PENALTY: f64 = 1e-3;
const SEASONALITY_PENALTY: f64 = 1e-3;
const BASE_PENALTY: f64 = 1e-6;
/// Observation noise floor, in scaled units.
const MIN_SIGMA_SCALED: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Seasonality {
    period_days: f64,
    order: usize,
}

impl Seasonality {
    fn width(&self) -> usize {
        self.order * 2
    }

    fn features(&self, epoch_days: f64, out: &mut Vec<f64>) {
        for i in 1..=self.order {
            let angle = 2.0 * PI * i as f64 * epoch_days / self.period_days;
            out.push(angle.sin());
            out.push(angle.cos());
        }
    }

    fn evaluate(&self, epoch_days: f64, coefficients: &[f64]) -> f64 {
        let mut features = Vec::with_capacity(self.width());
        self.features(epoch_days, &mut features);
        features
            .iter()
            .zip(coefficients)
            .map(|(feature, beta)| feature * beta)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecompositionModel;

impl DecompositionModel {
    pub fn new() -> Self {
        Self
    }
}

/// Fitted coefficients, kept in scaled units.
#[derive(Debug, Clone)]
pub struct FittedDecomposition {
    start: NaiveDate,
    span_days: f64,
    y_scale: f64,
    changepoints: Vec<f64>,
    offset: f64,
    slope: f64,
    deltas: Vec<f64>,
    yearly: Option<(Seasonality, Vec<f64>)>,
    weekly: Option<(Seasonality, Vec<f64>)>,
    sigma_obs: f64,
    trend_change_scale: f64,
    z: f64,
}

impl FittedDecomposition {
    fn scaled_time(&self, date: NaiveDate) -> f64 {
        (date - self.start).num_days() as f64 / self.span_days
    }

    fn scaled_trend(&self, t: f64) -> f64 {
        let changes: f64 = self
            .changepoints
            .iter()
            .zip(&self.deltas)
            .map(|(s, delta)| delta * (t - s).max(0.0))
            .sum();
        self.offset + self.slope * t + changes
    }

    /// Variance of future trend drift `h` scaled units past the history.
    fn trend_drift_variance(&self, t: f64) -> f64 {
        let h = (t - 1.0).max(0.0);
        if h == 0.0 || self.changepoints.is_empty() {
            return 0.0;
        }
        let rate = self.changepoints.len() as f64;
        rate * 2.0 * self.trend_change_scale.powi(2) * h.powi(3) / 3.0
    }
}

fn epoch_days(date: NaiveDate) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN);
    (date - epoch).num_days() as f64
}

/// Changepoint positions (scaled time) spread over the first part of history.
fn place_changepoints(t: &[f64]) -> Vec<f64> {
    let history = ((t.len() as f64) * CHANGEPOINT_RANGE).floor() as usize;
    if history < 2 {
        return Vec::new();
    }
    let count = MAX_CHANGEPOINTS.min(history - 1);
    (1..=count)
        .map(|j| {
            let index = (j as f64 * (history - 1) as f64 / count as f64).round() as usize;
            t[index.min(t.len() - 1)]
        })
        .collect()
}

fn z_for_width(width: f64) -> f64 {
    SQRT_2 * erf_inv(width)
}

impl ForecastModel for DecompositionModel {
    type Fitted = FittedDecomposition;

    fn fit(&self, series: &CanonicalSeries, config: &ForecastConfig) -> PipelineResult<Self::Fitted> {
        config.validate()?;
        let (Some(first), Some(last)) = (series.first(), series.last()) else {
            return Err(PipelineError::forecast_unavailable("empty series"));
        };
        let y_scale = series.values().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        if !(y_scale > 0.0 && y_scale.is_finite()) {
            return Err(PipelineError::forecast_unavailable(
                "series has no non-zero finite values",
            ));
        }
        if config.daily_seasonality {
            warn!("Daily seasonality requested on daily data; ignoring it");
        }

        let start = first.date;
        let span_days = ((last.date - start).num_days() as f64).max(1.0);
        let t: Vec<f64> = series
            .dates()
            .map(|date| (date - start).num_days() as f64 / span_days)
            .collect();
        let y: Vec<f64> = series.values().map(|v| v / y_scale).collect();
        let changepoints = place_changepoints(&t);

        let yearly = config.yearly_seasonality.then_some(Seasonality {
            period_days: YEARLY_PERIOD_DAYS,
            order: YEARLY_ORDER,
        });
        let weekly = config.weekly_seasonality.then_some(Seasonality {
            period_days: WEEKLY_PERIOD_DAYS,
            order: WEEKLY_ORDER,
        });

        let n_cp = changepoints.len();
        let yearly_width = yearly.map_or(0, |s| s.width());
        let weekly_width = weekly.map_or(0, |s| s.width());
        let width = 2 + n_cp + yearly_width + weekly_width;

        let mut design = DMatrix::<f64>::zeros(t.len(), width);
        let mut row_features = Vec::with_capacity(width);
        for (row, (point, &ti)) in series.points().iter().zip(&t).enumerate() {
            row_features.clear();
            row_features.push(1.0);
            row_features.push(ti);
            row_features.extend(changepoints.iter().map(|s| (ti - s).max(0.0)));
            let days = epoch_days(point.date);
            if let Some(season) = &yearly {
                season.features(days, &mut row_features);
            }
            if let Some(season) = &weekly {
                season.features(days, &mut row_features);
            }
            for (column, value) in row_features.iter().enumerate() {
                design[(row, column)] = *value;
            }
        }

        let delta_penalty = TREND_PENALTY / config.changepoint_flexibility.powi(2);
        let season_penalty = SEASONALITY_PENALTY / SEASONALITY_PRIOR_SCALE.powi(2);
        let mut penalties = vec![BASE_PENALTY; 2];
        penalties.extend(std::iter::repeat(delta_penalty).take(n_cp));
        penalties.extend(std::iter::repeat(season_penalty).take(yearly_width + weekly_width));

        let target = DVector::from_vec(y.clone());
        let mut normal = design.transpose() * &design;
        for (i, penalty) in penalties.iter().enumerate() {
            normal[(i, i)] += penalty;
        }
        let rhs = design.transpose() * &target;
        let Some(cholesky) = normal.cholesky() else {
            return Err(PipelineError::forecast_unavailable(
                "normal equations are not positive definite",
            ));
        };
        let beta = cholesky.solve(&rhs);
        if beta.iter().any(|b| !b.is_finite()) {
            return Err(PipelineError::forecast_unavailable(
                "fit did not converge to finite coefficients",
            ));
        }

        let fitted_values = &design * &beta;
        let residual_ss: f64 = fitted_values
            .iter()
            .zip(&y)
            .map(|(fit, actual)| (actual - fit).powi(2))
            .sum();
        let sigma_obs = (residual_ss / t.len() as f64).sqrt().max(MIN_SIGMA_SCALED);

        let coefficients = beta.as_slice();
        let deltas = coefficients[2..2 + n_cp].to_vec();
        let trend_change_scale = if deltas.is_empty() {
            0.0
        } else {
            deltas.iter().map(|d| d.abs()).sum::<f64>() / deltas.len() as f64
        };
        let yearly_start = 2 + n_cp;
        let weekly_start = yearly_start + yearly_width;

        debug!(
            "Fitted decomposition: {} changepoint(s), sigma_obs={:.6}, trend change scale={:.6}",
            n_cp, sigma_obs, trend_change_scale
        );

        Ok(FittedDecomposition {
            start,
            span_days,
            y_scale,
            changepoints,
            offset: coefficients[0],
            slope: coefficients[1],
            deltas,
            yearly: yearly.map(|s| (s, coefficients[yearly_start..weekly_start].to_vec())),
            weekly: weekly.map(|s| (s, coefficients[weekly_start..width].to_vec())),
            sigma_obs,
            trend_change_scale,
            z: z_for_width(config.interval_width),
        })
    }

    fn predict(&self, fitted: &Self::Fitted, dates: &[NaiveDate]) -> PipelineResult<Vec<ForecastRow>> {
        let rows = dates
            .iter()
            .map(|&date| {
                let t = fitted.scaled_time(date);
                let days = epoch_days(date);
                let trend = fitted.scaled_trend(t) * fitted.y_scale;
                let yearly = fitted
                    .yearly
                    .as_ref()
                    .map(|(season, beta)| season.evaluate(days, beta) * fitted.y_scale);
                let weekly = fitted
                    .weekly
                    .as_ref()
                    .map(|(season, beta)| season.evaluate(days, beta) * fitted.y_scale);
                let yhat = trend + yearly.unwrap_or(0.0) + weekly.unwrap_or(0.0);
                let sigma = (fitted.sigma_obs.powi(2) + fitted.trend_drift_variance(t)).sqrt()
                    * fitted.y_scale;
                let half_width = fitted.z * sigma;
                ForecastRow {
                    date,
                    yhat,
                    yhat_lower: yhat - half_width,
                    yhat_upper: yhat + half_width,
                    trend,
                    yearly,
                    weekly,
                }
            })
            .collect();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::{forecast_dates, ForecastAdapter};
    use chrono::{Datelike, Duration, Weekday};

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, 3).unwrap() + Duration::days(offset)
    }

    fn linear(len: usize, from: f64, to: f64) -> CanonicalSeries {
        let step = (to - from) / (len - 1) as f64;
        CanonicalSeries::from_pairs((0..len).map(|i| (day(i as i64), from + step * i as f64)))
    }

    #[test]
    fn width_maps_to_normal_quantile() {
        assert!((z_for_width(0.80) - 1.2816).abs() < 1e-3);
        assert!((z_for_width(0.95) - 1.96).abs() < 1e-3);
    }

    #[test]
    fn changepoints_stay_inside_early_history() {
        let t: Vec<f64> = (0..200).map(|i| i as f64 / 199.0).collect();
        let cps = place_changepoints(&t);
        assert_eq!(cps.len(), MAX_CHANGEPOINTS);
        assert!(cps.iter().all(|s| *s > 0.0 && *s <= CHANGEPOINT_RANGE));
        assert!(cps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn linear_series_extrapolates_its_slope() {
        let series = linear(120, 100.0, 150.0);
        let model = DecompositionModel::new();
        let config = ForecastConfig::default();
        let fitted = model.fit(&series, &config).unwrap();
        let target = day(119 + 30);
        let rows = model.predict(&fitted, &[target]).unwrap();
        let expected = 150.0 + 30.0 * 50.0 / 119.0;
        assert!(
            (rows[0].yhat - expected).abs() / expected < 0.01,
            "yhat {} expected {}",
            rows[0].yhat,
            expected
        );
        assert!(rows[0].band_is_ordered());
    }

    #[test]
    fn bands_widen_with_horizon_after_trend_changes() {
        let series = CanonicalSeries::from_pairs((0..400).map(|i| {
            let value = if i < 200 {
                100.0 + i as f64 * 0.2
            } else {
                140.0 - (i - 200) as f64 * 0.15
            };
            (day(i), value + ((i * 7919) % 13) as f64 * 0.1)
        }));
        let model = DecompositionModel::new();
        let fitted = model.fit(&series, &ForecastConfig::default()).unwrap();
        let rows = model
            .predict(&fitted, &[day(399), day(399 + 30), day(399 + 365)])
            .unwrap();
        let widths: Vec<f64> = rows.iter().map(|r| r.yhat_upper - r.yhat_lower).collect();
        assert!(widths[0] > 0.0);
        assert!(widths[1] > widths[0]);
        assert!(widths[2] > widths[1]);
    }

    #[test]
    fn weekly_component_tracks_weekday_effect() {
        let series = CanonicalSeries::from_pairs((0..210).map(|i| {
            let date = day(i);
            let bump = if date.weekday() == Weekday::Fri { 3.0 } else { 0.0 };
            (date, 100.0 + i as f64 * 0.05 + bump)
        }));
        let model = DecompositionModel::new();
        let fitted = model.fit(&series, &ForecastConfig::default()).unwrap();
        let dates = forecast_dates(&series, 14);
        let rows = model.predict(&fitted, &dates).unwrap();
        let friday = rows
            .iter()
            .rev()
            .find(|r| r.date.weekday() == Weekday::Fri)
            .unwrap();
        let tuesday = rows
            .iter()
            .rev()
            .find(|r| r.date.weekday() == Weekday::Tue)
            .unwrap();
        assert!(friday.weekly.unwrap() > tuesday.weekly.unwrap());
        assert!(friday.weekly.unwrap() > 0.0);
    }

    #[test]
    fn disabled_seasonalities_are_absent() {
        let series = linear(80, 10.0, 20.0);
        let config = ForecastConfig {
            yearly_seasonality: false,
            weekly_seasonality: false,
            ..ForecastConfig::default()
        };
        let model = DecompositionModel::new();
        let fitted = model.fit(&series, &config).unwrap();
        let rows = model.predict(&fitted, &[day(100)]).unwrap();
        assert!(rows[0].yearly.is_none());
        assert!(rows[0].weekly.is_none());
        assert_eq!(rows[0].yhat, rows[0].trend);
    }

    #[test]
    fn adapter_with_decomposition_covers_future() {
        let adapter = ForecastAdapter::new(DecompositionModel::new(), ForecastConfig::default());
        let table = adapter.forecast("LIN", &linear(120, 100.0, 150.0)).unwrap();
        assert_eq!(table.len(), 120 + 366);
        assert!(table.rows().iter().all(|row| row.band_is_ordered()));
    }
}
