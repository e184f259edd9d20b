use crate::models::{ForecastRow, Horizon, ProbabilityResult};
use chrono::NaiveDate;
use statrs::function::erf::erf;
use std::f64::consts::SQRT_2;

/// Divisor that turns the forecast band width into an implied standard
/// deviation (upper ≈ mean + 1.28σ, lower ≈ mean − 1.28σ). Downstream
/// thresholds are calibrated against this exact value.
pub const BAND_WIDTH_TO_SIGMA: f64 = 2.56;

/// Returned when the band carries no spread information.
pub const NEUTRAL_PROBABILITY: f64 = 50.0;

pub fn standard_normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / SQRT_2))
}

/// Probability (0–100) that the price ends above `current`, treating the
/// forecast band as a Gaussian around `predicted`.
pub fn rise_probability(current: f64, predicted: f64, lower: f64, upper: f64) -> f64 {
    if !(current.is_finite() && predicted.is_finite() && lower.is_finite() && upper.is_finite()) {
        return NEUTRAL_PROBABILITY;
    }
    let sigma = (upper - lower).abs() / BAND_WIDTH_TO_SIGMA;
    if sigma == 0.0 {
        return NEUTRAL_PROBABILITY;
    }
    let z_score = (predicted - current) / sigma;
    (standard_normal_cdf(z_score) * 100.0).clamp(0.0, 100.0)
}

pub fn row_probability(current: f64, row: &ForecastRow) -> f64 {
    rise_probability(current, row.yhat, row.yhat_lower, row.yhat_upper)
}

/// Evaluates one horizon against a forecast row already picked for it.
pub fn evaluate_horizon(
    horizon: &Horizon,
    anchor: NaiveDate,
    current: f64,
    row: &ForecastRow,
) -> ProbabilityResult {
    ProbabilityResult {
        horizon_label: horizon.label.clone(),
        target_date: horizon.target_date(anchor),
        predicted_value: row.yhat,
        rise_probability: row_probability(current, row),
    }
}
