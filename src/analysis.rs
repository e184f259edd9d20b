use crate::anomaly::detect_anomalies;
use crate::config::ScreeningConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::forecast::{ForecastAdapter, ForecastModel};
use crate::fundamentals::rank_ticker;
use crate::market_data::MarketDataProvider;
use crate::models::{AnomalyEvent, ProbabilityResult, RankingEntry};
use crate::reasons::{reason_tags, ReasonTag, TagDetail};
use crate::screening::{
    close_series_from, display_name_for, evaluate_horizons, fetch_raw_history, load_close_series,
};
use chrono::NaiveDate;
use log::{info, warn};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HorizonDetail {
    #[serde(flatten)]
    pub probability: ProbabilityResult,
    pub reasons: Vec<ReasonTag>,
}

/// Everything the single-ticker view shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailReport {
    pub ticker: String,
    pub display_name: String,
    pub current_price: f64,
    pub last_date: NaiveDate,
    /// Most recent provider row as `(column, cell)` pairs, unconverted.
    pub latest_row: Vec<(String, Value)>,
    pub horizons: Vec<HorizonDetail>,
    pub promoted: bool,
    /// `None` when the reference series could not be loaded.
    pub reference_symbol: Option<String>,
    pub anomalies: Vec<AnomalyEvent>,
    pub ranking: Option<RankingEntry>,
}

/// Builds the detail view for one code. The forecast chain must succeed;
/// the anomaly and ranking sections degrade to empty on failure.
pub fn build_detail_report<P, M>(
    provider: &P,
    adapter: &ForecastAdapter<M>,
    config: &ScreeningConfig,
    code: &str,
) -> PipelineResult<DetailReport>
where
    P: MarketDataProvider + ?Sized,
    M: ForecastModel,
{
    config.validate()?;
    let symbol = config.provider_symbol(code);
    let raw = fetch_raw_history(provider, config, &symbol)?;
    let series = close_series_from(&symbol, &raw)?;
    let latest_row = raw
        .rows
        .last()
        .map(|cells| {
            raw.column_names()
                .into_iter()
                .zip(cells.iter())
                .map(|(name, cell)| (name.to_string(), cell.clone()))
                .collect()
        })
        .unwrap_or_default();
    let Some(last) = series.last().copied() else {
        return Err(PipelineError::data_unavailable(&symbol, "empty series"));
    };

    let forecast = adapter.forecast(&symbol, &series)?;
    let (probabilities, promoted) = evaluate_horizons(
        last.value,
        last.date,
        &forecast,
        &config.horizons,
        config.promotion_threshold,
    )?;

    let horizons = probabilities
        .into_iter()
        .map(|probability| {
            let reasons = forecast
                .closest_row(probability.target_date)
                .map(|row| {
                    reason_tags(
                        row,
                        last.value,
                        probability.predicted_value,
                        TagDetail::Long,
                        last.date,
                    )
                })
                .unwrap_or_default();
            HorizonDetail {
                probability,
                reasons,
            }
        })
        .collect();

    let reference_symbol = config.provider_symbol(&config.reference_symbol);
    let (reference_symbol, anomalies) =
        match load_close_series(provider, config, &reference_symbol) {
            Ok(reference) => {
                let events = detect_anomalies(&series, &reference, config.anomaly_threshold);
                info!(
                    "{} big move(s) for {} against {}",
                    events.len(),
                    symbol,
                    reference_symbol
                );
                (Some(reference_symbol), events)
            }
            Err(err) => {
                warn!("Reference series unavailable, skipping anomalies: {}", err);
                (None, Vec::new())
            }
        };

    let ranking = match rank_ticker(provider, config, code) {
        Ok(entry) => Some(entry),
        Err(err) => {
            warn!("Ranking unavailable for {}: {}", symbol, err);
            None
        }
    };

    Ok(DetailReport {
        display_name: display_name_for(provider, &symbol, code),
        ticker: symbol,
        current_price: last.value,
        last_date: last.date,
        latest_row,
        horizons,
        promoted,
        reference_symbol,
        anomalies,
        ranking,
    })
}
