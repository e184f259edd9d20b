use crate::config::ScreeningConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::market_data::MarketDataProvider;
use crate::models::{Fundamentals, OhlcTable, RankingEntry, Recommendation, SkippedTicker};
use crate::normalizer::normalize_ohlc;
use log::{debug, info, warn};
use std::cmp::Ordering;

pub const BUY_POSITION_MAX: f64 = 10.0;
pub const TOP_PICK_POSITION_MAX: f64 = 20.0;
pub const OVEREXTENDED_POSITION_MIN: f64 = 90.0;
pub const TOP_PICK_EARNINGS_MULTIPLE_MAX: f64 = 15.0;
pub const TOP_PICK_BOOK_MULTIPLE_MAX: f64 = 1.2;
pub const TOP_PICK_YIELD_MIN_PCT: f64 = 3.0;

/// Where `current` sits between the window's lowest low (0) and highest
/// high (100). A flat window reports 0.
pub fn position_in_range(current: f64, min_low: f64, max_high: f64) -> f64 {
    let span = max_high - min_low;
    if span == 0.0 || !span.is_finite() {
        return 0.0;
    }
    (current - min_low) / span * 100.0
}

/// Position of the last close within the table's low/high range.
pub fn position_from_bars(bars: &OhlcTable) -> Option<f64> {
    let last = bars.bars().last()?;
    let min_low = bars
        .bars()
        .iter()
        .map(|bar| bar.low)
        .fold(f64::INFINITY, f64::min);
    let max_high = bars
        .bars()
        .iter()
        .map(|bar| bar.high)
        .fold(f64::NEG_INFINITY, f64::max);
    Some(position_in_range(last.close, min_low, max_high))
}

fn is_top_pick(position: f64, fundamentals: &Fundamentals) -> bool {
    let (Some(earnings), Some(book), Some(yield_pct)) = (
        fundamentals.earnings_multiple,
        fundamentals.book_multiple,
        fundamentals.yield_pct,
    ) else {
        return false;
    };
    position <= TOP_PICK_POSITION_MAX
        && earnings < TOP_PICK_EARNINGS_MULTIPLE_MAX
        && book < TOP_PICK_BOOK_MULTIPLE_MAX
        && yield_pct > TOP_PICK_YIELD_MIN_PCT
}

pub fn classify(position: f64, fundamentals: &Fundamentals) -> Recommendation {
    if is_top_pick(position, fundamentals) {
        Recommendation::TopPick
    } else if position >= OVEREXTENDED_POSITION_MIN {
        Recommendation::Overextended
    } else if position <= BUY_POSITION_MAX {
        Recommendation::Buy
    } else {
        Recommendation::Watch
    }
}

pub fn rank_entry(ticker: &str, position: f64, fundamentals: Fundamentals) -> RankingEntry {
    let recommendation = classify(position, &fundamentals);
    RankingEntry {
        ticker: ticker.to_string(),
        position_in_range_pct: position,
        fundamentals,
        recommendation,
        rank: recommendation.rank(),
    }
}

/// Display order: rank ascending, then position ascending.
pub fn sort_entries(entries: &mut [RankingEntry]) {
    entries.sort_by(|a, b| {
        a.rank.cmp(&b.rank).then_with(|| {
            a.position_in_range_pct
                .partial_cmp(&b.position_in_range_pct)
                .unwrap_or(Ordering::Equal)
        })
    });
}

/// Ranking entry for one watchlist code. Missing fundamentals are tolerated;
/// missing price history is not.
pub fn rank_ticker<P: MarketDataProvider + ?Sized>(
    provider: &P,
    config: &ScreeningConfig,
    code: &str,
) -> PipelineResult<RankingEntry> {
    let symbol = config.provider_symbol(code);
    let raw = provider.fetch_history(&symbol, config.lookback, &config.interval)?;
    let bars = normalize_ohlc(&raw);
    let position = position_from_bars(&bars).ok_or_else(|| {
        PipelineError::data_unavailable(&symbol, "no usable price bars for range position")
    })?;

    let fundamentals = match provider.fetch_profile(&symbol) {
        Ok(profile) => profile.fundamentals,
        Err(err) => {
            debug!("No fundamentals for {}: {}", symbol, err);
            Fundamentals::default()
        }
    };
    Ok(rank_entry(&symbol, position, fundamentals))
}

/// Ranks a watchlist; failed tickers are skipped. Entries come back in
/// display order.
pub fn rank_watchlist<P: MarketDataProvider + ?Sized>(
    provider: &P,
    config: &ScreeningConfig,
    codes: &[String],
) -> PipelineResult<(Vec<RankingEntry>, Vec<SkippedTicker>)> {
    config.validate()?;
    if codes.is_empty() {
        return Err(PipelineError::Configuration(
            "ticker list is empty".to_string(),
        ));
    }

    let mut entries = Vec::with_capacity(codes.len());
    let mut skipped = Vec::new();
    for code in codes {
        match rank_ticker(provider, config, code) {
            Ok(entry) => entries.push(entry),
            Err(err) if err.is_skippable() => {
                warn!("Skipping {} in ranking: {}", code, err);
                skipped.push(SkippedTicker {
                    ticker: code.clone(),
                    kind: err.kind().to_string(),
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }
    sort_entries(&mut entries);
    info!(
        "Ranked {} ticker(s), {} skipped",
        entries.len(),
        skipped.len()
    );
    Ok((entries, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OhlcBar;
    use chrono::NaiveDate;

    fn full(earnings: f64, book: f64, yield_pct: f64) -> Fundamentals {
        Fundamentals {
            earnings_multiple: Some(earnings),
            book_multiple: Some(book),
            yield_pct: Some(yield_pct),
        }
    }

    #[test]
    fn cheap_low_in_range_is_top_pick() {
        let entry = rank_entry("7203.T", 15.0, full(10.0, 1.0, 4.0));
        assert_eq!(entry.recommendation, Recommendation::TopPick);
        assert_eq!(entry.rank, 1);
    }

    #[test]
    fn missing_ratios_fall_back_to_position() {
        let entry = rank_entry("7203.T", 15.0, Fundamentals::default());
        assert_eq!(entry.recommendation, Recommendation::Watch);
        assert_eq!(entry.rank, 3);

        let partial = Fundamentals {
            earnings_multiple: Some(10.0),
            book_multiple: None,
            yield_pct: Some(4.0),
        };
        assert_eq!(classify(5.0, &partial), Recommendation::Buy);
    }

    #[test]
    fn position_thresholds() {
        let none = Fundamentals::default();
        assert_eq!(classify(10.0, &none), Recommendation::Buy);
        assert_eq!(classify(10.5, &none), Recommendation::Watch);
        assert_eq!(classify(89.9, &none), Recommendation::Watch);
        assert_eq!(classify(90.0, &none), Recommendation::Overextended);
        // Strict ratio bounds.
        assert_eq!(classify(15.0, &full(15.0, 1.0, 4.0)), Recommendation::Watch);
        assert_eq!(classify(15.0, &full(10.0, 1.0, 3.0)), Recommendation::Watch);
        assert_eq!(classify(20.0, &full(10.0, 1.19, 3.1)), Recommendation::TopPick);
    }

    #[test]
    fn flat_range_is_zero() {
        assert_eq!(position_in_range(100.0, 100.0, 100.0), 0.0);
        assert_eq!(position_in_range(150.0, 100.0, 200.0), 50.0);
    }

    #[test]
    fn position_uses_window_extremes_and_last_close() {
        let day = |d| NaiveDate::from_ymd_opt(2024, 5, d).unwrap();
        let bars = OhlcTable::from_bars(vec![
            OhlcBar { date: day(1), open: 100.0, high: 110.0, low: 90.0, close: 105.0 },
            OhlcBar { date: day(2), open: 105.0, high: 190.0, low: 100.0, close: 180.0 },
            OhlcBar { date: day(3), open: 180.0, high: 185.0, low: 100.0, close: 110.0 },
        ]);
        assert_eq!(position_from_bars(&bars), Some(20.0));
        assert_eq!(position_from_bars(&OhlcTable::default()), None);
    }

    #[test]
    fn entries_sort_by_rank_then_position() {
        let mut entries = vec![
            rank_entry("A", 95.0, Fundamentals::default()),
            rank_entry("B", 50.0, Fundamentals::default()),
            rank_entry("C", 5.0, Fundamentals::default()),
            rank_entry("D", 30.0, Fundamentals::default()),
            rank_entry("E", 18.0, full(9.0, 0.8, 3.5)),
        ];
        sort_entries(&mut entries);
        let order: Vec<&str> = entries.iter().map(|e| e.ticker.as_str()).collect();
        assert_eq!(order, vec!["E", "C", "D", "B", "A"]);
    }
}
