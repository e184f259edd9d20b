use crate::commands::render::{format_ratio, print_json};
use crate::commands::screen::truncate;
use crate::context::AppContext;
use crate::fundamentals::rank_watchlist;
use crate::models::{RankingEntry, SkippedTicker};
use anyhow::{Context, Result};
use log::warn;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RankingOutput {
    pub entries: Vec<RankingEntry>,
    pub skipped: Vec<SkippedTicker>,
}

pub fn run(app: &AppContext, codes: &[String], json: bool) -> Result<RankingOutput> {
    let (entries, skipped) =
        rank_watchlist(app.provider(), app.config(), codes).context("ranking run failed")?;
    let output = RankingOutput { entries, skipped };

    if json {
        print_json(&output)?;
        return Ok(output);
    }

    if output.entries.is_empty() {
        warn!("No data could be retrieved for any ticker");
    }
    println!(
        "{:>4}  {:<10} {:<13} {:>9} {:>7} {:>7} {:>7}",
        "Rank", "Ticker", "Class", "Position", "PER", "PBR", "Yield"
    );
    for entry in &output.entries {
        println!(
            "{:>4}  {:<10} {:<13} {:>8.1}% {:>7} {:>7} {:>7}",
            entry.rank,
            truncate(&entry.ticker, 10),
            entry.recommendation.as_str(),
            entry.position_in_range_pct,
            format_ratio(entry.fundamentals.earnings_multiple),
            format_ratio(entry.fundamentals.book_multiple),
            format_ratio(entry.fundamentals.yield_pct),
        );
    }
    for skipped in &output.skipped {
        println!("      {:<10} skipped ({}): {}", skipped.ticker, skipped.kind, skipped.reason);
    }
    Ok(output)
}
