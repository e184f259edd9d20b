use crate::commands::render::{format_probability, format_whole_price, print_json};
use crate::context::AppContext;
use crate::models::ScreeningOutcome;
use crate::progress::{ProgressReporter, SilentProgress, TerminalProgress};
use crate::screening::Screener;
use anyhow::{Context, Result};
use log::{info, warn};

pub fn run(app: &AppContext, codes: &[String], json: bool) -> Result<ScreeningOutcome> {
    let config = app.config();
    let adapter = app.forecast_adapter();
    let screener = Screener::new(app.provider(), &adapter, config);

    let terminal;
    let silent = SilentProgress;
    let progress: &dyn ProgressReporter = if json {
        &silent
    } else {
        terminal = TerminalProgress::new(codes.len());
        &terminal
    };

    let outcome = screener
        .run(codes, progress)
        .context("screening run failed")?;

    if nothing_retrieved(&outcome) {
        warn!("No data could be retrieved for any ticker");
    }
    if json {
        print_json(&outcome)?;
    } else {
        print_table(app, &outcome);
    }
    Ok(outcome)
}

fn nothing_retrieved(outcome: &ScreeningOutcome) -> bool {
    outcome.records.is_empty()
}

fn print_table(app: &AppContext, outcome: &ScreeningOutcome) {
    let labels: Vec<&str> = app
        .config()
        .horizons
        .iter()
        .map(|h| h.label.as_str())
        .collect();
    let mut header = format!("   {:<10} {:<28} {:>14} {:>11}", "Ticker", "Name", "Price", "As of");
    for label in &labels {
        header.push_str(&format!(" {:>8}", label));
    }
    println!("{}", header);

    for record in &outcome.records {
        let marker = if record.promoted { "*" } else { " " };
        let mut line = format!(
            "{}  {:<10} {:<28} {:>14} {:>11}",
            marker,
            record.ticker,
            truncate(&record.display_name, 28),
            format_whole_price(record.current_price),
            record.last_date.format("%Y-%m-%d")
        );
        for label in &labels {
            let cell = record
                .probability_for(label)
                .map(|p| format_probability(p.rise_probability))
                .unwrap_or_else(|| "-".to_string());
            line.push_str(&format!(" {:>8}", cell));
        }
        println!("{}", line);
    }

    for skipped in &outcome.skipped {
        println!("   {:<10} skipped ({}): {}", skipped.ticker, skipped.kind, skipped.reason);
    }

    let promoted: Vec<&str> = outcome.promoted().map(|r| r.ticker.as_str()).collect();
    if promoted.is_empty() {
        info!(
            "No ticker reached the {} promotion threshold",
            format_probability(app.config().promotion_threshold)
        );
    } else {
        println!(
            "\n* rise probability >= {} at some horizon: {}",
            format_probability(app.config().promotion_threshold),
            promoted.join(", ")
        );
    }
}

pub(crate) fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut shortened: String = text.chars().take(width.saturating_sub(1)).collect();
    shortened.push('…');
    shortened
}
