use crate::analysis::{build_detail_report, DetailReport};
use crate::commands::render::{
    format_cell, format_percent_change, format_price, format_probability, format_ratio, print_json,
};
use crate::context::AppContext;
use anyhow::{Context, Result};

pub fn run(app: &AppContext, code: &str, json: bool) -> Result<DetailReport> {
    let adapter = app.forecast_adapter();
    let report = build_detail_report(app.provider(), &adapter, app.config(), code)
        .with_context(|| format!("could not analyse {}", code))?;

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }
    Ok(report)
}

fn print_report(report: &DetailReport) {
    println!("{} ({})", report.display_name, report.ticker);
    println!(
        "Last close {} on {}",
        format_price(report.current_price),
        report.last_date.format("%Y-%m-%d")
    );
    if !report.latest_row.is_empty() {
        let cells: Vec<String> = report
            .latest_row
            .iter()
            .skip(1)
            .map(|(name, cell)| format!("{} {}", name, format_cell(cell)))
            .collect();
        println!("Latest row: {}", cells.join(" | "));
    }

    println!();
    println!("{:<7} {:>11} {:>14} {:>9}  Reasons", "Horizon", "Target", "Forecast", "Rise");
    for horizon in &report.horizons {
        let reasons: Vec<String> = horizon.reasons.iter().map(ToString::to_string).collect();
        println!(
            "{:<7} {:>11} {:>14} {:>9}  {}",
            horizon.probability.horizon_label,
            horizon.probability.target_date.format("%Y-%m-%d"),
            format_price(horizon.probability.predicted_value),
            format_probability(horizon.probability.rise_probability),
            reasons.join(", ")
        );
    }
    if report.promoted {
        println!("* at least one horizon clears the promotion threshold");
    }

    println!();
    match &report.reference_symbol {
        Some(reference) if report.anomalies.is_empty() => {
            println!("No big moves against {} in the lookback window", reference);
        }
        Some(reference) => {
            println!("Big moves (vs {}), newest first:", reference);
            for event in &report.anomalies {
                println!(
                    "  {}  {:>8}  ref {:>8}  {}",
                    event.date.format("%Y-%m-%d"),
                    format_percent_change(event.pct_change),
                    format_percent_change(event.reference_pct_change),
                    event.classification.as_str()
                );
            }
        }
        None => println!("Reference series unavailable; big-move check skipped"),
    }

    println!();
    match &report.ranking {
        Some(entry) => println!(
            "Range position {:.1}% | PER {} | PBR {} | yield {} -> {} (rank {})",
            entry.position_in_range_pct,
            format_ratio(entry.fundamentals.earnings_multiple),
            format_ratio(entry.fundamentals.book_multiple),
            format_ratio(entry.fundamentals.yield_pct),
            entry.recommendation.as_str(),
            entry.rank
        ),
        None => println!("Ranking unavailable"),
    }
}
