use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use riseprob::{
    commands::{detail, rank, screen},
    config::{
        env_settings, parse_ticker_list, HorizonSet, LookbackPeriod, ScreeningConfig,
        DEFAULT_WATCHLIST,
    },
    context::AppContext,
};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "riseprob")]
#[command(about = "Forecast-driven rise-probability screening for equities")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Screen a watchlist and flag tickers likely to rise at some horizon
    Screen {
        /// Comma separated ticker codes (defaults to RISEPROB_TICKERS or the built-in watchlist)
        #[arg(long)]
        tickers: Option<String>,
        /// Screen tickers on the rayon thread pool
        #[arg(long)]
        parallel: bool,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Probabilities, reasons, big moves and ranking for a single ticker
    Detail {
        /// Ticker code, e.g. 7203 or 7203.T
        ticker: String,
        /// Reference series for the big-move check (defaults to JPY=X)
        #[arg(long)]
        reference: Option<String>,
        /// Minimum absolute daily move, in percent, reported as a big move
        #[arg(long = "anomaly-threshold")]
        anomaly_threshold: Option<f64>,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Rank a watchlist by position in range and valuation ratios
    Rank {
        /// Comma separated ticker codes (defaults to RISEPROB_TICKERS or the built-in watchlist)
        #[arg(long)]
        tickers: Option<String>,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// History window: 1y, 2y, 3y or 5y
    #[arg(long)]
    lookback: Option<String>,
    /// Horizon set: quarterly, standard or short
    #[arg(long)]
    horizons: Option<String>,
    /// Rise probability (0-100) at which a ticker is promoted
    #[arg(long)]
    threshold: Option<f64>,
    /// Read `<symbol>.json` fixtures from this directory instead of Yahoo Finance
    #[arg(long = "data-dir", value_name = "PATH")]
    data_dir: Option<PathBuf>,
    /// Print JSON instead of a text table
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting riseprob. Probabilities are model outputs, not financial advice.");

    let settings = env_settings();
    match cli.command {
        Commands::Screen {
            tickers,
            parallel,
            common,
        } => {
            let mut config = build_config(&settings, &common, HorizonSet::Quarterly)?;
            config.parallel = config.parallel || parallel;
            let codes = resolve_tickers(&settings, tickers)?;
            let app = AppContext::initialize(config, common.data_dir)?;
            screen::run(&app, &codes, common.json)?;
        }
        Commands::Detail {
            ticker,
            reference,
            anomaly_threshold,
            common,
        } => {
            let mut config = build_config(&settings, &common, HorizonSet::Short)?;
            if let Some(reference) = reference {
                config.reference_symbol = reference;
            }
            if let Some(threshold) = anomaly_threshold {
                config.anomaly_threshold = threshold;
            }
            let app = AppContext::initialize(config, common.data_dir)?;
            detail::run(&app, ticker.trim(), common.json)?;
        }
        Commands::Rank { tickers, common } => {
            let config = build_config(&settings, &common, HorizonSet::Quarterly)?;
            let codes = resolve_tickers(&settings, tickers)?;
            let app = AppContext::initialize(config, common.data_dir)?;
            rank::run(&app, &codes, common.json)?;
        }
    }

    Ok(())
}

/// Environment settings first, then CLI overrides. `default_horizons`
/// applies only when neither source names a horizon set.
fn build_config(
    settings: &HashMap<String, String>,
    common: &CommonArgs,
    default_horizons: HorizonSet,
) -> Result<ScreeningConfig> {
    let mut config =
        ScreeningConfig::from_settings_map(settings).context("invalid RISEPROB_ settings")?;
    match common.horizons.as_deref() {
        Some(raw) => config.horizons = HorizonSet::parse(raw)?.horizons(),
        None if !settings.contains_key("HORIZONS") => {
            config.horizons = default_horizons.horizons();
        }
        None => {}
    }
    if let Some(raw) = common.lookback.as_deref() {
        config.lookback = LookbackPeriod::parse(raw)?;
    }
    if let Some(threshold) = common.threshold {
        config.promotion_threshold = threshold;
    }
    Ok(config)
}

fn resolve_tickers(settings: &HashMap<String, String>, cli_value: Option<String>) -> Result<Vec<String>> {
    let raw = cli_value
        .or_else(|| settings.get("TICKERS").cloned())
        .unwrap_or_else(|| DEFAULT_WATCHLIST.to_string());
    Ok(parse_ticker_list(&raw)?)
}
