use crate::config::ScreeningConfig;
use crate::decomposition::DecompositionModel;
use crate::forecast::ForecastAdapter;
use crate::market_data::{JsonDirectoryProvider, MarketDataProvider, YahooClient};
use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

pub type SharedProvider = dyn MarketDataProvider + Send + Sync;

/// Validated configuration plus the market-data source for one CLI run.
pub struct AppContext {
    config: ScreeningConfig,
    provider: Box<SharedProvider>,
}

impl AppContext {
    /// Uses the fixture directory when given, Yahoo Finance otherwise.
    pub fn initialize(config: ScreeningConfig, data_dir: Option<PathBuf>) -> Result<Self> {
        config.validate()?;
        let provider: Box<SharedProvider> = match data_dir {
            Some(dir) => {
                info!("Reading market data fixtures from {}", dir.display());
                Box::new(JsonDirectoryProvider::new(dir))
            }
            None => Box::new(
                YahooClient::new().context("failed to initialise the Yahoo Finance client")?,
            ),
        };
        Ok(Self { config, provider })
    }

    pub fn with_provider(config: ScreeningConfig, provider: Box<SharedProvider>) -> Self {
        Self { config, provider }
    }

    pub fn config(&self) -> &ScreeningConfig {
        &self.config
    }

    pub fn provider(&self) -> &SharedProvider {
        self.provider.as_ref()
    }

    pub fn forecast_adapter(&self) -> ForecastAdapter<DecompositionModel> {
        ForecastAdapter::new(DecompositionModel::new(), self.config.forecast.clone())
    }
}
