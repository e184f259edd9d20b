use thiserror::Error;

/// A raw cell that could not be turned into a number or a date.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConversionError {
    #[error("cell is empty")]
    Empty,
    #[error("cell '{0}' is not numeric")]
    NotNumeric(String),
    #[error("value {0} is not finite")]
    NonFinite(f64),
    #[error("cell '{0}' is not a recognizable date")]
    NotADate(String),
}

/// Raised when a raw table cannot be mapped to canonical columns, not even
/// through the positional fallback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaResolutionError {
    #[error("table has no columns")]
    NoColumns,
    #[error("no '{field}' column matched and positional fallback {position} is out of range ({columns} column(s))")]
    MissingColumn {
        field: &'static str,
        position: usize,
        columns: usize,
    },
}

/// Failure taxonomy of the forecast pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no market data for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("{symbol} has {found} usable sample(s), need more than {required}")]
    InsufficientSamples {
        symbol: String,
        found: usize,
        required: usize,
    },

    #[error("forecast unavailable: {reason}")]
    ForecastUnavailable { reason: String },

    #[error(transparent)]
    SchemaResolution(#[from] SchemaResolutionError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl PipelineError {
    pub fn data_unavailable(symbol: &str, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }

    pub fn forecast_unavailable(reason: impl Into<String>) -> Self {
        Self::ForecastUnavailable {
            reason: reason.into(),
        }
    }

    /// Errors the screening loop recovers from by skipping the ticker.
    pub fn is_skippable(&self) -> bool {
        !matches!(self, PipelineError::Configuration(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::DataUnavailable { .. } => "data_unavailable",
            PipelineError::InsufficientSamples { .. } => "insufficient_samples",
            PipelineError::ForecastUnavailable { .. } => "forecast_unavailable",
            PipelineError::SchemaResolution(_) => "schema_resolution",
            PipelineError::Conversion(_) => "conversion",
            PipelineError::Configuration(_) => "configuration",
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
