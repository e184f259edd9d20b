//! Raw market-data tables to canonical series.
//!
//! Providers disagree on column naming (`Date`, `Datetime`, `Adj Close`,
//! `("Close", "7203.T")`...). Columns are resolved by case-insensitive
//! substring match on the collapsed outer label; when nothing matches, the
//! resolver falls back to a fixed position and reports that it did so.

use crate::error::{ConversionError, SchemaResolutionError};
use crate::models::{CanonicalSeries, OhlcBar, OhlcTable, RawTable, SeriesPoint};
use crate::numeric::{to_decimal, to_naive_date};
use log::{debug, warn};

const DATE_POSITION: usize = 0;
const CLOSE_POSITION: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
}

impl PriceField {
    pub fn key(self) -> &'static str {
        match self {
            PriceField::Open => "open",
            PriceField::High => "high",
            PriceField::Low => "low",
            PriceField::Close => "close",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnMatch {
    Named(usize),
    Positional(usize),
}

impl ColumnMatch {
    pub fn index(self) -> usize {
        match self {
            ColumnMatch::Named(index) | ColumnMatch::Positional(index) => index,
        }
    }

    pub fn is_positional(self) -> bool {
        matches!(self, ColumnMatch::Positional(_))
    }
}

/// Column indices resolved for one raw table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSchema {
    pub date: ColumnMatch,
    pub close: ColumnMatch,
    pub open: Option<usize>,
    pub high: Option<usize>,
    pub low: Option<usize>,
}

impl ResolvedSchema {
    pub fn column_for(&self, field: PriceField) -> Option<usize> {
        match field {
            PriceField::Close => Some(self.close.index()),
            PriceField::Open => self.open,
            PriceField::High => self.high,
            PriceField::Low => self.low,
        }
    }
}

fn find_column(names: &[String], key: &str) -> Option<usize> {
    names.iter().position(|name| name.contains(key))
}

fn resolve_required(
    names: &[String],
    field: &'static str,
    position: usize,
) -> Result<ColumnMatch, SchemaResolutionError> {
    if let Some(index) = find_column(names, field) {
        return Ok(ColumnMatch::Named(index));
    }
    if position < names.len() {
        warn!(
            "No column name contains '{}' (columns: {:?}); falling back to column {}",
            field, names, position
        );
        return Ok(ColumnMatch::Positional(position));
    }
    Err(SchemaResolutionError::MissingColumn {
        field,
        position,
        columns: names.len(),
    })
}

/// Resolves the date and price columns of a raw table.
pub fn resolve_schema(table: &RawTable) -> Result<ResolvedSchema, SchemaResolutionError> {
    if table.columns.is_empty() {
        return Err(SchemaResolutionError::NoColumns);
    }
    let names: Vec<String> = table
        .column_names()
        .into_iter()
        .map(|name| name.to_lowercase())
        .collect();

    let date = resolve_required(&names, "date", DATE_POSITION)?;
    let close = resolve_required(&names, "close", CLOSE_POSITION)?;

    Ok(ResolvedSchema {
        date,
        close,
        open: find_column(&names, PriceField::Open.key()),
        high: find_column(&names, PriceField::High.key()),
        low: find_column(&names, PriceField::Low.key()),
    })
}

/// Extracts one price field as a canonical series.
///
/// Rows whose date or value cannot be converted are dropped. The result may be
/// empty; callers decide whether that is `DataUnavailable` or
/// `InsufficientSamples`.
pub fn extract_series(
    table: &RawTable,
    schema: &ResolvedSchema,
    field: PriceField,
) -> CanonicalSeries {
    let Some(value_column) = schema.column_for(field) else {
        warn!("Table has no '{}' column; returning empty series", field.key());
        return CanonicalSeries::default();
    };
    let date_column = schema.date.index();

    let mut points = Vec::with_capacity(table.len());
    let mut dropped = 0usize;
    for (row_index, row) in table.rows.iter().enumerate() {
        match parse_point(row.get(date_column), row.get(value_column)) {
            Ok(point) => points.push(point),
            Err(err) => {
                debug!("Dropping row {} ({}): {}", row_index, field.key(), err);
                dropped += 1;
            }
        }
    }
    if dropped > 0 {
        warn!(
            "Dropped {} of {} row(s) with unusable date or {} cells",
            dropped,
            table.len(),
            field.key()
        );
    }

    CanonicalSeries::from_points(points)
}

fn parse_point(
    date_cell: Option<&serde_json::Value>,
    value_cell: Option<&serde_json::Value>,
) -> Result<SeriesPoint, ConversionError> {
    let date = to_naive_date(date_cell.ok_or(ConversionError::Empty)?)?;
    let value = to_decimal(value_cell.ok_or(ConversionError::Empty)?)?;
    Ok(SeriesPoint { date, value })
}

/// Close-price series for a raw table; empty when the table is unusable.
pub fn normalize_close(table: &RawTable) -> CanonicalSeries {
    if table.is_empty() {
        return CanonicalSeries::default();
    }
    match resolve_schema(table) {
        Ok(schema) => extract_series(table, &schema, PriceField::Close),
        Err(err) => {
            warn!("Could not resolve table schema: {}", err);
            CanonicalSeries::default()
        }
    }
}

/// Canonical OHLC table. Missing open/high/low columns are filled from the
/// close so the bars stay internally consistent; rows with any unusable cell
/// are dropped.
pub fn normalize_ohlc(table: &RawTable) -> OhlcTable {
    if table.is_empty() {
        return OhlcTable::default();
    }
    let schema = match resolve_schema(table) {
        Ok(schema) => schema,
        Err(err) => {
            warn!("Could not resolve table schema: {}", err);
            return OhlcTable::default();
        }
    };

    let mut bars = Vec::with_capacity(table.len());
    let mut dropped = 0usize;

    for row in &table.rows {
        match parse_bar(row, &schema) {
            Ok(bar) => bars.push(bar),
            Err(_) => dropped += 1,
        }
    }
    if dropped > 0 {
        warn!("Dropped {} of {} OHLC row(s)", dropped, table.len());
    }

    OhlcTable::from_bars(bars)
}

fn parse_bar(row: &[serde_json::Value], schema: &ResolvedSchema) -> Result<OhlcBar, ConversionError> {
    let point = parse_point(row.get(schema.date.index()), row.get(schema.close.index()))?;
    let field_or_close = |column: Option<usize>| -> Result<f64, ConversionError> {
        match column {
            Some(index) => to_decimal(row.get(index).ok_or(ConversionError::Empty)?),
            None => Ok(point.value),
        }
    };
    Ok(OhlcBar {
        date: point.date,
        open: field_or_close(schema.open)?,
        high: field_or_close(schema.high)?,
        low: field_or_close(schema.low)?,
        close: point.value,
    })
}
