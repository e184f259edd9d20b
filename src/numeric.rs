use crate::error::ConversionError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::debug;
use serde_json::Value;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];
const OFFSET_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%z", "%Y-%m-%d %H:%M:%S%:z"];

/// Converts a raw cell to a finite number.
///
/// Accepts JSON numbers, numeric strings (thousands separators and a trailing
/// `%` are tolerated), booleans, and single-element arrays wrapping any of
/// those. Everything else is a `ConversionError`.
pub fn to_decimal(value: &Value) -> Result<f64, ConversionError> {
    match value {
        Value::Null => Err(ConversionError::Empty),
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| ConversionError::NotNumeric(number.to_string()))
            .and_then(require_finite),
        Value::String(text) => parse_numeric_text(text),
        Value::Bool(flag) => Ok(if *flag { 1.0 } else { 0.0 }),
        Value::Array(items) => match items.as_slice() {
            [] => Err(ConversionError::Empty),
            [single, ..] => to_decimal(single),
        },
        Value::Object(_) => Err(ConversionError::NotNumeric(value.to_string())),
    }
}

/// Display-boundary conversion: malformed cells become 0.0.
///
/// This trades precision for robustness. A zero here is indistinguishable from
/// a real zero price, so it must never feed back into the core numeric path.
pub fn coerce_or_zero(value: &Value) -> f64 {
    match to_decimal(value) {
        Ok(parsed) => parsed,
        Err(err) => {
            debug!("Coercing malformed cell to 0.0: {}", err);
            0.0
        }
    }
}

fn require_finite(value: f64) -> Result<f64, ConversionError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConversionError::NonFinite(value))
    }
}

fn parse_numeric_text(text: &str) -> Result<f64, ConversionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ConversionError::Empty);
    }
    let cleaned: String = trimmed
        .trim_end_matches('%')
        .chars()
        .filter(|c| *c != ',' && *c != '_')
        .collect();
    let parsed = cleaned
        .parse::<f64>()
        .map_err(|_| ConversionError::NotNumeric(trimmed.to_string()))?;
    require_finite(parsed)
}

/// Converts a raw cell to a timezone-naive calendar date.
///
/// Offsets are stripped by keeping the wall-clock date in the value's own
/// offset, so `2024-01-04T00:00:00+09:00` becomes 2024-01-04. Numbers are read
/// as epoch seconds (UTC), or epoch milliseconds when too large for seconds.
pub fn to_naive_date(value: &Value) -> Result<NaiveDate, ConversionError> {
    match value {
        Value::String(text) => parse_date_text(text),
        Value::Number(number) => {
            let raw = number
                .as_f64()
                .ok_or_else(|| ConversionError::NotADate(number.to_string()))?;
            epoch_to_date(raw).ok_or_else(|| ConversionError::NotADate(number.to_string()))
        }
        Value::Array(items) => match items.as_slice() {
            [] => Err(ConversionError::Empty),
            [single, ..] => to_naive_date(single),
        },
        Value::Null => Err(ConversionError::Empty),
        other => Err(ConversionError::NotADate(other.to_string())),
    }
}

fn parse_date_text(text: &str) -> Result<NaiveDate, ConversionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ConversionError::Empty);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.naive_local().date());
    }
    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(trimmed, format) {
            return Ok(parsed.naive_local().date());
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(parsed.date());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(parsed);
        }
    }

    Err(ConversionError::NotADate(trimmed.to_string()))
}

fn epoch_to_date(raw: f64) -> Option<NaiveDate> {
    if !raw.is_finite() {
        return None;
    }
    // Anything past year ~5138 in seconds is treated as milliseconds.
    let seconds = if raw.abs() > 1e11 { raw / 1000.0 } else { raw };
    DateTime::<Utc>::from_timestamp(seconds.trunc() as i64, 0).map(|dt| dt.date_naive())
}
