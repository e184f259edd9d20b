use crate::numeric::coerce_or_zero;
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

fn group_thousands(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return "-".to_string();
    }
    let formatted = format!("{:.*}", decimals, value.abs());
    let (integer, fraction) = match formatted.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (formatted.as_str(), None),
    };
    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3 + decimals + 2);
    if value < 0.0 && formatted.chars().any(|c| c.is_ascii_digit() && c != '0') {
        grouped.push('-');
    }
    for (index, digit) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if let Some(fraction) = fraction {
        grouped.push('.');
        grouped.push_str(fraction);
    }
    grouped
}

/// Price with thousands separators and two decimals (`1,234,567.89`).
pub fn format_price(value: f64) -> String {
    group_thousands(value, 2)
}

/// Whole-unit price with thousands separators (`1,234,568`), as the screen
/// table shows it.
pub fn format_whole_price(value: f64) -> String {
    group_thousands(value, 0)
}

pub fn format_probability(value: f64) -> String {
    format!("{:.1}%", value)
}

pub fn format_percent_change(value: f64) -> String {
    format!("{:+.2}%", value)
}

pub fn format_ratio(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v))
}

/// Raw provider cell for display. Malformed cells show as 0.
pub fn format_cell(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        _ => format_price(coerce_or_zero(value)),
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{}", text);
    Ok(())
}
