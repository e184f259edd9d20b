//! Historical big-move detection.
//!
//! The co-movement classification is a heuristic: it only compares signs and
//! a fixed magnitude floor on the reference series. No significance testing is
//! performed, so "co-movement plausible" is a hint for the reader, not a
//! statistical finding.

use crate::models::{AnomalyClassification, AnomalyEvent, CanonicalSeries};
use chrono::NaiveDate;
use std::collections::HashMap;

pub const DEFAULT_ANOMALY_THRESHOLD_PCT: f64 = 5.0;
/// Minimum absolute reference move for a co-movement classification.
pub const REFERENCE_MOVE_FLOOR_PCT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
struct JoinedPoint {
    date: NaiveDate,
    target: f64,
    reference: f64,
}

/// Inner join on date; dates missing from either series are dropped.
fn inner_join(target: &CanonicalSeries, reference: &CanonicalSeries) -> Vec<JoinedPoint> {
    let reference_by_date: HashMap<NaiveDate, f64> = reference
        .points()
        .iter()
        .map(|point| (point.date, point.value))
        .collect();

    target
        .points()
        .iter()
        .filter_map(|point| {
            reference_by_date.get(&point.date).map(|reference| JoinedPoint {
                date: point.date,
                target: point.value,
                reference: *reference,
            })
        })
        .collect()
}

fn pct_change(previous: f64, current: f64) -> Option<f64> {
    if previous == 0.0 {
        return None;
    }
    let change = (current - previous) / previous * 100.0;
    change.is_finite().then_some(change)
}

pub fn classify(target_pct: f64, reference_pct: f64) -> AnomalyClassification {
    let same_direction = target_pct.signum() == reference_pct.signum();
    if same_direction && reference_pct.abs() > REFERENCE_MOVE_FLOOR_PCT {
        AnomalyClassification::CoMovement
    } else {
        AnomalyClassification::Idiosyncratic
    }
}

/// Days on which the target moved by at least `threshold_pct` percent,
/// newest first.
///
/// Percentage changes are taken between consecutive rows of the joined
/// sequence, so both legs of a change always cover the same two dates.
pub fn detect_anomalies(
    target: &CanonicalSeries,
    reference: &CanonicalSeries,
    threshold_pct: f64,
) -> Vec<AnomalyEvent> {
    let joined = inner_join(target, reference);

    let mut events: Vec<AnomalyEvent> = joined
        .windows(2)
        .filter_map(|pair| {
            let (previous, current) = (pair[0], pair[1]);
            let target_pct = pct_change(previous.target, current.target)?;
            if target_pct.abs() < threshold_pct {
                return None;
            }
            let reference_pct = pct_change(previous.reference, current.reference).unwrap_or(0.0);
            Some(AnomalyEvent {
                date: current.date,
                pct_change: target_pct,
                reference_pct_change: reference_pct,
                classification: classify(target_pct, reference_pct),
            })
        })
        .collect();

    events.sort_by(|a, b| b.date.cmp(&a.date));
    events
}
