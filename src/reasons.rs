use crate::models::{date_weekday_name, ForecastRow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

const STRONG_MOVE_PCT: f64 = 5.0;
const WEEKDAY_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagDetail {
    Short,
    Long,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tag", content = "weekday", rename_all = "snake_case")]
pub enum ReasonTag {
    StrongUptrend,
    MildUptrend,
    Downtrend,
    RangeBound,
    SeasonalTailwind,
    SeasonalHeadwind,
    WeekdayTailwind(String),
}

impl fmt::Display for ReasonTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReasonTag::StrongUptrend => write!(f, "strong uptrend"),
            ReasonTag::MildUptrend => write!(f, "mild uptrend"),
            ReasonTag::Downtrend => write!(f, "downtrend/correction"),
            ReasonTag::RangeBound => write!(f, "range-bound"),
            ReasonTag::SeasonalTailwind => write!(f, "seasonal tailwind"),
            ReasonTag::SeasonalHeadwind => write!(f, "seasonal headwind"),
            ReasonTag::WeekdayTailwind(day) => write!(f, "day-of-week tailwind ({})", day),
        }
    }
}

pub fn percent_change(current: f64, predicted: f64) -> Option<f64> {
    if current == 0.0 || !current.is_finite() || !predicted.is_finite() {
        return None;
    }
    Some((predicted - current) / current * 100.0)
}

fn trend_tag(current: f64, predicted: f64) -> ReasonTag {
    match percent_change(current, predicted) {
        Some(d) if d > STRONG_MOVE_PCT => ReasonTag::StrongUptrend,
        Some(d) if d > 0.0 => ReasonTag::MildUptrend,
        Some(d) if d < -STRONG_MOVE_PCT => ReasonTag::Downtrend,
        _ => ReasonTag::RangeBound,
    }
}

fn seasonal_tag(yearly: Option<f64>) -> Option<ReasonTag> {
    match yearly {
        Some(effect) if effect > 0.0 => Some(ReasonTag::SeasonalTailwind),
        Some(effect) if effect < 0.0 => Some(ReasonTag::SeasonalHeadwind),
        _ => None,
    }
}

fn weekday_tag(row: &ForecastRow, anchor: NaiveDate) -> Option<ReasonTag> {
    let days_ahead = (row.date - anchor).num_days();
    if !(0..=WEEKDAY_WINDOW_DAYS).contains(&days_ahead) {
        return None;
    }
    match row.weekly {
        Some(effect) if effect > 0.0 => Some(ReasonTag::WeekdayTailwind(
            date_weekday_name(row.date).to_string(),
        )),
        _ => None,
    }
}

/// Explains a forecast row. Tags come out in display order: trend, then
/// seasonal, then (long form only) weekday.
pub fn reason_tags(
    row: &ForecastRow,
    current: f64,
    predicted: f64,
    detail: TagDetail,
    anchor: NaiveDate,
) -> Vec<ReasonTag> {
    let mut tags = vec![trend_tag(current, predicted)];
    tags.extend(seasonal_tag(row.yearly));
    if detail == TagDetail::Long {
        tags.extend(weekday_tag(row, anchor));
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap() // Monday
    }

    fn row(days_ahead: i64, yearly: Option<f64>, weekly: Option<f64>) -> ForecastRow {
        ForecastRow {
            date: anchor() + chrono::Duration::days(days_ahead),
            yhat: 0.0,
            yhat_lower: 0.0,
            yhat_upper: 0.0,
            trend: 0.0,
            yearly,
            weekly,
        }
    }

    #[test]
    fn trend_thresholds() {
        let r = row(90, None, None);
        let first = |predicted| reason_tags(&r, 100.0, predicted, TagDetail::Short, anchor())[0].clone();
        assert_eq!(first(106.0), ReasonTag::StrongUptrend);
        assert_eq!(first(105.0), ReasonTag::MildUptrend);
        assert_eq!(first(100.5), ReasonTag::MildUptrend);
        assert_eq!(first(100.0), ReasonTag::RangeBound);
        assert_eq!(first(95.0), ReasonTag::RangeBound);
        assert_eq!(first(94.0), ReasonTag::Downtrend);
    }

    #[test]
    fn zero_current_is_range_bound() {
        let tags = reason_tags(&row(10, None, None), 0.0, 10.0, TagDetail::Short, anchor());
        assert_eq!(tags, vec![ReasonTag::RangeBound]);
    }

    #[test]
    fn seasonal_sign_and_absence() {
        let tail = reason_tags(&row(90, Some(1.5), None), 100.0, 103.0, TagDetail::Short, anchor());
        assert_eq!(tail, vec![ReasonTag::MildUptrend, ReasonTag::SeasonalTailwind]);

        let head = reason_tags(&row(90, Some(-0.2), None), 100.0, 90.0, TagDetail::Short, anchor());
        assert_eq!(head, vec![ReasonTag::Downtrend, ReasonTag::SeasonalHeadwind]);

        let flat = reason_tags(&row(90, Some(0.0), None), 100.0, 100.0, TagDetail::Short, anchor());
        assert_eq!(flat, vec![ReasonTag::RangeBound]);
    }

    #[test]
    fn weekday_tag_only_in_long_form_near_anchor() {
        let near = row(7, Some(1.0), Some(0.4));
        let long = reason_tags(&near, 100.0, 110.0, TagDetail::Long, anchor());
        assert_eq!(
            long,
            vec![
                ReasonTag::StrongUptrend,
                ReasonTag::SeasonalTailwind,
                ReasonTag::WeekdayTailwind("Monday".to_string()),
            ]
        );
        assert_eq!(long[2].to_string(), "day-of-week tailwind (Monday)");

        let short = reason_tags(&near, 100.0, 110.0, TagDetail::Short, anchor());
        assert_eq!(short.len(), 2);

        let edge = row(30, None, Some(0.4));
        assert_eq!(
            reason_tags(&edge, 100.0, 110.0, TagDetail::Long, anchor()),
            vec![
                ReasonTag::StrongUptrend,
                ReasonTag::WeekdayTailwind("Wednesday".to_string()),
            ]
        );

        let far = row(31, None, Some(0.4));
        assert_eq!(reason_tags(&far, 100.0, 110.0, TagDetail::Long, anchor()).len(), 1);

        let negative = row(3, None, Some(-0.4));
        assert_eq!(reason_tags(&negative, 100.0, 110.0, TagDetail::Long, anchor()).len(), 1);
    }
}
