use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Column label of a raw market-data table. Providers that group columns by
/// field and symbol produce multi-level labels such as `["Close", "7203.T"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLabel {
    levels: Vec<String>,
}

impl ColumnLabel {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            levels: vec![name.into()],
        }
    }

    pub fn multi<I, S>(levels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            levels: levels.into_iter().map(Into::into).collect(),
        }
    }

    /// Outer level of the label; the only level the resolver looks at.
    pub fn outer(&self) -> &str {
        self.levels.first().map(String::as_str).unwrap_or("")
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn is_multi_level(&self) -> bool {
        self.levels.len() > 1
    }
}

impl Serialize for ColumnLabel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if self.is_multi_level() {
            self.levels.serialize(serializer)
        } else {
            self.outer().serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for ColumnLabel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawLabel {
            Single(String),
            Multi(Vec<String>),
        }

        Ok(match RawLabel::deserialize(deserializer)? {
            RawLabel::Single(name) => ColumnLabel::new(name),
            RawLabel::Multi(levels) => ColumnLabel::multi(levels),
        })
    }
}

impl fmt::Display for ColumnLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.levels.join("/"))
    }
}

/// Untyped market-data result as returned by a provider: loosely named
/// columns and cells that may be numbers, strings or nulls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTable {
    pub columns: Vec<ColumnLabel>,
    pub rows: Vec<Vec<Value>>,
}

impl RawTable {
    pub fn new(columns: Vec<ColumnLabel>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Collapsed (outer level) column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(ColumnLabel::outer).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Date-sorted, deduplicated `(date, value)` sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSeries {
    points: Vec<SeriesPoint>,
}

impl CanonicalSeries {
    /// Sorts by date and keeps the last value seen for a repeated date.
    pub fn from_points(mut points: Vec<SeriesPoint>) -> Self {
        points.sort_by(|a, b| a.date.cmp(&b.date));
        let mut deduped: Vec<SeriesPoint> = Vec::with_capacity(points.len());
        for point in points {
            match deduped.last_mut() {
                Some(last) if last.date == point.date => *last = point,
                _ => deduped.push(point),
            }
        }
        Self { points: deduped }
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        Self::from_points(
            pairs
                .into_iter()
                .map(|(date, value)| SeriesPoint { date, value })
                .collect(),
        )
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&SeriesPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&SeriesPoint> {
        self.points.last()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.points.iter().map(|p| p.date)
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.value)
    }

    pub fn distinct_value_count(&self) -> usize {
        let mut values: Vec<f64> = self.values().collect();
        values.sort_by(|a, b| a.total_cmp(b));
        values.dedup();
        values.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhlcBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Canonical OHLC table, sorted by date with unique dates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OhlcTable {
    bars: Vec<OhlcBar>,
}

impl OhlcTable {
    pub fn from_bars(mut bars: Vec<OhlcBar>) -> Self {
        bars.sort_by(|a, b| a.date.cmp(&b.date));
        let mut deduped: Vec<OhlcBar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.date == bar.date => *last = bar,
                _ => deduped.push(bar),
            }
        }
        Self { bars: deduped }
    }

    pub fn bars(&self) -> &[OhlcBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

/// One dated model output: point estimate, symmetric band and components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub date: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
    pub trend: f64,
    pub yearly: Option<f64>,
    pub weekly: Option<f64>,
}

impl ForecastRow {
    pub fn band_is_ordered(&self) -> bool {
        self.yhat_lower <= self.yhat && self.yhat <= self.yhat_upper
    }
}

/// Named forward offset in calendar days from the last observed date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Horizon {
    pub label: String,
    pub days: i64,
}

impl Horizon {
    pub fn new<S: Into<String>>(label: S, days: i64) -> Self {
        Self {
            label: label.into(),
            days,
        }
    }

    pub fn target_date(&self, anchor: NaiveDate) -> NaiveDate {
        anchor + chrono::Duration::days(self.days)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbabilityResult {
    pub horizon_label: String,
    pub target_date: NaiveDate,
    pub predicted_value: f64,
    pub rise_probability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyClassification {
    /// Same direction as the reference series, which also moved noticeably.
    CoMovement,
    /// Security-specific move.
    Idiosyncratic,
}

impl AnomalyClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyClassification::CoMovement => "co-movement with reference plausible",
            AnomalyClassification::Idiosyncratic => "idiosyncratic / security-specific",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyEvent {
    pub date: NaiveDate,
    pub pct_change: f64,
    pub reference_pct_change: f64,
    pub classification: AnomalyClassification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreeningRecord {
    pub ticker: String,
    pub display_name: String,
    pub current_price: f64,
    pub last_date: NaiveDate,
    pub probabilities: Vec<ProbabilityResult>,
    pub promoted: bool,
}

impl ScreeningRecord {
    pub fn probability_for(&self, horizon_label: &str) -> Option<&ProbabilityResult> {
        self.probabilities
            .iter()
            .find(|result| result.horizon_label == horizon_label)
    }
}

/// Ticker that the screening loop dropped, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedTicker {
    pub ticker: String,
    pub kind: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreeningOutcome {
    pub records: Vec<ScreeningRecord>,
    pub skipped: Vec<SkippedTicker>,
}

impl ScreeningOutcome {
    pub fn promoted(&self) -> impl Iterator<Item = &ScreeningRecord> {
        self.records.iter().filter(|record| record.promoted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    TopPick,
    Buy,
    Watch,
    Overextended,
}

impl Recommendation {
    /// Display ordering key; lower ranks are listed first.
    pub fn rank(&self) -> u8 {
        match self {
            Recommendation::TopPick => 1,
            Recommendation::Buy => 2,
            Recommendation::Watch => 3,
            Recommendation::Overextended => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::TopPick => "top pick",
            Recommendation::Buy => "buy",
            Recommendation::Watch => "watch",
            Recommendation::Overextended => "overextended",
        }
    }
}

/// Valuation ratios; any of them may be unknown for a given instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fundamentals {
    pub earnings_multiple: Option<f64>,
    pub book_multiple: Option<f64>,
    pub yield_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    pub ticker: String,
    pub position_in_range_pct: f64,
    pub fundamentals: Fundamentals,
    pub recommendation: Recommendation,
    pub rank: u8,
}

/// Profile data for an instrument as reported by the market-data provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentProfile {
    pub display_name: Option<String>,
    #[serde(default)]
    pub fundamentals: Fundamentals,
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

pub fn date_weekday_name(date: NaiveDate) -> &'static str {
    weekday_name(date.weekday())
}
