// Chart data domain models
use chrono::{Datelike, NaiveDate};
use serde::Serialize;

const MILLIS_PER_DAY: i64 = 86_400_000;
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesPoint {
    pub time_ms: i64,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(time_ms: i64, value: f64) -> Self {
        Self { time_ms, value }
    }

    /// Point at midnight UTC of `date`.
    pub fn on_date(date: NaiveDate, value: f64) -> Self {
        let days = i64::from(date.num_days_from_ce()) - UNIX_EPOCH_DAYS_FROM_CE;
        Self::new(days * MILLIS_PER_DAY, value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SeriesStyle {
    Line,
    Points,
    /// Edge of a shaded uncertainty band.
    Band,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesData {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub style: SeriesStyle,
    pub points: Vec<TimeSeriesPoint>,
}

impl SeriesData {
    pub fn new(
        id: &str,
        name: &str,
        color: Option<&str>,
        style: SeriesStyle,
        points: Vec<TimeSeriesPoint>,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            color: color.map(str::to_string),
            style,
            points,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChartKind {
    Line,
    MultiLine,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub id: String,
    pub title: String,
    pub unit: Option<String>,
    pub kind: ChartKind,
    pub series: Vec<SeriesData>,
}

impl ChartData {
    pub fn new(
        id: &str,
        title: &str,
        unit: Option<&str>,
        kind: ChartKind,
        series: Vec<SeriesData>,
    ) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            unit: unit.map(str::to_string),
            kind,
            series,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_on_date_is_utc_midnight() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(TimeSeriesPoint::on_date(epoch, 1.0).time_ms, 0);

        let date = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap();
        assert_eq!(TimeSeriesPoint::on_date(date, 1.0).time_ms, 1_673_740_800_000);
    }

    #[test]
    fn test_style_serializes_camel_case() {
        assert_eq!(serde_json::to_string(&SeriesStyle::Band).unwrap(), "\"band\"");
        assert_eq!(serde_json::to_string(&ChartKind::MultiLine).unwrap(), "\"multiLine\"");
    }
}
