// Forecast report domain model: what one training run shows on the dashboard
use chrono::NaiveDate;
use serde::Serialize;

use super::chart::{ChartData, ChartKind, SeriesData, SeriesStyle, TimeSeriesPoint};
use super::forecast::{ForecastRow, ForecastTable};
use super::table::TablePreview;

const LINE_COLOR: &str = "#0072b2";
const BAND_COLOR: &str = "#9ecae1";
const OBSERVED_COLOR: &str = "#000000";

#[derive(Debug, Clone, Serialize)]
pub struct ForecastReport {
    pub title: String,
    pub head: TablePreview,
    pub forecast_chart: ChartData,
    pub component_charts: Vec<ChartData>,
}

impl ForecastReport {
    pub fn build(
        observations: &[(NaiveDate, f64)],
        table: &ForecastTable,
        periods: u32,
        head_rows: usize,
    ) -> Self {
        Self {
            title: format!("Forecast ({} days ahead)", periods),
            head: table.head(head_rows),
            forecast_chart: forecast_chart(observations, table),
            component_charts: component_charts(table),
        }
    }
}

fn forecast_chart(observations: &[(NaiveDate, f64)], table: &ForecastTable) -> ChartData {
    let column = |f: fn(&ForecastRow) -> f64| -> Vec<TimeSeriesPoint> {
        table
            .rows()
            .iter()
            .map(|r| TimeSeriesPoint::on_date(r.ds, f(r)))
            .collect()
    };

    let observed = observations
        .iter()
        .map(|(ds, y)| TimeSeriesPoint::on_date(*ds, *y))
        .collect();

    ChartData::new(
        "forecast",
        "Observed and forecast",
        None,
        ChartKind::MultiLine,
        vec![
            SeriesData::new(
                "yhat_lower",
                "Lower bound",
                Some(BAND_COLOR),
                SeriesStyle::Band,
                column(|r| r.yhat_lower),
            ),
            SeriesData::new(
                "yhat_upper",
                "Upper bound",
                Some(BAND_COLOR),
                SeriesStyle::Band,
                column(|r| r.yhat_upper),
            ),
            SeriesData::new(
                "yhat",
                "Forecast",
                Some(LINE_COLOR),
                SeriesStyle::Line,
                column(|r| r.yhat),
            ),
            SeriesData::new(
                "observed",
                "Observed",
                Some(OBSERVED_COLOR),
                SeriesStyle::Points,
                observed,
            ),
        ],
    )
}

/// One chart per component: the trend, then each seasonality in table order.
fn component_charts(table: &ForecastTable) -> Vec<ChartData> {
    let trend = table
        .rows()
        .iter()
        .map(|r| TimeSeriesPoint::on_date(r.ds, r.trend))
        .collect();
    let mut charts = vec![ChartData::new(
        "trend",
        "Trend",
        None,
        ChartKind::Line,
        vec![SeriesData::new("trend", "Trend", Some(LINE_COLOR), SeriesStyle::Line, trend)],
    )];

    for (idx, name) in table.component_names().iter().enumerate() {
        let points = table
            .rows()
            .iter()
            .filter_map(|r| r.components.get(idx).map(|v| TimeSeriesPoint::on_date(r.ds, *v)))
            .collect();
        charts.push(ChartData::new(
            name,
            &title_case(name),
            None,
            ChartKind::Line,
            vec![SeriesData::new(name, name, Some(LINE_COLOR), SeriesStyle::Line, points)],
        ));
    }
    charts
}

fn title_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
