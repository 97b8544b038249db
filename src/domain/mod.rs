// Domain layer - Tables, series, the forecasting model and chart data
pub mod chart;
pub mod forecast;
pub mod hyperparams;
pub mod model;
pub mod report;
pub mod series;
pub mod table;
