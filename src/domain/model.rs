// Forecasting model - Piecewise-linear trend with Fourier seasonalities
use std::f64::consts::PI;

use chrono::{Datelike, NaiveDate};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use thiserror::Error;

use super::forecast::{ForecastRow, ForecastTable, make_future_dates};
use super::hyperparams::{Hyperparameters, SeasonalityMode};
use super::series::CanonicalSeries;

const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Observation noise, in scaled units, that the priors are expressed against.
const REFERENCE_NOISE: f64 = 0.05;
/// Prior scale of the base growth rate and offset.
const BASE_PRIOR_SCALE: f64 = 5.0;

const YEARLY_PERIOD_DAYS: f64 = 365.25;
const YEARLY_FOURIER_ORDER: usize = 10;
const MIN_YEARLY_SPAN_DAYS: i64 = 730;
const WEEKLY_PERIOD_DAYS: f64 = 7.0;
const WEEKLY_FOURIER_ORDER: usize = 3;
const MIN_WEEKLY_SPAN_DAYS: i64 = 14;

/// Trend values this close to zero carry no information about relative seasonality.
const MIN_RELATIVE_TREND: f64 = 1e-8;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("row {index}: timestamp '{value}' is not a valid YYYY-MM-DD date")]
    InvalidTimestamp { index: usize, value: String },

    #[error("cannot fit model: {0}")]
    Degenerate(String),

    #[error("forecast horizon runs past the supported calendar range")]
    DateOverflow,

    #[error("training was interrupted: {0}")]
    Interrupted(String),
}

/// Model settings that are not exposed as dashboard controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub n_changepoints: usize,
    /// Fraction of the history in which changepoints may be placed.
    pub changepoint_range: f64,
    pub seasonality_prior_scale: f64,
    /// Coverage of the `yhat_lower..yhat_upper` band.
    pub interval_width: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            n_changepoints: 25,
            changepoint_range: 0.8,
            seasonality_prior_scale: 10.0,
            interval_width: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seasonality {
    pub name: String,
    pub period: f64,
    pub order: usize,
}

impl Seasonality {
    fn yearly() -> Self {
        Self {
            name: "yearly".to_string(),
            period: YEARLY_PERIOD_DAYS,
            order: YEARLY_FOURIER_ORDER,
        }
    }

    fn weekly() -> Self {
        Self {
            name: "weekly".to_string(),
            period: WEEKLY_PERIOD_DAYS,
            order: WEEKLY_FOURIER_ORDER,
        }
    }

    fn width(&self) -> usize {
        2 * self.order
    }

    fn push_features(&self, day: f64, out: &mut Vec<f64>) {
        for i in 1..=self.order {
            let x = 2.0 * PI * i as f64 * day / self.period;
            out.push(x.sin());
            out.push(x.cos());
        }
    }
}

/// The trend is `k·t + m + Σ δⱼ·max(0, t − sⱼ)` over time scaled to `[0, 1]`,
/// with candidate changepoints `sⱼ` spread uniformly over the first part of
/// the history. Seasonalities are Fourier series on days since the Unix
/// epoch. Coefficients are the penalized least-squares solution: the rate
/// changes `δ` are shrunk with a strength inversely proportional to the
/// squared changepoint prior scale, so a small scale gives a stiff trend.
///
/// In multiplicative mode the trend is fitted first and the seasonal terms
/// are fitted on the relative deviation `y / trend − 1`.
///
/// Fitting is deterministic: the same series and hyperparameters always
/// yield the same coefficients and intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedModel {
    mode: SeasonalityMode,
    start: NaiveDate,
    t_scale: f64,
    y_scale: f64,
    /// Distinct history dates, ascending.
    history_dates: Vec<NaiveDate>,
    changepoints: Vec<f64>,
    k: f64,
    m: f64,
    deltas: Vec<f64>,
    seasonalities: Vec<Seasonality>,
    betas: Vec<f64>,
    sigma: f64,
    mean_abs_delta: f64,
    z: f64,
}

/// Parse the `ds` column of a canonical series into dated observations.
pub fn observations(series: &CanonicalSeries) -> Result<Vec<(NaiveDate, f64)>, TrainError> {
    series
        .points()
        .iter()
        .enumerate()
        .map(|(index, p)| {
            NaiveDate::parse_from_str(&p.ds, "%Y-%m-%d")
                .map(|ds| (ds, p.y))
                .map_err(|_| TrainError::InvalidTimestamp {
                    index,
                    value: p.ds.clone(),
                })
        })
        .collect()
}

impl FittedModel {
    pub fn fit(
        series: &CanonicalSeries,
        hyperparameters: &Hyperparameters,
        settings: &ModelSettings,
    ) -> Result<Self, TrainError> {
        let mut obs = observations(series)?;
        obs.sort_by_key(|(ds, _)| *ds);

        let (start, end) = match (obs.first(), obs.last()) {
            (Some(first), Some(last)) => (first.0, last.0),
            _ => return Err(TrainError::Degenerate("series is empty".to_string())),
        };
        let span_days = (end - start).num_days();
        if span_days < 1 {
            return Err(TrainError::Degenerate(
                "history must cover at least two distinct dates".to_string(),
            ));
        }

        let t_scale = span_days as f64;
        let max_abs = obs.iter().map(|(_, y)| y.abs()).fold(0.0, f64::max);
        let y_scale = if max_abs > 0.0 { max_abs } else { 1.0 };

        let t: Vec<f64> = obs
            .iter()
            .map(|(ds, _)| (*ds - start).num_days() as f64 / t_scale)
            .collect();
        let y: Vec<f64> = obs.iter().map(|(_, v)| v / y_scale).collect();

        let mut history_dates: Vec<NaiveDate> = obs.iter().map(|(ds, _)| *ds).collect();
        history_dates.dedup();

        let changepoints = place_changepoints(&t, settings);
        let seasonalities = select_seasonalities(&history_dates, span_days);

        let trend_x = trend_design(&t, &changepoints);
        let seasonal_x = seasonal_design(&obs, &seasonalities);

        let base_penalty = (REFERENCE_NOISE / BASE_PRIOR_SCALE).powi(2);
        let delta_penalty = (REFERENCE_NOISE / hyperparameters.changepoint_prior_scale).powi(2);
        let seasonal_penalty = (REFERENCE_NOISE / settings.seasonality_prior_scale).powi(2);

        let mut trend_penalty = vec![base_penalty, base_penalty];
        trend_penalty.extend(std::iter::repeat_n(delta_penalty, changepoints.len()));
        let seasonal_width = seasonal_x.ncols();

        let (trend_coef, betas) = match hyperparameters.seasonality_mode {
            SeasonalityMode::Additive => {
                let trend_width = trend_x.ncols();
                let x = DMatrix::from_fn(t.len(), trend_width + seasonal_width, |i, j| {
                    if j < trend_width {
                        trend_x[(i, j)]
                    } else {
                        seasonal_x[(i, j - trend_width)]
                    }
                });
                let mut penalty = trend_penalty;
                penalty.extend(std::iter::repeat_n(seasonal_penalty, seasonal_width));

                let coef = ridge_solve(&x, &DVector::from_column_slice(&y), &penalty)?;
                let trend_coef: Vec<f64> = coef.iter().take(trend_width).copied().collect();
                let betas: Vec<f64> = coef.iter().skip(trend_width).copied().collect();
                (trend_coef, betas)
            }
            SeasonalityMode::Multiplicative => {
                let coef = ridge_solve(&trend_x, &DVector::from_column_slice(&y), &trend_penalty)?;
                let trend_fit = &trend_x * &coef;
                let betas = fit_relative_seasonality(
                    &seasonal_x,
                    &trend_fit,
                    &y,
                    seasonal_penalty,
                )?;
                (coef.iter().copied().collect(), betas)
            }
        };

        let deltas: Vec<f64> = trend_coef.iter().skip(2).copied().collect();
        let mean_abs_delta = if deltas.is_empty() {
            0.0
        } else {
            deltas.iter().map(|d| d.abs()).sum::<f64>() / deltas.len() as f64
        };

        let normal = Normal::new(0.0, 1.0).map_err(|e| TrainError::Degenerate(e.to_string()))?;
        let z = normal.inverse_cdf(0.5 + settings.interval_width / 2.0);

        let mut model = Self {
            mode: hyperparameters.seasonality_mode,
            start,
            t_scale,
            y_scale,
            history_dates,
            changepoints,
            k: trend_coef[0],
            m: trend_coef[1],
            deltas,
            seasonalities,
            betas,
            sigma: 0.0,
            mean_abs_delta,
            z,
        };

        let sum_sq: f64 = obs
            .iter()
            .zip(&y)
            .map(|((ds, _), y)| {
                let (yhat, _, _) = model.point_estimate(*ds);
                (y - yhat).powi(2)
            })
            .sum();
        model.sigma = (sum_sq / obs.len() as f64).sqrt();
        if !model.sigma.is_finite() || !z.is_finite() {
            return Err(TrainError::Degenerate(
                "fit produced non-finite residuals".to_string(),
            ));
        }

        tracing::debug!(
            observations = obs.len(),
            changepoints = model.changepoints.len(),
            seasonalities = model.seasonalities.len(),
            sigma = model.sigma,
            "fitted forecasting model"
        );
        Ok(model)
    }

    pub fn history_end(&self) -> Option<NaiveDate> {
        self.history_dates.last().copied()
    }

    /// History dates followed by `periods` future days.
    pub fn forecast_dates(&self, periods: u32) -> Result<Vec<NaiveDate>, TrainError> {
        let last = self
            .history_end()
            .ok_or_else(|| TrainError::Degenerate("model has no history".to_string()))?;
        let mut dates = self.history_dates.clone();
        dates.extend(make_future_dates(last, periods)?);
        Ok(dates)
    }

    pub fn predict(&self, dates: &[NaiveDate]) -> ForecastTable {
        let names = self.seasonalities.iter().map(|s| s.name.clone()).collect();
        let rows = dates.iter().map(|ds| self.predict_row(*ds)).collect();
        ForecastTable::new(names, rows)
    }

    fn scaled_time(&self, ds: NaiveDate) -> f64 {
        (ds - self.start).num_days() as f64 / self.t_scale
    }

    fn trend_at(&self, t: f64) -> f64 {
        let bends: f64 = self
            .changepoints
            .iter()
            .zip(&self.deltas)
            .map(|(s, d)| d * (t - s).max(0.0))
            .sum();
        self.k * t + self.m + bends
    }

    /// Seasonal component values, in scaled units (additive) or relative (multiplicative).
    fn seasonal_terms(&self, ds: NaiveDate) -> Vec<f64> {
        let day = epoch_days(ds);
        let mut offset = 0;
        let mut terms = Vec::with_capacity(self.seasonalities.len());
        let mut features = Vec::new();
        for s in &self.seasonalities {
            features.clear();
            s.push_features(day, &mut features);
            let value = features
                .iter()
                .zip(self.betas.iter().skip(offset).take(s.width()))
                .map(|(f, b)| f * b)
                .sum();
            offset += s.width();
            terms.push(value);
        }
        terms
    }

    /// `(yhat, trend, seasonal terms)` in scaled units.
    fn point_estimate(&self, ds: NaiveDate) -> (f64, f64, Vec<f64>) {
        let trend = self.trend_at(self.scaled_time(ds));
        let terms = self.seasonal_terms(ds);
        let total: f64 = terms.iter().sum();
        let yhat = match self.mode {
            SeasonalityMode::Additive => trend + total,
            SeasonalityMode::Multiplicative => trend * (1.0 + total),
        };
        (yhat, trend, terms)
    }

    /// Spread of the trend past the end of the history, from rate changes
    /// arriving as often as in the history with the average fitted magnitude.
    fn trend_uncertainty(&self, t: f64) -> f64 {
        if t <= 1.0 || self.changepoints.is_empty() {
            return 0.0;
        }
        let rate = self.changepoints.len() as f64;
        let ahead = t - 1.0;
        (rate * 2.0 * self.mean_abs_delta.powi(2) * ahead.powi(3) / 3.0).sqrt()
    }

    fn predict_row(&self, ds: NaiveDate) -> ForecastRow {
        let (yhat, trend, terms) = self.point_estimate(ds);
        let total: f64 = terms.iter().sum();
        let trend_sd = self.trend_uncertainty(self.scaled_time(ds));

        let (band_sd, additive_terms, multiplicative_terms, components) = match self.mode {
            SeasonalityMode::Additive => (
                (self.sigma.powi(2) + trend_sd.powi(2)).sqrt(),
                total * self.y_scale,
                0.0,
                terms.iter().map(|v| v * self.y_scale).collect(),
            ),
            SeasonalityMode::Multiplicative => (
                (self.sigma.powi(2) + (trend_sd * (1.0 + total)).powi(2)).sqrt(),
                0.0,
                total,
                terms,
            ),
        };

        let half_band = self.z * band_sd;
        let half_trend = self.z * trend_sd;
        ForecastRow {
            ds,
            yhat: yhat * self.y_scale,
            yhat_lower: (yhat - half_band) * self.y_scale,
            yhat_upper: (yhat + half_band) * self.y_scale,
            trend: trend * self.y_scale,
            trend_lower: (trend - half_trend) * self.y_scale,
            trend_upper: (trend + half_trend) * self.y_scale,
            additive_terms,
            multiplicative_terms,
            components,
        }
    }
}

fn epoch_days(ds: NaiveDate) -> f64 {
    f64::from(ds.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
}

/// Changepoints at evenly spaced observations within `changepoint_range` of the history.
fn place_changepoints(t: &[f64], settings: &ModelSettings) -> Vec<f64> {
    let hist_size = (t.len() as f64 * settings.changepoint_range).floor() as usize;
    let count = settings.n_changepoints.min(hist_size.saturating_sub(1));
    if count == 0 {
        return Vec::new();
    }
    (1..=count)
        .map(|i| {
            let idx = ((hist_size - 1) as f64 * i as f64 / count as f64).round() as usize;
            t[idx.min(t.len() - 1)]
        })
        .collect()
}

fn select_seasonalities(history_dates: &[NaiveDate], span_days: i64) -> Vec<Seasonality> {
    let mut seasonalities = Vec::new();
    if span_days >= MIN_YEARLY_SPAN_DAYS {
        seasonalities.push(Seasonality::yearly());
    }
    let min_spacing = history_dates
        .windows(2)
        .map(|w| (w[1] - w[0]).num_days())
        .min()
        .unwrap_or(i64::MAX);
    if span_days >= MIN_WEEKLY_SPAN_DAYS && min_spacing < 7 {
        seasonalities.push(Seasonality::weekly());
    }
    seasonalities
}

fn trend_design(t: &[f64], changepoints: &[f64]) -> DMatrix<f64> {
    DMatrix::from_fn(t.len(), 2 + changepoints.len(), |i, j| match j {
        0 => t[i],
        1 => 1.0,
        _ => (t[i] - changepoints[j - 2]).max(0.0),
    })
}

fn seasonal_design(obs: &[(NaiveDate, f64)], seasonalities: &[Seasonality]) -> DMatrix<f64> {
    let width: usize = seasonalities.iter().map(Seasonality::width).sum();
    let mut x = DMatrix::zeros(obs.len(), width);
    let mut features = Vec::with_capacity(width);
    for (i, (ds, _)) in obs.iter().enumerate() {
        features.clear();
        let day = epoch_days(*ds);
        for s in seasonalities {
            s.push_features(day, &mut features);
        }
        for (j, f) in features.iter().enumerate() {
            x[(i, j)] = *f;
        }
    }
    x
}

fn fit_relative_seasonality(
    seasonal_x: &DMatrix<f64>,
    trend_fit: &DVector<f64>,
    y: &[f64],
    penalty: f64,
) -> Result<Vec<f64>, TrainError> {
    if seasonal_x.ncols() == 0 {
        return Ok(Vec::new());
    }
    let usable: Vec<usize> = (0..y.len())
        .filter(|&i| trend_fit[i].abs() > MIN_RELATIVE_TREND)
        .collect();
    if usable.is_empty() {
        return Ok(vec![0.0; seasonal_x.ncols()]);
    }
    let x = seasonal_x.select_rows(usable.iter());
    let target = DVector::from_iterator(
        usable.len(),
        usable.iter().map(|&i| y[i] / trend_fit[i] - 1.0),
    );
    let coef = ridge_solve(&x, &target, &vec![penalty; seasonal_x.ncols()])?;
    Ok(coef.iter().copied().collect())
}

/// Solve `(XᵀX + diag(penalty)) β = Xᵀy`.
fn ridge_solve(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    penalty: &[f64],
) -> Result<DVector<f64>, TrainError> {
    let xt = x.transpose();
    let mut gram = &xt * x;
    for (j, p) in penalty.iter().enumerate() {
        gram[(j, j)] += p;
    }
    let rhs = &xt * y;
    let solution = gram
        .cholesky()
        .ok_or_else(|| {
            TrainError::Degenerate("normal equations are not positive definite".to_string())
        })?
        .solve(&rhs);
    if solution.iter().any(|v| !v.is_finite()) {
        return Err(TrainError::Degenerate(
            "fit produced non-finite coefficients".to_string(),
        ));
    }
    Ok(solution)
}
