//! Per-metric forecaster: two-step ARIMA fitting, dated forecasts and the
//! trend narrative that accompanies them.

use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::core::errors::{FleetError, Result};
use crate::data::aggregate::{DailySeries, Metric};
use crate::model::arima::{self, ArimaOrder, FittedArima};

/// Observed values compared against the forecast in [`generate_insight`].
const INSIGHT_WINDOW: usize = 30;

// ──────────────────── training state ────────────────────

/// How a training call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "order", rename_all = "snake_case")]
pub enum TrainOutcome {
    TrainedWithPrimary(ArimaOrder),
    TrainedWithFallback(ArimaOrder),
    Failed,
}

impl TrainOutcome {
    #[must_use]
    pub const fn is_trained(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

#[derive(Debug, Clone)]
enum State {
    Untrained,
    Trained {
        model: Box<FittedArima>,
        history: DailySeries,
        outcome: TrainOutcome,
    },
    Failed {
        primary_error: String,
        fallback_error: String,
    },
}

/// ARIMA forecaster for one metric.
///
/// `Untrained → Trained` or `Untrained → Failed`; both end states are
/// terminal, so a forecaster is trained at most once.
#[derive(Debug, Clone)]
pub struct Forecaster {
    metric: Metric,
    confidence_level: f64,
    state: State,
}

impl Forecaster {
    #[must_use]
    pub const fn new(metric: Metric, confidence_level: f64) -> Self {
        Self {
            metric,
            confidence_level,
            state: State::Untrained,
        }
    }

    #[must_use]
    pub const fn metric(&self) -> Metric {
        self.metric
    }

    /// Fit `primary`, retrying once with [`ArimaOrder::FALLBACK`].
    ///
    /// Never returns an error: numerical failures end in the `Failed` state
    /// and `false`. Calling this on a forecaster that already left
    /// `Untrained` is a no-op returning the existing result.
    pub fn train(&mut self, series: &DailySeries, primary: ArimaOrder) -> bool {
        if !matches!(self.state, State::Untrained) {
            return self.is_trained();
        }
        let metric = self.metric.name();

        let primary_error = match arima::fit(series.values(), primary) {
            Ok(model) => {
                tracing::info!(metric, order = %primary, aic = model.aic(), "forecaster trained");
                self.state = State::Trained {
                    model: Box::new(model),
                    history: series.clone(),
                    outcome: TrainOutcome::TrainedWithPrimary(primary),
                };
                return true;
            }
            Err(err) => err.to_string(),
        };
        tracing::warn!(
            metric,
            order = %primary,
            error = %primary_error,
            fallback = %ArimaOrder::FALLBACK,
            "primary fit failed, retrying with fallback order"
        );

        match arima::fit(series.values(), ArimaOrder::FALLBACK) {
            Ok(model) => {
                tracing::info!(
                    metric,
                    order = %ArimaOrder::FALLBACK,
                    aic = model.aic(),
                    "forecaster trained with fallback order"
                );
                self.state = State::Trained {
                    model: Box::new(model),
                    history: series.clone(),
                    outcome: TrainOutcome::TrainedWithFallback(ArimaOrder::FALLBACK),
                };
                true
            }
            Err(err) => {
                tracing::error!(metric, error = %err, "forecaster failed to train");
                self.state = State::Failed {
                    primary_error,
                    fallback_error: err.to_string(),
                };
                false
            }
        }
    }

    #[must_use]
    pub const fn is_trained(&self) -> bool {
        matches!(self.state, State::Trained { .. })
    }

    /// `None` while untrained.
    #[must_use]
    pub const fn outcome(&self) -> Option<TrainOutcome> {
        match &self.state {
            State::Untrained => None,
            State::Trained { outcome, .. } => Some(*outcome),
            State::Failed { .. } => Some(TrainOutcome::Failed),
        }
    }

    /// Both fit errors when training failed.
    #[must_use]
    pub fn failure_reasons(&self) -> Option<(&str, &str)> {
        match &self.state {
            State::Failed {
                primary_error,
                fallback_error,
            } => Some((primary_error, fallback_error)),
            _ => None,
        }
    }

    /// AIC of the fitted model.
    #[must_use]
    pub fn aic(&self) -> Option<f64> {
        match &self.state {
            State::Trained { model, .. } => Some(model.aic()),
            _ => None,
        }
    }

    /// The series the model was trained on.
    #[must_use]
    pub const fn history(&self) -> Option<&DailySeries> {
        match &self.state {
            State::Trained { history, .. } => Some(history),
            _ => None,
        }
    }

    /// `steps` daily forecasts starting the day after the last observation.
    pub fn forecast(&self, steps: usize) -> Result<ForecastResult> {
        let State::Trained { model, history, .. } = &self.state else {
            return Err(FleetError::NotTrained {
                model: self.metric.name(),
            });
        };
        let first = history
            .last_date()
            .checked_add_days(Days::new(1))
            .ok_or_else(|| FleetError::InvalidRequest {
                details: "forecast start date overflows the calendar".to_string(),
            })?;
        let points = model
            .forecast(steps, self.confidence_level)?
            .into_iter()
            .zip(0u64..)
            .map(|(step, offset)| ForecastPoint {
                date: first + Days::new(offset),
                mean: step.mean,
                lower: step.lower,
                upper: step.upper,
            })
            .collect();
        Ok(ForecastResult { points })
    }
}

// ──────────────────── forecast result ────────────────────

/// One forecast day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub mean: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Consecutive daily forecasts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResult {
    pub points: Vec<ForecastPoint>,
}

impl ForecastResult {
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Clamp mean and lower bound at zero; the upper bound is left alone.
    #[must_use]
    pub fn floored(&self) -> Self {
        Self {
            points: self
                .points
                .iter()
                .map(|p| ForecastPoint {
                    mean: p.mean.max(0.0),
                    lower: p.lower.max(0.0),
                    ..*p
                })
                .collect(),
        }
    }

    fn mean_of_means(&self) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.points.iter().map(|p| p.mean).sum::<f64>() / self.points.len() as f64
    }

    fn extreme(&self, pick_max: bool) -> Option<ForecastPoint> {
        self.points.iter().copied().reduce(|best, p| {
            let better = if pick_max { p.mean > best.mean } else { p.mean < best.mean };
            if better { p } else { best }
        })
    }
}

// ──────────────────── insight ────────────────────

/// Direction of the projected change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

impl Trend {
    /// `> 5` increasing, `< -5` decreasing, otherwise stable.
    #[must_use]
    pub fn classify(change_pct: f64) -> Self {
        if change_pct > 5.0 {
            Self::Increasing
        } else if change_pct < -5.0 {
            Self::Decreasing
        } else {
            Self::Stable
        }
    }

    const fn phrase(self) -> &'static str {
        match self {
            Self::Increasing => "increase",
            Self::Decreasing => "decrease",
            Self::Stable => "remain stable, varying",
        }
    }
}

/// Size qualifier of the projected change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Magnitude {
    Slightly,
    Significantly,
    Drastically,
}

impl Magnitude {
    /// `|x| > 50` drastically, `|x| > 20` significantly, otherwise slightly.
    #[must_use]
    pub fn classify(change_pct: f64) -> Self {
        let abs = change_pct.abs();
        if abs > 50.0 {
            Self::Drastically
        } else if abs > 20.0 {
            Self::Significantly
        } else {
            Self::Slightly
        }
    }

    const fn word(self) -> &'static str {
        match self {
            Self::Slightly => "slightly",
            Self::Significantly => "significantly",
            Self::Drastically => "drastically",
        }
    }
}

/// Trend narrative for a forecast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub trend: Trend,
    pub magnitude: Magnitude,
    pub change_pct: f64,
    pub text: String,
}

/// Compare the forecast against recent history and describe the change.
///
/// The baseline is the mean of the last 30 observations (all of them when
/// fewer exist); a zero baseline is treated as one.
#[must_use]
pub fn generate_insight(history: &[f64], forecast: &ForecastResult, metric_label: &str) -> Insight {
    let window = &history[history.len().saturating_sub(INSIGHT_WINDOW)..];
    let mut current_avg = if window.is_empty() {
        0.0
    } else {
        window.iter().sum::<f64>() / window.len() as f64
    };
    if current_avg == 0.0 {
        current_avg = 1.0;
    }
    let future_avg = forecast.mean_of_means();
    let change_pct = (future_avg - current_avg) / current_avg * 100.0;
    let trend = Trend::classify(change_pct);
    let magnitude = Magnitude::classify(change_pct);

    let mut text = format!(
        "{metric_label} is projected to {} {} ({change_pct:+.1}%) over the next {} days. ",
        trend.phrase(),
        magnitude.word(),
        forecast.len(),
    );
    match trend {
        Trend::Increasing => {
            if let Some(peak) = forecast.extreme(true) {
                text.push_str(&format!(
                    "Prepare for a peak of {} units around {}. ",
                    peak.mean as i64,
                    peak.date.format("%b %d"),
                ));
            }
            text.push_str("Consider increasing buffer stock in regional warehouses.");
        }
        Trend::Decreasing => {
            if let Some(trough) = forecast.extreme(false) {
                text.push_str(&format!(
                    "Expect lower activity levels, bottoming out around {}. ",
                    trough.date.format("%b %d"),
                ));
            }
            text.push_str("Opportunity to schedule vehicle maintenance or reduce labor shifts.");
        }
        Trend::Stable => {
            text.push_str(&format!(
                "Operations are expected to remain steady with an average of {} units. ",
                future_avg as i64,
            ));
            text.push_str("Maintain current inventory levels.");
        }
    }

    Insight {
        trend,
        magnitude,
        change_pct,
        text,
    }
}
