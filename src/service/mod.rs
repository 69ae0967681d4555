//! Service context: the trained artifacts and the request operations on them.
//!
//! [`ServiceContext::bootstrap`] runs the whole pipeline once (fetch, augment,
//! aggregate, train) and the resulting context is read-only. Training
//! failures never abort startup; they are logged and listed in
//! [`ServiceContext::startup_issues`], and the affected operations answer
//! with `NotTrained`.

#![allow(missing_docs)]

use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::Serialize;

use crate::core::config::Config;
use crate::core::errors::{FleetError, Result};
use crate::data::aggregate::{DailySeries, FeatureMatrix, FeatureRow, Metric};
use crate::data::augment::HistoryAugmentor;
use crate::data::store::RecordStore;
use crate::model::forecaster::{Forecaster, TrainOutcome, generate_insight};
use crate::model::reliability::{
    Prediction, ReliabilityQuery, ReliabilityScorer, RiskNarrative, TrainingReport,
    generate_risk_narrative,
};

// ──────────────────── response shapes ────────────────────

/// One dated point of a forecast response. `value` and `lower` are never
/// negative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastEntry {
    pub date: String,
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResponse {
    pub forecast: Vec<ForecastEntry>,
    pub insight: String,
    pub metric: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardEntry {
    pub route: &'static str,
    /// On-time probability as a percentage, one decimal.
    pub score: f64,
    pub insight: String,
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteScore {
    pub prediction: Prediction,
    pub narrative: RiskNarrative,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelStatus {
    pub demand: bool,
    pub spend: bool,
    pub reliability: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub models_loaded: bool,
    pub details: ModelStatus,
    pub demand_outcome: Option<TrainOutcome>,
    pub spend_outcome: Option<TrainOutcome>,
    pub demand_aic: Option<f64>,
    pub spend_aic: Option<f64>,
    pub reliability_accuracy: Option<f64>,
    pub total_records: usize,
    pub synthetic_records: usize,
    pub startup_issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub arima_demand_aic: f64,
    pub arima_spend_aic: f64,
    pub rf_accuracy: f64,
    pub data_points: usize,
}

// ──────────────────── dashboard scenarios ────────────────────

/// Fixed route scenario shown on the reliability dashboard.
#[derive(Debug, Clone, Copy)]
struct RouteScenario {
    name: &'static str,
    is_alpine: bool,
    distance: f64,
    vehicle_code: u32,
}

const DASHBOARD_ROUTES: [RouteScenario; 5] = [
    RouteScenario {
        name: "Vienna Hub -> Salzburg (Mountain)",
        is_alpine: true,
        distance: 320.0,
        vehicle_code: 0,
    },
    RouteScenario {
        name: "Graz Inner City (Van)",
        is_alpine: false,
        distance: 15.0,
        vehicle_code: 1,
    },
    RouteScenario {
        name: "Innsbruck -> Munich (Long Haul)",
        is_alpine: true,
        distance: 180.0,
        vehicle_code: 2,
    },
    RouteScenario {
        name: "Vienna Local Distribution",
        is_alpine: false,
        distance: 45.0,
        vehicle_code: 0,
    },
    RouteScenario {
        name: "Klagenfurt -> Villach",
        is_alpine: false,
        distance: 40.0,
        vehicle_code: 1,
    },
];

const DASHBOARD_ORIGIN_CODE: u32 = 0;
const DASHBOARD_DEMAND: f64 = 150.0;

const fn response_label(metric: Metric) -> &'static str {
    match metric {
        Metric::Demand => "Demand (Cases)",
        Metric::TotalCost => "Spend (EUR)",
    }
}

const fn insight_label(metric: Metric) -> &'static str {
    match metric {
        Metric::Demand => "Demand",
        Metric::TotalCost => "Procurement Spend",
    }
}

// ──────────────────── context ────────────────────

/// Trained artifacts plus the configuration they were built with.
#[derive(Debug)]
pub struct ServiceContext {
    config: Config,
    total_records: usize,
    synthetic_records: usize,
    demand: Forecaster,
    spend: Forecaster,
    reliability: ReliabilityScorer,
    training_report: Option<TrainingReport>,
    startup_issues: Vec<String>,
}

fn train_forecaster(series: Option<&DailySeries>, metric: Metric, config: &Config) -> Forecaster {
    let mut forecaster = Forecaster::new(metric, config.forecast.confidence_level);
    if let Some(series) = series {
        forecaster.train(series, config.forecast.primary_order);
    }
    forecaster
}

impl ServiceContext {
    /// Run the training pipeline against `store`.
    ///
    /// Only a failing store is an error; every modelling failure leaves the
    /// corresponding model untrained and is recorded.
    pub fn bootstrap(store: &dyn RecordStore, config: &Config) -> Result<Self> {
        let raw = store.fetch_deliveries()?;
        tracing::info!(records = raw.len(), "fetched delivery history");

        let records = HistoryAugmentor::seeded(config.history.seed)
            .augment(&raw, config.history.target_days);
        let synthetic_records = records.iter().filter(|r| r.synthetic).count();
        tracing::info!(
            total = records.len(),
            synthetic = synthetic_records,
            target_days = config.history.target_days,
            "history augmented"
        );

        let mut startup_issues = Vec::new();
        let mut series_for = |metric: Metric| match DailySeries::from_records(&records, metric) {
            Ok(series) => Some(series),
            Err(err) => {
                tracing::error!(metric = metric.name(), error = %err, "cannot aggregate series");
                startup_issues.push(format!("{}: {err}", metric.name()));
                None
            }
        };
        let demand_series = series_for(Metric::Demand);
        let spend_series = series_for(Metric::TotalCost);

        let (demand, spend) = std::thread::scope(|scope| {
            let demand = scope.spawn(|| train_forecaster(demand_series.as_ref(), Metric::Demand, config));
            let spend = train_forecaster(spend_series.as_ref(), Metric::TotalCost, config);
            let demand = demand.join().unwrap_or_else(|_| {
                tracing::error!("demand training thread panicked");
                Forecaster::new(Metric::Demand, config.forecast.confidence_level)
            });
            (demand, spend)
        });
        for forecaster in [&demand, &spend] {
            if let Some((primary, fallback)) = forecaster.failure_reasons() {
                startup_issues.push(format!(
                    "{}: primary fit failed ({primary}); fallback fit failed ({fallback})",
                    forecaster.metric().name()
                ));
            }
        }

        let mut reliability = ReliabilityScorer::new(config.reliability.clone());
        let training_report = match FeatureMatrix::from_records(&records)
            .and_then(|matrix| reliability.train(&matrix))
        {
            Ok(report) => Some(report),
            Err(err) => {
                tracing::error!(error = %err, "reliability training failed");
                startup_issues.push(format!("reliability: {err}"));
                None
            }
        };

        Ok(Self {
            config: config.clone(),
            total_records: records.len(),
            synthetic_records,
            demand,
            spend,
            reliability,
            training_report,
            startup_issues,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn forecaster(&self, metric: Metric) -> &Forecaster {
        match metric {
            Metric::Demand => &self.demand,
            Metric::TotalCost => &self.spend,
        }
    }

    #[must_use]
    pub const fn reliability(&self) -> &ReliabilityScorer {
        &self.reliability
    }

    #[must_use]
    pub const fn training_report(&self) -> Option<&TrainingReport> {
        self.training_report.as_ref()
    }

    #[must_use]
    pub fn startup_issues(&self) -> &[String] {
        &self.startup_issues
    }

    /// Dated forecast for `days` days after the last observation.
    pub fn forecast(&self, metric: Metric, days: usize) -> Result<ForecastResponse> {
        let max = self.config.forecast.max_horizon_days;
        if days == 0 || days > max {
            return Err(FleetError::InvalidRequest {
                details: format!("days must be within 1..={max}, got {days}"),
            });
        }
        let forecaster = self.forecaster(metric);
        let raw = forecaster.forecast(days)?;
        let history = forecaster.history().map_or(&[][..], DailySeries::values);
        let insight = generate_insight(history, &raw, insight_label(metric));

        let forecast = raw
            .floored()
            .points
            .into_iter()
            .map(|point| ForecastEntry {
                date: point.date.format("%Y-%m-%d").to_string(),
                value: point.mean,
                lower: point.lower,
                upper: point.upper,
            })
            .collect();
        Ok(ForecastResponse {
            forecast,
            insight: insight.text,
            metric: response_label(metric),
        })
    }

    /// Built-in route scenarios scored for `today`, riskiest first. Routes
    /// whose codes the trained encoding never assigned are flagged `fallback`.
    pub fn dashboard(&self, today: NaiveDate) -> Result<Vec<DashboardEntry>> {
        let (day_of_week, month) = FeatureRow::calendar(today);
        let mut entries = DASHBOARD_ROUTES
            .iter()
            .map(|route| {
                let row = FeatureRow {
                    vehicle_code: route.vehicle_code,
                    origin_code: DASHBOARD_ORIGIN_CODE,
                    distance: route.distance,
                    demand: DASHBOARD_DEMAND,
                    is_alpine: route.is_alpine,
                    day_of_week,
                    month,
                };
                let prediction = self.reliability.score_encoded(&row)?;
                let probability = prediction.probability();
                Ok(DashboardEntry {
                    route: route.name,
                    score: (probability * 1000.0).round() / 10.0,
                    insight: generate_risk_narrative(&row, probability).text,
                    fallback: prediction.is_fallback(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        entries.sort_by(|a, b| a.score.total_cmp(&b.score));
        Ok(entries)
    }

    /// Score one raw route description.
    pub fn score_route(&self, query: &ReliabilityQuery) -> Result<RouteScore> {
        let (row, prediction) = self.reliability.score_query(query)?;
        let narrative = generate_risk_narrative(&row, prediction.probability());
        Ok(RouteScore {
            prediction,
            narrative,
        })
    }

    #[must_use]
    pub fn health(&self) -> HealthReport {
        let details = ModelStatus {
            demand: self.demand.is_trained(),
            spend: self.spend.is_trained(),
            reliability: self.reliability.is_trained(),
        };
        let models_loaded = details.demand && details.spend && details.reliability;
        HealthReport {
            status: if models_loaded { "ok" } else { "degraded" },
            models_loaded,
            details,
            demand_outcome: self.demand.outcome(),
            spend_outcome: self.spend.outcome(),
            demand_aic: self.demand.aic(),
            spend_aic: self.spend.aic(),
            reliability_accuracy: self.training_report.as_ref().map(|r| r.accuracy),
            total_records: self.total_records,
            synthetic_records: self.synthetic_records,
            startup_issues: self.startup_issues.clone(),
        }
    }

    #[must_use]
    pub fn performance(&self) -> PerformanceReport {
        PerformanceReport {
            arima_demand_aic: self.demand.aic().unwrap_or(0.0),
            arima_spend_aic: self.spend.aic().unwrap_or(0.0),
            rf_accuracy: self.training_report.as_ref().map_or(0.0, |r| r.accuracy),
            data_points: self.total_records,
        }
    }
}

// ──────────────────── shared handle ────────────────────

/// Swappable handle to the current context.
///
/// Readers take a cheap `Arc` snapshot; a context rebuilt elsewhere is
/// installed atomically with [`SharedContext::replace`].
#[derive(Debug, Clone)]
pub struct SharedContext {
    inner: Arc<RwLock<Arc<ServiceContext>>>,
}

impl SharedContext {
    #[must_use]
    pub fn new(context: ServiceContext) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(context))),
        }
    }

    #[must_use]
    pub fn current(&self) -> Arc<ServiceContext> {
        Arc::clone(&self.inner.read())
    }

    /// Install `context`, returning the one it replaced.
    pub fn replace(&self, context: ServiceContext) -> Arc<ServiceContext> {
        std::mem::replace(&mut *self.inner.write(), Arc::new(context))
    }
}
