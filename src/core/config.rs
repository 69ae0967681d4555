//! TOML configuration for the training pipeline.
//!
//! Every field has a default so an empty file (or no file at all) yields the
//! stock pipeline: 365 days of history, ARIMA(5,1,0), 30-day horizon, an
//! 80/20 split and seed 42.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::{FleetError, Result};
use crate::model::arima::ArimaOrder;

/// Upper bound on any single ARIMA order component.
pub const MAX_ORDER_COMPONENT: usize = 10;

/// Upper bound on `history.target_days` (ten years).
pub const MAX_TARGET_DAYS: u32 = 3650;

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub history: HistoryConfig,
    pub forecast: ForecastConfig,
    pub reliability: ReliabilityConfig,
}

/// `[history]` table: synthetic augmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Minimum span (days between first and last delivery) after augmentation.
    pub target_days: u32,
    /// Seed for the augmentation RNG.
    pub seed: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            target_days: 365,
            seed: 42,
        }
    }
}

/// `[forecast]` table: ARIMA fitting and horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Primary `(p, d, q)` order; `(1, 1, 0)` is always the fallback.
    pub primary_order: ArimaOrder,
    /// Default horizon in days when a request does not name one.
    pub horizon_days: usize,
    /// Largest horizon a request may ask for.
    pub max_horizon_days: usize,
    /// Two-sided interval coverage.
    pub confidence_level: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            primary_order: ArimaOrder::new(5, 1, 0),
            horizon_days: 30,
            max_horizon_days: 365,
            confidence_level: 0.95,
        }
    }
}

/// `[reliability]` table: random forest training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliabilityConfig {
    pub test_fraction: f64,
    pub seed: u64,
    pub n_trees: usize,
    pub max_depth: usize,
    /// Probability substituted when a prediction cannot be produced.
    pub fallback_probability: f64,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
            n_trees: 100,
            max_depth: 24,
            fallback_probability: 0.85,
        }
    }
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate the config file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FleetError::MissingConfig {
                path: path.to_path_buf(),
            });
        }
        let raw = std::fs::read_to_string(path).map_err(|e| FleetError::io(path, e))?;
        Self::from_toml_str(&raw)
    }

    /// Load `path` when given, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Reject values the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.history.target_days > MAX_TARGET_DAYS {
            return invalid(format!("history.target_days must be at most {MAX_TARGET_DAYS}"));
        }
        let order = self.forecast.primary_order;
        if order.p > MAX_ORDER_COMPONENT
            || order.d > MAX_ORDER_COMPONENT
            || order.q > MAX_ORDER_COMPONENT
        {
            return invalid(format!(
                "forecast.primary_order {order} has a component above {MAX_ORDER_COMPONENT}"
            ));
        }
        if self.forecast.max_horizon_days == 0 || self.forecast.max_horizon_days > 365 {
            return invalid("forecast.max_horizon_days must be within 1..=365");
        }
        if self.forecast.horizon_days == 0
            || self.forecast.horizon_days > self.forecast.max_horizon_days
        {
            return invalid("forecast.horizon_days must be within 1..=max_horizon_days");
        }
        if !(self.forecast.confidence_level > 0.0 && self.forecast.confidence_level < 1.0) {
            return invalid("forecast.confidence_level must be in (0, 1)");
        }
        if !(self.reliability.test_fraction > 0.0 && self.reliability.test_fraction < 1.0) {
            return invalid("reliability.test_fraction must be in (0, 1)");
        }
        if self.reliability.n_trees == 0 {
            return invalid("reliability.n_trees must be at least 1");
        }
        if self.reliability.max_depth == 0 {
            return invalid("reliability.max_depth must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.reliability.fallback_probability) {
            return invalid("reliability.fallback_probability must be in [0, 1]");
        }
        Ok(())
    }
}

fn invalid(details: impl Into<String>) -> Result<()> {
    Err(FleetError::InvalidConfig {
        details: details.into(),
    })
}
