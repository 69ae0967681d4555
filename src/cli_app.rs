//! Top-level CLI definition and dispatch.

use std::path::PathBuf;

use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use crate::core::config::Config;
use crate::core::errors::Result;
use crate::data::aggregate::Metric;
use crate::data::store::JsonRecordStore;
use crate::model::reliability::ReliabilityQuery;
use crate::service::ServiceContext;

/// fleetcast: demand/spend forecasts and route reliability from delivery history.
#[derive(Debug, Parser)]
#[command(name = "fleetcast", version, about)]
pub struct Cli {
    /// Delivery records (JSON array or JSON lines).
    #[arg(long, value_name = "FILE")]
    pub records: PathBuf,

    /// TOML configuration; defaults apply when omitted.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Forecastable metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MetricArg {
    Demand,
    Spend,
}

impl From<MetricArg> for Metric {
    fn from(value: MetricArg) -> Self {
        match value {
            MetricArg::Demand => Self::Demand,
            MetricArg::Spend => Self::TotalCost,
        }
    }
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Forecast daily demand or spend.
    Forecast {
        metric: MetricArg,
        /// Horizon in days (config default when omitted).
        #[arg(long)]
        days: Option<usize>,
    },
    /// Rank the built-in route scenarios by reliability.
    Dashboard,
    /// Score a single route.
    Score {
        #[arg(long)]
        vehicle: String,
        #[arg(long)]
        origin: String,
        #[arg(long)]
        distance: f64,
        #[arg(long, default_value_t = 150)]
        demand: u32,
        #[arg(long)]
        alpine: bool,
        /// 1-12.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
        month: u32,
        /// Monday = 0 ... Sunday = 6.
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=6))]
        day_of_week: u32,
    },
    /// Model status and training outcomes.
    Health,
    /// Fit quality and accuracy summary.
    Performance,
}

fn emit(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Train from `--records` and run the selected command.
pub fn run(cli: &Cli) -> Result<()> {
    let config = Config::load_or_default(cli.config.as_deref())?;
    let store = JsonRecordStore::new(&cli.records);
    let context = ServiceContext::bootstrap(&store, &config)?;

    match &cli.command {
        Command::Forecast { metric, days } => {
            let days = days.unwrap_or(config.forecast.horizon_days);
            emit(&context.forecast((*metric).into(), days)?)
        }
        Command::Dashboard => emit(&context.dashboard(Local::now().date_naive())?),
        Command::Score {
            vehicle,
            origin,
            distance,
            demand,
            alpine,
            month,
            day_of_week,
        } => {
            let query = ReliabilityQuery {
                vehicle_id: vehicle.clone(),
                origin_id: origin.clone(),
                distance: *distance,
                demand: *demand,
                is_alpine: *alpine,
                month: *month,
                day_of_week: *day_of_week,
            };
            emit(&context.score_route(&query)?)
        }
        Command::Health => emit(&context.health()),
        Command::Performance => emit(&context.performance()),
    }
}
