//! fleetcast: logistics forecasting and route reliability over sparse
//! delivery history.
//!
//! The pipeline pads short histories with seeded synthetic deliveries,
//! aggregates them into gap-free daily series, fits ARIMA forecasters for
//! demand and spend, and trains a random-forest reliability scorer. The
//! trained artifacts live in a read-only [`service::ServiceContext`].

pub mod core;
pub mod data;
pub mod logger;
pub mod model;
pub mod service;

#[cfg(feature = "cli")]
pub mod cli_app;
