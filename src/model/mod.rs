//! Models: ARIMA forecasting and random-forest reliability scoring.

pub mod arima;
pub mod forecaster;
pub mod forest;
pub mod reliability;
