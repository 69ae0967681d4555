//! FLC-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, FleetError>;

/// Top-level error type for fleetcast.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("[FLC-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[FLC-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[FLC-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[FLC-2001] insufficient data for {context}: {details}")]
    InsufficientData {
        context: &'static str,
        details: String,
    },

    #[error("[FLC-2002] model fit failed for order {order}: {details}")]
    FitFailure { order: String, details: String },

    #[error("[FLC-2003] model not trained: {model}")]
    NotTrained { model: &'static str },

    #[error("[FLC-2004] feature arity mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("[FLC-2005] unknown {field} value {value:?} (not seen during training)")]
    UnknownCategory { field: &'static str, value: String },

    #[error("[FLC-2006] invalid request: {details}")]
    InvalidRequest { details: String },

    #[error("[FLC-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[FLC-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FleetError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "FLC-1001",
            Self::MissingConfig { .. } => "FLC-1002",
            Self::ConfigParse { .. } => "FLC-1003",
            Self::InsufficientData { .. } => "FLC-2001",
            Self::FitFailure { .. } => "FLC-2002",
            Self::NotTrained { .. } => "FLC-2003",
            Self::ShapeMismatch { .. } => "FLC-2004",
            Self::UnknownCategory { .. } => "FLC-2005",
            Self::InvalidRequest { .. } => "FLC-2006",
            Self::Serialization { .. } => "FLC-2101",
            Self::Io { .. } => "FLC-3002",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// Only IO is transient; every modelling error is deterministic for a
    /// given input and configuration.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for fit failures.
    #[must_use]
    pub fn fit(order: impl std::fmt::Display, details: impl Into<String>) -> Self {
        Self::FitFailure {
            order: order.to_string(),
            details: details.into(),
        }
    }
}

impl From<serde_json::Error> for FleetError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for FleetError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
