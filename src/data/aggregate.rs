//! Aggregation of delivery records into model inputs.
//!
//! Two shapes come out of here: a gap-free [`DailySeries`] per metric for
//! the forecasters, and a [`FeatureMatrix`] with its [`FeatureEncoding`] for
//! the reliability classifier.

#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::core::errors::{FleetError, Result};
use crate::data::record::{DeliveryRecord, date_range};

// ──────────────────── daily series ────────────────────

/// Numeric column summed per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Demand,
    TotalCost,
}

impl Metric {
    #[must_use]
    pub fn value(self, record: &DeliveryRecord) -> f64 {
        match self {
            Self::Demand => f64::from(record.demand),
            Self::TotalCost => record.total_cost,
        }
    }

    /// Short name used in logs and model identifiers.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Demand => "demand",
            Self::TotalCost => "spend",
        }
    }
}

/// One value per calendar day from `start`, with no gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySeries {
    metric: Metric,
    start: NaiveDate,
    values: Vec<f64>,
}

impl DailySeries {
    /// Sum `metric` per delivery date and reindex over every day in the
    /// observed range, filling absent days with zero.
    pub fn from_records(records: &[DeliveryRecord], metric: Metric) -> Result<Self> {
        let (start, end) = date_range(records).ok_or_else(|| FleetError::InsufficientData {
            context: "daily aggregation",
            details: format!("no records to aggregate for {}", metric.name()),
        })?;

        let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for record in records {
            *totals.entry(record.delivery_date).or_insert(0.0) += metric.value(record);
        }

        let len = (end - start).num_days() as usize + 1;
        let values = (0..len as u64)
            .map(|offset| {
                let day = start + Days::new(offset);
                totals.get(&day).copied().unwrap_or(0.0)
            })
            .collect();

        Ok(Self {
            metric,
            start,
            values,
        })
    }

    #[must_use]
    pub const fn metric(&self) -> Metric {
        self.metric
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub const fn first_date(&self) -> NaiveDate {
        self.start
    }

    #[must_use]
    pub fn last_date(&self) -> NaiveDate {
        self.start + Days::new(self.values.len().saturating_sub(1) as u64)
    }

    /// Value on `date`, if it falls inside the series.
    #[must_use]
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        let offset = usize::try_from((date - self.start).num_days()).ok()?;
        self.values.get(offset).copied()
    }

    /// `(date, value)` pairs in calendar order.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (self.start + Days::new(i as u64), *v))
    }
}

// ──────────────────── feature encoding ────────────────────

/// Dense integer codes for one categorical column, assigned in
/// lexicographic order of the distinct values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCodes {
    labels: Vec<String>,
}

impl CategoryCodes {
    pub fn fit<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let distinct: BTreeSet<&str> = values.into_iter().collect();
        Self {
            labels: distinct.into_iter().map(str::to_string).collect(),
        }
    }

    #[must_use]
    pub fn code(&self, value: &str) -> Option<u32> {
        self.labels
            .binary_search_by(|label| label.as_str().cmp(value))
            .ok()
            .map(|idx| idx as u32)
    }

    #[must_use]
    pub fn label(&self, code: u32) -> Option<&str> {
        self.labels.get(code as usize).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Categorical mappings captured at training time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureEncoding {
    pub vehicles: CategoryCodes,
    pub origins: CategoryCodes,
}

impl FeatureEncoding {
    #[must_use]
    pub fn fit(records: &[DeliveryRecord]) -> Self {
        Self {
            vehicles: CategoryCodes::fit(records.iter().map(|r| r.vehicle_id.as_str())),
            origins: CategoryCodes::fit(records.iter().map(|r| r.origin_id.as_str())),
        }
    }

    pub fn vehicle_code(&self, vehicle_id: &str) -> Result<u32> {
        self.vehicles
            .code(vehicle_id)
            .ok_or_else(|| FleetError::UnknownCategory {
                field: "vehicle_id",
                value: vehicle_id.to_string(),
            })
    }

    /// Fail with `UnknownCategory` when a row's codes were never assigned.
    pub fn check_codes(&self, row: &FeatureRow) -> Result<()> {
        if self.vehicles.label(row.vehicle_code).is_none() {
            return Err(FleetError::UnknownCategory {
                field: "vehicle_code",
                value: row.vehicle_code.to_string(),
            });
        }
        if self.origins.label(row.origin_code).is_none() {
            return Err(FleetError::UnknownCategory {
                field: "origin_code",
                value: row.origin_code.to_string(),
            });
        }
        Ok(())
    }

    pub fn origin_code(&self, origin_id: &str) -> Result<u32> {
        self.origins
            .code(origin_id)
            .ok_or_else(|| FleetError::UnknownCategory {
                field: "origin_id",
                value: origin_id.to_string(),
            })
    }
}

// ──────────────────── feature rows ────────────────────

/// Column names in the order [`FeatureRow::to_vec`] emits them.
pub const FEATURE_NAMES: [&str; 7] = [
    "vehicle_encoded",
    "origin_encoded",
    "distance",
    "demand",
    "is_alpine_int",
    "day_of_week",
    "month",
];

/// Engineered classifier input for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub vehicle_code: u32,
    pub origin_code: u32,
    pub distance: f64,
    pub demand: f64,
    pub is_alpine: bool,
    /// Monday = 0 … Sunday = 6.
    pub day_of_week: u32,
    /// 1–12.
    pub month: u32,
}

impl FeatureRow {
    /// Calendar-derived fields for `date`.
    #[must_use]
    pub fn calendar(date: NaiveDate) -> (u32, u32) {
        (date.weekday().num_days_from_monday(), date.month())
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            f64::from(self.vehicle_code),
            f64::from(self.origin_code),
            self.distance,
            self.demand,
            if self.is_alpine { 1.0 } else { 0.0 },
            f64::from(self.day_of_week),
            f64::from(self.month),
        ]
    }
}

/// Projection back to the source record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordKey {
    pub id: String,
    pub vehicle_id: String,
    pub origin_id: String,
}

/// Classifier training set.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub rows: Vec<FeatureRow>,
    /// 1 = on time, 0 = overtime.
    pub labels: Vec<u8>,
    pub identifiers: Vec<RecordKey>,
    pub encoding: FeatureEncoding,
}

impl FeatureMatrix {
    pub fn from_records(records: &[DeliveryRecord]) -> Result<Self> {
        if records.is_empty() {
            return Err(FleetError::InsufficientData {
                context: "feature matrix",
                details: "no records to encode".to_string(),
            });
        }
        let encoding = FeatureEncoding::fit(records);
        let mut rows = Vec::with_capacity(records.len());
        let mut labels = Vec::with_capacity(records.len());
        let mut identifiers = Vec::with_capacity(records.len());
        for record in records {
            let (day_of_week, month) = FeatureRow::calendar(record.delivery_date);
            rows.push(FeatureRow {
                vehicle_code: encoding.vehicle_code(&record.vehicle_id)?,
                origin_code: encoding.origin_code(&record.origin_id)?,
                distance: record.distance,
                demand: f64::from(record.demand),
                is_alpine: record.is_alpine,
                day_of_week,
                month,
            });
            labels.push(u8::from(!record.has_overtime));
            identifiers.push(RecordKey {
                id: record.id.clone(),
                vehicle_id: record.vehicle_id.clone(),
                origin_id: record.origin_id.clone(),
            });
        }
        Ok(Self {
            rows,
            labels,
            identifiers,
            encoding,
        })
    }

    /// Rows as dense vectors in [`FEATURE_NAMES`] order.
    #[must_use]
    pub fn to_vectors(&self) -> Vec<Vec<f64>> {
        self.rows.iter().map(FeatureRow::to_vec).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
