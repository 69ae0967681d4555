//! Delivery records as supplied by the record store.

#![allow(missing_docs)]

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One completed delivery.
///
/// Field names follow the upstream store's camelCase payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    pub id: String,
    pub origin_id: String,
    pub destination_id: String,
    pub vehicle_id: String,
    pub demand: u32,
    /// Kilometres.
    pub distance: f64,
    pub total_cost: f64,
    pub delivery_date: NaiveDate,
    pub is_alpine: bool,
    pub has_overtime: bool,
    pub vehicle_type: String,
    pub origin_category: String,
    pub destination_category: String,
    /// Set only on records produced by history augmentation.
    #[serde(default)]
    pub synthetic: bool,
}

/// Days between the earliest and latest delivery, or `None` when empty.
#[must_use]
pub fn span_days(records: &[DeliveryRecord]) -> Option<i64> {
    let (first, last) = date_range(records)?;
    Some((last - first).num_days())
}

/// Earliest and latest delivery dates.
#[must_use]
pub fn date_range(records: &[DeliveryRecord]) -> Option<(NaiveDate, NaiveDate)> {
    let mut dates = records.iter().map(|r| r.delivery_date);
    let first = dates.next()?;
    Some(dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
}
