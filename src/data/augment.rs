//! Synthetic history augmentation.
//!
//! Short delivery histories are padded backwards in time with records drawn
//! from the observed distribution so that downstream models always see at
//! least `target_days` of calendar span. Real records are never modified.

use std::collections::{HashMap, HashSet};

use chrono::{Days, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::data::record::{DeliveryRecord, date_range};

/// Relative spread of the synthetic daily delivery count.
const DAILY_COUNT_REL_STD: f64 = 0.2;
/// Relative spread of the cost/demand noise factor.
const VALUE_NOISE_STD: f64 = 0.1;
/// Probability that a synthetic delivery ran into overtime.
const OVERTIME_PROBABILITY: f64 = 0.10;

/// Prefix of every synthetic record identifier.
pub const SYNTHETIC_ID_PREFIX: &str = "synth-";

/// Pads short histories with plausible synthetic deliveries.
///
/// The random source is injected so runs are reproducible under a seed.
#[derive(Debug)]
pub struct HistoryAugmentor<R: Rng> {
    rng: R,
}

impl HistoryAugmentor<StdRng> {
    /// Augmentor over a `StdRng` seeded with `seed`.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

/// Observed distribution the synthetic days are drawn from.
struct Profile<'a> {
    mean_daily_count: f64,
    vehicle_ids: Vec<&'a str>,
    origin_ids: Vec<&'a str>,
    destination_ids: Vec<&'a str>,
    by_vehicle: HashMap<&'a str, Vec<&'a DeliveryRecord>>,
    real_ids: HashSet<&'a str>,
}

impl<'a> Profile<'a> {
    fn observe(records: &'a [DeliveryRecord]) -> Self {
        let distinct_days = records
            .iter()
            .map(|r| r.delivery_date)
            .collect::<HashSet<_>>()
            .len();
        let mut by_vehicle: HashMap<&str, Vec<&DeliveryRecord>> = HashMap::new();
        for record in records {
            by_vehicle
                .entry(record.vehicle_id.as_str())
                .or_default()
                .push(record);
        }
        Self {
            mean_daily_count: records.len() as f64 / distinct_days as f64,
            vehicle_ids: first_seen(records.iter().map(|r| r.vehicle_id.as_str())),
            origin_ids: first_seen(records.iter().map(|r| r.origin_id.as_str())),
            destination_ids: first_seen(records.iter().map(|r| r.destination_id.as_str())),
            by_vehicle,
            real_ids: records.iter().map(|r| r.id.as_str()).collect(),
        }
    }
}

/// Distinct values in first-seen order.
fn first_seen<'a>(values: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    values.filter(|v| seen.insert(*v)).collect()
}

/// `synth-<day>-<slot>`, suffixed with `~<n>` while it clashes with a real id.
fn synthetic_id(real_ids: &HashSet<&str>, day_index: i64, slot: usize) -> String {
    let base = format!("{SYNTHETIC_ID_PREFIX}{day_index}-{slot}");
    if !real_ids.contains(base.as_str()) {
        return base;
    }
    (1u32..)
        .map(|n| format!("{base}~{n}"))
        .find(|candidate| !real_ids.contains(candidate.as_str()))
        .unwrap_or(base)
}

impl<R: Rng> HistoryAugmentor<R> {
    #[must_use]
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Return `records` padded so their span covers at least `target_days`.
    ///
    /// Empty input yields empty output; input that already spans
    /// `target_days` is returned unchanged. Otherwise one synthetic day is
    /// generated per missing day, walking backwards from the day before the
    /// earliest real delivery, and the merged set is sorted by date.
    pub fn augment(&mut self, records: &[DeliveryRecord], target_days: u32) -> Vec<DeliveryRecord> {
        let Some((earliest, latest)) = date_range(records) else {
            tracing::warn!("no delivery records to augment");
            return Vec::new();
        };
        let span = (latest - earliest).num_days();
        let days_needed = i64::from(target_days) - span;
        if days_needed <= 0 {
            tracing::info!(span_days = span, target_days, "history already sufficient");
            return records.to_vec();
        }

        let profile = Profile::observe(records);
        let mut synthetic = Vec::new();
        let mut day = earliest;
        for day_index in 0..days_needed {
            let Some(previous) = day.checked_sub_days(Days::new(1)) else {
                break;
            };
            day = previous;
            let count = self.daily_count(profile.mean_daily_count);
            for slot in 0..count {
                if let Some(record) = self.synthesize(&profile, day, day_index, slot) {
                    synthetic.push(record);
                }
            }
        }

        tracing::info!(
            synthetic_days = days_needed,
            synthetic_records = synthetic.len(),
            real_records = records.len(),
            "augmented delivery history"
        );

        let mut combined = synthetic;
        combined.extend_from_slice(records);
        combined.sort_by_key(|r| r.delivery_date);
        combined
    }

    fn daily_count(&mut self, mean: f64) -> usize {
        let drawn = Normal::new(mean, mean * DAILY_COUNT_REL_STD)
            .map_or(mean, |dist| dist.sample(&mut self.rng));
        drawn.trunc().max(1.0) as usize
    }

    fn synthesize(
        &mut self,
        profile: &Profile<'_>,
        day: NaiveDate,
        day_index: i64,
        slot: usize,
    ) -> Option<DeliveryRecord> {
        let vehicle_id = *profile.vehicle_ids.choose(&mut self.rng)?;
        let origin_id = *profile.origin_ids.choose(&mut self.rng)?;
        let destination_id = *profile.destination_ids.choose(&mut self.rng)?;
        let template = *profile.by_vehicle.get(vehicle_id)?.choose(&mut self.rng)?;

        let noise = Normal::new(1.0, VALUE_NOISE_STD).map_or(1.0, |dist| dist.sample(&mut self.rng));
        let demand = (f64::from(template.demand) * noise).trunc().max(0.0) as u32;
        let total_cost = (template.total_cost * noise).max(0.0);
        let has_overtime = self.rng.random_bool(OVERTIME_PROBABILITY);

        Some(DeliveryRecord {
            id: synthetic_id(&profile.real_ids, day_index, slot),
            origin_id: origin_id.to_string(),
            destination_id: destination_id.to_string(),
            vehicle_id: vehicle_id.to_string(),
            demand,
            distance: template.distance,
            total_cost,
            delivery_date: day,
            is_alpine: template.is_alpine,
            has_overtime,
            vehicle_type: template.vehicle_type.clone(),
            origin_category: template.origin_category.clone(),
            destination_category: template.destination_category.clone(),
            synthetic: true,
        })
    }
}
