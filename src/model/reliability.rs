//! Route/supplier reliability: on-time probability and risk narratives.

#![allow(missing_docs)]

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::core::config::ReliabilityConfig;
use crate::core::errors::{FleetError, Result};
use crate::data::aggregate::{FEATURE_NAMES, FeatureEncoding, FeatureMatrix, FeatureRow};
use crate::model::forest::{ForestParams, RandomForest};

// ──────────────────── artifact ────────────────────

/// Everything inference needs to reproduce training-time inputs.
#[derive(Debug, Clone)]
pub struct ReliabilityModel {
    forest: RandomForest,
    feature_names: Vec<String>,
    encoding: FeatureEncoding,
}

impl ReliabilityModel {
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    #[must_use]
    pub const fn encoding(&self) -> &FeatureEncoding {
        &self.encoding
    }
}

// ──────────────────── evaluation report ────────────────────

/// Precision/recall/F1 for one class on the held-out split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Held-out evaluation, shaped like a classification report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub delayed: ClassMetrics,
    pub on_time: ClassMetrics,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

fn class_metrics(truth: &[u8], predicted: &[u8], class: u8) -> ClassMetrics {
    let pairs = || truth.iter().zip(predicted);
    let tp = pairs().filter(|(t, p)| **t == class && **p == class).count();
    let predicted_n = predicted.iter().filter(|p| **p == class).count();
    let support = truth.iter().filter(|t| **t == class).count();
    let precision = ratio(tp, predicted_n);
    let recall = ratio(tp, support);
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };
    ClassMetrics {
        precision,
        recall,
        f1,
        support,
    }
}

impl ClassificationReport {
    #[must_use]
    pub fn evaluate(truth: &[u8], predicted: &[u8]) -> Self {
        let delayed = class_metrics(truth, predicted, 0);
        let on_time = class_metrics(truth, predicted, 1);
        let support = delayed.support + on_time.support;
        let avg = |f: fn(&ClassMetrics) -> f64| (f(&delayed) + f(&on_time)) / 2.0;
        let weighted = |f: fn(&ClassMetrics) -> f64| {
            if support == 0 {
                0.0
            } else {
                f(&delayed).mul_add(
                    delayed.support as f64,
                    f(&on_time) * on_time.support as f64,
                ) / support as f64
            }
        };
        Self {
            delayed,
            on_time,
            macro_avg: ClassMetrics {
                precision: avg(|m| m.precision),
                recall: avg(|m| m.recall),
                f1: avg(|m| m.f1),
                support,
            },
            weighted_avg: ClassMetrics {
                precision: weighted(|m| m.precision),
                recall: weighted(|m| m.recall),
                f1: weighted(|m| m.f1),
                support,
            },
        }
    }
}

/// Result of a training run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub accuracy: f64,
    pub report: ClassificationReport,
    pub train_rows: usize,
    pub test_rows: usize,
}

// ──────────────────── predictions ────────────────────

/// A probability, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Prediction {
    /// Produced by the trained forest.
    Model { probability: f64 },
    /// The configured default, substituted because the model could not
    /// score the input.
    Fallback { probability: f64, reason: String },
}

impl Prediction {
    #[must_use]
    pub const fn probability(&self) -> f64 {
        match self {
            Self::Model { probability } | Self::Fallback { probability, .. } => *probability,
        }
    }

    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Raw, unencoded description of one delivery to score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityQuery {
    pub vehicle_id: String,
    pub origin_id: String,
    pub distance: f64,
    pub demand: u32,
    pub is_alpine: bool,
    pub month: u32,
    pub day_of_week: u32,
}

// ──────────────────── scorer ────────────────────

/// Owns the reliability artifact for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct ReliabilityScorer {
    config: ReliabilityConfig,
    model: Option<ReliabilityModel>,
}

impl ReliabilityScorer {
    #[must_use]
    pub const fn new(config: ReliabilityConfig) -> Self {
        Self {
            config,
            model: None,
        }
    }

    #[must_use]
    pub const fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    #[must_use]
    pub const fn model(&self) -> Option<&ReliabilityModel> {
        self.model.as_ref()
    }

    /// Seeded shuffled split, forest fit on the training part, evaluation on
    /// the held-out part. The artifact keeps the matrix's feature order and
    /// category encoding.
    pub fn train(&mut self, matrix: &FeatureMatrix) -> Result<TrainingReport> {
        let n = matrix.len();
        let test_rows = (n as f64 * self.config.test_fraction).ceil() as usize;
        if n < 2 || test_rows == 0 || test_rows >= n {
            return Err(FleetError::InsufficientData {
                context: "reliability split",
                details: format!("{n} rows cannot be split with test fraction {}", self.config.test_fraction),
            });
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut StdRng::seed_from_u64(self.config.seed));
        let (test_idx, train_idx) = order.split_at(test_rows);

        let vectors = matrix.to_vectors();
        let pick_x = |idx: &[usize]| idx.iter().map(|&i| vectors[i].clone()).collect::<Vec<_>>();
        let pick_y = |idx: &[usize]| idx.iter().map(|&i| matrix.labels[i]).collect::<Vec<_>>();

        let params = ForestParams {
            n_trees: self.config.n_trees,
            max_depth: self.config.max_depth,
            seed: self.config.seed,
            ..ForestParams::default()
        };
        let forest = RandomForest::fit(&pick_x(train_idx), &pick_y(train_idx), &params)?;

        let truth = pick_y(test_idx);
        let predicted = pick_x(test_idx)
            .iter()
            .map(|row| forest.predict(row))
            .collect::<Result<Vec<u8>>>()?;
        let correct = truth.iter().zip(&predicted).filter(|(t, p)| t == p).count();
        let accuracy = correct as f64 / truth.len() as f64;

        tracing::info!(
            train_rows = train_idx.len(),
            test_rows,
            trees = forest.n_trees(),
            accuracy,
            "reliability model trained"
        );

        self.model = Some(ReliabilityModel {
            forest,
            feature_names: FEATURE_NAMES.iter().map(ToString::to_string).collect(),
            encoding: matrix.encoding.clone(),
        });
        Ok(TrainingReport {
            accuracy,
            report: ClassificationReport::evaluate(&truth, &predicted),
            train_rows: train_idx.len(),
            test_rows,
        })
    }

    /// On-time probability for a vector in training-time feature order.
    pub fn predict_probability(&self, row: &[f64]) -> Result<f64> {
        let model = self
            .model
            .as_ref()
            .ok_or(FleetError::NotTrained { model: "reliability" })?;
        if row.len() != model.feature_names.len() {
            return Err(FleetError::ShapeMismatch {
                expected: model.feature_names.len(),
                actual: row.len(),
            });
        }
        model.forest.predict_proba(row)
    }

    /// Like [`Self::predict_probability`], but an unscoreable input yields
    /// an explicit [`Prediction::Fallback`]. An untrained model is still an
    /// error.
    pub fn predict_or_fallback(&self, row: &[f64]) -> Result<Prediction> {
        self.resolve(self.predict_probability(row))
    }

    /// Score a row whose categorical fields are already codes. Codes absent
    /// from the persisted encoding yield a [`Prediction::Fallback`] carrying
    /// `UnknownCategory`.
    pub fn score_encoded(&self, row: &FeatureRow) -> Result<Prediction> {
        let model = self
            .model
            .as_ref()
            .ok_or(FleetError::NotTrained { model: "reliability" })?;
        let probability = model
            .encoding
            .check_codes(row)
            .and_then(|()| self.predict_probability(&row.to_vec()));
        self.resolve(probability)
    }

    /// Encode `query` with the persisted mapping and score it.
    pub fn score_query(&self, query: &ReliabilityQuery) -> Result<(FeatureRow, Prediction)> {
        let model = self
            .model
            .as_ref()
            .ok_or(FleetError::NotTrained { model: "reliability" })?;
        let codes = model
            .encoding
            .vehicle_code(&query.vehicle_id)
            .and_then(|v| Ok((v, model.encoding.origin_code(&query.origin_id)?)));
        let row = FeatureRow {
            vehicle_code: codes.as_ref().map_or(0, |(v, _)| *v),
            origin_code: codes.as_ref().map_or(0, |(_, o)| *o),
            distance: query.distance,
            demand: f64::from(query.demand),
            is_alpine: query.is_alpine,
            day_of_week: query.day_of_week,
            month: query.month,
        };
        let probability = codes.and_then(|_| self.predict_probability(&row.to_vec()));
        Ok((row, self.resolve(probability)?))
    }

    fn resolve(&self, probability: Result<f64>) -> Result<Prediction> {
        match probability {
            Ok(probability) => Ok(Prediction::Model { probability }),
            Err(err @ FleetError::NotTrained { .. }) => Err(err),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    fallback = self.config.fallback_probability,
                    "substituting default reliability probability"
                );
                Ok(Prediction::Fallback {
                    probability: self.config.fallback_probability,
                    reason: err.to_string(),
                })
            }
        }
    }
}

// ──────────────────── risk narrative ────────────────────

/// Coarse bucketing of on-time probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskBand {
    High,
    Medium,
    Low,
}

impl RiskBand {
    /// `< 0.60` high, `< 0.80` medium, otherwise low.
    #[must_use]
    pub fn classify(probability_on_time: f64) -> Self {
        if probability_on_time < 0.6 {
            Self::High
        } else if probability_on_time < 0.8 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

/// Risk band plus the operator-facing explanation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskNarrative {
    pub band: RiskBand,
    pub text: String,
}

pub const ALPINE_CLAUSE: &str = "Alpine route complexity is a primary risk factor. ";
pub const LONG_HAUL_CLAUSE: &str = "Long-haul distance increases vulnerability to traffic. ";
pub const WINTER_CLAUSE: &str = "Winter conditions may exacerbate delays. ";
pub const WEEKEND_CLAUSE: &str = "Weekend traffic patterns may impact arrival. ";

/// Narrative for one scored delivery.
#[must_use]
pub fn generate_risk_narrative(features: &FeatureRow, probability_on_time: f64) -> RiskNarrative {
    let band = RiskBand::classify(probability_on_time);
    let mut text = format!(
        "Reliability Score: {}%. Risk Level: {}. ",
        (probability_on_time * 100.0).trunc(),
        band.as_str()
    );
    match band {
        RiskBand::High => {
            text.push_str("Major delays likely. ");
            if features.is_alpine {
                text.push_str(ALPINE_CLAUSE);
            }
            if features.distance > 300.0 {
                text.push_str(LONG_HAUL_CLAUSE);
            }
            if matches!(features.month, 12 | 1 | 2) {
                text.push_str(WINTER_CLAUSE);
            }
            text.push_str("Recommendation: buffer lead time by 24h.");
        }
        RiskBand::Medium => {
            text.push_str("Monitor closely. ");
            if features.day_of_week >= 4 {
                text.push_str(WEEKEND_CLAUSE);
            }
            text.push_str("Ensure vehicle maintenance is up to date.");
        }
        RiskBand::Low => {
            text.push_str("Route is performing optimally. No immediate actions required.");
        }
    }
    RiskNarrative { band, text }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(is_alpine: bool, distance: f64, month: u32, day_of_week: u32) -> FeatureRow {
        FeatureRow {
            vehicle_code: 0,
            origin_code: 0,
            distance,
            demand: 150.0,
            is_alpine,
            day_of_week,
            month,
        }
    }

    #[test]
    fn band_thresholds() {
        assert_eq!(RiskBand::classify(0.599), RiskBand::High);
        assert_eq!(RiskBand::classify(0.6), RiskBand::Medium);
        assert_eq!(RiskBand::classify(0.799), RiskBand::Medium);
        assert_eq!(RiskBand::classify(0.8), RiskBand::Low);
    }

    #[test]
    fn high_risk_clauses_in_order() {
        let narrative = generate_risk_narrative(&row(true, 350.0, 1, 2), 0.55);
        assert_eq!(narrative.band, RiskBand::High);
        assert!(narrative.text.starts_with("Reliability Score: 55%. Risk Level: High. "));
        let alpine = narrative.text.find(ALPINE_CLAUSE).expect("alpine clause");
        let haul = narrative.text.find(LONG_HAUL_CLAUSE).expect("long-haul clause");
        let winter = narrative.text.find(WINTER_CLAUSE).expect("winter clause");
        assert!(alpine < haul && haul < winter);
        assert!(narrative.text.ends_with("buffer lead time by 24h."));
    }

    #[test]
    fn high_risk_without_factors_has_no_clauses() {
        let narrative = generate_risk_narrative(&row(false, 300.0, 6, 1), 0.2);
        assert!(!narrative.text.contains(ALPINE_CLAUSE));
        assert!(!narrative.text.contains(LONG_HAUL_CLAUSE));
        assert!(!narrative.text.contains(WINTER_CLAUSE));
    }

    #[test]
    fn medium_risk_mentions_weekend_from_friday() {
        let friday = generate_risk_narrative(&row(false, 10.0, 6, 4), 0.7);
        assert_eq!(friday.band, RiskBand::Medium);
        assert!(friday.text.contains("Monitor closely."));
        assert!(friday.text.contains(WEEKEND_CLAUSE));
        let thursday = generate_risk_narrative(&row(false, 10.0, 6, 3), 0.7);
        assert!(!thursday.text.contains(WEEKEND_CLAUSE));
    }

    #[test]
    fn low_risk_needs_no_action() {
        let narrative = generate_risk_narrative(&row(true, 500.0, 1, 6), 0.93);
        assert_eq!(narrative.band, RiskBand::Low);
        assert!(narrative.text.contains("No immediate actions required."));
        assert!(!narrative.text.contains(ALPINE_CLAUSE));
    }

    #[test]
    fn report_matches_hand_counts() {
        let truth = [1, 1, 1, 0, 0];
        let predicted = [1, 1, 0, 0, 1];
        let report = ClassificationReport::evaluate(&truth, &predicted);
        assert!((report.on_time.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((report.on_time.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((report.delayed.precision - 0.5).abs() < 1e-12);
        assert!((report.delayed.recall - 0.5).abs() < 1e-12);
        assert_eq!(report.on_time.support, 3);
        assert_eq!(report.weighted_avg.support, 5);
        let expected_weighted = (0.5 * 2.0 + (2.0 / 3.0) * 3.0) / 5.0;
        assert!((report.weighted_avg.f1 - expected_weighted).abs() < 1e-12);
    }

    #[test]
    fn missing_class_scores_zero_not_nan() {
        let report = ClassificationReport::evaluate(&[1, 1], &[1, 1]);
        assert_eq!(report.delayed.precision, 0.0);
        assert_eq!(report.delayed.f1, 0.0);
        assert_eq!(report.on_time.f1, 1.0);
    }

    fn single_fleet_matrix() -> FeatureMatrix {
        use crate::data::record::DeliveryRecord;
        use chrono::{Days, NaiveDate};

        let start = NaiveDate::from_ymd_opt(2024, 4, 1).expect("valid date");
        let records: Vec<DeliveryRecord> = (0..40u64)
            .map(|i| DeliveryRecord {
                id: format!("r{i}"),
                origin_id: "vienna-hub".to_string(),
                destination_id: "store".to_string(),
                vehicle_id: "truck-01".to_string(),
                demand: 100,
                distance: if i % 2 == 0 { 20.0 } else { 300.0 },
                total_cost: 250.0,
                delivery_date: start + Days::new(i),
                is_alpine: i % 2 == 1,
                has_overtime: i % 2 == 1,
                vehicle_type: "truck".to_string(),
                origin_category: "hub".to_string(),
                destination_category: "retail".to_string(),
                synthetic: false,
            })
            .collect();
        FeatureMatrix::from_records(&records).expect("matrix")
    }

    #[test]
    fn codes_outside_the_encoding_fall_back() {
        let mut scorer = ReliabilityScorer::new(ReliabilityConfig {
            n_trees: 5,
            ..ReliabilityConfig::default()
        });
        scorer.train(&single_fleet_matrix()).expect("train");

        let known = scorer.score_encoded(&row(false, 20.0, 4, 1)).expect("score");
        assert!(matches!(known, Prediction::Model { .. }));

        let unknown_vehicle = FeatureRow {
            vehicle_code: 2,
            ..row(false, 20.0, 4, 1)
        };
        match scorer.score_encoded(&unknown_vehicle).expect("score") {
            Prediction::Fallback {
                probability,
                reason,
            } => {
                assert!((probability - 0.85).abs() < f64::EPSILON);
                assert!(reason.contains("FLC-2005"), "{reason}");
            }
            Prediction::Model { .. } => panic!("vehicle code 2 was never encoded"),
        }

        let unknown_origin = FeatureRow {
            origin_code: 1,
            ..row(false, 20.0, 4, 1)
        };
        assert!(scorer.score_encoded(&unknown_origin).expect("score").is_fallback());
    }

    #[test]
    fn untrained_scorer_refuses_to_predict() {
        let scorer = ReliabilityScorer::new(ReliabilityConfig::default());
        let err = scorer.predict_probability(&[0.0; 7]).expect_err("untrained");
        assert_eq!(err.code(), "FLC-2003");
        assert!(scorer.predict_or_fallback(&[0.0; 7]).is_err());
        assert!(scorer.score_encoded(&row(false, 1.0, 1, 1)).is_err());
    }
}
