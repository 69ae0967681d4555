//! End-to-end pipeline scenarios: augmentation, forecasting, reliability
//! scoring and the service context built on top of them.

mod common;

use chrono::Days;
use fleetcast::core::config::{Config, ReliabilityConfig};
use fleetcast::data::aggregate::{DailySeries, FeatureRow, Metric};
use fleetcast::data::augment::{HistoryAugmentor, SYNTHETIC_ID_PREFIX};
use fleetcast::data::record::{date_range, span_days};
use fleetcast::data::store::MemoryRecordStore;
use fleetcast::model::arima::ArimaOrder;
use fleetcast::model::forecaster::{Forecaster, Trend, generate_insight};
use fleetcast::model::reliability::{
    ALPINE_CLAUSE, LONG_HAUL_CLAUSE, Prediction, ReliabilityQuery, RiskBand, WINTER_CLAUSE,
    generate_risk_narrative,
};
use fleetcast::service::ServiceContext;

fn quick_config() -> Config {
    Config {
        reliability: ReliabilityConfig {
            n_trees: 25,
            ..ReliabilityConfig::default()
        },
        ..Config::default()
    }
}

#[test]
fn long_history_is_not_augmented() {
    let records = common::daily_history(400, 2, 11);
    let augmented = HistoryAugmentor::seeded(42).augment(&records, 365);
    assert_eq!(augmented.len(), records.len());
    assert_eq!(date_range(&augmented), date_range(&records));
    assert!(augmented.iter().all(|r| !r.synthetic));
}

#[test]
fn thirty_days_are_padded_to_a_full_year() {
    let records = common::daily_history(30, 10, 5);
    let augmented = HistoryAugmentor::seeded(42).augment(&records, 365);
    assert!(span_days(&augmented).expect("non-empty") >= 365);

    let synthetic: Vec<_> = augmented.iter().filter(|r| r.synthetic).collect();
    assert!(
        synthetic.len() >= 2680,
        "only {} synthetic records",
        synthetic.len()
    );
    assert!(synthetic.iter().all(|r| r.id.starts_with(SYNTHETIC_ID_PREFIX)));
    let (_, latest) = date_range(&augmented).expect("non-empty");
    assert_eq!(latest, common::start_date() + Days::new(29));
}

#[test]
fn constant_demand_forecasts_flat_and_stable() {
    let records: Vec<_> = (0..60u64)
        .map(|day| common::record(&format!("c{day}"), common::start_date() + Days::new(day), 5))
        .collect();
    let series = DailySeries::from_records(&records, Metric::Demand).expect("series");
    let mut forecaster = Forecaster::new(Metric::Demand, 0.95);
    assert!(forecaster.train(&series, ArimaOrder::new(5, 1, 0)));

    let forecast = forecaster.forecast(7).expect("forecast");
    assert_eq!(forecast.len(), 7);
    for point in &forecast.points {
        assert!((point.mean - 5.0).abs() < 1e-6, "mean {} drifted", point.mean);
    }
    let insight = generate_insight(series.values(), &forecast, "Demand");
    assert_eq!(insight.trend, Trend::Stable);
    assert!(insight.text.contains("remain stable"));
}

#[test]
fn winter_alpine_long_haul_is_high_risk() {
    let features = FeatureRow {
        vehicle_code: 0,
        origin_code: 0,
        distance: 350.0,
        demand: 150.0,
        is_alpine: true,
        day_of_week: 2,
        month: 1,
    };
    let narrative = generate_risk_narrative(&features, 0.55);
    assert_eq!(narrative.band, RiskBand::High);
    let alpine = narrative.text.find(ALPINE_CLAUSE).expect("alpine clause");
    let long_haul = narrative.text.find(LONG_HAUL_CLAUSE).expect("long-haul clause");
    let winter = narrative.text.find(WINTER_CLAUSE).expect("winter clause");
    assert!(alpine < long_haul);
    assert!(long_haul < winter);
}

#[test]
fn trained_context_serves_every_operation() {
    let records = common::daily_history(400, 4, 21);
    let store = MemoryRecordStore::new(records.clone());
    let context = ServiceContext::bootstrap(&store, &quick_config()).expect("bootstrap");

    let health = context.health();
    assert!(health.models_loaded, "issues: {:?}", health.startup_issues);
    assert_eq!(health.total_records, records.len());
    assert_eq!(health.synthetic_records, 0);
    let accuracy = health.reliability_accuracy.expect("accuracy");
    assert!((0.0..=1.0).contains(&accuracy));

    let (_, last) = date_range(&records).expect("non-empty");
    for metric in [Metric::Demand, Metric::TotalCost] {
        let response = context.forecast(metric, 14).expect("forecast");
        assert_eq!(response.forecast.len(), 14);
        for (offset, entry) in (1u64..).zip(&response.forecast) {
            let expected = (last + Days::new(offset)).format("%Y-%m-%d").to_string();
            assert_eq!(entry.date, expected);
            assert!(entry.value >= 0.0);
            assert!(entry.lower >= 0.0);
            assert!(entry.upper >= entry.lower);
        }
        assert!(response.insight.contains("over the next 14 days"));
    }
    assert_eq!(
        context.forecast(Metric::Demand, 1).expect("forecast").metric,
        "Demand (Cases)"
    );
    assert_eq!(
        context.forecast(Metric::TotalCost, 1).expect("forecast").metric,
        "Spend (EUR)"
    );

    let dashboard = context
        .dashboard(common::start_date() + Days::new(10))
        .expect("dashboard");
    assert_eq!(dashboard.len(), 5);
    assert!(dashboard.windows(2).all(|w| w[0].score <= w[1].score));
    assert!(dashboard.iter().all(|e| (0.0..=100.0).contains(&e.score)));
    assert!(dashboard.iter().all(|e| !e.fallback));

    let perf = context.performance();
    assert_eq!(perf.data_points, records.len());
    assert_eq!(Some(perf.arima_demand_aic), health.demand_aic);
}

#[test]
fn dashboard_flags_routes_outside_a_small_fleet() {
    let records: Vec<_> = (0..400u64)
        .map(|day| {
            let mut record = common::record(
                &format!("solo-{day}"),
                common::start_date() + Days::new(day),
                80 + (day % 7) as u32,
            );
            record.has_overtime = day % 5 == 0;
            record
        })
        .collect();
    let store = MemoryRecordStore::new(records);
    let context = ServiceContext::bootstrap(&store, &quick_config()).expect("bootstrap");
    let encoding = context
        .reliability()
        .model()
        .expect("reliability trained")
        .encoding();
    assert_eq!(encoding.vehicles.len(), 1);
    assert_eq!(encoding.origins.len(), 1);

    let dashboard = context
        .dashboard(common::start_date() + Days::new(3))
        .expect("dashboard");
    assert_eq!(dashboard.len(), 5);
    let flagged: Vec<&str> = dashboard
        .iter()
        .filter(|e| e.fallback)
        .map(|e| e.route)
        .collect();
    assert_eq!(flagged.len(), 3, "flagged: {flagged:?}");
    for route in [
        "Graz Inner City (Van)",
        "Innsbruck -> Munich (Long Haul)",
        "Klagenfurt -> Villach",
    ] {
        assert!(flagged.contains(&route), "{route} should be a fallback");
    }
    for entry in dashboard.iter().filter(|e| e.fallback) {
        assert!((entry.score - 85.0).abs() < 1e-9);
    }
}

#[test]
fn unknown_vehicle_is_an_explicit_fallback() {
    let store = MemoryRecordStore::new(common::daily_history(400, 3, 8));
    let context = ServiceContext::bootstrap(&store, &quick_config()).expect("bootstrap");

    let mut query = ReliabilityQuery {
        vehicle_id: common::VEHICLES[1].to_string(),
        origin_id: common::ORIGINS[1].to_string(),
        distance: 320.0,
        demand: 100,
        is_alpine: true,
        month: 1,
        day_of_week: 5,
    };
    let known = context.score_route(&query).expect("score");
    assert!(matches!(known.prediction, Prediction::Model { .. }));
    assert!((0.0..=1.0).contains(&known.prediction.probability()));

    query.vehicle_id = "ghost-99".to_string();
    let unknown = context.score_route(&query).expect("score");
    match &unknown.prediction {
        Prediction::Fallback {
            probability,
            reason,
        } => {
            assert!((probability - 0.85).abs() < f64::EPSILON);
            assert!(reason.contains("FLC-2005"));
        }
        Prediction::Model { .. } => panic!("unknown vehicle must not be scored by the model"),
    }
    assert_eq!(unknown.narrative.band, RiskBand::Low);
}

#[test]
fn reliability_probabilities_stay_in_bounds() {
    let store = MemoryRecordStore::new(common::daily_history(120, 5, 3));
    let context = ServiceContext::bootstrap(&store, &quick_config()).expect("bootstrap");
    let scorer = context.reliability();
    for distance in [0.0, 10.0, 150.0, 400.0, 10_000.0] {
        for alpine in [0.0, 1.0] {
            let row = [2.0, 1.0, distance, 100.0, alpine, 6.0, 12.0];
            let p = scorer.predict_probability(&row).expect("probability");
            assert!((0.0..=1.0).contains(&p));
        }
    }
    let err = scorer.predict_probability(&[1.0, 2.0]).expect_err("arity");
    assert_eq!(err.code(), "FLC-2004");
    let fallback = scorer.predict_or_fallback(&[1.0, 2.0]).expect("fallback");
    assert!(fallback.is_fallback());
}
