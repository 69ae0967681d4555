//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use chrono::{Days, NaiveDate};
use fleetcast::data::record::DeliveryRecord;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const VEHICLES: [&str; 3] = ["truck-01", "truck-02", "van-07"];
pub const ORIGINS: [&str; 3] = ["graz-hub", "innsbruck-depot", "vienna-hub"];

pub fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date")
}

pub fn record(id: &str, on: NaiveDate, demand: u32) -> DeliveryRecord {
    DeliveryRecord {
        id: id.to_string(),
        origin_id: ORIGINS[0].to_string(),
        destination_id: "store-1".to_string(),
        vehicle_id: VEHICLES[0].to_string(),
        demand,
        distance: 25.0,
        total_cost: f64::from(demand) * 3.0,
        delivery_date: on,
        is_alpine: false,
        has_overtime: false,
        vehicle_type: "truck".to_string(),
        origin_category: "hub".to_string(),
        destination_category: "retail".to_string(),
        synthetic: false,
    }
}

/// `days` consecutive days of deliveries, `per_day` each, starting at
/// [`start_date`]. Alpine and long routes run late more often so the
/// classifier has signal to learn.
pub fn daily_history(days: u32, per_day: u32, seed: u64) -> Vec<DeliveryRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = Vec::new();
    for day in 0..days {
        let on = start_date() + Days::new(u64::from(day));
        for slot in 0..per_day {
            let origin = rng.random_range(0..ORIGINS.len());
            let vehicle = rng.random_range(0..VEHICLES.len());
            let is_alpine = origin == 1;
            let distance = if is_alpine {
                rng.random_range(150.0..400.0)
            } else {
                rng.random_range(5.0..80.0)
            };
            let demand = rng.random_range(60..140);
            let late_odds = if is_alpine { 0.6 } else { 0.1 };
            records.push(DeliveryRecord {
                id: format!("d-{day}-{slot}"),
                origin_id: ORIGINS[origin].to_string(),
                destination_id: format!("store-{}", slot % 4),
                vehicle_id: VEHICLES[vehicle].to_string(),
                demand,
                distance,
                total_cost: f64::from(demand).mul_add(2.5, distance * 1.2),
                delivery_date: on,
                is_alpine,
                has_overtime: rng.random_bool(late_odds),
                vehicle_type: if vehicle == 2 { "van" } else { "truck" }.to_string(),
                origin_category: "hub".to_string(),
                destination_category: "retail".to_string(),
                synthetic: false,
            });
        }
    }
    records
}

pub fn write_records(dir: &Path, records: &[DeliveryRecord]) -> PathBuf {
    let path = dir.join("deliveries.json");
    let raw = serde_json::to_string(records).expect("serialize records");
    fs::write(&path, raw).expect("write records");
    path
}

pub struct CliResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

/// Run the `fleetcast` binary and keep a per-case transcript for debugging.
pub fn run_cli_case(case_name: &str, args: &[&str]) -> CliResult {
    let output = Command::new(env!("CARGO_BIN_EXE_fleetcast"))
        .args(args)
        .env("FLEETCAST_LOG", "warn")
        .output()
        .expect("spawn fleetcast");
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    let log_dir = std::env::temp_dir().join("fleetcast-cli-cases");
    fs::create_dir_all(&log_dir).expect("create log dir");
    let log_path = log_dir.join(format!("{case_name}.log"));
    let transcript = format!(
        "args: {args:?}\nstatus: {}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}\n",
        output.status
    );
    fs::write(&log_path, transcript).expect("write case log");

    CliResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}
