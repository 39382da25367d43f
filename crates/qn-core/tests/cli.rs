//! CLI E2E tests: offline commands, request guards and exit codes.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;

/// `qn` isolated from any user or environment configuration.
fn qn(config_home: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("qn");
    cmd.timeout(Duration::from_secs(120))
        .env_remove("QN_CONFIG")
        .env("XDG_CONFIG_HOME", config_home)
        .env("RUST_LOG", "warn");
    cmd
}

fn stderr_json(output: &[u8]) -> Value {
    let text = String::from_utf8_lossy(output);
    let line = text
        .lines()
        .rev()
        .find(|l| l.trim_start().starts_with('{'))
        .expect("JSON error line on stderr");
    serde_json::from_str(line).expect("parse error JSON")
}

fn write_catalog(path: &Path) {
    let base = Utc.with_ymd_and_hms(2020, 1, 1, 6, 0, 0).unwrap();
    let features: Vec<Value> = (0..73)
        .map(|i| {
            let t = base + ChronoDuration::days(10 * i);
            json!({
                "type": "Feature",
                "properties": { "mag": 5.0 + (i % 3) as f64 * 0.2, "time": t.timestamp_millis() },
                "geometry": { "type": "Point", "coordinates": [0.5, 0.5, 10.0] }
            })
        })
        .collect();
    let collection = json!({ "type": "FeatureCollection", "features": features });
    fs::write(path, serde_json::to_string(&collection).unwrap()).unwrap();
}

#[test]
fn presets_lists_regions() {
    let dir = tempdir().unwrap();
    let out = qn(dir.path())
        .arg("presets")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let presets: Value = serde_json::from_slice(&out).expect("parse JSON");
    let names: Vec<&str> = presets
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|p| p["name"].as_str())
        .collect();
    assert!(names.contains(&"southeast_asia"));
    assert!(names.contains(&"california"));
}

#[test]
fn schema_describes_artifact() {
    let dir = tempdir().unwrap();
    qn(dir.path())
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("etas_params"))
        .stdout(predicate::str::contains("calibration"));
}

#[test]
fn oversized_grid_exits_with_invalid_input() {
    let dir = tempdir().unwrap();
    let assert = qn(dir.path())
        .args(["predict", "--placeholder", "--cell-deg", "0.1"])
        .assert()
        .code(11);
    let body = stderr_json(&assert.get_output().stderr);
    assert_eq!(body["status"], 400);
    assert_eq!(body["suggested_cell_deg"], 1.0);
}

#[test]
fn malformed_bbox_is_a_usage_error() {
    let dir = tempdir().unwrap();
    qn(dir.path())
        .args(["predict", "--placeholder", "--bbox", "10,0,5"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn missing_model_exits_with_config_error() {
    let dir = tempdir().unwrap();
    let model = dir.path().join("absent.json");
    qn(dir.path())
        .args(["predict", "--cell-deg", "2", "--model"])
        .arg(&model)
        .assert()
        .code(10);
}

#[test]
fn unreadable_service_config_exits_with_config_error() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("config.json");
    fs::write(&cfg, "{ not json").unwrap();
    qn(dir.path())
        .arg("--config")
        .arg(&cfg)
        .args(["predict", "--placeholder", "--cell-deg", "2"])
        .assert()
        .code(10);
}

#[test]
fn offline_train_then_predict() {
    let dir = tempdir().unwrap();
    let catalog = dir.path().join("catalog.geojson");
    write_catalog(&catalog);
    let training = dir.path().join("train.json");
    fs::write(
        &training,
        json!({
            "bbox": [0.0, 0.0, 2.0, 2.0],
            "cell_deg": 0.5,
            "label_magnitude": 4.5,
            "horizons": [7],
            "train_start": "2020-01-01",
            "train_end": "2022-01-01",
            "holdout_days": 0,
            "completeness_magnitude": 3.0
        })
        .to_string(),
    )
    .unwrap();
    let models = dir.path().join("models");
    fs::create_dir_all(&models).unwrap();

    let out = qn(dir.path())
        .arg("train")
        .arg("--training-config")
        .arg(&training)
        .arg("--catalog-file")
        .arg(&catalog)
        .arg("--out")
        .arg(&models)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let summary: Value = serde_json::from_slice(&out).expect("parse JSON");
    assert!(summary["dataset"]["train_samples"].as_u64().unwrap() > 0);
    assert!(models.join("nowcast.json").is_file());
    assert!(models.join("nowcast_eval.json").is_file());

    let out = qn(dir.path())
        .arg("predict")
        .arg("--model")
        .arg(&models)
        .arg("--catalog-file")
        .arg(&catalog)
        .args(["--min-probability", "0"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let response: Value = serde_json::from_slice(&out).expect("parse JSON");
    assert_eq!(response["type"], "nowcast");
    assert_eq!(response["total_cells"], 16);
    assert_eq!(response["cellDeg"], 0.5);
}
