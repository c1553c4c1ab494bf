//! CLI integration tests

use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const HEADER: &str = "obid;kaufpreis;wohnflaeche;zimmeranzahl;schlafzimmer;badezimmer;aufzug;balkon;denkmalobjekt;parkplatz;energieeffizienzklasse;duplicateid;adat;edat";

/// Offers priced exactly by 10000 + 1000*area + 500*rooms + 2000*parking - 1000*energy
fn write_offers(dir: &Path) -> std::path::PathBuf {
    let mut lines = vec![HEADER.to_string()];
    for i in 0..40u32 {
        let area = 30 + (i * 17) % 90;
        let rooms = 1.0 + f64::from((i * 5) % 9) * 0.5;
        let parking = (i / 3) % 2;
        let energy = 1 + (i * 3) % 8;
        let price = 10_000.0 + 1000.0 * f64::from(area) + 500.0 * rooms
            + 2000.0 * f64::from(parking)
            - 1000.0 * f64::from(energy);
        lines.push(format!(
            "{};{};{},0;{};{};{};{};{};{};{};{};-9;2021m{:02};2022m01",
            i,
            price,
            area,
            rooms.to_string().replace('.', ","),
            1 + (i * 7) % 4,
            1 + (i * 11) % 3,
            i % 2,
            (i / 2) % 2,
            u32::from((i * i) % 3 == 0),
            parking,
            energy,
            1 + i % 12
        ));
    }
    let path = dir.join("offers.csv");
    std::fs::write(&path, lines.join("\n")).unwrap();
    path
}

fn ape(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ape"))
        .args(args)
        .current_dir(dir)
        .env_clear()
        .env("APE_STORE_ENDPOINT", format!("file://{}", dir.join("store").display()))
        .env("APE_ARTIFACT_PATH", dir.join("model.json"))
        .output()
        .expect("Failed to execute command")
}

fn json_stdout(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

const QUOTE: [&str; 11] = [
    "--living-area",
    "75",
    "--rooms",
    "3",
    "--bedrooms",
    "1",
    "--bathrooms",
    "1",
    "--parking",
    "--energy-class",
    "D",
];

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let dir = TempDir::new().unwrap();
    let output = ape(dir.path(), &["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Apartment Price Estimator"), "Should show app name");
    for command in ["train", "estimate", "feedback", "promote", "summary"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let dir = TempDir::new().unwrap();
    let output = ape(dir.path(), &["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("ape"), "Should show binary name");
}

#[test]
fn test_summary_json() {
    let dir = TempDir::new().unwrap();
    let data = write_offers(dir.path());

    let summary = json_stdout(&ape(
        dir.path(),
        &["summary", "--data", data.to_str().unwrap(), "--format", "json"],
    ));
    assert_eq!(summary["offers"], 40);
    assert_eq!(summary["columns"][0]["column"], "price");
}

#[test]
fn test_train_then_estimate_from_artifact() {
    let dir = TempDir::new().unwrap();
    let data = write_offers(dir.path());

    let report = json_stdout(&ape(
        dir.path(),
        &[
            "train",
            "--data",
            data.to_str().unwrap(),
            "--no-publish",
            "--format",
            "json",
        ],
    ));
    assert_eq!(report["training_rows"], 40);
    assert!(report.get("published_version").is_none());
    assert!(dir.path().join("model.json").exists());

    let model_file = dir.path().join("model.json");
    let mut args = vec!["estimate", "--model-file", model_file.to_str().unwrap(), "-f", "json"];
    args.extend(QUOTE);
    let quote = json_stdout(&ape(dir.path(), &args));
    assert_eq!(quote["price"], 84_500);
    assert_eq!(quote["formatted"], "84 500 €");
}

#[test]
fn test_estimate_rejects_invalid_rooms() {
    let dir = TempDir::new().unwrap();
    let output = ape(
        dir.path(),
        &[
            "estimate",
            "--living-area",
            "75",
            "--rooms",
            "2.25",
            "--bedrooms",
            "1",
            "--bathrooms",
            "1",
            "--energy-class",
            "D",
        ],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("room_count"));
}

#[test]
fn test_feedback_submit_and_list() {
    let dir = TempDir::new().unwrap();

    let mut args = vec!["feedback", "--price", "95000", "--format", "json"];
    args.extend(QUOTE);
    let submitted = json_stdout(&ape(dir.path(), &args));
    assert_eq!(submitted["outcome"], "appended");

    let mut args = vec!["feedback", "--price", "-5", "--format", "json"];
    args.extend(QUOTE);
    let discarded = json_stdout(&ape(dir.path(), &args));
    assert_eq!(discarded["outcome"], "discarded");

    let records = json_stdout(&ape(dir.path(), &["feedback", "list", "--format", "json"]));
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["price"], 95_000);
}

#[test]
fn test_feedback_requires_price() {
    let dir = TempDir::new().unwrap();
    let output = ape(dir.path(), &["feedback", "--living-area", "75"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--price"));
}

#[test]
fn test_flush_without_outbox_fails() {
    let dir = TempDir::new().unwrap();
    let output = ape(dir.path(), &["feedback", "flush"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("APE_OUTBOX_PATH"));
}
