//! Tests for CLI argument parsing and the binary

use assert_cmd::Command;
use clap::Parser;
use predicates::prelude::*;
use scorephi::cli::Cli;
use scorephi::pipeline::{BinningMethod, BucketType, Metric};
use std::path::PathBuf;
use tempfile::TempDir;

mod common;

#[test]
fn test_cli_default_values() {
    let cli = Cli::parse_from(["scorephi", "-i", "data.csv", "-t", "bad"]);

    assert_eq!(cli.bin_num, 10);
    assert_eq!(cli.bin_type, BucketType::Freq);
    assert_eq!(cli.points0, 600.0);
    assert_eq!(cli.pdo, 50.0);
    assert!((cli.odds0 - 1.0 / 19.0).abs() < 1e-15);
    assert!(!cli.basepoints_eq0);
    assert_eq!(cli.binning_method, BinningMethod::Cart);
    assert_eq!(cli.output_dir, PathBuf::from("."));
    assert_eq!(cli.infer_schema_length, 10000);
    assert_eq!(cli.metrics, Metric::ALL.to_vec());
    assert!(cli.seed.is_none());
}

#[test]
fn test_cli_scaling_flags() {
    let cli = Cli::parse_from([
        "scorephi", "-i", "data.csv", "-t", "bad", "--points0", "500", "--pdo", "20",
        "--odds0", "0.02", "--basepoints-eq0",
    ]);
    let scaling = cli.report_config().scaling;
    assert_eq!(scaling.points0, 500.0);
    assert_eq!(scaling.pdo, 20.0);
    assert_eq!(scaling.odds0, 0.02);
    assert!(scaling.basepoints_eq0);
}

#[test]
fn test_cli_rejects_unknown_metric() {
    let result = Cli::try_parse_from([
        "scorephi", "-i", "data.csv", "-t", "bad", "--metrics", "auc,brier",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_cli_requires_target() {
    assert!(Cli::try_parse_from(["scorephi", "-i", "data.csv"]).is_err());
}

#[test]
fn test_binary_help() {
    Command::cargo_bin("scorephi")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--target"))
        .stdout(predicate::str::contains("--bin-num"));
}

#[test]
fn test_binary_reports_missing_target_column() {
    let mut df = common::create_credit_dataframe(50, 1, 0.0);
    let (_temp_dir, csv_path) = common::create_temp_csv(&mut df);

    Command::cargo_bin("scorephi")
        .unwrap()
        .args(["-q", "-t", "default_flag", "-i"])
        .arg(&csv_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("default_flag"));
}

#[test]
fn test_binary_end_to_end() {
    let data_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let dev = common::write_csv(
        data_dir.path(),
        "dev.csv",
        &mut common::create_credit_dataframe(1200, 3, 0.0),
    );
    let oot = common::write_csv(
        data_dir.path(),
        "oot.csv",
        &mut common::create_credit_dataframe(600, 4, 5.0),
    );

    let output = Command::cargo_bin("scorephi")
        .unwrap()
        .args(["-q", "-t", "bad", "--name", "cli_run", "-o"])
        .arg(out_dir.path())
        .arg("-i")
        .arg(format!("dev={}", dev.display()))
        .arg("-i")
        .arg(format!("oot={}", oot.display()))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let artifact = PathBuf::from(String::from_utf8(output).unwrap().trim());
    assert!(artifact.exists());
    assert!(artifact.starts_with(out_dir.path()));

    let manifest = common::bundle_manifest(&artifact);
    let sheets = common::manifest_sheets(&manifest);
    assert!(sheets.contains(&"stability".to_string()));
}
