//! Shared test utilities and fixture generators

#![allow(dead_code)]

use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const GRADES: [&str; 5] = ["A", "B", "C", "D", "E"];

/// Create a synthetic credit table with a known risk structure
///
/// Columns:
/// - `age`: numeric, about 3% missing, older applicants are safer
/// - `income`: numeric, higher income is safer
/// - `grade`: categorical A-E, worse grades are riskier
/// - `noise`: numeric, unrelated to the label
/// - `bad`: binary label (1 = bad)
///
/// `shift` moves the age distribution to simulate a drifted population.
pub fn create_credit_dataframe(rows: usize, seed: u64, shift: f64) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut age: Vec<Option<f64>> = Vec::with_capacity(rows);
    let mut income: Vec<f64> = Vec::with_capacity(rows);
    let mut grade: Vec<&str> = Vec::with_capacity(rows);
    let mut noise: Vec<f64> = Vec::with_capacity(rows);
    let mut bad: Vec<i32> = Vec::with_capacity(rows);

    for _ in 0..rows {
        let a = (rng.gen_range(18.0..75.0f64) + shift).round();
        let inc = (rng.gen_range(10.0..200.0f64) * 10.0).round() / 10.0;
        let g = rng.gen_range(0..GRADES.len());

        let eta = -1.8 - 0.04 * (a - 45.0) - 0.012 * (inc - 100.0) + 0.45 * g as f64;
        let p = 1.0 / (1.0 + (-eta).exp());

        age.push(if rng.gen::<f64>() < 0.03 { None } else { Some(a) });
        income.push(inc);
        grade.push(GRADES[g]);
        noise.push(rng.gen::<f64>());
        bad.push(i32::from(rng.gen::<f64>() < p));
    }

    df! {
        "age" => age,
        "income" => income,
        "grade" => grade,
        "noise" => noise,
        "bad" => bad,
    }
    .unwrap()
}

/// Create a minimal two-feature table where `x` separates the classes
pub fn create_binary_target_dataframe() -> DataFrame {
    df! {
        "target" => [0i32, 0, 0, 0, 0, 1, 1, 1, 1, 1,
                     0, 0, 0, 0, 0, 1, 1, 1, 1, 1],
        "x" => [1.0f64, 1.0, 1.0, 2.0, 2.0, 8.0, 9.0, 2.0, 10.0, 10.0,
                1.5, 1.5, 9.0, 2.5, 3.0, 7.0, 8.0, 8.5, 9.0, 9.5],
        "z" => [5.0f64, 8.0, 2.0, 9.0, 1.0, 3.0, 7.0, 4.0, 6.0, 0.0,
                4.0, 6.0, 8.0, 1.0, 9.0, 2.0, 5.0, 7.0, 3.0, 0.0],
    }
    .unwrap()
}

/// Create a temporary directory with a test CSV file
pub fn create_temp_csv(df: &mut DataFrame) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let csv_path = write_csv(temp_dir.path(), "test_data.csv", df);
    (temp_dir, csv_path)
}

/// Create a temporary directory with a test Parquet file
pub fn create_temp_parquet(df: &mut DataFrame) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let parquet_path = temp_dir.path().join("test_data.parquet");

    let file = std::fs::File::create(&parquet_path).unwrap();
    ParquetWriter::new(file).finish(df).unwrap();

    (temp_dir, parquet_path)
}

/// Write a CSV file into an existing directory
pub fn write_csv(dir: &Path, name: &str, df: &mut DataFrame) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();
    path
}

/// Names of every entry in a report bundle
pub fn bundle_entries(path: &Path) -> Vec<String> {
    let file = std::fs::File::open(path).unwrap();
    let archive = ::zip::ZipArchive::new(file).unwrap();
    archive.file_names().map(|n| n.to_string()).collect()
}

/// Parsed manifest of a report bundle
pub fn bundle_manifest(path: &Path) -> serde_json::Value {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = ::zip::ZipArchive::new(file).unwrap();
    let mut entry = archive.by_name("manifest.json").unwrap();
    let mut text = String::new();
    entry.read_to_string(&mut text).unwrap();
    serde_json::from_str(&text).unwrap()
}

/// Sheet names in manifest order
pub fn manifest_sheets(manifest: &serde_json::Value) -> Vec<String> {
    manifest["sheets"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap().to_string())
        .collect()
}

/// Assert that a DataFrame has expected shape
pub fn assert_shape(df: &DataFrame, expected_rows: usize, expected_cols: usize) {
    let (rows, cols) = df.shape();
    assert_eq!(rows, expected_rows, "Row count mismatch: expected {}, got {}", expected_rows, rows);
    assert_eq!(cols, expected_cols, "Column count mismatch: expected {}, got {}", expected_cols, cols);
}

/// Assert that a DataFrame contains specific columns
pub fn assert_has_columns(df: &DataFrame, expected_cols: &[&str]) {
    let actual_cols: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    for col in expected_cols {
        assert!(
            actual_cols.contains(&col.to_string()),
            "Missing expected column: '{}'. Actual columns: {:?}",
            col,
            actual_cols
        );
    }
}
