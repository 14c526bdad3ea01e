//! Command-line argument definitions using clap

use clap::Parser;
use std::path::PathBuf;

use crate::pipeline::config::{
    BinningMethod, BucketType, CurveKind, Metric, ReportConfig, ScalingConfig,
};
use crate::pipeline::loader::InputSpec;
use crate::pipeline::target::PositiveClass;

/// Score-phi - Build a credit scorecard model report from labeled datasets
#[derive(Parser, Debug)]
#[command(name = "scorephi")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Input table (CSV or Parquet), as `name=path` or a bare path.
    /// Repeat for several datasets; the first is the reference (training) set.
    /// A single unnamed input is split into train/test when --seed is given.
    #[arg(short, long = "input", required = true)]
    pub inputs: Vec<InputSpec>,

    /// Binary label column
    #[arg(short, long)]
    pub target: String,

    /// Feature columns (comma-separated). Defaults to every non-target column.
    #[arg(long, value_delimiter = ',')]
    pub features: Vec<String>,

    /// Label values counted as bad (comma-separated). Defaults to bad,1.
    #[arg(long, value_delimiter = ',')]
    pub positive: Vec<String>,

    /// JSON file of user-supplied breaks per feature
    #[arg(long)]
    pub breaks: Option<PathBuf>,

    /// JSON file of special values per feature
    #[arg(long)]
    pub special_values: Option<PathBuf>,

    /// Seed for the train/test split of a single input (no split without it)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Train share when splitting a single input
    #[arg(long, default_value = "0.7", value_parser = validate_split_ratio)]
    pub split_ratio: f64,

    /// Directory the report artifact is written to
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Report name; a timestamp is appended
    #[arg(long, default_value = "scorecard_report")]
    pub name: String,

    /// Number of score buckets for the gains and stability tables
    #[arg(long, default_value = "10")]
    pub bin_num: usize,

    /// Score bucketing: "freq" (equal frequency) or "width" (equal width)
    #[arg(long, default_value = "freq")]
    pub bin_type: BucketType,

    /// Metrics to report (comma-separated): mse, rmse, logloss, r2, ks, auc, gini
    #[arg(long, value_delimiter = ',', default_value = "mse,rmse,logloss,r2,ks,auc,gini")]
    pub metrics: Vec<Metric>,

    /// Curves to plot (comma-separated): ks, roc, lift, gain, pr, f1, density
    #[arg(long, value_delimiter = ',', default_value = "ks,roc")]
    pub plots: Vec<CurveKind>,

    /// Bad:good odds at the anchor score
    #[arg(long, default_value_t = 1.0 / 19.0)]
    pub odds0: f64,

    /// Score at the anchor odds
    #[arg(long, default_value = "600")]
    pub points0: f64,

    /// Points to double the odds
    #[arg(long, default_value = "50")]
    pub pdo: f64,

    /// Spread the base points over the features so the card's base is zero
    #[arg(long, default_value = "false")]
    pub basepoints_eq0: bool,

    /// Maximum bins per feature for automatic binning
    #[arg(long, default_value = "8")]
    pub woe_bins: usize,

    /// Pre-binning for automatic binning: "cart" (default) or "quantile"
    #[arg(long, default_value = "cart")]
    pub binning_method: BinningMethod,

    /// Categories with fewer samples share one fallback group
    #[arg(long, default_value = "5")]
    pub min_category_samples: usize,

    /// Number of rows to use for schema inference (CSV only).
    /// Use 0 for full table scan (very slow for large files).
    #[arg(long, default_value = "10000")]
    pub infer_schema_length: usize,

    /// Suppress progress output
    #[arg(short, long, default_value = "false")]
    pub quiet: bool,
}

impl Cli {
    /// Run configuration from the flags
    pub fn report_config(&self) -> ReportConfig {
        ReportConfig {
            binomial_metric: self.metrics.clone(),
            show_plot: self.plots.clone(),
            bin_num: self.bin_num,
            bin_type: self.bin_type,
            scaling: ScalingConfig {
                odds0: self.odds0,
                points0: self.points0,
                pdo: self.pdo,
                basepoints_eq0: self.basepoints_eq0,
            },
            split_ratio: self.split_ratio,
            woe_bins: self.woe_bins,
            binning_method: self.binning_method,
            min_category_samples: self.min_category_samples,
        }
    }

    /// Explicit feature list, if any
    pub fn feature_list(&self) -> Option<Vec<String>> {
        let features: Vec<String> = self
            .features
            .iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();
        (!features.is_empty()).then_some(features)
    }

    pub fn positive_class(&self) -> PositiveClass {
        if self.positive.is_empty() {
            PositiveClass::default()
        } else {
            PositiveClass::new(&self.positive)
        }
    }

    /// Dataset names shown in the configuration card
    pub fn input_labels(&self) -> Vec<String> {
        self.inputs
            .iter()
            .map(|spec| format!("{} ({})", spec.dataset_name(), spec.path.display()))
            .collect()
    }
}

/// Validator for split_ratio parameter
fn validate_split_ratio(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;

    if value > 0.0 && value < 1.0 {
        Ok(value)
    } else {
        Err(format!(
            "split_ratio must be strictly between 0.0 and 1.0, got {}",
            value
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_report_config() {
        let cli = Cli::parse_from(["scorephi", "-i", "data.csv", "-t", "bad"]);
        let config = cli.report_config();
        assert_eq!(config, ReportConfig::default());
        assert!(cli.feature_list().is_none());
    }

    #[test]
    fn test_named_inputs_keep_order() {
        let cli = Cli::parse_from([
            "scorephi", "-i", "dev=a.csv", "-i", "oot=b.parquet", "-t", "bad",
        ]);
        let names: Vec<String> = cli.inputs.iter().map(|s| s.dataset_name()).collect();
        assert_eq!(names, vec!["dev", "oot"]);
    }

    #[test]
    fn test_list_flags_split_on_commas() {
        let cli = Cli::parse_from([
            "scorephi", "-i", "d.csv", "-t", "y", "--features", "age,income",
            "--metrics", "auc,ks", "--plots", "lift",
        ]);
        assert_eq!(cli.feature_list().unwrap(), vec!["age", "income"]);
        assert_eq!(cli.metrics, vec![Metric::Auc, Metric::Ks]);
        assert_eq!(cli.plots, vec![CurveKind::Lift]);
    }

    #[test]
    fn test_split_ratio_bounds() {
        assert!(validate_split_ratio("0.5").is_ok());
        assert!(validate_split_ratio("1.0").is_err());
        assert!(validate_split_ratio("abc").is_err());
    }
}
