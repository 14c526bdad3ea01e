//! Report configuration with the recognized keys and their defaults

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScorecardError};

/// Binomial metrics the performance evaluator can compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Mse,
    Rmse,
    Logloss,
    R2,
    Ks,
    Auc,
    Gini,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::Mse,
        Metric::Rmse,
        Metric::Logloss,
        Metric::R2,
        Metric::Ks,
        Metric::Auc,
        Metric::Gini,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Mse => "mse",
            Metric::Rmse => "rmse",
            Metric::Logloss => "logloss",
            Metric::R2 => "r2",
            Metric::Ks => "ks",
            Metric::Auc => "auc",
            Metric::Gini => "gini",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .iter()
            .copied()
            .find(|m| m.name() == s.to_lowercase())
            .ok_or_else(|| {
                format!(
                    "Unknown metric: '{}'. Use mse, rmse, logloss, r2, ks, auc or gini.",
                    s
                )
            })
    }
}

/// Performance curves that can be plotted per dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveKind {
    Ks,
    Roc,
    Lift,
    Gain,
    Pr,
    F1,
    Density,
}

impl CurveKind {
    pub const ALL: [CurveKind; 7] = [
        CurveKind::Ks,
        CurveKind::Roc,
        CurveKind::Lift,
        CurveKind::Gain,
        CurveKind::Pr,
        CurveKind::F1,
        CurveKind::Density,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CurveKind::Ks => "ks",
            CurveKind::Roc => "roc",
            CurveKind::Lift => "lift",
            CurveKind::Gain => "gain",
            CurveKind::Pr => "pr",
            CurveKind::F1 => "f1",
            CurveKind::Density => "density",
        }
    }
}

impl std::fmt::Display for CurveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for CurveKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CurveKind::ALL
            .iter()
            .copied()
            .find(|k| k.name() == s.to_lowercase())
            .ok_or_else(|| {
                format!(
                    "Unknown plot: '{}'. Use ks, roc, lift, gain, pr, f1 or density.",
                    s
                )
            })
    }
}

/// Bucketing strategy for the gains table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketType {
    /// Equal-frequency buckets on pooled score quantiles
    #[default]
    Freq,
    /// Equal-width buckets over the pooled score range
    Width,
}

impl std::fmt::Display for BucketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BucketType::Freq => write!(f, "freq"),
            BucketType::Width => write!(f, "width"),
        }
    }
}

impl std::str::FromStr for BucketType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "freq" => Ok(BucketType::Freq),
            "width" => Ok(BucketType::Width),
            _ => Err(format!("Unknown bin type: '{}'. Use 'freq' or 'width'.", s)),
        }
    }
}

/// Strategy for automatic cut-point search on numeric features
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinningMethod {
    /// Equal-frequency pre-bins merged greedily by IV loss
    Quantile,
    /// CART-style decision tree splits
    #[default]
    Cart,
}

impl std::fmt::Display for BinningMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinningMethod::Quantile => write!(f, "quantile"),
            BinningMethod::Cart => write!(f, "cart"),
        }
    }
}

impl std::str::FromStr for BinningMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quantile" => Ok(BinningMethod::Quantile),
            "cart" => Ok(BinningMethod::Cart),
            _ => Err(format!(
                "Unknown binning method: '{}'. Use 'quantile' or 'cart'.",
                s
            )),
        }
    }
}

/// Points scaling parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    /// Bad:good odds at the target score
    pub odds0: f64,
    /// Score assigned at `odds0`
    pub points0: f64,
    /// Points to double the odds
    pub pdo: f64,
    /// Spread base points over the features so the card's base is zero
    pub basepoints_eq0: bool,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            odds0: 1.0 / 19.0,
            points0: 600.0,
            pdo: 50.0,
            basepoints_eq0: false,
        }
    }
}

/// Full run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub binomial_metric: Vec<Metric>,
    pub show_plot: Vec<CurveKind>,
    pub bin_num: usize,
    pub bin_type: BucketType,
    #[serde(flatten)]
    pub scaling: ScalingConfig,
    /// Train share when a single table is split
    pub split_ratio: f64,
    /// Maximum bins per feature for automatic binning
    pub woe_bins: usize,
    pub binning_method: BinningMethod,
    /// Categories rarer than this share one fallback group
    pub min_category_samples: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            binomial_metric: Metric::ALL.to_vec(),
            show_plot: vec![CurveKind::Ks, CurveKind::Roc],
            bin_num: 10,
            bin_type: BucketType::Freq,
            scaling: ScalingConfig::default(),
            split_ratio: 0.7,
            woe_bins: 8,
            binning_method: BinningMethod::Cart,
            min_category_samples: 5,
        }
    }
}

impl ReportConfig {
    /// Check value ranges before any stage runs
    pub fn validate(&self) -> Result<()> {
        let s = &self.scaling;
        if !(s.odds0.is_finite() && s.odds0 > 0.0) {
            return Err(ScorecardError::Config(format!(
                "odds0 must be positive, got {}",
                s.odds0
            )));
        }
        if !(s.pdo.is_finite() && s.pdo > 0.0) {
            return Err(ScorecardError::Config(format!(
                "pdo must be positive, got {}",
                s.pdo
            )));
        }
        if !s.points0.is_finite() {
            return Err(ScorecardError::Config("points0 must be finite".to_string()));
        }
        if self.bin_num == 0 {
            return Err(ScorecardError::Config("bin_num must be at least 1".to_string()));
        }
        if self.woe_bins < 2 {
            return Err(ScorecardError::Config(format!(
                "woe_bins must be at least 2, got {}",
                self.woe_bins
            )));
        }
        if !(self.split_ratio > 0.0 && self.split_ratio < 1.0) {
            return Err(ScorecardError::Config(format!(
                "split_ratio must be between 0 and 1 (exclusive), got {}",
                self.split_ratio
            )));
        }
        if self.binomial_metric.is_empty() {
            return Err(ScorecardError::Config(
                "at least one binomial metric is required".to_string(),
            ));
        }
        if let Some(metric) = first_duplicate(&self.binomial_metric) {
            return Err(ScorecardError::Config(format!(
                "metric '{}' is listed more than once",
                metric
            )));
        }
        if let Some(kind) = first_duplicate(&self.show_plot) {
            return Err(ScorecardError::Config(format!(
                "plot '{}' is listed more than once",
                kind
            )));
        }
        Ok(())
    }
}

fn first_duplicate<T: PartialEq + Copy>(items: &[T]) -> Option<T> {
    items
        .iter()
        .enumerate()
        .find(|&(i, item)| items[..i].contains(item))
        .map(|(_, item)| *item)
}
