//! Points-based scorecard scaled from the fitted model
//!
//! Scores follow the convention that a higher score means lower risk: the
//! target score `points0` is assigned at bad:good odds `odds0`, and every
//! `pdo` points the odds of being bad halve.

use std::f64::consts::LN_2;
use std::sync::Arc;

use polars::prelude::*;
use serde::Serialize;

use super::binning::BinDefinition;
use super::config::ScalingConfig;
use super::dataset::Dataset;
use super::model::Model;
use crate::error::{Result, ScorecardError};

/// Label used for the base points row of the card table
pub const BASE_POINTS_LABEL: &str = "basepoints";

#[derive(Debug, Clone, Serialize)]
pub struct BinPoints {
    pub bin: String,
    pub woe: f64,
    pub points: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeaturePoints {
    pub feature: String,
    pub coefficient: f64,
    /// One entry per bin, in bin definition order
    pub bins: Vec<BinPoints>,
}

/// Scores of one dataset with each feature's contribution
#[derive(Debug, Clone)]
pub struct ScoreBreakdown {
    pub dataset: String,
    pub features: Vec<String>,
    /// Points per feature column, aligned with `features`
    pub points: Vec<Vec<i64>>,
    pub base_points: i64,
    pub scores: Vec<i64>,
}

/// Frozen scorecard: per-bin points plus base points
#[derive(Debug, Clone)]
pub struct ScoreCard {
    scaling: ScalingConfig,
    factor: f64,
    offset: f64,
    base_points: i64,
    features: Vec<FeaturePoints>,
    definition: Arc<BinDefinition>,
}

impl ScoreCard {
    /// Scale the model into points over the shared bin definition
    pub fn fit(definition: Arc<BinDefinition>, model: &Model, scaling: ScalingConfig) -> Result<Self> {
        if !(scaling.odds0.is_finite() && scaling.odds0 > 0.0) {
            return Err(ScorecardError::InputShape(format!(
                "target odds must be positive, got {}",
                scaling.odds0
            )));
        }
        if !(scaling.pdo.is_finite() && scaling.pdo > 0.0) {
            return Err(ScorecardError::InputShape(format!(
                "points to double the odds must be positive, got {}",
                scaling.pdo
            )));
        }
        if model.features != definition.feature_names() {
            return Err(ScorecardError::InputShape(
                "model features do not match the bin definition".to_string(),
            ));
        }

        let factor = scaling.pdo / LN_2;
        let offset = scaling.points0 + factor * scaling.odds0.ln();
        let mut base_points = (offset - factor * model.intercept).round() as i64;

        let mut features: Vec<FeaturePoints> = definition
            .features()
            .iter()
            .zip(&model.coefficients)
            .map(|(fb, &coefficient)| FeaturePoints {
                feature: fb.feature.clone(),
                coefficient,
                bins: fb
                    .bins
                    .iter()
                    .map(|b| BinPoints {
                        bin: b.label.clone(),
                        woe: b.woe,
                        points: (-factor * coefficient * b.woe).round() as i64,
                    })
                    .collect(),
            })
            .collect();

        if scaling.basepoints_eq0 && !features.is_empty() {
            let share = (base_points as f64 / features.len() as f64).round() as i64;
            for feature in features.iter_mut() {
                for bin in feature.bins.iter_mut() {
                    bin.points += share;
                }
            }
            base_points = 0;
        }

        Ok(Self {
            scaling,
            factor,
            offset,
            base_points,
            features,
            definition,
        })
    }

    pub fn base_points(&self) -> i64 {
        self.base_points
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn features(&self) -> &[FeaturePoints] {
        &self.features
    }

    pub fn definition(&self) -> &BinDefinition {
        &self.definition
    }

    /// Integer score per row
    pub fn score(&self, dataset: &Dataset) -> Result<Vec<i64>> {
        Ok(self.score_breakdown(dataset)?.scores)
    }

    /// Per-feature points and the resulting score per row
    pub fn score_breakdown(&self, dataset: &Dataset) -> Result<ScoreBreakdown> {
        let assignments = self.definition.assign(dataset)?;
        let points: Vec<Vec<i64>> = self
            .features
            .iter()
            .zip(&assignments.columns)
            .map(|(fp, bins)| bins.iter().map(|&b| fp.bins[b].points).collect())
            .collect();

        let scores = (0..dataset.height())
            .map(|i| self.base_points + points.iter().map(|col| col[i]).sum::<i64>())
            .collect();

        Ok(ScoreBreakdown {
            dataset: dataset.name().to_string(),
            features: self.features.iter().map(|f| f.feature.clone()).collect(),
            points,
            base_points: self.base_points,
            scores,
        })
    }

    /// Card table: base points row then one row per (feature, bin)
    pub fn to_frame(&self) -> Result<DataFrame> {
        let mut variable = vec![BASE_POINTS_LABEL.to_string()];
        let mut bin = vec![None];
        let mut woe = vec![None];
        let mut points = vec![self.base_points];

        for feature in &self.features {
            for b in &feature.bins {
                variable.push(feature.feature.clone());
                bin.push(Some(b.bin.clone()));
                woe.push(Some(b.woe));
                points.push(b.points);
            }
        }

        Ok(DataFrame::new(vec![
            Column::new("variable".into(), variable),
            Column::new("bin".into(), bin),
            Column::new("woe".into(), woe),
            Column::new("points".into(), points),
        ])?)
    }

    /// Scaling parameters table
    pub fn parameters_frame(&self) -> Result<DataFrame> {
        let rows: Vec<(&str, String)> = vec![
            ("odds0", format!("{:.6}", self.scaling.odds0)),
            ("points0", format!("{}", self.scaling.points0)),
            ("pdo", format!("{}", self.scaling.pdo)),
            ("basepoints_eq0", self.scaling.basepoints_eq0.to_string()),
            ("factor", format!("{:.6}", self.factor)),
            ("offset", format!("{:.6}", self.offset)),
            ("base_points", self.base_points.to_string()),
        ];
        Ok(DataFrame::new(vec![
            Column::new(
                "parameter".into(),
                rows.iter().map(|(k, _)| k.to_string()).collect::<Vec<_>>(),
            ),
            Column::new(
                "value".into(),
                rows.into_iter().map(|(_, v)| v).collect::<Vec<_>>(),
            ),
        ])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::binning::{BinningSpec, BreakSpec, GreedyBinningEngine};
    use crate::pipeline::dataset::{prepare_datasets, DatasetInput, PrepareOptions};
    use crate::pipeline::model::{IrlsLogistic, RegressionEngine};
    use indicatif::ProgressBar;

    fn fixture() -> (Dataset, Arc<BinDefinition>, Model) {
        let n = 400;
        let age: Vec<f64> = (0..n).map(|i| 18.0 + (i % 50) as f64).collect();
        let grade: Vec<&str> = (0..n).map(|i| ["A", "B", "C"][i % 3]).collect();
        let target: Vec<i32> = (0..n)
            .map(|i| ((i % 50) < 15 && i % 2 == 0 || i % 3 == 2 && i % 5 == 0) as i32)
            .collect();
        let df = df! { "age" => age, "grade" => grade, "target" => target }.unwrap();
        let prepared =
            prepare_datasets(DatasetInput::Single(df), &PrepareOptions::new("target")).unwrap();
        let spec = BinningSpec::default()
            .with_breaks("age", BreakSpec::numeric(vec![25.0, 35.0, 50.0]).unwrap());
        let def = BinDefinition::fit(
            prepared.reference(),
            &prepared.features,
            &spec,
            &GreedyBinningEngine::default(),
            &ProgressBar::hidden(),
        )
        .unwrap();
        let encoded = def.apply(prepared.reference()).unwrap();
        let model = IrlsLogistic::default().fit(&encoded).unwrap();
        (prepared.datasets[0].clone(), Arc::new(def), model)
    }

    #[test]
    fn test_score_equals_points_plus_base() {
        let (ds, def, model) = fixture();
        let card = ScoreCard::fit(def, &model, ScalingConfig::default()).unwrap();
        let breakdown = card.score_breakdown(&ds).unwrap();

        for i in 0..ds.height() {
            let sum: i64 = breakdown.points.iter().map(|col| col[i]).sum();
            assert_eq!(sum + card.base_points(), breakdown.scores[i]);
        }
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let (ds, def, model) = fixture();
        let card = ScoreCard::fit(def, &model, ScalingConfig::default()).unwrap();
        assert_eq!(card.score(&ds).unwrap(), card.score(&ds).unwrap());
    }

    #[test]
    fn test_base_points_formula() {
        let (_, def, model) = fixture();
        let scaling = ScalingConfig::default();
        let card = ScoreCard::fit(def, &model, scaling).unwrap();

        let factor = 50.0 / LN_2;
        let offset = 600.0 + factor * (1.0f64 / 19.0).ln();
        assert_eq!(card.base_points(), (offset - factor * model.intercept).round() as i64);
    }

    #[test]
    fn test_higher_risk_bins_get_fewer_points() {
        let (_, def, model) = fixture();
        let card = ScoreCard::fit(def, &model, ScalingConfig::default()).unwrap();
        for (fp, coef) in card.features().iter().zip(&model.coefficients) {
            if *coef <= 0.0 {
                continue;
            }
            let observed: Vec<&BinPoints> = fp.bins.iter().filter(|b| b.woe != 0.0).collect();
            for a in &observed {
                for b in &observed {
                    if a.woe > b.woe {
                        assert!(a.points <= b.points);
                    }
                }
            }
        }
    }

    #[test]
    fn test_base_points_spread_over_features() {
        let (ds, def, model) = fixture();
        let scaling = ScalingConfig {
            basepoints_eq0: true,
            ..ScalingConfig::default()
        };
        let card = ScoreCard::fit(def, &model, scaling).unwrap();
        assert_eq!(card.base_points(), 0);

        let breakdown = card.score_breakdown(&ds).unwrap();
        let sum: i64 = breakdown.points.iter().map(|col| col[0]).sum();
        assert_eq!(sum, breakdown.scores[0]);
    }

    #[test]
    fn test_invalid_scaling_rejected() {
        let (_, def, model) = fixture();
        let scaling = ScalingConfig {
            pdo: 0.0,
            ..ScalingConfig::default()
        };
        let err = ScoreCard::fit(def, &model, scaling).unwrap_err();
        assert!(matches!(err, ScorecardError::InputShape(_)));
    }

    #[test]
    fn test_card_frame_starts_with_base_points() {
        let (_, def, model) = fixture();
        let card = ScoreCard::fit(def, &model, ScalingConfig::default()).unwrap();
        let frame = card.to_frame().unwrap();
        let first = frame.column("variable").unwrap().str().unwrap().get(0);
        assert_eq!(first, Some(BASE_POINTS_LABEL));
        assert_eq!(card.parameters_frame().unwrap().height(), 7);
    }
}
