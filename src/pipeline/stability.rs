//! Population stability between the reference dataset and every other one

use polars::prelude::*;
use serde::Serialize;

use super::binning::FeatureBinTable;
use super::gains::{ScoreBuckets, ScoredDataset};
use crate::error::{Result, ScorecardError};

/// Floor applied to a zero share before taking the logarithm
pub const PSI_FLOOR: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StabilityVerdict {
    Stable,
    MinorShift,
    MajorShift,
}

impl StabilityVerdict {
    pub fn from_psi(psi: f64) -> Self {
        if psi < 0.1 {
            StabilityVerdict::Stable
        } else if psi < 0.25 {
            StabilityVerdict::MinorShift
        } else {
            StabilityVerdict::MajorShift
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StabilityVerdict::Stable => "stable",
            StabilityVerdict::MinorShift => "minor shift",
            StabilityVerdict::MajorShift => "major shift",
        }
    }
}

/// One bucket of a PSI computation
#[derive(Debug, Clone, Serialize)]
pub struct PsiRow {
    pub bin: String,
    pub expected_count: usize,
    pub actual_count: usize,
    pub expected_pct: f64,
    pub actual_pct: f64,
    pub contribution: f64,
}

/// PSI of one comparison against the reference
#[derive(Debug, Clone, Serialize)]
pub struct PsiResult {
    pub reference: String,
    pub comparison: String,
    pub psi: f64,
    pub verdict: StabilityVerdict,
    pub rows: Vec<PsiRow>,
}

/// Characteristic stability of one feature for one comparison
#[derive(Debug, Clone, Serialize)]
pub struct CharacteristicStability {
    pub comparison: String,
    pub feature: String,
    pub psi: f64,
    pub verdict: StabilityVerdict,
}

#[derive(Debug, Clone)]
pub struct StabilityReport {
    pub score: Vec<PsiResult>,
    pub characteristics: Vec<CharacteristicStability>,
}

/// PSI over aligned bin counts
///
/// Bins empty on both sides contribute nothing; a share that is zero on
/// one side only is floored at [`PSI_FLOOR`].
pub fn psi_rows(
    labels: &[String],
    expected: &[usize],
    actual: &[usize],
) -> Result<(f64, Vec<PsiRow>)> {
    let expected_total: usize = expected.iter().sum();
    let actual_total: usize = actual.iter().sum();
    if expected_total == 0 {
        return Err(ScorecardError::StabilityFloor(
            "the reference distribution has no population".to_string(),
        ));
    }
    if actual_total == 0 {
        return Err(ScorecardError::StabilityFloor(
            "the comparison distribution has no population".to_string(),
        ));
    }

    let rows: Vec<PsiRow> = labels
        .iter()
        .zip(expected.iter().zip(actual))
        .map(|(bin, (&e, &a))| {
            let expected_pct = e as f64 / expected_total as f64;
            let actual_pct = a as f64 / actual_total as f64;
            let contribution = if e == 0 && a == 0 {
                0.0
            } else {
                let ep = expected_pct.max(PSI_FLOOR);
                let ap = actual_pct.max(PSI_FLOOR);
                (ap - ep) * (ap / ep).ln()
            };
            PsiRow {
                bin: bin.clone(),
                expected_count: e,
                actual_count: a,
                expected_pct,
                actual_pct,
                contribution,
            }
        })
        .collect();

    let psi = rows.iter().map(|r| r.contribution).sum();
    Ok((psi, rows))
}

/// Score PSI and characteristic stability of every non-reference dataset
///
/// `bin_tables` holds the per-feature bin tables of each dataset, in the
/// same order as `scored`.
pub fn analyze_stability(
    scored: &[ScoredDataset],
    buckets: &ScoreBuckets,
    bin_tables: &[Vec<FeatureBinTable>],
) -> Result<StabilityReport> {
    let Some((reference, others)) = scored.split_first() else {
        return Err(ScorecardError::InputShape("no datasets to compare".to_string()));
    };
    let labels = buckets.labels();
    let expected = buckets.counts(&reference.scores);

    let mut score = Vec::with_capacity(others.len());
    let mut characteristics = Vec::new();

    for (idx, comparison) in others.iter().enumerate() {
        let actual = buckets.counts(&comparison.scores);
        let (psi, rows) = psi_rows(&labels, &expected, &actual)?;
        score.push(PsiResult {
            reference: reference.dataset.clone(),
            comparison: comparison.dataset.clone(),
            psi,
            verdict: StabilityVerdict::from_psi(psi),
            rows,
        });

        if let (Some(ref_tables), Some(cmp_tables)) = (bin_tables.first(), bin_tables.get(idx + 1)) {
            for (rt, ct) in ref_tables.iter().zip(cmp_tables) {
                let bins: Vec<String> = rt.rows.iter().map(|r| r.bin.clone()).collect();
                let e: Vec<usize> = rt.rows.iter().map(|r| r.count).collect();
                let a: Vec<usize> = ct.rows.iter().map(|r| r.count).collect();
                let (psi, _) = psi_rows(&bins, &e, &a)?;
                characteristics.push(CharacteristicStability {
                    comparison: comparison.dataset.clone(),
                    feature: rt.feature.clone(),
                    psi,
                    verdict: StabilityVerdict::from_psi(psi),
                });
            }
        }
    }

    Ok(StabilityReport {
        score,
        characteristics,
    })
}

impl StabilityReport {
    /// One row per comparison
    pub fn summary_frame(&self) -> Result<DataFrame> {
        Ok(DataFrame::new(vec![
            Column::new(
                "reference".into(),
                self.score.iter().map(|s| s.reference.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                "comparison".into(),
                self.score.iter().map(|s| s.comparison.clone()).collect::<Vec<_>>(),
            ),
            Column::new("psi".into(), self.score.iter().map(|s| s.psi).collect::<Vec<_>>()),
            Column::new(
                "verdict".into(),
                self.score
                    .iter()
                    .map(|s| s.verdict.label().to_string())
                    .collect::<Vec<_>>(),
            ),
        ])?)
    }

    /// Bucket distributions of every comparison, stacked
    pub fn distribution_frame(&self) -> Result<DataFrame> {
        let rows: Vec<(&PsiResult, &PsiRow)> = self
            .score
            .iter()
            .flat_map(|s| s.rows.iter().map(move |r| (s, r)))
            .collect();
        Ok(DataFrame::new(vec![
            Column::new(
                "comparison".into(),
                rows.iter().map(|(s, _)| s.comparison.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                "score_range".into(),
                rows.iter().map(|(_, r)| r.bin.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                "expected_count".into(),
                rows.iter().map(|(_, r)| r.expected_count as u64).collect::<Vec<_>>(),
            ),
            Column::new(
                "actual_count".into(),
                rows.iter().map(|(_, r)| r.actual_count as u64).collect::<Vec<_>>(),
            ),
            Column::new(
                "expected_pct".into(),
                rows.iter().map(|(_, r)| r.expected_pct).collect::<Vec<_>>(),
            ),
            Column::new(
                "actual_pct".into(),
                rows.iter().map(|(_, r)| r.actual_pct).collect::<Vec<_>>(),
            ),
            Column::new(
                "psi_contribution".into(),
                rows.iter().map(|(_, r)| r.contribution).collect::<Vec<_>>(),
            ),
        ])?)
    }

    pub fn characteristic_frame(&self) -> Result<DataFrame> {
        let c = &self.characteristics;
        Ok(DataFrame::new(vec![
            Column::new(
                "comparison".into(),
                c.iter().map(|x| x.comparison.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                "variable".into(),
                c.iter().map(|x| x.feature.clone()).collect::<Vec<_>>(),
            ),
            Column::new("psi".into(), c.iter().map(|x| x.psi).collect::<Vec<_>>()),
            Column::new(
                "verdict".into(),
                c.iter()
                    .map(|x| x.verdict.label().to_string())
                    .collect::<Vec<_>>(),
            ),
        ])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::config::BucketType;
    use crate::pipeline::gains::pooled_buckets;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("b{}", i)).collect()
    }

    #[test]
    fn test_identical_distributions_have_zero_psi() {
        let counts = [10, 20, 30, 0];
        let (psi, _) = psi_rows(&labels(4), &counts, &counts).unwrap();
        assert_eq!(psi, 0.0);
    }

    #[test]
    fn test_known_psi_value() {
        let (psi, rows) = psi_rows(&labels(2), &[50, 50], &[25, 75]).unwrap();
        let expected = (0.25 - 0.5) * (0.25f64 / 0.5).ln() + (0.75 - 0.5) * (0.75f64 / 0.5).ln();
        assert!((psi - expected).abs() < 1e-12);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_one_sided_zero_is_floored() {
        let (psi, rows) = psi_rows(&labels(2), &[100, 0], &[90, 10]).unwrap();
        assert!(psi.is_finite());
        assert!(rows[1].contribution > 0.0);
    }

    #[test]
    fn test_empty_population_is_error() {
        let err = psi_rows(&labels(2), &[0, 0], &[1, 1]).unwrap_err();
        assert!(matches!(err, ScorecardError::StabilityFloor(_)));
        assert!(psi_rows(&labels(2), &[1, 1], &[0, 0]).is_err());
    }

    #[test]
    fn test_verdict_thresholds() {
        assert_eq!(StabilityVerdict::from_psi(0.05), StabilityVerdict::Stable);
        assert_eq!(StabilityVerdict::from_psi(0.1), StabilityVerdict::MinorShift);
        assert_eq!(StabilityVerdict::from_psi(0.25), StabilityVerdict::MajorShift);
    }

    #[test]
    fn test_one_psi_per_comparison() {
        let make = |name: &str, scores: Vec<i64>| ScoredDataset {
            dataset: name.to_string(),
            labels: vec![0; scores.len()],
            scores,
        };
        let scored = vec![
            make("a", vec![500, 520, 540, 560, 580, 600]),
            make("b", vec![500, 510, 520, 600]),
            make("c", vec![590, 600, 600, 600]),
        ];
        let buckets = pooled_buckets(&scored, 3, BucketType::Freq).unwrap();
        let report = analyze_stability(&scored, &buckets, &[]).unwrap();

        assert_eq!(report.score.len(), 2);
        assert_eq!(report.score[0].comparison, "b");
        assert_eq!(report.score[1].comparison, "c");
        assert!(report.characteristics.is_empty());
        assert_eq!(report.summary_frame().unwrap().height(), 2);
    }
}
