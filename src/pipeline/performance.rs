//! Discrimination metrics and curve point sets per dataset

use polars::prelude::*;

use super::config::{CurveKind, Metric};
use crate::error::{Result, ScorecardError};

/// Probability clamp for log loss
const LOGLOSS_EPS: f64 = 1e-15;

/// Number of probability bins in the density curve
const DENSITY_BINS: usize = 20;

/// Predicted probabilities aligned with the labels of one dataset
#[derive(Debug, Clone)]
pub struct PredictionSet {
    pub dataset: String,
    pub probabilities: Vec<f64>,
    pub labels: Vec<u8>,
}

impl PredictionSet {
    pub fn new(dataset: impl Into<String>, probabilities: Vec<f64>, labels: Vec<u8>) -> Result<Self> {
        let dataset = dataset.into();
        if probabilities.len() != labels.len() {
            return Err(ScorecardError::InputShape(format!(
                "dataset '{}' has {} predictions for {} labels",
                dataset,
                probabilities.len(),
                labels.len()
            )));
        }
        Ok(Self {
            dataset,
            probabilities,
            labels,
        })
    }

    fn bad_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l == 1).count()
    }

    /// Fail with `MetricUndefined` on empty sets or constant labels
    fn check_defined(&self, metric: &str) -> Result<()> {
        if self.labels.is_empty() {
            return Err(ScorecardError::MetricUndefined {
                metric: metric.to_string(),
                reason: format!("dataset '{}' is empty", self.dataset),
            });
        }
        let bad = self.bad_count();
        if bad == 0 || bad == self.labels.len() {
            return Err(ScorecardError::MetricUndefined {
                metric: metric.to_string(),
                reason: format!("labels of dataset '{}' are constant", self.dataset),
            });
        }
        Ok(())
    }
}

/// Metric values per dataset, in dataset order
#[derive(Debug, Clone)]
pub struct PerformanceReport {
    pub metrics: Vec<Metric>,
    pub rows: Vec<(String, Vec<f64>)>,
}

impl PerformanceReport {
    pub fn value(&self, dataset: &str, metric: Metric) -> Option<f64> {
        let col = self.metrics.iter().position(|m| *m == metric)?;
        self.rows
            .iter()
            .find(|(name, _)| name == dataset)
            .map(|(_, values)| values[col])
    }

    /// One row per dataset, one column per metric
    pub fn to_frame(&self) -> Result<DataFrame> {
        let mut columns = vec![Column::new(
            "dataset".into(),
            self.rows.iter().map(|(n, _)| n.clone()).collect::<Vec<_>>(),
        )];
        for (idx, metric) in self.metrics.iter().enumerate() {
            columns.push(Column::new(
                metric.name().into(),
                self.rows.iter().map(|(_, v)| v[idx]).collect::<Vec<_>>(),
            ));
        }
        Ok(DataFrame::new(columns)?)
    }
}

/// Compute the requested metrics independently for every dataset
pub fn evaluate(predictions: &[PredictionSet], metrics: &[Metric]) -> Result<PerformanceReport> {
    let rows = predictions
        .iter()
        .map(|set| {
            let values = metrics
                .iter()
                .map(|m| compute_metric(*m, set))
                .collect::<Result<Vec<f64>>>()?;
            Ok((set.dataset.clone(), values))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(PerformanceReport {
        metrics: metrics.to_vec(),
        rows,
    })
}

pub fn compute_metric(metric: Metric, set: &PredictionSet) -> Result<f64> {
    set.check_defined(metric.name())?;
    let p = &set.probabilities;
    let y = &set.labels;
    let n = p.len() as f64;

    let value = match metric {
        Metric::Mse => squared_error(p, y) / n,
        Metric::Rmse => (squared_error(p, y) / n).sqrt(),
        Metric::Logloss => {
            -p.iter()
                .zip(y)
                .map(|(&pi, &yi)| {
                    let pi = pi.clamp(LOGLOSS_EPS, 1.0 - LOGLOSS_EPS);
                    if yi == 1 { pi.ln() } else { (1.0 - pi).ln() }
                })
                .sum::<f64>()
                / n
        }
        Metric::R2 => {
            let mean = y.iter().map(|&v| v as f64).sum::<f64>() / n;
            let sst: f64 = y.iter().map(|&v| (v as f64 - mean).powi(2)).sum();
            1.0 - squared_error(p, y) / sst
        }
        Metric::Ks => ks_statistic(set),
        Metric::Auc => auc(set),
        Metric::Gini => 2.0 * auc(set) - 1.0,
    };
    Ok(value)
}

fn squared_error(p: &[f64], y: &[u8]) -> f64 {
    p.iter()
        .zip(y)
        .map(|(&pi, &yi)| (pi - yi as f64).powi(2))
        .sum()
}

/// Rank-based AUC (Mann-Whitney U) with mid-ranks for ties
pub fn auc(set: &PredictionSet) -> f64 {
    let mut pairs: Vec<(f64, u8)> = set
        .probabilities
        .iter()
        .copied()
        .zip(set.labels.iter().copied())
        .collect();
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let total_pos = pairs.iter().filter(|(_, l)| *l == 1).count() as f64;
    let total_neg = pairs.len() as f64 - total_pos;
    if total_pos == 0.0 || total_neg == 0.0 {
        return 0.5;
    }

    let n = pairs.len();
    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j < n && pairs[j].0 == pairs[i].0 {
            j += 1;
        }
        // Ranks i+1..=j share their average
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        let positives = pairs[i..j].iter().filter(|(_, l)| *l == 1).count() as f64;
        rank_sum_pos += avg_rank * positives;
        i = j;
    }

    let u = rank_sum_pos - total_pos * (total_pos + 1.0) / 2.0;
    (u / (total_pos * total_neg)).clamp(0.0, 1.0)
}

/// Maximum gap between cumulative bad and good shares
pub fn ks_statistic(set: &PredictionSet) -> f64 {
    cumulative_points(set)
        .iter()
        .map(|c| (c.bad_share - c.good_share).abs())
        .fold(0.0, f64::max)
}

/// Cumulative counts after each group of tied probabilities, scanning from
/// the highest predicted risk down
#[derive(Debug, Clone, Copy)]
struct CumulativePoint {
    threshold: f64,
    population_share: f64,
    bad_share: f64,
    good_share: f64,
    bad: f64,
    count: f64,
}

fn cumulative_points(set: &PredictionSet) -> Vec<CumulativePoint> {
    let mut pairs: Vec<(f64, u8)> = set
        .probabilities
        .iter()
        .copied()
        .zip(set.labels.iter().copied())
        .collect();
    pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let n = pairs.len() as f64;
    let total_bad = pairs.iter().filter(|(_, l)| *l == 1).count() as f64;
    let total_good = n - total_bad;

    let mut points = Vec::new();
    let mut bad = 0.0;
    let mut count = 0.0;
    let mut i = 0;
    while i < pairs.len() {
        let threshold = pairs[i].0;
        while i < pairs.len() && pairs[i].0 == threshold {
            bad += pairs[i].1 as f64;
            count += 1.0;
            i += 1;
        }
        points.push(CumulativePoint {
            threshold,
            population_share: count / n,
            bad_share: if total_bad > 0.0 { bad / total_bad } else { 0.0 },
            good_share: if total_good > 0.0 { (count - bad) / total_good } else { 0.0 },
            bad,
            count,
        });
    }
    points
}

/// One named line of a curve
#[derive(Debug, Clone)]
pub struct CurveSeries {
    pub name: String,
    pub points: Vec<(f64, f64)>,
}

/// Curve point sets for one dataset
#[derive(Debug, Clone)]
pub struct Curve {
    pub kind: CurveKind,
    pub dataset: String,
    pub x_label: &'static str,
    pub y_label: &'static str,
    pub series: Vec<CurveSeries>,
}

impl Curve {
    /// Bounding box over every series, padded to a non-empty range
    pub fn bounds(&self) -> ((f64, f64), (f64, f64)) {
        let mut x = (f64::INFINITY, f64::NEG_INFINITY);
        let mut y = (f64::INFINITY, f64::NEG_INFINITY);
        for (px, py) in self.series.iter().flat_map(|s| s.points.iter()) {
            x = (x.0.min(*px), x.1.max(*px));
            y = (y.0.min(*py), y.1.max(*py));
        }
        (pad_range(x), pad_range(y))
    }
}

fn pad_range((lo, hi): (f64, f64)) -> (f64, f64) {
    if !lo.is_finite() || !hi.is_finite() {
        (0.0, 1.0)
    } else if hi - lo < 1e-12 {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo, hi)
    }
}

/// Point sets for one curve kind
pub fn curve(kind: CurveKind, set: &PredictionSet) -> Result<Curve> {
    set.check_defined(kind.name())?;
    let cum = cumulative_points(set);
    let origin = std::iter::once((0.0, 0.0));

    let (x_label, y_label, series) = match kind {
        CurveKind::Ks => (
            "population",
            "cumulative share",
            vec![
                series(
                    "bad",
                    origin.clone().chain(cum.iter().map(|c| (c.population_share, c.bad_share))),
                ),
                series(
                    "good",
                    origin.clone().chain(cum.iter().map(|c| (c.population_share, c.good_share))),
                ),
                series(
                    "ks",
                    origin.clone().chain(
                        cum.iter()
                            .map(|c| (c.population_share, (c.bad_share - c.good_share).abs())),
                    ),
                ),
            ],
        ),
        CurveKind::Roc => (
            "false positive rate",
            "true positive rate",
            vec![
                series(
                    "roc",
                    origin.clone().chain(cum.iter().map(|c| (c.good_share, c.bad_share))),
                ),
                series("random", vec![(0.0, 0.0), (1.0, 1.0)]),
            ],
        ),
        CurveKind::Lift => {
            let overall = set.bad_count() as f64 / set.labels.len() as f64;
            (
                "population",
                "lift",
                vec![
                    series(
                        "lift",
                        cum.iter()
                            .map(|c| (c.population_share, (c.bad / c.count) / overall)),
                    ),
                    series("baseline", vec![(0.0, 1.0), (1.0, 1.0)]),
                ],
            )
        }
        CurveKind::Gain => (
            "population",
            "cumulative bad share",
            vec![
                series(
                    "gain",
                    origin.clone().chain(cum.iter().map(|c| (c.population_share, c.bad_share))),
                ),
                series("random", vec![(0.0, 0.0), (1.0, 1.0)]),
            ],
        ),
        CurveKind::Pr => (
            "recall",
            "precision",
            vec![series(
                "precision",
                cum.iter().map(|c| (c.bad_share, c.bad / c.count)),
            )],
        ),
        CurveKind::F1 => (
            "threshold",
            "f1",
            vec![series(
                "f1",
                cum.iter().rev().map(|c| {
                    let precision = c.bad / c.count;
                    let recall = c.bad_share;
                    let f1 = if precision + recall > 0.0 {
                        2.0 * precision * recall / (precision + recall)
                    } else {
                        0.0
                    };
                    (c.threshold, f1)
                }),
            )],
        ),
        CurveKind::Density => {
            let (bad, good) = density(set);
            ("probability", "density", vec![series("bad", bad), series("good", good)])
        }
    };

    Ok(Curve {
        kind,
        dataset: set.dataset.clone(),
        x_label,
        y_label,
        series,
    })
}

fn series(name: &str, points: impl IntoIterator<Item = (f64, f64)>) -> CurveSeries {
    CurveSeries {
        name: name.to_string(),
        points: points.into_iter().collect(),
    }
}

/// Histogram densities of predicted probability for bad and good rows
fn density(set: &PredictionSet) -> (Vec<(f64, f64)>, Vec<(f64, f64)>) {
    let width = 1.0 / DENSITY_BINS as f64;
    let mut bad = vec![0.0; DENSITY_BINS];
    let mut good = vec![0.0; DENSITY_BINS];
    for (&p, &l) in set.probabilities.iter().zip(&set.labels) {
        let idx = ((p / width) as usize).min(DENSITY_BINS - 1);
        if l == 1 {
            bad[idx] += 1.0;
        } else {
            good[idx] += 1.0;
        }
    }

    let to_points = |counts: Vec<f64>| {
        let total: f64 = counts.iter().sum();
        counts
            .into_iter()
            .enumerate()
            .map(|(i, c)| {
                let mid = (i as f64 + 0.5) * width;
                (mid, if total > 0.0 { c / (total * width) } else { 0.0 })
            })
            .collect()
    };
    (to_points(bad), to_points(good))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(probs: &[f64], labels: &[u8]) -> PredictionSet {
        PredictionSet::new("train", probs.to_vec(), labels.to_vec()).unwrap()
    }

    #[test]
    fn test_perfect_separation() {
        let s = set(&[0.9, 0.8, 0.2, 0.1], &[1, 1, 0, 0]);
        assert!((auc(&s) - 1.0).abs() < 1e-12);
        assert!((ks_statistic(&s) - 1.0).abs() < 1e-12);
        assert!((compute_metric(Metric::Gini, &s).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ties_give_half_credit() {
        let s = set(&[0.5, 0.5, 0.5, 0.5], &[1, 0, 1, 0]);
        assert!((auc(&s) - 0.5).abs() < 1e-12);
        assert_eq!(ks_statistic(&s), 0.0);
    }

    #[test]
    fn test_known_auc() {
        // One of four (bad, good) pairs is misordered
        let s = set(&[0.9, 0.4, 0.6, 0.1], &[1, 1, 0, 0]);
        assert!((auc(&s) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_error_metrics() {
        let s = set(&[0.8, 0.2], &[1, 0]);
        let mse = compute_metric(Metric::Mse, &s).unwrap();
        assert!((mse - 0.04).abs() < 1e-12);
        assert!((compute_metric(Metric::Rmse, &s).unwrap() - 0.2).abs() < 1e-12);
        // SST = 0.5, SSE = 0.08
        assert!((compute_metric(Metric::R2, &s).unwrap() - 0.84).abs() < 1e-12);
        let logloss = compute_metric(Metric::Logloss, &s).unwrap();
        assert!((logloss + 0.8f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_logloss_clamps_extremes() {
        let s = set(&[0.0, 1.0], &[1, 0]);
        assert!(compute_metric(Metric::Logloss, &s).unwrap().is_finite());
    }

    #[test]
    fn test_constant_labels_are_undefined() {
        let s = set(&[0.2, 0.3], &[0, 0]);
        let err = compute_metric(Metric::Auc, &s).unwrap_err();
        assert!(matches!(err, ScorecardError::MetricUndefined { .. }));

        let empty = set(&[], &[]);
        assert!(evaluate(&[empty], &[Metric::Mse]).is_err());
    }

    #[test]
    fn test_report_frame() {
        let a = set(&[0.9, 0.1, 0.7, 0.3], &[1, 0, 1, 0]);
        let b = PredictionSet::new("test", vec![0.6, 0.4], vec![0, 1]).unwrap();
        let report = evaluate(&[a, b], &[Metric::Auc, Metric::Ks]).unwrap();
        let frame = report.to_frame().unwrap();
        assert_eq!(frame.shape(), (2, 3));
        assert_eq!(report.value("test", Metric::Auc), Some(0.0));
    }

    #[test]
    fn test_curves_end_at_full_population() {
        let s = set(&[0.9, 0.8, 0.3, 0.2, 0.6], &[1, 0, 0, 0, 1]);
        for kind in CurveKind::ALL {
            let c = curve(kind, &s).unwrap();
            assert!(!c.series.is_empty());
            assert!(c.series.iter().all(|s| !s.points.is_empty()));
        }
        let roc = curve(CurveKind::Roc, &s).unwrap();
        assert_eq!(roc.series[0].points.last(), Some(&(1.0, 1.0)));
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        assert!(PredictionSet::new("x", vec![0.1], vec![]).is_err());
    }
}
