//! Gains table over score buckets shared by every dataset
//!
//! Bucket boundaries are computed once from the pooled scores of all
//! datasets, so bucket `k` means the same score range everywhere. Buckets
//! ascend by score; with higher scores meaning lower risk, bucket 1 is the
//! riskiest.

use polars::prelude::*;
use serde::Serialize;

use super::config::BucketType;
use crate::error::{Result, ScorecardError};

/// Scores and labels of one dataset
#[derive(Debug, Clone)]
pub struct ScoredDataset {
    pub dataset: String,
    pub scores: Vec<i64>,
    pub labels: Vec<u8>,
}

/// Score bucket boundaries: `[edges[k], edges[k + 1])`, last bucket closed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBuckets {
    edges: Vec<f64>,
}

impl ScoreBuckets {
    /// Boundaries from the pooled scores of every dataset
    pub fn from_scores(pooled: &[f64], bin_num: usize, bin_type: BucketType) -> Result<Self> {
        if pooled.is_empty() {
            return Err(ScorecardError::InputShape(
                "no scores to bucket".to_string(),
            ));
        }
        if bin_num == 0 {
            return Err(ScorecardError::Config("bin_num must be at least 1".to_string()));
        }

        let mut sorted = pooled.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let min = sorted[0];
        let max = sorted[sorted.len() - 1];

        let mut edges: Vec<f64> = match bin_type {
            BucketType::Freq => (0..=bin_num)
                .map(|k| quantile(&sorted, k as f64 / bin_num as f64))
                .collect(),
            BucketType::Width => {
                let step = (max - min) / bin_num as f64;
                (0..=bin_num)
                    .map(|k| if k == bin_num { max } else { min + step * k as f64 })
                    .collect()
            }
        };
        edges.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
        if edges.len() < 2 {
            edges = vec![min, max];
        }
        Ok(Self { edges })
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero-based bucket index; out-of-range scores clamp to the end buckets
    pub fn bucket_of(&self, score: f64) -> usize {
        let upper = self.edges[self.edges.len() - 1];
        if score >= upper {
            return self.len() - 1;
        }
        self.edges
            .partition_point(|&e| e <= score)
            .saturating_sub(1)
            .min(self.len() - 1)
    }

    /// Display label per bucket
    pub fn labels(&self) -> Vec<String> {
        let last = self.len() - 1;
        (0..self.len())
            .map(|k| {
                let close = if k == last { "]" } else { ")" };
                format!("[{},{}{}", fmt_edge(self.edges[k]), fmt_edge(self.edges[k + 1]), close)
            })
            .collect()
    }

    /// Row count per bucket
    pub fn counts(&self, scores: &[i64]) -> Vec<usize> {
        let mut counts = vec![0; self.len()];
        for &s in scores {
            counts[self.bucket_of(s as f64)] += 1;
        }
        counts
    }
}

fn fmt_edge(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{:.1}", v)
    }
}

/// Linear-interpolated quantile of sorted values
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// One (dataset, bucket) row
#[derive(Debug, Clone, Serialize)]
pub struct GainsRow {
    pub dataset: String,
    /// One-based bucket number
    pub bucket: usize,
    pub score_range: String,
    pub count: usize,
    pub cum_count: usize,
    pub good: usize,
    pub cum_good: usize,
    pub bad: usize,
    pub cum_bad: usize,
    pub count_distr: f64,
    pub bad_prob: f64,
    pub cum_bad_prob: f64,
    /// Population share of this bucket and every safer one
    pub approval_rate: f64,
    pub rejected_rate: f64,
}

#[derive(Debug, Clone)]
pub struct GainsTable {
    pub buckets: ScoreBuckets,
    pub rows: Vec<GainsRow>,
}

impl GainsTable {
    pub fn rows_for<'a>(&'a self, dataset: &'a str) -> impl Iterator<Item = &'a GainsRow> + 'a {
        self.rows.iter().filter(move |r| r.dataset == dataset)
    }

    pub fn to_frame(&self) -> Result<DataFrame> {
        let r = &self.rows;
        Ok(DataFrame::new(vec![
            Column::new("dataset".into(), r.iter().map(|x| x.dataset.clone()).collect::<Vec<_>>()),
            Column::new("bucket".into(), r.iter().map(|x| x.bucket as u32).collect::<Vec<_>>()),
            Column::new(
                "score_range".into(),
                r.iter().map(|x| x.score_range.clone()).collect::<Vec<_>>(),
            ),
            Column::new("count".into(), r.iter().map(|x| x.count as u64).collect::<Vec<_>>()),
            Column::new(
                "cum_count".into(),
                r.iter().map(|x| x.cum_count as u64).collect::<Vec<_>>(),
            ),
            Column::new("good".into(), r.iter().map(|x| x.good as u64).collect::<Vec<_>>()),
            Column::new(
                "cum_good".into(),
                r.iter().map(|x| x.cum_good as u64).collect::<Vec<_>>(),
            ),
            Column::new("bad".into(), r.iter().map(|x| x.bad as u64).collect::<Vec<_>>()),
            Column::new("cum_bad".into(), r.iter().map(|x| x.cum_bad as u64).collect::<Vec<_>>()),
            Column::new(
                "count_distr".into(),
                r.iter().map(|x| x.count_distr).collect::<Vec<_>>(),
            ),
            Column::new("bad_prob".into(), r.iter().map(|x| x.bad_prob).collect::<Vec<_>>()),
            Column::new(
                "cum_bad_prob".into(),
                r.iter().map(|x| x.cum_bad_prob).collect::<Vec<_>>(),
            ),
            Column::new(
                "approval_rate".into(),
                r.iter().map(|x| x.approval_rate).collect::<Vec<_>>(),
            ),
            Column::new(
                "rejected_rate".into(),
                r.iter().map(|x| x.rejected_rate).collect::<Vec<_>>(),
            ),
        ])?)
    }
}

/// Pooled score buckets for a set of scored datasets
pub fn pooled_buckets(
    scored: &[ScoredDataset],
    bin_num: usize,
    bin_type: BucketType,
) -> Result<ScoreBuckets> {
    let pooled: Vec<f64> = scored
        .iter()
        .flat_map(|d| d.scores.iter().map(|&s| s as f64))
        .collect();
    ScoreBuckets::from_scores(&pooled, bin_num, bin_type)
}

/// Gains rows sorted by dataset (input order) then bucket
pub fn build_gains_table(scored: &[ScoredDataset], buckets: &ScoreBuckets) -> GainsTable {
    let labels = buckets.labels();
    let mut rows = Vec::with_capacity(scored.len() * buckets.len());

    for data in scored {
        let mut count = vec![0usize; buckets.len()];
        let mut bad = vec![0usize; buckets.len()];
        for (&s, &l) in data.scores.iter().zip(&data.labels) {
            let k = buckets.bucket_of(s as f64);
            count[k] += 1;
            bad[k] += l as usize;
        }

        let total = data.scores.len();
        let share = |n: usize| if total > 0 { n as f64 / total as f64 } else { 0.0 };
        let (mut cum_count, mut cum_bad) = (0, 0);

        for k in 0..buckets.len() {
            let good = count[k] - bad[k];
            let approval_rate = share(total - cum_count);
            cum_count += count[k];
            cum_bad += bad[k];
            rows.push(GainsRow {
                dataset: data.dataset.clone(),
                bucket: k + 1,
                score_range: labels[k].clone(),
                count: count[k],
                cum_count,
                good,
                cum_good: cum_count - cum_bad,
                bad: bad[k],
                cum_bad,
                count_distr: share(count[k]),
                bad_prob: if count[k] > 0 { bad[k] as f64 / count[k] as f64 } else { 0.0 },
                cum_bad_prob: if cum_count > 0 { cum_bad as f64 / cum_count as f64 } else { 0.0 },
                approval_rate,
                rejected_rate: 1.0 - approval_rate,
            });
        }
    }

    GainsTable {
        buckets: buckets.clone(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(name: &str, scores: Vec<i64>, labels: Vec<u8>) -> ScoredDataset {
        ScoredDataset {
            dataset: name.to_string(),
            scores,
            labels,
        }
    }

    #[test]
    fn test_freq_buckets_deduplicate() {
        let scores = [500.0, 500.0, 500.0, 500.0, 600.0, 700.0];
        let buckets = ScoreBuckets::from_scores(&scores, 5, BucketType::Freq).unwrap();
        let edges = buckets.edges();
        assert!(edges.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(edges[0], 500.0);
        assert_eq!(*edges.last().unwrap(), 700.0);
    }

    #[test]
    fn test_width_buckets_and_closed_last() {
        let scores = [400.0, 500.0, 600.0, 800.0];
        let buckets = ScoreBuckets::from_scores(&scores, 4, BucketType::Width).unwrap();
        assert_eq!(buckets.edges(), &[400.0, 500.0, 600.0, 700.0, 800.0]);
        assert_eq!(buckets.bucket_of(500.0), 1);
        assert_eq!(buckets.bucket_of(800.0), 3);
        assert_eq!(buckets.labels()[3], "[700,800]");
        assert_eq!(buckets.labels()[0], "[400,500)");
    }

    #[test]
    fn test_constant_scores_make_one_bucket() {
        let buckets = ScoreBuckets::from_scores(&[550.0; 5], 10, BucketType::Freq).unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets.bucket_of(550.0), 0);
    }

    #[test]
    fn test_final_cumulative_counts_match_dataset() {
        let train = scored(
            "train",
            vec![420, 480, 510, 530, 560, 590, 610, 640, 690, 720],
            vec![1, 1, 0, 1, 0, 0, 0, 1, 0, 0],
        );
        let test = scored("test", vec![450, 500, 650, 700], vec![1, 0, 0, 0]);
        let data = vec![train, test];
        let buckets = pooled_buckets(&data, 4, BucketType::Freq).unwrap();
        let table = build_gains_table(&data, &buckets);

        for d in &data {
            let last = table.rows_for(&d.dataset).last().unwrap();
            assert_eq!(last.cum_count, d.scores.len());
            assert_eq!(last.cum_bad, d.labels.iter().filter(|&&l| l == 1).count());
            assert!((last.rejected_rate - (1.0 - last.approval_rate)).abs() < 1e-12);
        }

        let first = table.rows_for("train").next().unwrap();
        assert_eq!(first.bucket, 1);
        assert!((first.approval_rate - 1.0).abs() < 1e-12);
        assert_eq!(table.rows[0].dataset, "train");
        assert_eq!(table.to_frame().unwrap().width(), 14);
    }

    #[test]
    fn test_empty_pool_rejected() {
        assert!(ScoreBuckets::from_scores(&[], 10, BucketType::Freq).is_err());
    }
}
