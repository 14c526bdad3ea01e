//! Automatic bin search
//!
//! Numeric features get pre-bins (equal-frequency or CART splits) that are
//! merged greedily by smallest IV loss until the bin limit is reached.
//! Categorical features merge rare categories into one group, order the
//! groups by WoE and merge adjacent groups the same way.

use std::collections::HashMap;

use super::woe::calculate_woe_iv;
use crate::error::Result;
use crate::pipeline::config::BinningMethod;

/// Number of initial quantile pre-bins before merging
const PRE_BIN_COUNT: usize = 50;

/// Minimum samples per bin to avoid unstable WoE estimates
const MIN_BIN_SAMPLES: usize = 5;

/// Categorical grouping produced by a binning engine
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalGrouping {
    pub groups: Vec<Vec<String>>,
    /// Group that receives categories not seen at fit time
    pub fallback: Option<usize>,
}

/// Cut-point search used when no breaks are supplied for a feature
pub trait BinningEngine: Sync {
    /// Cut points for a numeric feature from its non-missing (value, label) pairs
    fn numeric_cuts(&self, feature: &str, pairs: &[(f64, u8)]) -> Result<Vec<f64>>;

    /// Category groups from non-missing (category, label) pairs
    fn categorical_groups(&self, feature: &str, pairs: &[(String, u8)])
        -> Result<CategoricalGrouping>;
}

/// Default engine: pre-binning followed by greedy IV-loss merging
#[derive(Debug, Clone)]
pub struct GreedyBinningEngine {
    pub method: BinningMethod,
    pub max_bins: usize,
    pub min_category_samples: usize,
}

impl Default for GreedyBinningEngine {
    fn default() -> Self {
        Self {
            method: BinningMethod::Cart,
            max_bins: 8,
            min_category_samples: 5,
        }
    }
}

/// Working bin during the search
#[derive(Debug, Clone)]
struct SearchBin {
    /// Lower bound (inclusive)
    lower: f64,
    events: f64,
    non_events: f64,
    iv_contribution: f64,
}

/// Working category group during the search
#[derive(Debug, Clone)]
struct SearchGroup {
    members: Vec<String>,
    events: f64,
    non_events: f64,
    woe: f64,
    iv_contribution: f64,
    holds_rare: bool,
}

impl BinningEngine for GreedyBinningEngine {
    fn numeric_cuts(&self, _feature: &str, pairs: &[(f64, u8)]) -> Result<Vec<f64>> {
        if pairs.len() < MIN_BIN_SAMPLES * 2 {
            return Ok(Vec::new());
        }

        let mut sorted: Vec<(f64, u8)> = pairs.to_vec();
        sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let total_events = sorted.iter().filter(|(_, t)| *t == 1).count() as f64;
        let total_non_events = sorted.len() as f64 - total_events;

        let bins = match self.method {
            BinningMethod::Quantile => {
                let pre_bins =
                    create_quantile_prebins(&sorted, PRE_BIN_COUNT, total_events, total_non_events);
                greedy_merge_bins(pre_bins, self.max_bins, total_events, total_non_events)
            }
            BinningMethod::Cart => {
                let pre_bins = create_cart_prebins(
                    &sorted,
                    self.max_bins,
                    MIN_BIN_SAMPLES,
                    total_events,
                    total_non_events,
                );
                greedy_merge_bins(pre_bins, self.max_bins, total_events, total_non_events)
            }
        };

        Ok(bins.iter().skip(1).map(|b| b.lower).collect())
    }

    fn categorical_groups(
        &self,
        _feature: &str,
        pairs: &[(String, u8)],
    ) -> Result<CategoricalGrouping> {
        let mut stats: HashMap<&str, (f64, f64, usize)> = HashMap::new();
        for (cat, t) in pairs {
            let entry = stats.entry(cat.as_str()).or_insert((0.0, 0.0, 0));
            if *t == 1 {
                entry.0 += 1.0;
            } else {
                entry.1 += 1.0;
            }
            entry.2 += 1;
        }

        let total_events: f64 = stats.values().map(|(e, _, _)| *e).sum();
        let total_non_events: f64 = stats.values().map(|(_, ne, _)| *ne).sum();

        // Merge rare categories into one group (based on raw count)
        let mut other = SearchGroup {
            members: Vec::new(),
            events: 0.0,
            non_events: 0.0,
            woe: 0.0,
            iv_contribution: 0.0,
            holds_rare: true,
        };
        let mut groups: Vec<SearchGroup> = Vec::new();

        let mut categories: Vec<(&str, (f64, f64, usize))> = stats.into_iter().collect();
        categories.sort_by(|a, b| a.0.cmp(b.0));

        for (cat, (events, non_events, raw_count)) in categories {
            if raw_count < self.min_category_samples {
                other.members.push(cat.to_string());
                other.events += events;
                other.non_events += non_events;
            } else {
                groups.push(SearchGroup {
                    members: vec![cat.to_string()],
                    events,
                    non_events,
                    woe: 0.0,
                    iv_contribution: 0.0,
                    holds_rare: false,
                });
            }
        }
        if !other.members.is_empty() {
            groups.push(other);
        }

        for g in groups.iter_mut() {
            let (woe, iv) = calculate_woe_iv(g.events, g.non_events, total_events, total_non_events);
            g.woe = woe;
            g.iv_contribution = iv;
        }

        // Sort by WoE so adjacent groups have similar risk
        groups.sort_by(|a, b| a.woe.partial_cmp(&b.woe).unwrap_or(std::cmp::Ordering::Equal));

        let groups = greedy_merge_groups(groups, self.max_bins, total_events, total_non_events);
        let fallback = groups.iter().position(|g| g.holds_rare);

        Ok(CategoricalGrouping {
            groups: groups.into_iter().map(|g| g.members).collect(),
            fallback,
        })
    }
}

/// Calculate Gini impurity for a set of samples
///
/// For binary classification: Gini = 2 * p * (1 - p)
/// where p is the proportion of positive class (events).
fn gini_impurity(events: f64, non_events: f64) -> f64 {
    let total = events + non_events;
    if total == 0.0 {
        return 0.0;
    }
    let p = events / total;
    2.0 * p * (1.0 - p)
}

/// Find the best split point that maximizes Gini reduction
///
/// Returns the index where the right side starts and the gain, or None if
/// no split satisfies `min_samples` on both sides.
fn find_best_split(sorted_pairs: &[(f64, u8)], min_samples: usize) -> Option<(usize, f64)> {
    let n = sorted_pairs.len();
    if n < 2 * min_samples {
        return None;
    }

    let total_events = sorted_pairs.iter().filter(|(_, t)| *t == 1).count() as f64;
    let total_non_events = n as f64 - total_events;
    let total = n as f64;
    let parent_gini = gini_impurity(total_events, total_non_events);

    let mut best_gain = 0.0;
    let mut best_split_idx = None;
    let mut left_events = 0.0f64;
    let mut left_non_events = 0.0f64;

    for i in 0..n - 1 {
        if sorted_pairs[i].1 == 1 {
            left_events += 1.0;
        } else {
            left_non_events += 1.0;
        }

        let left_count = i + 1;
        let right_count = n - left_count;
        if left_count < min_samples || right_count < min_samples {
            continue;
        }

        // Never split within a run of equal values
        if (sorted_pairs[i].0 - sorted_pairs[i + 1].0).abs() < 1e-10 {
            continue;
        }

        let right_events = total_events - left_events;
        let right_non_events = total_non_events - left_non_events;

        let left_prop = left_count as f64 / total;
        let right_prop = right_count as f64 / total;
        let weighted_child_gini = left_prop * gini_impurity(left_events, left_non_events)
            + right_prop * gini_impurity(right_events, right_non_events);

        let gain = parent_gini - weighted_child_gini;
        if gain > best_gain {
            best_gain = gain;
            best_split_idx = Some(i + 1);
        }
    }

    best_split_idx.map(|idx| (idx, best_gain))
}

fn find_cart_splits_recursive(
    sorted_pairs: &[(f64, u8)],
    offset: usize,
    max_splits: usize,
    min_samples: usize,
    split_indices: &mut Vec<usize>,
) {
    if max_splits == 0 || sorted_pairs.len() < 2 * min_samples {
        return;
    }

    if let Some((local_split_idx, _gain)) = find_best_split(sorted_pairs, min_samples) {
        let global_split_idx = offset + local_split_idx;
        split_indices.push(global_split_idx);

        let (left, right) = sorted_pairs.split_at(local_split_idx);
        let remaining_splits = max_splits - 1;
        let left_splits = remaining_splits / 2;
        let right_splits = remaining_splits - left_splits;

        find_cart_splits_recursive(left, offset, left_splits, min_samples, split_indices);
        find_cart_splits_recursive(right, global_split_idx, right_splits, min_samples, split_indices);
    }
}

/// Pre-bins from recursive CART splits
fn create_cart_prebins(
    sorted_pairs: &[(f64, u8)],
    max_bins: usize,
    min_bin_samples: usize,
    total_events: f64,
    total_non_events: f64,
) -> Vec<SearchBin> {
    let mut split_indices = Vec::new();
    find_cart_splits_recursive(
        sorted_pairs,
        0,
        max_bins.saturating_sub(1),
        min_bin_samples,
        &mut split_indices,
    );
    split_indices.sort_unstable();

    let mut boundaries = vec![0];
    boundaries.extend(split_indices);
    boundaries.push(sorted_pairs.len());

    boundaries
        .windows(2)
        .filter(|w| w[1] > w[0])
        .map(|w| search_bin(&sorted_pairs[w[0]..w[1]], total_events, total_non_events))
        .collect()
}

/// Equal-frequency pre-bins that never split a run of equal values
fn create_quantile_prebins(
    sorted_pairs: &[(f64, u8)],
    num_prebins: usize,
    total_events: f64,
    total_non_events: f64,
) -> Vec<SearchBin> {
    let n = sorted_pairs.len();
    let bin_size = n.div_ceil(num_prebins).max(1);

    let mut bins = Vec::new();
    let mut start_idx = 0;

    while start_idx < n {
        let mut end_idx = (start_idx + bin_size).min(n);
        while end_idx < n && sorted_pairs[end_idx].0 == sorted_pairs[end_idx - 1].0 {
            end_idx += 1;
        }
        bins.push(search_bin(
            &sorted_pairs[start_idx..end_idx],
            total_events,
            total_non_events,
        ));
        start_idx = end_idx;
    }

    bins
}

fn search_bin(pairs: &[(f64, u8)], total_events: f64, total_non_events: f64) -> SearchBin {
    let events = pairs.iter().filter(|(_, t)| *t == 1).count() as f64;
    let non_events = pairs.len() as f64 - events;
    let (_, iv_contribution) = calculate_woe_iv(events, non_events, total_events, total_non_events);
    SearchBin {
        lower: pairs.first().map(|(v, _)| *v).unwrap_or(f64::NEG_INFINITY),
        events,
        non_events,
        iv_contribution,
    }
}

/// Greedy merge adjacent bins to minimize IV loss until target bin count is reached
fn greedy_merge_bins(
    mut bins: Vec<SearchBin>,
    target_bins: usize,
    total_events: f64,
    total_non_events: f64,
) -> Vec<SearchBin> {
    while bins.len() > target_bins.max(1) {
        let mut min_loss = f64::MAX;
        let mut merge_idx = 0;

        for i in 0..bins.len() - 1 {
            let (_, merged_iv) = calculate_woe_iv(
                bins[i].events + bins[i + 1].events,
                bins[i].non_events + bins[i + 1].non_events,
                total_events,
                total_non_events,
            );
            let loss = bins[i].iv_contribution + bins[i + 1].iv_contribution - merged_iv;
            if loss < min_loss {
                min_loss = loss;
                merge_idx = i;
            }
        }

        let right = bins.remove(merge_idx + 1);
        let left = &mut bins[merge_idx];
        left.events += right.events;
        left.non_events += right.non_events;
        left.iv_contribution =
            calculate_woe_iv(left.events, left.non_events, total_events, total_non_events).1;
    }

    bins
}

fn greedy_merge_groups(
    mut groups: Vec<SearchGroup>,
    target_bins: usize,
    total_events: f64,
    total_non_events: f64,
) -> Vec<SearchGroup> {
    while groups.len() > target_bins.max(1) {
        let mut min_loss = f64::MAX;
        let mut merge_idx = 0;

        for i in 0..groups.len() - 1 {
            let (_, merged_iv) = calculate_woe_iv(
                groups[i].events + groups[i + 1].events,
                groups[i].non_events + groups[i + 1].non_events,
                total_events,
                total_non_events,
            );
            let loss = groups[i].iv_contribution + groups[i + 1].iv_contribution - merged_iv;
            if loss < min_loss {
                min_loss = loss;
                merge_idx = i;
            }
        }

        let right = groups.remove(merge_idx + 1);
        let left = &mut groups[merge_idx];
        left.members.extend(right.members);
        left.events += right.events;
        left.non_events += right.non_events;
        left.holds_rare |= right.holds_rare;
        let (woe, iv) =
            calculate_woe_iv(left.events, left.non_events, total_events, total_non_events);
        left.woe = woe;
        left.iv_contribution = iv;
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gini_impurity() {
        assert!((gini_impurity(0.0, 10.0) - 0.0).abs() < 0.01);
        assert!((gini_impurity(5.0, 5.0) - 0.5).abs() < 0.01);
        let skewed = gini_impurity(9.0, 1.0);
        assert!(skewed > 0.0 && skewed < 0.5);
    }

    #[test]
    fn test_find_best_split() {
        let pairs = vec![(1.0, 0), (2.0, 0), (3.0, 1), (4.0, 1)];
        let (split_idx, gain) = find_best_split(&pairs, 1).unwrap();
        assert_eq!(split_idx, 2, "Should split between 2.0 and 3.0");
        assert!(gain > 0.0);
    }

    #[test]
    fn test_find_best_split_no_valid_split() {
        let pairs = vec![(1.0, 0), (2.0, 1)];
        assert!(find_best_split(&pairs, 2).is_none());
    }

    #[test]
    fn test_cart_cuts_separate_classes() {
        let pairs: Vec<(f64, u8)> = (0..40).map(|i| (i as f64, (i >= 20) as u8)).collect();
        let engine = GreedyBinningEngine {
            method: BinningMethod::Cart,
            max_bins: 4,
            min_category_samples: 5,
        };
        let cuts = engine.numeric_cuts("x", &pairs).unwrap();
        assert!(cuts.contains(&20.0), "cuts {:?} should contain the class boundary", cuts);
        assert!(cuts.len() <= 3);
        assert!(cuts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_quantile_cuts_respect_max_bins() {
        let pairs: Vec<(f64, u8)> = (0..200)
            .map(|i| (i as f64, ((i * 7) % 3 == 0) as u8))
            .collect();
        let engine = GreedyBinningEngine {
            method: BinningMethod::Quantile,
            max_bins: 5,
            min_category_samples: 5,
        };
        let cuts = engine.numeric_cuts("x", &pairs).unwrap();
        assert!(cuts.len() <= 4);
        assert!(cuts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_quantile_prebins_do_not_split_ties() {
        let pairs: Vec<(f64, u8)> = (0..20).map(|i| ((i / 10) as f64, (i % 2) as u8)).collect();
        let bins = create_quantile_prebins(&pairs, 4, 10.0, 10.0);
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[1].lower, 1.0);
    }

    #[test]
    fn test_too_few_values_gives_single_bin() {
        let pairs = vec![(1.0, 0), (2.0, 1), (3.0, 0)];
        let cuts = GreedyBinningEngine::default().numeric_cuts("x", &pairs).unwrap();
        assert!(cuts.is_empty());
    }

    #[test]
    fn test_categorical_rare_categories_form_fallback_group() {
        let mut pairs: Vec<(String, u8)> = Vec::new();
        for i in 0..20 {
            pairs.push(("A".to_string(), (i % 5 == 0) as u8));
            pairs.push(("B".to_string(), (i % 2 == 0) as u8));
        }
        pairs.push(("rare1".to_string(), 1));
        pairs.push(("rare2".to_string(), 0));

        let engine = GreedyBinningEngine {
            method: BinningMethod::Cart,
            max_bins: 8,
            min_category_samples: 5,
        };
        let grouping = engine.categorical_groups("grade", &pairs).unwrap();

        assert_eq!(grouping.groups.len(), 3);
        let fallback = grouping.fallback.expect("rare group should be the fallback");
        assert!(grouping.groups[fallback].contains(&"rare1".to_string()));
        assert!(grouping.groups[fallback].contains(&"rare2".to_string()));
    }

    #[test]
    fn test_categorical_groups_merged_to_limit() {
        let mut pairs: Vec<(String, u8)> = Vec::new();
        for cat in ["a", "b", "c", "d", "e", "f"] {
            for i in 0..10 {
                pairs.push((cat.to_string(), (i < cat.len() + 2) as u8));
            }
        }
        let engine = GreedyBinningEngine {
            method: BinningMethod::Cart,
            max_bins: 2,
            min_category_samples: 5,
        };
        let grouping = engine.categorical_groups("c", &pairs).unwrap();
        assert_eq!(grouping.groups.len(), 2);
        assert!(grouping.fallback.is_none());
        let members: usize = grouping.groups.iter().map(|g| g.len()).sum();
        assert_eq!(members, 6);
    }
}
