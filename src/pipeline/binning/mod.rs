//! WoE binning: fit one frozen bin definition on the reference dataset and
//! apply it unchanged to every dataset in the run.
//!
//! Bin order within a feature is fixed: the missing bin first, then the
//! special-values bin (when special values are configured), then the
//! numeric intervals or category groups. Numeric intervals are
//! left-closed and right-open, so a value equal to a cut point belongs to
//! the bin that starts at that cut point.

mod breaks;
mod engine;
mod woe;

use std::collections::HashMap;

use indicatif::ProgressBar;
use polars::prelude::*;
use rayon::prelude::*;
use serde::Serialize;

use super::dataset::Dataset;
use crate::error::{Result, ScorecardError};

pub use breaks::{
    format_number, parse_breaks, parse_special_values, BinningSpec, BreakSpec, GROUP_SEPARATOR,
};
pub use engine::{BinningEngine, CategoricalGrouping, GreedyBinningEngine};
pub use woe::calculate_woe_iv;

/// Suffix of WoE-encoded columns
pub const WOE_SUFFIX: &str = "_woe";

pub const MISSING_LABEL: &str = "missing";

/// Feature type for binning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeatureType {
    Numeric,
    Categorical,
}

impl std::fmt::Display for FeatureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureType::Numeric => write!(f, "numeric"),
            FeatureType::Categorical => write!(f, "categorical"),
        }
    }
}

/// Which raw values fall into a bin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BinRule {
    Missing,
    Special(Vec<String>),
    /// `[lower, upper)`
    Interval { lower: f64, upper: f64 },
    Group(Vec<String>),
}

/// A frozen bin with the statistics observed on the reference dataset
#[derive(Debug, Clone, Serialize)]
pub struct Bin {
    pub label: String,
    pub rule: BinRule,
    pub count: usize,
    pub good: usize,
    pub bad: usize,
    /// Share of the reference population in this bin
    pub count_distr: f64,
    pub bad_rate: f64,
    pub woe: f64,
    pub iv_contribution: f64,
}

/// Per-bin statistics of one dataset under the frozen rules
#[derive(Debug, Clone, Serialize)]
pub struct BinStat {
    pub bin: String,
    pub count: usize,
    pub good: usize,
    pub bad: usize,
    pub count_distr: f64,
    pub bad_rate: f64,
    /// WoE computed on this dataset's own counts
    pub woe: f64,
    pub iv_contribution: f64,
}

/// Raw feature values in the form the bin rules compare against
#[derive(Debug, Clone)]
pub enum FeatureValues {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
}

impl FeatureValues {
    pub fn len(&self) -> usize {
        match self {
            FeatureValues::Numeric(v) => v.len(),
            FeatureValues::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The frozen binning of a single feature
#[derive(Debug, Clone, Serialize)]
pub struct FeatureBins {
    pub feature: String,
    pub feature_type: FeatureType,
    pub bins: Vec<Bin>,
    pub iv: f64,
    /// Breaks came from the user rather than the engine
    pub supplied: bool,
    #[serde(skip)]
    cuts: Vec<f64>,
    #[serde(skip)]
    category_index: HashMap<String, usize>,
    #[serde(skip)]
    fallback: Option<usize>,
    #[serde(skip)]
    special_numbers: Vec<f64>,
    #[serde(skip)]
    special_texts: Vec<String>,
    #[serde(skip)]
    special_bin: Option<usize>,
    #[serde(skip)]
    first_value_bin: usize,
}

impl FeatureBins {
    /// Build the rules for a feature; statistics are filled by [`FeatureBins::freeze`]
    fn new(
        feature: &str,
        feature_type: FeatureType,
        specials: &[String],
        layout: ValueBins,
        supplied: bool,
    ) -> Result<Self> {
        let mut bins = vec![empty_bin(MISSING_LABEL.to_string(), BinRule::Missing)];

        let special_bin = if specials.is_empty() {
            None
        } else {
            bins.push(empty_bin(
                specials.join(GROUP_SEPARATOR),
                BinRule::Special(specials.to_vec()),
            ));
            Some(bins.len() - 1)
        };

        let special_numbers = match feature_type {
            FeatureType::Numeric => specials
                .iter()
                .map(|s| {
                    s.trim().parse::<f64>().map_err(|_| {
                        ScorecardError::binning(
                            feature,
                            format!("special value '{}' is not numeric", s),
                        )
                    })
                })
                .collect::<Result<Vec<f64>>>()?,
            FeatureType::Categorical => Vec::new(),
        };

        let first_value_bin = bins.len();
        let mut cuts = Vec::new();
        let mut category_index = HashMap::new();
        let mut fallback = None;

        match layout {
            ValueBins::Cuts(c) => {
                let mut lower = f64::NEG_INFINITY;
                for &cut in c.iter().chain(std::iter::once(&f64::INFINITY)) {
                    bins.push(empty_bin(
                        format!("[{},{})", format_number(lower), format_number(cut)),
                        BinRule::Interval { lower, upper: cut },
                    ));
                    lower = cut;
                }
                cuts = c;
            }
            ValueBins::Groups(grouping) => {
                for (g, members) in grouping.groups.into_iter().enumerate() {
                    let bin_idx = bins.len();
                    for m in &members {
                        if category_index.insert(m.clone(), bin_idx).is_some() {
                            return Err(ScorecardError::binning(
                                feature,
                                format!("category '{}' appears in more than one group", m),
                            ));
                        }
                    }
                    if grouping.fallback == Some(g) {
                        fallback = Some(bin_idx);
                    }
                    bins.push(empty_bin(members.join(GROUP_SEPARATOR), BinRule::Group(members)));
                }
            }
        }

        Ok(Self {
            feature: feature.to_string(),
            feature_type,
            bins,
            iv: 0.0,
            supplied,
            cuts,
            category_index,
            fallback,
            special_numbers,
            special_texts: match feature_type {
                FeatureType::Categorical => specials.to_vec(),
                FeatureType::Numeric => Vec::new(),
            },
            special_bin,
            first_value_bin,
        })
    }

    /// Numeric cut points (empty for categorical features)
    pub fn cuts(&self) -> &[f64] {
        &self.cuts
    }

    pub fn missing_bin(&self) -> usize {
        0
    }

    pub fn special_bin(&self) -> Option<usize> {
        self.special_bin
    }

    /// Bin index of a numeric value
    pub fn bin_of_number(&self, value: Option<f64>) -> usize {
        match value {
            None => 0,
            Some(v) if v.is_nan() => 0,
            Some(v) => {
                if let Some(special) = self.special_bin {
                    if self.special_numbers.iter().any(|s| *s == v) {
                        return special;
                    }
                }
                self.first_value_bin + self.cuts.partition_point(|&c| c <= v)
            }
        }
    }

    /// Bin index of a category, falling back to the rare-category group
    pub fn bin_of_category(&self, value: Option<&str>) -> Result<usize> {
        let Some(v) = value else {
            return Ok(0);
        };
        if let Some(special) = self.special_bin {
            if self.special_texts.iter().any(|s| s == v) {
                return Ok(special);
            }
        }
        match self.category_index.get(v) {
            Some(&idx) => Ok(idx),
            None => self.fallback.ok_or_else(|| {
                ScorecardError::binning(
                    &self.feature,
                    format!("category '{}' was not observed at fit time and no fallback bin exists", v),
                )
            }),
        }
    }

    /// A category the reference never produced, neither grouped nor special
    pub fn is_unseen_category(&self, value: &str) -> bool {
        self.feature_type == FeatureType::Categorical
            && !self.category_index.contains_key(value)
            && !self.special_texts.iter().any(|s| s == value)
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Bin index for every row
    pub fn assign(&self, values: &FeatureValues) -> Result<Vec<usize>> {
        match (self.feature_type, values) {
            (FeatureType::Numeric, FeatureValues::Numeric(v)) => {
                Ok(v.iter().map(|x| self.bin_of_number(*x)).collect())
            }
            (FeatureType::Categorical, FeatureValues::Categorical(v)) => v
                .iter()
                .map(|x| self.bin_of_category(x.as_deref()))
                .collect(),
            _ => Err(ScorecardError::binning(
                &self.feature,
                format!("values do not match the {} bin definition", self.feature_type),
            )),
        }
    }

    /// Per-bin statistics for a set of assignments
    pub fn statistics(&self, assignments: &[usize], labels: &[u8]) -> Vec<BinStat> {
        let mut counts = vec![(0usize, 0usize); self.bins.len()];
        for (&bin, &label) in assignments.iter().zip(labels.iter()) {
            counts[bin].0 += 1;
            counts[bin].1 += label as usize;
        }

        let total = assignments.len() as f64;
        let total_bad: f64 = counts.iter().map(|(_, b)| *b as f64).sum();
        let total_good = total - total_bad;

        self.bins
            .iter()
            .zip(counts)
            .map(|(bin, (count, bad))| {
                let good = count - bad;
                // Empty bins carry neutral evidence
                let (woe, iv) = if count == 0 {
                    (0.0, 0.0)
                } else {
                    calculate_woe_iv(bad as f64, good as f64, total_bad, total_good)
                };
                BinStat {
                    bin: bin.label.clone(),
                    count,
                    good,
                    bad,
                    count_distr: if total > 0.0 { count as f64 / total } else { 0.0 },
                    bad_rate: if count > 0 { bad as f64 / count as f64 } else { 0.0 },
                    woe,
                    iv_contribution: iv,
                }
            })
            .collect()
    }

    /// Freeze reference statistics into the bins
    fn freeze(&mut self, assignments: &[usize], labels: &[u8]) {
        let stats = self.statistics(assignments, labels);
        for (bin, stat) in self.bins.iter_mut().zip(stats) {
            bin.count = stat.count;
            bin.good = stat.good;
            bin.bad = stat.bad;
            bin.count_distr = stat.count_distr;
            bin.bad_rate = stat.bad_rate;
            bin.woe = stat.woe;
            bin.iv_contribution = stat.iv_contribution;
        }
        self.iv = self.bins.iter().map(|b| b.iv_contribution).sum();
    }

    /// WoE of a bin index
    pub fn woe(&self, bin: usize) -> f64 {
        self.bins[bin].woe
    }
}

fn empty_bin(label: String, rule: BinRule) -> Bin {
    Bin {
        label,
        rule,
        count: 0,
        good: 0,
        bad: 0,
        count_distr: 0.0,
        bad_rate: 0.0,
        woe: 0.0,
        iv_contribution: 0.0,
    }
}

enum ValueBins {
    Cuts(Vec<f64>),
    Groups(CategoricalGrouping),
}

/// Bin indices of every feature for one dataset, in definition order
#[derive(Debug, Clone)]
pub struct BinAssignments {
    pub dataset: String,
    pub columns: Vec<Vec<usize>>,
}

/// Rows of one feature routed to the fallback group because their
/// category never appeared in the reference
#[derive(Debug, Clone, PartialEq)]
pub struct UnseenCategories {
    pub feature: String,
    pub rows: usize,
    /// Distinct unseen values, sorted
    pub values: Vec<String>,
}

/// Per-feature statistics of one dataset
#[derive(Debug, Clone)]
pub struct FeatureBinTable {
    pub feature: String,
    pub rows: Vec<BinStat>,
    pub total_iv: f64,
}

/// Dataset whose feature columns are replaced by WoE values
#[derive(Debug, Clone)]
pub struct WoeEncodedDataset {
    name: String,
    features: Vec<String>,
    columns: Vec<Vec<f64>>,
    labels: Vec<u8>,
}

impl WoeEncodedDataset {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Original feature names, in definition order
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// WoE column for the feature at `idx`
    pub fn column(&self, idx: usize) -> &[f64] {
        &self.columns[idx]
    }

    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn height(&self) -> usize {
        self.labels.len()
    }

    /// `<feature>_woe` columns followed by the label column
    pub fn to_frame(&self, target: &str) -> Result<DataFrame> {
        let mut columns: Vec<Column> = self
            .features
            .iter()
            .zip(&self.columns)
            .map(|(f, values)| Column::new(format!("{}{}", f, WOE_SUFFIX).into(), values.clone()))
            .collect();
        let labels: Vec<i32> = self.labels.iter().map(|&l| l as i32).collect();
        columns.push(Column::new(target.into(), labels));
        Ok(DataFrame::new(columns)?)
    }
}

/// The single bin definition set of a run
#[derive(Debug, Clone, Serialize)]
pub struct BinDefinition {
    features: Vec<FeatureBins>,
}

impl BinDefinition {
    /// Fit bins for every feature on the reference dataset
    ///
    /// Features with supplied breaks use them as-is; the others go through
    /// the binning engine. Features are processed in parallel and returned
    /// in the requested order.
    pub fn fit(
        reference: &Dataset,
        features: &[String],
        spec: &BinningSpec,
        engine: &dyn BinningEngine,
        progress: &ProgressBar,
    ) -> Result<Self> {
        let features = features
            .par_iter()
            .map(|feature| {
                let fitted = fit_feature(reference, feature, spec, engine);
                progress.inc(1);
                fitted
            })
            .collect::<Result<Vec<FeatureBins>>>()?;
        Ok(Self { features })
    }

    pub fn features(&self) -> &[FeatureBins] {
        &self.features
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureBins> {
        self.features.iter().find(|f| f.feature == name)
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.feature.clone()).collect()
    }

    /// Bin index per row and feature
    pub fn assign(&self, dataset: &Dataset) -> Result<BinAssignments> {
        let columns = self
            .features
            .iter()
            .map(|fb| {
                let values = extract_values(dataset.frame(), &fb.feature, fb.feature_type)?;
                fb.assign(&values)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(BinAssignments {
            dataset: dataset.name().to_string(),
            columns,
        })
    }

    /// Replace every feature by the WoE of its bin
    pub fn apply(&self, dataset: &Dataset) -> Result<WoeEncodedDataset> {
        let assignments = self.assign(dataset)?;
        let columns = self
            .features
            .iter()
            .zip(&assignments.columns)
            .map(|(fb, bins)| bins.iter().map(|&b| fb.woe(b)).collect())
            .collect();
        Ok(WoeEncodedDataset {
            name: dataset.name().to_string(),
            features: self.feature_names(),
            columns,
            labels: dataset.labels().to_vec(),
        })
    }

    /// Categorical features of `dataset` holding categories unknown to the
    /// reference that were absorbed by a fallback group
    pub fn unseen_categories(&self, dataset: &Dataset) -> Result<Vec<UnseenCategories>> {
        let mut found = Vec::new();
        for fb in self.features.iter().filter(|f| f.has_fallback()) {
            let FeatureValues::Categorical(values) =
                extract_values(dataset.frame(), &fb.feature, fb.feature_type)?
            else {
                continue;
            };
            let mut rows = 0;
            let mut distinct: Vec<String> = Vec::new();
            for value in values.iter().flatten() {
                if fb.is_unseen_category(value) {
                    rows += 1;
                    if !distinct.contains(value) {
                        distinct.push(value.clone());
                    }
                }
            }
            if rows > 0 {
                distinct.sort();
                found.push(UnseenCategories {
                    feature: fb.feature.clone(),
                    rows,
                    values: distinct,
                });
            }
        }
        Ok(found)
    }

    /// Per-bin statistics of any dataset under the frozen rules
    pub fn tabulate(&self, dataset: &Dataset) -> Result<Vec<FeatureBinTable>> {
        let assignments = self.assign(dataset)?;
        Ok(self
            .features
            .iter()
            .zip(&assignments.columns)
            .map(|(fb, bins)| {
                let rows = fb.statistics(bins, dataset.labels());
                let total_iv = rows.iter().map(|r| r.iv_contribution).sum();
                FeatureBinTable {
                    feature: fb.feature.clone(),
                    rows,
                    total_iv,
                }
            })
            .collect())
    }

    /// Information value summary, sorted by IV descending
    pub fn iv_frame(&self) -> Result<DataFrame> {
        let mut order: Vec<&FeatureBins> = self.features.iter().collect();
        order.sort_by(|a, b| b.iv.partial_cmp(&a.iv).unwrap_or(std::cmp::Ordering::Equal));

        let names: Vec<String> = order.iter().map(|f| f.feature.clone()).collect();
        let types: Vec<String> = order.iter().map(|f| f.feature_type.to_string()).collect();
        let bins: Vec<u32> = order.iter().map(|f| f.bins.len() as u32).collect();
        let ivs: Vec<f64> = order.iter().map(|f| f.iv).collect();
        let supplied: Vec<bool> = order.iter().map(|f| f.supplied).collect();

        Ok(DataFrame::new(vec![
            Column::new("variable".into(), names),
            Column::new("type".into(), types),
            Column::new("bins".into(), bins),
            Column::new("info_value".into(), ivs),
            Column::new("breaks_supplied".into(), supplied),
        ])?)
    }
}

/// Convert one dataset's bin statistics for a feature to a report table
pub fn bin_table_frame(feature: &str, rows: &[BinStat], total_iv: f64) -> Result<DataFrame> {
    let n = rows.len();
    Ok(DataFrame::new(vec![
        Column::new("variable".into(), vec![feature.to_string(); n]),
        Column::new(
            "bin".into(),
            rows.iter().map(|r| r.bin.clone()).collect::<Vec<_>>(),
        ),
        Column::new(
            "count".into(),
            rows.iter().map(|r| r.count as u64).collect::<Vec<_>>(),
        ),
        Column::new(
            "count_distr".into(),
            rows.iter().map(|r| r.count_distr).collect::<Vec<_>>(),
        ),
        Column::new(
            "good".into(),
            rows.iter().map(|r| r.good as u64).collect::<Vec<_>>(),
        ),
        Column::new(
            "bad".into(),
            rows.iter().map(|r| r.bad as u64).collect::<Vec<_>>(),
        ),
        Column::new(
            "badprob".into(),
            rows.iter().map(|r| r.bad_rate).collect::<Vec<_>>(),
        ),
        Column::new("woe".into(), rows.iter().map(|r| r.woe).collect::<Vec<_>>()),
        Column::new(
            "bin_iv".into(),
            rows.iter().map(|r| r.iv_contribution).collect::<Vec<_>>(),
        ),
        Column::new("total_iv".into(), vec![total_iv; n]),
    ])?)
}

fn fit_feature(
    reference: &Dataset,
    feature: &str,
    spec: &BinningSpec,
    engine: &dyn BinningEngine,
) -> Result<FeatureBins> {
    let column = reference.frame().column(feature).map_err(|_| {
        ScorecardError::binning(feature, "column not found in the reference dataset")
    })?;
    let breaks = spec.breaks_for(feature);
    let feature_type = detect_feature_type(feature, column, breaks)?;
    let specials = spec.specials_for(feature);
    let values = extract_values(reference.frame(), feature, feature_type)?;
    let labels = reference.labels();

    let observed = match &values {
        FeatureValues::Numeric(v) => v.iter().any(|x| x.is_some()),
        FeatureValues::Categorical(v) => v.iter().any(|x| x.is_some()),
    };
    if !observed {
        return Err(ScorecardError::binning(
            feature,
            "no usable values in the reference dataset",
        ));
    }

    let (layout, supplied) = match (breaks, &values) {
        (Some(BreakSpec::Numeric(cuts)), _) => (ValueBins::Cuts(cuts.clone()), true),
        (Some(BreakSpec::Groups(groups)), _) => (
            ValueBins::Groups(CategoricalGrouping {
                groups: groups.clone(),
                fallback: None,
            }),
            true,
        ),
        (None, FeatureValues::Numeric(v)) => {
            let special_numbers: Vec<f64> = specials
                .iter()
                .filter_map(|s| s.trim().parse::<f64>().ok())
                .collect();
            let pairs: Vec<(f64, u8)> = v
                .iter()
                .zip(labels)
                .filter_map(|(x, &l)| match x {
                    Some(x) if !x.is_nan() && !special_numbers.contains(x) => Some((*x, l)),
                    _ => None,
                })
                .collect();
            (ValueBins::Cuts(engine.numeric_cuts(feature, &pairs)?), false)
        }
        (None, FeatureValues::Categorical(v)) => {
            let pairs: Vec<(String, u8)> = v
                .iter()
                .zip(labels)
                .filter_map(|(x, &l)| match x {
                    Some(x) if !specials.contains(x) => Some((x.clone(), l)),
                    _ => None,
                })
                .collect();
            (
                ValueBins::Groups(engine.categorical_groups(feature, &pairs)?),
                false,
            )
        }
    };

    let mut bins = FeatureBins::new(feature, feature_type, specials, layout, supplied)?;
    let assignments = bins.assign(&values)?;
    bins.freeze(&assignments, labels);
    Ok(bins)
}

fn detect_feature_type(
    feature: &str,
    column: &Column,
    breaks: Option<&BreakSpec>,
) -> Result<FeatureType> {
    let dtype = column.dtype();
    let is_numeric = dtype.is_primitive_numeric();
    let is_text = matches!(
        dtype,
        DataType::String | DataType::Categorical(_, _) | DataType::Boolean
    );

    match breaks {
        Some(BreakSpec::Groups(_)) if is_numeric || is_text => Ok(FeatureType::Categorical),
        Some(BreakSpec::Numeric(_)) if is_numeric => Ok(FeatureType::Numeric),
        Some(BreakSpec::Numeric(_)) => Err(ScorecardError::binning(
            feature,
            format!("numeric breaks supplied for a {} column", dtype),
        )),
        _ if is_numeric => Ok(FeatureType::Numeric),
        _ if is_text => Ok(FeatureType::Categorical),
        _ => Err(ScorecardError::binning(
            feature,
            format!("unsupported column type {}", dtype),
        )),
    }
}

/// Read a feature column in the form its bin rules expect
pub fn extract_values(
    df: &DataFrame,
    feature: &str,
    feature_type: FeatureType,
) -> Result<FeatureValues> {
    let column = df
        .column(feature)
        .map_err(|_| ScorecardError::binning(feature, "column not found"))?;

    match feature_type {
        FeatureType::Numeric => {
            let float_col = column.cast(&DataType::Float64)?;
            let values = float_col
                .f64()?
                .into_iter()
                .map(|v| v.filter(|x| !x.is_nan()))
                .collect();
            Ok(FeatureValues::Numeric(values))
        }
        FeatureType::Categorical => {
            let values: Vec<Option<String>> = if column.dtype().is_primitive_numeric() {
                let float_col = column.cast(&DataType::Float64)?;
                float_col
                    .f64()?
                    .into_iter()
                    .map(|v| v.filter(|x| !x.is_nan()).map(format_number))
                    .collect()
            } else {
                let string_col = column.cast(&DataType::String)?;
                string_col
                    .str()?
                    .into_iter()
                    .map(|v| v.map(|s| s.to_string()))
                    .collect()
            };
            Ok(FeatureValues::Categorical(values))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::dataset::{prepare_datasets, DatasetInput, PrepareOptions};

    fn reference(df: DataFrame) -> Dataset {
        prepare_datasets(DatasetInput::Single(df), &PrepareOptions::new("target"))
            .unwrap()
            .datasets
            .remove(0)
    }

    fn numeric_dataset() -> Dataset {
        let x: Vec<f64> = (0..60).map(|i| i as f64).collect();
        let target: Vec<i32> = (0..60).map(|i| (i % 3 == 0 || i > 45) as i32).collect();
        reference(df! { "x" => x, "target" => target }.unwrap())
    }

    #[test]
    fn test_supplied_breaks_give_expected_bins() {
        let ds = numeric_dataset();
        let spec = BinningSpec::default()
            .with_breaks("x", BreakSpec::numeric(vec![8.0, 16.0, 34.0, 44.0]).unwrap());
        let def = BinDefinition::fit(
            &ds,
            &["x".to_string()],
            &spec,
            &GreedyBinningEngine::default(),
            &ProgressBar::hidden(),
        )
        .unwrap();

        let fb = def.feature("x").unwrap();
        let value_bins: Vec<&Bin> = fb
            .bins
            .iter()
            .filter(|b| matches!(b.rule, BinRule::Interval { .. }))
            .collect();
        assert_eq!(value_bins.len(), 5);
        assert_eq!(value_bins[0].label, "[-inf,8)");
        assert_eq!(value_bins[2].label, "[16,34)");
        assert!(fb.supplied);

        // The boundary value belongs to the bin starting at it, every time
        for _ in 0..3 {
            let idx = fb.bin_of_number(Some(16.0));
            assert_eq!(fb.bins[idx].label, "[16,34)");
        }
        assert_eq!(fb.bins[fb.bin_of_number(Some(15.999))].label, "[8,16)");
    }

    #[test]
    fn test_missing_and_special_routing() {
        let ds = reference(
            df! {
                "x" => [Some(1.0f64), Some(-1.0), None, Some(5.0), Some(9.0), Some(-1.0)],
                "target" => [0i32, 1, 1, 0, 0, 1],
            }
            .unwrap(),
        );
        let spec = BinningSpec::default()
            .with_breaks("x", BreakSpec::numeric(vec![4.0]).unwrap())
            .with_special_values("x", ["-1"]);
        let def = BinDefinition::fit(
            &ds,
            &["x".to_string()],
            &spec,
            &GreedyBinningEngine::default(),
            &ProgressBar::hidden(),
        )
        .unwrap();
        let fb = def.feature("x").unwrap();

        assert_eq!(fb.bin_of_number(None), fb.missing_bin());
        assert_eq!(fb.bin_of_number(Some(f64::NAN)), fb.missing_bin());
        assert_eq!(Some(fb.bin_of_number(Some(-1.0))), fb.special_bin());

        let special = &fb.bins[fb.special_bin().unwrap()];
        assert_eq!(special.count, 2);
        assert_eq!(special.bad, 2);
        assert_eq!(fb.bins[fb.missing_bin()].count, 1);
    }

    #[test]
    fn test_unobserved_missing_bin_is_neutral() {
        let ds = numeric_dataset();
        let def = BinDefinition::fit(
            &ds,
            &["x".to_string()],
            &BinningSpec::default(),
            &GreedyBinningEngine::default(),
            &ProgressBar::hidden(),
        )
        .unwrap();
        let fb = def.feature("x").unwrap();
        let missing = &fb.bins[fb.missing_bin()];
        assert_eq!(missing.count, 0);
        assert_eq!(missing.woe, 0.0);
    }

    #[test]
    fn test_unseen_category_without_fallback_is_error() {
        let ds = reference(
            df! {
                "grade" => ["A", "B", "A", "B", "C", "C"],
                "target" => [0i32, 1, 0, 1, 0, 1],
            }
            .unwrap(),
        );
        let spec = BinningSpec::default().with_breaks("grade", BreakSpec::groups(&["A%,%B", "C"]));
        let def = BinDefinition::fit(
            &ds,
            &["grade".to_string()],
            &spec,
            &GreedyBinningEngine::default(),
            &ProgressBar::hidden(),
        )
        .unwrap();
        let fb = def.feature("grade").unwrap();

        assert_eq!(fb.bins[fb.bin_of_category(Some("B")).unwrap()].label, "A%,%B");
        let err = fb.bin_of_category(Some("Z")).unwrap_err();
        assert!(matches!(err, ScorecardError::Binning { .. }));
    }

    #[test]
    fn test_unseen_categories_reported_per_feature() {
        let mut grades = vec!["A"; 20];
        grades.extend(vec!["B"; 20]);
        grades.extend(["R", "S"]);
        let target: Vec<i32> = (0..42).map(|i| (i % 4 == 0) as i32).collect();
        let ds = reference(df! { "grade" => grades, "target" => target.clone() }.unwrap());
        let def = BinDefinition::fit(
            &ds,
            &["grade".to_string()],
            &BinningSpec::default(),
            &GreedyBinningEngine::default(),
            &ProgressBar::hidden(),
        )
        .unwrap();
        assert!(def.unseen_categories(&ds).unwrap().is_empty());

        let mut scored = vec!["A"; 38];
        scored.extend(["Z", "Y", "Z", "R"]);
        let other = reference(df! { "grade" => scored, "target" => target }.unwrap());
        let unseen = def.unseen_categories(&other).unwrap();
        assert_eq!(
            unseen,
            vec![UnseenCategories {
                feature: "grade".to_string(),
                rows: 3,
                values: vec!["Y".to_string(), "Z".to_string()],
            }]
        );
        assert!(def.apply(&other).is_ok());
    }

    #[test]
    fn test_supplied_groups_must_cover_reference_values() {
        let ds = reference(
            df! {
                "grade" => ["A", "B", "D"],
                "target" => [0i32, 1, 0],
            }
            .unwrap(),
        );
        let spec = BinningSpec::default().with_breaks("grade", BreakSpec::groups(&["A%,%B"]));
        let result = BinDefinition::fit(
            &ds,
            &["grade".to_string()],
            &spec,
            &GreedyBinningEngine::default(),
            &ProgressBar::hidden(),
        );
        assert!(result.unwrap_err().to_string().contains("'D'"));
    }

    #[test]
    fn test_apply_uses_frozen_woe() {
        let ds = numeric_dataset();
        let def = BinDefinition::fit(
            &ds,
            &["x".to_string()],
            &BinningSpec::default(),
            &GreedyBinningEngine::default(),
            &ProgressBar::hidden(),
        )
        .unwrap();

        let other = reference(
            df! {
                "x" => [0.0f64, 59.0, 30.0],
                "target" => [1i32, 1, 1],
            }
            .unwrap(),
        );
        let encoded = def.apply(&other).unwrap();
        let fb = def.feature("x").unwrap();
        for (i, v) in [0.0, 59.0, 30.0].iter().enumerate() {
            assert_eq!(encoded.column(0)[i], fb.woe(fb.bin_of_number(Some(*v))));
        }

        let frame = encoded.to_frame("target").unwrap();
        assert!(frame.column("x_woe").is_ok());
        assert_eq!(frame.height(), 3);
    }

    #[test]
    fn test_tabulate_counts_sum_to_rows() {
        let ds = numeric_dataset();
        let def = BinDefinition::fit(
            &ds,
            &["x".to_string()],
            &BinningSpec::default(),
            &GreedyBinningEngine::default(),
            &ProgressBar::hidden(),
        )
        .unwrap();
        let tables = def.tabulate(&ds).unwrap();
        let total: usize = tables[0].rows.iter().map(|r| r.count).sum();
        let bad: usize = tables[0].rows.iter().map(|r| r.bad).sum();
        assert_eq!(total, ds.height());
        assert_eq!(bad, ds.bad_count());
        assert!((tables[0].total_iv - def.feature("x").unwrap().iv).abs() < 1e-12);
    }

    #[test]
    fn test_numeric_breaks_on_text_column_rejected() {
        let ds = reference(
            df! {
                "grade" => ["A", "B"],
                "target" => [0i32, 1],
            }
            .unwrap(),
        );
        let spec = BinningSpec::default()
            .with_breaks("grade", BreakSpec::numeric(vec![1.0]).unwrap());
        let result = BinDefinition::fit(
            &ds,
            &["grade".to_string()],
            &spec,
            &GreedyBinningEngine::default(),
            &ProgressBar::hidden(),
        );
        assert!(matches!(result, Err(ScorecardError::Binning { .. })));
    }
}
