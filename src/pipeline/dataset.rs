//! Dataset preparation: split or wrap the input tables, normalize labels
//! and produce the ordered set of named datasets (reference first).

use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::target::{normalize_labels, PositiveClass};
use crate::error::{Result, ScorecardError};

/// Name of the dataset when a single table is used without splitting
pub const SINGLE_DATASET_NAME: &str = "dataset";
pub const TRAIN_NAME: &str = "train";
pub const TEST_NAME: &str = "test";

/// Role of a dataset within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetRole {
    /// First dataset, used for every fit
    Reference,
    Validation,
}

impl std::fmt::Display for DatasetRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetRole::Reference => write!(f, "reference"),
            DatasetRole::Validation => write!(f, "validation"),
        }
    }
}

/// A validated, immutable dataset with binary labels
#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    role: DatasetRole,
    frame: DataFrame,
    labels: Vec<u8>,
}

impl Dataset {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> DatasetRole {
        self.role
    }

    /// Underlying frame; the label column holds Int32 0/1
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn height(&self) -> usize {
        self.labels.len()
    }

    pub fn bad_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l == 1).count()
    }

    pub fn good_count(&self) -> usize {
        self.height() - self.bad_count()
    }

    pub fn bad_rate(&self) -> f64 {
        if self.labels.is_empty() {
            0.0
        } else {
            self.bad_count() as f64 / self.height() as f64
        }
    }
}

/// Raw pipeline input
#[derive(Debug, Clone)]
pub enum DatasetInput {
    /// One table, optionally split into train/test
    Single(DataFrame),
    /// Named tables in order; the first is the reference
    Named(Vec<(String, DataFrame)>),
}

/// Options for [`prepare_datasets`]
#[derive(Debug, Clone)]
pub struct PrepareOptions {
    pub target: String,
    /// Features to use; None means every non-target column
    pub features: Option<Vec<String>>,
    pub seed: Option<u64>,
    pub split_ratio: f64,
    pub positive: PositiveClass,
}

impl PrepareOptions {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            features: None,
            seed: None,
            split_ratio: 0.7,
            positive: PositiveClass::default(),
        }
    }
}

/// Output of the preparation stage
#[derive(Debug, Clone)]
pub struct PreparedDatasets {
    pub datasets: Vec<Dataset>,
    pub features: Vec<String>,
    pub target: String,
    /// Non-fatal notes (e.g. rows dropped for null labels)
    pub warnings: Vec<String>,
}

impl PreparedDatasets {
    pub fn reference(&self) -> &Dataset {
        &self.datasets[0]
    }

    pub fn names(&self) -> Vec<&str> {
        self.datasets.iter().map(|d| d.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

/// Turn the raw input into an ordered list of validated datasets
pub fn prepare_datasets(input: DatasetInput, opts: &PrepareOptions) -> Result<PreparedDatasets> {
    let tables: Vec<(String, DataFrame)> = match input {
        DatasetInput::Single(df) => match opts.seed {
            Some(seed) => {
                let (train_idx, test_idx) = split_indices(df.height(), seed, opts.split_ratio);
                vec![
                    (TRAIN_NAME.to_string(), take_rows(&df, train_idx)?),
                    (TEST_NAME.to_string(), take_rows(&df, test_idx)?),
                ]
            }
            None => vec![(SINGLE_DATASET_NAME.to_string(), df)],
        },
        DatasetInput::Named(tables) => tables,
    };

    if tables.is_empty() {
        return Err(ScorecardError::InputShape(
            "no datasets supplied: expected a table or a non-empty mapping of tables".to_string(),
        ));
    }

    for (i, (name, _)) in tables.iter().enumerate() {
        if name.trim().is_empty() {
            return Err(ScorecardError::InputShape(format!(
                "dataset #{} has an empty name",
                i + 1
            )));
        }
        if tables[..i].iter().any(|(other, _)| other == name) {
            return Err(ScorecardError::InputShape(format!(
                "dataset name '{}' is used more than once",
                name
            )));
        }
    }

    let features = resolve_features(&tables[0].1, &opts.target, opts.features.as_deref())?;

    let mut warnings = Vec::new();
    let mut datasets = Vec::with_capacity(tables.len());

    for (i, (name, df)) in tables.into_iter().enumerate() {
        check_columns(&name, &df, &opts.target, &features)?;

        if df.height() == 0 {
            return Err(ScorecardError::InputShape(format!(
                "dataset '{}' has no rows",
                name
            )));
        }

        let labels = normalize_labels(&df, &opts.target, &opts.positive)?;
        let nulls = labels.null_count();
        let (df, labels): (DataFrame, Vec<u8>) = if nulls > 0 {
            warnings.push(format!(
                "dataset '{}': dropped {} row(s) with a null '{}' label",
                name, nulls, opts.target
            ));
            let keep: Vec<u32> = labels
                .values
                .iter()
                .enumerate()
                .filter_map(|(idx, v)| v.map(|_| idx as u32))
                .collect();
            let labels = labels.values.iter().flatten().copied().collect();
            (take_rows(&df, keep)?, labels)
        } else {
            let labels = labels.values.iter().flatten().copied().collect();
            (df, labels)
        };

        let frame = with_binary_label(&df, &opts.target, &labels)?;
        datasets.push(Dataset {
            name,
            role: if i == 0 {
                DatasetRole::Reference
            } else {
                DatasetRole::Validation
            },
            frame,
            labels,
        });
    }

    Ok(PreparedDatasets {
        datasets,
        features,
        target: opts.target.clone(),
        warnings,
    })
}

/// Deterministic train/test row partition
///
/// Rows are permuted with a seeded `StdRng`; the first `round(n * ratio)`
/// permuted rows form the train set. Both index lists are returned sorted so
/// each split keeps the input row order.
pub fn split_indices(n: usize, seed: u64, ratio: f64) -> (Vec<u32>, Vec<u32>) {
    let mut indices: Vec<u32> = (0..n as u32).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train_len = ((n as f64) * ratio).round() as usize;
    let train_len = train_len.min(n);
    let (train, test) = indices.split_at(train_len);

    let mut train = train.to_vec();
    let mut test = test.to_vec();
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

fn take_rows(df: &DataFrame, rows: Vec<u32>) -> Result<DataFrame> {
    let idx = IdxCa::from_vec("idx".into(), rows.into_iter().map(|r| r as IdxSize).collect());
    Ok(df.take(&idx)?)
}

fn resolve_features(
    reference: &DataFrame,
    target: &str,
    requested: Option<&[String]>,
) -> Result<Vec<String>> {
    let features: Vec<String> = match requested {
        Some(list) => {
            let mut seen: Vec<String> = Vec::with_capacity(list.len());
            for f in list {
                if f == target {
                    return Err(ScorecardError::InputShape(format!(
                        "target column '{}' cannot also be a feature",
                        target
                    )));
                }
                if !seen.contains(f) {
                    seen.push(f.clone());
                }
            }
            seen
        }
        None => reference
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .filter(|name| name != target)
            .collect(),
    };

    if features.is_empty() {
        return Err(ScorecardError::InputShape(
            "no feature columns available besides the target".to_string(),
        ));
    }
    Ok(features)
}

fn check_columns(name: &str, df: &DataFrame, target: &str, features: &[String]) -> Result<()> {
    let columns: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    if !columns.iter().any(|c| c == target) {
        return Err(ScorecardError::InputShape(format!(
            "dataset '{}' has no target column '{}'. Available columns: {:?}",
            name, target, columns
        )));
    }

    let missing: Vec<&String> = features.iter().filter(|f| !columns.contains(f)).collect();
    if !missing.is_empty() {
        return Err(ScorecardError::InputShape(format!(
            "dataset '{}' is missing feature column(s) {:?}",
            name, missing
        )));
    }
    Ok(())
}

/// Replace the label column by its Int32 0/1 form
fn with_binary_label(df: &DataFrame, target: &str, labels: &[u8]) -> Result<DataFrame> {
    let mut frame = df.drop(target)?;
    let values: Vec<i32> = labels.iter().map(|&l| l as i32).collect();
    frame.with_column(Column::new(target.into(), values))?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame(n: usize) -> DataFrame {
        let ids: Vec<i64> = (0..n as i64).collect();
        let target: Vec<i32> = (0..n).map(|i| (i % 4 == 0) as i32).collect();
        df! {
            "id" => ids,
            "target" => target,
        }
        .unwrap()
    }

    #[test]
    fn test_split_is_deterministic() {
        let a = split_indices(100, 618, 0.7);
        let b = split_indices(100, 618, 0.7);
        assert_eq!(a, b);

        let c = split_indices(100, 619, 0.7);
        assert_ne!(a.0, c.0);
    }

    #[test]
    fn test_split_sizes_and_disjoint() {
        let (train, test) = split_indices(1000, 618, 0.7);
        assert_eq!(train.len(), 700);
        assert_eq!(test.len(), 300);

        let mut all: Vec<u32> = train.iter().chain(test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..1000).collect::<Vec<u32>>());
    }

    #[test]
    fn test_no_seed_wraps_single_dataset() {
        let prepared = prepare_datasets(
            DatasetInput::Single(sample_frame(40)),
            &PrepareOptions::new("target"),
        )
        .unwrap();

        assert_eq!(prepared.len(), 1);
        assert_eq!(prepared.reference().name(), SINGLE_DATASET_NAME);
        assert_eq!(prepared.reference().height(), 40);
        assert_eq!(prepared.reference().role(), DatasetRole::Reference);
        assert_eq!(prepared.features, vec!["id".to_string()]);
    }

    #[test]
    fn test_named_inputs_keep_order() {
        let input = DatasetInput::Named(vec![
            ("dev".to_string(), sample_frame(20)),
            ("oot".to_string(), sample_frame(10)),
            ("holdout".to_string(), sample_frame(12)),
        ]);
        let prepared = prepare_datasets(input, &PrepareOptions::new("target")).unwrap();

        assert_eq!(prepared.names(), vec!["dev", "oot", "holdout"]);
        assert_eq!(prepared.datasets[1].role(), DatasetRole::Validation);
        assert_eq!(prepared.datasets[2].height(), 12);
    }

    #[test]
    fn test_empty_mapping_is_shape_error() {
        let result = prepare_datasets(DatasetInput::Named(vec![]), &PrepareOptions::new("target"));
        assert!(matches!(result, Err(ScorecardError::InputShape(_))));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let input = DatasetInput::Named(vec![
            ("a".to_string(), sample_frame(8)),
            ("a".to_string(), sample_frame(8)),
        ]);
        let result = prepare_datasets(input, &PrepareOptions::new("target"));
        assert!(result.unwrap_err().to_string().contains("more than once"));
    }

    #[test]
    fn test_missing_feature_in_validation_set() {
        let other = df! {
            "target" => [0i32, 1, 0],
        }
        .unwrap();
        let input = DatasetInput::Named(vec![
            ("train".to_string(), sample_frame(8)),
            ("test".to_string(), other),
        ]);
        let result = prepare_datasets(input, &PrepareOptions::new("target"));
        assert!(result.unwrap_err().to_string().contains("missing feature"));
    }

    #[test]
    fn test_null_labels_dropped_with_warning() {
        let df = df! {
            "x" => [1.0f64, 2.0, 3.0, 4.0],
            "target" => [Some(0i32), None, Some(1), Some(0)],
        }
        .unwrap();
        let prepared =
            prepare_datasets(DatasetInput::Single(df), &PrepareOptions::new("target")).unwrap();

        let ds = prepared.reference();
        assert_eq!(ds.height(), 3);
        assert_eq!(ds.labels(), &[0, 1, 0]);
        assert_eq!(ds.frame().height(), 3);
        assert_eq!(prepared.warnings.len(), 1);
    }

    #[test]
    fn test_label_column_normalized_in_frame() {
        let df = df! {
            "x" => [1.0f64, 2.0, 3.0],
            "flag" => ["good", "bad", "good"],
        }
        .unwrap();
        let prepared =
            prepare_datasets(DatasetInput::Single(df), &PrepareOptions::new("flag")).unwrap();

        let col = prepared.reference().frame().column("flag").unwrap();
        let values: Vec<Option<i32>> = col.i32().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(0), Some(1), Some(0)]);
    }
}
