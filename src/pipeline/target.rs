//! Label column normalization
//!
//! Converts an arbitrary label column (0/1 integers, "good"/"bad" strings,
//! booleans...) into the binary 0/1 labels every later stage works with.

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScorecardError};

/// Tokens that denote the positive ("bad") class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositiveClass {
    tokens: Vec<String>,
}

impl PositiveClass {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(|t| t.into().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Whether a label value (in its string form) denotes the positive class
    pub fn matches(&self, value: &str) -> bool {
        let value = value.trim().to_lowercase();
        self.tokens.iter().any(|t| *t == value)
    }
}

impl Default for PositiveClass {
    fn default() -> Self {
        Self::new(["bad", "1"])
    }
}

/// Binary labels extracted from a table
#[derive(Debug, Clone)]
pub struct NormalizedLabels {
    /// One entry per input row; None where the label was null
    pub values: Vec<Option<u8>>,
    /// The raw value mapped to 1, if the positive class is present
    pub positive_value: Option<String>,
    /// The raw value mapped to 0, if both classes are present
    pub negative_value: Option<String>,
}

impl NormalizedLabels {
    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }
}

/// Normalize a label column to 0/1 using the positive-class tokens
///
/// The column must hold at most two distinct non-null values and, when two
/// are present, exactly one of them must match a positive token. Constant
/// labels are accepted here; they are rejected later where they make a
/// metric or the model fit undefined.
pub fn normalize_labels(
    df: &DataFrame,
    target: &str,
    positive: &PositiveClass,
) -> Result<NormalizedLabels> {
    let target_col = df.column(target).map_err(|_| {
        ScorecardError::InputShape(format!("Target column '{}' not found", target))
    })?;

    if target_col.len() == 0 {
        return Err(ScorecardError::label(target, "column is empty"));
    }
    if target_col.null_count() == target_col.len() {
        return Err(ScorecardError::label(target, "column contains only null values"));
    }

    let raw = column_to_string_vec(target_col)?;

    let mut distinct: Vec<String> = raw.iter().flatten().cloned().collect();
    distinct.sort();
    distinct.dedup();

    if distinct.len() > 2 {
        return Err(ScorecardError::label(
            target,
            format!(
                "must be binary. Found {} unique values: {:?}",
                distinct.len(),
                distinct
            ),
        ));
    }

    let positives: Vec<&String> = distinct.iter().filter(|v| positive.matches(v)).collect();
    let positive_value = match positives.as_slice() {
        [one] => Some((*one).clone()),
        // A single non-matching value is an all-negative sample
        [] if distinct.len() == 1 => None,
        [] => {
            return Err(ScorecardError::label(
                target,
                format!(
                    "no value matches the positive class {:?}. Found values: {:?}",
                    positive.tokens(),
                    distinct
                ),
            ))
        }
        _ => {
            return Err(ScorecardError::label(
                target,
                format!(
                    "both values {:?} match the positive class {:?}",
                    distinct,
                    positive.tokens()
                ),
            ))
        }
    };
    let negative_value = distinct
        .iter()
        .find(|v| Some(*v) != positive_value.as_ref())
        .cloned();

    let values = raw
        .iter()
        .map(|v| {
            v.as_ref()
                .map(|s| u8::from(Some(s) == positive_value.as_ref()))
        })
        .collect();

    Ok(NormalizedLabels {
        values,
        positive_value,
        negative_value,
    })
}

/// Convert a column to a Vec of Option<String> for comparison
fn column_to_string_vec(col: &Column) -> Result<Vec<Option<String>>> {
    let values: Vec<Option<String>> = match col.dtype() {
        DataType::String => col
            .str()?
            .into_iter()
            .map(|v| v.map(|s| s.to_string()))
            .collect(),
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            let cast = col.cast(&DataType::Int64)?;
            cast.i64()?
                .into_iter()
                .map(|v| v.map(|n| n.to_string()))
                .collect()
        }
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
            let cast = col.cast(&DataType::UInt64)?;
            cast.u64()?
                .into_iter()
                .map(|v| v.map(|n| n.to_string()))
                .collect()
        }
        DataType::Float32 | DataType::Float64 => {
            let cast = col.cast(&DataType::Float64)?;
            cast.f64()?
                .into_iter()
                .map(|v| v.map(format_float_label))
                .collect()
        }
        DataType::Boolean => col
            .bool()?
            .into_iter()
            .map(|v| v.map(|b| if b { "1".to_string() } else { "0".to_string() }))
            .collect(),
        _ => {
            let cast = col.cast(&DataType::String)?;
            cast.str()?
                .into_iter()
                .map(|v| v.map(|s| s.to_string()))
                .collect()
        }
    };

    Ok(values)
}

/// Float labels such as 1.0 read back from CSV compare as "1"
fn format_float_label(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}
