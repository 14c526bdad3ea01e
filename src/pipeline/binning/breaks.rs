//! User-supplied break lists and special values
//!
//! Breaks are read from JSON:
//!
//! ```json
//! { "age": [25, 35, 50], "grade": ["A%,%B", "C", "D%,%E"] }
//! ```
//!
//! Numbers give numeric cut points; strings give categorical groups whose
//! members are separated by `%,%`.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, ScorecardError};

/// Separator between category members inside one group label
pub const GROUP_SEPARATOR: &str = "%,%";

/// Externally supplied binning for one feature
#[derive(Debug, Clone, PartialEq)]
pub enum BreakSpec {
    /// Sorted, de-duplicated finite cut points
    Numeric(Vec<f64>),
    /// Category groups, one bin each
    Groups(Vec<Vec<String>>),
}

impl BreakSpec {
    /// Build numeric cut points, sorting and removing duplicates
    pub fn numeric(cuts: impl IntoIterator<Item = f64>) -> Result<Self> {
        let mut cuts: Vec<f64> = cuts.into_iter().collect();
        if let Some(bad) = cuts.iter().find(|c| !c.is_finite()) {
            return Err(ScorecardError::Config(format!(
                "break points must be finite, got {}",
                bad
            )));
        }
        cuts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        cuts.dedup();
        Ok(BreakSpec::Numeric(cuts))
    }

    /// Build category groups from `%,%`-joined labels
    pub fn groups<S: AsRef<str>>(labels: &[S]) -> Self {
        BreakSpec::Groups(
            labels
                .iter()
                .map(|label| {
                    label
                        .as_ref()
                        .split(GROUP_SEPARATOR)
                        .map(|s| s.to_string())
                        .collect()
                })
                .collect(),
        )
    }
}

/// Breaks and special values for a run, keyed by feature
#[derive(Debug, Clone, Default)]
pub struct BinningSpec {
    pub breaks: HashMap<String, BreakSpec>,
    pub special_values: HashMap<String, Vec<String>>,
}

impl BinningSpec {
    pub fn with_breaks(mut self, feature: impl Into<String>, spec: BreakSpec) -> Self {
        self.breaks.insert(feature.into(), spec);
        self
    }

    pub fn with_special_values<I, S>(mut self, feature: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.special_values
            .insert(feature.into(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn breaks_for(&self, feature: &str) -> Option<&BreakSpec> {
        self.breaks.get(feature)
    }

    pub fn specials_for(&self, feature: &str) -> &[String] {
        self.special_values
            .get(feature)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Load `--breaks` and `--special-values` JSON files
    pub fn from_files(breaks: Option<&Path>, special_values: Option<&Path>) -> Result<Self> {
        let mut spec = BinningSpec::default();
        if let Some(path) = breaks {
            spec.breaks = parse_breaks(&read_json(path)?)?;
        }
        if let Some(path) = special_values {
            spec.special_values = parse_special_values(&read_json(path)?)?;
        }
        Ok(spec)
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ScorecardError::io(format!("reading {}", path.display()), e))?;
    serde_json::from_str(&text)
        .map_err(|e| ScorecardError::Config(format!("{} is not valid JSON: {}", path.display(), e)))
}

/// Parse a breaks object: feature → array of numbers or of group labels
pub fn parse_breaks(value: &Value) -> Result<HashMap<String, BreakSpec>> {
    let object = value
        .as_object()
        .ok_or_else(|| ScorecardError::Config("breaks must be a JSON object".to_string()))?;

    let mut breaks = HashMap::new();
    for (feature, entry) in object {
        let items = entry.as_array().ok_or_else(|| {
            ScorecardError::Config(format!("breaks for '{}' must be an array", feature))
        })?;

        let spec = if items.iter().all(|v| v.is_number()) {
            BreakSpec::numeric(items.iter().filter_map(|v| v.as_f64()))?
        } else if items.iter().all(|v| v.is_string()) {
            let labels: Vec<&str> = items.iter().filter_map(|v| v.as_str()).collect();
            BreakSpec::groups(&labels)
        } else {
            return Err(ScorecardError::Config(format!(
                "breaks for '{}' must be all numbers or all strings",
                feature
            )));
        };
        breaks.insert(feature.clone(), spec);
    }
    Ok(breaks)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SpecialValue {
    Number(f64),
    Text(String),
}

/// Parse a special-values object: feature → array of numbers/strings
pub fn parse_special_values(value: &Value) -> Result<HashMap<String, Vec<String>>> {
    let map: HashMap<String, Vec<SpecialValue>> = serde_json::from_value(value.clone())
        .map_err(|e| ScorecardError::Config(format!("invalid special values: {}", e)))?;

    Ok(map
        .into_iter()
        .map(|(feature, values)| {
            let values = values
                .into_iter()
                .map(|v| match v {
                    SpecialValue::Number(n) => format_number(n),
                    SpecialValue::Text(s) => s,
                })
                .collect();
            (feature, values)
        })
        .collect())
}

/// Compact number formatting used for labels and special values
pub fn format_number(n: f64) -> String {
    if n.is_infinite() {
        if n > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}
