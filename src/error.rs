//! Error types for the scorecard pipeline.
//!
//! Every failure is fatal for a run. Stage functions return
//! [`ScorecardError`]; the orchestrator wraps it in a [`PipelineError`]
//! that records which stage and which dataset were being processed.

use std::fmt;

use polars::prelude::PolarsError;
use thiserror::Error;

/// Domain errors raised by the pipeline stages.
#[derive(Debug, Error)]
pub enum ScorecardError {
    /// Input is not a usable table or mapping of tables.
    #[error("Input shape error: {0}")]
    InputShape(String),

    /// The label column cannot be coerced to binary 0/1.
    #[error("Label column '{column}' is invalid: {reason}")]
    LabelValidation { column: String, reason: String },

    /// Bin fitting or bin assignment failed for a feature.
    #[error("Binning failed for feature '{feature}': {reason}")]
    Binning { feature: String, reason: String },

    /// The regression did not converge or the design matrix is singular.
    #[error("Model fit failed: {0}")]
    FitConvergence(String),

    /// A rank metric cannot be computed for a dataset.
    #[error("Metric '{metric}' is undefined: {reason}")]
    MetricUndefined { metric: String, reason: String },

    /// A stability distribution has no population to compare against.
    #[error("Stability floor error: {0}")]
    StabilityFloor(String),

    /// Configuration values are out of range.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Report regions overlap or overflow their band.
    #[error("Layout error: {0}")]
    Layout(String),

    /// The plot backend failed to produce an image.
    #[error("Render error: {0}")]
    Render(String),

    /// The report artifact cannot be persisted.
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Frame-level failure inside polars.
    #[error(transparent)]
    Frame(#[from] PolarsError),
}

impl ScorecardError {
    pub fn binning(feature: &str, reason: impl Into<String>) -> Self {
        ScorecardError::Binning {
            feature: feature.to_string(),
            reason: reason.into(),
        }
    }

    pub fn label(column: &str, reason: impl Into<String>) -> Self {
        ScorecardError::LabelValidation {
            column: column.to_string(),
            reason: reason.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ScorecardError::Io {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T, E = ScorecardError> = std::result::Result<T, E>;

/// Pipeline stage, used for progress output and error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Prepare,
    Binning,
    Training,
    Scaling,
    Performance,
    Stability,
    Gains,
    Report,
}

impl Stage {
    pub fn title(&self) -> &'static str {
        match self {
            Stage::Prepare => "Dataset Preparation",
            Stage::Binning => "WoE Binning",
            Stage::Training => "Model Training",
            Stage::Scaling => "Score Scaling",
            Stage::Performance => "Model Performance",
            Stage::Stability => "Population Stability",
            Stage::Gains => "Gains Table",
            Stage::Report => "Report Assembly",
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            Stage::Prepare => 1,
            Stage::Binning => 2,
            Stage::Training => 3,
            Stage::Scaling => 4,
            Stage::Performance => 5,
            Stage::Stability => 6,
            Stage::Gains => 7,
            Stage::Report => 8,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title())
    }
}

/// A stage failure with the dataset it happened on.
#[derive(Debug, Error)]
#[error("{stage} failed{}: {source}", on_dataset(.dataset))]
pub struct PipelineError {
    pub stage: Stage,
    pub dataset: Option<String>,
    #[source]
    pub source: ScorecardError,
}

fn on_dataset(dataset: &Option<String>) -> String {
    dataset
        .as_deref()
        .map(|name| format!(" on dataset '{}'", name))
        .unwrap_or_default()
}
