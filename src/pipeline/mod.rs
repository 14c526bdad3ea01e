//! Pipeline module - orchestrates the scorecard report stages
//!
//! Stages run strictly in order, each consuming the complete output of the
//! one before it: preparation, binning, training, scaling, performance,
//! stability, gains and report assembly. Any failure stops the run and is
//! returned as a [`PipelineError`] naming the stage and dataset.

pub mod binning;
pub mod config;
pub mod context;
pub mod dataset;
pub mod gains;
pub mod loader;
pub mod model;
pub mod performance;
pub mod scorecard;
pub mod stability;
pub mod target;

use std::path::PathBuf;
use std::sync::Arc;

pub use binning::{BinDefinition, BinningEngine, BinningSpec, BreakSpec, GreedyBinningEngine};
pub use config::{BinningMethod, BucketType, CurveKind, Metric, ReportConfig, ScalingConfig};
pub use context::RunContext;
pub use dataset::{prepare_datasets, Dataset, DatasetInput, PrepareOptions, PreparedDatasets};
pub use loader::{get_column_names, load_dataset, load_dataset_with_progress, InputSpec};
pub use model::{IrlsLogistic, Model, RegressionEngine};
pub use scorecard::ScoreCard;
pub use target::PositiveClass;

use crate::error::{PipelineError, ScorecardError, Stage};
use crate::report::{
    assemble_report, BitmapRenderer, BundleWriter, DatasetLine, PlotRenderer, ReportInputs,
    RunSummary,
};
use gains::{build_gains_table, pooled_buckets, ScoredDataset};
use performance::{curve, evaluate, PredictionSet};
use stability::analyze_stability;

/// Everything a run needs besides the collaborators
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    pub input: DatasetInput,
    pub target: String,
    /// None means every non-target column
    pub features: Option<Vec<String>>,
    pub binning: BinningSpec,
    pub seed: Option<u64>,
    pub positive: PositiveClass,
    pub output_dir: PathBuf,
    /// Artifact name stem
    pub output_name: String,
    pub config: ReportConfig,
}

impl PipelineInputs {
    pub fn new(input: DatasetInput, target: impl Into<String>) -> Self {
        Self {
            input,
            target: target.into(),
            features: None,
            binning: BinningSpec::default(),
            seed: None,
            positive: PositiveClass::default(),
            output_dir: PathBuf::from("."),
            output_name: "scorecard_report".to_string(),
            config: ReportConfig::default(),
        }
    }
}

/// External collaborators used by the stages
pub struct Collaborators<'a> {
    pub binning: &'a dyn BinningEngine,
    pub regression: &'a dyn RegressionEngine,
    pub renderer: &'a dyn PlotRenderer,
}

fn at(stage: Stage, dataset: Option<&str>) -> impl FnOnce(ScorecardError) -> PipelineError + '_ {
    move |source| PipelineError {
        stage,
        dataset: dataset.map(|d| d.to_string()),
        source,
    }
}

/// First stage that needs the pooled score buckets
fn bucket_stage(dataset_count: usize) -> Stage {
    if dataset_count > 1 {
        Stage::Stability
    } else {
        Stage::Gains
    }
}

/// Run the full pipeline with the default collaborators
pub fn run_pipeline(inputs: PipelineInputs, ctx: &mut RunContext) -> Result<RunSummary, PipelineError> {
    let binning = GreedyBinningEngine {
        method: inputs.config.binning_method,
        max_bins: inputs.config.woe_bins,
        min_category_samples: inputs.config.min_category_samples,
    };
    let regression = IrlsLogistic::default();
    let renderer = BitmapRenderer::default();
    run_pipeline_with(
        inputs,
        &Collaborators {
            binning: &binning,
            regression: &regression,
            renderer: &renderer,
        },
        ctx,
    )
}

/// Run the full pipeline and persist the report artifact
pub fn run_pipeline_with(
    inputs: PipelineInputs,
    collaborators: &Collaborators<'_>,
    ctx: &mut RunContext,
) -> Result<RunSummary, PipelineError> {
    let PipelineInputs {
        input,
        target,
        features,
        binning: binning_spec,
        seed,
        positive,
        output_dir,
        output_name,
        config,
    } = inputs;

    // Stage 1: datasets
    ctx.begin(Stage::Prepare);
    config.validate().map_err(at(Stage::Prepare, None))?;
    let prepared = prepare_datasets(
        input,
        &PrepareOptions {
            target: target.clone(),
            features,
            seed,
            split_ratio: config.split_ratio,
            positive,
        },
    )
    .map_err(at(Stage::Prepare, None))?;
    for warning in &prepared.warnings {
        ctx.warn(warning.clone());
    }
    for ds in &prepared.datasets {
        ctx.info(&format!(
            "{} ({}): {} rows, bad rate {:.2}%",
            ds.name(),
            ds.role(),
            ds.height(),
            ds.bad_rate() * 100.0
        ));
    }
    ctx.count("features", prepared.features.len(), None);
    let datasets = &prepared.datasets;
    let reference = prepared.reference();

    // Stage 2: bins fit on the reference, applied to every dataset
    ctx.begin(Stage::Binning);
    let pb = ctx.progress_bar(prepared.features.len() as u64, "Fitting bins");
    let definition = BinDefinition::fit(
        reference,
        &prepared.features,
        &binning_spec,
        collaborators.binning,
        &pb,
    )
    .map_err(at(Stage::Binning, Some(reference.name())))?;
    pb.finish_and_clear();

    let mut encoded = Vec::with_capacity(datasets.len());
    let mut bin_tables = Vec::with_capacity(datasets.len());
    for ds in datasets {
        encoded.push(
            definition
                .apply(ds)
                .map_err(at(Stage::Binning, Some(ds.name())))?,
        );
        bin_tables.push(
            definition
                .tabulate(ds)
                .map_err(at(Stage::Binning, Some(ds.name())))?,
        );
        let unseen = definition
            .unseen_categories(ds)
            .map_err(at(Stage::Binning, Some(ds.name())))?;
        for u in unseen {
            ctx.warn(format!(
                "{}: {} rows of '{}' have categories not seen in {} ({}), binned with the rare categories",
                ds.name(),
                u.rows,
                u.feature,
                reference.name(),
                u.values.join(", ")
            ));
        }
    }
    let supplied = definition.features().iter().filter(|f| f.supplied).count();
    ctx.success(&format!(
        "Binned {} features ({} with supplied breaks)",
        definition.features().len(),
        supplied
    ));

    // Stage 3: model on the reference encoding
    ctx.begin(Stage::Training);
    let spinner = ctx.spinner("Fitting logistic regression...");
    let model = collaborators
        .regression
        .fit(&encoded[0])
        .map_err(at(Stage::Training, Some(reference.name())))?;
    spinner.finish_and_clear();
    ctx.success(&format!(
        "Converged in {} iterations (AIC {:.2})",
        model.iterations, model.aic
    ));

    // Stage 4: points and scores
    ctx.begin(Stage::Scaling);
    let definition = Arc::new(definition);
    let card = ScoreCard::fit(Arc::clone(&definition), &model, config.scaling)
        .map_err(at(Stage::Scaling, None))?;
    let mut scored = Vec::with_capacity(datasets.len());
    for ds in datasets {
        scored.push(ScoredDataset {
            dataset: ds.name().to_string(),
            scores: card.score(ds).map_err(at(Stage::Scaling, Some(ds.name())))?,
            labels: ds.labels().to_vec(),
        });
    }
    ctx.success(&format!("Base points {}", card.base_points()));

    // Stage 5: metrics and curves per dataset
    ctx.begin(Stage::Performance);
    let mut predictions = Vec::with_capacity(datasets.len());
    for (ds, enc) in datasets.iter().zip(&encoded) {
        let probabilities = model
            .predict(enc)
            .map_err(at(Stage::Performance, Some(ds.name())))?;
        predictions.push(
            PredictionSet::new(ds.name(), probabilities, ds.labels().to_vec())
                .map_err(at(Stage::Performance, Some(ds.name())))?,
        );
    }
    let mut rows = Vec::with_capacity(predictions.len());
    let mut curves = Vec::new();
    for set in &predictions {
        let report = evaluate(std::slice::from_ref(set), &config.binomial_metric)
            .map_err(at(Stage::Performance, Some(set.dataset.as_str())))?;
        rows.extend(report.rows);
        for kind in &config.show_plot {
            curves.push(
                curve(*kind, set).map_err(at(Stage::Performance, Some(set.dataset.as_str())))?,
            );
        }
    }
    let performance = performance::PerformanceReport {
        metrics: config.binomial_metric.clone(),
        rows,
    };
    for (name, _) in &performance.rows {
        if let Some(auc) = performance.value(name, Metric::Auc) {
            ctx.info(&format!("{}: AUC {:.4}", name, auc));
        }
    }

    // Stage 6: stability, only with something to compare. The pooled score
    // buckets are cut by whichever of stability or gains runs first.
    let first_stage = bucket_stage(datasets.len());
    ctx.begin(first_stage);
    let buckets = pooled_buckets(&scored, config.bin_num, config.bin_type)
        .map_err(at(first_stage, None))?;
    let stability = if first_stage == Stage::Stability {
        let report = analyze_stability(&scored, &buckets, &bin_tables)
            .map_err(at(Stage::Stability, None))?;
        for psi in &report.score {
            ctx.info(&format!(
                "{} vs {}: PSI {:.4} ({})",
                psi.comparison,
                psi.reference,
                psi.psi,
                psi.verdict.label()
            ));
        }
        ctx.begin(Stage::Gains);
        Some(report)
    } else {
        None
    };

    // Stage 7: gains over the pooled buckets
    let gains = build_gains_table(&scored, &buckets);
    ctx.success(&format!("{} score buckets", buckets.len()));

    // Stage 8: document
    ctx.begin(Stage::Report);
    let document = assemble_report(
        &ReportInputs {
            datasets,
            target: &prepared.target,
            definition: &definition,
            bin_tables: &bin_tables,
            model: &model,
            card: &card,
            performance: &performance,
            curves: &curves,
            stability: stability.as_ref(),
            gains: &gains,
            config: &config,
        },
        collaborators.renderer,
        ctx,
    )
    .map_err(at(Stage::Report, None))?;

    let mut writer =
        BundleWriter::new(&output_dir, &output_name).map_err(at(Stage::Report, None))?;
    let spinner = ctx.spinner("Writing report bundle...");
    let artifact = document
        .persist(&mut writer)
        .map_err(at(Stage::Report, None))?;
    spinner.finish_and_clear();
    ctx.success(&format!("Saved {}", artifact.display()));
    ctx.finish();

    let dataset_lines = datasets
        .iter()
        .map(|ds| DatasetLine {
            name: ds.name().to_string(),
            rows: ds.height(),
            bad_rate: ds.bad_rate(),
            auc: performance.value(ds.name(), Metric::Auc),
            ks: performance.value(ds.name(), Metric::Ks),
            psi: stability.as_ref().and_then(|s| {
                s.score
                    .iter()
                    .find(|p| p.comparison == ds.name())
                    .map(|p| (p.psi, p.verdict))
            }),
        })
        .collect();

    Ok(RunSummary {
        artifact,
        features: definition.features().len(),
        base_points: card.base_points(),
        datasets: dataset_lines,
        sheets: document
            .sheet_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect(),
        warnings: ctx.warnings().to_vec(),
        stage_timings: ctx.timings().to_vec(),
        elapsed: ctx.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_cut_in_the_first_stage_using_them() {
        assert_eq!(bucket_stage(1), Stage::Gains);
        assert_eq!(bucket_stage(2), Stage::Stability);
        assert_eq!(bucket_stage(3), Stage::Stability);
    }

    #[test]
    fn test_error_mapping_keeps_stage_and_dataset() {
        let err = at(Stage::Stability, Some("oot"))(ScorecardError::StabilityFloor(
            "no scores".to_string(),
        ));
        assert_eq!(err.stage, Stage::Stability);
        assert_eq!(err.dataset.as_deref(), Some("oot"));
    }
}
