//! Builds the report document from the pipeline outputs
//!
//! Sheets are created in a fixed order: dataset, model, performance,
//! binning, scorecard, stability (only with more than one dataset) and
//! gains. Charts are rendered in parallel and embedded once encoded.

use polars::prelude::*;
use rayon::prelude::*;

use super::document::{table_extent, ReportDocument, SheetBuilder};
use super::layout::{
    binning_image_region, binning_sheet_layout, binning_table_region, performance_image_region,
    performance_sheet_layout, stacked_layout, Extent, BIN_TABLE_COLS, IMAGE_COLS, IMAGE_ROWS,
    PERFORMANCE_TABLE,
};
use super::render::{PlotRenderer, RenderedImage};
use crate::error::{Result, ScorecardError};
use crate::pipeline::binning::{bin_table_frame, BinDefinition, FeatureBinTable};
use crate::pipeline::config::ReportConfig;
use crate::pipeline::context::RunContext;
use crate::pipeline::dataset::Dataset;
use crate::pipeline::gains::GainsTable;
use crate::pipeline::model::Model;
use crate::pipeline::performance::{Curve, PerformanceReport};
use crate::pipeline::scorecard::ScoreCard;
use crate::pipeline::stability::StabilityReport;

pub const SHEET_DATASET: &str = "dataset";
pub const SHEET_MODEL: &str = "model";
pub const SHEET_PERFORMANCE: &str = "performance";
pub const SHEET_BINNING: &str = "binning";
pub const SHEET_SCORECARD: &str = "scorecard";
pub const SHEET_STABILITY: &str = "stability";
pub const SHEET_GAINS: &str = "gains";

/// Everything the report is assembled from
pub struct ReportInputs<'a> {
    pub datasets: &'a [Dataset],
    pub target: &'a str,
    pub definition: &'a BinDefinition,
    /// Bin tables per dataset, in dataset order
    pub bin_tables: &'a [Vec<FeatureBinTable>],
    pub model: &'a Model,
    pub card: &'a ScoreCard,
    pub performance: &'a PerformanceReport,
    /// Curves for every (dataset, plot kind) pair
    pub curves: &'a [Curve],
    pub stability: Option<&'a StabilityReport>,
    pub gains: &'a GainsTable,
    pub config: &'a ReportConfig,
}

/// Lay out and fill every sheet
pub fn assemble_report(
    inputs: &ReportInputs<'_>,
    renderer: &dyn PlotRenderer,
    ctx: &RunContext,
) -> Result<ReportDocument> {
    let mut doc = ReportDocument::new();

    add(&mut doc, ctx, dataset_sheet(inputs)?)?;
    add(&mut doc, ctx, model_sheet(inputs.model)?)?;
    add(&mut doc, ctx, performance_sheet(inputs, renderer)?)?;
    add(&mut doc, ctx, binning_sheet(inputs, renderer)?)?;
    add(&mut doc, ctx, scorecard_sheet(inputs.card)?)?;
    if inputs.datasets.len() > 1 {
        let stability = inputs.stability.ok_or_else(|| {
            ScorecardError::InputShape("stability results missing for a multi-dataset run".to_string())
        })?;
        add(&mut doc, ctx, stability_sheet(stability, renderer)?)?;
    }
    add(&mut doc, ctx, gains_sheet(inputs.gains)?)?;

    Ok(doc)
}

fn add(doc: &mut ReportDocument, ctx: &RunContext, sheet: SheetBuilder) -> Result<()> {
    let sheet = sheet.build()?;
    let name = sheet.name.clone();
    doc.add_sheet(sheet)?;
    ctx.success(&format!("Sheet '{}' laid out", name));
    Ok(())
}

/// Stack tables vertically on one sheet
fn stacked_sheet(name: &str, tables: Vec<(String, DataFrame)>) -> SheetBuilder {
    let extents: Vec<(String, Extent)> = tables
        .iter()
        .map(|(region, frame)| (region.clone(), table_extent(frame)))
        .collect();
    let mut sheet = SheetBuilder::new(name).layout(stacked_layout(&extents));
    for (region, frame) in tables {
        sheet.table(region, frame);
    }
    sheet
}

fn dataset_sheet(inputs: &ReportInputs<'_>) -> Result<SheetBuilder> {
    let ds = inputs.datasets;
    let summary = DataFrame::new(vec![
        Column::new(
            "dataset".into(),
            ds.iter().map(|d| d.name().to_string()).collect::<Vec<_>>(),
        ),
        Column::new(
            "role".into(),
            ds.iter().map(|d| d.role().to_string()).collect::<Vec<_>>(),
        ),
        Column::new("rows".into(), ds.iter().map(|d| d.height() as u64).collect::<Vec<_>>()),
        Column::new("good".into(), ds.iter().map(|d| d.good_count() as u64).collect::<Vec<_>>()),
        Column::new("bad".into(), ds.iter().map(|d| d.bad_count() as u64).collect::<Vec<_>>()),
        Column::new("bad_rate".into(), ds.iter().map(|d| d.bad_rate()).collect::<Vec<_>>()),
    ])?;

    let c = inputs.config;
    let settings: Vec<(&str, String)> = vec![
        ("target", inputs.target.to_string()),
        ("features", inputs.definition.features().len().to_string()),
        ("bin_num", c.bin_num.to_string()),
        ("bin_type", c.bin_type.to_string()),
        ("woe_bins", c.woe_bins.to_string()),
        ("binning_method", c.binning_method.to_string()),
        (
            "binomial_metric",
            c.binomial_metric
                .iter()
                .map(|m| m.name())
                .collect::<Vec<_>>()
                .join(","),
        ),
        (
            "show_plot",
            c.show_plot.iter().map(|k| k.name()).collect::<Vec<_>>().join(","),
        ),
    ];
    let settings = DataFrame::new(vec![
        Column::new(
            "setting".into(),
            settings.iter().map(|(k, _)| k.to_string()).collect::<Vec<_>>(),
        ),
        Column::new(
            "value".into(),
            settings.into_iter().map(|(_, v)| v).collect::<Vec<_>>(),
        ),
    ])?;

    Ok(stacked_sheet(
        SHEET_DATASET,
        vec![
            ("summary".to_string(), summary),
            ("settings".to_string(), settings),
            ("information_value".to_string(), inputs.definition.iv_frame()?),
        ],
    ))
}

fn model_sheet(model: &Model) -> Result<SheetBuilder> {
    Ok(stacked_sheet(
        SHEET_MODEL,
        vec![
            ("coefficients".to_string(), model.coefficient_frame()?),
            ("diagnostics".to_string(), model.diagnostics_frame()?),
        ],
    ))
}

fn performance_sheet(inputs: &ReportInputs<'_>, renderer: &dyn PlotRenderer) -> Result<SheetBuilder> {
    let metrics = inputs.performance.to_frame()?;
    let datasets: Vec<String> = inputs.datasets.iter().map(|d| d.name().to_string()).collect();
    let kinds: Vec<String> = inputs
        .config
        .show_plot
        .iter()
        .map(|k| k.name().to_string())
        .collect();

    let images: Vec<(String, RenderedImage)> = inputs
        .curves
        .par_iter()
        .map(|curve| {
            let image = renderer.render_curve(curve)?;
            Ok((performance_image_region(&curve.dataset, curve.kind.name()), image))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut sheet = SheetBuilder::new(SHEET_PERFORMANCE).layout(performance_sheet_layout(
        table_extent(&metrics),
        &datasets,
        &kinds,
    ));
    sheet.table(PERFORMANCE_TABLE, metrics);
    for (region, image) in images {
        sheet.image(region, image);
    }
    Ok(sheet)
}

fn binning_sheet(inputs: &ReportInputs<'_>, renderer: &dyn PlotRenderer) -> Result<SheetBuilder> {
    let datasets: Vec<String> = inputs.datasets.iter().map(|d| d.name().to_string()).collect();
    let variables = inputs.definition.feature_names();
    let max_table_rows = inputs
        .definition
        .features()
        .iter()
        .map(|f| f.bins.len() as u32 + 1)
        .max()
        .unwrap_or(1);

    let jobs: Vec<(&str, &FeatureBinTable)> = datasets
        .iter()
        .zip(inputs.bin_tables)
        .flat_map(|(name, tables)| tables.iter().map(move |t| (name.as_str(), t)))
        .collect();

    let images: Vec<(String, RenderedImage)> = jobs
        .par_iter()
        .map(|(dataset, table)| {
            let image = renderer.render_bins(&table.feature, &table.rows)?;
            Ok((binning_image_region(dataset, &table.feature), image))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut sheet = SheetBuilder::new(SHEET_BINNING).layout(binning_sheet_layout(
        &datasets,
        &variables,
        max_table_rows,
    ));
    for (dataset, table) in &jobs {
        let frame = bin_table_frame(&table.feature, &table.rows, table.total_iv)?;
        debug_assert_eq!(frame.width() as u32, BIN_TABLE_COLS);
        sheet.table(binning_table_region(dataset, &table.feature), frame);
    }
    for (region, image) in images {
        sheet.image(region, image);
    }
    Ok(sheet)
}

fn scorecard_sheet(card: &ScoreCard) -> Result<SheetBuilder> {
    Ok(stacked_sheet(
        SHEET_SCORECARD,
        vec![
            ("scaling".to_string(), card.parameters_frame()?),
            ("card".to_string(), card.to_frame()?),
        ],
    ))
}

fn stability_sheet(report: &StabilityReport, renderer: &dyn PlotRenderer) -> Result<SheetBuilder> {
    let summary = report.summary_frame()?;
    let distribution = report.distribution_frame()?;
    let characteristics = report.characteristic_frame()?;

    let mut shares: Vec<(String, Vec<f64>)> = Vec::new();
    if let Some(first) = report.score.first() {
        shares.push((
            first.reference.clone(),
            first.rows.iter().map(|r| r.expected_pct).collect(),
        ));
    }
    for psi in &report.score {
        shares.push((
            psi.comparison.clone(),
            psi.rows.iter().map(|r| r.actual_pct).collect(),
        ));
    }
    let image = renderer.render_distribution(&shares)?;

    let regions = vec![
        ("psi".to_string(), table_extent(&summary)),
        ("score_distribution".to_string(), table_extent(&distribution)),
        ("distribution_plot".to_string(), Extent::new(IMAGE_ROWS, IMAGE_COLS)),
        ("characteristic_stability".to_string(), table_extent(&characteristics)),
    ];
    let mut sheet = SheetBuilder::new(SHEET_STABILITY).layout(stacked_layout(&regions));
    sheet.table("psi", summary);
    sheet.table("score_distribution", distribution);
    sheet.image("distribution_plot", image);
    sheet.table("characteristic_stability", characteristics);
    Ok(sheet)
}

fn gains_sheet(gains: &GainsTable) -> Result<SheetBuilder> {
    Ok(stacked_sheet(
        SHEET_GAINS,
        vec![("gains_table".to_string(), gains.to_frame()?)],
    ))
}
