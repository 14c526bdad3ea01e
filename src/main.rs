//! Score-phi: Credit Scorecard Report CLI Tool
//!
//! Loads one or more labeled tables, fits a WoE scorecard on the first and
//! writes a report document covering every dataset.

use anyhow::{Context, Result};
use clap::Parser;
use console::style;

use scorephi::cli::Cli;
use scorephi::pipeline::{
    get_column_names, load_dataset_with_progress, run_pipeline, BinningSpec, DatasetInput,
    PipelineInputs, RunContext,
};
use scorephi::utils::styling::{
    print_banner, print_completion, print_config, print_success, ConfigCard,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let quiet = cli.quiet;

    let config = cli.report_config();

    if !quiet {
        print_banner(env!("CARGO_PKG_VERSION"));
        let inputs = cli.input_labels();
        print_config(&ConfigCard {
            inputs: &inputs,
            target: &cli.target,
            output_dir: &cli.output_dir,
            bin_num: config.bin_num,
            points0: config.scaling.points0,
            pdo: config.scaling.pdo,
        });
    }

    // Verify the target column exists before reading any data
    for spec in &cli.inputs {
        let columns = get_column_names(&spec.path)?;
        if !columns.contains(&cli.target) {
            anyhow::bail!(
                "Target column '{}' not found in {}. Available columns: {:?}",
                cli.target,
                spec.path.display(),
                columns
            );
        }
    }

    let binning = BinningSpec::from_files(cli.breaks.as_deref(), cli.special_values.as_deref())
        .context("Failed to read binning inputs")?;

    let mut tables = Vec::with_capacity(cli.inputs.len());
    for spec in &cli.inputs {
        if !quiet {
            println!();
        }
        let (df, rows, cols, memory_mb) =
            load_dataset_with_progress(&spec.path, cli.infer_schema_length)?;
        if !quiet {
            print_success(&format!("Loaded '{}'", spec.dataset_name()));
            println!(
                "      {} rows, {} columns, {:.2} MB",
                style(rows).yellow(),
                style(cols).yellow(),
                memory_mb
            );
        }
        tables.push((spec.dataset_name(), df));
    }

    let input = match (cli.inputs.len(), cli.inputs.first()) {
        (1, Some(spec)) if spec.name.is_none() => {
            let (_, df) = tables.remove(0);
            DatasetInput::Single(df)
        }
        _ => DatasetInput::Named(tables),
    };

    let inputs = PipelineInputs {
        input,
        target: cli.target.clone(),
        features: cli.feature_list(),
        binning,
        seed: cli.seed,
        positive: cli.positive_class(),
        output_dir: cli.output_dir.clone(),
        output_name: cli.name.clone(),
        config,
    };

    let mut ctx = RunContext::new(quiet);
    let summary = run_pipeline(inputs, &mut ctx)?;

    if quiet {
        println!("{}", summary.artifact.display());
    } else {
        summary.display();
        print_completion(&summary.artifact);
    }

    Ok(())
}
