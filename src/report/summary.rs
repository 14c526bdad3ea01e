//! End-of-run summary

use std::path::PathBuf;
use std::time::Duration;

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, Color, Table};
use console::style;

use crate::error::Stage;
use crate::pipeline::config::Metric;
use crate::pipeline::stability::StabilityVerdict;

/// Headline figures for one dataset
#[derive(Debug, Clone)]
pub struct DatasetLine {
    pub name: String,
    pub rows: usize,
    pub bad_rate: f64,
    pub auc: Option<f64>,
    pub ks: Option<f64>,
    /// PSI against the reference (None for the reference itself)
    pub psi: Option<(f64, StabilityVerdict)>,
}

/// What a run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub artifact: PathBuf,
    pub features: usize,
    pub base_points: i64,
    pub datasets: Vec<DatasetLine>,
    pub sheets: Vec<String>,
    pub warnings: Vec<String>,
    /// Wall time per stage, in run order
    pub stage_timings: Vec<(Stage, Duration)>,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Dataset line by name
    pub fn dataset(&self, name: &str) -> Option<&DatasetLine> {
        self.datasets.iter().find(|d| d.name == name)
    }

    /// The slowest stage, if any ran
    pub fn slowest_stage(&self) -> Option<(Stage, Duration)> {
        self.stage_timings.iter().copied().max_by_key(|(_, d)| *d)
    }

    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec![
            Cell::new("Dataset").add_attribute(Attribute::Bold),
            Cell::new("Rows").add_attribute(Attribute::Bold),
            Cell::new("Bad Rate").add_attribute(Attribute::Bold),
            Cell::new(Metric::Auc.name().to_uppercase()).add_attribute(Attribute::Bold),
            Cell::new(Metric::Ks.name().to_uppercase()).add_attribute(Attribute::Bold),
            Cell::new("PSI").add_attribute(Attribute::Bold),
        ]);

        let fmt = |v: Option<f64>| v.map(|x| format!("{:.4}", x)).unwrap_or_else(|| "-".to_string());

        for line in &self.datasets {
            let psi_cell = match line.psi {
                None => Cell::new("-"),
                Some((psi, verdict)) => Cell::new(format!("{:.4} ({})", psi, verdict.label())).fg(
                    match verdict {
                        StabilityVerdict::Stable => Color::Green,
                        StabilityVerdict::MinorShift => Color::Yellow,
                        StabilityVerdict::MajorShift => Color::Red,
                    },
                ),
            };
            table.add_row(vec![
                Cell::new(&line.name),
                Cell::new(line.rows),
                Cell::new(format!("{:.2}%", line.bad_rate * 100.0)),
                Cell::new(fmt(line.auc)).fg(Color::Cyan),
                Cell::new(fmt(line.ks)),
                psi_cell,
            ]);
        }
        table
    }

    pub fn display(&self) {
        println!();
        println!(
            "    {} {}",
            style("📋").cyan(),
            style("RUN SUMMARY").white().bold()
        );
        println!("    {}", style("─".repeat(50)).dim());
        println!();

        // Indent the table
        for line in self.to_table().to_string().lines() {
            println!("    {}", line);
        }

        println!();
        println!(
            "      {} features, base points {}, {} sheets in {:.1}s",
            style(self.features).yellow().bold(),
            style(self.base_points).yellow(),
            self.sheets.len(),
            self.elapsed.as_secs_f64()
        );
        if let Some((stage, duration)) = self.slowest_stage() {
            println!(
                "      {} {} ({:.1}s)",
                style("Slowest stage:").dim(),
                stage,
                duration.as_secs_f64()
            );
        }

        if !self.warnings.is_empty() {
            println!();
            println!(
                "      {} {}:",
                style("Warnings").yellow(),
                style(format!("({})", self.warnings.len())).dim()
            );
            for warning in &self.warnings {
                println!("        {} {}", style("•").dim(), warning);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_has_row_per_dataset() {
        let summary = RunSummary {
            artifact: PathBuf::from("report.zip"),
            features: 3,
            base_points: 512,
            datasets: vec![
                DatasetLine {
                    name: "train".to_string(),
                    rows: 700,
                    bad_rate: 0.1,
                    auc: Some(0.75),
                    ks: Some(0.4),
                    psi: None,
                },
                DatasetLine {
                    name: "test".to_string(),
                    rows: 300,
                    bad_rate: 0.12,
                    auc: None,
                    ks: None,
                    psi: Some((0.02, StabilityVerdict::Stable)),
                },
            ],
            sheets: vec!["dataset".to_string()],
            warnings: Vec::new(),
            stage_timings: vec![
                (Stage::Prepare, Duration::from_millis(100)),
                (Stage::Binning, Duration::from_millis(700)),
                (Stage::Report, Duration::from_millis(400)),
            ],
            elapsed: Duration::from_millis(1200),
        };
        let rendered = summary.to_table().to_string();
        assert!(rendered.contains("train"));
        assert!(rendered.contains("0.0200 (stable)"));
        assert!(summary.dataset("test").is_some());
        assert_eq!(summary.slowest_stage().map(|(s, _)| s), Some(Stage::Binning));
    }
}
