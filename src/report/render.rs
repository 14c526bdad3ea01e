//! Chart rendering to PNG
//!
//! Charts are drawn into an in-memory RGB buffer and encoded to PNG before
//! a [`RenderedImage`] is returned, so holding one means the image is
//! complete and can be embedded.

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use plotters::prelude::*;
use plotters::style::RGBColor;

use crate::error::{Result, ScorecardError};
use crate::pipeline::binning::BinStat;
use crate::pipeline::performance::Curve;

const PALETTE: [RGBColor; 6] = [
    RGBColor(31, 119, 180),
    RGBColor(214, 39, 40),
    RGBColor(44, 160, 44),
    RGBColor(255, 127, 14),
    RGBColor(148, 103, 189),
    RGBColor(127, 127, 127),
];

const AXIS: RGBColor = RGBColor(90, 90, 90);

/// A finished PNG image
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Turns report data into images
pub trait PlotRenderer: Sync {
    fn render_curve(&self, curve: &Curve) -> Result<RenderedImage>;

    /// Population share bars with the bad rate line of one feature's bins
    fn render_bins(&self, feature: &str, rows: &[BinStat]) -> Result<RenderedImage>;

    /// Score bucket shares per dataset
    fn render_distribution(&self, shares: &[(String, Vec<f64>)]) -> Result<RenderedImage>;
}

/// `plotters` bitmap renderer
#[derive(Debug, Clone)]
pub struct BitmapRenderer {
    pub width: u32,
    pub height: u32,
}

impl Default for BitmapRenderer {
    fn default() -> Self {
        Self {
            width: 640,
            height: 400,
        }
    }
}

fn render_err(e: impl std::fmt::Display) -> ScorecardError {
    ScorecardError::Render(e.to_string())
}

impl BitmapRenderer {
    /// Draw into a fresh buffer and encode it
    fn draw<F>(&self, paint: F) -> Result<RenderedImage>
    where
        F: FnOnce(&DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>) -> Result<()>,
    {
        let mut buf = vec![0u8; (self.width * self.height * 3) as usize];
        {
            let root =
                BitMapBackend::with_buffer(&mut buf, (self.width, self.height)).into_drawing_area();
            root.fill(&WHITE).map_err(render_err)?;
            paint(&root)?;
            root.present().map_err(render_err)?;
        }

        let mut png = Vec::new();
        PngEncoder::new(&mut png)
            .write_image(&buf, self.width, self.height, ColorType::Rgb8)
            .map_err(render_err)?;

        Ok(RenderedImage {
            png,
            width: self.width,
            height: self.height,
        })
    }
}

impl PlotRenderer for BitmapRenderer {
    fn render_curve(&self, curve: &Curve) -> Result<RenderedImage> {
        let ((x0, x1), (y0, y1)) = curve.bounds();
        self.draw(|root| {
            let mut chart = ChartBuilder::on(root)
                .margin(20)
                .build_cartesian_2d(x0..x1, y0..y1)
                .map_err(render_err)?;

            chart
                .draw_series(LineSeries::new(vec![(x0, y0), (x1, y0)], &AXIS))
                .map_err(render_err)?;
            chart
                .draw_series(LineSeries::new(vec![(x0, y0), (x0, y1)], &AXIS))
                .map_err(render_err)?;

            for (i, series) in curve.series.iter().enumerate() {
                let color = PALETTE[i % PALETTE.len()];
                chart
                    .draw_series(LineSeries::new(
                        series.points.iter().copied(),
                        color.stroke_width(2),
                    ))
                    .map_err(render_err)?;
            }
            Ok(())
        })
    }

    fn render_bins(&self, feature: &str, rows: &[BinStat]) -> Result<RenderedImage> {
        if rows.is_empty() {
            return Err(ScorecardError::Render(format!(
                "feature '{}' has no bins to plot",
                feature
            )));
        }
        let n = rows.len() as f64;
        let y_max = rows
            .iter()
            .map(|r| r.count_distr.max(r.bad_rate))
            .fold(0.0, f64::max)
            .max(0.05)
            * 1.1;

        self.draw(|root| {
            let mut chart = ChartBuilder::on(root)
                .margin(20)
                .build_cartesian_2d(0f64..n, 0f64..y_max)
                .map_err(render_err)?;

            chart
                .draw_series(rows.iter().enumerate().map(|(i, r)| {
                    let x = i as f64;
                    Rectangle::new(
                        [(x + 0.1, 0.0), (x + 0.9, r.count_distr)],
                        PALETTE[0].mix(0.6).filled(),
                    )
                }))
                .map_err(render_err)?;

            chart
                .draw_series(LineSeries::new(
                    rows.iter()
                        .enumerate()
                        .map(|(i, r)| (i as f64 + 0.5, r.bad_rate)),
                    PALETTE[1].stroke_width(2),
                ))
                .map_err(render_err)?;

            chart
                .draw_series(LineSeries::new(vec![(0.0, 0.0), (n, 0.0)], &AXIS))
                .map_err(render_err)?;
            Ok(())
        })
    }

    fn render_distribution(&self, shares: &[(String, Vec<f64>)]) -> Result<RenderedImage> {
        let buckets = shares.iter().map(|(_, s)| s.len()).max().unwrap_or(0);
        if buckets == 0 {
            return Err(ScorecardError::Render(
                "no score buckets to plot".to_string(),
            ));
        }
        let y_max = shares
            .iter()
            .flat_map(|(_, s)| s.iter().copied())
            .fold(0.0, f64::max)
            .max(0.05)
            * 1.1;
        let slot = 0.8 / shares.len().max(1) as f64;

        self.draw(|root| {
            let mut chart = ChartBuilder::on(root)
                .margin(20)
                .build_cartesian_2d(0f64..buckets as f64, 0f64..y_max)
                .map_err(render_err)?;

            for (d, (_, values)) in shares.iter().enumerate() {
                let color = PALETTE[d % PALETTE.len()];
                chart
                    .draw_series(values.iter().enumerate().map(|(k, v)| {
                        let left = k as f64 + 0.1 + d as f64 * slot;
                        Rectangle::new([(left, 0.0), (left + slot, *v)], color.filled())
                    }))
                    .map_err(render_err)?;
            }
            chart
                .draw_series(LineSeries::new(
                    vec![(0.0, 0.0), (buckets as f64, 0.0)],
                    &AXIS,
                ))
                .map_err(render_err)?;
            Ok(())
        })
    }
}
