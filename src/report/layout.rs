//! Declarative sheet layout
//!
//! A sheet is described as a list of [`RegionSpec`]s. Each region is placed
//! by an [`Anchor`] relative to the sheet origin or to a region declared
//! before it. [`resolve`] turns the specs into cell coordinates and rejects
//! layouts where a region overflows its band or two regions overlap.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{Result, ScorecardError};

/// Zero-based cell coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub row: u32,
    pub col: u32,
}

impl Cell {
    pub const ORIGIN: Cell = Cell { row: 0, col: 0 };

    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

/// Size of a region in cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Extent {
    pub rows: u32,
    pub cols: u32,
}

impl Extent {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Anchor {
    At(Cell),
    /// Same column as `region`, `gap` empty rows under it
    Below { region: String, gap: u32 },
    /// Same row as `region`, `gap` empty columns to its right
    RightOf { region: String, gap: u32 },
    /// Slot (`row_index`, `col_index`) of a grid of equal bands starting at `origin`
    Band {
        origin: Box<Anchor>,
        band: Extent,
        row_index: u32,
        col_index: u32,
    },
}

impl Anchor {
    pub fn below(region: impl Into<String>, gap: u32) -> Self {
        Anchor::Below {
            region: region.into(),
            gap,
        }
    }

    pub fn right_of(region: impl Into<String>, gap: u32) -> Self {
        Anchor::RightOf {
            region: region.into(),
            gap,
        }
    }

    pub fn band(origin: Anchor, band: Extent, row_index: u32, col_index: u32) -> Self {
        Anchor::Band {
            origin: Box::new(origin),
            band,
            row_index,
            col_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionSpec {
    pub name: String,
    pub anchor: Anchor,
    pub extent: Extent,
}

impl RegionSpec {
    pub fn new(name: impl Into<String>, anchor: Anchor, extent: Extent) -> Self {
        Self {
            name: name.into(),
            anchor,
            extent,
        }
    }
}

/// A region with resolved coordinates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedRegion {
    pub name: String,
    pub top_left: Cell,
    pub extent: Extent,
}

impl PlacedRegion {
    /// First row below the region
    pub fn bottom(&self) -> u32 {
        self.top_left.row + self.extent.rows
    }

    /// First column right of the region
    pub fn right(&self) -> u32 {
        self.top_left.col + self.extent.cols
    }

    pub fn overlaps(&self, other: &PlacedRegion) -> bool {
        self.top_left.row < other.bottom()
            && other.top_left.row < self.bottom()
            && self.top_left.col < other.right()
            && other.top_left.col < self.right()
    }
}

/// Resolve region specs to coordinates, in declaration order
pub fn resolve(specs: &[RegionSpec]) -> Result<Vec<PlacedRegion>> {
    let mut placed: Vec<PlacedRegion> = Vec::with_capacity(specs.len());
    let mut by_name: HashMap<&str, usize> = HashMap::new();

    for spec in specs {
        if by_name.contains_key(spec.name.as_str()) {
            return Err(ScorecardError::Layout(format!(
                "region '{}' is declared twice",
                spec.name
            )));
        }
        if spec.extent.rows == 0 || spec.extent.cols == 0 {
            return Err(ScorecardError::Layout(format!(
                "region '{}' has an empty extent",
                spec.name
            )));
        }

        let top_left = anchor_cell(&spec.anchor, spec, &placed, &by_name)?;
        let region = PlacedRegion {
            name: spec.name.clone(),
            top_left,
            extent: spec.extent,
        };

        if let Some(other) = placed.iter().find(|p| p.overlaps(&region)) {
            return Err(ScorecardError::Layout(format!(
                "region '{}' overlaps region '{}'",
                region.name, other.name
            )));
        }

        by_name.insert(spec.name.as_str(), placed.len());
        placed.push(region);
    }

    Ok(placed)
}

fn anchor_cell(
    anchor: &Anchor,
    spec: &RegionSpec,
    placed: &[PlacedRegion],
    by_name: &HashMap<&str, usize>,
) -> Result<Cell> {
    let lookup = |name: &str| {
        by_name.get(name).map(|&i| &placed[i]).ok_or_else(|| {
            ScorecardError::Layout(format!(
                "region '{}' is anchored to unknown region '{}'",
                spec.name, name
            ))
        })
    };

    match anchor {
        Anchor::At(cell) => Ok(*cell),
        Anchor::Below { region, gap } => {
            let r = lookup(region)?;
            Ok(Cell::new(r.bottom() + gap, r.top_left.col))
        }
        Anchor::RightOf { region, gap } => {
            let r = lookup(region)?;
            Ok(Cell::new(r.top_left.row, r.right() + gap))
        }
        Anchor::Band {
            origin,
            band,
            row_index,
            col_index,
        } => {
            if spec.extent.rows > band.rows || spec.extent.cols > band.cols {
                return Err(ScorecardError::Layout(format!(
                    "region '{}' ({}x{}) overflows its {}x{} band",
                    spec.name, spec.extent.rows, spec.extent.cols, band.rows, band.cols
                )));
            }
            let base = anchor_cell(origin, spec, placed, by_name)?;
            Ok(Cell::new(
                base.row + row_index * band.rows,
                base.col + col_index * band.cols,
            ))
        }
    }
}

/// Rows reserved for an embedded chart
pub const IMAGE_ROWS: u32 = 20;
/// Columns reserved for an embedded chart
pub const IMAGE_COLS: u32 = 8;
/// Empty rows/columns between stacked regions
pub const REGION_GAP: u32 = 2;

/// Columns of a per-feature bin table
pub const BIN_TABLE_COLS: u32 = 10;

/// Table region name on the binning sheet
pub fn binning_table_region(dataset: &str, variable: &str) -> String {
    format!("{}/{}/table", dataset, variable)
}

/// Chart region name on the binning sheet
pub fn binning_image_region(dataset: &str, variable: &str) -> String {
    format!("{}/{}/plot", dataset, variable)
}

/// Band holding one variable's table and chart for one dataset
pub fn binning_band(max_table_rows: u32) -> Extent {
    Extent::new(
        max_table_rows + 1 + IMAGE_ROWS + REGION_GAP,
        BIN_TABLE_COLS.max(IMAGE_COLS) + 1,
    )
}

/// Binning sheet: one column band per dataset, one row band per variable
///
/// `max_table_rows` is the largest bin table (header included) across
/// variables; every band is sized from it so all bands are equal.
pub fn binning_sheet_layout(
    datasets: &[String],
    variables: &[String],
    max_table_rows: u32,
) -> Vec<RegionSpec> {
    let band = binning_band(max_table_rows);
    let image_origin = Anchor::At(Cell::new(max_table_rows + 1, 0));
    let mut specs = Vec::with_capacity(datasets.len() * variables.len() * 2);

    for (m, variable) in variables.iter().enumerate() {
        for (d, dataset) in datasets.iter().enumerate() {
            specs.push(RegionSpec::new(
                binning_table_region(dataset, variable),
                Anchor::band(Anchor::At(Cell::ORIGIN), band, m as u32, d as u32),
                Extent::new(max_table_rows, BIN_TABLE_COLS),
            ));
            specs.push(RegionSpec::new(
                binning_image_region(dataset, variable),
                Anchor::band(image_origin.clone(), band, m as u32, d as u32),
                Extent::new(IMAGE_ROWS, IMAGE_COLS),
            ));
        }
    }
    specs
}

pub const PERFORMANCE_TABLE: &str = "metrics";

pub fn performance_image_region(dataset: &str, curve: &str) -> String {
    format!("{}/{}", dataset, curve)
}

/// Performance sheet: metric table on top, then one column band per
/// dataset and one row band per curve kind
pub fn performance_sheet_layout(
    metric_table: Extent,
    datasets: &[String],
    curves: &[String],
) -> Vec<RegionSpec> {
    let mut specs = vec![RegionSpec::new(
        PERFORMANCE_TABLE,
        Anchor::At(Cell::ORIGIN),
        metric_table,
    )];
    let band = Extent::new(IMAGE_ROWS + REGION_GAP, IMAGE_COLS + 1);
    for (c, curve) in curves.iter().enumerate() {
        for (d, dataset) in datasets.iter().enumerate() {
            specs.push(RegionSpec::new(
                performance_image_region(dataset, curve),
                Anchor::band(
                    Anchor::below(PERFORMANCE_TABLE, REGION_GAP),
                    band,
                    c as u32,
                    d as u32,
                ),
                Extent::new(IMAGE_ROWS, IMAGE_COLS),
            ));
        }
    }
    specs
}

/// Regions stacked top to bottom with a fixed gap
pub fn stacked_layout(regions: &[(String, Extent)]) -> Vec<RegionSpec> {
    let mut specs: Vec<RegionSpec> = Vec::with_capacity(regions.len());
    for (name, extent) in regions {
        let anchor = match specs.last() {
            None => Anchor::At(Cell::ORIGIN),
            Some(prev) => Anchor::below(prev.name.clone(), REGION_GAP),
        };
        specs.push(RegionSpec::new(name.clone(), anchor, *extent));
    }
    specs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_and_right_of() {
        let specs = vec![
            RegionSpec::new("a", Anchor::At(Cell::new(1, 1)), Extent::new(3, 4)),
            RegionSpec::new("b", Anchor::below("a", 2), Extent::new(2, 2)),
            RegionSpec::new("c", Anchor::right_of("a", 1), Extent::new(5, 1)),
        ];
        let placed = resolve(&specs).unwrap();
        assert_eq!(placed[1].top_left, Cell::new(6, 1));
        assert_eq!(placed[2].top_left, Cell::new(1, 6));
    }

    #[test]
    fn test_band_offsets() {
        let band = Extent::new(10, 5);
        let specs = vec![RegionSpec::new(
            "x",
            Anchor::band(Anchor::At(Cell::new(2, 0)), band, 3, 2),
            Extent::new(4, 5),
        )];
        let placed = resolve(&specs).unwrap();
        assert_eq!(placed[0].top_left, Cell::new(32, 10));
    }

    #[test]
    fn test_band_overflow_rejected() {
        let specs = vec![RegionSpec::new(
            "x",
            Anchor::band(Anchor::At(Cell::ORIGIN), Extent::new(3, 3), 0, 0),
            Extent::new(4, 1),
        )];
        assert!(matches!(resolve(&specs), Err(ScorecardError::Layout(_))));
    }

    #[test]
    fn test_overlap_rejected() {
        let specs = vec![
            RegionSpec::new("a", Anchor::At(Cell::ORIGIN), Extent::new(3, 3)),
            RegionSpec::new("b", Anchor::At(Cell::new(2, 2)), Extent::new(3, 3)),
        ];
        let err = resolve(&specs).unwrap_err();
        assert!(err.to_string().contains("overlaps"));
    }

    #[test]
    fn test_unknown_anchor_rejected() {
        let specs = vec![RegionSpec::new("b", Anchor::below("a", 1), Extent::new(1, 1))];
        assert!(resolve(&specs).is_err());
    }

    #[test]
    fn test_touching_regions_do_not_overlap() {
        let specs = vec![
            RegionSpec::new("a", Anchor::At(Cell::ORIGIN), Extent::new(3, 3)),
            RegionSpec::new("b", Anchor::below("a", 0), Extent::new(3, 3)),
        ];
        assert!(resolve(&specs).is_ok());
    }

    #[test]
    fn test_stacked_layout() {
        let specs = stacked_layout(&[
            ("one".to_string(), Extent::new(4, 3)),
            ("two".to_string(), Extent::new(2, 6)),
        ]);
        let placed = resolve(&specs).unwrap();
        assert_eq!(placed[1].top_left, Cell::new(4 + REGION_GAP, 0));
    }
}
