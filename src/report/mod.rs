//! Report module - layout, rendering and persistence of the scorecard report

pub mod assembler;
pub mod document;
pub mod layout;
pub mod render;
pub mod summary;

pub use assembler::{assemble_report, ReportInputs};
pub use document::{BundleWriter, DocumentWriter, ReportDocument, Sheet, SheetBuilder};
pub use layout::{resolve, Anchor, Cell, Extent, PlacedRegion, RegionSpec};
pub use render::{BitmapRenderer, PlotRenderer, RenderedImage};
pub use summary::{DatasetLine, RunSummary};
