//! Report document model and the artifact writer

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use polars::prelude::*;
use serde::Serialize;
use tempfile::NamedTempFile;
use ::zip::write::SimpleFileOptions;
use ::zip::ZipWriter;

use super::layout::{resolve, PlacedRegion, RegionSpec};
use super::render::RenderedImage;
use crate::error::{Result, ScorecardError};

/// What a region holds
#[derive(Debug, Clone)]
pub enum RegionContent {
    Table(DataFrame),
    Image(RenderedImage),
}

/// A sheet with resolved regions, ready to be written
#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub regions: Vec<(PlacedRegion, RegionContent)>,
}

impl Sheet {
    pub fn region(&self, name: &str) -> Option<&(PlacedRegion, RegionContent)> {
        self.regions.iter().find(|(r, _)| r.name == name)
    }
}

/// Collects region specs and their contents for one sheet
#[derive(Debug)]
pub struct SheetBuilder {
    name: String,
    specs: Vec<RegionSpec>,
    contents: HashMap<String, RegionContent>,
}

impl SheetBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            specs: Vec::new(),
            contents: HashMap::new(),
        }
    }

    /// Declare a set of regions without contents yet
    pub fn layout(mut self, specs: Vec<RegionSpec>) -> Self {
        self.specs.extend(specs);
        self
    }

    pub fn table(&mut self, region: impl Into<String>, frame: DataFrame) {
        self.contents.insert(region.into(), RegionContent::Table(frame));
    }

    pub fn image(&mut self, region: impl Into<String>, image: RenderedImage) {
        self.contents.insert(region.into(), RegionContent::Image(image));
    }

    /// Resolve the layout and attach contents; every region must be filled
    /// and every table must fit its region
    pub fn build(mut self) -> Result<Sheet> {
        let placed = resolve(&self.specs)?;
        let mut regions = Vec::with_capacity(placed.len());

        for region in placed {
            let content = self.contents.remove(&region.name).ok_or_else(|| {
                ScorecardError::Layout(format!(
                    "region '{}' on sheet '{}' has no content",
                    region.name, self.name
                ))
            })?;
            if let RegionContent::Table(frame) = &content {
                let (rows, cols) = frame.shape();
                if rows as u32 + 1 > region.extent.rows || cols as u32 > region.extent.cols {
                    return Err(ScorecardError::Layout(format!(
                        "table for '{}' ({}x{}) does not fit its {}x{} region",
                        region.name,
                        rows + 1,
                        cols,
                        region.extent.rows,
                        region.extent.cols
                    )));
                }
            }
            regions.push((region, content));
        }

        if let Some(orphan) = self.contents.keys().next() {
            return Err(ScorecardError::Layout(format!(
                "content '{}' on sheet '{}' has no region",
                orphan, self.name
            )));
        }

        Ok(Sheet {
            name: self.name,
            regions,
        })
    }
}

/// Extent of a table region: header row plus data rows
pub fn table_extent(frame: &DataFrame) -> super::layout::Extent {
    super::layout::Extent::new(frame.height() as u32 + 1, frame.width().max(1) as u32)
}

/// Ordered collection of sheets, persisted once at the end of a run
#[derive(Debug, Default)]
pub struct ReportDocument {
    sheets: Vec<Sheet>,
}

impl ReportDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sheet(&mut self, sheet: Sheet) -> Result<()> {
        if self.sheets.iter().any(|s| s.name == sheet.name) {
            return Err(ScorecardError::Layout(format!(
                "sheet '{}' already exists",
                sheet.name
            )));
        }
        self.sheets.push(sheet);
        Ok(())
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Write every sheet and finish the artifact
    pub fn persist(&self, writer: &mut dyn DocumentWriter) -> Result<PathBuf> {
        for sheet in &self.sheets {
            writer.add_sheet(&sheet.name)?;
            for (region, content) in &sheet.regions {
                match content {
                    RegionContent::Table(frame) => writer.write_table(&sheet.name, region, frame)?,
                    RegionContent::Image(image) => writer.embed_image(&sheet.name, region, image)?,
                }
            }
        }
        writer.finish()
    }
}

/// Low-level document sink
pub trait DocumentWriter {
    fn add_sheet(&mut self, name: &str) -> Result<()>;
    fn write_table(&mut self, sheet: &str, region: &PlacedRegion, table: &DataFrame) -> Result<()>;
    fn embed_image(&mut self, sheet: &str, region: &PlacedRegion, image: &RenderedImage)
        -> Result<()>;
    /// Persist the document and return its path
    fn finish(&mut self) -> Result<PathBuf>;
}

#[derive(Debug, Serialize)]
struct ManifestRegion {
    name: String,
    kind: &'static str,
    file: String,
    row: u32,
    col: u32,
    rows: u32,
    cols: u32,
}

#[derive(Debug, Serialize)]
struct ManifestSheet {
    name: String,
    regions: Vec<ManifestRegion>,
}

#[derive(Debug, Serialize)]
struct Manifest {
    generator: String,
    created_at: String,
    sheets: Vec<ManifestSheet>,
}

/// File name of the manifest inside the bundle
pub const MANIFEST_NAME: &str = "manifest.json";

/// Zip bundle: one CSV per table region, one PNG per image region and a
/// JSON manifest with the sheet layout
///
/// The archive is written to a temporary file in the output directory and
/// renamed to `<stem>_<YYYYmmdd_HHMMSS>.zip` by [`DocumentWriter::finish`]
/// (`_2`, `_3`, ... is appended if that name is taken). Dropping the writer
/// before `finish` leaves nothing behind.
pub struct BundleWriter {
    output_dir: PathBuf,
    stem: String,
    zip: Option<ZipWriter<NamedTempFile>>,
    options: SimpleFileOptions,
    sheets: Vec<ManifestSheet>,
    used_paths: HashSet<String>,
}

impl BundleWriter {
    pub fn new(output_dir: &Path, stem: &str) -> Result<Self> {
        if stem.trim().is_empty() {
            return Err(ScorecardError::Config("output name cannot be empty".to_string()));
        }
        std::fs::create_dir_all(output_dir).map_err(|e| {
            ScorecardError::io(format!("creating {}", output_dir.display()), e)
        })?;
        let temp = NamedTempFile::new_in(output_dir).map_err(|e| {
            ScorecardError::io(format!("creating a temporary file in {}", output_dir.display()), e)
        })?;

        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            stem: stem.to_string(),
            zip: Some(ZipWriter::new(temp)),
            options: SimpleFileOptions::default()
                .compression_method(::zip::CompressionMethod::Deflated)
                .unix_permissions(0o644),
            sheets: Vec::new(),
            used_paths: HashSet::new(),
        })
    }

    fn zip(&mut self) -> Result<&mut ZipWriter<NamedTempFile>> {
        self.zip
            .as_mut()
            .ok_or_else(|| ScorecardError::Config("report bundle is already finished".to_string()))
    }

    fn add_entry(
        &mut self,
        sheet: &str,
        region: &PlacedRegion,
        kind: &'static str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<()> {
        let sheet_idx = self
            .sheets
            .iter()
            .position(|s| s.name == sheet)
            .ok_or_else(|| ScorecardError::Layout(format!("unknown sheet '{}'", sheet)))?;

        let mut file = format!(
            "{:02}_{}/{}.{}",
            sheet_idx + 1,
            sanitize(sheet),
            sanitize(&region.name),
            extension
        );
        // Sanitizing can collide distinct region names
        let mut suffix = 2;
        while self.used_paths.contains(&file) {
            file = format!(
                "{:02}_{}/{}_{}.{}",
                sheet_idx + 1,
                sanitize(sheet),
                sanitize(&region.name),
                suffix,
                extension
            );
            suffix += 1;
        }
        self.used_paths.insert(file.clone());

        let options = self.options;
        let zip = self.zip()?;
        zip.start_file(file.as_str(), options)
            .map_err(|e| ScorecardError::io(format!("adding {}", file), e.into()))?;
        zip.write_all(bytes)
            .map_err(|e| ScorecardError::io(format!("writing {}", file), e))?;

        self.sheets[sheet_idx].regions.push(ManifestRegion {
            name: region.name.clone(),
            kind,
            file,
            row: region.top_left.row,
            col: region.top_left.col,
            rows: region.extent.rows,
            cols: region.extent.cols,
        });
        Ok(())
    }
}

impl DocumentWriter for BundleWriter {
    fn add_sheet(&mut self, name: &str) -> Result<()> {
        if self.sheets.iter().any(|s| s.name == name) {
            return Err(ScorecardError::Layout(format!("sheet '{}' already exists", name)));
        }
        self.sheets.push(ManifestSheet {
            name: name.to_string(),
            regions: Vec::new(),
        });
        Ok(())
    }

    fn write_table(&mut self, sheet: &str, region: &PlacedRegion, table: &DataFrame) -> Result<()> {
        let mut bytes = Vec::new();
        let mut frame = table.clone();
        CsvWriter::new(&mut bytes).finish(&mut frame)?;
        self.add_entry(sheet, region, "table", "csv", &bytes)
    }

    fn embed_image(
        &mut self,
        sheet: &str,
        region: &PlacedRegion,
        image: &RenderedImage,
    ) -> Result<()> {
        self.add_entry(sheet, region, "image", "png", &image.png)
    }

    fn finish(&mut self) -> Result<PathBuf> {
        let manifest = Manifest {
            generator: format!("scorephi {}", env!("CARGO_PKG_VERSION")),
            created_at: Local::now().to_rfc3339(),
            sheets: std::mem::take(&mut self.sheets),
        };
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| ScorecardError::Config(format!("serializing manifest: {}", e)))?;

        let options = self.options;
        let mut zip = self
            .zip
            .take()
            .ok_or_else(|| ScorecardError::Config("report bundle is already finished".to_string()))?;
        zip.start_file(MANIFEST_NAME, options)
            .map_err(|e| ScorecardError::io("adding the manifest", e.into()))?;
        zip.write_all(&json)
            .map_err(|e| ScorecardError::io("writing the manifest", e))?;
        let mut temp = zip
            .finish()
            .map_err(|e| ScorecardError::io("finalizing the report bundle", e.into()))?;

        // Never replace an earlier artifact stamped in the same second
        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut attempt = 1;
        loop {
            let file_name = if attempt == 1 {
                format!("{}_{}.zip", self.stem, stamp)
            } else {
                format!("{}_{}_{}.zip", self.stem, stamp, attempt)
            };
            let path = self.output_dir.join(file_name);
            match temp.persist_noclobber(&path) {
                Ok(_) => return Ok(path),
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    temp = e.file;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(ScorecardError::io(format!("saving {}", path.display()), e.error))
                }
            }
        }
    }
}

/// Keep entry names portable inside the archive
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}
