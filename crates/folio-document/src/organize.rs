// SPDX-License-Identifier: MIT
//
// Interactive page organisation: render low-resolution previews of a PDF's
// pages into a temporary directory, let the caller reorder/rotate/remove
// entries, then write a new PDF from the surviving arrangement.

use std::path::{Path, PathBuf};

use folio_core::error::{FolioError, Result};
use folio_core::PageEntry;
use tempfile::TempDir;
use tracing::{debug, info, instrument};

use crate::image::ImageProcessor;
use crate::pdf::reader::{PdfFile, save_document};
use crate::raster::PageRasterizer;

/// Preview resolution. Thumbnails only need to be recognisable.
const PREVIEW_DPI: u32 = 150;
const PREVIEW_JPEG_QUALITY: u8 = 85;

/// The ordered list of page entries being edited. Pure state, separate from
/// the preview files so it can be driven (and tested) without a renderer.
#[derive(Debug, Clone, Default)]
pub struct PageArrangement {
    entries: Vec<PageEntry>,
}

impl PageArrangement {
    /// Identity arrangement over `page_count` pages.
    pub fn new(page_count: usize) -> Self {
        Self {
            entries: (0..page_count).map(PageEntry::new).collect(),
        }
    }

    pub fn entries(&self) -> &[PageEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move the entry at `from` to display position `to`. Out-of-range
    /// positions are ignored.
    pub fn move_entry(&mut self, from: usize, to: usize) {
        if from >= self.entries.len() || to >= self.entries.len() {
            return;
        }
        let entry = self.entries.remove(from);
        self.entries.insert(to, entry);
    }

    /// Rotate the entry at `position` a further 90 degrees clockwise.
    pub fn rotate_entry(&mut self, position: usize) {
        if let Some(entry) = self.entries.get_mut(position) {
            entry.rotation = entry.rotation.rotated_cw();
        }
    }

    /// Remove the entry at `position` from the arrangement.
    pub fn remove_entry(&mut self, position: usize) {
        if position < self.entries.len() {
            self.entries.remove(position);
        }
    }
}

/// An editing session over one source PDF.
///
/// Previews live in a `TempDir` that is removed when the session drops;
/// cleanup is best-effort, matching the temporary nature of the files.
pub struct OrganizeSession {
    source: PathBuf,
    arrangement: PageArrangement,
    previews: Vec<PathBuf>,
    _preview_dir: TempDir,
}

impl OrganizeSession {
    /// Open a PDF and render one JPEG preview per page.
    #[instrument(skip_all, fields(source = %source.as_ref().display()))]
    pub fn load(source: impl AsRef<Path>) -> Result<Self> {
        let source = source.as_ref().to_path_buf();
        let rasterizer = PageRasterizer::new()?;
        let pages = rasterizer.render_file(&source, PREVIEW_DPI)?;
        if pages.is_empty() {
            return Err(FolioError::Pdf(format!(
                "{} contains no pages",
                source.display()
            )));
        }

        let preview_dir = TempDir::new()?;
        let mut previews = Vec::with_capacity(pages.len());
        for (index, page) in pages.into_iter().enumerate() {
            let path = preview_dir
                .path()
                .join(format!("page_{:03}.jpg", index + 1));
            let bytes = ImageProcessor::from_dynamic(page).to_jpeg_bytes(PREVIEW_JPEG_QUALITY)?;
            std::fs::write(&path, bytes)?;
            previews.push(path);
        }

        info!(pages = previews.len(), "organise session ready");
        Ok(Self {
            arrangement: PageArrangement::new(previews.len()),
            source,
            previews,
            _preview_dir: preview_dir,
        })
    }

    pub fn page_count(&self) -> usize {
        self.arrangement.len()
    }

    pub fn entries(&self) -> &[PageEntry] {
        self.arrangement.entries()
    }

    /// Preview image for the entry currently at `position`.
    pub fn preview(&self, position: usize) -> Option<&Path> {
        let entry = self.arrangement.entries().get(position)?;
        self.previews.get(entry.original_index).map(PathBuf::as_path)
    }

    pub fn move_entry(&mut self, from: usize, to: usize) {
        self.arrangement.move_entry(from, to);
    }

    pub fn rotate_entry(&mut self, position: usize) {
        self.arrangement.rotate_entry(position);
    }

    pub fn remove_entry(&mut self, position: usize) {
        self.arrangement.remove_entry(position);
    }

    /// Write the current arrangement as a new PDF. Pages are copied from the
    /// original document, so no preview-resolution artefacts reach the
    /// output.
    #[instrument(skip(self), fields(output = %output.as_ref().display()))]
    pub fn save(&self, output: impl AsRef<Path>) -> Result<()> {
        if self.arrangement.is_empty() {
            return Err(FolioError::Pdf(
                "all pages were removed; nothing to save".to_string(),
            ));
        }

        let pdf = PdfFile::open(&self.source)?;
        let mut assembled = pdf.assemble(self.arrangement.entries())?;
        save_document(&mut assembled, output.as_ref())?;

        debug!(pages = self.arrangement.len(), "arrangement saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::Rotation;

    #[test]
    fn new_arrangement_is_the_identity() {
        let arrangement = PageArrangement::new(3);
        let indices: Vec<usize> = arrangement
            .entries()
            .iter()
            .map(|e| e.original_index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(arrangement
            .entries()
            .iter()
            .all(|e| e.rotation == Rotation::R0));
    }

    #[test]
    fn move_entry_reorders() {
        let mut arrangement = PageArrangement::new(4);
        arrangement.move_entry(3, 0);
        let indices: Vec<usize> = arrangement
            .entries()
            .iter()
            .map(|e| e.original_index)
            .collect();
        assert_eq!(indices, vec![3, 0, 1, 2]);
    }

    #[test]
    fn move_entry_ignores_out_of_range() {
        let mut arrangement = PageArrangement::new(2);
        arrangement.move_entry(5, 0);
        arrangement.move_entry(0, 9);
        assert_eq!(arrangement.len(), 2);
        assert_eq!(arrangement.entries()[0].original_index, 0);
    }

    #[test]
    fn rotate_entry_accumulates_quarter_turns() {
        let mut arrangement = PageArrangement::new(1);
        arrangement.rotate_entry(0);
        assert_eq!(arrangement.entries()[0].rotation, Rotation::R90);
        arrangement.rotate_entry(0);
        assert_eq!(arrangement.entries()[0].rotation, Rotation::R180);
        arrangement.rotate_entry(0);
        arrangement.rotate_entry(0);
        assert_eq!(arrangement.entries()[0].rotation, Rotation::R0);
    }

    #[test]
    fn remove_entry_shrinks_the_arrangement() {
        let mut arrangement = PageArrangement::new(3);
        arrangement.remove_entry(1);
        let indices: Vec<usize> = arrangement
            .entries()
            .iter()
            .map(|e| e.original_index)
            .collect();
        assert_eq!(indices, vec![0, 2]);

        arrangement.remove_entry(7);
        assert_eq!(arrangement.len(), 2);
    }
}
