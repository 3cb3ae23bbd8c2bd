// SPDX-License-Identifier: MIT
//
// Page rasterisation via PDFium. PDFium is an optional native capability:
// the library is looked up next to the executable first, then on the system
// path. When neither is present every entry point fails with
// `RasterizerUnavailable` and the rest of the crate keeps working.

use std::path::Path;

use folio_core::error::{FolioError, Result};
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info, instrument};

/// PDF screen resolution baseline; render scale is dpi / 72.
const PDF_POINTS_PER_INCH: f32 = 72.0;

/// Renders PDF pages to raster images and performs the page-level edits that
/// need a full renderer (form flattening).
///
/// PDFium is not thread-safe, so a `PageRasterizer` is created per operation
/// on the worker thread rather than shared.
pub struct PageRasterizer {
    pdfium: Pdfium,
}

impl PageRasterizer {
    /// Bind the PDFium library, preferring a copy shipped alongside the
    /// executable over a system-wide install.
    pub fn new() -> Result<Self> {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|err| {
                FolioError::RasterizerUnavailable(format!(
                    "PDFium library not found: {}",
                    err
                ))
            })?;

        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }

    fn load<'a>(&'a self, data: &'a [u8], password: Option<&str>) -> Result<PdfDocument<'a>> {
        self.pdfium
            .load_pdf_from_byte_slice(data, password)
            .map_err(map_pdfium_error)
    }

    /// Render every page of a PDF file at the given resolution.
    #[instrument(skip(self), fields(path = %path.as_ref().display(), dpi))]
    pub fn render_file(&self, path: impl AsRef<Path>, dpi: u32) -> Result<Vec<DynamicImage>> {
        let data = std::fs::read(path.as_ref())?;
        self.render_bytes(&data, dpi)
    }

    /// Render every page of an in-memory PDF at the given resolution.
    pub fn render_bytes(&self, data: &[u8], dpi: u32) -> Result<Vec<DynamicImage>> {
        let document = self.load(data, None)?;
        let config =
            PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / PDF_POINTS_PER_INCH);

        let pages = document.pages();
        let mut images = Vec::with_capacity(pages.len() as usize);
        for index in 0..pages.len() {
            let page = pages.get(index).map_err(map_pdfium_error)?;
            let bitmap = page.render_with_config(&config).map_err(map_pdfium_error)?;
            images.push(bitmap.as_image());
        }

        debug!(pages = images.len(), dpi, "rasterisation complete");
        Ok(images)
    }

    /// Bake form fields and annotations into static page content.
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    pub fn flatten_forms(&self, data: &[u8]) -> Result<Vec<u8>> {
        let document = self.load(data, None)?;

        let pages = document.pages();
        for index in 0..pages.len() {
            let mut page = pages.get(index).map_err(map_pdfium_error)?;
            page.flatten().map_err(map_pdfium_error)?;
        }

        let output = document.save_to_bytes().map_err(map_pdfium_error)?;
        info!("form content flattened");
        Ok(output)
    }
}

fn map_pdfium_error(err: PdfiumError) -> FolioError {
    match err {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
            FolioError::IncorrectPassword
        }
        other => FolioError::Raster(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // PDFium is a native capability that may not exist in the test
    // environment; these tests only exercise the unavailable path.

    #[test]
    fn missing_library_reports_rasterizer_unavailable() {
        match PageRasterizer::new() {
            Ok(_) => {}
            Err(err) => {
                assert!(matches!(err, FolioError::RasterizerUnavailable(_)));
                assert!(err.to_string().contains("PDFium"));
            }
        }
    }
}
