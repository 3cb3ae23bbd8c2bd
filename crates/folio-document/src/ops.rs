// SPDX-License-Identifier: MIT
//
// The operation catalog: every document transformation the suite offers, as
// plain functions plus a serialisable request enum for dispatch through the
// background task runner.
//
// Operations that fail part-way remove their partial output file; inputs are
// never modified in place.

use std::path::{Path, PathBuf};

use folio_core::error::{FolioError, Result};
use folio_core::{
    CompressionLevel, DocumentInfo, EncryptionAlgorithm, ImageOutputFormat, PageEntry,
    PageNumberPosition, PageSelection, SplitMode,
};
use lopdf::Document;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::convert::OfficeConverter;
use crate::image::ImageProcessor;
use crate::pdf::reader::{PdfFile, save_document};
use crate::pdf::{extract, overlay, security};
use crate::pdf::writer::ImagePdfBuilder;
use crate::raster::PageRasterizer;
use crate::scan::rectify::{self, CornerSet};

/// Default render resolution for page-to-image export.
pub const EXPORT_DPI: u32 = 200;
/// Resolution for the rasterising transforms (grayscale).
const REBUILD_DPI: u32 = 150;
/// Extreme compression re-renders pages at this resolution.
const EXTREME_COMPRESS_DPI: u32 = 100;
/// OCR quality needs more pixels than screen previews.
#[cfg(feature = "ocr")]
const OCR_DPI: u32 = 300;

/// Default watermark appearance; both are caller-overridable.
pub const WATERMARK_OPACITY: f32 = 0.5;
pub const WATERMARK_ROTATION_DEGREES: f32 = 45.0;

fn default_export_dpi() -> u32 {
    EXPORT_DPI
}

fn default_watermark_opacity() -> f32 {
    WATERMARK_OPACITY
}

fn default_watermark_rotation() -> f32 {
    WATERMARK_ROTATION_DEGREES
}

/// One fully-specified operation, ready to run on a worker thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum OpRequest {
    Merge {
        inputs: Vec<PathBuf>,
        output: PathBuf,
    },
    Split {
        input: PathBuf,
        output_dir: PathBuf,
        mode: SplitMode,
        range: Option<String>,
    },
    Reorder {
        input: PathBuf,
        output: PathBuf,
        entries: Vec<PageEntry>,
    },
    ImagesToPdf {
        inputs: Vec<PathBuf>,
        output: PathBuf,
    },
    PdfToImages {
        input: PathBuf,
        output_dir: PathBuf,
        #[serde(default)]
        format: ImageOutputFormat,
        #[serde(default = "default_export_dpi")]
        dpi: u32,
    },
    PdfToWord {
        input: PathBuf,
        output: PathBuf,
    },
    WordToPdf {
        input: PathBuf,
        output: PathBuf,
    },
    PptxToPdf {
        input: PathBuf,
        output: PathBuf,
    },
    PdfToPptx {
        input: PathBuf,
        output: PathBuf,
    },
    Protect {
        input: PathBuf,
        output: PathBuf,
        password: String,
        algorithm: EncryptionAlgorithm,
    },
    Unlock {
        input: PathBuf,
        output: PathBuf,
        password: String,
    },
    Compress {
        input: PathBuf,
        output: PathBuf,
        level: CompressionLevel,
    },
    Watermark {
        input: PathBuf,
        output: PathBuf,
        text: String,
        #[serde(default = "default_watermark_opacity")]
        opacity: f32,
        #[serde(default = "default_watermark_rotation")]
        rotation_degrees: f32,
    },
    AddPageNumbers {
        input: PathBuf,
        output: PathBuf,
        position: PageNumberPosition,
    },
    ReadMetadata {
        input: PathBuf,
    },
    UpdateMetadata {
        input: PathBuf,
        output: PathBuf,
        info: DocumentInfo,
    },
    ExtractImages {
        input: PathBuf,
        output_dir: PathBuf,
    },
    Flatten {
        input: PathBuf,
        output: PathBuf,
    },
    Grayscale {
        input: PathBuf,
        output: PathBuf,
    },
    Ocr {
        input: PathBuf,
        output: PathBuf,
    },
    Rectify {
        input: PathBuf,
        output: PathBuf,
        corners: Option<CornerSet>,
    },
}

/// What an operation hands back beyond "it worked". Single-output operations
/// return no payload; their output path was chosen by the caller.
#[derive(Debug, Clone)]
pub enum OpOutput {
    /// Paths produced by fan-out operations (split, page export, image
    /// extraction).
    Files(Vec<PathBuf>),
    /// The /Info fields of an inspected document.
    Metadata(DocumentInfo),
    /// A rectified scan, returned so callers can feed it straight into a
    /// follow-up step such as [`images_to_pdf`].
    Image(image::DynamicImage),
}

/// Run a request synchronously on the current thread.
pub fn execute(request: &OpRequest) -> Result<Option<OpOutput>> {
    match request {
        OpRequest::Merge { inputs, output } => {
            merge(inputs, output)?;
            Ok(None)
        }
        OpRequest::Split {
            input,
            output_dir,
            mode,
            range,
        } => {
            let files = split(input, output_dir, *mode, range.as_deref())?;
            Ok(Some(OpOutput::Files(files)))
        }
        OpRequest::Reorder {
            input,
            output,
            entries,
        } => {
            reorder(input, output, entries)?;
            Ok(None)
        }
        OpRequest::ImagesToPdf { inputs, output } => {
            images_to_pdf(inputs, output)?;
            Ok(None)
        }
        OpRequest::PdfToImages {
            input,
            output_dir,
            format,
            dpi,
        } => {
            let files = pdf_to_images(input, output_dir, *format, *dpi)?;
            Ok(Some(OpOutput::Files(files)))
        }
        OpRequest::PdfToWord { input, output } => {
            OfficeConverter::discover()?.pdf_to_word(input, output)?;
            Ok(None)
        }
        OpRequest::WordToPdf { input, output } => {
            OfficeConverter::discover()?.word_to_pdf(input, output)?;
            Ok(None)
        }
        OpRequest::PptxToPdf { input, output } => {
            OfficeConverter::discover()?.pptx_to_pdf(input, output)?;
            Ok(None)
        }
        OpRequest::PdfToPptx { input, output } => {
            OfficeConverter::discover()?.pdf_to_pptx(input, output)?;
            Ok(None)
        }
        OpRequest::Protect {
            input,
            output,
            password,
            algorithm,
        } => {
            protect(input, output, password, *algorithm)?;
            Ok(None)
        }
        OpRequest::Unlock {
            input,
            output,
            password,
        } => {
            unlock(input, output, password)?;
            Ok(None)
        }
        OpRequest::Compress {
            input,
            output,
            level,
        } => {
            compress(input, output, *level)?;
            Ok(None)
        }
        OpRequest::Watermark {
            input,
            output,
            text,
            opacity,
            rotation_degrees,
        } => {
            watermark(input, output, text, *opacity, *rotation_degrees)?;
            Ok(None)
        }
        OpRequest::AddPageNumbers {
            input,
            output,
            position,
        } => {
            add_page_numbers(input, output, *position)?;
            Ok(None)
        }
        OpRequest::ReadMetadata { input } => {
            Ok(Some(OpOutput::Metadata(read_metadata(input)?)))
        }
        OpRequest::UpdateMetadata {
            input,
            output,
            info,
        } => {
            update_metadata(input, output, info)?;
            Ok(None)
        }
        OpRequest::ExtractImages { input, output_dir } => {
            let files = extract_images(input, output_dir)?;
            Ok(Some(OpOutput::Files(files)))
        }
        OpRequest::Flatten { input, output } => {
            flatten(input, output)?;
            Ok(None)
        }
        OpRequest::Grayscale { input, output } => {
            grayscale(input, output)?;
            Ok(None)
        }
        OpRequest::Ocr { input, output } => {
            ocr_to_searchable(input, output)?;
            Ok(None)
        }
        OpRequest::Rectify {
            input,
            output,
            corners,
        } => {
            let rectified = rectify_image(input, output, corners.as_ref())?;
            Ok(Some(OpOutput::Image(rectified)))
        }
    }
}

/// Dispatch a request onto the background task runner. The returned handle
/// delivers the outcome; the worker keeps running if the handle is dropped.
pub fn submit(request: OpRequest) -> folio_tasks::TaskHandle<OpOutput> {
    folio_tasks::submit(move || execute(&request))
}

// -- Assembly operations ------------------------------------------------------

/// Concatenate the pages of all inputs, in argument order, into one PDF.
#[instrument(skip_all, fields(inputs = inputs.len(), output = %output.as_ref().display()))]
pub fn merge(inputs: &[PathBuf], output: impl AsRef<Path>) -> Result<()> {
    if inputs.is_empty() {
        return Err(FolioError::Pdf(
            "merge requires at least one input file".to_string(),
        ));
    }

    let (mut target, pages_root) = crate::pdf::reader::new_document_skeleton();
    for input in inputs {
        let pdf = PdfFile::open(input)?;
        let mut importer = crate::pdf::reader::PageImporter::new(pdf.document());
        for page_id in pdf.page_ids() {
            importer.import_page(&mut target, page_id, pages_root)?;
        }
    }

    with_cleanup(output.as_ref(), |out| save_document(&mut target, out))?;
    info!("merge complete");
    Ok(())
}

/// Split a PDF into per-page files, or extract a page range into one file.
///
/// With [`SplitMode::All`], each selected page becomes
/// `{base}_page_{n}.pdf` where `n` is the page's original 1-based number.
/// With [`SplitMode::Extract`], the selected pages land in
/// `{base}_extracted.pdf` in selection order. A range that selects no
/// existing pages produces no files.
#[instrument(skip_all, fields(input = %input.as_ref().display(), mode = ?mode, range = ?range))]
pub fn split(
    input: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    mode: SplitMode,
    range: Option<&str>,
) -> Result<Vec<PathBuf>> {
    let pdf = PdfFile::open(input.as_ref())?;
    let page_count = pdf.page_count();

    let selection = match range {
        Some(spec) => PageSelection::parse(spec, page_count),
        None => PageSelection::all(page_count),
    };
    if selection.is_empty() {
        warn!("page range selects no pages, nothing to write");
        return Ok(Vec::new());
    }

    let output_dir = output_dir.as_ref();
    std::fs::create_dir_all(output_dir)?;
    let base = pdf.base_name();

    let written = match mode {
        SplitMode::All => {
            let mut written = Vec::with_capacity(selection.len());
            for (page_number, mut doc) in pdf.explode(&selection)? {
                let path = output_dir.join(format!("{}_page_{}.pdf", base, page_number));
                with_cleanup(&path, |out| save_document(&mut doc, out))?;
                written.push(path);
            }
            written
        }
        SplitMode::Extract => {
            let mut doc = pdf.extract(&selection)?;
            let path = output_dir.join(format!("{}_extracted.pdf", base));
            with_cleanup(&path, |out| save_document(&mut doc, out))?;
            vec![path]
        }
    };

    info!(files = written.len(), "split complete");
    Ok(written)
}

/// Write a new PDF with pages in the given order and per-page rotations.
/// Entries referencing pages outside the source are skipped.
#[instrument(skip_all, fields(input = %input.as_ref().display(), entries = entries.len()))]
pub fn reorder(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    entries: &[PageEntry],
) -> Result<()> {
    if entries.is_empty() {
        return Err(FolioError::Pdf(
            "reorder requires at least one page entry".to_string(),
        ));
    }

    let pdf = PdfFile::open(input.as_ref())?;
    let mut assembled = pdf.assemble(entries)?;
    with_cleanup(output.as_ref(), |out| save_document(&mut assembled, out))?;
    Ok(())
}

// -- Image interchange --------------------------------------------------------

/// Combine image files into a PDF, one page per image, in input order.
/// Transparency is composited over white before embedding. Images that
/// cannot be read are skipped; if none survive, no file is written.
#[instrument(skip_all, fields(inputs = inputs.len(), output = %output.as_ref().display()))]
pub fn images_to_pdf(inputs: &[PathBuf], output: impl AsRef<Path>) -> Result<()> {
    let mut pages = Vec::with_capacity(inputs.len());
    for input in inputs {
        match ImageProcessor::open(input) {
            Ok(processor) => pages.push(processor.flatten_alpha().into_dynamic()),
            Err(err) => {
                warn!(input = %input.display(), error = %err, "skipping unreadable image");
            }
        }
    }
    if pages.is_empty() {
        warn!("no readable images, nothing to write");
        return Ok(());
    }

    // Pages sized at 96 DPI, the nominal screen resolution of the sources.
    let bytes = ImagePdfBuilder::new(96.0).build(&pages)?;
    with_cleanup(output.as_ref(), |out| Ok(std::fs::write(out, &bytes)?))?;
    info!(pages = pages.len(), "images combined into PDF");
    Ok(())
}

/// Render each page to an image file named `{base}_page_{n:03}.{ext}`.
#[instrument(skip_all, fields(input = %input.as_ref().display(), format = ?format, dpi))]
pub fn pdf_to_images(
    input: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    format: ImageOutputFormat,
    dpi: u32,
) -> Result<Vec<PathBuf>> {
    let input = input.as_ref();
    let output_dir = output_dir.as_ref();
    std::fs::create_dir_all(output_dir)?;

    let base = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    let rasterizer = PageRasterizer::new()?;
    let pages = rasterizer.render_file(input, dpi)?;

    let mut written = Vec::with_capacity(pages.len());
    for (index, page) in pages.into_iter().enumerate() {
        let path = output_dir.join(format!(
            "{}_page_{:03}.{}",
            base,
            index + 1,
            format.extension()
        ));
        ImageProcessor::from_dynamic(page).save_as(&path, format)?;
        written.push(path);
    }

    info!(files = written.len(), "pages exported as images");
    Ok(written)
}

// -- Security and compression -------------------------------------------------

/// Encrypt a PDF with an open password.
pub fn protect(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    password: &str,
    algorithm: EncryptionAlgorithm,
) -> Result<()> {
    let data = std::fs::read(input.as_ref())?;
    let locked = security::protect(&data, password, algorithm)?;
    with_cleanup(output.as_ref(), |out| Ok(std::fs::write(out, &locked)?))
}

/// Remove password protection. Fails with "Incorrect Password" when the
/// password does not match.
pub fn unlock(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    password: &str,
) -> Result<()> {
    let data = std::fs::read(input.as_ref())?;
    let unlocked = security::unlock(&data, password)?;
    with_cleanup(output.as_ref(), |out| Ok(std::fs::write(out, &unlocked)?))
}

/// Shrink a PDF. Low and Medium restructure the file losslessly; Extreme
/// re-renders every page at a reduced resolution, trading fidelity for size.
#[instrument(skip_all, fields(input = %input.as_ref().display(), level = ?level))]
pub fn compress(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    level: CompressionLevel,
) -> Result<()> {
    let data = std::fs::read(input.as_ref())?;

    let compressed = match level {
        CompressionLevel::Low | CompressionLevel::Medium => security::compress(&data, level)?,
        CompressionLevel::Extreme => {
            let rasterizer = PageRasterizer::new()?;
            let pages = rasterizer.render_bytes(&data, EXTREME_COMPRESS_DPI)?;
            let rebuilt = ImagePdfBuilder::new(EXTREME_COMPRESS_DPI as f32).build(&pages)?;
            // A structural pass over the rebuilt file still helps.
            security::compress(&rebuilt, level)?
        }
    };

    if compressed.len() >= data.len() {
        warn!(
            before = data.len(),
            after = compressed.len(),
            "compression did not reduce file size"
        );
    }
    with_cleanup(output.as_ref(), |out| Ok(std::fs::write(out, &compressed)?))
}

// -- Stamping -----------------------------------------------------------------

/// Stamp diagonal watermark text across every page. [`WATERMARK_OPACITY`]
/// and [`WATERMARK_ROTATION_DEGREES`] are the conventional values.
pub fn watermark(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    text: &str,
    opacity: f32,
    rotation_degrees: f32,
) -> Result<()> {
    let mut doc = load_document(input.as_ref())?;
    overlay::apply_watermark(&mut doc, text, opacity, rotation_degrees)?;
    with_cleanup(output.as_ref(), |out| save_document(&mut doc, out))
}

/// Stamp "Page i of N" on every page at the given anchor.
pub fn add_page_numbers(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    position: PageNumberPosition,
) -> Result<()> {
    let mut doc = load_document(input.as_ref())?;
    overlay::apply_page_numbers(&mut doc, position)?;
    with_cleanup(output.as_ref(), |out| save_document(&mut doc, out))
}

// -- Metadata -----------------------------------------------------------------

/// Read the standard /Info fields.
pub fn read_metadata(input: impl AsRef<Path>) -> Result<DocumentInfo> {
    Ok(PdfFile::open(input.as_ref())?.metadata())
}

/// Write a copy of the document with the supplied non-empty /Info fields
/// replacing existing values. Fields left `None` are preserved.
pub fn update_metadata(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    info: &DocumentInfo,
) -> Result<()> {
    let pdf = PdfFile::open(input.as_ref())?;
    let mut updated = pdf.with_metadata(info)?;
    with_cleanup(output.as_ref(), |out| save_document(&mut updated, out))
}

// -- Content recovery ---------------------------------------------------------

/// Pull embedded images out of a PDF into `output_dir`.
pub fn extract_images(
    input: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
) -> Result<Vec<PathBuf>> {
    let pdf = PdfFile::open(input.as_ref())?;
    extract::extract_images(pdf.document(), output_dir.as_ref(), &pdf.base_name())
}

/// Bake form fields and annotations into static page content.
pub fn flatten(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<()> {
    let data = std::fs::read(input.as_ref())?;
    let rasterizer = PageRasterizer::new()?;
    let flattened = rasterizer.flatten_forms(&data)?;
    with_cleanup(output.as_ref(), |out| Ok(std::fs::write(out, &flattened)?))
}

/// Re-render every page in grayscale. The output is image-backed, so vector
/// content becomes raster at the rebuild resolution.
#[instrument(skip_all, fields(input = %input.as_ref().display()))]
pub fn grayscale(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<()> {
    let rasterizer = PageRasterizer::new()?;
    let pages = rasterizer.render_file(input.as_ref(), REBUILD_DPI)?;

    let gray_pages: Vec<_> = pages
        .into_iter()
        .map(|page| ImageProcessor::from_dynamic(page).grayscale().into_dynamic())
        .collect();

    let bytes = ImagePdfBuilder::new(REBUILD_DPI as f32).build(&gray_pages)?;
    with_cleanup(output.as_ref(), |out| Ok(std::fs::write(out, &bytes)?))
}

// -- OCR ----------------------------------------------------------------------

/// Recognise text on every page and write a searchable PDF: the original
/// page image with an invisible text layer underneath.
#[cfg(feature = "ocr")]
#[instrument(skip_all, fields(input = %input.as_ref().display()))]
pub fn ocr_to_searchable(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<()> {
    use crate::scan::ocr::OcrEngine;

    let engine = OcrEngine::with_defaults()?;
    let rasterizer = PageRasterizer::new()?;
    let pages = rasterizer.render_file(input.as_ref(), OCR_DPI)?;

    let mut recognised = Vec::with_capacity(pages.len());
    for page in pages {
        let text = engine.recognize_text(&page)?;
        recognised.push((page, text));
    }

    let bytes = ImagePdfBuilder::new(OCR_DPI as f32).build_searchable(&recognised)?;
    with_cleanup(output.as_ref(), |out| Ok(std::fs::write(out, &bytes)?))
}

/// Without the `ocr` feature the operation reports OCR as not installed.
#[cfg(not(feature = "ocr"))]
pub fn ocr_to_searchable(_input: impl AsRef<Path>, _output: impl AsRef<Path>) -> Result<()> {
    Err(FolioError::OcrNotInstalled(
        "this build does not include the ocr feature".to_string(),
    ))
}

// -- Geometry -----------------------------------------------------------------

/// Perspective-rectify a photographed document image. Explicit corners win;
/// otherwise the quadrilateral is auto-detected, and when nothing is found
/// the image is passed through unchanged. The rectified image is written to
/// `output` and also returned for chaining into [`images_to_pdf`].
#[instrument(skip_all, fields(input = %input.as_ref().display(), manual_corners = corners.is_some()))]
pub fn rectify_image(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    corners: Option<&CornerSet>,
) -> Result<image::DynamicImage> {
    let image = ImageProcessor::open(input.as_ref())?.into_dynamic();
    let rectified = rectify::rectify(&image, corners)?;
    with_cleanup(output.as_ref(), |out| {
        ImageProcessor::from_dynamic(rectified.clone()).save(out)
    })?;
    Ok(rectified)
}

/// Detect the document quadrilateral in an image file.
pub fn detect_corners(input: impl AsRef<Path>) -> Result<Option<CornerSet>> {
    let image = ImageProcessor::open(input.as_ref())?.into_dynamic();
    Ok(rectify::auto_detect(&image))
}

// -- Helpers ------------------------------------------------------------------

fn load_document(path: &Path) -> Result<Document> {
    Document::load(path)
        .map_err(|err| FolioError::Pdf(format!("failed to open {}: {}", path.display(), err)))
}

/// Run a write step; on failure, best-effort removal of the partial output.
fn with_cleanup<T>(output: &Path, write: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
    match write(output) {
        Ok(value) => Ok(value),
        Err(err) => {
            if output.exists() {
                if let Err(cleanup_err) = std::fs::remove_file(output) {
                    warn!(
                        output = %output.display(),
                        %cleanup_err,
                        "could not remove partial output"
                    );
                }
            }
            Err(err)
        }
    }
}
