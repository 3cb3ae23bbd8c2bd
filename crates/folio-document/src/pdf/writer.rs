// SPDX-License-Identifier: MIT
//
// PDF writer — build new PDF documents from raster page images using
// `printpdf` 0.8.
//
// printpdf 0.8 uses a data-oriented API: documents are built by constructing
// `PdfPage` structs containing `Vec<Op>` operation lists, then serialised via
// `PdfDocument::save()`.

use std::path::Path;

use folio_core::error::{FolioError, Result};
use image::DynamicImage;
use printpdf::{
    BuiltinFont, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Point, Pt, RawImage,
    RawImageData, RawImageFormat, TextItem, XObjectTransform,
};
use tracing::{debug, info, instrument};

const PT_PER_INCH: f32 = 72.0;
const MM_PER_PT: f32 = 0.3528;

/// Builds image-backed PDF documents: one page per image, with each page
/// sized to the image at the configured resolution so the image fills the
/// page edge to edge.
pub struct ImagePdfBuilder {
    dpi: f32,
    title: Option<String>,
}

impl ImagePdfBuilder {
    pub fn new(dpi: f32) -> Self {
        Self { dpi, title: None }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    fn page_size_for(&self, image: &DynamicImage) -> (Mm, Mm) {
        let w_pt = image.width() as f32 / self.dpi * PT_PER_INCH;
        let h_pt = image.height() as f32 / self.dpi * PT_PER_INCH;
        (Mm(w_pt * MM_PER_PT), Mm(h_pt * MM_PER_PT))
    }

    fn register_image(doc: &mut PdfDocument, image: &DynamicImage) -> printpdf::XObjectId {
        let rgb = image.to_rgb8();
        let (width, height) = (rgb.width() as usize, rgb.height() as usize);
        let raw = RawImage {
            pixels: RawImageData::U8(rgb.into_raw()),
            width,
            height,
            data_format: RawImageFormat::RGB8,
            tag: Vec::new(),
        };
        doc.add_image(&raw)
    }

    fn full_bleed_ops(&self, xobject_id: printpdf::XObjectId) -> Vec<Op> {
        vec![Op::UseXobject {
            id: xobject_id,
            transform: XObjectTransform {
                translate_x: Some(Pt(0.0)),
                translate_y: Some(Pt(0.0)),
                scale_x: None,
                scale_y: None,
                dpi: Some(self.dpi),
                rotate: None,
            },
        }]
    }

    /// Build a PDF where page `i` is exactly image `i` at full bleed.
    #[instrument(skip_all, fields(pages = images.len(), dpi = self.dpi))]
    pub fn build(&self, images: &[DynamicImage]) -> Result<Vec<u8>> {
        if images.is_empty() {
            return Err(FolioError::Pdf(
                "cannot build a PDF from zero images".to_string(),
            ));
        }

        let title = self.title.as_deref().unwrap_or("Folio Document");
        let mut doc = PdfDocument::new(title);
        let mut pages: Vec<PdfPage> = Vec::with_capacity(images.len());

        for image in images {
            let (page_w, page_h) = self.page_size_for(image);
            let xobject_id = Self::register_image(&mut doc, image);
            pages.push(PdfPage::new(page_w, page_h, self.full_bleed_ops(xobject_id)));
        }

        doc.with_pages(pages);
        debug!(pages = doc.pages.len(), "image pages assembled");

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        Ok(doc.save(&PdfSaveOptions::default(), &mut warnings))
    }

    /// Build a searchable PDF: each page draws its recognised text first and
    /// the page image on top, so the text is selectable but invisible.
    #[instrument(skip_all, fields(pages = pages.len(), dpi = self.dpi))]
    pub fn build_searchable(&self, pages: &[(DynamicImage, String)]) -> Result<Vec<u8>> {
        if pages.is_empty() {
            return Err(FolioError::Pdf(
                "cannot build a PDF from zero pages".to_string(),
            ));
        }

        let title = self.title.as_deref().unwrap_or("Folio Document");
        let mut doc = PdfDocument::new(title);
        let mut pdf_pages: Vec<PdfPage> = Vec::with_capacity(pages.len());

        for (image, text) in pages {
            let (page_w, page_h) = self.page_size_for(image);
            let xobject_id = Self::register_image(&mut doc, image);

            let mut ops = text_layer_ops(text, page_h.into_pt().0);
            ops.extend(self.full_bleed_ops(xobject_id));
            pdf_pages.push(PdfPage::new(page_w, page_h, ops));
        }

        doc.with_pages(pdf_pages);
        info!(pages = doc.pages.len(), "searchable pages assembled");

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        Ok(doc.save(&PdfSaveOptions::default(), &mut warnings))
    }

    /// Build and write directly to a file.
    pub fn write_to_file(&self, images: &[DynamicImage], path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.build(images)?;
        std::fs::write(path.as_ref(), &bytes)?;
        info!("wrote image PDF to {}", path.as_ref().display());
        Ok(())
    }
}

/// Lay out recognised text as a simple top-to-bottom column. The layer sits
/// beneath the page image, so positioning only needs to be approximate for
/// selection and search to work.
fn text_layer_ops(text: &str, page_h_pt: f32) -> Vec<Op> {
    let font_size_pt: f32 = 10.0;
    let line_height_pt: f32 = 12.0;
    let margin_pt: f32 = 36.0;

    let mut ops = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let y_pt = page_h_pt - margin_pt - (index as f32 * line_height_pt);
        if y_pt < margin_pt {
            break;
        }

        ops.push(Op::StartTextSection);
        ops.push(Op::SetTextCursor {
            pos: Point {
                x: Pt(margin_pt),
                y: Pt(y_pt),
            },
        });
        ops.push(Op::SetFontSizeBuiltinFont {
            size: Pt(font_size_pt),
            font: BuiltinFont::Helvetica,
        });
        ops.push(Op::WriteTextBuiltinFont {
            items: vec![TextItem::Text(line.to_string())],
            font: BuiltinFont::Helvetica,
        });
        ops.push(Op::EndTextSection);
    }
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::PdfFile;
    use image::{Rgb, RgbImage};

    fn solid_page(w: u32, h: u32, shade: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([shade, shade, shade])))
    }

    #[test]
    fn build_produces_one_page_per_image() {
        let builder = ImagePdfBuilder::new(150.0);
        let images = vec![solid_page(300, 450, 200), solid_page(150, 150, 90)];

        let bytes = builder.build(&images).unwrap();
        let pdf = PdfFile::from_bytes(&bytes).unwrap();
        assert_eq!(pdf.page_count(), 2);
    }

    #[test]
    fn build_rejects_empty_input() {
        let builder = ImagePdfBuilder::new(150.0);
        assert!(builder.build(&[]).is_err());
    }

    #[test]
    fn searchable_pdf_parses_back() {
        let builder = ImagePdfBuilder::new(200.0).with_title("scan");
        let pages = vec![(solid_page(200, 280, 250), "hello\nworld".to_string())];

        let bytes = builder.build_searchable(&pages).unwrap();
        let pdf = PdfFile::from_bytes(&bytes).unwrap();
        assert_eq!(pdf.page_count(), 1);
    }
}
