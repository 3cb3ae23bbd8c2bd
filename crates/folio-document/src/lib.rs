// SPDX-License-Identifier: MIT
//
// folio-document — the document transform engine behind Folio.
//
// Provides the PDF operation catalog (merge, split, reorder, stamping,
// security, compression, metadata, image interchange), office-format
// conversions via LibreOffice, page rasterisation via PDFium, perspective
// rectification for photographed documents, and the page-organisation
// workflow.

pub mod convert;
pub mod image;
pub mod ops;
pub mod organize;
pub mod pdf;
pub mod raster;
pub mod scan;

// Re-export the primary types so callers can use `folio_document::OpRequest` etc.
pub use convert::OfficeConverter;
pub use image::processor::ImageProcessor;
pub use ops::{OpOutput, OpRequest};
pub use organize::{OrganizeSession, PageArrangement};
pub use pdf::reader::PdfFile;
pub use raster::PageRasterizer;
pub use scan::rectify::CornerSet;

#[cfg(feature = "ocr")]
pub use scan::ocr::OcrEngine;
