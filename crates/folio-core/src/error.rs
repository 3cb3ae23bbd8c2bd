// SPDX-License-Identifier: MIT
//
// Unified error types for Folio.

use thiserror::Error;

/// Top-level error type for all Folio operations.
///
/// Message text is surfaced to callers unmodified — the Presentation Layer
/// displays these strings verbatim, so they are written to be readable on
/// their own. Two conditions are structurally distinguished because callers
/// react to them differently: [`FolioError::IncorrectPassword`] and
/// [`FolioError::OcrNotInstalled`].
#[derive(Debug, Error)]
pub enum FolioError {
    // -- Document errors --
    #[error("PDF operation failed: {0}")]
    Pdf(String),

    #[error("image processing failed: {0}")]
    Image(String),

    #[error("unsupported document type: {0}")]
    UnsupportedDocument(String),

    // -- Security errors --
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// The supplied password does not open the document. Deliberately terse:
    /// this exact text is what the user sees.
    #[error("Incorrect Password")]
    IncorrectPassword,

    // -- External capabilities --
    #[error("page rendering failed: {0}")]
    Raster(String),

    /// The pdfium rasterizer library could not be bound. Availability is an
    /// external precondition, not something the engine can fix.
    #[error("rasterizer unavailable: {0}")]
    RasterizerUnavailable(String),

    #[error("document conversion failed: {0}")]
    Conversion(String),

    /// No office converter binary was found on this system.
    #[error("document converter not found: {0}")]
    ConverterNotFound(String),

    #[error("OCR failed: {0}")]
    Ocr(String),

    /// The text-recognition engine is not installed (missing model files or
    /// the `ocr` feature is compiled out). Distinct from recognition errors
    /// so callers can point the user at an install step.
    #[error("OCR engine not found: {0}")]
    OcrNotInstalled(String),

    // -- I/O --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FolioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incorrect_password_displays_exact_text() {
        // The Presentation Layer matches on this message; it must not drift.
        assert_eq!(FolioError::IncorrectPassword.to_string(), "Incorrect Password");
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: FolioError = io.into();
        assert!(matches!(err, FolioError::Io(_)));
    }
}
