// SPDX-License-Identifier: MIT
//
// Core domain types for the Folio document engine.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A file the user has staged for an operation (added via dialog or
/// drag-and-drop). Identity is the path string — duplicates are allowed and
/// processed independently. The engine never modifies the referenced file
/// unless it is also the chosen output path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedFile {
    pub path: PathBuf,
    /// Cached preview image, if one has been rendered.
    pub thumbnail: Option<PathBuf>,
    pub added_at: DateTime<Utc>,
}

impl StagedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            thumbnail: None,
            added_at: Utc::now(),
        }
    }

    /// Case-insensitive extension check against an allow-list, used by
    /// drag-drop admission filtering.
    pub fn has_extension(path: &Path, allowed: &[&str]) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let lower = ext.to_ascii_lowercase();
                allowed.iter().any(|a| *a == lower)
            })
            .unwrap_or(false)
    }
}

/// Page rotation applied at export time. Never mutates the source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    /// Normalize arbitrary degrees into the quadrant set; `-90` becomes
    /// `R270`. Values that are not multiples of 90 round down to the nearest
    /// quadrant.
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) / 90 {
            1 => Self::R90,
            2 => Self::R180,
            3 => Self::R270,
            _ => Self::R0,
        }
    }

    pub fn degrees(&self) -> i32 {
        match self {
            Self::R0 => 0,
            Self::R90 => 90,
            Self::R180 => 180,
            Self::R270 => 270,
        }
    }

    /// Rotate a further 90° clockwise.
    pub fn rotated_cw(&self) -> Self {
        Self::from_degrees(self.degrees() + 90)
    }
}

/// One page of a loaded source document in the reorder workflow.
///
/// `original_index` is 0-based against the *original* document and stays
/// valid regardless of where the entry sits in the display order. At save
/// time the ordered entry sequence fully determines the output page order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageEntry {
    pub original_index: usize,
    pub rotation: Rotation,
}

impl PageEntry {
    pub fn new(original_index: usize) -> Self {
        Self {
            original_index,
            rotation: Rotation::R0,
        }
    }
}

/// How `split` fans out its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitMode {
    /// One output file per selected page.
    All,
    /// One output file containing exactly the selected pages.
    Extract,
}

/// A parsed page selection: 0-based indices in the order the user wrote them.
///
/// The textual form is comma-separated tokens, each either a single 1-based
/// page number or an inclusive `start-end` range. Malformed tokens are
/// dropped silently; indices outside the document are clamped away. An empty
/// selection is valid and simply selects nothing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageSelection(pub Vec<usize>);

impl PageSelection {
    /// Parse a page spec against a document of `page_count` pages.
    pub fn parse(spec: &str, page_count: usize) -> Self {
        let mut indices = Vec::new();

        for token in spec.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }

            if let Some((start, end)) = token.split_once('-') {
                match (start.trim().parse::<usize>(), end.trim().parse::<usize>()) {
                    (Ok(start), Ok(end)) if start >= 1 && start <= end => {
                        for page in start..=end {
                            if page <= page_count {
                                indices.push(page - 1);
                            }
                        }
                    }
                    _ => debug!(token, "dropping malformed range token"),
                }
            } else {
                match token.parse::<usize>() {
                    Ok(page) if page >= 1 && page <= page_count => indices.push(page - 1),
                    Ok(page) => debug!(page, page_count, "dropping out-of-range page token"),
                    Err(_) => debug!(token, "dropping malformed page token"),
                }
            }
        }

        Self(indices)
    }

    /// All pages of a `page_count`-page document, in order.
    pub fn all(page_count: usize) -> Self {
        Self((0..page_count).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Standard-encryption cipher choice for `protect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionAlgorithm {
    Aes256,
    Aes128,
    Rc4_128,
}

impl EncryptionAlgorithm {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Aes256 => "AES-256",
            Self::Aes128 => "AES-128",
            Self::Rc4_128 => "RC4-128",
        }
    }
}

/// Compression strategy — three qualitatively different approaches, not one
/// algorithm with three settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionLevel {
    /// Lossless content-stream recompression. Exact rendering preserved.
    Low,
    /// Container rewrite with object-stream consolidation. Still lossless.
    Medium,
    /// Rasterize every page to a lower-DPI image and rebuild as an
    /// image-only PDF. Large reduction, irreversible text/quality loss.
    Extreme,
}

/// Anchor for the "Page i of N" stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageNumberPosition {
    BottomCenter,
    BottomRight,
    TopRight,
}

/// Raster output encoding for `pdf_to_images`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageOutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl ImageOutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

/// The standard PDF /Info metadata namespace. `None` means "absent" on read
/// and "leave unchanged" on update; updates only rewrite the supplied
/// non-empty keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub producer: Option<String>,
    pub creator: Option<String>,
}

impl DocumentInfo {
    /// Iterate the (PDF key, value) pairs that are present and non-empty.
    pub fn present_fields(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("Title", self.title.as_deref()),
            ("Author", self.author.as_deref()),
            ("Subject", self.subject.as_deref()),
            ("Producer", self.producer.as_deref()),
            ("Creator", self.creator.as_deref()),
        ]
        .into_iter()
        .filter_map(|(key, value)| match value {
            Some(v) if !v.is_empty() => Some((key, v)),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.present_fields().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_normalizes_negative_degrees() {
        assert_eq!(Rotation::from_degrees(-90), Rotation::R270);
        assert_eq!(Rotation::from_degrees(450), Rotation::R90);
        assert_eq!(Rotation::from_degrees(0), Rotation::R0);
    }

    #[test]
    fn rotation_cycles_clockwise() {
        assert_eq!(Rotation::R270.rotated_cw(), Rotation::R0);
    }

    #[test]
    fn page_selection_parses_mixed_tokens() {
        let sel = PageSelection::parse("1-2,4", 5);
        assert_eq!(sel.0, vec![0, 1, 3]);
    }

    #[test]
    fn page_selection_clamps_to_page_count() {
        let sel = PageSelection::parse("3-10", 5);
        assert_eq!(sel.0, vec![2, 3, 4]);
    }

    #[test]
    fn page_selection_drops_malformed_tokens() {
        let sel = PageSelection::parse("1, x, 3-2, 4-, 2", 5);
        assert_eq!(sel.0, vec![0, 1]);
    }

    #[test]
    fn page_selection_empty_intersection_is_not_an_error() {
        let sel = PageSelection::parse("7-9", 5);
        assert!(sel.is_empty());
    }

    #[test]
    fn page_selection_preserves_request_order() {
        let sel = PageSelection::parse("4,1,2", 5);
        assert_eq!(sel.0, vec![3, 0, 1]);
    }

    #[test]
    fn staged_file_extension_filter() {
        assert!(StagedFile::has_extension(Path::new("a/b/Scan.PDF"), &["pdf"]));
        assert!(!StagedFile::has_extension(Path::new("a/b/scan.docx"), &["pdf"]));
        assert!(!StagedFile::has_extension(Path::new("noext"), &["pdf"]));
    }

    #[test]
    fn document_info_skips_empty_fields() {
        let info = DocumentInfo {
            title: Some("Report".into()),
            author: Some(String::new()),
            ..Default::default()
        };
        let fields: Vec<_> = info.present_fields().collect();
        assert_eq!(fields, vec![("Title", "Report")]);
    }
}
