// SPDX-License-Identifier: MIT
//
// PDF reader and page assembly — open, inspect, merge, split, and reorder
// existing PDF documents using the `lopdf` crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use folio_core::error::{FolioError, Result};
use folio_core::{DocumentInfo, PageEntry, PageSelection};
use lopdf::{Document, Object, ObjectId, dictionary};
use tracing::{debug, info, instrument, warn};

/// A source PDF opened for reading.
///
/// Wraps `lopdf::Document` and provides the page-level primitives the
/// operation catalog composes: copying page subsets (with per-page rotation)
/// into new documents, and /Info metadata access.
pub struct PdfFile {
    document: Document,
    source_path: Option<PathBuf>,
}

impl PdfFile {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let document = Document::load(path_ref).map_err(|err| {
            FolioError::Pdf(format!("failed to open {}: {}", path_ref.display(), err))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded");

        Ok(Self {
            document,
            source_path: Some(path_ref.to_path_buf()),
        })
    }

    /// Create a reader from raw PDF bytes already in memory.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| {
            FolioError::Pdf(format!("failed to load PDF from memory: {}", err))
        })?;
        Ok(Self {
            document,
            source_path: None,
        })
    }

    // -- Inspection -----------------------------------------------------------

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Page object ids in document order.
    pub fn page_ids(&self) -> Vec<ObjectId> {
        self.document.get_pages().values().copied().collect()
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// File stem of the source path, used for derived output names.
    pub fn base_name(&self) -> String {
        self.source_path
            .as_deref()
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    // -- Page assembly --------------------------------------------------------

    /// Build a new document containing the pages named by `entries`, in entry
    /// order, with each entry's rotation applied on top of any existing
    /// /Rotate value.
    ///
    /// An entry whose `original_index` is out of range is skipped with a
    /// warning — never fatal.
    #[instrument(skip_all, fields(entries = entries.len()))]
    pub fn assemble(&self, entries: &[PageEntry]) -> Result<Document> {
        let pages = self.page_ids();
        let (mut target, pages_root) = new_document_skeleton();
        let mut importer = PageImporter::new(&self.document);

        for entry in entries {
            let Some(&page_id) = pages.get(entry.original_index) else {
                warn!(
                    original_index = entry.original_index,
                    page_count = pages.len(),
                    "skipping entry referencing a page outside the source document"
                );
                continue;
            };

            let cloned_id = importer.import_page(&mut target, page_id, pages_root)?;

            if entry.rotation.degrees() != 0 {
                apply_rotation(&mut target, cloned_id, entry.rotation.degrees())?;
            }
        }

        Ok(target)
    }

    /// Build one document per selected page, paired with the 1-based original
    /// page number (for output naming).
    pub fn explode(&self, selection: &PageSelection) -> Result<Vec<(usize, Document)>> {
        let mut out = Vec::with_capacity(selection.len());
        for &index in &selection.0 {
            let doc = self.assemble(&[PageEntry::new(index)])?;
            out.push((index + 1, doc));
        }
        Ok(out)
    }

    /// Build a single document containing exactly the selected pages, in
    /// selection order.
    pub fn extract(&self, selection: &PageSelection) -> Result<Document> {
        let entries: Vec<PageEntry> = selection.0.iter().map(|&i| PageEntry::new(i)).collect();
        self.assemble(&entries)
    }

    // -- Metadata -------------------------------------------------------------

    /// Read the standard /Info dictionary keys.
    pub fn metadata(&self) -> DocumentInfo {
        let mut info = DocumentInfo::default();

        let Some(dict) = self.info_dictionary() else {
            return info;
        };

        info.title = read_text_entry(dict, b"Title");
        info.author = read_text_entry(dict, b"Author");
        info.subject = read_text_entry(dict, b"Subject");
        info.producer = read_text_entry(dict, b"Producer");
        info.creator = read_text_entry(dict, b"Creator");
        info
    }

    fn info_dictionary(&self) -> Option<&lopdf::Dictionary> {
        let info_obj = self.document.trailer.get(b"Info").ok()?;
        match info_obj {
            Object::Reference(id) => match self.document.get_object(*id).ok()? {
                Object::Dictionary(dict) => Some(dict),
                _ => None,
            },
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    /// Rewrite the document with only the supplied non-empty keys replacing
    /// old /Info values; all pages are preserved unchanged.
    #[instrument(skip_all)]
    pub fn with_metadata(&self, update: &DocumentInfo) -> Result<Document> {
        let mut doc = self.document.clone();

        // Resolve or create the /Info dictionary.
        let info_id = match doc.trailer.get(b"Info") {
            Ok(Object::Reference(id)) => *id,
            _ => {
                let id = doc.add_object(Object::Dictionary(lopdf::Dictionary::new()));
                doc.trailer.set("Info", Object::Reference(id));
                id
            }
        };

        if let Ok(Object::Dictionary(dict)) = doc.get_object_mut(info_id) {
            for (key, value) in update.present_fields() {
                dict.set(key, Object::string_literal(value));
            }
        } else {
            return Err(FolioError::Pdf("/Info is not a dictionary".to_string()));
        }

        info!("metadata updated");
        Ok(doc)
    }
}

/// Decode a PDF text-string entry, handling the UTF-16BE BOM form.
fn read_text_entry(dict: &lopdf::Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key).ok()? {
        Object::String(bytes, _) => Some(decode_pdf_text(bytes)),
        _ => None,
    }
}

/// PDF text strings are either PDFDocEncoding (treated as Latin-1-ish here)
/// or UTF-16BE with a leading BOM.
pub(crate) fn decode_pdf_text(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Serialise a document to a file.
pub fn save_document(doc: &mut Document, path: impl AsRef<Path>) -> Result<()> {
    doc.save(path.as_ref()).map_err(|err| {
        FolioError::Pdf(format!(
            "failed to write {}: {}",
            path.as_ref().display(),
            err
        ))
    })?;
    Ok(())
}

/// Serialise a document to bytes.
pub fn document_to_bytes(doc: &mut Document) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|err| FolioError::Pdf(format!("failed to serialise PDF: {}", err)))?;
    Ok(out)
}

/// Create an empty document with a /Catalog and /Pages skeleton, returning the
/// document and the id of the /Pages node that cloned pages attach to.
pub(crate) fn new_document_skeleton() -> (Document, ObjectId) {
    let mut doc = Document::with_version("1.5");

    let pages_id = doc.new_object_id();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => Object::Array(Vec::new()),
            "Count" => 0,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    (doc, pages_id)
}

/// Add `degrees` to the page's existing /Rotate value, normalised mod 360.
fn apply_rotation(doc: &mut Document, page_id: ObjectId, degrees: i32) -> Result<()> {
    let existing = match doc.get_object(page_id) {
        Ok(Object::Dictionary(dict)) => dict
            .get(b"Rotate")
            .ok()
            .and_then(|r| r.as_i64().ok())
            .map(|v| v as i32)
            .unwrap_or(0),
        _ => 0,
    };

    let rotation = (existing + degrees).rem_euclid(360);
    if let Ok(Object::Dictionary(dict)) = doc.get_object_mut(page_id) {
        dict.set("Rotate", Object::Integer(rotation as i64));
    }
    Ok(())
}

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_PAGE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Copies pages from one document into another.
///
/// Every transitively referenced object is imported once and remembered, so
/// resources shared between pages (fonts, images) are not duplicated per
/// referencing page, and back references into already-imported objects (an
/// annotation's /P entry pointing at its own page) resolve instead of
/// recursing.
pub(crate) struct PageImporter<'a> {
    source: &'a Document,
    imported: HashMap<ObjectId, ObjectId>,
}

impl<'a> PageImporter<'a> {
    pub fn new(source: &'a Document) -> Self {
        Self {
            source,
            imported: HashMap::new(),
        }
    }

    /// Clone `page_id` and everything it references into `target`, appending
    /// it under `pages_root`. Returns the cloned page's id.
    ///
    /// Importing the same page twice yields independent page objects, so
    /// per-copy attributes like /Rotate stay separate.
    pub fn import_page(
        &mut self,
        target: &mut Document,
        page_id: ObjectId,
        pages_root: ObjectId,
    ) -> Result<ObjectId> {
        let source = self.source;
        let page_object = source.get_object(page_id).map_err(|err| {
            FolioError::Pdf(format!("cannot read page object {:?}: {}", page_id, err))
        })?;

        // Reserve the target id up front so references back into this page
        // resolve to the clone being built.
        let cloned_id = target.new_object_id();
        self.imported.insert(page_id, cloned_id);

        let mut cloned_object = self.clone_object(target, page_object)?;

        // Attributes inherited from the source page tree must move onto the
        // page itself; the target tree has no ancestors to supply them.
        if let Object::Dictionary(dict) = &mut cloned_object {
            for key in INHERITABLE_PAGE_KEYS {
                if dict.get(key).is_err() {
                    if let Some(value) = inherited_attribute(source, page_id, key) {
                        let cloned_value = self.clone_object(target, value)?;
                        dict.set(key, cloned_value);
                    }
                }
            }
        }
        target.objects.insert(cloned_id, cloned_object);

        // Attach to the /Pages node: append to /Kids and bump /Count.
        if let Ok(Object::Dictionary(pages_dict)) = target.get_object_mut(pages_root) {
            if let Ok(Object::Array(kids)) = pages_dict.get_mut(b"Kids") {
                kids.push(Object::Reference(cloned_id));
            }
            if let Ok(Object::Integer(count)) = pages_dict.get_mut(b"Count") {
                *count += 1;
            }
        }

        // Point the cloned page's /Parent at the target's page tree.
        if let Ok(Object::Dictionary(page_dict)) = target.get_object_mut(cloned_id) {
            page_dict.set("Parent", Object::Reference(pages_root));
        }

        Ok(cloned_id)
    }

    fn clone_object(&mut self, target: &mut Document, object: &Object) -> Result<Object> {
        match object {
            Object::Dictionary(dict) => {
                Ok(Object::Dictionary(self.clone_dictionary(target, dict)?))
            }
            Object::Array(array) => {
                let mut new_array = Vec::with_capacity(array.len());
                for item in array {
                    new_array.push(self.clone_object(target, item)?);
                }
                Ok(Object::Array(new_array))
            }
            Object::Reference(ref_id) => {
                if let Some(&existing) = self.imported.get(ref_id) {
                    return Ok(Object::Reference(existing));
                }
                match self.source.get_object(*ref_id) {
                    Ok(referenced) => {
                        // Reserve the id before descending so cycles close on
                        // the reservation instead of recursing forever.
                        let new_id = target.new_object_id();
                        self.imported.insert(*ref_id, new_id);
                        let cloned = self.clone_object(target, referenced)?;
                        target.objects.insert(new_id, cloned);
                        Ok(Object::Reference(new_id))
                    }
                    Err(err) => {
                        warn!(?ref_id, %err, "cannot resolve reference; substituting Null");
                        Ok(Object::Null)
                    }
                }
            }
            Object::Stream(stream) => {
                let new_dict = self.clone_dictionary(target, &stream.dict)?;
                Ok(Object::Stream(lopdf::Stream::new(
                    new_dict,
                    stream.content.clone(),
                )))
            }
            // Boolean, Integer, Real, String, Name, Null are trivially cloneable.
            other => Ok(other.clone()),
        }
    }

    fn clone_dictionary(
        &mut self,
        target: &mut Document,
        dict: &lopdf::Dictionary,
    ) -> Result<lopdf::Dictionary> {
        let mut new_dict = lopdf::Dictionary::new();
        for (key, value) in dict.iter() {
            // Following /Parent would drag in the entire source page tree;
            // import_page repoints it at the target's tree afterwards.
            if key == b"Parent" {
                continue;
            }
            let cloned = self.clone_object(target, value)?;
            new_dict.set(key.clone(), cloned);
        }
        Ok(new_dict)
    }
}

/// Look up an inheritable page attribute on the ancestors of `page_id`.
fn inherited_attribute<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = parent_of(doc, page_id);
    for _ in 0..32 {
        let id = current?;
        let Ok(Object::Dictionary(dict)) = doc.get_object(id) else {
            return None;
        };
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        current = parent_of(doc, id);
    }
    None
}

fn parent_of(doc: &Document, id: ObjectId) -> Option<ObjectId> {
    match doc.get_object(id).ok()? {
        Object::Dictionary(dict) => match dict.get(b"Parent").ok()? {
            Object::Reference(parent) => Some(*parent),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::test_support::fixture_pdf;
    use folio_core::Rotation;

    #[test]
    fn page_count_matches_fixture() {
        let pdf = PdfFile::from_bytes(&fixture_pdf(&["alpha", "beta", "gamma"])).unwrap();
        assert_eq!(pdf.page_count(), 3);
    }

    #[test]
    fn assemble_reorders_and_rotates() {
        let pdf = PdfFile::from_bytes(&fixture_pdf(&["one", "two", "three"])).unwrap();
        let entries = [
            PageEntry {
                original_index: 2,
                rotation: Rotation::R90,
            },
            PageEntry::new(0),
        ];

        let mut assembled = pdf.assemble(&entries).unwrap();
        let bytes = document_to_bytes(&mut assembled).unwrap();
        let result = PdfFile::from_bytes(&bytes).unwrap();
        assert_eq!(result.page_count(), 2);

        // First output page carries the rotation; second page does not.
        let pages = result.page_ids();
        let first = result.document().get_object(pages[0]).unwrap();
        if let Object::Dictionary(dict) = first {
            assert_eq!(dict.get(b"Rotate").unwrap().as_i64().unwrap(), 90);
        } else {
            panic!("page is not a dictionary");
        }
        let second = result.document().get_object(pages[1]).unwrap();
        if let Object::Dictionary(dict) = second {
            assert!(dict.get(b"Rotate").is_err());
        }
    }

    #[test]
    fn assemble_skips_out_of_range_entries() {
        let pdf = PdfFile::from_bytes(&fixture_pdf(&["a", "b", "c"])).unwrap();
        let entries = [PageEntry::new(5), PageEntry::new(1)];

        let mut assembled = pdf.assemble(&entries).unwrap();
        let bytes = document_to_bytes(&mut assembled).unwrap();
        assert_eq!(PdfFile::from_bytes(&bytes).unwrap().page_count(), 1);
    }

    /// One page carrying a text annotation whose /P entry references the
    /// page itself, as real-world annotated PDFs do.
    fn annotated_fixture() -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.new_object_id();

        let annot_id = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Text",
            "Rect" => Object::Array(vec![
                Object::Integer(10),
                Object::Integer(10),
                Object::Integer(40),
                Object::Integer(40),
            ]),
            "Contents" => Object::string_literal("margin note"),
            "P" => Object::Reference(page_id),
        });
        doc.objects.insert(
            page_id,
            Object::Dictionary(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "MediaBox" => Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(612),
                    Object::Integer(792),
                ]),
                "Annots" => Object::Array(vec![Object::Reference(annot_id)]),
            }),
        );
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => Object::Array(vec![Object::Reference(page_id)]),
                "Count" => 1,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    #[test]
    fn assemble_terminates_on_annotation_back_references() {
        let pdf = PdfFile {
            document: annotated_fixture(),
            source_path: None,
        };

        let mut assembled = pdf.assemble(&[PageEntry::new(0)]).unwrap();
        let bytes = document_to_bytes(&mut assembled).unwrap();
        let result = PdfFile::from_bytes(&bytes).unwrap();
        assert_eq!(result.page_count(), 1);

        // The annotation survives and its /P points at the cloned page.
        let page_id = result.page_ids()[0];
        let page = result.document().get_object(page_id).unwrap().as_dict().unwrap();
        let annots = page.get(b"Annots").unwrap().as_array().unwrap();
        let annot_id = annots[0].as_reference().unwrap();
        let annot = result.document().get_object(annot_id).unwrap().as_dict().unwrap();
        assert_eq!(annot.get(b"P").unwrap().as_reference().unwrap(), page_id);
    }

    #[test]
    fn assemble_materialises_inherited_page_attributes() {
        // MediaBox and Rotate live only on the source /Pages node.
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => Object::Array(vec![Object::Reference(page_id)]),
                "Count" => 1,
                "MediaBox" => Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(300),
                    Object::Integer(400),
                ]),
                "Rotate" => 90,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let pdf = PdfFile {
            document: doc,
            source_path: None,
        };
        let mut assembled = pdf.assemble(&[PageEntry::new(0)]).unwrap();
        let bytes = document_to_bytes(&mut assembled).unwrap();
        let result = PdfFile::from_bytes(&bytes).unwrap();

        let page_id = result.page_ids()[0];
        let page = result.document().get_object(page_id).unwrap().as_dict().unwrap();
        let media: Vec<i64> = page
            .get(b"MediaBox")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_i64().unwrap())
            .collect();
        assert_eq!(media, vec![0, 0, 300, 400]);
        assert_eq!(page.get(b"Rotate").unwrap().as_i64().unwrap(), 90);
    }

    #[test]
    fn extract_preserves_selection_order() {
        let pdf = PdfFile::from_bytes(&fixture_pdf(&["p1", "p2", "p3", "p4", "p5"])).unwrap();
        let selection = PageSelection::parse("1-2,4", 5);

        let mut extracted = pdf.extract(&selection).unwrap();
        let bytes = document_to_bytes(&mut extracted).unwrap();
        assert_eq!(PdfFile::from_bytes(&bytes).unwrap().page_count(), 3);
    }

    #[test]
    fn explode_pairs_documents_with_original_page_numbers() {
        let pdf = PdfFile::from_bytes(&fixture_pdf(&["a", "b", "c", "d"])).unwrap();
        let selection = PageSelection::parse("2,4", 4);

        let parts = pdf.explode(&selection).unwrap();
        let numbers: Vec<usize> = parts.iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, vec![2, 4]);
    }

    #[test]
    fn metadata_round_trip_updates_only_supplied_keys() {
        let pdf = PdfFile::from_bytes(&fixture_pdf(&["body"])).unwrap();

        let update = DocumentInfo {
            title: Some("Quarterly Report".into()),
            author: Some("QA".into()),
            ..Default::default()
        };
        let mut updated = pdf.with_metadata(&update).unwrap();
        let bytes = document_to_bytes(&mut updated).unwrap();

        let reread = PdfFile::from_bytes(&bytes).unwrap();
        let info = reread.metadata();
        assert_eq!(info.title.as_deref(), Some("Quarterly Report"));
        assert_eq!(info.author.as_deref(), Some("QA"));
        assert_eq!(info.subject, None);
        assert_eq!(reread.page_count(), 1);
    }

    #[test]
    fn decode_utf16_text_strings() {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in "Überschrift".encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(decode_pdf_text(&bytes), "Überschrift");
        assert_eq!(decode_pdf_text(b"plain"), "plain");
    }
}
