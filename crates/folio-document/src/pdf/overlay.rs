// SPDX-License-Identifier: MIT
//
// Content overlays — stamp watermark text and page numbers onto existing
// pages by appending content streams, leaving the original page content
// untouched.

use folio_core::error::{FolioError, Result};
use folio_core::PageNumberPosition;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, dictionary};
use tracing::{debug, instrument};

const FONT_RESOURCE: &str = "FolioF1";
const GSTATE_RESOURCE: &str = "FolioGS1";

/// US Letter, used when no MediaBox can be resolved anywhere in the page tree.
const DEFAULT_PAGE_SIZE: (f32, f32) = (612.0, 792.0);

/// Average Helvetica advance width as a fraction of the font size. Good
/// enough for centring stamped text.
const HELVETICA_AVG_WIDTH: f32 = 0.5;

/// Stamp diagonal watermark text across every page.
///
/// The watermark is drawn in grey at the given constant opacity, rotated
/// about the page centre, sized so the text spans most of the page width.
#[instrument(skip(doc))]
pub fn apply_watermark(
    doc: &mut Document,
    text: &str,
    opacity: f32,
    rotation_degrees: f32,
) -> Result<()> {
    if text.is_empty() {
        return Err(FolioError::Pdf("watermark text is empty".to_string()));
    }

    let gstate_id = doc.add_object(dictionary! {
        "Type" => "ExtGState",
        "ca" => Object::Real(opacity),
        "CA" => Object::Real(opacity),
    });
    let font_id = helvetica_font(doc);

    let page_ids: Vec<ObjectId> = doc.get_pages().values().copied().collect();
    for page_id in page_ids {
        let (width, height) = page_media_box(doc, page_id);

        // Size the text to roughly 80% of the page width.
        let char_count = text.chars().count().max(1) as f32;
        let font_size = (0.8 * width) / (HELVETICA_AVG_WIDTH * char_count);
        let text_width = char_count * HELVETICA_AVG_WIDTH * font_size;

        let theta = rotation_degrees.to_radians();
        let (sin, cos) = theta.sin_cos();
        let tx = width / 2.0 - (text_width / 2.0) * cos;
        let ty = height / 2.0 - (text_width / 2.0) * sin;

        let overlay = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new("gs", vec![GSTATE_RESOURCE.into()]),
                Operation::new("BT", vec![]),
                Operation::new(
                    "Tf",
                    vec![FONT_RESOURCE.into(), Object::Real(font_size)],
                ),
                Operation::new(
                    "rg",
                    vec![
                        Object::Real(0.6),
                        Object::Real(0.6),
                        Object::Real(0.6),
                    ],
                ),
                Operation::new(
                    "Tm",
                    vec![
                        Object::Real(cos),
                        Object::Real(sin),
                        Object::Real(-sin),
                        Object::Real(cos),
                        Object::Real(tx),
                        Object::Real(ty),
                    ],
                ),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
                Operation::new("Q", vec![]),
            ],
        };

        ensure_inline_resources(doc, page_id)?;
        add_resource_entry(doc, page_id, "ExtGState", GSTATE_RESOURCE, gstate_id)?;
        add_resource_entry(doc, page_id, "Font", FONT_RESOURCE, font_id)?;
        append_page_content(doc, page_id, overlay)?;
    }

    debug!("watermark stamped on all pages");
    Ok(())
}

/// Stamp "Page i of N" on every page at the requested anchor, using each
/// page's own dimensions.
#[instrument(skip(doc))]
pub fn apply_page_numbers(doc: &mut Document, position: PageNumberPosition) -> Result<()> {
    let font_id = helvetica_font(doc);
    let font_size: f32 = 10.0;
    let margin: f32 = 40.0;

    let page_ids: Vec<ObjectId> = doc.get_pages().values().copied().collect();
    let total = page_ids.len();

    for (index, page_id) in page_ids.into_iter().enumerate() {
        let (width, height) = page_media_box(doc, page_id);
        let label = format!("Page {} of {}", index + 1, total);
        let text_width = label.chars().count() as f32 * HELVETICA_AVG_WIDTH * font_size;

        let (x, y) = match position {
            PageNumberPosition::BottomCenter => ((width - text_width) / 2.0, margin / 2.0 + 10.0),
            PageNumberPosition::BottomRight => (width - text_width - margin, margin / 2.0 + 10.0),
            PageNumberPosition::TopRight => (width - text_width - margin, height - margin),
        };

        let overlay = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new("BT", vec![]),
                Operation::new(
                    "Tf",
                    vec![FONT_RESOURCE.into(), Object::Real(font_size)],
                ),
                Operation::new(
                    "rg",
                    vec![Object::Real(0.0), Object::Real(0.0), Object::Real(0.0)],
                ),
                Operation::new("Td", vec![Object::Real(x), Object::Real(y)]),
                Operation::new("Tj", vec![Object::string_literal(label.as_str())]),
                Operation::new("ET", vec![]),
                Operation::new("Q", vec![]),
            ],
        };

        ensure_inline_resources(doc, page_id)?;
        add_resource_entry(doc, page_id, "Font", FONT_RESOURCE, font_id)?;
        append_page_content(doc, page_id, overlay)?;
    }

    debug!(pages = total, "page numbers stamped");
    Ok(())
}

fn helvetica_font(doc: &mut Document) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    })
}

fn number_of(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Resolve the page's MediaBox, walking the /Parent chain for inherited
/// values. Falls back to US Letter.
pub(crate) fn page_media_box(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    let mut current = Some(page_id);
    for _ in 0..32 {
        let Some(id) = current else { break };
        let Ok(Object::Dictionary(dict)) = doc.get_object(id) else {
            break;
        };

        if let Ok(Object::Array(bounds)) = dict.get(b"MediaBox") {
            if bounds.len() == 4 {
                let values: Vec<f32> = bounds.iter().filter_map(number_of).collect();
                if values.len() == 4 {
                    return ((values[2] - values[0]).abs(), (values[3] - values[1]).abs());
                }
            }
        }

        current = match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => Some(*parent),
            _ => None,
        };
    }
    DEFAULT_PAGE_SIZE
}

/// Make sure the page carries its own inline /Resources dictionary, cloning
/// any referenced or inherited one so per-page additions stay local.
fn ensure_inline_resources(doc: &mut Document, page_id: ObjectId) -> Result<()> {
    let resolved: Option<lopdf::Dictionary> = {
        let mut found = None;
        let mut current = Some(page_id);
        for depth in 0..32 {
            let Some(id) = current else { break };
            let Ok(Object::Dictionary(dict)) = doc.get_object(id) else {
                break;
            };
            match dict.get(b"Resources") {
                Ok(Object::Dictionary(inline)) => {
                    // Already inline on the page itself: nothing to do.
                    if depth == 0 {
                        return Ok(());
                    }
                    found = Some(inline.clone());
                    break;
                }
                Ok(Object::Reference(res_id)) => {
                    if let Ok(Object::Dictionary(target)) = doc.get_object(*res_id) {
                        found = Some(target.clone());
                    }
                    break;
                }
                _ => {}
            }
            current = match dict.get(b"Parent") {
                Ok(Object::Reference(parent)) => Some(*parent),
                _ => None,
            };
        }
        found
    };

    let resources = resolved.unwrap_or_default();
    if let Ok(Object::Dictionary(page)) = doc.get_object_mut(page_id) {
        page.set("Resources", Object::Dictionary(resources));
        Ok(())
    } else {
        Err(FolioError::Pdf(format!(
            "page object {:?} is not a dictionary",
            page_id
        )))
    }
}

/// Register `name => Reference(value)` under the given resource category
/// (Font, ExtGState, ...) of the page's inline resources.
fn add_resource_entry(
    doc: &mut Document,
    page_id: ObjectId,
    category: &str,
    name: &str,
    value: ObjectId,
) -> Result<()> {
    // A referenced category subdictionary gets cloned inline first.
    let referenced_category: Option<lopdf::Dictionary> = {
        let Ok(Object::Dictionary(page)) = doc.get_object(page_id) else {
            return Err(FolioError::Pdf(format!(
                "page object {:?} is not a dictionary",
                page_id
            )));
        };
        match page
            .get(b"Resources")
            .ok()
            .and_then(|r| r.as_dict().ok())
            .and_then(|res| res.get(category.as_bytes()).ok())
        {
            Some(Object::Reference(id)) => match doc.get_object(*id) {
                Ok(Object::Dictionary(dict)) => Some(dict.clone()),
                _ => Some(lopdf::Dictionary::new()),
            },
            _ => None,
        }
    };

    let Ok(Object::Dictionary(page)) = doc.get_object_mut(page_id) else {
        return Err(FolioError::Pdf(format!(
            "page object {:?} is not a dictionary",
            page_id
        )));
    };
    let Ok(Object::Dictionary(resources)) = page.get_mut(b"Resources") else {
        return Err(FolioError::Pdf("page /Resources is not inline".to_string()));
    };

    if let Some(cloned) = referenced_category {
        resources.set(category, Object::Dictionary(cloned));
    } else if resources.get(category.as_bytes()).is_err() {
        resources.set(category, Object::Dictionary(lopdf::Dictionary::new()));
    }

    if let Ok(Object::Dictionary(subdict)) = resources.get_mut(category.as_bytes()) {
        subdict.set(name, Object::Reference(value));
        Ok(())
    } else {
        Err(FolioError::Pdf(format!(
            "resource category /{} is not a dictionary",
            category
        )))
    }
}

/// Append an overlay content stream after the page's existing content. The
/// original streams are bracketed in q/Q so a graphics state they leave
/// unbalanced cannot skew the overlay, which then brackets its own state.
fn append_page_content(doc: &mut Document, page_id: ObjectId, overlay: Content) -> Result<()> {
    let encoded = overlay
        .encode()
        .map_err(|err| FolioError::Pdf(format!("failed to encode overlay stream: {}", err)))?;

    let mut overlay_bytes = b"Q\n".to_vec();
    overlay_bytes.extend(encoded);
    let overlay_id = doc.add_object(lopdf::Stream::new(dictionary! {}, overlay_bytes));
    let prologue_id = doc.add_object(lopdf::Stream::new(dictionary! {}, b"q\n".to_vec()));

    // Snapshot the existing /Contents value before mutating the page.
    let existing = {
        let Ok(Object::Dictionary(page)) = doc.get_object(page_id) else {
            return Err(FolioError::Pdf(format!(
                "page object {:?} is not a dictionary",
                page_id
            )));
        };
        page.get(b"Contents").ok().cloned()
    };

    let originals: Vec<Object> = match existing {
        Some(Object::Array(items)) => items,
        Some(Object::Reference(id)) => match doc.get_object(id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(id)],
        },
        Some(other @ Object::Stream(_)) => {
            let id = doc.add_object(other);
            vec![Object::Reference(id)]
        }
        _ => Vec::new(),
    };

    let mut contents = Vec::with_capacity(originals.len() + 2);
    contents.push(Object::Reference(prologue_id));
    contents.extend(originals);
    contents.push(Object::Reference(overlay_id));

    if let Ok(Object::Dictionary(page)) = doc.get_object_mut(page_id) {
        page.set("Contents", Object::Array(contents));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::test_support::fixture_pdf;

    fn load(bytes: &[u8]) -> Document {
        Document::load_mem(bytes).unwrap()
    }

    fn page_content_text(doc: &Document, page_number: u32) -> String {
        let pages = doc.get_pages();
        let page_id = pages[&page_number];
        let content = doc.get_page_content(page_id).unwrap();
        String::from_utf8_lossy(&content).into_owned()
    }

    #[test]
    fn watermark_appends_overlay_to_every_page() {
        let mut doc = load(&fixture_pdf(&["first", "second"]));
        apply_watermark(&mut doc, "CONFIDENTIAL", 0.5, 45.0).unwrap();

        for page in 1..=2u32 {
            let text = page_content_text(&doc, page);
            assert!(text.contains("CONFIDENTIAL"), "page {} missing stamp", page);
            assert!(text.contains("gs"), "page {} missing opacity state", page);
        }
    }

    #[test]
    fn watermark_rejects_empty_text() {
        let mut doc = load(&fixture_pdf(&["only"]));
        assert!(apply_watermark(&mut doc, "", 0.5, 45.0).is_err());
    }

    #[test]
    fn page_numbers_count_all_pages() {
        let mut doc = load(&fixture_pdf(&["a", "b", "c"]));
        apply_page_numbers(&mut doc, PageNumberPosition::BottomCenter).unwrap();

        assert!(page_content_text(&doc, 1).contains("Page 1 of 3"));
        assert!(page_content_text(&doc, 2).contains("Page 2 of 3"));
        assert!(page_content_text(&doc, 3).contains("Page 3 of 3"));
    }

    #[test]
    fn original_content_survives_the_overlay() {
        let mut doc = load(&fixture_pdf(&["keep me"]));
        apply_page_numbers(&mut doc, PageNumberPosition::TopRight).unwrap();
        assert!(page_content_text(&doc, 1).contains("keep me"));
    }

    #[test]
    fn overlay_restores_graphics_state_before_stamping() {
        let mut doc = load(&fixture_pdf(&["body"]));
        apply_page_numbers(&mut doc, PageNumberPosition::BottomRight).unwrap();

        let text = page_content_text(&doc, 1);
        // State save brackets the original content; the restore lands before
        // the stamp so a dangling q inside the page cannot skew it.
        assert!(text.trim_start().starts_with('q'));
        let stamp = text.find("Page 1 of 1").unwrap();
        assert!(text[..stamp].contains('Q'));
    }

    #[test]
    fn media_box_falls_back_to_letter() {
        let (mut doc, pages_id) = crate::pdf::reader::new_document_skeleton();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        assert_eq!(page_media_box(&doc, page_id), DEFAULT_PAGE_SIZE);
    }
}
