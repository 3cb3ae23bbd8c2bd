// SPDX-License-Identifier: MIT
//
// Embedded image extraction. Walks every stream object in the document,
// picks out /Subtype /Image XObjects, and decodes them to files. JPEG
// streams (DCTDecode) are written verbatim; flate-compressed raw pixel
// streams are re-encoded as PNG when the colour space is one we understand.

use std::path::{Path, PathBuf};

use folio_core::error::{FolioError, Result};
use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Document, Object, Stream};
use tracing::{debug, instrument, warn};

/// One image pulled out of a document, ready to be written.
enum ExtractedImage {
    /// A DCTDecode stream: already a complete JPEG file.
    Jpeg(Vec<u8>),
    /// Decoded raw pixels, to be encoded as PNG.
    Decoded(DynamicImage),
}

impl ExtractedImage {
    fn extension(&self) -> &'static str {
        match self {
            ExtractedImage::Jpeg(_) => "jpg",
            ExtractedImage::Decoded(_) => "png",
        }
    }

    fn write_to(&self, path: &Path) -> Result<()> {
        match self {
            ExtractedImage::Jpeg(bytes) => {
                std::fs::write(path, bytes)?;
                Ok(())
            }
            ExtractedImage::Decoded(image) => image
                .save(path)
                .map_err(|err| FolioError::Image(format!("failed to save {}: {}", path.display(), err))),
        }
    }
}

/// Extract all recognisable embedded images into `output_dir`, named
/// `{base_name}_image_{k}.{jpg|png}` with k counting from 1 in object order.
/// Returns the written paths; unsupported encodings are skipped with a
/// warning rather than failing the whole operation.
#[instrument(skip(doc), fields(base_name))]
pub fn extract_images(
    doc: &Document,
    output_dir: &Path,
    base_name: &str,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)?;

    let mut written = Vec::new();
    let mut counter = 0usize;

    for (object_id, object) in &doc.objects {
        let Object::Stream(stream) = object else {
            continue;
        };
        if !is_image_stream(stream) {
            continue;
        }

        match decode_image_stream(stream) {
            Ok(image) => {
                counter += 1;
                let path = output_dir.join(format!(
                    "{}_image_{}.{}",
                    base_name,
                    counter,
                    image.extension()
                ));
                image.write_to(&path)?;
                written.push(path);
            }
            Err(err) => {
                warn!(?object_id, %err, "skipping undecodable image stream");
            }
        }
    }

    debug!(count = written.len(), "image extraction complete");
    Ok(written)
}

fn is_image_stream(stream: &Stream) -> bool {
    matches!(
        stream.dict.get(b"Subtype"),
        Ok(Object::Name(name)) if name == b"Image"
    )
}

/// Filter entry may be a single name or an array of names.
fn stream_filters(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Object::Name(name) => Some(name.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn dimension(stream: &Stream, key: &[u8]) -> Result<u32> {
    stream
        .dict
        .get(key)
        .ok()
        .and_then(|obj| obj.as_i64().ok())
        .and_then(|value| u32::try_from(value).ok())
        .ok_or_else(|| {
            FolioError::Image(format!(
                "image stream missing /{}",
                String::from_utf8_lossy(key)
            ))
        })
}

fn decode_image_stream(stream: &Stream) -> Result<ExtractedImage> {
    let filters = stream_filters(stream);

    if filters.iter().any(|f| f == b"DCTDecode") {
        return Ok(ExtractedImage::Jpeg(stream.content.clone()));
    }

    let width = dimension(stream, b"Width")?;
    let height = dimension(stream, b"Height")?;

    let bits = stream
        .dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|obj| obj.as_i64().ok())
        .unwrap_or(8);
    if bits != 8 {
        return Err(FolioError::Image(format!(
            "unsupported bit depth {}",
            bits
        )));
    }

    // An unfiltered stream is already raw pixel data.
    let data = if filters.is_empty() {
        stream.content.clone()
    } else {
        stream
            .decompressed_content()
            .map_err(|err| FolioError::Image(format!("cannot decompress image stream: {}", err)))?
    };

    let color_space = match stream.dict.get(b"ColorSpace") {
        Ok(Object::Name(name)) => name.clone(),
        _ => return Err(FolioError::Image("unsupported colour space".to_string())),
    };

    match color_space.as_slice() {
        b"DeviceRGB" => {
            let image = RgbImage::from_raw(width, height, data)
                .ok_or_else(|| FolioError::Image("RGB pixel data has wrong length".to_string()))?;
            Ok(ExtractedImage::Decoded(DynamicImage::ImageRgb8(image)))
        }
        b"DeviceGray" => {
            let image = GrayImage::from_raw(width, height, data)
                .ok_or_else(|| FolioError::Image("gray pixel data has wrong length".to_string()))?;
            Ok(ExtractedImage::Decoded(DynamicImage::ImageLuma8(image)))
        }
        other => Err(FolioError::Image(format!(
            "unsupported colour space /{}",
            String::from_utf8_lossy(other)
        ))),
    }
}
