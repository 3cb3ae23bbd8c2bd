// SPDX-License-Identifier: MIT
//
// Image processor — the pixel-level steps the document operations need:
// alpha flattening before PDF embedding, grayscale conversion, desaturation
// of rendered pages, and JPEG/PNG encoding. Operates on in-memory images
// using the `image` crate.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use folio_core::error::{FolioError, Result};
use folio_core::ImageOutputFormat;
use tracing::{debug, info, instrument};

/// Image processing pipeline operating on a single in-memory image.
///
/// Each method consumes `self` and returns a new processor wrapping the
/// transformed image, enabling method chaining:
///
/// ```ignore
/// let bytes = ImageProcessor::open("scan.png")?
///     .flatten_alpha()
///     .grayscale()
///     .to_jpeg_bytes(95)?;
/// ```
pub struct ImageProcessor {
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Load an image from a file path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let img = image::open(path.as_ref()).map_err(|err| {
            FolioError::Image(format!(
                "failed to open {}: {}",
                path.as_ref().display(),
                err
            ))
        })?;
        debug!(width = img.width(), height = img.height(), "image loaded");
        Ok(Self { image: img })
    }

    /// Create a processor from raw encoded bytes (JPEG, PNG, etc.).
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(data)
            .map_err(|err| FolioError::Image(format!("failed to decode image: {}", err)))?;
        Ok(Self { image: img })
    }

    /// Wrap an already-decoded `DynamicImage`.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    /// True when the image carries an alpha channel.
    pub fn has_alpha(&self) -> bool {
        self.image.color().has_alpha()
    }

    // -- Transformations (consume self, return new Self) -----------------------

    /// Composite the image over a white background, discarding the alpha
    /// channel. Images without alpha pass through unchanged.
    #[instrument(skip(self))]
    pub fn flatten_alpha(self) -> Self {
        if !self.has_alpha() {
            return Self {
                image: DynamicImage::ImageRgb8(self.image.to_rgb8()),
            };
        }

        let rgba = self.image.to_rgba8();
        let flattened: RgbImage = RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
            let image::Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
            let alpha = a as u32;
            let blend = |channel: u8| -> u8 {
                ((channel as u32 * alpha + 255 * (255 - alpha)) / 255) as u8
            };
            Rgb([blend(r), blend(g), blend(b)])
        });

        info!("alpha channel composited over white");
        Self {
            image: DynamicImage::ImageRgb8(flattened),
        }
    }

    /// Convert the image to grayscale (luma).
    pub fn grayscale(self) -> Self {
        Self {
            image: self.image.grayscale(),
        }
    }

    /// Resize to fit within the given bounds, preserving aspect ratio.
    pub fn thumbnail(self, max_width: u32, max_height: u32) -> Self {
        Self {
            image: self
                .image
                .resize(max_width, max_height, image::imageops::FilterType::Lanczos3),
        }
    }

    // -- Output ---------------------------------------------------------------

    /// Encode the current image as PNG bytes.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        self.image
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|err| FolioError::Image(format!("PNG encoding failed: {}", err)))?;
        Ok(buffer)
    }

    /// Encode the current image as JPEG bytes with the given quality (1-100).
    /// Any alpha channel is dropped first; JPEG has no transparency.
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let rgb = self.image.to_rgb8();
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
        rgb.write_with_encoder(encoder)
            .map_err(|err| FolioError::Image(format!("JPEG encoding failed: {}", err)))?;
        Ok(buffer)
    }

    /// Write the image to `path` in the given output format, regardless of
    /// the path's extension.
    pub fn save_as(&self, path: impl AsRef<std::path::Path>, format: ImageOutputFormat) -> Result<()> {
        let bytes = match format {
            ImageOutputFormat::Jpeg => self.to_jpeg_bytes(95)?,
            ImageOutputFormat::Png => self.to_png_bytes()?,
        };
        std::fs::write(path.as_ref(), bytes)?;
        Ok(())
    }

    /// Write the image to a file, format inferred from the extension.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        self.image.save(path.as_ref()).map_err(|err| {
            FolioError::Image(format!(
                "failed to save image to {}: {}",
                path.as_ref().display(),
                err
            ))
        })
    }
}
