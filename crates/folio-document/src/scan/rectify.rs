// SPDX-License-Identifier: MIT
//
// Perspective rectification for photographed documents: detect the document
// quadrilateral in a camera image, then warp it to a flat rectangle.

use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::contours::{BorderType, Contour, find_contours};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::morphology::close;
use imageproc::point::Point;
use folio_core::error::{FolioError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Detection runs on a copy downscaled to this height; found corners are
/// scaled back to the original resolution.
const WORKING_HEIGHT: f32 = 800.0;

/// Douglas-Peucker tolerance, as a fraction of the contour perimeter.
const APPROX_EPSILON_RATIO: f64 = 0.02;

/// How many of the largest outer contours are tried for a 4-vertex fit.
const CANDIDATE_CONTOURS: usize = 5;

/// Four document corners in source-image pixel coordinates, in no particular
/// order. Ordering happens at warp time, so callers can pass corners however
/// they collected them (detection output, user drag handles).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CornerSet {
    pub points: [(f32, f32); 4],
}

impl CornerSet {
    pub fn new(points: [(f32, f32); 4]) -> Self {
        Self { points }
    }

    /// Corners covering the whole image, the fallback when detection finds
    /// nothing.
    pub fn full_image(width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            points: [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)],
        }
    }

    /// Order the corners as `[top-left, top-right, bottom-right, bottom-left]`.
    ///
    /// Top-left minimises x + y and bottom-right maximises it; top-right
    /// maximises x - y and bottom-left minimises it. Invariant under any
    /// input permutation of the same four points.
    pub fn ordered(&self) -> [(f32, f32); 4] {
        let by_sum = |p: &&(f32, f32)| p.0 + p.1;
        let by_diff = |p: &&(f32, f32)| p.0 - p.1;

        let points = &self.points;
        let top_left = *points
            .iter()
            .min_by(|a, b| by_sum(a).total_cmp(&by_sum(b)))
            .unwrap_or(&points[0]);
        let bottom_right = *points
            .iter()
            .max_by(|a, b| by_sum(a).total_cmp(&by_sum(b)))
            .unwrap_or(&points[2]);
        let top_right = *points
            .iter()
            .max_by(|a, b| by_diff(a).total_cmp(&by_diff(b)))
            .unwrap_or(&points[1]);
        let bottom_left = *points
            .iter()
            .min_by(|a, b| by_diff(a).total_cmp(&by_diff(b)))
            .unwrap_or(&points[3]);

        [top_left, top_right, bottom_right, bottom_left]
    }
}

// -- Detection ----------------------------------------------------------------

/// Locate the document quadrilateral in a camera image.
///
/// ## Pipeline
///
/// 1. Downscale to a working height of 800 px
/// 2. Grayscale, Gaussian blur (sigma 2.0), Canny edge detection
/// 3. Morphological close to bridge broken edges
/// 4. Outer contours, largest first; the first one whose Douglas-Peucker
///    approximation has exactly four vertices wins
/// 5. Scale the four vertices back to original image coordinates
///
/// Returns `None` when no contour approximates to a quadrilateral.
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn auto_detect(image: &DynamicImage) -> Option<CornerSet> {
    let (orig_w, orig_h) = (image.width(), image.height());
    if orig_w == 0 || orig_h == 0 {
        return None;
    }

    let scale = orig_h as f32 / WORKING_HEIGHT;
    let work_w = ((orig_w as f32 / scale).round() as u32).max(1);
    let work_h = WORKING_HEIGHT as u32;
    let working = image.resize_exact(work_w, work_h, image::imageops::FilterType::Triangle);

    let gray = working.to_luma8();
    let blurred = gaussian_blur_f32(&gray, 2.0);
    let edges = canny(&blurred, 50.0, 150.0);
    let closed = close(&edges, Norm::LInf, 2);

    let mut contours: Vec<Contour<i32>> = find_contours(&closed)
        .into_iter()
        .filter(|c: &Contour<i32>| c.border_type == BorderType::Outer)
        .collect();
    contours.sort_by(|a, b| {
        shoelace_area(&b.points)
            .partial_cmp(&shoelace_area(&a.points))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for contour in contours.iter().take(CANDIDATE_CONTOURS) {
        let perimeter = arc_length(&contour.points, true);
        let approx = approximate_polygon_dp(
            &contour.points,
            APPROX_EPSILON_RATIO * perimeter,
            true,
        );

        if approx.len() == 4 {
            let points = [
                scale_point(&approx[0], scale),
                scale_point(&approx[1], scale),
                scale_point(&approx[2], scale),
                scale_point(&approx[3], scale),
            ];
            info!(?points, "document quadrilateral detected");
            return Some(CornerSet::new(points));
        }
        debug!(
            vertices = approx.len(),
            area = shoelace_area(&contour.points),
            "candidate contour did not approximate to a quadrilateral"
        );
    }

    debug!("no document quadrilateral found");
    None
}

fn scale_point(point: &Point<i32>, scale: f32) -> (f32, f32) {
    (point.x as f32 * scale, point.y as f32 * scale)
}

/// Polygon area via the shoelace formula, used to rank contour candidates.
fn shoelace_area(points: &[Point<i32>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0f64;
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].x as f64 * points[j].y as f64;
        area -= points[j].x as f64 * points[i].y as f64;
    }
    area.abs() / 2.0
}

// -- Warp ---------------------------------------------------------------------

/// Warp the quadrilateral described by `corners` to an axis-aligned
/// rectangle.
///
/// The output width is the longer of the quad's top and bottom edges, the
/// height the longer of its left and right edges (both truncated to whole
/// pixels), so the warped document keeps roughly its photographed scale.
#[instrument(skip(image, corners))]
pub fn warp(image: &DynamicImage, corners: &CornerSet) -> Result<DynamicImage> {
    let [tl, tr, br, bl] = corners.ordered();

    let width = distance(tl, tr).max(distance(bl, br));
    let height = distance(tl, bl).max(distance(tr, br));
    let out_w = width as u32;
    let out_h = height as u32;
    if out_w == 0 || out_h == 0 {
        return Err(FolioError::Image(
            "corner quadrilateral is degenerate".to_string(),
        ));
    }

    let src = [tl, tr, br, bl];
    let dest: [(f32, f32); 4] = [
        (0.0, 0.0),
        (out_w as f32, 0.0),
        (out_w as f32, out_h as f32),
        (0.0, out_h as f32),
    ];

    let projection = Projection::from_control_points(src, dest).ok_or_else(|| {
        FolioError::Image("could not compute projective transform from corners".to_string())
    })?;

    let rgba = image.to_rgba8();
    let default_pixel = Rgba([255u8, 255, 255, 255]);
    let mut output = RgbaImage::new(out_w, out_h);
    warp_into(
        &rgba,
        &projection,
        Interpolation::Bilinear,
        default_pixel,
        &mut output,
    );

    info!(out_w, out_h, "perspective warp applied");
    Ok(DynamicImage::ImageRgba8(output))
}

/// Rectify with explicit corners when given, otherwise auto-detect. When
/// detection finds nothing the image is returned unchanged.
pub fn rectify(image: &DynamicImage, corners: Option<&CornerSet>) -> Result<DynamicImage> {
    match corners {
        Some(set) => warp(image, set),
        None => match auto_detect(image) {
            Some(detected) => warp(image, &detected),
            None => {
                debug!("no corners supplied or detected; returning image unchanged");
                Ok(image.clone())
            }
        },
    }
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn ordering_is_permutation_invariant() {
        let corners = [(10.0, 12.0), (390.0, 20.0), (402.0, 488.0), (8.0, 480.0)];
        let expected = CornerSet::new(corners).ordered();

        let permutations = [
            [corners[1], corners[0], corners[3], corners[2]],
            [corners[3], corners[2], corners[1], corners[0]],
            [corners[2], corners[3], corners[0], corners[1]],
        ];
        for permuted in permutations {
            assert_eq!(CornerSet::new(permuted).ordered(), expected);
        }
    }

    #[test]
    fn ordered_labels_match_geometry() {
        let set = CornerSet::new([(300.0, 10.0), (20.0, 400.0), (10.0, 15.0), (310.0, 390.0)]);
        let [tl, tr, br, bl] = set.ordered();
        assert_eq!(tl, (10.0, 15.0));
        assert_eq!(tr, (300.0, 10.0));
        assert_eq!(br, (310.0, 390.0));
        assert_eq!(bl, (20.0, 400.0));
    }

    #[test]
    fn auto_detect_on_uniform_image_finds_nothing() {
        let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(300, 400, Luma([180u8])));
        assert!(auto_detect(&blank).is_none());
    }

    #[test]
    fn auto_detect_finds_a_bright_sheet_on_dark_background() {
        let (w, h) = (600u32, 800u32);
        let mut img = GrayImage::from_pixel(w, h, Luma([20u8]));
        // White "sheet of paper" from (100,120) to (500,680).
        for y in 120..680 {
            for x in 100..500 {
                img.put_pixel(x, y, Luma([235u8]));
            }
        }

        let detected = auto_detect(&DynamicImage::ImageLuma8(img))
            .expect("rectangle should be detected");
        let [tl, tr, br, bl] = detected.ordered();

        let tolerance = 15.0;
        assert!(distance(tl, (100.0, 120.0)) < tolerance, "tl = {:?}", tl);
        assert!(distance(tr, (500.0, 120.0)) < tolerance, "tr = {:?}", tr);
        assert!(distance(br, (500.0, 680.0)) < tolerance, "br = {:?}", br);
        assert!(distance(bl, (100.0, 680.0)) < tolerance, "bl = {:?}", bl);
    }

    #[test]
    fn warp_with_full_image_corners_preserves_dimensions() {
        let mut img = RgbImage::from_pixel(120, 90, Rgb([40, 90, 200]));
        img.put_pixel(5, 5, Rgb([250, 10, 10]));
        let source = DynamicImage::ImageRgb8(img);

        let warped = warp(&source, &CornerSet::full_image(120, 90)).unwrap();
        assert_eq!((warped.width(), warped.height()), (120, 90));
    }

    #[test]
    fn warp_output_takes_the_longer_opposing_edges() {
        // Trapezoid: top edge 200 px, bottom edge 300 px, sides 400 px tall.
        let corners = CornerSet::new([
            (50.0, 0.0),
            (250.0, 0.0),
            (300.0, 400.0),
            (0.0, 400.0),
        ]);
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(320, 420, Rgb([128, 128, 128])));

        let warped = warp(&source, &corners).unwrap();
        assert_eq!(warped.width(), 300);
        // Side edges are slightly longer than 400 because they slant.
        assert!(warped.height() >= 400);
    }

    #[test]
    fn warp_rejects_degenerate_corners() {
        let corners = CornerSet::new([(5.0, 5.0); 4]);
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 50, Rgb([0, 0, 0])));
        assert!(warp(&source, &corners).is_err());
    }

    #[test]
    fn rectify_without_corners_falls_back_to_the_original() {
        let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 48, Luma([128u8])));
        let result = rectify(&blank, None).unwrap();
        assert_eq!((result.width(), result.height()), (64, 48));
    }
}
