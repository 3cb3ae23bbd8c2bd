// SPDX-License-Identifier: MIT
//
// Criterion benchmarks for the folio-document crate: the corner-detection
// and warp halves of the rectification pipeline on synthetic camera images.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, GrayImage, Luma};

use folio_document::CornerSet;
use folio_document::scan::rectify;

/// A synthetic "photographed document": bright sheet on a dark background.
fn synthetic_photo(width: u32, height: u32) -> DynamicImage {
    let mut img = GrayImage::from_pixel(width, height, Luma([25u8]));
    let (x0, y0) = (width / 6, height / 6);
    let (x1, y1) = (width - x0, height - y0);
    for y in y0..y1 {
        for x in x0..x1 {
            img.put_pixel(x, y, Luma([230u8]));
        }
    }
    DynamicImage::ImageLuma8(img)
}

/// Benchmark quadrilateral detection. The image is downscaled to the
/// 800-pixel working height internally, so the cost is dominated by edge
/// detection and contour tracing at that size.
fn bench_auto_detect(c: &mut Criterion) {
    let photo = synthetic_photo(1200, 1600);

    c.bench_function("auto_detect (1200x1600)", |b| {
        b.iter(|| {
            let corners = rectify::auto_detect(black_box(&photo));
            black_box(corners);
        });
    });
}

/// Benchmark the projective warp with fixed corners, isolating it from
/// detection.
fn bench_warp(c: &mut Criterion) {
    let photo = synthetic_photo(1200, 1600);
    let corners = CornerSet::new([
        (210.0, 260.0),
        (990.0, 275.0),
        (1005.0, 1330.0),
        (195.0, 1345.0),
    ]);

    c.bench_function("warp (1200x1600)", |b| {
        b.iter(|| {
            let warped = rectify::warp(black_box(&photo), &corners).expect("warp");
            black_box(warped);
        });
    });
}

criterion_group!(benches, bench_auto_detect, bench_warp);
criterion_main!(benches);
