// SPDX-License-Identifier: MIT

#[cfg(feature = "ocr")]
pub mod ocr;
pub mod rectify;

pub use rectify::CornerSet;
