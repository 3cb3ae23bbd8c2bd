// SPDX-License-Identifier: MIT

pub mod processor;

pub use processor::ImageProcessor;
