// SPDX-License-Identifier: MIT

pub mod extract;
pub mod overlay;
pub mod reader;
pub mod security;
pub mod writer;

pub use reader::PdfFile;
