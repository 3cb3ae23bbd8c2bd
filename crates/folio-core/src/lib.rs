// SPDX-License-Identifier: MIT
//
// folio-core — shared types and error definitions for the Folio engine.

pub mod error;
pub mod types;

pub use error::{FolioError, Result};
pub use types::*;
