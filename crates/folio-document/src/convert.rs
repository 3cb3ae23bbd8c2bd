// SPDX-License-Identifier: MIT
//
// Office format conversions delegated to a local LibreOffice install.
// LibreOffice writes its output into a directory with a name derived from
// the input, so each conversion runs against a private temp directory and
// the produced file is moved to the caller's requested path.

use std::path::{Path, PathBuf};
use std::process::Command;

use folio_core::error::{FolioError, Result};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

/// Drives `soffice --headless --convert-to` for the document conversions
/// that need a real office suite.
pub struct OfficeConverter {
    binary: &'static str,
}

impl OfficeConverter {
    /// Locate a usable LibreOffice binary. Checks each candidate with
    /// `--version`; the first one that runs wins.
    #[instrument]
    pub fn discover() -> Result<Self> {
        for candidate in Self::candidates() {
            match Command::new(candidate).arg("--version").output() {
                Ok(output) if output.status.success() => {
                    debug!(binary = candidate, "office converter found");
                    return Ok(Self { binary: candidate });
                }
                Ok(output) => {
                    warn!(
                        binary = candidate,
                        status = ?output.status,
                        "candidate present but --version failed"
                    );
                }
                Err(_) => {}
            }
        }
        Err(FolioError::ConverterNotFound(
            "LibreOffice is not installed or not on PATH".to_string(),
        ))
    }

    fn candidates() -> &'static [&'static str] {
        if cfg!(windows) {
            &["soffice", "libreoffice"]
        } else {
            &["libreoffice", "soffice"]
        }
    }

    /// Run one conversion. `target` is the LibreOffice convert-to argument
    /// (an extension, optionally with an import filter appended by the
    /// caller); `extension` is the extension of the produced file.
    #[instrument(skip(self), fields(input = %input.display(), target))]
    fn convert(
        &self,
        input: &Path,
        output: &Path,
        target: &str,
        extension: &str,
        infilter: Option<&str>,
    ) -> Result<()> {
        if !input.exists() {
            return Err(FolioError::Conversion(format!(
                "input file does not exist: {}",
                input.display()
            )));
        }

        let workdir = TempDir::new()?;

        let mut command = Command::new(self.binary);
        command.arg("--headless");
        if let Some(filter) = infilter {
            command.arg(format!("--infilter={}", filter));
        }
        command
            .arg("--convert-to")
            .arg(target)
            .arg("--outdir")
            .arg(workdir.path())
            .arg(input);

        let result = command.output().map_err(|err| {
            FolioError::ConverterNotFound(format!(
                "failed to launch {}: {}",
                self.binary, err
            ))
        })?;

        if !result.status.success() {
            return Err(FolioError::Conversion(format!(
                "{} exited with {}: {}",
                self.binary,
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }

        let produced = self.expect_produced_file(workdir.path(), input, extension)?;
        move_file(&produced, output)?;

        info!(output = %output.display(), "conversion complete");
        Ok(())
    }

    /// LibreOffice names the output `{input stem}.{extension}` inside the
    /// outdir. A zero-exit run that produced nothing (it happens with
    /// unsupported inputs) is still a conversion failure.
    fn expect_produced_file(
        &self,
        outdir: &Path,
        input: &Path,
        extension: &str,
    ) -> Result<PathBuf> {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let expected = outdir.join(format!("{}.{}", stem, extension));
        if expected.exists() {
            return Ok(expected);
        }

        // Fall back to any file with the right extension.
        for entry in std::fs::read_dir(outdir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e.eq_ignore_ascii_case(extension)) {
                return Ok(path);
            }
        }

        Err(FolioError::Conversion(format!(
            "{} reported success but produced no .{} file",
            self.binary, extension
        )))
    }

    pub fn pdf_to_word(&self, input: &Path, output: &Path) -> Result<()> {
        self.convert(input, output, "docx", "docx", Some("writer_pdf_import"))
    }

    pub fn word_to_pdf(&self, input: &Path, output: &Path) -> Result<()> {
        self.convert(input, output, "pdf", "pdf", None)
    }

    pub fn pptx_to_pdf(&self, input: &Path, output: &Path) -> Result<()> {
        self.convert(input, output, "pdf", "pdf", None)
    }

    pub fn pdf_to_pptx(&self, input: &Path, output: &Path) -> Result<()> {
        self.convert(input, output, "pptx", "pptx", Some("impress_pdf_import"))
    }
}

/// Rename with a copy fallback for cross-device moves.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if std::fs::rename(from, to).is_err() {
        std::fs::copy(from, to)?;
        let _ = std::fs::remove_file(from);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn candidate_order_prefers_platform_default() {
        let candidates = OfficeConverter::candidates();
        assert_eq!(candidates.len(), 2);
        if cfg!(windows) {
            assert_eq!(candidates[0], "soffice");
        } else {
            assert_eq!(candidates[0], "libreoffice");
        }
    }

    #[test]
    fn missing_input_is_a_conversion_error() {
        let converter = OfficeConverter { binary: "libreoffice" };
        let dir = tempdir().unwrap();
        let err = converter
            .word_to_pdf(&dir.path().join("nope.docx"), &dir.path().join("out.pdf"))
            .unwrap_err();
        assert!(matches!(err, FolioError::Conversion(_)));
    }

    #[test]
    fn move_file_copies_across_directories() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.bin");
        let dst = dir.path().join("nested").join("b.bin");
        std::fs::write(&src, b"payload").unwrap();

        move_file(&src, &dst).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"payload");
        assert!(!src.exists());
    }
}
