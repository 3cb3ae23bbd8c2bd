// SPDX-License-Identifier: MIT
//
// Encryption, decryption, and structural compression via the vendored qpdf
// FFI. qpdf works on whole files in memory, so everything here is
// bytes-in/bytes-out; callers handle file IO.

use folio_core::error::{FolioError, Result};
use folio_core::{CompressionLevel, EncryptionAlgorithm};
use qpdf::{
    EncryptionParams, EncryptionParamsR4, EncryptionParamsR6, ObjectStreamMode, PrintPermission,
    QPdf,
};
use tracing::{debug, info, instrument};

fn map_qpdf_error(err: qpdf::QPdfError) -> FolioError {
    match err.error_code() {
        qpdf::QPdfErrorCode::InvalidPassword => FolioError::IncorrectPassword,
        _ => FolioError::Encryption(err.to_string()),
    }
}

fn open(data: &[u8], password: Option<&str>) -> Result<QPdf> {
    match password {
        Some(pwd) => QPdf::read_from_memory_encrypted(data, pwd).map_err(map_qpdf_error),
        None => QPdf::read_from_memory(data).map_err(map_qpdf_error),
    }
}

/// Encrypt a PDF so the password is required to open it.
///
/// The owner password is set to the same value and all usage permissions are
/// left enabled; the protection is open-password only.
#[instrument(skip_all, fields(algorithm = algorithm.label(), bytes = data.len()))]
pub fn protect(data: &[u8], password: &str, algorithm: EncryptionAlgorithm) -> Result<Vec<u8>> {
    if password.is_empty() {
        return Err(FolioError::Encryption(
            "password must not be empty".to_string(),
        ));
    }

    let qpdf = open(data, None)?;

    let params = match algorithm {
        EncryptionAlgorithm::Aes256 => EncryptionParams::R6(EncryptionParamsR6 {
            user_password: password.to_string(),
            owner_password: password.to_string(),
            allow_accessibility: true,
            allow_extract: true,
            allow_assemble: true,
            allow_annotate_and_form: true,
            allow_form_filling: true,
            allow_modify_other: true,
            allow_print: PrintPermission::Full,
            encrypt_metadata: true,
        }),
        EncryptionAlgorithm::Aes128 | EncryptionAlgorithm::Rc4_128 => {
            EncryptionParams::R4(EncryptionParamsR4 {
                user_password: password.to_string(),
                owner_password: password.to_string(),
                allow_accessibility: true,
                allow_extract: true,
                allow_assemble: true,
                allow_annotate_and_form: true,
                allow_form_filling: true,
                allow_modify_other: true,
                allow_print: PrintPermission::Full,
                encrypt_metadata: true,
                use_aes: matches!(algorithm, EncryptionAlgorithm::Aes128),
            })
        }
    };

    let mut writer = qpdf.writer();
    writer.preserve_encryption(false).encryption_params(params);
    let output = writer.write_to_memory().map_err(map_qpdf_error)?;

    info!(algorithm = algorithm.label(), "document encrypted");
    Ok(output)
}

/// Remove password protection. A wrong password surfaces as
/// [`FolioError::IncorrectPassword`], whose display text is stable.
#[instrument(skip_all, fields(bytes = data.len()))]
pub fn unlock(data: &[u8], password: &str) -> Result<Vec<u8>> {
    let qpdf = QPdf::read_from_memory_encrypted(data, password).map_err(map_qpdf_error)?;

    let mut writer = qpdf.writer();
    writer.preserve_encryption(false);
    let output = writer.write_to_memory().map_err(map_qpdf_error)?;

    info!("encryption removed");
    Ok(output)
}

/// Structural compression pass, used for the Low and Medium levels.
/// (Extreme re-rasterises pages and is handled a layer up.)
#[instrument(skip_all, fields(level = ?level, bytes = data.len()))]
pub fn compress(data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
    let qpdf = open(data, None)?;

    let os_mode = match level {
        CompressionLevel::Low => ObjectStreamMode::Preserve,
        CompressionLevel::Medium | CompressionLevel::Extreme => ObjectStreamMode::Generate,
    };

    let mut writer = qpdf.writer();
    writer
        .object_stream_mode(os_mode)
        .compress_streams(true)
        .normalize_content(true)
        .preserve_unreferenced_objects(false)
        .preserve_encryption(false);
    let output = writer.write_to_memory().map_err(map_qpdf_error)?;

    debug!(
        before = data.len(),
        after = output.len(),
        "structural compression complete"
    );
    Ok(output)
}

/// Page count as qpdf sees it, used to sanity-check round trips.
pub fn page_count(data: &[u8], password: Option<&str>) -> Result<u32> {
    let qpdf = open(data, password)?;
    qpdf.get_num_pages().map_err(map_qpdf_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::test_support::fixture_pdf;

    #[test]
    fn protect_then_unlock_round_trips() {
        let original = fixture_pdf(&["secret"]);

        for algorithm in [
            EncryptionAlgorithm::Aes256,
            EncryptionAlgorithm::Aes128,
            EncryptionAlgorithm::Rc4_128,
        ] {
            let locked = protect(&original, "hunter2", algorithm).unwrap();
            let unlocked = unlock(&locked, "hunter2").unwrap();
            assert_eq!(page_count(&unlocked, None).unwrap(), 1);
        }
    }

    #[test]
    fn unlock_with_wrong_password_is_incorrect_password() {
        let locked = protect(&fixture_pdf(&["secret"]), "right", EncryptionAlgorithm::Aes256)
            .unwrap();

        let err = unlock(&locked, "wrong").unwrap_err();
        assert!(matches!(err, FolioError::IncorrectPassword));
        assert_eq!(err.to_string(), "Incorrect Password");
    }

    #[test]
    fn protect_rejects_empty_password() {
        let err = protect(&fixture_pdf(&["x"]), "", EncryptionAlgorithm::Aes256).unwrap_err();
        assert!(matches!(err, FolioError::Encryption(_)));
    }

    #[test]
    fn compress_preserves_page_count() {
        let original = fixture_pdf(&["one", "two", "three"]);

        for level in [CompressionLevel::Low, CompressionLevel::Medium] {
            let compressed = compress(&original, level).unwrap();
            assert_eq!(page_count(&compressed, None).unwrap(), 3);
        }
    }
}
