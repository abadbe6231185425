//! Caller-side admission checks run before a recording reaches the pipeline.

use std::path::Path;

use thiserror::Error;

/// Container extensions accepted from capture clients and uploads.
pub const ALLOWED_EXTENSIONS: [&str; 6] = ["wav", "mp3", "ogg", "m4a", "webm", "flac"];

/// Upload size ceiling: 50 MB.
pub const MAX_INPUT_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("input has no file extension")]
    MissingExtension,

    #[error("unsupported audio format: .{0}")]
    UnsupportedExtension(String),

    #[error("input is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("cannot inspect input: {0}")]
    Io(#[from] std::io::Error),
}

pub fn is_allowed_extension(extension: &str) -> bool {
    let lowered = extension.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&lowered.as_str())
}

pub fn check_upload(extension: Option<&str>, size: u64) -> Result<(), IntakeError> {
    let extension = extension.ok_or(IntakeError::MissingExtension)?;
    if !is_allowed_extension(extension) {
        return Err(IntakeError::UnsupportedExtension(extension.to_string()));
    }
    if size > MAX_INPUT_BYTES {
        return Err(IntakeError::TooLarge {
            size,
            limit: MAX_INPUT_BYTES,
        });
    }
    Ok(())
}

pub fn check_file(path: &Path) -> Result<(), IntakeError> {
    let size = std::fs::metadata(path)?.len();
    check_upload(path.extension().and_then(|ext| ext.to_str()), size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_allow_listed_formats_case_insensitively() {
        assert!(check_upload(Some("WAV"), 1_024).is_ok());
        assert!(check_upload(Some("webm"), 1_024).is_ok());
    }

    #[test]
    fn rejects_unknown_extension() {
        let err = check_upload(Some("aiff"), 10).unwrap_err();
        assert!(matches!(err, IntakeError::UnsupportedExtension(ext) if ext == "aiff"));
    }

    #[test]
    fn rejects_missing_extension() {
        assert!(matches!(
            check_upload(None, 10),
            Err(IntakeError::MissingExtension)
        ));
    }

    #[test]
    fn enforces_size_cap() {
        assert!(check_upload(Some("mp3"), MAX_INPUT_BYTES).is_ok());
        assert!(matches!(
            check_upload(Some("mp3"), MAX_INPUT_BYTES + 1),
            Err(IntakeError::TooLarge { .. })
        ));
    }

    #[test]
    fn missing_file_reports_io() {
        let err = check_file(Path::new("/no/such/recording.wav")).unwrap_err();
        assert!(matches!(err, IntakeError::Io(_)));
    }
}
