//! Error types for the photo pipeline.

use thiserror::Error;

/// Pre-flight rejections.
///
/// The `Display` text is shown to the uploader next to the file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File is empty")]
    Empty,

    #[error("File is too large ({:.1} MB). Maximum size is {:.0} MB.", mib(.size), mib(.max))]
    TooLarge { size: usize, max: usize },

    #[error("Only image files can be uploaded (got {content_type})")]
    NotAnImage { content_type: String },
}

fn mib(bytes: &usize) -> f64 {
    *bytes as f64 / (1024.0 * 1024.0)
}

/// Errors raised while compressing a single photo.
///
/// None of these are fatal to a batch; the caller reports the file and moves on.
#[derive(Error, Debug)]
pub enum CompressionError {
    /// Input rejected before decoding
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Corrupt or unsupported image data
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// The encoder could not produce output
    #[error("Failed to encode image: {0}")]
    Encode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_large_message() {
        let err = ValidationError::TooLarge {
            size: 12 * 1024 * 1024 + 300 * 1024,
            max: 10 * 1024 * 1024,
        };
        assert_eq!(
            err.to_string(),
            "File is too large (12.3 MB). Maximum size is 10 MB."
        );
    }

    #[test]
    fn test_validation_error_is_transparent() {
        let err: CompressionError = ValidationError::Empty.into();
        assert_eq!(err.to_string(), "File is empty");
    }
}
