//! Pre-flight checks run before any decoding is attempted.

use super::error::ValidationError;
use super::CompressionInput;

/// Check the size ceiling and the declared content type.
pub fn validate_file(input: &CompressionInput, max_bytes: usize) -> Result<(), ValidationError> {
    let size = input.len();
    if size == 0 {
        return Err(ValidationError::Empty);
    }

    if size > max_bytes {
        return Err(ValidationError::TooLarge {
            size,
            max: max_bytes,
        });
    }

    if !is_image_type(&input.content_type) {
        return Err(ValidationError::NotAnImage {
            content_type: input.content_type.clone(),
        });
    }

    Ok(())
}

/// Lower-cased MIME essence, without parameters.
pub(crate) fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Whether a declared content type is an image type.
pub fn is_image_type(content_type: &str) -> bool {
    let essence = mime_essence(content_type);
    essence
        .strip_prefix("image/")
        .is_some_and(|subtype| !subtype.is_empty())
}
