//! Photo compression: bounded main image plus thumbnail, ready for upload.

mod compressor;
mod error;
mod geometry;
mod naming;
mod raster;
mod validation;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use compressor::{has_transparency, BatchItem, ImageCompressor};
pub use error::{CompressionError, ValidationError};
pub use geometry::fit_within;
pub use naming::{claim_output_name, sanitize_file_name, THUMBNAIL_PREFIX};
pub use raster::{DynamicRaster, RasterSurface};
pub use validation::{is_image_type, validate_file};

/// Encoded format of a compressed photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

/// A user-supplied file awaiting compression.
#[derive(Debug, Clone)]
pub struct CompressionInput {
    /// Raw file bytes as uploaded
    pub data: Bytes,
    /// MIME type declared by the client
    pub content_type: String,
    /// Original file name
    pub file_name: String,
}

impl CompressionInput {
    pub fn new(
        data: impl Into<Bytes>,
        content_type: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.into(),
            file_name: file_name.into(),
        }
    }

    /// Original byte length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The result of compressing one photo.
///
/// Built once per call and handed to the caller, who uploads both blobs.
#[derive(Debug, Clone)]
pub struct CompressionOutput {
    /// Encoded main image
    pub data: Bytes,
    /// Encoded JPEG thumbnail
    pub thumbnail: Bytes,
    /// Format of the main image
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    pub original_size: usize,
    pub compressed_size: usize,
    pub thumbnail_size: usize,
    /// Sanitized name with the extension of `format`
    pub file_name: String,
    /// Encoder quality used for the main image (100 for lossless PNG)
    pub quality: u8,
}

impl CompressionOutput {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    /// Bytes saved relative to the upload, as a percentage.
    pub fn savings_percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        (self.original_size as f64 - self.compressed_size as f64) / self.original_size as f64
            * 100.0
    }
}
