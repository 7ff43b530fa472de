//! The photo compression pipeline.
//!
//! decode -> fit into the main box -> choose PNG or JPEG -> encode (with a
//! two-rung quality ladder for JPEG) -> thumbnail from the original bitmap.

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tracing::{debug, instrument, trace};

use crate::config::CompressionConfig;

use super::error::CompressionError;
use super::geometry::fit_within;
use super::naming::sanitize_file_name;
use super::raster::{DynamicRaster, RasterSurface};
use super::validation::{mime_essence, validate_file};
use super::{CompressionInput, CompressionOutput, OutputFormat};

/// Quality reported for lossless output.
const LOSSLESS_QUALITY: u8 = 100;

/// Look for any non-opaque pixel, checking every `stride`-th one.
///
/// Sparse sampling can miss small transparent regions; a stride of 1 checks
/// every pixel.
pub fn has_transparency<R: RasterSurface>(surface: &R, stride: usize, opaque_alpha: u8) -> bool {
    if !surface.has_alpha_channel() {
        return false;
    }

    let (width, height) = surface.dimensions();
    let total = u64::from(width) * u64::from(height);
    (0..total)
        .step_by(stride.max(1))
        .any(|index| surface.alpha_at(index) < opaque_alpha)
}

/// Only these source formats may keep transparency.
fn may_keep_transparency(content_type: &str) -> bool {
    matches!(mime_essence(content_type).as_str(), "image/png" | "image/gif")
}

/// Per-file outcome of a batch.
#[derive(Debug)]
pub struct BatchItem {
    /// Name of the file as uploaded
    pub file_name: String,
    pub result: Result<CompressionOutput, CompressionError>,
}

/// Stateless photo compressor.
///
/// Holds only its settings; every call works on its own bitmaps, so one
/// instance can serve concurrent requests.
#[derive(Debug, Clone, Default)]
pub struct ImageCompressor {
    settings: CompressionConfig,
}

impl ImageCompressor {
    pub fn new(settings: CompressionConfig) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CompressionConfig {
        &self.settings
    }

    /// Pre-flight check. Returns the user-facing reason when the file is
    /// rejected.
    pub fn validate(&self, input: &CompressionInput) -> Option<String> {
        validate_file(input, self.settings.max_input_bytes)
            .err()
            .map(|e| e.to_string())
    }

    /// Compress with the `image` crate backend.
    pub fn compress(&self, input: &CompressionInput) -> Result<CompressionOutput, CompressionError> {
        self.compress_with::<DynamicRaster>(input)
    }

    /// Compress on an arbitrary raster backend.
    #[instrument(
        skip_all,
        fields(file = %input.file_name, content_type = %input.content_type, size = input.len())
    )]
    pub fn compress_with<R: RasterSurface>(
        &self,
        input: &CompressionInput,
    ) -> Result<CompressionOutput, CompressionError> {
        let s = &self.settings;
        validate_file(input, s.max_input_bytes)?;

        let source = R::decode(&input.data)?;
        let (source_width, source_height) = source.dimensions();
        trace!(width = source_width, height = source_height, "Decoded source image");

        // Always re-render, even when the size is unchanged, so metadata is dropped.
        let (width, height) = fit_within(source_width, source_height, s.max_width, s.max_height);
        let surface = source.resized(width, height);

        let format = self.select_format(&input.content_type, &surface);
        let (data, quality) = match format {
            OutputFormat::Png => (surface.encode_png()?, LOSSLESS_QUALITY),
            OutputFormat::Jpeg => self.encode_within_budget(&surface)?,
        };
        drop(surface);

        let (thumbnail_width, thumbnail_height) = fit_within(
            source_width,
            source_height,
            s.thumbnail_width,
            s.thumbnail_height,
        );
        let thumbnail = source
            .resized(thumbnail_width, thumbnail_height)
            .encode_jpeg(s.thumbnail_quality)?;

        let output = CompressionOutput {
            format,
            width,
            height,
            thumbnail_width,
            thumbnail_height,
            original_size: input.len(),
            compressed_size: data.len(),
            thumbnail_size: thumbnail.len(),
            file_name: sanitize_file_name(&input.file_name, format),
            quality,
            data: Bytes::from(data),
            thumbnail: Bytes::from(thumbnail),
        };

        debug!(
            format = ?output.format,
            width = output.width,
            height = output.height,
            quality = output.quality,
            compressed_size = output.compressed_size,
            thumbnail_size = output.thumbnail_size,
            "Compressed photo"
        );

        Ok(output)
    }

    fn select_format<R: RasterSurface>(&self, content_type: &str, surface: &R) -> OutputFormat {
        let transparent = may_keep_transparency(content_type)
            && has_transparency(
                surface,
                self.settings.alpha_sample_stride,
                self.settings.opaque_alpha,
            );

        if transparent {
            OutputFormat::Png
        } else {
            OutputFormat::Jpeg
        }
    }

    /// Encode at the primary quality, then once at the fallback quality if
    /// the first result is over budget. The second result is kept either way.
    fn encode_within_budget<R: RasterSurface>(
        &self,
        surface: &R,
    ) -> Result<(Vec<u8>, u8), CompressionError> {
        let s = &self.settings;

        let first = surface.encode_jpeg(s.quality)?;
        if first.len() <= s.target_bytes {
            return Ok((first, s.quality));
        }

        debug!(
            size = first.len(),
            target = s.target_bytes,
            quality = s.quality,
            fallback_quality = s.fallback_quality,
            "Over budget, re-encoding at fallback quality"
        );
        let second = surface.encode_jpeg(s.fallback_quality)?;
        Ok((second, s.fallback_quality))
    }

    /// Compress on the blocking thread pool so async callers are not stalled.
    pub async fn compress_async(
        &self,
        input: CompressionInput,
    ) -> Result<CompressionOutput, CompressionError> {
        let compressor = self.clone();
        tokio::task::spawn_blocking(move || compressor.compress(&input))
            .await
            .map_err(|e| CompressionError::Encode(format!("compression task failed: {}", e)))?
    }

    /// Compress several files concurrently.
    ///
    /// At most `batch_concurrency` files are decoded at once. Returns one
    /// item per input, in input order. A failing file does not affect the
    /// others.
    pub async fn compress_batch(&self, inputs: Vec<CompressionInput>) -> Vec<BatchItem> {
        stream::iter(inputs)
            .map(|input| async move {
                let file_name = input.file_name.clone();
                let result = self.compress_async(input).await;
                BatchItem { file_name, result }
            })
            .buffered(self.settings.batch_concurrency.max(1))
            .collect()
            .await
    }
}
