//! Raster surface abstraction and its `image`-crate implementation.
//!
//! The compression algorithm only talks to `RasterSurface`, so it can run on
//! any backend that can decode, resample, read alpha and encode.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, GenericImageView, ImageEncoder, ImageReader};
use std::io::Cursor;

use super::error::CompressionError;

/// The operations the compressor needs from a bitmap.
pub trait RasterSurface: Sized + Send {
    /// Decode encoded image bytes into a bitmap.
    fn decode(bytes: &[u8]) -> Result<Self, CompressionError>;

    /// Pixel width and height.
    fn dimensions(&self) -> (u32, u32);

    /// Render into a fresh surface of exactly `width` x `height`.
    fn resized(&self, width: u32, height: u32) -> Self;

    /// False when the pixel format cannot carry transparency at all.
    fn has_alpha_channel(&self) -> bool;

    /// Alpha of the pixel at row-major position `index`.
    fn alpha_at(&self, index: u64) -> u8;

    /// Lossy encode; `quality` is a percentage.
    fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, CompressionError>;

    /// Lossless encode keeping the alpha channel.
    fn encode_png(&self) -> Result<Vec<u8>, CompressionError>;
}

/// `RasterSurface` backed by `image::DynamicImage`.
#[derive(Debug, Clone)]
pub struct DynamicRaster {
    image: DynamicImage,
}

impl DynamicRaster {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }
}

impl RasterSurface for DynamicRaster {
    fn decode(bytes: &[u8]) -> Result<Self, CompressionError> {
        let image = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| CompressionError::Decode(e.to_string()))?
            .decode()
            .map_err(|e| CompressionError::Decode(e.to_string()))?;

        if image.width() == 0 || image.height() == 0 {
            return Err(CompressionError::Decode("image has no pixels".into()));
        }

        Ok(Self { image })
    }

    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn resized(&self, width: u32, height: u32) -> Self {
        Self {
            image: self.image.resize_exact(width, height, FilterType::CatmullRom),
        }
    }

    fn has_alpha_channel(&self) -> bool {
        self.image.color().has_alpha()
    }

    fn alpha_at(&self, index: u64) -> u8 {
        let width = u64::from(self.image.width());
        let x = (index % width) as u32;
        let y = (index / width) as u32;
        self.image.get_pixel(x, y)[3]
    }

    fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, CompressionError> {
        let rgb = self.image.to_rgb8();
        let mut buffer = Vec::with_capacity(rgb.width() as usize * rgb.height() as usize / 4);

        JpegEncoder::new_with_quality(&mut buffer, quality)
            .write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| CompressionError::Encode(e.to_string()))?;

        Ok(buffer)
    }

    fn encode_png(&self) -> Result<Vec<u8>, CompressionError> {
        let rgba = self.image.to_rgba8();
        let mut buffer = Vec::new();

        PngEncoder::new_with_quality(&mut buffer, CompressionType::Best, PngFilter::Adaptive)
            .write_image(
                rgba.as_raw(),
                rgba.width(),
                rgba.height(),
                ExtendedColorType::Rgba8,
            )
            .map_err(|e| CompressionError::Encode(e.to_string()))?;

        Ok(buffer)
    }
}
