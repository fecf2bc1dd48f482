//! Canonical product image encoding.
//!
//! Every stored image is RGB, exactly 224x224 (aspect ratio is not
//! preserved) and JPEG-encoded, whatever the source mode or size.

use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, RgbImage};

use prodcat_core::{Error, Result};

/// Side length of the canonical image.
pub const CANONICAL_SIZE: u32 = 224;

const JPEG_QUALITY: u8 = 75;

/// Convert to RGB, resize to the canonical size and encode as JPEG.
pub fn canonical_image_bytes(image: &DynamicImage) -> Result<Vec<u8>> {
    let rgb = image.to_rgb8();
    let resized = image::imageops::resize(&rgb, CANONICAL_SIZE, CANONICAL_SIZE, FilterType::CatmullRom);

    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)
        .encode_image(&resized)
        .map_err(|e| Error::Image(format!("JPEG encoding failed: {}", e)))?;
    Ok(buf)
}

/// Decode stored image bytes back to RGB pixels.
pub fn decode_canonical(bytes: &[u8]) -> Result<RgbImage> {
    let img = image::load_from_memory(bytes).map_err(|e| Error::Image(e.to_string()))?;
    Ok(img.to_rgb8())
}

/// Open an image file, sniffing the format from its content.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    let reader = ImageReader::open(path)
        .map_err(|e| Error::Image(format!("{}: {}", path.display(), e)))?
        .with_guessed_format()
        .map_err(|e| Error::Image(format!("{}: {}", path.display(), e)))?;
    reader
        .decode()
        .map_err(|e| Error::Image(format!("{}: {}", path.display(), e)))
}

/// Decode an image held in memory (e.g. an uploaded file).
pub fn load_image_bytes(bytes: &[u8]) -> Result<DynamicImage> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| Error::Image(e.to_string()))?
        .decode()
        .map_err(|e| Error::Image(e.to_string()))
}
