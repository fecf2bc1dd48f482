//! ImageNet-style tensor preparation.

use image::imageops::FilterType;
use ndarray::Array3;

use prodcat_core::Result;
use prodcat_ingest::{decode_canonical, CANONICAL_SIZE};

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Decode canonical JPEG bytes into a normalized CHW tensor.
///
/// Pixels are scaled to `[0, 1]`, then standardized per channel.
pub fn preprocess_image(bytes: &[u8]) -> Result<Array3<f32>> {
    let mut rgb = decode_canonical(bytes)?;
    let side = CANONICAL_SIZE;
    if rgb.dimensions() != (side, side) {
        rgb = image::imageops::resize(&rgb, side, side, FilterType::CatmullRom);
    }

    let side = side as usize;
    let mut tensor = Array3::<f32>::zeros((3, side, side));
    for (x, y, px) in rgb.enumerate_pixels() {
        for c in 0..3 {
            let v = f32::from(px[c]) / 255.0;
            tensor[[c, y as usize, x as usize]] = (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }
    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use prodcat_ingest::canonical_image_bytes;

    #[test]
    fn test_shape_and_normalization() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([255, 255, 255])));
        let bytes = canonical_image_bytes(&img).unwrap();
        let t = preprocess_image(&bytes).unwrap();
        assert_eq!(t.shape(), &[3, 224, 224]);

        // White maps to (1 - mean) / std, allowing for JPEG loss.
        for c in 0..3 {
            let expected = (1.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            assert!((t[[c, 100, 100]] - expected).abs() < 0.05);
        }
    }

    #[test]
    fn test_corrupt_bytes() {
        assert!(preprocess_image(b"\xFF\xD8 truncated").is_err());
    }
}
