//! Resize strategies and thumbnail geometry.
//!
//! Two scalers share one interface: the image crate's Lanczos3 resize, and a
//! SIMD convolution from `fast_image_resize` that is several times faster
//! on the common JPEG/PNG path.

use fast_image_resize::{images::Image, PixelType, ResizeOptions, Resizer};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};
use thiserror::Error;

use crate::types::ThumbConfig;

/// A resize failure inside a scaler.
#[derive(Error, Debug)]
#[error("resize to {width}x{height} failed: {message}")]
pub struct ScaleError {
    pub width: u32,
    pub height: u32,
    pub message: String,
}

/// Resizes a bitmap to exact dimensions.
pub trait Scaler {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn resize(
        &mut self,
        image: &DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<DynamicImage, ScaleError>;
}

/// Lanczos3 resize through the image crate. Handles every pixel type.
#[derive(Debug, Default)]
pub struct LanczosScaler;

impl Scaler for LanczosScaler {
    fn name(&self) -> &'static str {
        "lanczos"
    }

    fn resize(
        &mut self,
        image: &DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<DynamicImage, ScaleError> {
        if image.dimensions() == (width, height) {
            return Ok(image.clone());
        }
        Ok(image.resize_exact(width, height, FilterType::Lanczos3))
    }
}

/// SIMD-accelerated resize. Output is always RGB8 since thumbnails are JPEG.
pub struct SimdScaler {
    resizer: Resizer,
    options: ResizeOptions,
}

impl Default for SimdScaler {
    fn default() -> Self {
        Self::new()
    }
}

impl SimdScaler {
    pub fn new() -> Self {
        Self {
            resizer: Resizer::new(),
            options: ResizeOptions::new().resize_alg(fast_image_resize::ResizeAlg::Convolution(
                fast_image_resize::FilterType::Lanczos3,
            )),
        }
    }
}

impl Scaler for SimdScaler {
    fn name(&self) -> &'static str {
        "simd"
    }

    fn resize(
        &mut self,
        image: &DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<DynamicImage, ScaleError> {
        let fail = |message: String| ScaleError {
            width,
            height,
            message,
        };
        if width == 0 || height == 0 {
            return Err(fail("invalid destination dimensions".to_string()));
        }

        let rgb = image.to_rgb8();
        let (src_width, src_height) = rgb.dimensions();
        if (src_width, src_height) == (width, height) {
            return Ok(DynamicImage::ImageRgb8(rgb));
        }

        let src_image = Image::from_vec_u8(src_width, src_height, rgb.into_raw(), PixelType::U8x3)
            .map_err(|e| fail(format!("source buffer: {e}")))?;
        let mut dst_image = Image::new(width, height, PixelType::U8x3);

        self.resizer
            .resize(&src_image, &mut dst_image, &self.options)
            .map_err(|e| fail(e.to_string()))?;

        RgbImage::from_raw(width, height, dst_image.into_vec())
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| fail("result buffer size mismatch".to_string()))
    }
}

/// Dimensions of the scaled (pre-crop) bitmap for a rendition.
///
/// Plain renditions fit inside the box (`min` ratio) and never upscale.
/// Cropped renditions cover the box (`max` ratio) so the center crop can
/// always produce exactly `width` x `height`.
pub fn scaled_dimensions(src_w: u32, src_h: u32, config: &ThumbConfig) -> (u32, u32) {
    let width_ratio = f64::from(config.width) / f64::from(src_w.max(1));
    let height_ratio = f64::from(config.height) / f64::from(src_h.max(1));

    let factor = if config.crop_to_ratio {
        width_ratio.max(height_ratio)
    } else {
        width_ratio.min(height_ratio).min(1.0)
    };

    let scale = |v: u32| ((f64::from(v) * factor).round() as u32).max(1);
    let (mut w, mut h) = (scale(src_w), scale(src_h));
    if config.crop_to_ratio {
        // rounding must not leave the cover box a pixel short
        w = w.max(config.width);
        h = h.max(config.height);
    }
    (w, h)
}

/// Center-crop to exactly the configured box if the aspect differs.
pub fn center_crop(image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    let (w, h) = image.dimensions();
    if (w, h) == (width, height) || width > w || height > h {
        return image.clone();
    }
    let x = (w - width) / 2;
    let y = (h - height) / 2;
    image.crop_imm(x, y, width, height)
}

/// Box for a longest-edge limit, keeping aspect and never upscaling.
pub fn fit_longest_edge(src_w: u32, src_h: u32, max_edge: u32) -> (u32, u32) {
    let longest = src_w.max(src_h);
    if longest <= max_edge || longest == 0 {
        return (src_w, src_h);
    }
    let factor = f64::from(max_edge) / f64::from(longest);
    let scale = |v: u32| ((f64::from(v) * factor).round() as u32).max(1);
    (scale(src_w), scale(src_h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ThumbSize;
    use image::Rgb;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 64])
        }))
    }

    #[test]
    fn test_fit_preserves_aspect() {
        let config = ThumbConfig::new(ThumbSize::Big, 800, 600, false);
        assert_eq!(scaled_dimensions(4000, 3000, &config), (800, 600));

        let config = ThumbConfig::new(ThumbSize::Big, 800, 800, false);
        assert_eq!(scaled_dimensions(4000, 3000, &config), (800, 600));
        assert_eq!(scaled_dimensions(3000, 4000, &config), (600, 800));
    }

    #[test]
    fn test_fit_never_upscales() {
        let config = ThumbConfig::new(ThumbSize::ExtraLarge, 2000, 2000, false);
        assert_eq!(scaled_dimensions(640, 480, &config), (640, 480));
    }

    #[test]
    fn test_crop_covers_box() {
        let config = ThumbConfig::new(ThumbSize::Small, 200, 200, true);
        assert_eq!(scaled_dimensions(4000, 3000, &config), (267, 200));
        assert_eq!(scaled_dimensions(800, 600, &config), (267, 200));
        assert_eq!(scaled_dimensions(3000, 4000, &config), (200, 267));
    }

    #[test]
    fn test_center_crop() {
        let img = gradient(267, 200);
        let cropped = center_crop(&img, 200, 200);
        assert_eq!(cropped.dimensions(), (200, 200));
        // left edge of the crop is column 33 of the source
        assert_eq!(cropped.to_rgb8().get_pixel(0, 0)[0], 33);
    }

    #[test]
    fn test_fit_longest_edge() {
        assert_eq!(fit_longest_edge(4000, 3000, 1000), (1000, 750));
        assert_eq!(fit_longest_edge(3000, 4000, 1000), (750, 1000));
        assert_eq!(fit_longest_edge(500, 300, 1000), (500, 300));
    }

    #[test]
    fn test_scalers_agree_on_dimensions() {
        let img = gradient(320, 240);
        let a = LanczosScaler.resize(&img, 160, 120).unwrap();
        let b = SimdScaler::new().resize(&img, 160, 120).unwrap();
        assert_eq!(a.dimensions(), (160, 120));
        assert_eq!(b.dimensions(), (160, 120));
    }

    #[test]
    fn test_simd_scaler_rejects_zero() {
        let img = gradient(10, 10);
        assert!(SimdScaler::new().resize(&img, 0, 5).is_err());
    }
}
