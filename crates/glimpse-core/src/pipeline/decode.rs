//! Image decoding with format detection, orientation and timeout support.

use image::{DynamicImage, GenericImageView, ImageFormat};
use std::path::Path;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::LimitsConfig;
use crate::error::{PipelineError, PipelineResult};

use super::orientation::Orientation;

/// Image decoder with configurable limits and timeout.
pub struct ImageDecoder {
    limits: LimitsConfig,
}

/// Result of decoding an image.
#[derive(Debug)]
pub struct DecodedImage {
    /// The decoded (and, where requested, oriented) image data
    pub image: DynamicImage,
    /// Detected image format
    pub format: ImageFormat,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Original file size in bytes
    pub file_size: u64,
    /// Orientation recorded in the file
    pub orientation: Orientation,
}

impl ImageDecoder {
    /// Create a new decoder with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Decode and orient an image off the async runtime, bounded by the decode timeout.
    pub async fn decode(&self, path: &Path) -> PipelineResult<DecodedImage> {
        let path_owned = path.to_path_buf();
        let timeout_duration = Duration::from_millis(self.limits.decode_timeout_ms);

        let decode_result = timeout(timeout_duration, async {
            tokio::task::spawn_blocking(move || Self::open_oriented(&path_owned)).await
        })
        .await;

        match decode_result {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(PipelineError::Decode {
                path: path.to_path_buf(),
                message: format!("Task join error: {}", e),
            }),
            Err(_) => Err(PipelineError::Timeout {
                path: path.to_path_buf(),
                stage: "decode".to_string(),
                timeout_ms: self.limits.decode_timeout_ms,
            }),
        }
    }

    /// Decode without applying orientation.
    pub fn open(path: &Path) -> PipelineResult<DecodedImage> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PipelineError::FileNotFound(path.to_path_buf()),
            _ => PipelineError::io(path, e),
        })?;
        let file_size = bytes.len() as u64;

        let reader = image::ImageReader::new(std::io::Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| PipelineError::decode(path, format!("Cannot detect image format: {e}")))?;
        let format = match reader.format() {
            Some(f) => f,
            None => ImageFormat::from_path(path).map_err(|_| PipelineError::UnsupportedFormat {
                path: path.to_path_buf(),
                format: path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("unknown")
                    .to_string(),
            })?,
        };
        let image = reader
            .decode()
            .map_err(|e| PipelineError::decode(path, e))?;

        let (width, height) = image.dimensions();
        Ok(DecodedImage {
            image,
            format,
            width,
            height,
            file_size,
            orientation: Orientation::Normal,
        })
    }

    /// Decode and apply the EXIF orientation.
    pub fn open_oriented(path: &Path) -> PipelineResult<DecodedImage> {
        Self::open_sampled(path, 0, 0)
    }

    /// Decode, shrink towards the requested box and orient.
    ///
    /// When the source is much larger than every requested rendition, it is
    /// reduced by the largest power-of-two factor that still covers the box,
    /// the way a DCT-scaled JPEG decode would. The box is in display
    /// orientation; a zero box disables the reduction.
    pub fn open_sampled(path: &Path, max_width: u32, max_height: u32) -> PipelineResult<DecodedImage> {
        let orientation = Orientation::read(path);
        let mut decoded = Self::open(path)?;

        if max_width > 0 && max_height > 0 {
            let (need_w, need_h) = if orientation.swaps_dimensions() {
                (max_height, max_width)
            } else {
                (max_width, max_height)
            };
            let factor = sample_factor(decoded.width, decoded.height, need_w, need_h);
            if factor > 1 {
                tracing::trace!(
                    "Sampling {:?} by 1/{} ({}x{})",
                    path,
                    factor,
                    decoded.width,
                    decoded.height
                );
                decoded.image = decoded
                    .image
                    .thumbnail(decoded.width / factor, decoded.height / factor);
            }
        }

        decoded.image = orientation.apply(decoded.image);
        let (width, height) = decoded.image.dimensions();
        decoded.width = width;
        decoded.height = height;
        decoded.orientation = orientation;
        Ok(decoded)
    }
}

/// Largest factor in {8, 4, 2} that keeps `src` at least as large as `need`, else 1.
pub fn sample_factor(src_w: u32, src_h: u32, need_w: u32, need_h: u32) -> u32 {
    [8, 4, 2]
        .into_iter()
        .find(|&k| src_w / k >= need_w && src_h / k >= need_h)
        .unwrap_or(1)
}

/// Convert an ImageFormat to a string representation.
pub fn format_to_string(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "jpeg".to_string(),
        ImageFormat::Png => "png".to_string(),
        ImageFormat::WebP => "webp".to_string(),
        ImageFormat::Gif => "gif".to_string(),
        ImageFormat::Tiff => "tiff".to_string(),
        ImageFormat::Bmp => "bmp".to_string(),
        ImageFormat::Ico => "ico".to_string(),
        ImageFormat::Pnm => "pnm".to_string(),
        ImageFormat::Tga => "tga".to_string(),
        ImageFormat::Qoi => "qoi".to_string(),
        ImageFormat::Avif => "avif".to_string(),
        _ => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_format_to_string() {
        assert_eq!(format_to_string(ImageFormat::Jpeg), "jpeg");
        assert_eq!(format_to_string(ImageFormat::Png), "png");
        assert_eq!(format_to_string(ImageFormat::WebP), "webp");
    }

    #[test]
    fn test_sample_factor() {
        assert_eq!(sample_factor(4000, 3000, 2000, 2000), 1);
        assert_eq!(sample_factor(4000, 3000, 800, 600), 4);
        assert_eq!(sample_factor(4000, 3000, 250, 250), 8);
        assert_eq!(sample_factor(4000, 3000, 1000, 1600), 1);
        assert_eq!(sample_factor(100, 100, 40, 40), 2);
    }

    #[test]
    fn test_format_detected_by_content() {
        // A PNG saved under a .jpg name is still decoded as PNG
        let dir = tempfile::tempdir().unwrap();
        let misnamed = dir.path().join("test_misnamed.jpg");
        DynamicImage::ImageRgb8(RgbImage::new(8, 8))
            .save_with_format(&misnamed, ImageFormat::Png)
            .unwrap();

        let result = ImageDecoder::open(&misnamed).unwrap();
        assert_eq!(result.format, ImageFormat::Png);
        assert_eq!((result.width, result.height), (8, 8));
    }

    #[test]
    fn test_open_sampled_reduces_large_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        DynamicImage::ImageRgb8(RgbImage::new(1600, 1200))
            .save(&path)
            .unwrap();

        let decoded = ImageDecoder::open_sampled(&path, 400, 300).unwrap();
        assert_eq!((decoded.width, decoded.height), (400, 300));
        assert_eq!(decoded.file_size, std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn test_missing_file() {
        let err = ImageDecoder::open(Path::new("/nonexistent/photo.png")).unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_async_decode_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\nnot really").unwrap();

        let decoder = ImageDecoder::new(LimitsConfig::default());
        let err = decoder.decode(&path).await.unwrap_err();
        assert!(matches!(err, PipelineError::Decode { .. }));
    }
}
