//! SIMD backend for the everyday JPEG/PNG path.

use async_trait::async_trait;
use std::path::Path;

use super::{crop_in_process, run_blocking, Capabilities, ImageProcessor};
use crate::error::PipelineResult;
use crate::pipeline::{SimdScaler, ThumbnailEngine};
use crate::types::{CropRect, ImageProcessResult, ThumbTarget};

const EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png"];

/// Thumbnails and crops through `fast_image_resize`.
pub struct FastProcessor {
    quality: u8,
}

impl FastProcessor {
    pub fn new(quality: u8) -> Self {
        Self { quality }
    }
}

#[async_trait]
impl ImageProcessor for FastProcessor {
    fn name(&self) -> &'static str {
        "fast"
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        EXTENSIONS
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            thumbnails: true,
            content_hash: true,
            crop: true,
            transform: false,
        }
    }

    async fn create_thumbs(
        &self,
        source: &Path,
        targets: &[ThumbTarget],
    ) -> PipelineResult<ImageProcessResult> {
        let path = source.to_path_buf();
        let targets = targets.to_vec();
        let quality = self.quality;
        run_blocking(source, move || {
            // Resizer holds scratch buffers, so each job gets its own
            ThumbnailEngine::new(SimdScaler::new(), quality).generate(&path, &targets)
        })
        .await
    }

    async fn crop_image(
        &self,
        source: &Path,
        rect: CropRect,
        destination: &Path,
    ) -> PipelineResult<()> {
        crop_in_process(source, rect, destination, self.quality).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ThumbConfig, ThumbSize};
    use image::{DynamicImage, Rgb, RgbImage};

    #[tokio::test]
    async fn test_create_thumbs_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("photo.png");
        DynamicImage::ImageRgb8(RgbImage::from_fn(300, 200, |x, _| Rgb([x as u8, 0, 0])))
            .save(&source)
            .unwrap();

        let targets = vec![ThumbTarget::new(
            ThumbConfig::new(ThumbSize::Small, 100, 100, true),
            dir.path().join("s.jpg"),
        )];
        let result = FastProcessor::new(90)
            .create_thumbs(&source, &targets)
            .await
            .unwrap();
        assert!(result.thumbs_generated);
        assert!(!result.content_hash.is_empty());
        assert_eq!(image::image_dimensions(dir.path().join("s.jpg")).unwrap(), (100, 100));
    }

    #[tokio::test]
    async fn test_crop_image() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("photo.png");
        DynamicImage::ImageRgb8(RgbImage::new(120, 80)).save(&source).unwrap();

        let dest = dir.path().join("faces/1.jpg");
        FastProcessor::new(90)
            .crop_image(&source, CropRect::new(20, 10, 40, 30), &dest)
            .await
            .unwrap();
        assert_eq!(image::image_dimensions(&dest).unwrap(), (40, 30));
    }
}
