//! Pure-Rust backend over the `image` crate's decoders.

use ab_glyph::FontVec;
use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use super::{crop_in_process, run_blocking, Capabilities, ImageProcessor};
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::export::{load_font, render_download};
use crate::pipeline::thumbnail::write_jpeg;
use crate::pipeline::{ImageDecoder, LanczosScaler, ThumbnailEngine};
use crate::types::{CropRect, ExportConfig, ImageProcessResult, ThumbTarget};

const EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tif", ".tiff", ".webp", ".tga", ".ico", ".pnm",
    ".pbm", ".pgm", ".ppm", ".qoi",
];

/// Lanczos3 thumbnails, crops and watermarked downloads.
pub struct NativeProcessor {
    quality: u8,
    font: Option<Arc<FontVec>>,
}

impl NativeProcessor {
    pub fn new(quality: u8) -> Self {
        Self {
            quality,
            font: None,
        }
    }

    /// Load the watermark font. A missing or invalid font disables
    /// watermarking with a warning rather than failing startup.
    pub fn with_font_path(mut self, path: &Path) -> Self {
        match load_font(path) {
            Ok(font) => self.font = Some(Arc::new(font)),
            Err(e) => tracing::warn!("Watermark font unavailable ({}): {e}", path.display()),
        }
        self
    }

    pub fn with_font(mut self, font: FontVec) -> Self {
        self.font = Some(Arc::new(font));
        self
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }
}

#[async_trait]
impl ImageProcessor for NativeProcessor {
    fn name(&self) -> &'static str {
        "native"
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        EXTENSIONS
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            thumbnails: true,
            content_hash: true,
            crop: true,
            transform: true,
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
            ThumbnailEngine::new(LanczosScaler, quality).generate(&path, &targets)
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

    async fn transform_for_download(
        &self,
        source: &Path,
        output: &mut (dyn Write + Send),
        config: &ExportConfig,
    ) -> PipelineResult<()> {
        let path = source.to_path_buf();
        let font = self.font.clone();
        let export = config.clone();
        let encoded = run_blocking(source, move || {
            let decoded = ImageDecoder::open_oriented(&path)?;
            let rendered = render_download(decoded.image, &export, font.as_deref());
            let mut buffer = Vec::new();
            write_jpeg(&rendered, &mut buffer, export.quality)
                .map_err(|e| PipelineError::encode(&path, e))?;
            Ok(buffer)
        })
        .await?;

        output
            .write_all(&encoded)
            .and_then(|_| output.flush())
            .map_err(|e| PipelineError::io(source, e))?;
        tracing::debug!("Exported {:?} ({} bytes)", source, encoded.len());
        Ok(())
    }
}
