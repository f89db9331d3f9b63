//! Image processor backends and the factory that routes files to them.
//!
//! Backends differ in supported formats, speed and feature set. The
//! factory tests them in a fixed preference order: the SIMD JPEG/PNG path
//! first, the pure-Rust `image` backend second, and the external tool last
//! since it covers the most exotic formats at the cost of a process spawn.

mod factory;
mod fast;
mod magick;
mod native;
mod probe;

pub use factory::{normalize_extension, ProcessorFactory};
pub use fast::FastProcessor;
pub use magick::MagickProcessor;
pub use native::NativeProcessor;
pub use probe::{ToolProbe, ToolStatus};

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::export::crop_region;
use crate::pipeline::thumbnail::save_jpeg;
use crate::pipeline::ImageDecoder;
use crate::types::{CropRect, ExportConfig, ImageProcessResult, ThumbTarget};

/// Operations a backend implements beyond its extension set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub thumbnails: bool,
    /// `create_thumbs` returns a non-empty content hash
    pub content_hash: bool,
    pub crop: bool,
    /// Resize and watermark for download
    pub transform: bool,
}

/// A backend that turns source images into thumbnails, crops and downloads.
///
/// Uses `async_trait` so the factory can hand out `Arc<dyn ImageProcessor>`.
/// Operations outside `capabilities()` return [`PipelineError::Unsupported`].
#[async_trait]
pub trait ImageProcessor: Send + Sync {
    /// Backend name for logging (e.g., "fast", "magick").
    fn name(&self) -> &'static str;

    /// Lowercase extensions with a leading dot.
    fn supported_extensions(&self) -> &'static [&'static str];

    fn capabilities(&self) -> Capabilities;

    /// Whether the backend can run at all on this machine.
    fn is_available(&self) -> bool {
        true
    }

    /// `ext` must already be normalized.
    fn supports_extension(&self, ext: &str) -> bool {
        self.supported_extensions().contains(&ext)
    }

    /// Write every target rendition that is missing.
    async fn create_thumbs(
        &self,
        source: &Path,
        targets: &[ThumbTarget],
    ) -> PipelineResult<ImageProcessResult>;

    /// Auto-orient, cut `rect` out of the source and write it as JPEG.
    async fn crop_image(
        &self,
        _source: &Path,
        _rect: CropRect,
        _destination: &Path,
    ) -> PipelineResult<()> {
        Err(PipelineError::Unsupported {
            processor: self.name(),
            operation: "crop",
        })
    }

    /// Resize/watermark the source and stream it as JPEG into `output`.
    async fn transform_for_download(
        &self,
        _source: &Path,
        _output: &mut (dyn Write + Send),
        _config: &ExportConfig,
    ) -> PipelineResult<()> {
        Err(PipelineError::Unsupported {
            processor: self.name(),
            operation: "transform for download",
        })
    }
}

/// Run CPU-bound image work off the async runtime.
pub(crate) async fn run_blocking<T, F>(path: &Path, work: F) -> PipelineResult<T>
where
    F: FnOnce() -> PipelineResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PipelineError::decode(path, format!("Task join error: {e}")))?
}

/// In-process crop shared by the pure-Rust backends.
pub(crate) async fn crop_in_process(
    source: &Path,
    rect: CropRect,
    destination: &Path,
    quality: u8,
) -> PipelineResult<()> {
    let source: PathBuf = source.to_path_buf();
    let destination = destination.to_path_buf();
    run_blocking(&source.clone(), move || {
        let decoded = ImageDecoder::open_oriented(&source)?;
        let cropped = crop_region(&decoded.image, rect, &source)?;
        save_jpeg(&cropped, &destination, quality)
    })
    .await
}
