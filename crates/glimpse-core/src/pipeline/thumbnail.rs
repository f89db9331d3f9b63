//! Multi-size thumbnail generation.
//!
//! One decode per source image. Renditions are produced largest first, each
//! one scaled from the previous rendition's bitmap rather than from the
//! source, so every step works on a progressively smaller image.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{ImageProcessResult, ThumbTarget};

use super::decode::ImageDecoder;
use super::hash::Hasher;
use super::scale::{center_crop, scaled_dimensions, Scaler};

/// Generates every requested rendition of a source image in one pass.
pub struct ThumbnailEngine<S: Scaler> {
    scaler: S,
    quality: u8,
    compute_hash: bool,
}

impl<S: Scaler> ThumbnailEngine<S> {
    /// Create an engine writing JPEGs at `quality`.
    pub fn new(scaler: S, quality: u8) -> Self {
        Self {
            scaler,
            quality,
            compute_hash: true,
        }
    }

    /// Skip the content hash (for callers that hash elsewhere).
    pub fn without_hash(mut self) -> Self {
        self.compute_hash = false;
        self
    }

    /// Produce every target that does not exist yet.
    ///
    /// If all destinations are already on disk nothing is read or written and
    /// `thumbs_generated` is false. Any failure aborts the remaining sizes.
    pub fn generate(
        &mut self,
        source: &Path,
        targets: &[ThumbTarget],
    ) -> PipelineResult<ImageProcessResult> {
        if targets.is_empty() {
            return Ok(ImageProcessResult::default());
        }
        if all_exist(targets) {
            tracing::debug!("All thumbnails exist for {:?}, skipping", source);
            return Ok(ImageProcessResult::default());
        }

        let mut ordered: Vec<&ThumbTarget> = targets.iter().collect();
        ordered.sort_by(|a, b| b.config.width.cmp(&a.config.width));

        let max_width = ordered.iter().map(|t| t.config.width).max().unwrap_or(0);
        let max_height = ordered.iter().map(|t| t.config.height).max().unwrap_or(0);

        let decode_start = std::time::Instant::now();
        let decoded = ImageDecoder::open_sampled(source, max_width, max_height)?;
        tracing::trace!(
            "  Decode: {:?} ({}x{})",
            decode_start.elapsed(),
            decoded.width,
            decoded.height
        );

        let content_hash = if self.compute_hash {
            Hasher::content_hash(&decoded.image)
        } else {
            String::new()
        };

        let resize_start = std::time::Instant::now();
        let mut working = decoded.image;
        for target in ordered {
            working = self.render(source, working, target)?;
        }
        tracing::trace!("  Resize ({}): {:?}", self.scaler.name(), resize_start.elapsed());

        Ok(ImageProcessResult {
            thumbs_generated: true,
            content_hash,
        })
    }

    /// Scale, optionally crop, and save one rendition; returns the scaled bitmap
    /// that seeds the next (smaller) rendition.
    fn render(
        &mut self,
        source: &Path,
        working: DynamicImage,
        target: &ThumbTarget,
    ) -> PipelineResult<DynamicImage> {
        let config = &target.config;
        let (src_w, src_h) = working.dimensions();
        let (w, h) = scaled_dimensions(src_w, src_h, config);

        let scaled = if (w, h) == (src_w, src_h) {
            working
        } else {
            self.scaler
                .resize(&working, w, h)
                .map_err(|e| PipelineError::encode(&target.destination, e))?
        };

        if config.crop_to_ratio && (w, h) != (config.width, config.height) {
            let cropped = center_crop(&scaled, config.width, config.height);
            save_jpeg(&cropped, &target.destination, self.quality)?;
        } else {
            save_jpeg(&scaled, &target.destination, self.quality)?;
        }

        tracing::trace!(
            "  {} {:?} -> {:?}",
            config.size,
            source.file_name().unwrap_or_default(),
            target.destination
        );
        Ok(scaled)
    }
}

/// True when every destination is already present.
pub fn all_exist(targets: &[ThumbTarget]) -> bool {
    !targets.is_empty() && targets.iter().all(|t| t.destination.exists())
}

/// Write a JPEG, creating parent directories.
pub fn save_jpeg(image: &DynamicImage, destination: &Path, quality: u8) -> PipelineResult<()> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    let file = File::create(destination).map_err(|e| PipelineError::io(destination, e))?;
    let mut writer = BufWriter::new(file);
    write_jpeg(image, &mut writer, quality).map_err(|e| PipelineError::encode(destination, e))
}

/// Encode as baseline JPEG; alpha is dropped.
pub fn write_jpeg<W: std::io::Write>(
    image: &DynamicImage,
    writer: &mut W,
    quality: u8,
) -> image::ImageResult<()> {
    let encoder = JpegEncoder::new_with_quality(writer, quality);
    match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => image.write_with_encoder(encoder),
        _ => DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder),
    }
}
