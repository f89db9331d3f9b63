//! Download copies (resize + watermark) and face/region crops.

use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, GenericImageView, Rgba};
use imageproc::drawing::{draw_text_mut, text_size};
use std::path::Path;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{CropRect, ExportConfig};

use super::scale::fit_longest_edge;

/// Scale at which text is measured before fitting it to the image.
const MEASURE_SCALE: f32 = 100.0;

/// Gap between the watermark and the image edges, as a fraction of each dimension.
const EDGE_PADDING: f64 = 0.05;

/// Where and how large to draw the watermark.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatermarkPlacement {
    pub scale: f32,
    pub x: i32,
    pub y: i32,
}

/// Load a TTF/OTF font for watermarking.
pub fn load_font(path: &Path) -> PipelineResult<FontVec> {
    let bytes = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
    FontVec::try_from_vec(bytes).map_err(|e| PipelineError::decode(path, format!("invalid font: {e}")))
}

/// Size the watermark to 1/4 of the width for portrait images and 1/6 for
/// landscape, anchored bottom-right inside a 5% margin.
///
/// `text_w`/`text_h` are the text extents measured at `measure_scale`.
pub fn watermark_placement(
    image_w: u32,
    image_h: u32,
    text_w: u32,
    text_h: u32,
    measure_scale: f32,
) -> Option<WatermarkPlacement> {
    if text_w == 0 || text_h == 0 || image_w == 0 || image_h == 0 {
        return None;
    }
    let divisor = if image_h > image_w { 4.0 } else { 6.0 };
    let target_w = f64::from(image_w) / divisor;
    let ratio = target_w / f64::from(text_w);

    let scaled_w = (f64::from(text_w) * ratio).round() as i32;
    let scaled_h = (f64::from(text_h) * ratio).round() as i32;
    let pad_x = (f64::from(image_w) * EDGE_PADDING).round() as i32;
    let pad_y = (f64::from(image_h) * EDGE_PADDING).round() as i32;

    Some(WatermarkPlacement {
        scale: (f64::from(measure_scale) * ratio) as f32,
        x: (image_w as i32 - pad_x - scaled_w).max(0),
        y: (image_h as i32 - pad_y - scaled_h).max(0),
    })
}

/// Stamp `text` bottom-right with a dark drop shadow for contrast.
pub fn apply_watermark(image: DynamicImage, text: &str, font: &FontVec) -> DynamicImage {
    let (w, h) = image.dimensions();
    let (text_w, text_h) = text_size(PxScale::from(MEASURE_SCALE), font, text);
    let Some(placement) = watermark_placement(w, h, text_w, text_h, MEASURE_SCALE) else {
        return image;
    };

    let mut canvas = image.to_rgba8();
    let scale = PxScale::from(placement.scale);
    let shadow = ((placement.scale / 40.0).round() as i32).max(1);
    draw_text_mut(
        &mut canvas,
        Rgba([0, 0, 0, 160]),
        placement.x + shadow,
        placement.y + shadow,
        scale,
        font,
        text,
    );
    draw_text_mut(
        &mut canvas,
        Rgba([255, 255, 255, 220]),
        placement.x,
        placement.y,
        scale,
        font,
        text,
    );
    DynamicImage::ImageRgba8(canvas)
}

/// Resize (unless full resolution) and watermark an oriented image for download.
pub fn render_download(
    image: DynamicImage,
    config: &ExportConfig,
    font: Option<&FontVec>,
) -> DynamicImage {
    let resized = match config.max_size {
        Some(max_edge) => {
            let (w, h) = image.dimensions();
            let (nw, nh) = fit_longest_edge(w, h, max_edge);
            if (nw, nh) == (w, h) {
                image
            } else {
                image.resize_exact(nw, nh, image::imageops::FilterType::Lanczos3)
            }
        }
        None => image,
    };

    match (config.watermark.as_deref(), font) {
        (Some(text), Some(font)) if !text.trim().is_empty() => apply_watermark(resized, text, font),
        (Some(text), None) if !text.trim().is_empty() => {
            tracing::warn!("Watermark requested but no font configured, exporting without it");
            resized
        }
        _ => resized,
    }
}

/// Extract a rectangle from an oriented image.
pub fn crop_region(image: &DynamicImage, rect: CropRect, path: &Path) -> PipelineResult<DynamicImage> {
    let (w, h) = image.dimensions();
    let fits = rect.width > 0
        && rect.height > 0
        && rect.x.checked_add(rect.width).is_some_and(|r| r <= w)
        && rect.y.checked_add(rect.height).is_some_and(|b| b <= h);
    if !fits {
        return Err(PipelineError::InvalidCrop {
            path: path.to_path_buf(),
            message: format!(
                "{}x{}+{}+{} outside {}x{}",
                rect.width, rect.height, rect.x, rect.y, w, h
            ),
        });
    }
    Ok(image.crop_imm(rect.x, rect.y, rect.width, rect.height))
}
