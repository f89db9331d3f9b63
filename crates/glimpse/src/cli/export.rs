//! The `glimpse export` command: download copies and crops.

use anyhow::Context;
use clap::Args;
use glimpse_core::types::ImageId;
use glimpse_core::{Config, CropRect, ExportConfig, ImageStore};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Arguments for the `export` command.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Id of the image to export
    pub image: i64,

    /// Destination JPEG file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Longest edge in pixels (defaults to the config value)
    #[arg(long, conflicts_with = "full")]
    pub max_size: Option<u32>,

    /// Keep the full resolution
    #[arg(long)]
    pub full: bool,

    /// Text stamped in the bottom-right corner
    #[arg(long)]
    pub watermark: Option<String>,

    /// JPEG quality (1-100)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: Option<u8>,

    /// Cut out a region instead, as `WxH+X+Y` in oriented pixels
    #[arg(long, value_parser = parse_crop, conflicts_with_all = ["max_size", "full", "watermark"])]
    pub crop: Option<CropRect>,
}

pub async fn execute(args: ExportArgs, config: Config) -> anyhow::Result<()> {
    let store = super::open_store(&config)?;
    let record = store
        .get_image(ImageId(args.image))?
        .ok_or_else(|| anyhow::anyhow!("No image with id {}", args.image))?;
    let factory = super::build_factory(&config).await;
    let output = super::expand(&args.output);

    if let Some(rect) = args.crop {
        let processor = factory
            .processors()
            .iter()
            .find(|p| p.capabilities().crop && p.supports_extension(&extension(&record.path)))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No processor can crop {:?}", record.path))?;
        tracing::debug!("Cropping {:?} with {}", record.path, processor.name());
        processor.crop_image(&record.path, rect, &output).await?;
        println!("Wrote crop of image {} to {}", args.image, output.display());
        return Ok(());
    }

    let processor = factory
        .transformer_for_path(&record.path)
        .ok_or_else(|| anyhow::anyhow!("No processor can export {:?}", record.path))?;
    let export = export_config(&args, &config);

    let file = std::fs::File::create(&output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    processor
        .transform_for_download(&record.path, &mut writer, &export)
        .await?;
    writer.flush()?;

    println!("Exported image {} to {}", args.image, output.display());
    Ok(())
}

fn export_config(args: &ExportArgs, config: &Config) -> ExportConfig {
    ExportConfig {
        max_size: if args.full {
            None
        } else {
            Some(args.max_size.unwrap_or(config.export.max_size))
        },
        watermark: args.watermark.clone().filter(|w| !w.trim().is_empty()),
        quality: args.quality.unwrap_or(config.export.quality),
    }
}

fn extension(path: &std::path::Path) -> String {
    glimpse_core::processor::normalize_extension(
        path.extension().and_then(|e| e.to_str()).unwrap_or_default(),
    )
}

/// `WxH+X+Y`
fn parse_crop(value: &str) -> Result<CropRect, String> {
    let invalid = || format!("invalid crop `{value}`, expected WxH+X+Y");
    let (size, offset) = value.split_once('+').ok_or_else(invalid)?;
    let (w, h) = size.split_once('x').ok_or_else(invalid)?;
    let (x, y) = offset.split_once('+').ok_or_else(invalid)?;
    let num = |s: &str| s.trim().parse::<u32>().map_err(|_| invalid());
    Ok(CropRect::new(num(x)?, num(y)?, num(w)?, num(h)?))
}
