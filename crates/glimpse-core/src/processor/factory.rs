//! Extension-based routing to the preferred available backend.

use std::path::Path;
use std::sync::Arc;

use super::{FastProcessor, ImageProcessor, MagickProcessor, NativeProcessor, ToolStatus};
use crate::config::Config;

/// Ordered list of backends; earlier entries win on overlapping extensions.
pub struct ProcessorFactory {
    processors: Vec<Arc<dyn ImageProcessor>>,
}

impl ProcessorFactory {
    /// Build from backends in preference order. Unavailable backends are dropped.
    pub fn new(processors: Vec<Arc<dyn ImageProcessor>>) -> Self {
        let processors = processors
            .into_iter()
            .filter(|p| {
                let available = p.is_available();
                if !available {
                    tracing::info!("Processor {} unavailable, excluded from routing", p.name());
                }
                available
            })
            .collect();
        Self { processors }
    }

    /// The standard chain: fast, native, then the external tool.
    pub fn from_config(config: &Config, tool: ToolStatus) -> Self {
        let quality = config.thumbnails.quality;

        let mut native = NativeProcessor::new(quality);
        if let Some(font) = config.watermark_font() {
            native = native.with_font_path(&font);
        }

        let magick = MagickProcessor::new(
            &config.external_tool,
            tool,
            quality,
            config.limits.external_tool_timeout_ms,
        );

        Self::new(vec![
            Arc::new(FastProcessor::new(quality)),
            Arc::new(native),
            Arc::new(magick),
        ])
    }

    /// First backend declaring `ext` (any case, dot optional).
    pub fn for_extension(&self, ext: &str) -> Option<Arc<dyn ImageProcessor>> {
        let ext = normalize_extension(ext);
        self.processors
            .iter()
            .find(|p| p.supports_extension(&ext))
            .cloned()
    }

    pub fn for_path(&self, path: &Path) -> Option<Arc<dyn ImageProcessor>> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| self.for_extension(e))
    }

    /// First backend with a download transform that handles `path`.
    pub fn transformer_for_path(&self, path: &Path) -> Option<Arc<dyn ImageProcessor>> {
        let ext = normalize_extension(path.extension()?.to_str()?);
        self.processors
            .iter()
            .find(|p| p.capabilities().transform && p.supports_extension(&ext))
            .cloned()
    }

    pub fn processors(&self) -> &[Arc<dyn ImageProcessor>] {
        &self.processors
    }
}

/// Lowercase with exactly one leading dot: `"JPG"` -> `".jpg"`.
pub fn normalize_extension(ext: &str) -> String {
    format!(".{}", ext.trim().trim_start_matches('.').to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory(tool: ToolStatus) -> ProcessorFactory {
        ProcessorFactory::from_config(&Config::default(), tool)
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension("JPG"), ".jpg");
        assert_eq!(normalize_extension(".Jpeg"), ".jpeg");
        assert_eq!(normalize_extension("..png"), ".png");
    }

    #[test]
    fn test_same_instance_for_equivalent_extensions() {
        let factory = factory(ToolStatus::unavailable());
        let a = factory.for_extension("JPG").unwrap();
        let b = factory.for_extension(".jpg").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "fast");
    }

    #[test]
    fn test_preference_order() {
        let factory = factory(ToolStatus::available("ImageMagick 7"));
        assert_eq!(factory.for_extension("png").unwrap().name(), "fast");
        assert_eq!(factory.for_extension("webp").unwrap().name(), "native");
        // overlapping extension goes to the earlier backend
        assert_eq!(factory.for_extension("TIFF").unwrap().name(), "native");
        assert_eq!(factory.for_extension("cr2").unwrap().name(), "magick");
        assert!(factory.for_extension("txt").is_none());
    }

    #[test]
    fn test_unavailable_tool_is_excluded() {
        let factory = factory(ToolStatus::unavailable());
        assert_eq!(factory.processors().len(), 2);
        assert!(factory.for_extension("heic").is_none());
        assert_eq!(factory.for_extension("tif").unwrap().name(), "native");
    }

    #[test]
    fn test_for_path_and_transformer() {
        let factory = factory(ToolStatus::unavailable());
        assert_eq!(factory.for_path(Path::new("/a/B.JPEG")).unwrap().name(), "fast");
        assert!(factory.for_path(Path::new("/a/noext")).is_none());
        assert_eq!(
            factory.transformer_for_path(Path::new("x.jpg")).unwrap().name(),
            "native"
        );
    }
}
