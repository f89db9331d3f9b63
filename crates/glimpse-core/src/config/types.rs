//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::ThumbConfig;

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// SQLite catalog file
    pub database: PathBuf,

    /// Directory thumbnails are written under
    pub thumbnail_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("~/.glimpse/catalog.db"),
            thumbnail_dir: PathBuf::from("~/.glimpse/thumbs"),
        }
    }
}

/// Processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Number of indexing workers consuming the job queue
    pub parallel_workers: usize,

    /// File extensions picked up by folder scans
    pub supported_formats: Vec<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallel_workers: 4,
            supported_formats: [
                "jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp", "heic", "heif",
                "avif", "cr2", "cr3", "nef", "arw", "dng", "orf", "rw2", "raf",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum file size in megabytes
    pub max_file_size_mb: u64,

    /// Decode timeout in milliseconds
    pub decode_timeout_ms: u64,

    /// Upper bound on a single external tool invocation
    pub external_tool_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 200,
            decode_timeout_ms: 30_000,
            external_tool_timeout_ms: 120_000,
        }
    }
}

/// Thumbnail generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailSettings {
    /// JPEG quality for written thumbnails
    pub quality: u8,

    /// Renditions generated for every image
    pub sizes: Vec<ThumbConfig>,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            quality: 90,
            sizes: ThumbConfig::defaults(),
        }
    }
}

/// External conversion tool (ImageMagick-compatible CLI).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalToolConfig {
    /// Probe for the tool at startup; when false the backend is never used
    pub enabled: bool,

    /// Executable name or path
    pub program: String,

    /// Argument that makes the tool print its version and exit
    pub version_arg: String,
}

impl Default for ExternalToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "magick".to_string(),
            version_arg: "-version".to_string(),
        }
    }
}

/// Search defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Minimum perceptual similarity for "similar to" searches (0.0-1.0)
    pub similarity_threshold: f64,

    /// Rows fetched per page
    pub page_size: usize,

    /// Match AI-detected object tags in free-text search
    pub include_object_tags: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.75,
            page_size: 100,
            include_object_tags: true,
        }
    }
}

/// Download/export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Longest edge for downloads unless full resolution is requested
    pub max_size: u32,

    /// JPEG quality for downloads
    pub quality: u8,

    /// TTF/OTF font used to render watermarks
    pub watermark_font: Option<PathBuf>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            max_size: 1920,
            quality: 90,
            watermark_font: None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
