//! Core data types shared by the thumbnail pipeline, the indexer and search.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::pipeline::hash::PerceptualHash;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Identifier of an indexed image.
    ImageId
);
record_id!(
    /// Identifier of a folder containing images.
    FolderId
);
record_id!(
    /// Identifier of a keyword tag.
    TagId
);
record_id!(
    /// Identifier of a recognized person.
    PersonId
);
record_id!(
    /// Identifier of a camera body.
    CameraId
);
record_id!(
    /// Identifier of a lens.
    LensId
);

/// Named thumbnail size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThumbSize {
    ExtraLarge,
    Large,
    Big,
    Medium,
    Small,
}

impl ThumbSize {
    pub const ALL: [ThumbSize; 5] = [
        ThumbSize::ExtraLarge,
        ThumbSize::Large,
        ThumbSize::Big,
        ThumbSize::Medium,
        ThumbSize::Small,
    ];

    /// Suffix used in thumbnail file names and in persisted state.
    pub fn suffix(self) -> &'static str {
        match self {
            ThumbSize::ExtraLarge => "xl",
            ThumbSize::Large => "l",
            ThumbSize::Big => "big",
            ThumbSize::Medium => "m",
            ThumbSize::Small => "s",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.suffix() == suffix)
    }
}

impl fmt::Display for ThumbSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// One requested thumbnail rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThumbConfig {
    /// Size class this rendition is stored under
    pub size: ThumbSize,

    /// Bounding box width in pixels
    pub width: u32,

    /// Bounding box height in pixels
    pub height: u32,

    /// Center-crop to exactly `width` x `height` instead of fitting inside the box
    #[serde(default)]
    pub crop_to_ratio: bool,
}

impl ThumbConfig {
    pub fn new(size: ThumbSize, width: u32, height: u32, crop_to_ratio: bool) -> Self {
        Self {
            size,
            width,
            height,
            crop_to_ratio,
        }
    }

    /// The default size ladder.
    pub fn defaults() -> Vec<ThumbConfig> {
        vec![
            ThumbConfig::new(ThumbSize::ExtraLarge, 2000, 2000, false),
            ThumbConfig::new(ThumbSize::Large, 1280, 1280, false),
            ThumbConfig::new(ThumbSize::Big, 800, 800, false),
            ThumbConfig::new(ThumbSize::Medium, 640, 640, false),
            ThumbConfig::new(ThumbSize::Small, 250, 250, true),
        ]
    }
}

/// A thumbnail config paired with the file it should be written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbTarget {
    pub config: ThumbConfig,
    pub destination: PathBuf,
}

impl ThumbTarget {
    pub fn new(config: ThumbConfig, destination: impl Into<PathBuf>) -> Self {
        Self {
            config,
            destination: destination.into(),
        }
    }
}

/// Outcome of a thumbnail generation call for one source image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageProcessResult {
    /// Whether any thumbnail file was written
    pub thumbs_generated: bool,

    /// Hex pixel hash, empty when the backend does not hash
    pub content_hash: String,
}

/// Hashes persisted for an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHashes {
    /// BLAKE3 over the decoded pixels
    pub content_hash: String,

    /// Perceptual fingerprint, if the image could be reduced
    pub perceptual: Option<PerceptualHash>,
}

/// Pixel rectangle in oriented image space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Options for producing a downloadable copy of an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    /// Longest edge of the output; `None` keeps full resolution
    pub max_size: Option<u32>,

    /// Text stamped in the bottom-right corner
    pub watermark: Option<String>,

    /// JPEG quality (1-100)
    pub quality: u8,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_size: Some(1920),
            watermark: None,
            quality: 90,
        }
    }
}

/// Metadata read from an image's EXIF block at scan time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExifData {
    /// When the photo was taken
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<NaiveDateTime>,

    /// Camera manufacturer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_make: Option<String>,

    /// Camera model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_model: Option<String>,

    /// Lens manufacturer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lens_make: Option<String>,

    /// Lens model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lens_model: Option<String>,

    /// Pixel width as recorded by the camera
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    /// Pixel height as recorded by the camera
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// EXIF Orientation tag value, 1-8
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumb_size_suffix_roundtrip() {
        for size in ThumbSize::ALL {
            assert_eq!(ThumbSize::from_suffix(size.suffix()), Some(size));
        }
        assert_eq!(ThumbSize::from_suffix("huge"), None);
    }

    #[test]
    fn test_default_ladder_is_descending() {
        let sizes = ThumbConfig::defaults();
        assert!(sizes.windows(2).all(|w| w[0].width >= w[1].width));
        assert!(sizes.last().unwrap().crop_to_ratio);
    }

    #[test]
    fn test_thumb_config_deserializes_without_crop() {
        let config: ThumbConfig =
            serde_json::from_str(r#"{"size":"big","width":800,"height":600}"#).unwrap();
        assert_eq!(config.size, ThumbSize::Big);
        assert!(!config.crop_to_ratio);
    }
}
