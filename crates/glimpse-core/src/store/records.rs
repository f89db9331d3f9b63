//! Persisted records the core reads and writes.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::pipeline::hash::{PerceptualHash, PERCEPTUAL_PARTS};
use crate::types::{
    CameraId, ExifData, FolderId, ImageId, LensId, PersonId, TagId, ThumbSize,
};

/// Date format used for stored timestamps; sorts lexically.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: ImageId,
    pub folder_id: FolderId,
    pub filename: String,
    /// Full path of the source file
    pub path: PathBuf,
    pub file_size: u64,
    /// Display (oriented) dimensions, when known
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub taken_at: Option<NaiveDateTime>,
    pub modified_at: NaiveDateTime,
    pub camera_id: Option<CameraId>,
    pub lens_id: Option<LensId>,
    pub rating: u8,
    pub caption: Option<String>,
    /// Thumbnail sizes currently on disk
    pub thumb_sizes: Vec<ThumbSize>,
}

impl ImageRecord {
    /// Taken date, falling back to the file's modification time.
    pub fn sort_date(&self) -> NaiveDateTime {
        self.taken_at.unwrap_or(self.modified_at)
    }
}

/// What a folder scan knows about a file before it has an id.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub path: PathBuf,
    pub file_size: u64,
    pub modified_at: NaiveDateTime,
    pub exif: ExifData,
}

impl NewImage {
    /// Oriented dimensions from EXIF (orientations 5-8 swap axes).
    pub fn display_dimensions(&self) -> (Option<u32>, Option<u32>) {
        let (w, h) = (self.exif.width, self.exif.height);
        match self.exif.orientation {
            Some(5..=8) => (h, w),
            _ => (w, h),
        }
    }

    pub fn camera(&self) -> Option<(String, String)> {
        make_model(&self.exif.camera_make, &self.exif.camera_model)
    }

    pub fn lens(&self) -> Option<(String, String)> {
        make_model(&self.exif.lens_make, &self.exif.lens_model)
    }
}

fn make_model(make: &Option<String>, model: &Option<String>) -> Option<(String, String)> {
    match (make, model) {
        (None, None) => None,
        _ => Some((
            make.clone().unwrap_or_default(),
            model.clone().unwrap_or_default(),
        )),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRecord {
    pub id: FolderId,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    pub id: TagId,
    pub keyword: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: PersonId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraRecord {
    pub id: CameraId,
    pub make: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LensRecord {
    pub id: LensId,
    pub make: String,
    pub model: String,
}

/// Stored hashes; the perceptual hash is kept as four indexable hex parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRecord {
    pub image_id: ImageId,
    pub content_hash: String,
    pub phash_parts: Option<[String; PERCEPTUAL_PARTS]>,
}

impl HashRecord {
    pub fn perceptual(&self) -> Option<PerceptualHash> {
        self.phash_parts
            .as_ref()
            .and_then(|parts| PerceptualHash::from_parts(parts))
    }
}
