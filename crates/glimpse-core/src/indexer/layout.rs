//! Where an image's thumbnails live on disk.

use std::path::{Path, PathBuf};

use crate::types::{ImageId, ThumbConfig, ThumbSize, ThumbTarget};

/// Number of shard directories, to keep any one directory small.
const SHARDS: i64 = 256;

/// Maps `(image, size)` to `root/<shard>/<id>_<suffix>.jpg`.
#[derive(Debug, Clone)]
pub struct ThumbnailLayout {
    root: PathBuf,
    sizes: Vec<ThumbConfig>,
}

impl ThumbnailLayout {
    pub fn new(root: impl Into<PathBuf>, sizes: Vec<ThumbConfig>) -> Self {
        Self {
            root: root.into(),
            sizes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sizes(&self) -> &[ThumbConfig] {
        &self.sizes
    }

    pub fn path(&self, image: ImageId, size: ThumbSize) -> PathBuf {
        self.root
            .join(format!("{:02x}", image.0.rem_euclid(SHARDS)))
            .join(format!("{}_{}.jpg", image.0, size.suffix()))
    }

    /// One target per configured size.
    pub fn targets(&self, image: ImageId) -> Vec<ThumbTarget> {
        self.sizes
            .iter()
            .map(|config| ThumbTarget::new(*config, self.path(image, config.size)))
            .collect()
    }

    /// Configured sizes whose file is present.
    pub fn existing(&self, image: ImageId) -> Vec<ThumbSize> {
        self.sizes
            .iter()
            .map(|c| c.size)
            .filter(|size| self.path(image, *size).is_file())
            .collect()
    }

    /// The biggest rendition on disk, by configured area.
    pub fn largest_existing(&self, image: ImageId) -> Option<PathBuf> {
        self.sizes
            .iter()
            .filter(|c| self.path(image, c.size).is_file())
            .max_by_key(|c| u64::from(c.width) * u64::from(c.height))
            .map(|c| self.path(image, c.size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sharded_paths() {
        let layout = ThumbnailLayout::new("/thumbs", ThumbConfig::defaults());
        assert_eq!(
            layout.path(ImageId(4660), ThumbSize::Small),
            PathBuf::from("/thumbs/34/4660_s.jpg")
        );
        assert_eq!(
            layout.path(ImageId(7), ThumbSize::ExtraLarge),
            PathBuf::from("/thumbs/07/7_xl.jpg")
        );
    }

    #[test]
    fn test_existing_and_largest() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ThumbnailLayout::new(
            dir.path(),
            vec![
                ThumbConfig::new(ThumbSize::Small, 100, 100, true),
                ThumbConfig::new(ThumbSize::Big, 800, 600, false),
            ],
        );
        let id = ImageId(3);
        assert!(layout.existing(id).is_empty());
        assert!(layout.largest_existing(id).is_none());

        let small = layout.path(id, ThumbSize::Small);
        std::fs::create_dir_all(small.parent().unwrap()).unwrap();
        std::fs::write(&small, b"x").unwrap();
        assert_eq!(layout.existing(id), vec![ThumbSize::Small]);
        assert_eq!(layout.largest_existing(id), Some(small));

        std::fs::write(layout.path(id, ThumbSize::Big), b"x").unwrap();
        assert_eq!(layout.largest_existing(id), Some(layout.path(id, ThumbSize::Big)));
        assert_eq!(layout.targets(id).len(), 2);
    }
}
