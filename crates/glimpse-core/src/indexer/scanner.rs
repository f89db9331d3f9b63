//! Walks a folder and registers every supported image with the store.

use chrono::{DateTime, Local, NaiveDateTime};
use std::path::{Path, PathBuf};

use crate::error::StoreResult;
use crate::pipeline::{FileDiscovery, MetadataExtractor};
use crate::store::{ImageStore, NewImage};
use crate::types::ImageId;

pub struct FolderScanner {
    discovery: FileDiscovery,
}

impl FolderScanner {
    pub fn new<S: AsRef<str>>(extensions: &[S]) -> Self {
        Self {
            discovery: FileDiscovery::new(extensions),
        }
    }

    /// Skip `dir` while walking, typically the thumbnail root.
    pub fn excluding(self, dir: impl Into<PathBuf>) -> Self {
        Self {
            discovery: self.discovery.exclude(dir),
        }
    }

    /// Register (or refresh) every supported file under `root`.
    ///
    /// Blocking: walks the tree and reads EXIF from each file.
    pub fn scan(&self, store: &dyn ImageStore, root: &Path) -> StoreResult<Vec<ImageId>> {
        let files = self.discovery.discover(root);
        tracing::info!(
            "Found {} images ({} bytes) under {:?}",
            files.len(),
            FileDiscovery::total_size(&files),
            root
        );

        let mut ids = Vec::with_capacity(files.len());
        for file in files {
            let mut exif = MetadataExtractor::extract(&file.path).unwrap_or_default();
            if exif.width.is_none() || exif.height.is_none() {
                // stored dimensions, like the EXIF ones; orientation is applied on read
                if let Ok((width, height)) = image::image_dimensions(&file.path) {
                    exif.width = Some(width);
                    exif.height = Some(height);
                }
            }
            let modified_at = file
                .modified
                .map(|t| DateTime::<Local>::from(t).naive_local())
                .unwrap_or_else(now);
            let id = store.register_image(&NewImage {
                path: file.path,
                file_size: file.size,
                modified_at,
                exif,
            })?;
            ids.push(id);
        }
        Ok(ids)
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{OrientationFilter, SearchCompiler, SearchQuery};
    use crate::store::MemoryStore;
    use image::{DynamicImage, RgbImage};

    #[test]
    fn test_scan_registers_supported_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        for name in ["a.png", "sub/b.PNG"] {
            DynamicImage::ImageRgb8(RgbImage::new(16, 12))
                .save_with_format(dir.path().join(name), image::ImageFormat::Png)
                .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), b"skip me").unwrap();

        let store = MemoryStore::new();
        let scanner = FolderScanner::new(&["png"]);
        let ids = scanner.scan(&store, dir.path()).unwrap();
        assert_eq!(ids.len(), 2);

        // rescanning refreshes the same records
        let again = scanner.scan(&store, dir.path()).unwrap();
        let (mut a, mut b) = (ids.clone(), again);
        a.sort();
        b.sort();
        assert_eq!(a, b);
        assert_eq!(store.image_count(), 2);
    }

    #[test]
    fn test_dimensions_without_exif_come_from_header() {
        let dir = tempfile::tempdir().unwrap();
        let img = DynamicImage::ImageRgb8(RgbImage::new(80, 60));
        img.save_with_format(dir.path().join("wide.png"), image::ImageFormat::Png)
            .unwrap();
        img.save_with_format(dir.path().join("wide.jpg"), image::ImageFormat::Jpeg)
            .unwrap();
        DynamicImage::ImageRgb8(RgbImage::new(30, 90))
            .save_with_format(dir.path().join("tall.bmp"), image::ImageFormat::Bmp)
            .unwrap();

        let store = MemoryStore::new();
        let ids = FolderScanner::new(&["png", "jpg", "bmp"])
            .scan(&store, dir.path())
            .unwrap();
        assert_eq!(ids.len(), 3);

        let find = |orientation: OrientationFilter| {
            let query = SearchQuery {
                orientation: Some(orientation),
                ..SearchQuery::default()
            };
            let page = SearchCompiler::search(&store, &query, 0, 10).unwrap();
            let mut names: Vec<String> = page
                .ids
                .iter()
                .map(|id| store.get_image(*id).unwrap().unwrap().filename)
                .collect();
            names.sort();
            names
        };
        assert_eq!(find(OrientationFilter::Landscape), vec!["wide.jpg", "wide.png"]);
        assert_eq!(find(OrientationFilter::Portrait), vec!["tall.bmp"]);
    }
}
