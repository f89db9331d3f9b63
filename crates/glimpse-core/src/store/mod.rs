//! Persistence interface consumed by the indexer and the search compiler.
//!
//! The core only needs a narrow, synchronous surface. Two implementations
//! ship with the crate: an in-process [`MemoryStore`] and a SQLite
//! [`SqliteStore`] with an FTS5 index.

mod memory;
mod records;
mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use records::{
    CameraRecord, FolderRecord, HashRecord, ImageRecord, LensRecord, NewImage, PersonRecord,
    TagRecord, DATE_FORMAT,
};
pub use sqlite::SqliteStore;

use crate::error::StoreResult;
use crate::search::CompiledQuery;
use crate::types::{
    CameraId, FolderId, ImageHashes, ImageId, LensId, PersonId, TagId, ThumbSize,
};

/// Read/write access to image, folder, hash and tag records.
pub trait ImageStore: Send + Sync {
    fn get_image(&self, id: ImageId) -> StoreResult<Option<ImageRecord>>;

    /// Insert or refresh the record for a file path; the folder, camera and
    /// lens rows are created on first sight.
    fn register_image(&self, image: &NewImage) -> StoreResult<ImageId>;

    fn upsert_hash(&self, id: ImageId, hashes: &ImageHashes) -> StoreResult<()>;

    fn get_hash(&self, id: ImageId) -> StoreResult<Option<HashRecord>>;

    /// Hashes for a batch of images; images without hashes are omitted.
    fn get_hashes(&self, ids: &[ImageId]) -> StoreResult<Vec<HashRecord>>;

    /// Record which thumbnail sizes now exist for an image.
    fn upsert_thumbnail_state(&self, id: ImageId, sizes: &[ThumbSize]) -> StoreResult<()>;

    /// Ids matching every filter, ordered, after skipping `skip` rows.
    fn query_images(
        &self,
        query: &CompiledQuery,
        skip: usize,
        take: usize,
    ) -> StoreResult<Vec<ImageId>>;

    fn get_folder_path(&self, id: FolderId) -> StoreResult<Option<String>>;

    fn get_tag(&self, id: TagId) -> StoreResult<Option<TagRecord>>;

    fn get_person(&self, id: PersonId) -> StoreResult<Option<PersonRecord>>;

    fn get_camera(&self, id: CameraId) -> StoreResult<Option<CameraRecord>>;

    fn get_lens(&self, id: LensId) -> StoreResult<Option<LensRecord>>;
}

/// Catalog edits made by collaborators (tagging UI, face recognition).
pub trait AnnotationStore {
    /// Get or create a keyword.
    fn add_tag(&self, keyword: &str) -> StoreResult<TagId>;

    /// Attach a user keyword.
    fn tag_image(&self, image: ImageId, tag: TagId) -> StoreResult<()>;

    /// Attach a detected-object keyword.
    fn tag_object(&self, image: ImageId, tag: TagId) -> StoreResult<()>;

    /// Get or create a person.
    fn add_person(&self, name: &str) -> StoreResult<PersonId>;

    /// Record a detected face, optionally identified.
    fn add_face(&self, image: ImageId, person: Option<PersonId>) -> StoreResult<()>;

    fn set_caption(&self, image: ImageId, caption: &str) -> StoreResult<()>;

    fn set_rating(&self, image: ImageId, rating: u8) -> StoreResult<()>;
}

/// Folder key of a file: its parent directory as a string.
pub(crate) fn folder_key(path: &std::path::Path) -> String {
    path.parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// True when `path` is `root` or lies underneath it.
pub(crate) fn in_folder_tree(path: &str, root: &str) -> bool {
    let root = root.trim_end_matches(std::path::MAIN_SEPARATOR);
    path == root
        || path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with(std::path::MAIN_SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_folder_tree() {
        let sep = std::path::MAIN_SEPARATOR;
        let root = format!("{sep}photos{sep}2021");
        assert!(in_folder_tree(&root, &root));
        assert!(in_folder_tree(&format!("{root}{sep}summer"), &root));
        assert!(!in_folder_tree(&format!("{root}-archive"), &root));
        assert!(!in_folder_tree(&format!("{sep}photos"), &root));
    }
}
