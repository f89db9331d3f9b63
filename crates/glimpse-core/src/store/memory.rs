//! In-process store that evaluates compiled filters directly.

use chrono::Datelike;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::records::*;
use super::{folder_key, in_folder_tree, AnnotationStore, ImageStore};
use crate::error::{StoreError, StoreResult};
use crate::search::{CompiledQuery, FaceSearchMode, Filter, OrientationFilter};
use crate::types::{
    CameraId, FolderId, ImageHashes, ImageId, LensId, PersonId, TagId, ThumbSize,
};

#[derive(Default)]
struct Data {
    images: BTreeMap<ImageId, ImageRecord>,
    paths: HashMap<String, ImageId>,
    folders: BTreeMap<FolderId, FolderRecord>,
    cameras: BTreeMap<CameraId, CameraRecord>,
    lenses: BTreeMap<LensId, LensRecord>,
    tags: BTreeMap<TagId, TagRecord>,
    people: BTreeMap<PersonId, PersonRecord>,
    hashes: HashMap<ImageId, HashRecord>,
    image_tags: BTreeSet<(ImageId, TagId)>,
    object_tags: BTreeSet<(ImageId, TagId)>,
    faces: Vec<(ImageId, Option<PersonId>)>,
    next_id: i64,
}

impl Data {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn folder_for(&mut self, path: String) -> FolderId {
        if let Some(f) = self.folders.values().find(|f| f.path == path) {
            return f.id;
        }
        let id = FolderId(self.next_id());
        self.folders.insert(id, FolderRecord { id, path });
        id
    }

    fn camera_for(&mut self, (make, model): (String, String)) -> CameraId {
        if let Some(c) = self
            .cameras
            .values()
            .find(|c| c.make == make && c.model == model)
        {
            return c.id;
        }
        let id = CameraId(self.next_id());
        self.cameras.insert(id, CameraRecord { id, make, model });
        id
    }

    fn lens_for(&mut self, (make, model): (String, String)) -> LensId {
        if let Some(l) = self
            .lenses
            .values()
            .find(|l| l.make == make && l.model == model)
        {
            return l.id;
        }
        let id = LensId(self.next_id());
        self.lenses.insert(id, LensRecord { id, make, model });
        id
    }

    fn image_mut(&mut self, id: ImageId) -> StoreResult<&mut ImageRecord> {
        self.images
            .get_mut(&id)
            .ok_or(StoreError::NotFound { kind: "image", id: id.0 })
    }

    fn folder_path(&self, image: &ImageRecord) -> &str {
        self.folders
            .get(&image.folder_id)
            .map(|f| f.path.as_str())
            .unwrap_or_default()
    }

    fn keywords(&self, set: &BTreeSet<(ImageId, TagId)>, image: ImageId) -> Vec<&str> {
        set.range((image, TagId(i64::MIN))..=(image, TagId(i64::MAX)))
            .filter_map(|(_, tag)| self.tags.get(tag).map(|t| t.keyword.as_str()))
            .collect()
    }

    fn has_tag(&self, set: &BTreeSet<(ImageId, TagId)>, image: ImageId) -> bool {
        set.range((image, TagId(i64::MIN))..=(image, TagId(i64::MAX)))
            .next()
            .is_some()
    }

    fn text_fields(&self, image: &ImageRecord, include_objects: bool, tags_only: bool) -> Vec<String> {
        let mut fields: Vec<String> = self
            .keywords(&self.image_tags, image.id)
            .into_iter()
            .map(str::to_string)
            .collect();
        if include_objects {
            fields.extend(self.keywords(&self.object_tags, image.id).into_iter().map(str::to_string));
        }
        if !tags_only {
            fields.extend(
                self.faces
                    .iter()
                    .filter(|(i, _)| *i == image.id)
                    .filter_map(|(_, p)| p.and_then(|p| self.people.get(&p)))
                    .map(|p| p.name.clone()),
            );
            fields.extend(image.caption.clone());
        }
        fields
    }

    fn matches(&self, image: &ImageRecord, filter: &Filter) -> bool {
        match filter {
            Filter::Text {
                terms,
                raw,
                include_objects,
                tags_only,
            } => {
                let words: Vec<String> = self
                    .text_fields(image, *include_objects, *tags_only)
                    .iter()
                    .flat_map(|f| index_words(f))
                    .collect();
                let indexed = terms.iter().flat_map(|t| index_words(t)).all(|t| {
                    words.iter().any(|w| w.starts_with(t.as_str()))
                });
                if indexed || *tags_only {
                    return indexed;
                }
                let needle = raw.to_lowercase();
                image.filename.to_lowercase().contains(&needle)
                    || self.folder_path(image).to_lowercase().contains(&needle)
            }
            Filter::Tag {
                id,
                include_objects,
            } => {
                self.image_tags.contains(&(image.id, *id))
                    || (*include_objects && self.object_tags.contains(&(image.id, *id)))
            }
            Filter::Untagged => !self.has_tag(&self.image_tags, image.id),
            Filter::Folder(id) => image.folder_id == *id,
            Filter::FolderTree { path } => in_folder_tree(self.folder_path(image), path),
            Filter::DateRange { from, to } => (*from..=*to).contains(&image.sort_date()),
            Filter::FileSize { min_kb, max_kb } => {
                min_kb.map_or(true, |min| image.file_size >= min.saturating_mul(1024))
                    && max_kb.map_or(true, |max| image.file_size <= max.saturating_mul(1024))
            }
            Filter::MinRating(rating) => image.rating >= *rating,
            Filter::Month(month) => image.sort_date().month() == *month,
            Filter::Orientation(orientation) => match (image.width, image.height) {
                (Some(w), Some(h)) => match orientation {
                    OrientationFilter::Landscape => w > h,
                    OrientationFilter::Portrait => w <= h,
                },
                _ => false,
            },
            Filter::Camera(id) => image.camera_id == Some(*id),
            Filter::Lens(id) => image.lens_id == Some(*id),
            Filter::Faces(mode) => {
                let mut faces = self.faces.iter().filter(|(i, _)| *i == image.id);
                match mode {
                    FaceSearchMode::HasFaces => faces.next().is_some(),
                    FaceSearchMode::NoFaces => faces.next().is_none(),
                    FaceSearchMode::Unidentified => faces.any(|(_, p)| p.is_none()),
                    FaceSearchMode::Identified => faces.any(|(_, p)| p.is_some()),
                }
            }
            Filter::Person(person) => self
                .faces
                .iter()
                .any(|(i, p)| *i == image.id && *p == Some(*person)),
            Filter::SimilarCandidates {
                exclude,
                prefixes,
                suffixes,
            } => {
                image.id != *exclude
                    && self
                        .hashes
                        .get(&image.id)
                        .and_then(|h| h.phash_parts.as_ref())
                        .is_some_and(|parts| {
                            parts.iter().zip(prefixes.iter().zip(suffixes)).any(
                                |(part, (prefix, suffix))| {
                                    part.starts_with(prefix.as_str())
                                        || part.ends_with(suffix.as_str())
                                },
                            )
                        })
            }
        }
    }
}

/// Lowercase alphanumeric runs, the way the FTS tokenizer splits text.
fn index_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Thread-safe in-memory catalog, for tests and embedding without SQLite.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<Data>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Data> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Data> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn image_count(&self) -> usize {
        self.read().images.len()
    }
}

impl ImageStore for MemoryStore {
    fn get_image(&self, id: ImageId) -> StoreResult<Option<ImageRecord>> {
        Ok(self.read().images.get(&id).cloned())
    }

    fn register_image(&self, image: &NewImage) -> StoreResult<ImageId> {
        let mut data = self.write();
        let folder_id = data.folder_for(folder_key(&image.path));
        let camera_id = image.camera().map(|c| data.camera_for(c));
        let lens_id = image.lens().map(|l| data.lens_for(l));
        let (width, height) = image.display_dimensions();

        let key = image.path.to_string_lossy().into_owned();
        let existing = data.paths.get(&key).copied();
        let id = match existing {
            Some(id) => id,
            None => {
                let id = ImageId(data.next_id());
                data.paths.insert(key, id);
                id
            }
        };
        let previous = data.images.get(&id).cloned();

        data.images.insert(
            id,
            ImageRecord {
                id,
                folder_id,
                filename: image
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                path: image.path.clone(),
                file_size: image.file_size,
                width,
                height,
                taken_at: image.exif.taken_at,
                modified_at: image.modified_at,
                camera_id,
                lens_id,
                rating: previous.as_ref().map_or(0, |p| p.rating),
                caption: previous.as_ref().and_then(|p| p.caption.clone()),
                thumb_sizes: previous.map(|p| p.thumb_sizes).unwrap_or_default(),
            },
        );
        Ok(id)
    }

    fn upsert_hash(&self, id: ImageId, hashes: &ImageHashes) -> StoreResult<()> {
        let mut data = self.write();
        data.image_mut(id)?;
        data.hashes.insert(
            id,
            HashRecord {
                image_id: id,
                content_hash: hashes.content_hash.clone(),
                phash_parts: hashes.perceptual.map(|p| p.parts()),
            },
        );
        Ok(())
    }

    fn get_hash(&self, id: ImageId) -> StoreResult<Option<HashRecord>> {
        Ok(self.read().hashes.get(&id).cloned())
    }

    fn get_hashes(&self, ids: &[ImageId]) -> StoreResult<Vec<HashRecord>> {
        let data = self.read();
        Ok(ids.iter().filter_map(|id| data.hashes.get(id).cloned()).collect())
    }

    fn upsert_thumbnail_state(&self, id: ImageId, sizes: &[ThumbSize]) -> StoreResult<()> {
        let mut data = self.write();
        let image = data.image_mut(id)?;
        image.thumb_sizes = sizes.to_vec();
        image.thumb_sizes.sort();
        image.thumb_sizes.dedup();
        Ok(())
    }

    fn query_images(
        &self,
        query: &CompiledQuery,
        skip: usize,
        take: usize,
    ) -> StoreResult<Vec<ImageId>> {
        let data = self.read();
        let mut matched: Vec<&ImageRecord> = data
            .images
            .values()
            .filter(|image| query.filters.iter().all(|f| data.matches(image, f)))
            .collect();

        let order = query.order;
        matched.sort_by(|a, b| {
            let folder = match order.folder {
                Some(direction) => direction.apply(data.folder_path(a).cmp(data.folder_path(b))),
                None => Ordering::Equal,
            };
            folder.then_with(|| {
                order
                    .date
                    .apply(a.sort_date().cmp(&b.sort_date()).then(a.id.cmp(&b.id)))
            })
        });

        Ok(matched.into_iter().skip(skip).take(take).map(|i| i.id).collect())
    }

    fn get_folder_path(&self, id: FolderId) -> StoreResult<Option<String>> {
        Ok(self.read().folders.get(&id).map(|f| f.path.clone()))
    }

    fn get_tag(&self, id: TagId) -> StoreResult<Option<TagRecord>> {
        Ok(self.read().tags.get(&id).cloned())
    }

    fn get_person(&self, id: PersonId) -> StoreResult<Option<PersonRecord>> {
        Ok(self.read().people.get(&id).cloned())
    }

    fn get_camera(&self, id: CameraId) -> StoreResult<Option<CameraRecord>> {
        Ok(self.read().cameras.get(&id).cloned())
    }

    fn get_lens(&self, id: LensId) -> StoreResult<Option<LensRecord>> {
        Ok(self.read().lenses.get(&id).cloned())
    }
}

impl AnnotationStore for MemoryStore {
    fn add_tag(&self, keyword: &str) -> StoreResult<TagId> {
        let mut data = self.write();
        if let Some(t) = data.tags.values().find(|t| t.keyword == keyword) {
            return Ok(t.id);
        }
        let id = TagId(data.next_id());
        data.tags.insert(
            id,
            TagRecord {
                id,
                keyword: keyword.to_string(),
            },
        );
        Ok(id)
    }

    fn tag_image(&self, image: ImageId, tag: TagId) -> StoreResult<()> {
        let mut data = self.write();
        data.image_mut(image)?;
        data.image_tags.insert((image, tag));
        Ok(())
    }

    fn tag_object(&self, image: ImageId, tag: TagId) -> StoreResult<()> {
        let mut data = self.write();
        data.image_mut(image)?;
        data.object_tags.insert((image, tag));
        Ok(())
    }

    fn add_person(&self, name: &str) -> StoreResult<PersonId> {
        let mut data = self.write();
        if let Some(p) = data.people.values().find(|p| p.name == name) {
            return Ok(p.id);
        }
        let id = PersonId(data.next_id());
        data.people.insert(
            id,
            PersonRecord {
                id,
                name: name.to_string(),
            },
        );
        Ok(id)
    }

    fn add_face(&self, image: ImageId, person: Option<PersonId>) -> StoreResult<()> {
        let mut data = self.write();
        data.image_mut(image)?;
        data.faces.push((image, person));
        Ok(())
    }

    fn set_caption(&self, image: ImageId, caption: &str) -> StoreResult<()> {
        self.write().image_mut(image)?.caption = Some(caption.to_string());
        Ok(())
    }

    fn set_rating(&self, image: ImageId, rating: u8) -> StoreResult<()> {
        self.write().image_mut(image)?.rating = rating;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{SearchCompiler, SearchQuery, SortOrder};
    use crate::types::ExifData;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn day(d: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 6, d)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn image(path: &str, d: u32, exif: ExifData) -> NewImage {
        NewImage {
            path: PathBuf::from(path),
            file_size: 2048,
            modified_at: day(d),
            exif,
        }
    }

    fn search(store: &MemoryStore, query: &SearchQuery) -> Vec<ImageId> {
        SearchCompiler::search(store, query, 0, 100).unwrap().ids
    }

    #[test]
    fn test_register_is_upsert_by_path() {
        let store = MemoryStore::new();
        let first = store.register_image(&image("/a/x.jpg", 1, ExifData::default())).unwrap();
        store.set_rating(first, 4).unwrap();
        let again = store.register_image(&image("/a/x.jpg", 2, ExifData::default())).unwrap();

        assert_eq!(first, again);
        assert_eq!(store.image_count(), 1);
        let record = store.get_image(first).unwrap().unwrap();
        assert_eq!(record.rating, 4);
        assert_eq!(record.modified_at, day(2));
        assert_eq!(record.filename, "x.jpg");
    }

    #[test]
    fn test_camera_and_rotated_dimensions() {
        let store = MemoryStore::new();
        let exif = ExifData {
            camera_make: Some("Fujifilm".into()),
            camera_model: Some("X-T4".into()),
            width: Some(6000),
            height: Some(4000),
            orientation: Some(6),
            ..ExifData::default()
        };
        let id = store.register_image(&image("/a/r.jpg", 1, exif)).unwrap();
        let record = store.get_image(id).unwrap().unwrap();
        assert_eq!((record.width, record.height), (Some(4000), Some(6000)));

        let camera = store.get_camera(record.camera_id.unwrap()).unwrap().unwrap();
        assert_eq!(camera.model, "X-T4");
        assert!(record.lens_id.is_none());

        let query = SearchQuery {
            orientation: Some(OrientationFilter::Portrait),
            ..SearchQuery::default()
        };
        assert_eq!(search(&store, &query), vec![id]);
    }

    #[test]
    fn test_text_matches_tags_captions_and_paths() {
        let store = MemoryStore::new();
        let tagged = store.register_image(&image("/trips/a.jpg", 1, ExifData::default())).unwrap();
        let captioned = store.register_image(&image("/trips/b.jpg", 2, ExifData::default())).unwrap();
        let named = store.register_image(&image("/home/beachday.jpg", 3, ExifData::default())).unwrap();

        let beach = store.add_tag("Beach").unwrap();
        store.tag_image(tagged, beach).unwrap();
        store.set_caption(captioned, "Sunset over the beach").unwrap();

        let mut query = SearchQuery::default().with_text("bea");
        let mut found = search(&store, &query);
        found.sort();
        assert_eq!(found, vec![tagged, captioned, named]);

        query.tags_only = true;
        assert_eq!(search(&store, &query), vec![tagged]);

        // every token has to match
        let query = SearchQuery::default().with_text("beach sunset");
        assert_eq!(search(&store, &query), vec![captioned]);
    }

    #[test]
    fn test_object_tags_respect_include_flag() {
        let store = MemoryStore::new();
        let id = store.register_image(&image("/a/dog.png", 1, ExifData::default())).unwrap();
        let tag = store.add_tag("animal").unwrap();
        store.tag_object(id, tag).unwrap();

        let mut query = SearchQuery {
            tag: Some(tag),
            ..SearchQuery::default()
        };
        assert_eq!(search(&store, &query), vec![id]);
        query.include_object_tags = false;
        assert!(search(&store, &query).is_empty());

        let untagged = SearchQuery {
            untagged_only: true,
            ..SearchQuery::default()
        };
        assert_eq!(search(&store, &untagged), vec![id]);
    }

    #[test]
    fn test_face_modes() {
        let store = MemoryStore::new();
        let none = store.register_image(&image("/f/none.jpg", 1, ExifData::default())).unwrap();
        let unknown = store.register_image(&image("/f/unknown.jpg", 2, ExifData::default())).unwrap();
        let known = store.register_image(&image("/f/known.jpg", 3, ExifData::default())).unwrap();
        let ada = store.add_person("Ada").unwrap();
        store.add_face(unknown, None).unwrap();
        store.add_face(known, Some(ada)).unwrap();

        let by_mode = |mode| {
            let query = SearchQuery {
                face_search: Some(mode),
                sort_order: SortOrder::Ascending,
                ..SearchQuery::default()
            };
            search(&store, &query)
        };
        assert_eq!(by_mode(FaceSearchMode::HasFaces), vec![unknown, known]);
        assert_eq!(by_mode(FaceSearchMode::NoFaces), vec![none]);
        assert_eq!(by_mode(FaceSearchMode::Unidentified), vec![unknown]);
        assert_eq!(by_mode(FaceSearchMode::Identified), vec![known]);

        let query = SearchQuery {
            person: Some(ada),
            ..SearchQuery::default()
        };
        assert_eq!(search(&store, &query), vec![known]);
        assert_eq!(search(&store, &SearchQuery::default().with_text("ada")), vec![known]);
    }

    #[test]
    fn test_rating_size_and_month() {
        let store = MemoryStore::new();
        let small = store.register_image(&image("/s/small.jpg", 1, ExifData::default())).unwrap();
        let mut large = image("/s/large.jpg", 2, ExifData::default());
        large.file_size = 5 * 1024 * 1024;
        let large = store.register_image(&large).unwrap();
        store.set_rating(large, 5).unwrap();

        let query = SearchQuery {
            min_rating: Some(3),
            ..SearchQuery::default()
        };
        assert_eq!(search(&store, &query), vec![large]);

        let query = SearchQuery {
            max_size_kb: Some(2),
            ..SearchQuery::default()
        };
        assert_eq!(search(&store, &query), vec![small]);

        let query = SearchQuery {
            month: Some(7),
            ..SearchQuery::default()
        };
        assert!(search(&store, &query).is_empty());
    }

    #[test]
    fn test_sort_date_prefers_taken_at() {
        let store = MemoryStore::new();
        let old = store
            .register_image(&image(
                "/d/old.jpg",
                20,
                ExifData {
                    taken_at: Some(day(1)),
                    ..ExifData::default()
                },
            ))
            .unwrap();
        let recent = store.register_image(&image("/d/recent.jpg", 10, ExifData::default())).unwrap();
        assert_eq!(search(&store, &SearchQuery::default()), vec![recent, old]);
    }

    #[test]
    fn test_thumbnail_state_requires_image() {
        let store = MemoryStore::new();
        let id = store.register_image(&image("/t/a.jpg", 1, ExifData::default())).unwrap();
        store
            .upsert_thumbnail_state(id, &[ThumbSize::Small, ThumbSize::Big, ThumbSize::Small])
            .unwrap();
        assert_eq!(
            store.get_image(id).unwrap().unwrap().thumb_sizes,
            vec![ThumbSize::Big, ThumbSize::Small]
        );
        assert!(matches!(
            store.upsert_thumbnail_state(ImageId(999), &[]),
            Err(StoreError::NotFound { .. })
        ));
    }
}
