//! Turns a [`SearchQuery`] into an AND of filters plus ordering, and runs it.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::HashMap;

use super::query::{FaceSearchMode, Grouping, OrientationFilter, SearchQuery, SortOrder};
use super::sanitize::{sanitize, tokenize};
use crate::error::{StoreError, StoreResult};
use crate::pipeline::hash::{PerceptualHash, PERCEPTUAL_PARTS};
use crate::store::ImageStore;
use crate::types::{CameraId, FolderId, ImageId, LensId, PersonId, TagId};

/// Raw rows fetched per round while a similarity post-filter thins them out.
const SIMILARITY_BATCH: usize = 500;

/// One independently optional predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every token must prefix-match the text index. Unless `tags_only`,
    /// a filename/folder substring match on `raw` also qualifies.
    Text {
        terms: Vec<String>,
        raw: String,
        include_objects: bool,
        tags_only: bool,
    },
    /// User keyword, or detected object when `include_objects`.
    Tag { id: TagId, include_objects: bool },
    Untagged,
    Folder(FolderId),
    /// The folder at `path` and everything below it.
    FolderTree { path: String },
    /// Inclusive range over the sort date.
    DateRange {
        from: NaiveDateTime,
        to: NaiveDateTime,
    },
    FileSize {
        min_kb: Option<u64>,
        max_kb: Option<u64>,
    },
    MinRating(u8),
    Month(u32),
    Orientation(OrientationFilter),
    Camera(CameraId),
    Lens(LensId),
    Faces(FaceSearchMode),
    Person(PersonId),
    /// Cheap pre-filter: any hash part shares its first or last two hex digits.
    SimilarCandidates {
        exclude: ImageId,
        prefixes: [String; PERCEPTUAL_PARTS],
        suffixes: [String; PERCEPTUAL_PARTS],
    },
}

/// Result ordering. The image id is always the final tie-breaker, in the
/// date direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultOrder {
    /// Folder path first, when grouping by folder
    pub folder: Option<SortOrder>,
    pub date: SortOrder,
}

/// Exact perceptual check applied after the store returns candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityFilter {
    pub reference: PerceptualHash,
    pub threshold: f64,
}

impl SimilarityFilter {
    /// Keep ids whose stored hash is at least `threshold` similar, in order.
    pub fn retain(&self, store: &dyn ImageStore, ids: Vec<ImageId>) -> StoreResult<Vec<ImageId>> {
        if ids.is_empty() {
            return Ok(ids);
        }
        let hashes: HashMap<ImageId, PerceptualHash> = store
            .get_hashes(&ids)?
            .into_iter()
            .filter_map(|h| h.perceptual().map(|p| (h.image_id, p)))
            .collect();
        Ok(ids
            .into_iter()
            .filter(|id| {
                hashes
                    .get(id)
                    .is_some_and(|h| h.similarity(self.reference) >= self.threshold)
            })
            .collect())
    }
}

/// A query ready for a store.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub filters: Vec<Filter>,
    pub order: ResultOrder,
    pub similarity: Option<SimilarityFilter>,
}

impl CompiledQuery {
    /// No filters, newest first.
    pub fn all() -> Self {
        Self {
            filters: Vec::new(),
            order: ResultOrder {
                folder: None,
                date: SortOrder::Descending,
            },
            similarity: None,
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchPage {
    pub ids: Vec<ImageId>,
    /// The page came back full, so more rows may follow
    pub has_more: bool,
}

impl SearchPage {
    pub fn from_ids(ids: Vec<ImageId>, count: usize) -> Self {
        let has_more = count > 0 && ids.len() == count;
        Self { ids, has_more }
    }
}

/// Lowest date the date filter treats as unbounded.
pub fn min_date() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

/// Highest date the date filter treats as unbounded.
pub fn max_date() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .unwrap_or(NaiveDateTime::MAX)
}

/// Incremental reader over a compiled query's matches.
///
/// Tracks the raw store offset separately from the number of accepted ids,
/// since the similarity post-filter drops rows.
#[derive(Debug, Clone, Default)]
pub struct MatchCursor {
    pub ids: Vec<ImageId>,
    raw_offset: usize,
    exhausted: bool,
}

impl MatchCursor {
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetch until at least `target` ids are held or the store runs dry.
    pub fn fill(
        &mut self,
        store: &dyn ImageStore,
        query: &CompiledQuery,
        target: usize,
    ) -> StoreResult<()> {
        while self.ids.len() < target && !self.exhausted {
            let wanted = target - self.ids.len();
            let take = match query.similarity {
                Some(_) => wanted.max(SIMILARITY_BATCH),
                None => wanted,
            };
            let raw = store.query_images(query, self.raw_offset, take)?;
            self.raw_offset += raw.len();
            if raw.len() < take {
                self.exhausted = true;
            }
            let accepted = match &query.similarity {
                Some(similarity) => similarity.retain(store, raw)?,
                None => raw,
            };
            self.ids.extend(accepted);
        }
        Ok(())
    }

    /// The accepted ids in `[first, first + count)`, as far as they exist.
    pub fn page(&self, first: usize, count: usize) -> SearchPage {
        let start = first.min(self.ids.len());
        let end = first.saturating_add(count).min(self.ids.len());
        SearchPage::from_ids(self.ids[start..end].to_vec(), count)
    }
}

pub struct SearchCompiler;

impl SearchCompiler {
    /// Build the filter set. Reads the store for the folder path and the
    /// reference hash of a similarity search.
    pub fn compile(store: &dyn ImageStore, query: &SearchQuery) -> StoreResult<CompiledQuery> {
        let mut filters = Vec::new();

        if let Some(text) = query.search_text.as_deref() {
            let terms = tokenize(text);
            // nothing searchable left: match everything rather than fail
            if !terms.is_empty() {
                filters.push(Filter::Text {
                    terms,
                    raw: sanitize(text),
                    include_objects: query.include_object_tags,
                    tags_only: query.tags_only,
                });
            }
        }

        if let Some(id) = query.tag {
            filters.push(Filter::Tag {
                id,
                include_objects: query.include_object_tags,
            });
        }
        if query.untagged_only {
            filters.push(Filter::Untagged);
        }

        if let Some(folder) = query.folder {
            if query.include_child_folders {
                let path = store.get_folder_path(folder)?.ok_or(StoreError::NotFound {
                    kind: "folder",
                    id: folder.0,
                })?;
                filters.push(Filter::FolderTree { path });
            } else {
                filters.push(Filter::Folder(folder));
            }
        }

        if query.min_date.is_some() || query.max_date.is_some() {
            filters.push(Filter::DateRange {
                from: query.min_date.unwrap_or_else(min_date),
                to: query.max_date.unwrap_or_else(max_date),
            });
        }

        if query.min_size_kb.is_some() || query.max_size_kb.is_some() {
            filters.push(Filter::FileSize {
                min_kb: query.min_size_kb,
                max_kb: query.max_size_kb,
            });
        }

        if let Some(rating) = query.min_rating.filter(|r| *r > 0) {
            filters.push(Filter::MinRating(rating));
        }
        if let Some(month) = query.month {
            filters.push(Filter::Month(month));
        }
        if let Some(orientation) = query.orientation {
            filters.push(Filter::Orientation(orientation));
        }
        if let Some(camera) = query.camera {
            filters.push(Filter::Camera(camera));
        }
        if let Some(lens) = query.lens {
            filters.push(Filter::Lens(lens));
        }
        if let Some(mode) = query.face_search {
            filters.push(Filter::Faces(mode));
        }
        if let Some(person) = query.person {
            filters.push(Filter::Person(person));
        }

        let similarity = match query.similar_to {
            Some(reference_id) => {
                let reference = store
                    .get_hash(reference_id)?
                    .and_then(|h| h.perceptual())
                    .ok_or(StoreError::NotFound {
                        kind: "perceptual hash for image",
                        id: reference_id.0,
                    })?;
                let parts = reference.parts();
                filters.push(Filter::SimilarCandidates {
                    exclude: reference_id,
                    prefixes: parts.clone().map(|p| p[..2].to_string()),
                    suffixes: parts.map(|p| p[2..].to_string()),
                });
                Some(SimilarityFilter {
                    reference,
                    threshold: query.similarity_threshold,
                })
            }
            None => None,
        };

        let order = ResultOrder {
            folder: (query.grouping == Grouping::Folder).then_some(query.folder_sort_order),
            date: query.sort_order,
        };

        Ok(CompiledQuery {
            filters,
            order,
            similarity,
        })
    }

    /// Compile and fetch one page. `has_more` is true when the page is full.
    pub fn search(
        store: &dyn ImageStore,
        query: &SearchQuery,
        first: usize,
        count: usize,
    ) -> StoreResult<SearchPage> {
        let compiled = Self::compile(store, query)?;
        if compiled.similarity.is_none() {
            let ids = store.query_images(&compiled, first, count)?;
            return Ok(SearchPage::from_ids(ids, count));
        }
        let mut cursor = MatchCursor::default();
        cursor.fill(store, &compiled, first.saturating_add(count))?;
        Ok(cursor.page(first, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NewImage};
    use crate::types::{ExifData, ImageHashes};
    use std::path::PathBuf;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 3, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn add(store: &MemoryStore, path: &str, day: u32) -> ImageId {
        store
            .register_image(&NewImage {
                path: PathBuf::from(path),
                file_size: 1024,
                modified_at: at(day),
                exif: ExifData::default(),
            })
            .unwrap()
    }

    #[test]
    fn test_empty_text_after_sanitize_matches_all() {
        let store = MemoryStore::new();
        let query = SearchQuery::default().with_text("';--#");
        let compiled = SearchCompiler::compile(&store, &query).unwrap();
        assert!(compiled.filters.is_empty());
    }

    #[test]
    fn test_compile_text_filter() {
        let store = MemoryStore::new();
        let mut query = SearchQuery::default().with_text("Beach; dog");
        query.tags_only = true;
        let compiled = SearchCompiler::compile(&store, &query).unwrap();
        assert_eq!(
            compiled.filters,
            vec![Filter::Text {
                terms: vec!["beach".to_string(), "dog".to_string()],
                raw: "Beach dog".to_string(),
                include_objects: true,
                tags_only: true,
            }]
        );
    }

    #[test]
    fn test_date_bounds_default() {
        let store = MemoryStore::new();
        let query = SearchQuery {
            min_date: Some(at(2)),
            ..SearchQuery::default()
        };
        let compiled = SearchCompiler::compile(&store, &query).unwrap();
        assert_eq!(
            compiled.filters,
            vec![Filter::DateRange {
                from: at(2),
                to: max_date()
            }]
        );
    }

    #[test]
    fn test_folder_grouping_orders_independently() {
        let store = MemoryStore::new();
        let query = SearchQuery {
            grouping: Grouping::Folder,
            folder_sort_order: SortOrder::Ascending,
            sort_order: SortOrder::Ascending,
            ..SearchQuery::default()
        };
        let compiled = SearchCompiler::compile(&store, &query).unwrap();
        assert_eq!(compiled.order.folder, Some(SortOrder::Ascending));
        assert_eq!(compiled.order.date, SortOrder::Ascending);
    }

    #[test]
    fn test_pagination_has_more() {
        let store = MemoryStore::new();
        for i in 0..250 {
            add(&store, &format!("/p/{i:03}.jpg"), 1 + (i % 28) as u32);
        }
        let query = SearchQuery::default();

        let pages: Vec<SearchPage> = (0..3)
            .map(|p| SearchCompiler::search(&store, &query, p * 100, 100).unwrap())
            .collect();
        assert_eq!(
            pages.iter().map(|p| (p.ids.len(), p.has_more)).collect::<Vec<_>>(),
            vec![(100, true), (100, true), (50, false)]
        );

        let mut all: Vec<ImageId> = pages.into_iter().flat_map(|p| p.ids).collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 250);
    }

    #[test]
    fn test_similarity_threshold() {
        let store = MemoryStore::new();
        let reference = add(&store, "/p/ref.jpg", 1);
        let candidate = add(&store, "/p/near.jpg", 2);
        let unrelated = add(&store, "/p/far.jpg", 3);

        let base = PerceptualHash(0xf0f0_f0f0_f0f0_f0f0);
        let near = PerceptualHash(base.0 ^ 0b11_0100_1001_0000_0001);
        for (id, hash) in [
            (reference, base),
            (candidate, near),
            (unrelated, PerceptualHash(!base.0)),
        ] {
            store
                .upsert_hash(
                    id,
                    &ImageHashes {
                        content_hash: format!("c{id}"),
                        perceptual: Some(hash),
                    },
                )
                .unwrap();
        }
        assert!((base.similarity(near) - 0.906).abs() < 0.001);

        let loose = SearchQuery::default().similar_to(reference, 0.75);
        let page = SearchCompiler::search(&store, &loose, 0, 10).unwrap();
        assert_eq!(page.ids, vec![candidate]);

        let strict = SearchQuery::default().similar_to(reference, 0.95);
        let page = SearchCompiler::search(&store, &strict, 0, 10).unwrap();
        assert!(page.ids.is_empty());
        assert!(!page.has_more);
    }

    #[test]
    fn test_similarity_without_reference_hash() {
        let store = MemoryStore::new();
        let id = add(&store, "/p/a.jpg", 1);
        let query = SearchQuery::default().similar_to(id, 0.75);
        assert!(matches!(
            SearchCompiler::search(&store, &query, 0, 10),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_child_folders_resolve_path() {
        let store = MemoryStore::new();
        let id = add(&store, "/p/2022/a.jpg", 1);
        add(&store, "/p/2022/march/b.jpg", 2);
        add(&store, "/q/c.jpg", 3);
        let folder = store.get_image(id).unwrap().unwrap().folder_id;

        let query = SearchQuery {
            folder: Some(folder),
            include_child_folders: true,
            ..SearchQuery::default()
        };
        let page = SearchCompiler::search(&store, &query, 0, 10).unwrap();
        assert_eq!(page.ids.len(), 2);
    }
}
