//! Session-scoped search with incremental page caching.

use std::sync::Arc;

use super::compiler::{CompiledQuery, MatchCursor, SearchCompiler, SearchPage};
use super::query::SearchQuery;
use crate::error::StoreResult;
use crate::store::ImageStore;

/// Owns one user's query and the results fetched for it so far.
///
/// Changing the query drops the cache. Page requests that overlap cached
/// rows only fetch the uncached tail.
pub struct SearchService {
    store: Arc<dyn ImageStore>,
    query: SearchQuery,
    compiled: Option<CompiledQuery>,
    cursor: MatchCursor,
}

impl SearchService {
    pub fn new(store: Arc<dyn ImageStore>, query: SearchQuery) -> Self {
        Self {
            store,
            query,
            compiled: None,
            cursor: MatchCursor::default(),
        }
    }

    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    /// Replace the query and invalidate cached results.
    pub fn set_query(&mut self, query: SearchQuery) {
        self.query = query;
        self.invalidate();
    }

    /// Mutate the query in place and invalidate cached results.
    pub fn update(&mut self, edit: impl FnOnce(&mut SearchQuery)) {
        edit(&mut self.query);
        self.invalidate();
    }

    pub fn invalidate(&mut self) {
        self.compiled = None;
        self.cursor = MatchCursor::default();
    }

    /// Number of result ids held in the cache.
    pub fn cached_len(&self) -> usize {
        self.cursor.ids.len()
    }

    /// Page `[first, first + count)`. Failures are logged and produce an
    /// empty page.
    pub fn get_page(&mut self, first: usize, count: usize) -> SearchPage {
        match self.try_get_page(first, count) {
            Ok(page) => page,
            Err(e) => {
                tracing::error!("Search failed for {:?}: {e}", self.query.search_text);
                SearchPage::default()
            }
        }
    }

    fn try_get_page(&mut self, first: usize, count: usize) -> StoreResult<SearchPage> {
        let compiled = match self.compiled.take() {
            Some(compiled) => compiled,
            None => SearchCompiler::compile(self.store.as_ref(), &self.query)?,
        };
        let filled = self
            .cursor
            .fill(self.store.as_ref(), &compiled, first.saturating_add(count));
        self.compiled = Some(compiled);
        filled?;

        tracing::debug!(
            "Search page {}+{} ({} cached, exhausted: {})",
            first,
            count,
            self.cursor.ids.len(),
            self.cursor.is_exhausted()
        );
        Ok(self.cursor.page(first, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, StoreResult};
    use crate::search::CompiledQuery;
    use crate::store::{
        CameraRecord, HashRecord, ImageRecord, LensRecord, MemoryStore, NewImage, PersonRecord,
        TagRecord,
    };
    use crate::types::*;
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts rows requested from the wrapped store.
    struct Counting {
        inner: MemoryStore,
        rows_requested: AtomicUsize,
        fail: bool,
    }

    impl ImageStore for Counting {
        fn get_image(&self, id: ImageId) -> StoreResult<Option<ImageRecord>> {
            self.inner.get_image(id)
        }
        fn register_image(&self, image: &NewImage) -> StoreResult<ImageId> {
            self.inner.register_image(image)
        }
        fn upsert_hash(&self, id: ImageId, hashes: &ImageHashes) -> StoreResult<()> {
            self.inner.upsert_hash(id, hashes)
        }
        fn get_hash(&self, id: ImageId) -> StoreResult<Option<HashRecord>> {
            self.inner.get_hash(id)
        }
        fn get_hashes(&self, ids: &[ImageId]) -> StoreResult<Vec<HashRecord>> {
            self.inner.get_hashes(ids)
        }
        fn upsert_thumbnail_state(&self, id: ImageId, sizes: &[ThumbSize]) -> StoreResult<()> {
            self.inner.upsert_thumbnail_state(id, sizes)
        }
        fn query_images(
            &self,
            query: &CompiledQuery,
            skip: usize,
            take: usize,
        ) -> StoreResult<Vec<ImageId>> {
            if self.fail {
                return Err(StoreError::Corrupt {
                    field: "images",
                    value: "unreadable".to_string(),
                });
            }
            self.rows_requested.fetch_add(take, Ordering::SeqCst);
            self.inner.query_images(query, skip, take)
        }
        fn get_folder_path(&self, id: FolderId) -> StoreResult<Option<String>> {
            self.inner.get_folder_path(id)
        }
        fn get_tag(&self, id: TagId) -> StoreResult<Option<TagRecord>> {
            self.inner.get_tag(id)
        }
        fn get_person(&self, id: PersonId) -> StoreResult<Option<PersonRecord>> {
            self.inner.get_person(id)
        }
        fn get_camera(&self, id: CameraId) -> StoreResult<Option<CameraRecord>> {
            self.inner.get_camera(id)
        }
        fn get_lens(&self, id: LensId) -> StoreResult<Option<LensRecord>> {
            self.inner.get_lens(id)
        }
    }

    fn store(images: usize, fail: bool) -> Arc<Counting> {
        let inner = MemoryStore::new();
        let modified = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        for i in 0..images {
            inner
                .register_image(&NewImage {
                    path: PathBuf::from(format!("/p/{i}.jpg")),
                    file_size: 10,
                    modified_at: modified + chrono::Duration::minutes(i as i64),
                    exif: ExifData::default(),
                })
                .unwrap();
        }
        Arc::new(Counting {
            inner,
            rows_requested: AtomicUsize::new(0),
            fail,
        })
    }

    #[test]
    fn test_overlapping_pages_fetch_only_remainder() {
        let store = store(250, false);
        let mut service = SearchService::new(store.clone(), SearchQuery::default());

        let first = service.get_page(0, 100);
        assert_eq!(first.ids.len(), 100);
        assert_eq!(store.rows_requested.load(Ordering::SeqCst), 100);

        // overlaps rows 50..100 already cached
        let overlap = service.get_page(50, 100);
        assert_eq!(overlap.ids[..50], first.ids[50..]);
        assert_eq!(store.rows_requested.load(Ordering::SeqCst), 150);

        let cached = service.get_page(0, 100);
        assert_eq!(cached, first);
        assert_eq!(store.rows_requested.load(Ordering::SeqCst), 150);

        let last = service.get_page(200, 100);
        assert_eq!((last.ids.len(), last.has_more), (50, false));
    }

    #[test]
    fn test_query_change_clears_cache() {
        let store = store(30, false);
        let mut service = SearchService::new(store.clone(), SearchQuery::default());
        service.get_page(0, 20);
        assert_eq!(service.cached_len(), 20);

        service.update(|q| q.min_rating = Some(3));
        assert_eq!(service.cached_len(), 0);
        assert!(service.get_page(0, 20).ids.is_empty());
    }

    #[test]
    fn test_store_failure_yields_empty_page() {
        let store = store(5, true);
        let mut service = SearchService::new(store, SearchQuery::default());
        let page = service.get_page(0, 10);
        assert!(page.ids.is_empty());
        assert!(!page.has_more);
    }
}
