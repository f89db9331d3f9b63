//! The user-facing search query.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::types::{CameraId, FolderId, ImageId, LensId, PersonId, TagId};

/// How results are grouped for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    #[default]
    None,
    Date,
    Folder,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    pub fn sql(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }

    /// Apply this direction to an ascending comparison.
    pub fn apply(self, ordering: std::cmp::Ordering) -> std::cmp::Ordering {
        match self {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

/// Landscape is strictly wider than tall; everything else is portrait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrientationFilter {
    Landscape,
    Portrait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceSearchMode {
    HasFaces,
    NoFaces,
    /// At least one face not assigned to a person
    Unidentified,
    /// At least one face assigned to a person
    Identified,
}

/// Every optional filter a search can combine. Unset fields do not filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub search_text: Option<String>,
    /// Match text against tags only, not captions, people or file paths
    pub tags_only: bool,
    pub include_object_tags: bool,
    pub tag: Option<TagId>,
    pub untagged_only: bool,
    pub person: Option<PersonId>,
    pub folder: Option<FolderId>,
    pub include_child_folders: bool,
    pub camera: Option<CameraId>,
    pub lens: Option<LensId>,
    pub min_date: Option<NaiveDateTime>,
    pub max_date: Option<NaiveDateTime>,
    pub min_size_kb: Option<u64>,
    pub max_size_kb: Option<u64>,
    pub min_rating: Option<u8>,
    /// Month of year, 1-12
    pub month: Option<u32>,
    pub orientation: Option<OrientationFilter>,
    pub face_search: Option<FaceSearchMode>,
    pub similar_to: Option<ImageId>,
    /// Minimum perceptual similarity (0.0-1.0) for `similar_to`
    pub similarity_threshold: f64,
    pub grouping: Grouping,
    pub sort_order: SortOrder,
    /// Folder-path direction when grouping by folder; independent of `sort_order`
    pub folder_sort_order: SortOrder,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            search_text: None,
            tags_only: false,
            include_object_tags: true,
            tag: None,
            untagged_only: false,
            person: None,
            folder: None,
            include_child_folders: false,
            camera: None,
            lens: None,
            min_date: None,
            max_date: None,
            min_size_kb: None,
            max_size_kb: None,
            min_rating: None,
            month: None,
            orientation: None,
            face_search: None,
            similar_to: None,
            similarity_threshold: 0.75,
            grouping: Grouping::None,
            sort_order: SortOrder::Descending,
            folder_sort_order: SortOrder::Ascending,
        }
    }
}

impl SearchQuery {
    /// Defaults taken from the `[search]` config section.
    pub fn from_config(config: &crate::config::SearchConfig) -> Self {
        Self {
            similarity_threshold: config.similarity_threshold,
            include_object_tags: config.include_object_tags,
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.search_text = Some(text.into());
        self
    }

    pub fn similar_to(mut self, image: ImageId, threshold: f64) -> Self {
        self.similar_to = Some(image);
        self.similarity_threshold = threshold;
        self
    }
}
