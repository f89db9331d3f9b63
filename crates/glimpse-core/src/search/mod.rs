//! Search: query model, sanitization, compilation and paging.

pub mod compiler;
pub mod query;
pub mod sanitize;
pub mod service;
pub mod sql;

pub use compiler::{
    CompiledQuery, Filter, MatchCursor, ResultOrder, SearchCompiler, SearchPage, SimilarityFilter,
};
pub use query::{FaceSearchMode, Grouping, OrientationFilter, SearchQuery, SortOrder};
pub use sanitize::{sanitize, tokenize};
pub use service::SearchService;
pub use sql::{render, SqlQuery};
