//! The `glimpse search` command: compile a query and print one page as JSON.

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Args, ValueEnum};
use glimpse_core::search::{FaceSearchMode, Grouping, OrientationFilter, SortOrder};
use glimpse_core::store::ImageRecord;
use glimpse_core::types::{CameraId, FolderId, ImageId, LensId, PersonId, TagId};
use glimpse_core::{Config, ImageStore, SearchQuery, SearchService};
use serde::Serialize;

/// Arguments for the `search` command.
#[derive(Args, Debug, Default)]
pub struct SearchArgs {
    /// Free text matched against keywords, captions, people and file paths
    pub text: Option<String>,

    /// Match text against keywords only
    #[arg(long)]
    pub tags_only: bool,

    /// Ignore detected-object keywords
    #[arg(long)]
    pub no_objects: bool,

    /// Keyword id
    #[arg(long)]
    pub tag: Option<i64>,

    /// Only images without keywords
    #[arg(long, conflicts_with = "tag")]
    pub untagged: bool,

    /// Person id
    #[arg(long)]
    pub person: Option<i64>,

    /// Folder id
    #[arg(long)]
    pub folder: Option<i64>,

    /// Include subfolders of --folder
    #[arg(long, requires = "folder")]
    pub children: bool,

    #[arg(long)]
    pub camera: Option<i64>,

    #[arg(long)]
    pub lens: Option<i64>,

    /// Earliest date, `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`
    #[arg(long, value_parser = parse_date)]
    pub from: Option<NaiveDateTime>,

    /// Latest date; a bare day includes the whole day
    #[arg(long, value_parser = parse_end_date)]
    pub to: Option<NaiveDateTime>,

    #[arg(long)]
    pub min_size_kb: Option<u64>,

    #[arg(long)]
    pub max_size_kb: Option<u64>,

    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=5))]
    pub min_rating: Option<u8>,

    /// Month of year (1-12), any year
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    pub month: Option<u32>,

    #[arg(long, value_enum)]
    pub orientation: Option<OrientationArg>,

    #[arg(long, value_enum)]
    pub faces: Option<FacesArg>,

    /// Image id to find visually similar images for
    #[arg(long)]
    pub similar_to: Option<i64>,

    /// Similarity threshold (0.0-1.0); defaults to the config value
    #[arg(long, requires = "similar_to")]
    pub threshold: Option<f64>,

    /// Group by folder path before date
    #[arg(long)]
    pub by_folder: bool,

    /// Oldest first
    #[arg(long)]
    pub ascending: bool,

    /// Page number, starting at 1
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub page: u64,

    /// Results per page; defaults to the config value
    #[arg(long)]
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OrientationArg {
    Landscape,
    Portrait,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FacesArg {
    Any,
    None,
    Unidentified,
    Identified,
}

#[derive(Serialize)]
struct SearchOutput {
    page: u64,
    page_size: usize,
    has_more: bool,
    images: Vec<ImageRecord>,
}

pub async fn execute(args: SearchArgs, config: Config) -> anyhow::Result<()> {
    let store = super::open_store(&config)?;
    let page_size = args.page_size.unwrap_or(config.search.page_size).max(1);
    let query = build_query(&args, &config);
    tracing::debug!("Search query: {:?}", query);

    let first = usize::try_from(args.page - 1)
        .context("page out of range")?
        .saturating_mul(page_size);
    let mut session = SearchService::new(store.clone(), query);
    let page = session.get_page(first, page_size);

    let mut images = Vec::with_capacity(page.ids.len());
    for id in &page.ids {
        if let Some(record) = store.get_image(*id)? {
            images.push(record);
        }
    }
    let output = SearchOutput {
        page: args.page,
        page_size,
        has_more: page.has_more,
        images,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn build_query(args: &SearchArgs, config: &Config) -> SearchQuery {
    let mut query = SearchQuery::from_config(&config.search);
    query.search_text = args.text.clone();
    query.tags_only = args.tags_only;
    if args.no_objects {
        query.include_object_tags = false;
    }
    query.tag = args.tag.map(TagId);
    query.untagged_only = args.untagged;
    query.person = args.person.map(PersonId);
    query.folder = args.folder.map(FolderId);
    query.include_child_folders = args.children;
    query.camera = args.camera.map(CameraId);
    query.lens = args.lens.map(LensId);
    query.min_date = args.from;
    query.max_date = args.to;
    query.min_size_kb = args.min_size_kb;
    query.max_size_kb = args.max_size_kb;
    query.min_rating = args.min_rating;
    query.month = args.month;
    query.orientation = args.orientation.map(|o| match o {
        OrientationArg::Landscape => OrientationFilter::Landscape,
        OrientationArg::Portrait => OrientationFilter::Portrait,
    });
    query.face_search = args.faces.map(|f| match f {
        FacesArg::Any => FaceSearchMode::HasFaces,
        FacesArg::None => FaceSearchMode::NoFaces,
        FacesArg::Unidentified => FaceSearchMode::Unidentified,
        FacesArg::Identified => FaceSearchMode::Identified,
    });
    query.similar_to = args.similar_to.map(ImageId);
    if let Some(threshold) = args.threshold {
        query.similarity_threshold = threshold.clamp(0.0, 1.0);
    }
    if args.by_folder {
        query.grouping = Grouping::Folder;
    }
    if args.ascending {
        query.sort_order = SortOrder::Ascending;
    }
    query
}

fn parse_date(value: &str) -> Result<NaiveDateTime, String> {
    parse_datetime(value, (0, 0, 0))
}

fn parse_end_date(value: &str) -> Result<NaiveDateTime, String> {
    parse_datetime(value, (23, 59, 59))
}

fn parse_datetime(value: &str, (h, m, s): (u32, u32, u32)) -> Result<NaiveDateTime, String> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(h, m, s))
        .ok_or_else(|| format!("invalid date `{value}`, expected YYYY-MM-DD"))
}
