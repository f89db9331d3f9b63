//! Glimpse Core - image indexing library for a photo manager.
//!
//! Glimpse turns a folder of photos into a searchable catalog: thumbnails in
//! several sizes, content and perceptual hashes, and a query compiler over the
//! stored metadata.
//!
//! # Architecture
//!
//! ```text
//! Scan → Register → Queue → Worker (validate → processor → thumbnails → hash) → Store
//!                                                                              ↓
//!                                         SearchQuery → SearchCompiler → ids page
//! ```
//!
//! Image backends sit behind the [`ImageProcessor`] trait and are picked per
//! file extension by the [`ProcessorFactory`]. Persistence sits behind
//! [`ImageStore`]; [`SqliteStore`] and [`MemoryStore`] ship with the crate.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use glimpse_core::{Config, FolderScanner, IndexingService, ProcessorFactory, SqliteStore, ToolProbe};
//!
//! #[tokio::main]
//! async fn main() -> glimpse_core::Result<()> {
//!     let config = Config::load()?;
//!     let store = Arc::new(SqliteStore::open(&config.database_path())?);
//!     let tool = ToolProbe::probe(&config.external_tool).await;
//!     let factory = Arc::new(ProcessorFactory::from_config(&config, tool));
//!
//!     let scanner = FolderScanner::new(&config.processing.supported_formats);
//!     let ids = scanner.scan(store.as_ref(), "./photos".as_ref())?;
//!
//!     let service = IndexingService::start(store, factory, &config);
//!     for id in ids {
//!         service.submit(id, 0);
//!     }
//!     let stats = service.finish().await;
//!     println!("indexed {}", stats.indexed);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod indexer;
pub mod pipeline;
pub mod processor;
pub mod queue;
pub mod search;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{
    ConfigError, GlimpseError, PipelineError, PipelineResult, Result, StoreError, StoreResult,
};
pub use indexer::{FolderScanner, IndexStats, IndexingService, JobOutcome, ThumbnailLayout};
pub use pipeline::{Hasher, PerceptualHash, ThumbnailEngine};
pub use processor::{ImageProcessor, ProcessorFactory, ToolProbe, ToolStatus};
pub use queue::UniqueWorkQueue;
pub use search::{SearchCompiler, SearchPage, SearchQuery, SearchService};
pub use store::{AnnotationStore, ImageStore, MemoryStore, SqliteStore};
pub use types::{CropRect, ExifData, ExportConfig, ImageHashes, ImageId, ThumbConfig, ThumbSize};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
