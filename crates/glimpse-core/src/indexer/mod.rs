//! Background indexing: folder scans feed a worker pool that generates
//! thumbnails and hashes for each image.

mod layout;
mod scanner;
mod service;

pub use layout::ThumbnailLayout;
pub use scanner::FolderScanner;
pub use service::{IndexStats, IndexingService, JobOutcome};
