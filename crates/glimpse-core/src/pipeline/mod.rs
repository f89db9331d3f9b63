//! Image pipeline building blocks.
//!
//! - **decode**: Load, sample down and auto-orient images
//! - **orientation**: The eight EXIF orientation transforms
//! - **hash**: Content and perceptual hashes
//! - **scale**: Resize strategies and thumbnail geometry
//! - **thumbnail**: One-pass multi-size thumbnail generation
//! - **export**: Download copies, watermarks and crops
//! - **metadata**: EXIF metadata for the catalog
//! - **discovery**: Find image files in directories
//! - **validate**: Pre-processing checks

pub mod decode;
pub mod discovery;
pub mod export;
pub mod hash;
pub mod metadata;
pub mod orientation;
pub mod scale;
pub mod thumbnail;
pub mod validate;

pub use decode::{DecodedImage, ImageDecoder};
pub use discovery::{DiscoveredFile, FileDiscovery};
pub use hash::{Hasher, PerceptualHash};
pub use metadata::MetadataExtractor;
pub use orientation::Orientation;
pub use scale::{LanczosScaler, Scaler, SimdScaler};
pub use thumbnail::ThumbnailEngine;
pub use validate::Validator;
