//! Content and perceptual hashing for duplicate and similar-image detection.
//!
//! The content hash covers decoded pixels only, so re-saving a photo with
//! different EXIF does not change it. The perceptual hash is a 64-bit
//! gradient hash (8 brightness comparisons per row of a 9x8 grayscale
//! reduction) stored as four 4-hex-digit parts for indexed prefix/suffix lookups.

use blake3::Hasher as Blake3Hasher;
use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::PipelineResult;
use crate::types::ImageHashes;

use super::decode::ImageDecoder;

/// Number of bits in a perceptual hash.
pub const PERCEPTUAL_BITS: u32 = 64;

/// Number of stored hex parts.
pub const PERCEPTUAL_PARTS: usize = 4;

/// A 64-bit perceptual fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PerceptualHash(pub u64);

impl PerceptualHash {
    /// Lowercase 16-digit hex form.
    pub fn to_hex(self) -> String {
        format!("{:016x}", self.0)
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 16 {
            return None;
        }
        u64::from_str_radix(hex, 16).ok().map(Self)
    }

    /// Four equal hex substrings, most significant first.
    pub fn parts(self) -> [String; PERCEPTUAL_PARTS] {
        let hex = self.to_hex();
        [
            hex[0..4].to_string(),
            hex[4..8].to_string(),
            hex[8..12].to_string(),
            hex[12..16].to_string(),
        ]
    }

    /// Rebuild from stored parts; `None` if any part is malformed.
    pub fn from_parts<S: AsRef<str>>(parts: &[S]) -> Option<Self> {
        if parts.len() != PERCEPTUAL_PARTS || parts.iter().any(|p| p.as_ref().len() != 4) {
            return None;
        }
        let joined: String = parts.iter().map(|p| p.as_ref()).collect();
        Self::from_hex(&joined)
    }

    /// Hamming distance in bits.
    pub fn distance(self, other: Self) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// `(bits - distance) / bits`: 1.0 for identical hashes.
    pub fn similarity(self, other: Self) -> f64 {
        f64::from(PERCEPTUAL_BITS - self.distance(other)) / f64::from(PERCEPTUAL_BITS)
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<PerceptualHash> for String {
    fn from(hash: PerceptualHash) -> Self {
        hash.to_hex()
    }
}

impl TryFrom<String> for PerceptualHash {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value).ok_or_else(|| format!("invalid perceptual hash: {value}"))
    }
}

/// Computes content and perceptual hashes.
///
/// The perceptual hasher is configured once and reused for every image.
pub struct Hasher {
    phash_hasher: image_hasher::Hasher,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    pub fn new() -> Self {
        let phash_hasher = HasherConfig::new()
            .hash_alg(HashAlg::Gradient)
            .hash_size(8, 8)
            .to_hasher();
        Self { phash_hasher }
    }

    /// BLAKE3 over the RGBA pixel rows, prefixed by the dimensions.
    pub fn content_hash(image: &DynamicImage) -> String {
        let rgba = image.to_rgba8();
        let mut hasher = Blake3Hasher::new();
        hasher.update(&rgba.width().to_le_bytes());
        hasher.update(&rgba.height().to_le_bytes());

        let row_len = rgba.width() as usize * 4;
        if row_len > 0 {
            for row in rgba.as_raw().chunks(row_len) {
                hasher.update(row);
            }
        }

        hasher.finalize().to_hex().to_string()
    }

    /// Perceptual hash of an already-oriented image.
    pub fn perceptual_hash(&self, image: &DynamicImage) -> PerceptualHash {
        let hash = self.phash_hasher.hash_image(image);
        let value = hash
            .as_bytes()
            .iter()
            .take(8)
            .enumerate()
            .fold(0u64, |acc, (i, byte)| acc | (u64::from(*byte) << (56 - 8 * i)));
        PerceptualHash(value)
    }

    /// Both hashes for an in-memory image.
    pub fn hashes(&self, image: &DynamicImage) -> ImageHashes {
        ImageHashes {
            content_hash: Self::content_hash(image),
            perceptual: Some(self.perceptual_hash(image)),
        }
    }

    /// Decode, orient and hash a file.
    ///
    /// A decode failure is an error, never an empty hash: callers must not
    /// treat an unreadable file as a duplicate of every other unreadable file.
    pub fn hash_file(&self, path: &Path) -> PipelineResult<ImageHashes> {
        let decoded = ImageDecoder::open_oriented(path)?;
        Ok(self.hashes(&decoded.image))
    }
}
