//! EXIF orientation handling.
//!
//! Cameras store pixels in sensor order and record how the picture should be
//! displayed in the Orientation tag. Everything downstream (hashing, cropping,
//! thumbnails) works on the visually-correct, top-left-origin bitmap.

use exif::{In, Reader, Tag, Value};
use image::DynamicImage;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// The eight EXIF orientation values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    /// 1: stored upright
    #[default]
    Normal,
    /// 2: mirrored left-right
    FlipHorizontal,
    /// 3: upside down
    Rotate180,
    /// 4: mirrored top-bottom
    FlipVertical,
    /// 5: mirrored along the top-left/bottom-right diagonal
    Transpose,
    /// 6: needs a 90 degree clockwise turn
    Rotate90,
    /// 7: mirrored along the top-right/bottom-left diagonal
    Transverse,
    /// 8: needs a 90 degree counter-clockwise turn
    Rotate270,
}

impl Orientation {
    /// Map an EXIF tag value; anything outside 1-8 is treated as upright.
    pub fn from_exif(value: u32) -> Self {
        match value {
            2 => Self::FlipHorizontal,
            3 => Self::Rotate180,
            4 => Self::FlipVertical,
            5 => Self::Transpose,
            6 => Self::Rotate90,
            7 => Self::Transverse,
            8 => Self::Rotate270,
            _ => Self::Normal,
        }
    }

    pub fn to_exif(self) -> u32 {
        match self {
            Self::Normal => 1,
            Self::FlipHorizontal => 2,
            Self::Rotate180 => 3,
            Self::FlipVertical => 4,
            Self::Transpose => 5,
            Self::Rotate90 => 6,
            Self::Transverse => 7,
            Self::Rotate270 => 8,
        }
    }

    /// Whether applying this orientation exchanges width and height.
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Self::Transpose | Self::Rotate90 | Self::Transverse | Self::Rotate270
        )
    }

    /// Read the orientation tag from a file. Missing or unreadable EXIF is upright.
    pub fn read(path: &Path) -> Self {
        Self::try_read(path).unwrap_or_default()
    }

    fn try_read(path: &Path) -> Option<Self> {
        let file = File::open(path).ok()?;
        let mut reader = BufReader::new(file);
        let exif = Reader::new().read_from_container(&mut reader).ok()?;
        let field = exif.get_field(Tag::Orientation, In::PRIMARY)?;
        let value = match &field.value {
            Value::Short(v) => v.first().map(|&x| x as u32),
            Value::Long(v) => v.first().copied(),
            _ => None,
        }?;
        Some(Self::from_exif(value))
    }

    /// Produce the upright bitmap.
    pub fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Self::Normal => image,
            Self::FlipHorizontal => image.fliph(),
            Self::Rotate180 => image.rotate180(),
            Self::FlipVertical => image.flipv(),
            Self::Transpose => image.rotate90().fliph(),
            Self::Rotate90 => image.rotate90(),
            Self::Transverse => image.rotate270().fliph(),
            Self::Rotate270 => image.rotate270(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, GrayImage, Luma};

    const W: u32 = 3;
    const H: u32 = 2;

    /// 3x2 source where each pixel value encodes its stored position.
    fn source() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(W, H, |x, y| Luma([(10 * y + x) as u8])))
    }

    fn stored(x: u32, y: u32) -> u8 {
        (10 * y + x) as u8
    }

    /// Expected stored pixel shown at displayed position (x, y) for each orientation.
    fn expected(orientation: Orientation, x: u32, y: u32) -> u8 {
        match orientation {
            Orientation::Normal => stored(x, y),
            Orientation::FlipHorizontal => stored(W - 1 - x, y),
            Orientation::Rotate180 => stored(W - 1 - x, H - 1 - y),
            Orientation::FlipVertical => stored(x, H - 1 - y),
            Orientation::Transpose => stored(y, x),
            Orientation::Rotate90 => stored(y, H - 1 - x),
            Orientation::Transverse => stored(W - 1 - y, H - 1 - x),
            Orientation::Rotate270 => stored(W - 1 - y, x),
        }
    }

    #[test]
    fn test_all_orientations_produce_canonical_layout() {
        for value in 1..=8 {
            let orientation = Orientation::from_exif(value);
            let out = orientation.apply(source());

            let (ew, eh) = if orientation.swaps_dimensions() {
                (H, W)
            } else {
                (W, H)
            };
            assert_eq!(out.dimensions(), (ew, eh), "orientation {value}");

            let gray = out.to_luma8();
            for y in 0..eh {
                for x in 0..ew {
                    assert_eq!(
                        gray.get_pixel(x, y)[0],
                        expected(orientation, x, y),
                        "orientation {value} at ({x}, {y})"
                    );
                }
            }
        }
    }

    #[test]
    fn test_exif_value_roundtrip() {
        for value in 1..=8 {
            assert_eq!(Orientation::from_exif(value).to_exif(), value);
        }
        assert_eq!(Orientation::from_exif(0), Orientation::Normal);
        assert_eq!(Orientation::from_exif(42), Orientation::Normal);
    }

    #[test]
    fn test_read_missing_file_is_upright() {
        assert_eq!(
            Orientation::read(Path::new("/nonexistent/photo.jpg")),
            Orientation::Normal
        );
    }
}
