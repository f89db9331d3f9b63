//! EXIF metadata extraction from images.

use chrono::NaiveDateTime;
use exif::{In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::types::ExifData;

const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Extracts EXIF metadata from image files.
pub struct MetadataExtractor;

impl MetadataExtractor {
    /// Extract EXIF data from an image file.
    ///
    /// Returns `None` if the file has no EXIF data or if extraction fails.
    /// Partial data is returned when only some fields are present.
    pub fn extract(path: &Path) -> Option<ExifData> {
        let file = File::open(path).ok()?;
        let mut reader = BufReader::new(file);
        let exif = Reader::new().read_from_container(&mut reader).ok()?;

        let data = ExifData {
            taken_at: Self::get_datetime(&exif),
            camera_make: Self::get_string(&exif, Tag::Make),
            camera_model: Self::get_string(&exif, Tag::Model),
            lens_make: Self::get_string(&exif, Tag::LensMake),
            lens_model: Self::get_string(&exif, Tag::LensModel),
            width: Self::get_u32(&exif, Tag::PixelXDimension),
            height: Self::get_u32(&exif, Tag::PixelYDimension),
            orientation: Self::get_u32(&exif, Tag::Orientation),
        };

        if data == ExifData::default() {
            None
        } else {
            Some(data)
        }
    }

    /// Get a string field, trimmed of quotes and padding.
    fn get_string(exif: &exif::Exif, tag: Tag) -> Option<String> {
        let field = exif.get_field(tag, In::PRIMARY)?;
        let value = match &field.value {
            Value::Ascii(parts) => parts
                .iter()
                .map(|p| String::from_utf8_lossy(p).into_owned())
                .collect::<Vec<_>>()
                .join(" "),
            _ => field.display_value().to_string(),
        };
        let value = value.trim_matches(|c: char| c == '"' || c.is_whitespace() || c == '\0');
        (!value.is_empty()).then(|| value.to_string())
    }

    /// Get a u32 field from EXIF data.
    fn get_u32(exif: &exif::Exif, tag: Tag) -> Option<u32> {
        exif.get_field(tag, In::PRIMARY).and_then(|f| match &f.value {
            Value::Short(v) => v.first().map(|&x| u32::from(x)),
            Value::Long(v) => v.first().copied(),
            _ => None,
        })
    }

    /// Capture time, preferring DateTimeOriginal over DateTime.
    fn get_datetime(exif: &exif::Exif) -> Option<NaiveDateTime> {
        [Tag::DateTimeOriginal, Tag::DateTime]
            .into_iter()
            .filter_map(|tag| exif.get_field(tag, In::PRIMARY))
            .find_map(|f| match &f.value {
                Value::Ascii(parts) => parts
                    .first()
                    .and_then(|raw| parse_exif_datetime(&String::from_utf8_lossy(raw))),
                _ => None,
            })
    }
}

/// Parse `YYYY:MM:DD HH:MM:SS`; all-zero placeholders yield `None`.
pub fn parse_exif_datetime(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim().trim_end_matches('\0'), EXIF_DATE_FORMAT).ok()
}
