use chrono::{DateTime, NaiveDateTime};
use nom_exif::*;

use crate::handle::FileHandle;

/// The 19-character EXIF date-time form: zero-padded, 24-hour, fixed numerals.
pub const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Read the original-capture-time field from an image.
///
/// A missing field, a malformed value, or any read error all yield `None` —
/// absence, not error. Callers render this as "Not set".
pub fn get_capture_date(handle: &FileHandle) -> Option<NaiveDateTime> {
    let exif = read_exif_container(handle)?;
    let value = exif.get(ExifTag::DateTimeOriginal)?;
    parse_exif_datetime(&value.to_string())
}

fn read_exif_container(handle: &FileHandle) -> Option<Exif> {
    let mut parser = MediaParser::new();
    let file = handle.open_read().ok()?;
    let ms = MediaSource::seekable(file).ok()?;
    let iter: ExifIter = match parser.parse(ms) {
        Ok(iter) => iter,
        Err(_) => {
            log::debug!("no EXIF data found in {}", handle.display_name());
            return None;
        }
    };
    Some(iter.into())
}

/// Parse a date-time value as rendered by the EXIF container.
///
/// The canonical form is `YYYY:MM:DD HH:MM:SS`; values the parser has already
/// interpreted as timestamps render with dashes and an offset, so those
/// shapes are accepted too.
fn parse_exif_datetime(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim().trim_matches('"');
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, EXIF_DATE_FORMAT) {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S %z") {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn expected() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 7, 4)
            .unwrap()
            .and_hms_opt(16, 5, 9)
            .unwrap()
    }

    #[test]
    fn parses_canonical_exif_form() {
        assert_eq!(parse_exif_datetime("2023:07:04 16:05:09"), Some(expected()));
        assert_eq!(parse_exif_datetime("  \"2023:07:04 16:05:09\"  "), Some(expected()));
    }

    #[test]
    fn parses_interpreted_timestamp_forms() {
        assert_eq!(parse_exif_datetime("2023-07-04 16:05:09"), Some(expected()));
        assert_eq!(parse_exif_datetime("2023-07-04 16:05:09 +02:00"), Some(expected()));
        assert_eq!(parse_exif_datetime("2023-07-04T16:05:09+02:00"), Some(expected()));
    }

    #[test]
    fn malformed_values_yield_none() {
        assert!(parse_exif_datetime("").is_none());
        assert!(parse_exif_datetime("not a date").is_none());
        assert!(parse_exif_datetime("2023:13:99 99:99:99").is_none());
    }

    #[test]
    fn image_without_metadata_yields_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("plain.jpg");
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([12, 34, 56]));
        img.save_with_format(&path, image::ImageFormat::Jpeg).unwrap();

        let handle = FileHandle::from_path(&path).unwrap();
        assert_eq!(get_capture_date(&handle), None);
    }

    #[test]
    fn unreadable_source_yields_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("junk.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();

        let handle = FileHandle::from_path(&path).unwrap();
        assert_eq!(get_capture_date(&handle), None);
    }
}
