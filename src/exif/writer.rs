use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use img_parts::Bytes;
use img_parts::ImageEXIF;
use img_parts::jpeg::Jpeg;
use little_exif::exif_tag::ExifTag;
use little_exif::filetype::FileExtension;
use little_exif::metadata::Metadata;
use std::fs;
use std::io;
use std::path::Path;

use super::reader::EXIF_DATE_FORMAT;
use crate::handle::FileHandle;

// little_exif as_u8_vec(JPEG) returns: [APP1 marker 2B][length 2B][Exif\0\0 6B][TIFF data]
// img-parts set_exif() expects just the TIFF data (after Exif\0\0)
const JPEG_EXIF_OVERHEAD: usize = 10; // 2 + 2 + 6

/// Write the three synchronized capture-time fields into an image.
///
/// Strategy, first success wins:
///
/// 1. **In-place** — when the handle grants a direct read-write descriptor,
///    parse the embedded metadata container in place, set the three fields,
///    and persist.
/// 2. **Shadow copy** — copy the full source bytes to a private temporary
///    file, stamp the copy, stream it back over the handle's write channel.
///    The temporary file is deleted on every exit path.
///
/// Returns `false` when both strategies fail or no output channel is
/// available; never panics past this boundary.
pub fn set_capture_date(handle: &FileHandle, when: NaiveDateTime) -> bool {
    // Sub-second precision is dropped: the container stores whole seconds.
    let stamp = when.format(EXIF_DATE_FORMAT).to_string();

    if let Some(path) = handle.path() {
        if handle.open_rw().is_ok() {
            match stamp_file(path, &stamp) {
                Ok(()) => return true,
                Err(e) => log::debug!(
                    "in-place date write failed for {}: {e}; trying shadow copy",
                    handle.display_name()
                ),
            }
        }
    }

    match stamp_via_shadow_copy(handle, &stamp) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("failed to write capture date for {}: {e}", handle.display_name());
            false
        }
    }
}

/// The three date tags, always set together with identical values.
fn date_tags(stamp: &str) -> [ExifTag; 3] {
    [
        ExifTag::DateTimeOriginal(stamp.to_string()),
        ExifTag::ModifyDate(stamp.to_string()),
        ExifTag::CreateDate(stamp.to_string()),
    ]
}

/// Stamp the file at `path` in place.
fn stamp_file(path: &Path, stamp: &str) -> Result<()> {
    if is_jpeg_name(path) {
        stamp_jpeg_file(path, stamp)
    } else {
        let mut metadata = load_existing_metadata(path).unwrap_or_else(Metadata::new);
        for tag in date_tags(stamp) {
            metadata.set_tag(tag);
        }
        metadata
            .write_to_file(path)
            .context("failed to write metadata container")
    }
}

/// Stamp a JPEG, preserving all other segments via img-parts.
///
/// The date tags are merged into the existing metadata when it parses;
/// otherwise a fresh container is built. Only the APP1 EXIF segment changes.
fn stamp_jpeg_file(path: &Path, stamp: &str) -> Result<()> {
    let file_bytes = fs::read(path).context("failed to read image file")?;

    let mut jpeg = Jpeg::from_bytes(Bytes::from(file_bytes))
        .map_err(|e| anyhow::anyhow!("failed to parse JPEG: {e}"))?;

    // Remember where the EXIF segment was originally positioned
    let orig_exif_pos = find_exif_segment_pos(&jpeg);

    let mut metadata = load_existing_metadata(path).unwrap_or_else(Metadata::new);
    for tag in date_tags(stamp) {
        metadata.set_tag(tag);
    }
    let exif_bytes = metadata.as_u8_vec(FileExtension::JPEG);
    if exif_bytes.len() <= JPEG_EXIF_OVERHEAD {
        anyhow::bail!("metadata container serialized to nothing");
    }
    jpeg.set_exif(Some(Bytes::copy_from_slice(&exif_bytes[JPEG_EXIF_OVERHEAD..])));

    // set_exif() inserts at position 3, which may be after XMP APP1.
    // Move the EXIF segment back to its original position so EXIF comes
    // before XMP (required for many EXIF parsers).
    if let Some(new_pos) = find_exif_segment_pos(&jpeg) {
        let target_pos = orig_exif_pos.unwrap_or(1); // default: right after APP0
        if target_pos < new_pos {
            let segments = jpeg.segments_mut();
            let seg = segments.remove(new_pos);
            segments.insert(target_pos, seg);
        }
    }

    let output = jpeg.encoder().bytes();
    fs::write(path, &output).context("failed to write JPEG file")?;
    Ok(())
}

/// Find the position of the EXIF APP1 segment in a JPEG.
/// EXIF segments have marker 0xE1 and contents starting with "Exif\0\0".
fn find_exif_segment_pos(jpeg: &Jpeg) -> Option<usize> {
    const EXIF_PREFIX: &[u8] = b"Exif\0\0";
    jpeg.segments()
        .iter()
        .position(|s| s.marker() == 0xE1 && s.contents().starts_with(EXIF_PREFIX))
}

/// Load existing metadata from a file path using little_exif.
/// Returns None if it can't parse (instead of losing data).
fn load_existing_metadata(path: &Path) -> Option<Metadata> {
    let path_owned = path.to_path_buf();
    // Suppress panics from little_exif
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(|_| {}));
    let result = std::panic::catch_unwind(move || Metadata::new_from_path(&path_owned));
    std::panic::set_hook(prev_hook);

    match result {
        Ok(Ok(m)) => {
            if m.data().is_empty() {
                log::debug!("little_exif loaded empty metadata");
                None
            } else {
                log::debug!("little_exif loaded {} existing tags", m.data().len());
                Some(m)
            }
        }
        Ok(Err(e)) => {
            log::debug!("little_exif could not parse metadata: {e}");
            None
        }
        Err(_) => {
            log::debug!("little_exif panicked parsing metadata");
            None
        }
    }
}

/// Shadow-copy fallback: stamp a private copy, then stream it back over the
/// handle's write channel. The temporary file is removed when it drops,
/// whether or not the copy-back succeeded.
fn stamp_via_shadow_copy(handle: &FileHandle, stamp: &str) -> Result<()> {
    let ext = Path::new(handle.display_name())
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("img");
    let mut temp = tempfile::Builder::new()
        .prefix("snapforge-")
        .suffix(&format!(".{ext}"))
        .tempfile()
        .context("failed to create shadow copy")?;

    let mut source = handle.open_read()?;
    io::copy(&mut source, temp.as_file_mut()).context("failed to fill shadow copy")?;

    stamp_file(temp.path(), stamp)?;

    let mut stamped = fs::File::open(temp.path()).context("failed to reopen shadow copy")?;
    let mut sink = handle.open_write()?;
    io::copy(&mut stamped, &mut sink).context("failed to stream shadow copy back")?;
    sink.sync_all().context("failed to flush destination")?;
    Ok(())
}

fn is_jpeg_name(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref(),
        Some("jpg") | Some("jpeg")
    )
}
