//! PNG to JPEG transcoding.
//!
//! Decodes a source raster, flattens transparency against an opaque white
//! background (JPEG has no alpha), re-encodes at the requested quality into a
//! resolved destination next to the original, and retires the source — but
//! only after the destination passes the post-write integrity check.

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat, Rgb, RgbImage};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::catalog::Catalog;
use crate::dest::{self, FinalizedWrite, WriteHandle};
use crate::error::OpError;
use crate::handle::FileHandle;

/// Outcome of one successful transcode.
#[derive(Debug)]
pub struct TranscodeOutcome {
    /// Display name of the created destination.
    pub destination: String,
    /// The destination was confirmed but the source could not be removed.
    /// Creation success outweighs cleanup failure.
    pub source_retained: bool,
}

/// Transcode one PNG source to a JPEG written next to it.
///
/// Ordering is strict: the source is deleted only once the destination's
/// integrity check passes. An integrity failure leaves the source untouched.
pub fn transcode_to_jpeg(
    source: &FileHandle,
    quality: u8,
    catalog: &Arc<Catalog>,
) -> Result<TranscodeOutcome, OpError> {
    if source.mime() != "image/png" {
        return Err(OpError::WrongType);
    }

    let mut bytes = Vec::new();
    source
        .open_read()
        .and_then(|mut f| f.read_to_end(&mut bytes).map_err(Into::into))
        .map_err(|e| OpError::DecodeFailure(e.to_string()))?;
    let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
        .map_err(|e| OpError::DecodeFailure(e.to_string()))?;
    drop(bytes);

    let raster = flatten_over_white(decoded);

    let desired_name = jpeg_name(source.display_name());
    let target = dest::resolve(source, &desired_name, catalog)?;
    let mut sink = WriteHandle::open(target, catalog)?;

    let encoder = JpegEncoder::new_with_quality(&mut sink, quality);
    encoder
        .write_image(
            raster.as_raw(),
            raster.width(),
            raster.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| OpError::WriteFailure(e.to_string()))?;

    let finalized = sink.finalize()?;
    let source_retained = confirm_and_retire(&finalized, source)?;

    Ok(TranscodeOutcome {
        destination: finalized.display_name().to_string(),
        source_retained,
    })
}

/// Confirm the destination, then retire the source — strictly in that order.
///
/// Returns whether the source was retained despite a confirmed destination.
fn confirm_and_retire(finalized: &FinalizedWrite, source: &FileHandle) -> Result<bool, OpError> {
    if !finalized.destination_exists() {
        return Err(OpError::IntegrityCheckFailed);
    }
    match source.delete() {
        Ok(()) => Ok(false),
        Err(e) => {
            log::warn!("destination confirmed but source not removed: {e}");
            Ok(true)
        }
    }
}

/// Composite any alpha channel over an opaque white background of identical
/// dimensions; rasters without alpha convert directly.
fn flatten_over_white(decoded: image::DynamicImage) -> RgbImage {
    if !decoded.color().has_alpha() {
        return decoded.into_rgb8();
    }
    let rgba = decoded.into_rgba8();
    let mut flat = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = pixel[3] as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        flat.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    flat
}

/// Desired destination name: source base name with the JPEG extension.
fn jpeg_name(display_name: &str) -> String {
    let base = Path::new(display_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(display_name);
    format!("{base}.jpg")
}
