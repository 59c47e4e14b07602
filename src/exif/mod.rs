//! Capture-date metadata reading and writing.
//!
//! Two entry points:
//!
//! - [`get_capture_date`] — Read the original-capture-time field from an image
//! - [`set_capture_date`] — Write the three synchronized date fields
//!   (original-capture-time, modification-time, digitized-time), using a fast
//!   in-place strategy with a shadow-copy fallback
//!
//! The three date fields are always written together with identical values,
//! never independently, in the fixed `YYYY:MM:DD HH:MM:SS` form.

mod reader;
mod writer;

pub use reader::{EXIF_DATE_FORMAT, get_capture_date};
pub use writer::set_capture_date;
