//! # snapforge
//!
//! Batch capture-date editor and PNG→JPEG converter built around opaque file
//! handles: a source may live at a plain filesystem path or behind a catalog
//! that indexes files by logical location rather than by path. The crate's
//! core is the destination-resolution and write-durability layer — deciding
//! where a derived file legally belongs, writing it without losing data on
//! interruption, dodging name collisions (stale catalog records included),
//! and retiring the original only after the destination is confirmed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snapforge::batch::{Batch, BatchOperation};
//! use snapforge::catalog::Catalog;
//! use snapforge::handle::collect_handles;
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let catalog = Arc::new(Catalog::new("/data/media"));
//!     let items = collect_handles(&[PathBuf::from("./photos")]);
//!
//!     let mut task = Batch {
//!         items,
//!         operation: BatchOperation::TranscodeToJpeg { quality: 90 },
//!         catalog,
//!     }
//!     .spawn();
//!
//!     while let Some(p) = task.progress.recv().await {
//!         println!("[{}/{}] {}", p.index, p.total, p.name);
//!     }
//!
//!     let result = task.join().await;
//!     println!("{} converted, {} failed", result.success_count, result.failure_count);
//!     for name in &result.failed_images {
//!         println!("  {name}: {}", result.error_messages[name]);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Lower-Level Usage
//!
//! ```rust,no_run
//! use snapforge::exif::{get_capture_date, set_capture_date};
//! use snapforge::handle::FileHandle;
//! use chrono::NaiveDate;
//!
//! fn main() -> anyhow::Result<()> {
//!     let handle = FileHandle::from_path("photo.jpg")?;
//!
//!     let when = NaiveDate::from_ymd_opt(2021, 6, 5)
//!         .unwrap()
//!         .and_hms_opt(10, 20, 30)
//!         .unwrap();
//!     if set_capture_date(&handle, when) {
//!         println!("Capture date: {:?}", get_capture_date(&handle));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`handle`] — Opaque file handles and the directory enumerator
//! - [`catalog`] — The logical-location index with provisional records
//! - [`dest`] — Destination resolver and transactional write handles
//! - [`exif`] — Capture-date reading and dual-strategy writing
//! - [`transcode`] — PNG→JPEG conversion with alpha flattening
//! - [`batch`] — Serial batch orchestration with progress streaming
//! - [`config`] — Configuration types and loading/saving
//! - [`error`] — Per-item failure taxonomy

pub mod batch;
pub mod catalog;
pub mod config;
pub mod dest;
pub mod error;
pub mod exif;
pub mod handle;
pub mod transcode;
