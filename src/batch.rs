//! Batch orchestration.
//!
//! [`Batch::spawn`] drives one operation across an ordered list of handles on
//! a background worker, strictly serially — no intra-batch concurrency, so
//! progress numbers are monotonic and deterministic, and catalog insertions
//! never race each other within a batch. The caller owns the returned
//! [`BatchTask`]: a stream of progress events plus a one-shot completion
//! carrying the aggregate result.
//!
//! Every item yields exactly one result regardless of which stage fails; a
//! single item's failure never aborts the remaining items. Cancellation
//! mid-batch is not supported: a batch, once started, runs to completion.

use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::catalog::Catalog;
use crate::error::OpError;
use crate::exif;
use crate::handle::FileHandle;
use crate::transcode;

/// The operation a batch applies to every item.
#[derive(Debug, Clone, Copy)]
pub enum BatchOperation {
    /// Write the three synchronized capture-time fields.
    SetCaptureDate(NaiveDateTime),
    /// Convert PNG sources to JPEG and retire them.
    TranscodeToJpeg { quality: u8 },
}

/// One progress event, emitted before an item's work begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// 1-based position in the batch.
    pub index: usize,
    pub total: usize,
    pub name: String,
}

/// Outcome for a single item.
#[derive(Debug)]
pub struct BatchItemResult {
    pub name: String,
    pub success: bool,
    pub message: Option<String>,
}

/// Aggregate outcome of one batch invocation. Immutable once delivered.
#[derive(Debug, Default)]
pub struct BatchOperationResult {
    pub success_count: usize,
    pub failure_count: usize,
    /// Failed display names, in input order.
    pub failed_images: Vec<String>,
    /// Failed display name → error message. A name appears in
    /// `failed_images` iff its entry exists here.
    pub error_messages: HashMap<String, String>,
    /// Succeeded-with-caveat messages (destination created, source retained).
    pub warnings: HashMap<String, String>,
}

impl BatchOperationResult {
    fn record(&mut self, item: BatchItemResult) {
        if item.success {
            self.success_count += 1;
            if let Some(message) = item.message {
                self.warnings.insert(item.name, message);
            }
        } else {
            self.failure_count += 1;
            let message = item
                .message
                .unwrap_or_else(|| "operation failed".to_string());
            self.failed_images.push(item.name.clone());
            self.error_messages.insert(item.name, message);
        }
    }
}

/// A running batch, owned by the caller.
///
/// Progress events arrive on [`BatchTask::progress`]; dropping the receiver
/// only discards progress, the batch still runs to completion. Awaiting
/// [`BatchTask::join`] delivers the aggregate exactly once.
pub struct BatchTask {
    pub progress: mpsc::Receiver<Progress>,
    worker: tokio::task::JoinHandle<BatchOperationResult>,
}

impl BatchTask {
    /// Wait for the batch to finish and take the aggregate result.
    ///
    /// Progress still buffered or yet to be emitted is discarded: the worker
    /// must never block on a receiver nobody is reading.
    pub async fn join(self) -> BatchOperationResult {
        let BatchTask { progress, worker } = self;
        drop(progress);
        match worker.await {
            Ok(result) => result,
            Err(e) => {
                // Only reachable if the worker panicked; per-item errors are
                // all caught inside run().
                log::error!("batch worker aborted: {e}");
                BatchOperationResult::default()
            }
        }
    }
}

/// Progress events buffered before the worker would block on a slow consumer.
const PROGRESS_BUFFER: usize = 32;

/// Everything a batch needs, bundled so callers hand over one value.
pub struct Batch {
    pub items: Vec<FileHandle>,
    pub operation: BatchOperation,
    pub catalog: Arc<Catalog>,
}

impl Batch {
    /// Start the batch on a background worker and hand ownership of the
    /// running task back to the caller. An empty item list completes
    /// immediately with an empty result — a no-op, not an error.
    pub fn spawn(self) -> BatchTask {
        let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
        let worker = tokio::task::spawn_blocking(move || self.run(tx));
        BatchTask { progress: rx, worker }
    }

    fn run(self, progress: mpsc::Sender<Progress>) -> BatchOperationResult {
        let total = self.items.len();
        let mut result = BatchOperationResult::default();

        for (i, item) in self.items.iter().enumerate() {
            let event = Progress {
                index: i + 1,
                total,
                name: item.display_name().to_string(),
            };
            // A dropped receiver means nobody is watching; keep working.
            let _ = progress.blocking_send(event);

            result.record(process_item(item, &self.operation, &self.catalog));
        }

        log::info!(
            "batch finished: {} succeeded, {} failed of {total}",
            result.success_count, result.failure_count
        );
        result
    }
}

fn process_item(
    item: &FileHandle,
    operation: &BatchOperation,
    catalog: &Arc<Catalog>,
) -> BatchItemResult {
    let name = item.display_name().to_string();
    match operation {
        BatchOperation::SetCaptureDate(when) => {
            if exif::set_capture_date(item, *when) {
                BatchItemResult { name, success: true, message: None }
            } else {
                BatchItemResult {
                    name,
                    success: false,
                    message: Some("failed to write metadata".to_string()),
                }
            }
        }
        BatchOperation::TranscodeToJpeg { quality } => {
            match transcode::transcode_to_jpeg(item, *quality, catalog) {
                Ok(outcome) if outcome.source_retained => BatchItemResult {
                    name,
                    success: true,
                    message: Some(OpError::SourceDeletionFailed.to_string()),
                },
                Ok(_) => BatchItemResult { name, success: true, message: None },
                Err(e) => BatchItemResult { name, success: false, message: Some(e.to_string()) },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn png_handle(dir: &Path, name: &str) -> FileHandle {
        let path = dir.join(name);
        RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255]))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();
        FileHandle::from_path(path).unwrap()
    }

    fn jpeg_handle(dir: &Path, name: &str) -> FileHandle {
        let path = dir.join(name);
        image::RgbImage::from_pixel(4, 4, image::Rgb([9, 9, 9]))
            .save_with_format(&path, ImageFormat::Jpeg)
            .unwrap();
        FileHandle::from_path(path).unwrap()
    }

    fn check_invariants(result: &BatchOperationResult, total: usize) {
        assert_eq!(result.success_count + result.failure_count, total);
        assert_eq!(result.failed_images.len(), result.failure_count);
        assert_eq!(result.error_messages.len(), result.failure_count);
        for name in &result.failed_images {
            assert!(result.error_messages.contains_key(name));
        }
    }

    #[tokio::test]
    async fn transcode_batch_aggregates_mixed_results() {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(Catalog::new(dir.path().join("cat")));
        let items = vec![
            png_handle(dir.path(), "one.png"),
            png_handle(dir.path(), "two.png"),
            jpeg_handle(dir.path(), "three.jpg"),
        ];

        let task = Batch {
            items,
            operation: BatchOperation::TranscodeToJpeg { quality: 90 },
            catalog,
        }
        .spawn();
        let result = task.join().await;

        check_invariants(&result, 3);
        assert_eq!(result.success_count, 2);
        assert_eq!(result.failure_count, 1);
        assert_eq!(result.failed_images, vec!["three.jpg".to_string()]);
        assert_eq!(result.error_messages["three.jpg"], "Not a PNG image");
        assert!(dir.path().join("one.jpg").exists());
        assert!(!dir.path().join("one.png").exists());
    }

    #[tokio::test]
    async fn progress_events_are_ordered_and_emitted_before_work() {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(Catalog::new(dir.path().join("cat")));
        let items = vec![
            png_handle(dir.path(), "a.png"),
            png_handle(dir.path(), "b.png"),
        ];

        let mut task = Batch {
            items,
            operation: BatchOperation::TranscodeToJpeg { quality: 80 },
            catalog,
        }
        .spawn();

        let mut events = Vec::new();
        while let Some(event) = task.progress.recv().await {
            events.push(event);
        }
        let result = task.join().await;

        assert_eq!(
            events,
            vec![
                Progress { index: 1, total: 2, name: "a.png".to_string() },
                Progress { index: 2, total: 2, name: "b.png".to_string() },
            ]
        );
        check_invariants(&result, 2);
        assert_eq!(result.success_count, 2);
    }

    #[tokio::test]
    async fn empty_batch_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(Catalog::new(dir.path()));

        let task = Batch {
            items: Vec::new(),
            operation: BatchOperation::TranscodeToJpeg { quality: 90 },
            catalog,
        }
        .spawn();
        let result = task.join().await;

        check_invariants(&result, 0);
        assert!(result.failed_images.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn join_without_reading_progress_completes() {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(Catalog::new(dir.path().join("cat")));
        // More items than the progress buffer holds, so the worker would
        // block on an unread receiver if join() kept it alive.
        let items: Vec<_> = (0..PROGRESS_BUFFER + 8)
            .map(|i| {
                let path = dir.path().join(format!("f{i}.jpg"));
                fs::write(&path, b"jpeg bytes").unwrap();
                FileHandle::from_path(path).unwrap()
            })
            .collect();
        let total = items.len();

        let task = Batch {
            items,
            operation: BatchOperation::TranscodeToJpeg { quality: 90 },
            catalog,
        }
        .spawn();
        let result = tokio::time::timeout(std::time::Duration::from_secs(10), task.join())
            .await
            .expect("batch must run to completion without a progress consumer");

        check_invariants(&result, total);
        assert_eq!(result.failure_count, total);
    }

    #[tokio::test]
    async fn date_batch_stamps_every_item() {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(Catalog::new(dir.path().join("cat")));
        let when = NaiveDate::from_ymd_opt(2020, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let items = vec![
            jpeg_handle(dir.path(), "a.jpg"),
            jpeg_handle(dir.path(), "b.jpg"),
        ];

        let task = Batch {
            items,
            operation: BatchOperation::SetCaptureDate(when),
            catalog,
        }
        .spawn();
        let result = task.join().await;

        check_invariants(&result, 2);
        assert_eq!(result.success_count, 2);
        for name in ["a.jpg", "b.jpg"] {
            let handle = FileHandle::from_path(dir.path().join(name)).unwrap();
            assert_eq!(crate::exif::get_capture_date(&handle), Some(when));
        }
    }

    #[tokio::test]
    async fn date_batch_reports_unwritable_items() {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(Catalog::new(dir.path().join("cat")));
        let broken = dir.path().join("broken.jpg");
        fs::write(&broken, b"not an image").unwrap();
        let when = NaiveDate::from_ymd_opt(2020, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();

        let task = Batch {
            items: vec![FileHandle::from_path(broken).unwrap()],
            operation: BatchOperation::SetCaptureDate(when),
            catalog,
        }
        .spawn();
        let result = task.join().await;

        check_invariants(&result, 1);
        assert_eq!(result.failure_count, 1);
        assert_eq!(result.error_messages["broken.jpg"], "failed to write metadata");
    }
}
