//! Transactional write handles.
//!
//! A [`WriteHandle`] binds an open output sink to one resolved
//! [`DestinationTarget`](super::DestinationTarget) and walks an explicit
//! state machine: Open → Written → Committed, with Abandoned cleanup on
//! every exit path that never reaches Committed. For catalog-backed targets
//! the record is inserted provisional at open and becomes visible only at
//! [`WriteHandle::finalize`]; dropping an unfinalized handle removes the
//! partial output and the provisional record.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog::{Catalog, RecordId};
use crate::error::OpError;

use super::DestinationTarget;

/// Lifecycle of one write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    /// Sink open, bytes flowing.
    Open,
    /// Sink closed and flushed, commit not yet attempted.
    Written,
    /// Commit took effect; the destination is visible and durable.
    Committed,
    /// Cleaned up without committing.
    Abandoned,
}

/// An exclusive, single-use sink bound to one destination.
pub struct WriteHandle {
    sink: Option<fs::File>,
    path: PathBuf,
    display_name: String,
    record: Option<(Arc<Catalog>, RecordId)>,
    state: WriteState,
}

impl WriteHandle {
    /// Open a sink for the given target.
    ///
    /// Direct targets create the file (failing on a racing creation);
    /// indexed targets insert a provisional catalog record and open its
    /// backing resource for writing.
    pub fn open(target: DestinationTarget, catalog: &Arc<Catalog>) -> Result<Self, OpError> {
        match target {
            DestinationTarget::Direct { dir, file_name } => {
                fs::create_dir_all(&dir).map_err(|e| OpError::CannotOpen(e.to_string()))?;
                let path = dir.join(&file_name);
                let sink = fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&path)
                    .map_err(|e| OpError::CannotOpen(e.to_string()))?;
                Ok(WriteHandle {
                    sink: Some(sink),
                    path,
                    display_name: file_name,
                    record: None,
                    state: WriteState::Open,
                })
            }
            DestinationTarget::Indexed { collection, relative_dir, display_name, mime } => {
                let id = catalog
                    .insert(collection, &relative_dir, &display_name, &mime, true)
                    .map_err(|e| OpError::CannotOpen(e.to_string()))?;
                let sink = match catalog.open_write(&id) {
                    Ok(sink) => sink,
                    Err(e) => {
                        // The provisional record must not outlive a failed open.
                        if let Err(cleanup) = catalog.delete(&id) {
                            log::warn!("failed to clean up provisional record: {cleanup}");
                        }
                        return Err(OpError::CannotOpen(e.to_string()));
                    }
                };
                let path = catalog.path_of(&id).unwrap_or_default();
                Ok(WriteHandle {
                    sink: Some(sink),
                    path,
                    display_name,
                    record: Some((Arc::clone(catalog), id)),
                    state: WriteState::Open,
                })
            }
        }
    }

    pub fn state(&self) -> WriteState {
        self.state
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Flush and close the sink, then commit the destination.
    ///
    /// Committing clears the provisional flag on indexed targets and is a
    /// no-op for direct targets. A commit failure leaves the bytes in place
    /// but reports the write as failed: the visible state never took effect.
    pub fn finalize(mut self) -> Result<FinalizedWrite, OpError> {
        if let Some(sink) = self.sink.take() {
            if let Err(e) = sink.sync_all() {
                // Drop runs Abandoned cleanup on the partial output.
                return Err(OpError::WriteFailure(e.to_string()));
            }
        }
        self.state = WriteState::Written;

        let finalized = FinalizedWrite {
            path: std::mem::take(&mut self.path),
            display_name: std::mem::take(&mut self.display_name),
            record: self.record.take(),
        };
        // Bytes are durable from here; Drop must not remove them.
        self.state = WriteState::Committed;

        if let Some((catalog, id)) = &finalized.record {
            catalog
                .commit(id)
                .map_err(|e| OpError::WriteFailure(e.to_string()))?;
        }
        Ok(finalized)
    }
}

impl io::Write for WriteHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.sink.as_mut() {
            Some(sink) => sink.write(buf),
            None => Err(io::Error::other("write handle already finalized")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.sink.as_mut() {
            Some(sink) => sink.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for WriteHandle {
    fn drop(&mut self) {
        if self.state == WriteState::Committed {
            return;
        }
        self.sink.take(); // release before removing the file
        self.state = WriteState::Abandoned;
        if let Some((catalog, id)) = self.record.take() {
            if let Err(e) = catalog.delete(&id) {
                log::warn!("failed to remove abandoned catalog record: {e}");
            }
        } else if !self.path.as_os_str().is_empty() && self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                log::warn!("failed to remove abandoned output {}: {e}", self.path.display());
            }
        }
    }
}

/// The committed result of a write, used for the post-write integrity check.
pub struct FinalizedWrite {
    path: PathBuf,
    display_name: String,
    record: Option<(Arc<Catalog>, RecordId)>,
}

impl FinalizedWrite {
    /// Post-write integrity check.
    ///
    /// Direct targets must exist with non-zero length; indexed targets must
    /// open for read and report a non-negative size.
    pub fn destination_exists(&self) -> bool {
        match &self.record {
            Some((catalog, id)) => catalog.open_read(id).is_ok() && catalog.size(id) >= 0,
            None => fs::metadata(&self.path).map(|m| m.len() > 0).unwrap_or(false),
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Collection;
    use std::io::Write;
    use tempfile::TempDir;

    fn direct_target(dir: &Path, name: &str) -> DestinationTarget {
        DestinationTarget::Direct {
            dir: dir.to_path_buf(),
            file_name: name.to_string(),
        }
    }

    fn indexed_target(name: &str) -> DestinationTarget {
        DestinationTarget::Indexed {
            collection: Collection::Images,
            relative_dir: "Pictures".to_string(),
            display_name: name.to_string(),
            mime: "image/jpeg".to_string(),
        }
    }

    #[test]
    fn direct_write_commits_bytes() {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(Catalog::new(dir.path().join("cat")));

        let mut handle = WriteHandle::open(direct_target(dir.path(), "out.jpg"), &catalog).unwrap();
        assert_eq!(handle.state(), WriteState::Open);
        handle.write_all(b"jpeg bytes").unwrap();

        let finalized = handle.finalize().unwrap();
        assert!(finalized.destination_exists());
        assert_eq!(fs::read(dir.path().join("out.jpg")).unwrap(), b"jpeg bytes");
    }

    #[test]
    fn direct_empty_output_fails_integrity_check() {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(Catalog::new(dir.path().join("cat")));

        let handle = WriteHandle::open(direct_target(dir.path(), "out.jpg"), &catalog).unwrap();
        let finalized = handle.finalize().unwrap();
        assert!(!finalized.destination_exists());
    }

    #[test]
    fn dropped_direct_handle_removes_partial_output() {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(Catalog::new(dir.path().join("cat")));

        let mut handle = WriteHandle::open(direct_target(dir.path(), "out.jpg"), &catalog).unwrap();
        handle.write_all(b"partial").unwrap();
        drop(handle);

        assert!(!dir.path().join("out.jpg").exists());
    }

    #[test]
    fn direct_open_fails_on_existing_file() {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(Catalog::new(dir.path().join("cat")));
        fs::write(dir.path().join("out.jpg"), b"x").unwrap();

        let result = WriteHandle::open(direct_target(dir.path(), "out.jpg"), &catalog);
        assert!(matches!(result, Err(OpError::CannotOpen(_))));
    }

    #[test]
    fn indexed_write_is_provisional_until_finalize() {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(Catalog::new(dir.path()));

        let mut handle = WriteHandle::open(indexed_target("out.jpg"), &catalog).unwrap();
        handle.write_all(b"jpeg bytes").unwrap();
        assert!(catalog.list("Pictures").is_empty());

        let finalized = handle.finalize().unwrap();
        assert!(finalized.destination_exists());
        assert_eq!(catalog.list("Pictures").len(), 1);
        assert!(!catalog.list("Pictures")[0].pending);
    }

    #[test]
    fn dropped_indexed_handle_removes_provisional_record() {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(Catalog::new(dir.path()));

        let mut handle = WriteHandle::open(indexed_target("out.jpg"), &catalog).unwrap();
        handle.write_all(b"partial").unwrap();
        let path = handle.path.clone();
        drop(handle);

        assert!(catalog.find_by_name("Pictures", "out.jpg").is_none());
        assert!(!path.exists());
    }

    #[test]
    fn indexed_open_conflicts_with_existing_record() {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(Catalog::new(dir.path()));
        catalog
            .insert(Collection::Images, "Pictures", "out.jpg", "image/jpeg", false)
            .unwrap();

        let result = WriteHandle::open(indexed_target("out.jpg"), &catalog);
        assert!(matches!(result, Err(OpError::CannotOpen(_))));
    }
}
