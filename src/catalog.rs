//! Catalog service model.
//!
//! The catalog indexes files by logical location — a collection, a relative
//! directory under the catalog root, and a display name — rather than by
//! filesystem path. Records inserted as *pending* occupy their name but stay
//! invisible to listings until committed, which gives writers a two-phase
//! open → write → commit flow.
//!
//! The catalog is an external, uncoordinated shared resource: no locking is
//! performed beyond its own internal consistency, and callers that race on
//! the same name are resolved best-effort by the destination resolver.

use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Logical top-level collections the catalog indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Camera and picture directories.
    Images,
    /// The downloads area.
    Downloads,
    /// Fallback collection for everything else; roots at the Pictures area.
    DefaultImages,
}

impl Collection {
    /// The on-disk directory this collection roots at.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Collection::Images => "Pictures",
            Collection::Downloads => "Download",
            Collection::DefaultImages => "Pictures",
        }
    }

    /// Classify a top-level directory name into a collection.
    pub fn from_top_level(dir: &str) -> Self {
        match dir {
            "Pictures" | "DCIM" => Collection::Images,
            "Download" | "Downloads" => Collection::Downloads,
            _ => Collection::DefaultImages,
        }
    }
}

/// Opaque record identifier.
///
/// The encoded form carries a volume name and a relative-directory hint so
/// the destination resolver can recover an absolute directory from an id
/// alone, without a record lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordId(String);

impl RecordId {
    fn encode(volume: &str, relative_dir: &str, seq: u64) -> Self {
        RecordId(format!("{volume}|{relative_dir}|{seq}"))
    }

    /// Recover the volume and relative-directory hint from the id.
    /// Returns `None` for ids that do not follow the encoded form.
    pub fn decode(&self) -> Option<(&str, &str)> {
        let mut parts = self.0.splitn(3, '|');
        let volume = parts.next()?;
        let relative_dir = parts.next()?;
        parts.next()?; // sequence — present but unused by callers
        if volume.is_empty() { None } else { Some((volume, relative_dir)) }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One indexed file.
#[derive(Debug, Clone)]
pub struct CatalogRecord {
    pub id: RecordId,
    pub collection: Collection,
    /// Directory relative to the catalog root, e.g. `Pictures/Converted`.
    pub relative_dir: String,
    pub display_name: String,
    pub mime: String,
    /// Provisional records occupy their name but are hidden from listings.
    pub pending: bool,
}

struct CatalogState {
    records: HashMap<RecordId, CatalogRecord>,
    next_seq: u64,
}

/// A catalog instance rooted at one volume directory.
pub struct Catalog {
    root: PathBuf,
    volume: String,
    state: Mutex<CatalogState>,
}

impl Catalog {
    /// Open a catalog over the given root directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Catalog {
            root: root.into(),
            volume: "external_primary".to_string(),
            state: Mutex::new(CatalogState { records: HashMap::new(), next_seq: 1 }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn volume(&self) -> &str {
        &self.volume
    }

    fn backing_path(&self, relative_dir: &str, display_name: &str) -> PathBuf {
        self.root.join(relative_dir).join(display_name)
    }

    /// Absolute path of a record's backing file.
    pub fn path_of(&self, id: &RecordId) -> Option<PathBuf> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .records
            .get(id)
            .map(|r| self.backing_path(&r.relative_dir, &r.display_name))
    }

    /// Insert a new record and create its backing file.
    ///
    /// Fails if the (relative_dir, display_name) pair is already occupied by
    /// another record — pending or not — or by an unindexed file on disk.
    pub fn insert(
        &self,
        collection: Collection,
        relative_dir: &str,
        display_name: &str,
        mime: &str,
        pending: bool,
    ) -> Result<RecordId> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let occupied = state
            .records
            .values()
            .any(|r| r.relative_dir == relative_dir && r.display_name == display_name);
        if occupied {
            bail!("catalog name conflict: {relative_dir}/{display_name}");
        }

        let path = self.backing_path(relative_dir, display_name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;

        let id = RecordId::encode(&self.volume, relative_dir, state.next_seq);
        state.next_seq += 1;
        state.records.insert(
            id.clone(),
            CatalogRecord {
                id: id.clone(),
                collection,
                relative_dir: relative_dir.to_string(),
                display_name: display_name.to_string(),
                mime: mime.to_string(),
                pending,
            },
        );
        log::debug!("catalog insert {relative_dir}/{display_name} (pending={pending})");
        Ok(id)
    }

    /// Whether a file occupies the logical location on disk, indexed or not.
    ///
    /// Insertion fails on any pre-existing file, so a name can be blocked by
    /// output a previous process left behind without a record in this one.
    pub fn has_backing_file(&self, relative_dir: &str, display_name: &str) -> bool {
        self.backing_path(relative_dir, display_name).exists()
    }

    /// Look up a record by its logical location, pending records included.
    pub fn find_by_name(&self, relative_dir: &str, display_name: &str) -> Option<CatalogRecord> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .records
            .values()
            .find(|r| r.relative_dir == relative_dir && r.display_name == display_name)
            .cloned()
    }

    pub fn record(&self, id: &RecordId) -> Option<CatalogRecord> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.records.get(id).cloned()
    }

    /// Committed (non-pending) records in a relative directory.
    pub fn list(&self, relative_dir: &str) -> Vec<CatalogRecord> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .records
            .values()
            .filter(|r| r.relative_dir == relative_dir && !r.pending)
            .cloned()
            .collect()
    }

    /// Remove a record and its backing file, if any.
    pub fn delete(&self, id: &RecordId) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let Some(record) = state.records.remove(id) else {
            bail!("no catalog record for {}", id.as_str());
        };
        let path = self.backing_path(&record.relative_dir, &record.display_name);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        }
        log::debug!("catalog delete {}/{}", record.relative_dir, record.display_name);
        Ok(())
    }

    /// Mark a pending record visible.
    pub fn commit(&self, id: &RecordId) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let record = state
            .records
            .get_mut(id)
            .with_context(|| format!("no catalog record for {}", id.as_str()))?;
        record.pending = false;
        Ok(())
    }

    pub fn open_read(&self, id: &RecordId) -> Result<fs::File> {
        let path = self
            .path_of(id)
            .with_context(|| format!("no catalog record for {}", id.as_str()))?;
        fs::File::open(&path).with_context(|| format!("failed to open {}", path.display()))
    }

    pub fn open_write(&self, id: &RecordId) -> Result<fs::File> {
        let path = self
            .path_of(id)
            .with_context(|| format!("no catalog record for {}", id.as_str()))?;
        fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("failed to open {} for writing", path.display()))
    }

    /// Byte size of a record's backing resource, or -1 when it is missing.
    pub fn size(&self, id: &RecordId) -> i64 {
        self.path_of(id)
            .and_then(|p| fs::metadata(p).ok())
            .map(|m| m.len() as i64)
            .unwrap_or(-1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn collection_classification() {
        assert_eq!(Collection::from_top_level("Pictures"), Collection::Images);
        assert_eq!(Collection::from_top_level("DCIM"), Collection::Images);
        assert_eq!(Collection::from_top_level("Download"), Collection::Downloads);
        assert_eq!(Collection::from_top_level("Music"), Collection::DefaultImages);
    }

    #[test]
    fn record_id_round_trip() {
        let id = RecordId::encode("external_primary", "Pictures/Sub", 7);
        let (volume, rel) = id.decode().unwrap();
        assert_eq!(volume, "external_primary");
        assert_eq!(rel, "Pictures/Sub");
    }

    #[test]
    fn record_id_decode_rejects_garbage() {
        assert!(RecordId("not-an-id".to_string()).decode().is_none());
        assert!(RecordId(String::new()).decode().is_none());
    }

    #[test]
    fn insert_creates_backing_file() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::new(dir.path());
        let id = catalog
            .insert(Collection::Images, "Pictures", "a.jpg", "image/jpeg", false)
            .unwrap();
        let path = catalog.path_of(&id).unwrap();
        assert!(path.exists());
        assert_eq!(catalog.size(&id), 0);
    }

    #[test]
    fn insert_rejects_name_conflict() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::new(dir.path());
        catalog
            .insert(Collection::Images, "Pictures", "a.jpg", "image/jpeg", false)
            .unwrap();
        assert!(
            catalog
                .insert(Collection::Images, "Pictures", "a.jpg", "image/jpeg", false)
                .is_err()
        );
    }

    #[test]
    fn pending_records_occupy_name_but_hide_from_listing() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::new(dir.path());
        let id = catalog
            .insert(Collection::Images, "Pictures", "a.jpg", "image/jpeg", true)
            .unwrap();

        assert!(catalog.find_by_name("Pictures", "a.jpg").is_some());
        assert!(catalog.list("Pictures").is_empty());

        catalog.commit(&id).unwrap();
        assert_eq!(catalog.list("Pictures").len(), 1);
    }

    #[test]
    fn delete_removes_record_and_file() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::new(dir.path());
        let id = catalog
            .insert(Collection::Images, "Pictures", "a.jpg", "image/jpeg", false)
            .unwrap();
        let path = catalog.path_of(&id).unwrap();

        catalog.delete(&id).unwrap();
        assert!(!path.exists());
        assert!(catalog.find_by_name("Pictures", "a.jpg").is_none());
        assert_eq!(catalog.size(&id), -1);
    }

    #[test]
    fn write_then_size_reflects_bytes() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::new(dir.path());
        let id = catalog
            .insert(Collection::Images, "Pictures", "a.jpg", "image/jpeg", true)
            .unwrap();

        let mut sink = catalog.open_write(&id).unwrap();
        sink.write_all(b"payload").unwrap();
        drop(sink);

        assert_eq!(catalog.size(&id), 7);
        assert!(catalog.open_read(&id).is_ok());
    }
}
