//! Opaque file handles.
//!
//! Upper layers never see a raw platform path. A [`FileHandle`] is a tagged
//! reference — direct-path backed or catalog backed — with capability methods
//! for reading, writing, and deletion. Identity data (display name, size,
//! MIME type) is captured once when the handle is obtained and is immutable
//! afterwards.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::catalog::{Catalog, RecordId};

/// Image extensions the enumerator picks up.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// MIME type derived from a file name's extension.
pub fn mime_for_name(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}

/// The storage a handle resolves through.
pub enum Backing {
    /// A plain filesystem path.
    Path(PathBuf),
    /// A record in a catalog; all access is routed through the catalog.
    Catalog { catalog: Arc<Catalog>, id: RecordId },
}

/// An opaque reference to a file-like resource.
pub struct FileHandle {
    backing: Backing,
    display_name: String,
    size: i64,
    mime: String,
}

impl FileHandle {
    /// Wrap an existing file on disk.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let meta = fs::metadata(&path)
            .with_context(|| format!("failed to stat {}", path.display()))?;
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", path.display()))?;
        let mime = mime_for_name(&display_name).to_string();
        Ok(FileHandle {
            backing: Backing::Path(path),
            display_name,
            size: meta.len() as i64,
            mime,
        })
    }

    /// Wrap an existing catalog record.
    pub fn from_catalog(catalog: Arc<Catalog>, id: RecordId) -> Result<Self> {
        let record = catalog
            .record(&id)
            .with_context(|| format!("no catalog record for {}", id.as_str()))?;
        let size = catalog.size(&id);
        Ok(FileHandle {
            display_name: record.display_name,
            mime: record.mime,
            size,
            backing: Backing::Catalog { catalog, id },
        })
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Byte size at the time the handle was obtained. -1 when unknown.
    pub fn size(&self) -> i64 {
        self.size
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn backing(&self) -> &Backing {
        &self.backing
    }

    /// The underlying path, for direct-path handles only.
    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Path(p) => Some(p),
            Backing::Catalog { .. } => None,
        }
    }

    pub fn open_read(&self) -> Result<fs::File> {
        match &self.backing {
            Backing::Path(p) => {
                fs::File::open(p).with_context(|| format!("failed to open {}", p.display()))
            }
            Backing::Catalog { catalog, id } => catalog.open_read(id),
        }
    }

    /// Open a direct read-write descriptor, when the backing grants one.
    ///
    /// Catalog-backed handles never grant direct random access; writes to
    /// them must go through [`open_write`](Self::open_write).
    pub fn open_rw(&self) -> Result<fs::File> {
        match &self.backing {
            Backing::Path(p) => fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open(p)
                .with_context(|| format!("no read-write access to {}", p.display())),
            Backing::Catalog { .. } => Err(anyhow::Error::from(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "catalog-backed handles do not grant direct read-write access",
            ))),
        }
    }

    /// Open a truncating write channel over the resource.
    pub fn open_write(&self) -> Result<fs::File> {
        match &self.backing {
            Backing::Path(p) => fs::OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(p)
                .with_context(|| format!("failed to open {} for writing", p.display())),
            Backing::Catalog { catalog, id } => catalog.open_write(id),
        }
    }

    /// Remove the underlying resource.
    pub fn delete(&self) -> Result<()> {
        match &self.backing {
            Backing::Path(p) => {
                fs::remove_file(p).with_context(|| format!("failed to remove {}", p.display()))
            }
            Backing::Catalog { catalog, id } => catalog.delete(id),
        }
    }
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = match &self.backing {
            Backing::Path(_) => "path",
            Backing::Catalog { .. } => "catalog",
        };
        f.debug_struct("FileHandle")
            .field("scheme", &scheme)
            .field("display_name", &self.display_name)
            .field("size", &self.size)
            .field("mime", &self.mime)
            .finish()
    }
}

/// Collect handles for supported image files from the given paths.
///
/// Accepts a mix of file paths and directory paths. Directories are walked
/// recursively (following symlinks); the result preserves traversal order.
pub fn collect_handles(paths: &[PathBuf]) -> Vec<FileHandle> {
    let mut handles = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_supported_image(path) {
                match FileHandle::from_path(path) {
                    Ok(h) => handles.push(h),
                    Err(e) => log::warn!("Skipping {}: {e}", path.display()),
                }
            } else {
                log::warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let p = entry.path();
                if p.is_file() && is_supported_image(p) {
                    match FileHandle::from_path(p) {
                        Ok(h) => handles.push(h),
                        Err(e) => log::warn!("Skipping {}: {e}", p.display()),
                    }
                }
            }
        } else {
            log::warn!("Path does not exist: {}", path.display());
        }
    }

    handles
}

/// Check if a file has a supported image extension.
fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
