//! Destination resolution.
//!
//! Given a source handle and a desired file name, [`resolve`] decides where a
//! derived file legally belongs: a direct filesystem path when one can be
//! derived from the source, otherwise a catalog insertion descriptor. Both
//! strategies walk the same numbered-suffix ladder on collisions, and the
//! catalog ladder additionally clears stale records — dangling entries whose
//! backing resource is empty or unreadable — before giving up on a name.
//!
//! Deleting a stale record is the only destructive action the resolver
//! performs on data it does not own.

mod write;

pub use write::{FinalizedWrite, WriteHandle, WriteState};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog::{Catalog, CatalogRecord, Collection};
use crate::error::OpError;
use crate::handle::{Backing, FileHandle, mime_for_name};

/// Suffix ladder cap for both resolution strategies.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// A resolved write target. Exactly one form per target.
#[derive(Debug, Clone, PartialEq)]
pub enum DestinationTarget {
    /// A direct filesystem location.
    Direct { dir: PathBuf, file_name: String },
    /// A catalog insertion descriptor; the record is created provisional
    /// when the write handle opens it.
    Indexed {
        collection: Collection,
        relative_dir: String,
        display_name: String,
        mime: String,
    },
}

impl DestinationTarget {
    /// The display name the target resolves to.
    pub fn display_name(&self) -> &str {
        match self {
            DestinationTarget::Direct { file_name, .. } => file_name,
            DestinationTarget::Indexed { display_name, .. } => display_name,
        }
    }
}

/// Resolve a legal, collision-free write target for `desired_name`.
///
/// Tries a direct filesystem write under a directory derived from the source
/// first; falls back to a catalog-backed target when no directory is
/// derivable or the direct attempt fails for a non-fatal reason. Collision
/// freedom is best-effort: concurrent writers are not coordinated.
pub fn resolve(
    source: &FileHandle,
    desired_name: &str,
    catalog: &Arc<Catalog>,
) -> Result<DestinationTarget, OpError> {
    if let Some(dir) = derive_direct_dir(source, catalog) {
        match resolve_direct(&dir, desired_name) {
            Ok(target) => return Ok(target),
            Err(e) => {
                log::debug!(
                    "direct resolution under {} failed ({e}); falling back to catalog",
                    dir.display()
                );
            }
        }
    } else {
        log::debug!("no absolute directory derivable for {}", source.display_name());
    }
    resolve_indexed(source, desired_name, catalog)
}

/// Derive an absolute directory for the source, when one exists.
///
/// Direct-path sources use their parent directory. Catalog sources decode
/// the record id for a volume and relative-directory hint; when the hint
/// does not match the catalog's volume, the source's collection is used as
/// a heuristic, defaulting to the generic Pictures area.
fn derive_direct_dir(source: &FileHandle, catalog: &Arc<Catalog>) -> Option<PathBuf> {
    match source.backing() {
        Backing::Path(path) => path.parent().map(Path::to_path_buf),
        Backing::Catalog { catalog: source_catalog, id } => {
            if let Some((volume, relative_dir)) = id.decode() {
                if volume == catalog.volume() && !relative_dir.is_empty() {
                    return Some(catalog.root().join(relative_dir));
                }
            }
            let guess = source_catalog
                .record(id)
                .map(|r| r.collection.dir_name())
                .unwrap_or(Collection::DefaultImages.dir_name());
            Some(catalog.root().join(guess))
        }
    }
}

/// Probe `desired_name` and numbered variants for a free direct path.
fn resolve_direct(dir: &Path, desired_name: &str) -> anyhow::Result<DestinationTarget> {
    fs::create_dir_all(dir)?;
    for n in 0..=MAX_NAME_ATTEMPTS {
        let candidate = numbered_name(desired_name, n);
        if !dir.join(&candidate).exists() {
            return Ok(DestinationTarget::Direct {
                dir: dir.to_path_buf(),
                file_name: candidate,
            });
        }
    }
    anyhow::bail!("suffix ladder exhausted for \"{desired_name}\" in {}", dir.display())
}

/// Probe the catalog for a free (collection, relative_dir, name) slot.
///
/// A name occupied by a stale record — size ≤ 0 or unreadable — has that
/// record deleted and is retried once before the ladder advances.
pub fn resolve_indexed(
    source: &FileHandle,
    desired_name: &str,
    catalog: &Arc<Catalog>,
) -> Result<DestinationTarget, OpError> {
    let (collection, relative_dir) = indexed_location(source, catalog);
    let mime = mime_for_name(desired_name).to_string();

    let mut n = 0u32;
    let mut retried_stale = false;
    while n <= MAX_NAME_ATTEMPTS {
        let candidate = numbered_name(desired_name, n);
        match catalog.find_by_name(&relative_dir, &candidate) {
            None => {
                // A recordless file on disk still blocks the insertion.
                if catalog.has_backing_file(&relative_dir, &candidate) {
                    retried_stale = false;
                    n += 1;
                    continue;
                }
                return Ok(DestinationTarget::Indexed {
                    collection,
                    relative_dir,
                    display_name: candidate,
                    mime,
                });
            }
            Some(record) => {
                if !retried_stale && is_stale(catalog, &record) {
                    log::info!(
                        "removing stale catalog record {}/{}",
                        relative_dir, candidate
                    );
                    if catalog.delete(&record.id).is_ok() {
                        retried_stale = true;
                        continue; // retry the same name once
                    }
                }
                retried_stale = false;
                n += 1;
            }
        }
    }
    Err(OpError::NoLegalTarget(desired_name.to_string()))
}

/// Collection and relative directory for a catalog-backed target, derived
/// from the source's location hint.
fn indexed_location(source: &FileHandle, catalog: &Arc<Catalog>) -> (Collection, String) {
    let relative_dir = match source.backing() {
        Backing::Path(path) => path
            .parent()
            .and_then(|d| d.strip_prefix(catalog.root()).ok())
            .map(|r| r.to_string_lossy().into_owned()),
        Backing::Catalog { id, .. } => id.decode().map(|(_, rel)| rel.to_string()),
    };
    let relative_dir = relative_dir
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| Collection::DefaultImages.dir_name().to_string());
    let top_level = relative_dir.split(['/', '\\']).next().unwrap_or("");
    (Collection::from_top_level(top_level), relative_dir)
}

/// A record is stale when its backing resource is gone for practical
/// purposes: zero or negative size, or unreadable.
fn is_stale(catalog: &Arc<Catalog>, record: &CatalogRecord) -> bool {
    catalog.size(&record.id) <= 0 || catalog.open_read(&record.id).is_err()
}

/// `name` unchanged for n = 0; `base(n).ext` beyond that, where `base` is the
/// name with its final extension removed.
fn numbered_name(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((base, ext)) => format!("{base}({n}).{ext}"),
        None => format!("{name}({n})"),
    }
}
