//! Append-only artifact store.
//!
//! The pipeline only ever talks to the distributed filesystem through the six
//! primitives on [`ArtifactStore`]. Paths are logical, slash-separated and
//! absolute (`/logs/raw/weblogs_20231010_135536.json`); each backend maps them
//! onto its own namespace.

pub mod local;
pub mod memory;
pub mod webhdfs;

use std::fmt;
use std::io::Read;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::info;

use crate::clock::Clock;
use crate::error::StoreError;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use webhdfs::WebHdfsStore;

/// Timestamp suffix used in artifact names
pub const ARTIFACT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Give up allocating a unique name after this many collisions
const MAX_NAME_COLLISIONS: usize = 1000;

/// Logical path of an artifact in the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(normalize_path(&path.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path component
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Parent directory, `/` for top-level entries
    pub fn parent(&self) -> &str {
        match self.0.rfind('/') {
            Some(0) | None => "/",
            Some(idx) => &self.0[..idx],
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Make a path absolute and strip duplicate / trailing slashes
pub fn normalize_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    format!("/{}", parts.join("/"))
}

/// Join a directory and a child name into a logical path
pub fn join_path(dir: &str, name: &str) -> String {
    normalize_path(&format!("{}/{}", dir, name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One child returned by [`ArtifactStore::list`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    pub length: u64,
    pub modified: DateTime<Utc>,
}

/// Narrow view of the distributed filesystem.
///
/// `create` overwrites, `append` requires an existing file. Neither creates
/// missing parent directories.
pub trait ArtifactStore {
    fn exists(&self, path: &str) -> Result<bool, StoreError>;
    fn mkdirs(&self, path: &str) -> Result<(), StoreError>;
    fn create(&self, path: &str, data: &[u8]) -> Result<(), StoreError>;
    fn append(&self, path: &str, data: &[u8]) -> Result<(), StoreError>;
    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>, StoreError>;
    fn list(&self, path: &str) -> Result<Vec<StoreEntry>, StoreError>;
}

/// Where raw, processed and schema artifacts live, and how they are named
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    pub base_dir: String,
    pub raw_dir: String,
    pub processed_dir: String,
    pub schema_dir: String,
    pub base_name: String,
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self::under("/logs", "weblogs")
    }
}

impl StoreLayout {
    pub fn under(base_dir: &str, base_name: &str) -> Self {
        let base_dir = normalize_path(base_dir);
        Self {
            raw_dir: join_path(&base_dir, "raw"),
            processed_dir: join_path(&base_dir, "processed"),
            schema_dir: join_path(&base_dir, "schema"),
            base_dir,
            base_name: base_name.to_string(),
        }
    }

    /// Create any missing directory of the layout
    pub fn initialize(&self, store: &dyn ArtifactStore) -> Result<(), StoreError> {
        for dir in [
            &self.base_dir,
            &self.raw_dir,
            &self.processed_dir,
            &self.schema_dir,
        ] {
            if !store.exists(dir)? {
                info!(directory = %dir, "Creating store directory");
                store.mkdirs(dir)?;
            }
        }
        Ok(())
    }
}

/// `<base>_<YYYYMMDD_HHMMSS>.<ext>`, with `_<n>` inserted on collision
pub fn artifact_name(base_name: &str, at: NaiveDateTime, ext: &str, collision: usize) -> String {
    let stamp = at.format(ARTIFACT_TIMESTAMP_FORMAT);
    if collision == 0 {
        format!("{}_{}.{}", base_name, stamp, ext)
    } else {
        format!("{}_{}_{}.{}", base_name, stamp, collision, ext)
    }
}

/// Allocate a timestamp-derived artifact path that does not exist yet
pub fn fresh_artifact(
    store: &dyn ArtifactStore,
    clock: &dyn Clock,
    dir: &str,
    base_name: &str,
    ext: &str,
) -> Result<ArtifactRef, StoreError> {
    let at = clock.now();
    for collision in 0..MAX_NAME_COLLISIONS {
        let path = join_path(dir, &artifact_name(base_name, at, ext, collision));
        if !store.exists(&path)? {
            return Ok(ArtifactRef::new(path));
        }
    }
    Err(StoreError::Protocol {
        op: "allocate",
        path: dir.to_string(),
        message: format!(
            "more than {} artifacts named {}_{}",
            MAX_NAME_COLLISIONS,
            base_name,
            at.format(ARTIFACT_TIMESTAMP_FORMAT)
        ),
    })
}

/// Why no newest artifact could be selected
#[derive(Debug, thiserror::Error)]
pub enum LatestArtifactError {
    #[error("directory {0} does not exist")]
    MissingDirectory(String),
    #[error("no artifact found in {0}")]
    Empty(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Newest file in `dir` by modification time; name breaks ties
pub fn latest_artifact(
    store: &dyn ArtifactStore,
    dir: &str,
) -> Result<ArtifactRef, LatestArtifactError> {
    if !store.exists(dir)? {
        return Err(LatestArtifactError::MissingDirectory(dir.to_string()));
    }
    store
        .list(dir)?
        .into_iter()
        .filter(|entry| entry.kind == EntryKind::File)
        .max_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)))
        .map(|entry| ArtifactRef::new(entry.path))
        .ok_or_else(|| LatestArtifactError::Empty(dir.to_string()))
}
