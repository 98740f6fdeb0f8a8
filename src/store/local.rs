use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{join_path, normalize_path, ArtifactStore, EntryKind, StoreEntry};
use crate::error::StoreError;

/// Store backed by a directory on the local filesystem.
///
/// Logical path `/logs/raw/x.json` lives at `<root>/logs/raw/x.json`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open a store rooted at `root`, creating the root directory if needed
    pub fn open_root(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let logical = normalize_path(path);
        let mut resolved = self.root.clone();
        for part in logical.split('/').filter(|p| !p.is_empty() && *p != "..") {
            resolved.push(part);
        }
        resolved
    }
}

fn io_error(path: &str, source: io::Error) -> StoreError {
    if source.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(normalize_path(path))
    } else {
        StoreError::Io {
            path: normalize_path(path),
            source,
        }
    }
}

impl ArtifactStore for LocalStore {
    fn exists(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.resolve(path).exists())
    }

    fn mkdirs(&self, path: &str) -> Result<(), StoreError> {
        fs::create_dir_all(self.resolve(path)).map_err(|e| io_error(path, e))
    }

    fn create(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        let target = self.resolve(path);
        if !target.parent().is_some_and(Path::is_dir) {
            return Err(StoreError::ParentMissing(normalize_path(path)));
        }
        let mut file = File::create(&target).map_err(|e| io_error(path, e))?;
        file.write_all(data).map_err(|e| io_error(path, e))?;
        file.flush().map_err(|e| io_error(path, e))
    }

    fn append(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(self.resolve(path))
            .map_err(|e| io_error(path, e))?;
        file.write_all(data).map_err(|e| io_error(path, e))?;
        file.flush().map_err(|e| io_error(path, e))
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>, StoreError> {
        let file = File::open(self.resolve(path)).map_err(|e| io_error(path, e))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn list(&self, path: &str) -> Result<Vec<StoreEntry>, StoreError> {
        let mut entries = Vec::new();
        for dir_entry in fs::read_dir(self.resolve(path)).map_err(|e| io_error(path, e))? {
            let dir_entry = dir_entry.map_err(|e| io_error(path, e))?;
            let metadata = dir_entry.metadata().map_err(|e| io_error(path, e))?;
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_default();
            entries.push(StoreEntry {
                path: join_path(path, &name),
                name,
                kind: if metadata.is_dir() {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                },
                length: metadata.len(),
                modified,
            });
        }
        Ok(entries)
    }
}
