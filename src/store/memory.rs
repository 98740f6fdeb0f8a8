use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::{join_path, normalize_path, ArtifactStore, EntryKind, StoreEntry};
use crate::error::StoreError;

#[derive(Debug)]
struct MemoryFile {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, MemoryFile>,
    tick: i64,
}

impl MemoryState {
    // Every mutation gets a strictly later modification time
    fn next_modified(&mut self) -> DateTime<Utc> {
        self.tick += 1;
        DateTime::<Utc>::from_timestamp(self.tick, 0).unwrap_or_default()
    }

    fn parent_exists(&self, path: &str) -> bool {
        let parent = match path.rfind('/') {
            Some(0) | None => "/",
            Some(idx) => &path[..idx],
        };
        parent == "/" || self.dirs.contains(parent)
    }
}

/// In-process store, used for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current content of a file, if any
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        let path = normalize_path(path);
        self.state().files.get(&path).map(|f| f.data.clone())
    }

    /// All file paths, sorted
    pub fn file_paths(&self) -> Vec<String> {
        self.state().files.keys().cloned().collect()
    }
}

impl ArtifactStore for MemoryStore {
    fn exists(&self, path: &str) -> Result<bool, StoreError> {
        let path = normalize_path(path);
        let state = self.state();
        Ok(path == "/" || state.dirs.contains(&path) || state.files.contains_key(&path))
    }

    fn mkdirs(&self, path: &str) -> Result<(), StoreError> {
        let path = normalize_path(path);
        let mut state = self.state();
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = join_path(&current, part);
            if state.files.contains_key(&current) {
                return Err(StoreError::Protocol {
                    op: "mkdirs",
                    path: current,
                    message: "a file exists at this path".to_string(),
                });
            }
            state.dirs.insert(current.clone());
        }
        Ok(())
    }

    fn create(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        let path = normalize_path(path);
        let mut state = self.state();
        if !state.parent_exists(&path) {
            return Err(StoreError::ParentMissing(path));
        }
        let modified = state.next_modified();
        state.files.insert(
            path,
            MemoryFile {
                data: data.to_vec(),
                modified,
            },
        );
        Ok(())
    }

    fn append(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        let path = normalize_path(path);
        let mut state = self.state();
        let modified = state.next_modified();
        match state.files.get_mut(&path) {
            Some(file) => {
                file.data.extend_from_slice(data);
                file.modified = modified;
                Ok(())
            }
            None => Err(StoreError::NotFound(path)),
        }
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>, StoreError> {
        let path = normalize_path(path);
        match self.state().files.get(&path) {
            Some(file) => Ok(Box::new(Cursor::new(file.data.clone()))),
            None => Err(StoreError::NotFound(path)),
        }
    }

    fn list(&self, path: &str) -> Result<Vec<StoreEntry>, StoreError> {
        let path = normalize_path(path);
        let state = self.state();
        if path != "/" && !state.dirs.contains(&path) {
            return Err(StoreError::NotFound(path));
        }

        let is_child = |candidate: &str| {
            candidate != path
                && candidate.starts_with(&path)
                && !candidate[path.len()..].trim_start_matches('/').contains('/')
                && (path == "/" || candidate[path.len()..].starts_with('/'))
        };

        let mut entries: Vec<StoreEntry> = state
            .dirs
            .iter()
            .filter(|d| is_child(d))
            .map(|d| StoreEntry {
                name: d.rsplit('/').next().unwrap_or_default().to_string(),
                path: d.clone(),
                kind: EntryKind::Directory,
                length: 0,
                modified: DateTime::<Utc>::default(),
            })
            .collect();
        entries.extend(state.files.iter().filter(|(p, _)| is_child(p)).map(|(p, f)| {
            StoreEntry {
                name: p.rsplit('/').next().unwrap_or_default().to_string(),
                path: p.clone(),
                kind: EntryKind::File,
                length: f.data.len() as u64,
                modified: f.modified,
            }
        }));
        Ok(entries)
    }
}
