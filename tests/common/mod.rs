// tests/common/mod.rs
// Shared test utilities for integration tests
#![allow(dead_code)]

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Mutex;

use chrono::NaiveDate;
use tempfile::NamedTempFile;
use weblake::{ArtifactStore, FixedClock, MemoryStore, StoreEntry, StoreError};

/// One Combined Log Format line; `n` varies client, path and size
pub fn render_log_line(n: usize) -> String {
    format!(
        r#"10.0.{}.{} - - [10/Oct/2023:13:{:02}:{:02} +0000] "GET /page/{}?q=a,b HTTP/1.1" 200 {} "https://example.com/" "Mozilla/5.0 (X11; Linux x86_64)""#,
        n / 256 % 256,
        n % 256,
        n / 60 % 60,
        n % 60,
        n,
        100 + n
    )
}

pub fn write_log_file(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
    temp_file
        .write_all(content.as_bytes())
        .expect("Failed to write to temp file");
    temp_file.flush().expect("Failed to flush temp file");
    temp_file
}

/// `count` valid lines, newline-terminated
pub fn log_file_with_lines(count: usize) -> NamedTempFile {
    let content: String = (0..count).map(|n| render_log_line(n) + "\n").collect();
    write_log_file(&content)
}

pub fn fixed_clock() -> FixedClock {
    FixedClock::at(
        NaiveDate::from_ymd_opt(2023, 10, 10)
            .unwrap()
            .and_hms_opt(13, 55, 36)
            .unwrap(),
    )
}

/// Memory store that records every mutating call
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    calls: Mutex<Vec<(&'static str, String)>>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, op: &'static str, path: &str) {
        self.calls.lock().unwrap().push((op, path.to_string()));
    }

    /// How many times `op` was called on paths starting with `prefix`
    pub fn count(&self, op: &str, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, p)| *o == op && p.starts_with(prefix))
            .count()
    }
}

impl ArtifactStore for CountingStore {
    fn exists(&self, path: &str) -> Result<bool, StoreError> {
        self.inner.exists(path)
    }

    fn mkdirs(&self, path: &str) -> Result<(), StoreError> {
        self.record("mkdirs", path);
        self.inner.mkdirs(path)
    }

    fn create(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        self.record("create", path);
        self.inner.create(path, data)
    }

    fn append(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        self.record("append", path);
        self.inner.append(path, data)
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>, StoreError> {
        self.inner.open(path)
    }

    fn list(&self, path: &str) -> Result<Vec<StoreEntry>, StoreError> {
        self.inner.list(path)
    }
}

/// Memory store whose writes under `prefix` start failing after
/// `allowed_writes` successful ones
pub struct FailingStore {
    pub inner: MemoryStore,
    prefix: String,
    allowed_writes: usize,
    writes: Mutex<usize>,
}

impl FailingStore {
    pub fn new(prefix: &str, allowed_writes: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            prefix: prefix.to_string(),
            allowed_writes,
            writes: Mutex::new(0),
        }
    }

    fn check_write(&self, path: &str) -> Result<(), StoreError> {
        if !path.starts_with(&self.prefix) {
            return Ok(());
        }
        let mut writes = self.writes.lock().unwrap();
        if *writes >= self.allowed_writes {
            return Err(StoreError::Rejected {
                op: "write",
                path: path.to_string(),
                status: 503,
                message: "injected failure".to_string(),
            });
        }
        *writes += 1;
        Ok(())
    }
}

impl ArtifactStore for FailingStore {
    fn exists(&self, path: &str) -> Result<bool, StoreError> {
        self.inner.exists(path)
    }

    fn mkdirs(&self, path: &str) -> Result<(), StoreError> {
        self.inner.mkdirs(path)
    }

    fn create(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        self.check_write(path)?;
        self.inner.create(path, data)
    }

    fn append(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        self.check_write(path)?;
        self.inner.append(path, data)
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>, StoreError> {
        self.inner.open(path)
    }

    fn list(&self, path: &str) -> Result<Vec<StoreEntry>, StoreError> {
        self.inner.list(path)
    }
}

/// Stored content as text
pub fn read_text(store: &MemoryStore, path: &str) -> String {
    String::from_utf8(store.contents(path).expect("artifact should exist")).unwrap()
}

/// Run the weblake binary with the given arguments
pub fn run_weblake(args: &[&str]) -> (String, String, i32) {
    let binary_path = env!("CARGO_BIN_EXE_weblake");

    let output = Command::new(binary_path)
        .args(args)
        .env_remove("RUST_LOG")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("Failed to execute weblake");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}

/// Run weblake against a local store rooted at `root`, without config files
/// and with a single readiness probe
pub fn run_weblake_local(root: &Path, args: &[&str]) -> (String, String, i32) {
    let root = root.to_str().unwrap();
    let mut full_args = vec![
        "--no-config",
        "--store",
        "local",
        "--store-root",
        root,
        "--wait-retries",
        "1",
    ];
    full_args.extend_from_slice(args);
    run_weblake(&full_args)
}
