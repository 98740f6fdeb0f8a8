use tracing::debug;

use crate::error::{StoreError, UploadFailure};
use crate::record::StructuredLogRecord;
use crate::store::{ArtifactRef, ArtifactStore};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Serialized records waiting to be written, bounded by `max_records`
#[derive(Debug, Clone)]
pub struct Batch {
    lines: Vec<String>,
    max_records: usize,
}

impl Batch {
    pub fn new(max_records: usize) -> Self {
        let max_records = max_records.max(1);
        Self {
            lines: Vec::with_capacity(max_records.min(DEFAULT_BATCH_SIZE)),
            max_records,
        }
    }

    pub fn push(&mut self, record: &StructuredLogRecord) -> serde_json::Result<()> {
        self.lines.push(record.to_json_line()?);
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.lines.len() >= self.max_records
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

/// Newline-delimited payload; every line, including the last, ends in `\n`
/// so consecutive appends never fuse two records
fn encode_lines(lines: &[String]) -> Vec<u8> {
    let capacity = lines.iter().map(|l| l.len() + 1).sum();
    let mut payload = Vec::with_capacity(capacity);
    for line in lines {
        payload.extend_from_slice(line.as_bytes());
        payload.push(b'\n');
    }
    payload
}

/// Appends batches of records to a raw artifact, creating it on first write
pub struct BatchUploader<'a> {
    store: &'a dyn ArtifactStore,
}

impl<'a> BatchUploader<'a> {
    pub fn new(store: &'a dyn ArtifactStore) -> Self {
        Self { store }
    }

    /// Serialize and append `records`; returns how many were written
    pub fn append(
        &self,
        records: &[StructuredLogRecord],
        destination: &ArtifactRef,
    ) -> Result<usize, UploadFailure> {
        let lines = records
            .iter()
            .map(StructuredLogRecord::to_json_line)
            .collect::<serde_json::Result<Vec<_>>>()
            .map_err(|e| UploadFailure {
                destination: destination.clone(),
                cause: StoreError::Protocol {
                    op: "encode",
                    path: destination.to_string(),
                    message: e.to_string(),
                },
            })?;
        self.append_lines(&lines, destination)
    }

    /// Write a full batch and clear it; the batch is left intact on failure
    pub fn flush(&self, batch: &mut Batch, destination: &ArtifactRef) -> Result<usize, UploadFailure> {
        let written = self.append_lines(batch.lines(), destination)?;
        batch.clear();
        Ok(written)
    }

    fn append_lines(&self, lines: &[String], destination: &ArtifactRef) -> Result<usize, UploadFailure> {
        if lines.is_empty() {
            return Ok(0);
        }
        let payload = encode_lines(lines);
        let failure = |cause| UploadFailure {
            destination: destination.clone(),
            cause,
        };

        // Single writer: nothing else touches the artifact between the check and the write
        if self.store.exists(destination.as_str()).map_err(failure)? {
            debug!(destination = %destination, records = lines.len(), "Appending batch");
            self.store
                .append(destination.as_str(), &payload)
                .map_err(failure)?;
        } else {
            debug!(destination = %destination, records = lines.len(), "Creating artifact with first batch");
            self.store
                .create(destination.as_str(), &payload)
                .map_err(failure)?;
        }
        Ok(lines.len())
    }
}
