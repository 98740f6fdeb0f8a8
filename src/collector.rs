use std::io::BufRead;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::decompression::SourceReader;
use crate::error::{CollectionFailure, UploadFailure};
use crate::parsers::LineParser;
use crate::stats::CollectStats;
use crate::store::{fresh_artifact, ArtifactRef, ArtifactStore, StoreLayout};
use crate::uploader::{Batch, BatchUploader};

pub const RAW_EXTENSION: &str = "json";

/// Result of one collection run
#[derive(Debug, Clone)]
pub struct CollectOutcome {
    pub artifact: ArtifactRef,
    pub stats: CollectStats,
}

/// Streams a source log through the parser into a fresh raw artifact
pub struct RawLogCollector<'a> {
    store: &'a dyn ArtifactStore,
    clock: &'a dyn Clock,
    layout: &'a StoreLayout,
    parser: &'a dyn LineParser,
}

impl<'a> RawLogCollector<'a> {
    pub fn new(
        store: &'a dyn ArtifactStore,
        clock: &'a dyn Clock,
        layout: &'a StoreLayout,
        parser: &'a dyn LineParser,
    ) -> Self {
        Self {
            store,
            clock,
            layout,
            parser,
        }
    }

    pub fn collect(&self, source: &Path, batch_size: usize) -> Result<CollectOutcome, CollectionFailure> {
        let mut reader = SourceReader::open(source).map_err(|e| CollectionFailure::SourceUnavailable {
            path: source.to_path_buf(),
            source: e,
        })?;

        let artifact = fresh_artifact(
            self.store,
            self.clock,
            &self.layout.raw_dir,
            &self.layout.base_name,
            RAW_EXTENSION,
        )
        .map_err(|e| CollectionFailure::Store { source: e })?;

        info!(source = %source.display(), destination = %artifact, batch_size, "Starting log collection");

        let uploader = BatchUploader::new(self.store);
        let mut batch = Batch::new(batch_size);
        let mut stats = CollectStats::default();
        let mut buffer = Vec::new();

        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(CollectionFailure::SourceRead {
                        path: source.to_path_buf(),
                        source: e,
                        stats,
                    })
                }
            }
            stats.lines_read += 1;

            let text = String::from_utf8_lossy(&buffer);
            let line = text.trim();
            if line.is_empty() {
                stats.lines_skipped_empty += 1;
                continue;
            }

            match self.parser.parse(line) {
                Ok(record) => {
                    if let Err(e) = batch.push(&record) {
                        warn!(line_number = stats.lines_read, error = %e, "Cannot serialize record, skipping");
                        stats.record_parse_failure(format!("line {}: {}", stats.lines_read, e));
                        continue;
                    }
                    stats.lines_parsed += 1;
                }
                Err(failure) => {
                    warn!(line_number = stats.lines_read, reason = %failure.reason, "Skipping unparseable line");
                    debug!(line = %failure.original_line, "Unparseable line content");
                    stats.record_parse_failure(format!("line {}: {}", stats.lines_read, failure));
                    continue;
                }
            }

            if batch.is_full() {
                self.flush(&uploader, &mut batch, &artifact, &mut stats)?;
            }
        }

        if !batch.is_empty() {
            self.flush(&uploader, &mut batch, &artifact, &mut stats)?;
        }

        // Every run leaves exactly one artifact behind, even with no records
        if stats.batches_uploaded == 0 {
            self.store
                .create(artifact.as_str(), b"")
                .map_err(|cause| CollectionFailure::Upload {
                    source: UploadFailure {
                        destination: artifact.clone(),
                        cause,
                    },
                    stats: stats.clone(),
                })?;
        }

        info!(
            destination = %artifact,
            lines = stats.lines_read,
            records = stats.records_uploaded,
            unparseable = stats.parse_failures,
            "Collection finished"
        );

        Ok(CollectOutcome { artifact, stats })
    }

    fn flush(
        &self,
        uploader: &BatchUploader<'_>,
        batch: &mut Batch,
        artifact: &ArtifactRef,
        stats: &mut CollectStats,
    ) -> Result<(), CollectionFailure> {
        match uploader.flush(batch, artifact) {
            Ok(written) => {
                stats.batches_uploaded += 1;
                stats.records_uploaded += written;
                info!(total = stats.records_uploaded, destination = %artifact, "Uploaded batch");
                Ok(())
            }
            Err(failure) => Err(CollectionFailure::Upload {
                source: failure,
                stats: stats.clone(),
            }),
        }
    }
}
