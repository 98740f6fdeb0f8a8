use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::stats::{CollectStats, TransformStats};
use crate::store::ArtifactRef;

/// Failure of a store primitive (exists, mkdirs, create, append, open, list)
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} does not exist")]
    NotFound(String),
    #[error("parent directory of {0} does not exist")]
    ParentMissing(String),
    #[error("I/O error on {path}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("request for {path} failed")]
    Http {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("store rejected {op} on {path} (HTTP {status}): {message}")]
    Rejected {
        op: &'static str,
        path: String,
        status: u16,
        message: String,
    },
    #[error("unexpected response for {op} on {path}: {message}")]
    Protocol {
        op: &'static str,
        path: String,
        message: String,
    },
}

/// One access-log line that does not match the Combined Log Format
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}: {original_line}")]
pub struct ParseFailure {
    pub reason: String,
    pub original_line: String,
}

impl ParseFailure {
    pub fn new(reason: impl Into<String>, original_line: &str) -> Self {
        Self {
            reason: reason.into(),
            original_line: original_line.to_string(),
        }
    }
}

/// A batch that could not be durably written
#[derive(Error, Debug)]
#[error("upload to {destination} failed")]
pub struct UploadFailure {
    pub destination: ArtifactRef,
    #[source]
    pub cause: StoreError,
}

/// One stored record that is not a decodable JSON object
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line_number}: {reason}")]
pub struct DecodeFailure {
    pub line_number: usize,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum CollectionFailure {
    #[error("cannot open source {path}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed reading source {path} after {} lines", .stats.lines_read)]
    SourceRead {
        path: PathBuf,
        #[source]
        source: io::Error,
        stats: CollectStats,
    },
    #[error("batch upload failed with {} records already appended", .stats.records_uploaded)]
    Upload {
        #[source]
        source: UploadFailure,
        stats: CollectStats,
    },
    #[error("cannot allocate a raw artifact name")]
    Store {
        #[source]
        source: StoreError,
    },
}

impl CollectionFailure {
    /// Counters achieved before the failure
    pub fn stats(&self) -> CollectStats {
        match self {
            CollectionFailure::SourceRead { stats, .. } | CollectionFailure::Upload { stats, .. } => {
                stats.clone()
            }
            CollectionFailure::SourceUnavailable { .. } | CollectionFailure::Store { .. } => {
                CollectStats::default()
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum TransformFailure {
    #[error("raw artifact {0} does not exist")]
    SourceMissing(ArtifactRef),
    #[error("cannot read raw artifact {source_ref}")]
    SourceRead {
        source_ref: ArtifactRef,
        #[source]
        cause: StoreError,
    },
    #[error("cannot write processed artifact {destination}")]
    Write {
        destination: ArtifactRef,
        #[source]
        cause: StoreError,
        stats: TransformStats,
    },
    #[error("cannot encode processed records: {0}")]
    Encode(String),
}

impl TransformFailure {
    pub fn stats(&self) -> TransformStats {
        match self {
            TransformFailure::Write { stats, .. } => stats.clone(),
            _ => TransformStats::default(),
        }
    }
}
