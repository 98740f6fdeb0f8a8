// Core library for the weblake access-log pipeline

pub mod cli;
pub mod clock;
pub mod collector;
pub mod config;
pub mod config_file;
pub mod decompression;
pub mod error;
pub mod orchestrator;
pub mod parsers;
pub mod readiness;
pub mod record;
pub mod schema;
pub mod stats;
pub mod store;
pub mod transform;
pub mod uploader;

pub use cli::{Cli, Command};
pub use clock::{Clock, FixedClock, SystemClock};
pub use collector::{CollectOutcome, RawLogCollector};
pub use config::{StoreKind, WeblakeConfig};
pub use config_file::ConfigFile;
pub use error::{
    CollectionFailure, DecodeFailure, ParseFailure, StoreError, TransformFailure, UploadFailure,
};
pub use orchestrator::{
    PipelineFailure, PipelineOptions, PipelineOrchestrator, PipelineReport, PipelineState, Stage,
};
pub use parsers::{CombinedLogParser, LineParser};
pub use readiness::{ReadinessGate, Sleeper, ThreadSleeper};
pub use record::{StoredRecord, StructuredLogRecord};
pub use schema::{HiveDdlScript, SchemaProvisioner, SchemaRequest};
pub use stats::{CollectStats, PipelineStats, TransformStats};
pub use store::{
    latest_artifact, ArtifactRef, ArtifactStore, EntryKind, LocalStore, MemoryStore, StoreEntry,
    StoreLayout, WebHdfsStore,
};
pub use transform::{OutputFormat, RecordTransformer, TransformOutcome};
pub use uploader::{Batch, BatchUploader};
