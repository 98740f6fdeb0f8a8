use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::anyhow;
use tracing::{error, info};

use crate::clock::Clock;
use crate::collector::RawLogCollector;
use crate::parsers::LineParser;
use crate::schema::{SchemaProvisioner, SchemaRequest, DEFAULT_DATABASE};
use crate::stats::PipelineStats;
use crate::store::{latest_artifact, ArtifactRef, ArtifactStore, StoreLayout};
use crate::transform::{OutputFormat, RecordTransformer};
use crate::uploader::DEFAULT_BATCH_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Collecting,
    Transforming,
    SchemaProvisioning,
    Done,
    Failed,
}

/// Which part of the run a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Initialize,
    Collect,
    Transform,
    Schema,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Initialize => "initialize",
            Stage::Collect => "collect",
            Stage::Transform => "transform",
            Stage::Schema => "schema",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub source: Option<PathBuf>,
    pub batch_size: usize,
    pub format: OutputFormat,
    pub database: String,
    pub skip_collect: bool,
    pub skip_transform: bool,
    pub skip_schema: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            source: None,
            batch_size: DEFAULT_BATCH_SIZE,
            format: OutputFormat::default(),
            database: DEFAULT_DATABASE.to_string(),
            skip_collect: false,
            skip_transform: false,
            skip_schema: false,
        }
    }
}

/// What a run produced, including partial progress when it failed
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub raw_artifact: Option<ArtifactRef>,
    pub processed_artifact: Option<ArtifactRef>,
    pub schema_artifact: Option<ArtifactRef>,
    pub stats: PipelineStats,
    pub transitions: Vec<PipelineState>,
}

#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {cause:#}")]
pub struct PipelineFailure {
    pub stage: Stage,
    pub cause: anyhow::Error,
    pub report: PipelineReport,
}

/// Runs collect, transform and schema provisioning in order, stopping at the
/// first failure
pub struct PipelineOrchestrator<'a> {
    store: &'a dyn ArtifactStore,
    clock: &'a dyn Clock,
    layout: &'a StoreLayout,
    parser: &'a dyn LineParser,
    provisioner: &'a dyn SchemaProvisioner,
    state: PipelineState,
    report: PipelineReport,
    started: Instant,
}

impl<'a> PipelineOrchestrator<'a> {
    pub fn new(
        store: &'a dyn ArtifactStore,
        clock: &'a dyn Clock,
        layout: &'a StoreLayout,
        parser: &'a dyn LineParser,
        provisioner: &'a dyn SchemaProvisioner,
    ) -> Self {
        Self {
            store,
            clock,
            layout,
            parser,
            provisioner,
            state: PipelineState::Idle,
            report: PipelineReport {
                transitions: vec![PipelineState::Idle],
                ..Default::default()
            },
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn enter(&mut self, state: PipelineState) {
        self.state = state;
        self.report.transitions.push(state);
    }

    fn fail(mut self, stage: Stage, cause: anyhow::Error) -> PipelineFailure {
        self.enter(PipelineState::Failed);
        self.report.stats.processing_time = self.started.elapsed();
        error!(%stage, error = %format!("{:#}", cause), "Pipeline halted");
        PipelineFailure {
            stage,
            cause,
            report: self.report,
        }
    }

    pub fn run(mut self, options: &PipelineOptions) -> Result<PipelineReport, PipelineFailure> {
        self.started = Instant::now();

        if let Err(e) = self.layout.initialize(self.store) {
            return Err(self.fail(Stage::Initialize, e.into()));
        }

        let mut raw_artifact = None;

        if !options.skip_collect {
            self.enter(PipelineState::Collecting);
            info!("=== Stage 1: collecting logs ===");
            let Some(source) = options.source.as_deref() else {
                return Err(self.fail(Stage::Collect, anyhow!("no source log file given")));
            };
            let collected = RawLogCollector::new(self.store, self.clock, self.layout, self.parser)
                .collect(source, options.batch_size);
            match collected {
                Ok(outcome) => {
                    self.report.stats.collect = Some(outcome.stats);
                    self.report.raw_artifact = Some(outcome.artifact.clone());
                    raw_artifact = Some(outcome.artifact);
                }
                Err(e) => {
                    self.report.stats.collect = Some(e.stats());
                    return Err(self.fail(Stage::Collect, e.into()));
                }
            }
        }

        if !options.skip_transform {
            self.enter(PipelineState::Transforming);
            info!("=== Stage 2: transforming logs ===");
            let source = match raw_artifact {
                Some(artifact) => artifact,
                None => match latest_artifact(self.store, &self.layout.raw_dir) {
                    Ok(artifact) => {
                        info!(raw = %artifact, "Using most recent raw artifact");
                        self.report.raw_artifact = Some(artifact.clone());
                        artifact
                    }
                    Err(e) => return Err(self.fail(Stage::Transform, e.into())),
                },
            };
            let transformed = RecordTransformer::new(self.store, self.clock, self.layout)
                .transform(&source, options.format);
            match transformed {
                Ok(outcome) => {
                    self.report.stats.transform = Some(outcome.stats);
                    self.report.processed_artifact = Some(outcome.artifact);
                }
                Err(e) => {
                    self.report.stats.transform = Some(e.stats());
                    return Err(self.fail(Stage::Transform, e.into()));
                }
            }
        }

        if !options.skip_schema {
            self.enter(PipelineState::SchemaProvisioning);
            info!("=== Stage 3: provisioning tables ===");
            let request = SchemaRequest {
                database: &options.database,
                layout: self.layout,
                format: options.format,
            };
            match self.provisioner.provision(&request) {
                Ok(artifact) => self.report.schema_artifact = artifact,
                Err(e) => return Err(self.fail(Stage::Schema, e)),
            }
        }

        self.enter(PipelineState::Done);
        self.report.stats.processing_time = self.started.elapsed();
        info!("Pipeline finished");
        Ok(self.report)
    }
}
