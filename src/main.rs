use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use weblake::cli::{Cli, Command};
use weblake::config::{StoreKind, WeblakeConfig};
use weblake::config_file::ConfigFile;
use weblake::orchestrator::{PipelineFailure, PipelineOrchestrator, PipelineReport};
use weblake::readiness::{ReadinessGate, ThreadSleeper};
use weblake::stats::PipelineStats;
use weblake::store::{latest_artifact, ArtifactRef, ArtifactStore, LocalStore, MemoryStore, WebHdfsStore};
use weblake::{CombinedLogParser, HiveDdlScript, RawLogCollector, RecordTransformer, SystemClock};

/// Process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    GeneralError = 1,
    InvalidUsage = 2,
}

impl ExitCode {
    fn exit(self) -> ! {
        process::exit(self as i32)
    }
}

fn init_tracing(cli: &Cli) {
    // RUST_LOG wins over -v / -q
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| cli.log_directive().into());
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let config_file = if cli.no_config {
        ConfigFile::default()
    } else {
        match ConfigFile::load_with_custom_path(cli.config_file.as_deref()) {
            Ok(file) => file,
            Err(e) => {
                eprintln!("weblake: Error: {:#}", e);
                ExitCode::InvalidUsage.exit();
            }
        }
    };

    let config = match WeblakeConfig::resolve(&cli, &config_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("weblake: Error: {:#}", e);
            ExitCode::InvalidUsage.exit();
        }
    };

    match run(&cli, &config) {
        Ok(code) => code.exit(),
        Err(e) => {
            eprintln!("weblake: Error: {:#}", e);
            ExitCode::GeneralError.exit();
        }
    }
}

fn open_store(config: &WeblakeConfig) -> Result<Box<dyn ArtifactStore>> {
    let store: Box<dyn ArtifactStore> = match config.store.kind {
        StoreKind::Local => Box::new(LocalStore::open_root(&config.store.root).with_context(|| {
            format!("Failed to open local store at {}", config.store.root.display())
        })?),
        StoreKind::Webhdfs => Box::new(
            WebHdfsStore::connect(&config.webhdfs()).context("Failed to set up WebHDFS client")?,
        ),
        StoreKind::Memory => Box::new(MemoryStore::new()),
    };
    Ok(store)
}

fn run(cli: &Cli, config: &WeblakeConfig) -> Result<ExitCode> {
    let store = open_store(config)?;
    let store = store.as_ref();

    let sleeper = ThreadSleeper;
    let gate = ReadinessGate::new(
        config.readiness.max_retries,
        config.readiness.interval,
        &sleeper,
    );
    let store_name = config.store_description();
    if !gate.await_ready(&store_name, || Ok(store.exists("/")?)) {
        eprintln!("weblake: Error: {} is not available", store_name);
        return Ok(ExitCode::GeneralError);
    }

    let layout = config.layout();
    let clock = SystemClock;
    let parser = CombinedLogParser::new()?;

    match &cli.command {
        Command::Run(_) => {
            let provisioner = HiveDdlScript::new(store);
            let options = config.pipeline_options(cli);
            let outcome = PipelineOrchestrator::new(store, &clock, &layout, &parser, &provisioner)
                .run(&options);
            match outcome {
                Ok(report) => {
                    print_report(&report);
                    Ok(ExitCode::Success)
                }
                Err(failure) => {
                    print_failure(&failure);
                    Ok(ExitCode::GeneralError)
                }
            }
        }
        Command::Collect(args) => {
            layout
                .initialize(store)
                .context("Failed to prepare store directories")?;
            let collected = RawLogCollector::new(store, &clock, &layout, &parser)
                .collect(&args.file, config.pipeline.batch_size);
            match collected {
                Ok(outcome) => {
                    println!("{}", outcome.artifact);
                    let stats = PipelineStats {
                        collect: Some(outcome.stats),
                        ..Default::default()
                    };
                    eprintln!("{}", stats.format_stats());
                    Ok(ExitCode::Success)
                }
                Err(failure) => {
                    let stats = PipelineStats {
                        collect: Some(failure.stats()),
                        ..Default::default()
                    };
                    eprintln!("weblake: Error: {:#}", anyhow::Error::from(failure));
                    eprintln!("Partial progress: {}", stats.format_stats());
                    Ok(ExitCode::GeneralError)
                }
            }
        }
        Command::Transform(args) => {
            layout
                .initialize(store)
                .context("Failed to prepare store directories")?;
            let source = match &args.raw {
                Some(raw) => ArtifactRef::new(raw.as_str()),
                None => latest_artifact(store, &layout.raw_dir)
                    .context("Cannot pick a raw artifact to transform")?,
            };
            let transformed = RecordTransformer::new(store, &clock, &layout)
                .transform(&source, config.pipeline.format);
            match transformed {
                Ok(outcome) => {
                    println!("{}", outcome.artifact);
                    let stats = PipelineStats {
                        transform: Some(outcome.stats),
                        ..Default::default()
                    };
                    eprintln!("{}", stats.format_stats());
                    Ok(ExitCode::Success)
                }
                Err(failure) => {
                    let stats = PipelineStats {
                        transform: Some(failure.stats()),
                        ..Default::default()
                    };
                    eprintln!("weblake: Error: {:#}", anyhow::Error::from(failure));
                    eprintln!("Partial progress: {}", stats.format_stats());
                    Ok(ExitCode::GeneralError)
                }
            }
        }
    }
}

fn print_report(report: &PipelineReport) {
    if let Some(raw) = &report.raw_artifact {
        println!("raw:       {}", raw);
    }
    if let Some(processed) = &report.processed_artifact {
        println!("processed: {}", processed);
    }
    if let Some(schema) = &report.schema_artifact {
        println!("schema:    {}", schema);
    }
    eprintln!("{}", report.stats.format_stats());
}

fn print_failure(failure: &PipelineFailure) {
    eprintln!(
        "weblake: Error: {} stage failed: {:#}",
        failure.stage, failure.cause
    );
    if let Some(raw) = &failure.report.raw_artifact {
        eprintln!("Raw artifact (may be partial): {}", raw);
    }
    eprintln!("Partial progress: {}", failure.report.stats.format_stats());
}
