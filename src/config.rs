use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;

use crate::cli::{Cli, Command};
use crate::config_file::ConfigFile;
use crate::orchestrator::PipelineOptions;
use crate::readiness::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_INTERVAL};
use crate::schema::DEFAULT_DATABASE;
use crate::store::webhdfs::WebHdfsConfig;
use crate::store::StoreLayout;
use crate::transform::OutputFormat;
use crate::uploader::DEFAULT_BATCH_SIZE;

/// Main configuration struct for weblake
#[derive(Debug, Clone, PartialEq)]
pub struct WeblakeConfig {
    pub store: StoreConfig,
    pub pipeline: PipelineConfig,
    pub readiness: ReadinessConfig,
}

/// Which artifact store backs the run
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StoreKind {
    #[default]
    Local,
    Webhdfs,
    Memory,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        <StoreKind as ValueEnum>::from_str(s.trim(), true)
            .map_err(|_| anyhow::anyhow!("unknown store '{}', expected local, webhdfs or memory", s))
    }
}

/// Store configuration
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub root: PathBuf,
    pub hdfs_host: String,
    pub hdfs_port: u16,
    pub hdfs_user: String,
    pub base_dir: String,
    pub base_name: String,
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub format: OutputFormat,
    pub database: String,
}

/// Readiness wait configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessConfig {
    pub max_retries: u32,
    pub interval: Duration,
}

impl Default for WeblakeConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                kind: StoreKind::Local,
                root: PathBuf::from("weblake-data"),
                hdfs_host: "namenode".to_string(),
                hdfs_port: 9870,
                hdfs_user: "root".to_string(),
                base_dir: "/logs".to_string(),
                base_name: "weblogs".to_string(),
            },
            pipeline: PipelineConfig {
                batch_size: DEFAULT_BATCH_SIZE,
                format: OutputFormat::Csv,
                database: DEFAULT_DATABASE.to_string(),
            },
            readiness: ReadinessConfig {
                max_retries: DEFAULT_MAX_RETRIES,
                interval: DEFAULT_RETRY_INTERVAL,
            },
        }
    }
}

fn parse_value<T>(section: &str, values: &HashMap<String, String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    values
        .get(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| anyhow::anyhow!("[{}] {} = '{}': {}", section, key, raw, e))
        })
        .transpose()
}

impl WeblakeConfig {
    /// Build the effective configuration: CLI > config file > defaults
    pub fn resolve(cli: &Cli, file: &ConfigFile) -> Result<Self> {
        let mut config = Self::default();
        config.apply_file(file)?;
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: &ConfigFile) -> Result<()> {
        let store = &file.store;
        if let Some(kind) = parse_value::<StoreKind>("store", store, "kind")? {
            self.store.kind = kind;
        }
        if let Some(root) = store.get("root") {
            self.store.root = PathBuf::from(root);
        }
        if let Some(host) = store.get("hdfs_host") {
            self.store.hdfs_host = host.clone();
        }
        if let Some(port) = parse_value::<u16>("store", store, "hdfs_port")? {
            self.store.hdfs_port = port;
        }
        if let Some(user) = store.get("hdfs_user") {
            self.store.hdfs_user = user.clone();
        }
        if let Some(base_dir) = store.get("base_dir") {
            self.store.base_dir = base_dir.clone();
        }
        if let Some(base_name) = store.get("base_name") {
            self.store.base_name = base_name.clone();
        }

        let pipeline = &file.pipeline;
        if let Some(batch_size) = parse_value::<usize>("pipeline", pipeline, "batch_size")? {
            self.pipeline.batch_size = batch_size;
        }
        if let Some(format) = parse_value::<OutputFormat>("pipeline", pipeline, "format")? {
            self.pipeline.format = format;
        }
        if let Some(database) = pipeline.get("database") {
            self.pipeline.database = database.clone();
        }

        let readiness = &file.readiness;
        if let Some(retries) = parse_value::<u32>("readiness", readiness, "max_retries")? {
            self.readiness.max_retries = retries;
        }
        if let Some(interval) = readiness.get("interval") {
            self.readiness.interval = humantime::parse_duration(interval)
                .with_context(|| format!("[readiness] interval = '{}'", interval))?;
        }

        Ok(())
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(kind) = cli.store {
            self.store.kind = kind;
        }
        if let Some(root) = &cli.store_root {
            self.store.root = root.clone();
        }
        if let Some(host) = &cli.hdfs_host {
            self.store.hdfs_host = host.clone();
        }
        if let Some(port) = cli.hdfs_port {
            self.store.hdfs_port = port;
        }
        if let Some(user) = &cli.hdfs_user {
            self.store.hdfs_user = user.clone();
        }
        if let Some(retries) = cli.wait_retries {
            self.readiness.max_retries = retries;
        }
        if let Some(interval) = cli.wait_interval {
            self.readiness.interval = interval;
        }

        let (batch_size, format, database) = match &cli.command {
            Command::Run(args) => (args.batch_size, args.format, args.database.as_ref()),
            Command::Collect(args) => (args.batch_size, None, None),
            Command::Transform(args) => (None, args.format, None),
        };
        if let Some(batch_size) = batch_size {
            self.pipeline.batch_size = batch_size;
        }
        if let Some(format) = format {
            self.pipeline.format = format;
        }
        if let Some(database) = database {
            self.pipeline.database = database.clone();
        }
    }

    fn validate(&self) -> Result<()> {
        if self.pipeline.batch_size == 0 {
            bail!("batch size must be at least 1");
        }
        if self.store.base_name.is_empty() || self.store.base_name.contains('/') {
            bail!("invalid artifact base name '{}'", self.store.base_name);
        }
        Ok(())
    }

    pub fn layout(&self) -> StoreLayout {
        StoreLayout::under(&self.store.base_dir, &self.store.base_name)
    }

    pub fn webhdfs(&self) -> WebHdfsConfig {
        WebHdfsConfig::new(
            self.store.hdfs_host.clone(),
            self.store.hdfs_port,
            self.store.hdfs_user.clone(),
        )
    }

    /// Human-readable name of the store, used in readiness logs
    pub fn store_description(&self) -> String {
        match self.store.kind {
            StoreKind::Local => format!("local store at {}", self.store.root.display()),
            StoreKind::Webhdfs => format!("WebHDFS at {}:{}", self.store.hdfs_host, self.store.hdfs_port),
            StoreKind::Memory => "in-memory store".to_string(),
        }
    }

    /// Options for one full pipeline run
    pub fn pipeline_options(&self, cli: &Cli) -> PipelineOptions {
        let mut options = PipelineOptions {
            batch_size: self.pipeline.batch_size,
            format: self.pipeline.format,
            database: self.pipeline.database.clone(),
            ..Default::default()
        };
        if let Command::Run(args) = &cli.command {
            options.source = args.log_file.clone();
            options.skip_collect = args.skip_collect;
            options.skip_transform = args.skip_transform;
            options.skip_schema = args.skip_schema;
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("weblake").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = WeblakeConfig::resolve(&cli(&["run"]), &ConfigFile::default()).unwrap();
        assert_eq!(config, WeblakeConfig::default());
        assert_eq!(config.layout().raw_dir, "/logs/raw");
        assert_eq!(config.readiness.interval, Duration::from_secs(10));
    }

    #[test]
    fn test_file_overrides_defaults_and_cli_overrides_file() {
        let mut file = ConfigFile::default();
        file.store.insert("kind".to_string(), "webhdfs".to_string());
        file.store.insert("hdfs_host".to_string(), "hdfs.internal".to_string());
        file.pipeline.insert("batch_size".to_string(), "250".to_string());
        file.pipeline.insert("format".to_string(), "tsv".to_string());
        file.readiness.insert("interval".to_string(), "1m 30s".to_string());

        let config = WeblakeConfig::resolve(
            &cli(&["--hdfs-host", "cli-host", "run", "--batch-size", "5"]),
            &file,
        )
        .unwrap();

        assert_eq!(config.store.kind, StoreKind::Webhdfs);
        assert_eq!(config.store.hdfs_host, "cli-host");
        assert_eq!(config.pipeline.batch_size, 5);
        assert_eq!(config.pipeline.format, OutputFormat::Tsv);
        assert_eq!(config.readiness.interval, Duration::from_secs(90));
    }

    #[test]
    fn test_bad_file_value_names_key() {
        let mut file = ConfigFile::default();
        file.pipeline.insert("batch_size".to_string(), "many".to_string());
        let err = WeblakeConfig::resolve(&cli(&["run"]), &file).unwrap_err();
        assert!(err.to_string().contains("[pipeline] batch_size"));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(WeblakeConfig::resolve(&cli(&["run", "--batch-size", "0"]), &ConfigFile::default()).is_err());
    }

    #[test]
    fn test_pipeline_options_from_run_args() {
        let cli = cli(&["run", "--log-file", "access.log", "--skip-schema", "--format", "tsv"]);
        let config = WeblakeConfig::resolve(&cli, &ConfigFile::default()).unwrap();
        let options = config.pipeline_options(&cli);
        assert_eq!(options.source, Some(PathBuf::from("access.log")));
        assert!(options.skip_schema);
        assert!(!options.skip_collect);
        assert_eq!(options.format, OutputFormat::Tsv);
    }
}
