// Command-line interface definitions

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::StoreKind;
use crate::transform::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "weblake")]
#[command(about = "Collect web access logs into a data lake and prepare them for SQL")]
#[command(
    long_about = "Collect web access logs into a data lake and prepare them for SQL\n\nSTAGES:\n  collect     Parse a Combined Log Format file into JSON lines under /logs/raw\n  transform   Flatten a raw artifact into delimited rows under /logs/processed\n  schema      Write table definitions for both prefixes under /logs/schema\n\nCOMMON EXAMPLES:\n  weblake run --log-file access.log\n  weblake --store webhdfs --hdfs-host namenode run --log-file access.log.gz\n  weblake transform --format tsv"
)]
#[command(version)]
#[command(args_override_self = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Specify custom configuration file path
    #[arg(long = "config", global = true, help_heading = "Configuration Options")]
    pub config_file: Option<PathBuf>,

    /// Ignore configuration files
    #[arg(long = "no-config", global = true, help_heading = "Configuration Options")]
    pub no_config: bool,

    /// Artifact store backend
    #[arg(long, value_enum, global = true, help_heading = "Store Options")]
    pub store: Option<StoreKind>,

    /// Root directory of the local store
    #[arg(long = "store-root", global = true, help_heading = "Store Options")]
    pub store_root: Option<PathBuf>,

    /// WebHDFS namenode host
    #[arg(long = "hdfs-host", global = true, help_heading = "Store Options")]
    pub hdfs_host: Option<String>,

    /// WebHDFS namenode HTTP port
    #[arg(long = "hdfs-port", global = true, help_heading = "Store Options")]
    pub hdfs_port: Option<u16>,

    /// User name sent with every WebHDFS request
    #[arg(long = "hdfs-user", global = true, help_heading = "Store Options")]
    pub hdfs_user: Option<String>,

    /// How many times to probe the store before giving up
    #[arg(long = "wait-retries", global = true, help_heading = "Readiness Options")]
    pub wait_retries: Option<u32>,

    /// Pause between store probes (e.g. 10s, 1m)
    #[arg(
        long = "wait-interval",
        global = true,
        value_parser = humantime::parse_duration,
        help_heading = "Readiness Options"
    )]
    pub wait_interval: Option<Duration>,

    /// More log output (-v debug)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true, help_heading = "Output Options")]
    pub verbose: u8,

    /// Only warnings and errors in log output
    #[arg(short = 'q', long = "quiet", global = true, conflicts_with = "verbose", help_heading = "Output Options")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run collect, transform and schema provisioning in order
    Run(RunArgs),
    /// Parse a log file into a new raw artifact
    Collect(CollectArgs),
    /// Turn a raw artifact into a processed artifact
    Transform(TransformArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Source access log (plain, gzip or zstd)
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Records per upload
    #[arg(long = "batch-size")]
    pub batch_size: Option<usize>,

    /// Processed artifact format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Database the tables are created in
    #[arg(long)]
    pub database: Option<String>,

    /// Reuse the newest raw artifact instead of collecting
    #[arg(long = "skip-collect")]
    pub skip_collect: bool,

    #[arg(long = "skip-transform")]
    pub skip_transform: bool,

    #[arg(long = "skip-schema")]
    pub skip_schema: bool,
}

#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Source access log (plain, gzip or zstd)
    pub file: PathBuf,

    /// Records per upload
    #[arg(long = "batch-size")]
    pub batch_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct TransformArgs {
    /// Raw artifact path in the store; newest under the raw prefix if omitted
    pub raw: Option<String>,

    /// Processed artifact format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

impl Cli {
    /// Default tracing directive for the chosen verbosity
    pub fn log_directive(&self) -> &'static str {
        if self.quiet {
            "weblake=warn"
        } else if self.verbose > 0 {
            "weblake=debug"
        } else {
            "weblake=info"
        }
    }
}
