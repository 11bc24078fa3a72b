use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::engine::imaging::{ExtendMode, Interpolation};

struct DefaultArgs;

impl DefaultArgs {
    pub const CONFIG_DIR: &'static str = ".";
}

/// Sharded bucket enumeration into a queue, and batch image processing off that queue.
#[derive(Clone, Parser)]
#[command(name = "shardflow")]
#[command(about = "Enumerate a bucket into a queue, or process one queue batch into thumbnails and palettes.")]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every command.
#[derive(Clone, Args)]
pub struct CommonArgs {
    /// Verbose output.
    #[arg(long, short = 'v', global = true, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,

    /// Directory holding `.shardflow.toml` and `.env`. Default: current directory.
    #[arg(long, global = true, value_name = "DIR", default_value = DefaultArgs::CONFIG_DIR)]
    pub config_dir: PathBuf,
}

#[derive(Clone, Subcommand)]
pub enum Commands {
    /// List every shard of the data bucket and publish each key to the queue.
    Orchestrate(OrchestrateArgs),
    /// Run one inbound batch through fetch, resize, publish, palette and metadata.
    Process(ProcessArgs),
}

#[derive(Clone, Args)]
pub struct OrchestrateArgs {
    /// Directory acting as the source bucket (env: DATA_BUCKET).
    #[arg(long, short = 'd', value_name = "DIR")]
    pub data_bucket: Option<PathBuf>,

    /// Base path the hex shard suffixes are appended to (env: SPLIT).
    #[arg(long, short = 's')]
    pub split: Option<String>,

    /// Spool file acting as the queue (env: SQS_URL). Default: `shardflow.queue.jsonl`.
    #[arg(long, short = 'q', value_name = "FILE")]
    pub queue: Option<PathBuf>,

    /// Hex characters per shard suffix (16^N enumeration threads).
    #[arg(long, short = 'w', value_parser = clap::value_parser!(usize))]
    pub shard_width: Option<usize>,

    /// Keys per listing page.
    #[arg(long, short = 'p', value_parser = clap::value_parser!(usize))]
    pub page_size: Option<usize>,

    /// Enumerate and count only; nothing is published.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Clone, Args)]
pub struct ProcessArgs {
    /// Batch file: an event document `{"Records":[...]}` or a queue spool.
    #[arg(value_name = "BATCH")]
    pub batch: PathBuf,

    /// Directory acting as the source bucket (env: DATA_BUCKET).
    #[arg(long, short = 'd', value_name = "DIR")]
    pub data_bucket: Option<PathBuf>,

    /// Directory acting as the output bucket (env: OUTPUT_BUCKET). Created if missing.
    #[arg(long, short = 'o', value_name = "DIR")]
    pub output_bucket: Option<PathBuf>,

    /// Pool size for each stage after fetch (env: NUM_WORKERS).
    #[arg(long, short = 'n', value_parser = clap::value_parser!(usize))]
    pub workers: Option<usize>,

    /// Palette size (env: NUM_COLORS).
    #[arg(long, short = 'c', value_parser = clap::value_parser!(usize))]
    pub colors: Option<usize>,

    /// K-means iteration cap (env: MAX_ITERATIONS).
    #[arg(long, short = 'i', value_parser = clap::value_parser!(usize))]
    pub iterations: Option<usize>,

    #[arg(long, value_parser = clap::value_parser!(u32))]
    pub width: Option<u32>,

    #[arg(long, value_parser = clap::value_parser!(u32))]
    pub height: Option<u32>,

    /// JPEG quality, 1-100.
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: Option<u8>,

    /// Fill the target box and crop the overflow instead of extending.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub crop: Option<bool>,

    #[arg(long, value_enum)]
    pub extend: Option<ExtendMode>,

    #[arg(long, value_enum)]
    pub interpolation: Option<Interpolation>,

    /// Write the failure report here instead of stdout.
    #[arg(long, short = 'r', value_name = "FILE")]
    pub report: Option<PathBuf>,
}
