//! Shardflow: sharded bucket enumeration into a queue, and batch image processing off that queue.

pub mod engine;
pub mod pipeline;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use pipeline::{LogObserver, RunObserver};

use anyhow::{Context, bail};
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;

use engine::queue::{DiscardQueue, MessageQueue, SpoolQueue};
use engine::store::LocalStore;
use utils::config::PackagePaths;

/// Result alias used by public shardflow API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

fn log_config(opts: &Opts) {
    debug!(
        "{} CONFIG:{:#?}",
        PackagePaths::get().pkg_name().to_uppercase(),
        opts
    );
}

fn require_dir<'a>(dir: Option<&'a Path>, env_name: &str) -> Result<&'a Path> {
    match dir {
        Some(d) => Ok(d),
        None => bail!("{env_name} is not set (use the flag, the environment or .shardflow.toml)"),
    }
}

/// Enumerate `opts.data_bucket` shard by shard and publish every key to the queue spool.
///
/// The queue is `opts.queue`, or `shardflow.queue.jsonl` in the working directory. With
/// `opts.dry_run` keys are counted but not published.
pub fn orchestrate(opts: &Opts, observer: Arc<dyn RunObserver>) -> Result<RunSummary> {
    log_config(opts);
    let data = require_dir(opts.data_bucket.as_deref(), "DATA_BUCKET")?;
    let store = LocalStore::open(data)?.with_page_size(opts.page_size);
    debug!("data bucket: {}", store.root().display());

    if opts.dry_run {
        let discard = Arc::new(DiscardQueue::default());
        let summary = pipeline::run_orchestrator(Arc::new(store), discard.clone(), opts, observer)?;
        info!("dry run: {} messages discarded", discard.sent());
        return Ok(summary);
    }
    let path = opts
        .queue
        .clone()
        .unwrap_or_else(|| PackagePaths::get().spool_filename().into());
    let spool = SpoolQueue::open(&path)?;
    info!("publishing to {}", spool.path().display());
    let queue: Arc<dyn MessageQueue> = Arc::new(spool);
    pipeline::run_orchestrator(Arc::new(store), queue, opts, observer)
}

/// Run one inbound batch: read sources from `opts.data_bucket`, write thumbnails and metadata to
/// `opts.output_bucket` (created if missing), and return the records to redeliver.
pub fn process_batch(
    records: Vec<QueueRecord>,
    opts: &Opts,
    observer: Arc<dyn RunObserver>,
) -> Result<BatchSummary> {
    log_config(opts);
    let data = require_dir(opts.data_bucket.as_deref(), "DATA_BUCKET")?;
    let output = require_dir(opts.output_bucket.as_deref(), "OUTPUT_BUCKET")?;
    let source = LocalStore::open(data).context("open data bucket")?;
    let sink = LocalStore::open_or_create(output).context("open output bucket")?;
    debug!(
        "buckets: {} -> {}",
        source.root().display(),
        sink.root().display()
    );
    pipeline::run_processor(records, Arc::new(source), Arc::new(sink), opts, observer)
}
