//! Public and internal types for the shardflow API and pipelines.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::engine::imaging::ResizeOptions;
use crate::utils::config::{PaletteDefaults, ShardConsts, WorkerThreadLimits};

/// One partition of the keyspace (`<base>/<hex suffix>`), owned by exactly one enumeration thread.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Shard {
    prefix: String,
}

impl Shard {
    /// Join `base` and `suffix` with a single `/`. An empty base yields the bare suffix.
    pub fn new(base: &str, suffix: &str) -> Self {
        let base = base.trim_end_matches('/');
        let prefix = if base.is_empty() {
            suffix.to_string()
        } else {
            format!("{base}/{suffix}")
        };
        Shard { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix)
    }
}

/// Keys returned by one pagination step within a shard. Forwarded immediately, never retained.
#[derive(Clone, Debug)]
pub struct EnumerationPage {
    pub shard: Shard,
    pub keys: Vec<String>,
}

/// One message as delivered by (or written to) the queue: `{messageId, body}`. The body is an object key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    pub message_id: String,
    pub body: String,
}

/// Inbound batch delivery in the queue service's event shape. Unknown record fields are ignored.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct BatchEvent {
    #[serde(rename = "Records")]
    pub records: Vec<QueueRecord>,
}

/// Where an item is in the processor pipeline. Only ever moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskState {
    Dispatched,
    Fetched,
    Transformed,
    Published,
    Analyzed,
    MetadataPublished,
}

/// Per-item record threaded through the processor stages.
///
/// Starts with the message id and key; stages attach the content buffer and the palette. Owned by
/// whichever stage worker currently holds it (moved on every channel send).
#[derive(Clone, Debug)]
pub struct PipelineTask {
    pub message_id: String,
    pub key: String,
    pub state: TaskState,
    pub content: Option<Vec<u8>>,
    pub colors: Vec<String>,
}

impl PipelineTask {
    pub fn new(record: QueueRecord) -> Self {
        PipelineTask {
            message_id: record.message_id,
            key: record.body,
            state: TaskState::Dispatched,
            content: None,
            colors: Vec::new(),
        }
    }

    /// Move to `next`. Going backwards (or staying put) is a programming error.
    pub fn advance(&mut self, next: TaskState) -> Result<()> {
        if next <= self.state {
            bail!(
                "task {} cannot move from {:?} back to {:?}",
                self.message_id,
                self.state,
                next
            );
        }
        self.state = next;
        Ok(())
    }

    /// Content buffer attached by the fetch stage.
    pub fn content(&self) -> Result<&[u8]> {
        match self.content.as_deref() {
            Some(c) => Ok(c),
            None => bail!("no content attached to {} ({:?})", self.key, self.state),
        }
    }
}

/// Metadata document published next to each resized image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub key: String,
    #[serde(rename = "itemIdentifier")]
    pub item_identifier: String,
    pub hexcolors: Vec<String>,
}

/// One item that failed somewhere in a run. Produced by exactly one stage, consumed once by the error aggregator.
#[derive(Debug)]
pub struct FailureRecord {
    /// Identifier reported for redelivery (message id in the processor, object key in the orchestrator).
    pub item_id: String,
    pub key: String,
    pub stage: String,
    pub cause: anyhow::Error,
}

impl FailureRecord {
    pub fn new(item_id: String, key: String, stage: &str, cause: anyhow::Error) -> Self {
        FailureRecord {
            item_id,
            key,
            stage: stage.to_string(),
            cause,
        }
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) failed in {}: {:#}",
            self.item_id, self.key, self.stage, self.cause
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemIdentifier {
    pub item_identifier: String,
}

/// Identifiers that failed anywhere in a run, in the queue's partial-failure response shape:
/// `{"batchItemFailures":[{"itemIdentifier":"..."}]}`. Empty means every item succeeded.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailureReport {
    pub batch_item_failures: Vec<ItemIdentifier>,
}

impl BatchFailureReport {
    pub fn push(&mut self, item_identifier: String) {
        self.batch_item_failures
            .push(ItemIdentifier { item_identifier });
    }

    pub fn len(&self) -> usize {
        self.batch_item_failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch_item_failures.is_empty()
    }

    pub fn contains(&self, item_identifier: &str) -> bool {
        self.batch_item_failures
            .iter()
            .any(|i| i.item_identifier == item_identifier)
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.batch_item_failures
            .iter()
            .map(|i| i.item_identifier.as_str())
    }
}

/// Result of an orchestrator run.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    pub shards: usize,
    pub failed_shards: Vec<Shard>,
    pub pages: usize,
    /// Keys pulled off the page stream by the dispatch workers.
    pub items_seen: u64,
    /// Keys published to the queue (final CountAggregator total).
    pub dispatched: u64,
    /// Keys whose publish failed, tagged by object key.
    pub failures: BatchFailureReport,
}

/// Result of a processor run over one inbound batch.
#[derive(Clone, Debug, Default)]
pub struct BatchSummary {
    pub records: usize,
    pub succeeded: usize,
    pub report: BatchFailureReport,
}

/// Run parameters for both commands. Filled from defaults, `.shardflow.toml`, environment and CLI, in that order.
#[derive(Clone, Debug)]
pub struct Opts {
    /// Directory acting as the source bucket (`DATA_BUCKET`).
    pub data_bucket: Option<PathBuf>,
    /// Directory acting as the output bucket (`OUTPUT_BUCKET`).
    pub output_bucket: Option<PathBuf>,
    /// Base path the shard suffixes are appended to (`SPLIT`).
    pub split: String,
    /// Hex characters per shard suffix; 16^width shards.
    pub shard_width: usize,
    /// Spool file acting as the queue target (`SQS_URL`).
    pub queue: Option<PathBuf>,
    /// Keys per listing page.
    pub page_size: usize,
    /// Pool size for every processor stage after fetch (`NUM_WORKERS`).
    pub num_workers: usize,
    pub resize: ResizeOptions,
    /// Palette size (`NUM_COLORS`).
    pub num_colors: usize,
    /// K-means iteration cap (`MAX_ITERATIONS`).
    pub max_iterations: usize,
    /// Report the running count every this many dispatched items. 0 disables.
    pub progress_every: u64,
    pub verbose: bool,
    /// Orchestrator only: enumerate and count without publishing to the queue.
    pub dry_run: bool,
}

impl Default for Opts {
    fn default() -> Self {
        Opts {
            data_bucket: None,
            output_bucket: None,
            split: String::new(),
            shard_width: ShardConsts::DEFAULT_WIDTH,
            queue: None,
            page_size: ShardConsts::DEFAULT_PAGE_SIZE,
            num_workers: WorkerThreadLimits::current().default_pool_size(),
            resize: ResizeOptions::default(),
            num_colors: PaletteDefaults::NUM_COLORS,
            max_iterations: PaletteDefaults::MAX_ITERATIONS,
            progress_every: ShardConsts::PROGRESS_EVERY,
            verbose: false,
            dry_run: false,
        }
    }
}

impl Opts {
    /// Reject orchestrator settings that cannot start a run.
    pub fn check_orchestrator(&self) -> Result<()> {
        if self.shard_width > ShardConsts::MAX_WIDTH {
            bail!(
                "shard width {} exceeds max width {} (one enumeration thread per shard)",
                self.shard_width,
                ShardConsts::MAX_WIDTH
            );
        }
        if self.page_size == 0 {
            bail!("page size must be at least 1");
        }
        Ok(())
    }

    /// Reject processor settings that cannot start a run.
    pub fn check_processor(&self) -> Result<()> {
        if self.num_workers == 0 {
            bail!("NUM_WORKERS must be at least 1");
        }
        if self.num_colors == 0 {
            bail!("NUM_COLORS must be at least 1");
        }
        if self.max_iterations == 0 {
            bail!("MAX_ITERATIONS must be at least 1");
        }
        if self.resize.width == 0 || self.resize.height == 0 {
            bail!(
                "resize target must be non-zero, got {}x{}",
                self.resize.width,
                self.resize.height
            );
        }
        Ok(())
    }
}
