//! Processor path: thread a batch of queued keys through fetch → resize → publish image →
//! palette → publish metadata, collecting per-item failures into the batch report.

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, info};
use std::sync::Arc;
use std::thread;

use crate::engine::imaging::{ResizeOptions, resize_image};
use crate::engine::keys::{metadata_key, shard_key};
use crate::engine::palette::{extract_palette, to_hex};
use crate::engine::store::ObjectStore;
use crate::types::{
    BatchSummary, FailureRecord, ImageMetadata, Opts, PipelineTask, QueueRecord, TaskState,
};
use crate::utils::config::{STAGE_CHANNEL_CAP, WorkerThreadLimits};

use super::compose::{ComposedPipeline, PipelineBuilder};
use super::errors::spawn_error_aggregator;
use super::observer::RunObserver;
use super::stage::Tracked;

pub const FETCH_STAGE: &str = "fetch";
pub const RESIZE_STAGE: &str = "resize";
pub const PUBLISH_IMAGE_STAGE: &str = "publish-image";
pub const PALETTE_STAGE: &str = "palette";
pub const PUBLISH_METADATA_STAGE: &str = "publish-metadata";

/// Shared, read-only inputs of the five image stages.
pub struct ProcessorContext {
    pub source: Arc<dyn ObjectStore>,
    pub output: Arc<dyn ObjectStore>,
    pub resize: ResizeOptions,
    pub num_colors: usize,
    pub max_iterations: usize,
}

impl ProcessorContext {
    pub fn new(source: Arc<dyn ObjectStore>, output: Arc<dyn ObjectStore>, opts: &Opts) -> Self {
        ProcessorContext {
            source,
            output,
            resize: opts.resize.clone(),
            num_colors: opts.num_colors,
            max_iterations: opts.max_iterations,
        }
    }
}

/// Download the object named by the message body.
pub fn fetch_image(ctx: &ProcessorContext, record: QueueRecord) -> Result<PipelineTask> {
    let bytes = ctx
        .source
        .get(&record.body)
        .with_context(|| format!("error getting image: {}", record.body))?;
    let mut task = PipelineTask::new(record);
    task.content = Some(bytes);
    task.advance(TaskState::Fetched)?;
    Ok(task)
}

/// Replace the content buffer with the resized JPEG.
pub fn resize_task(ctx: &ProcessorContext, mut task: PipelineTask) -> Result<PipelineTask> {
    let resized = resize_image(task.content()?, &ctx.resize)
        .with_context(|| format!("error resizing image: {}", task.key))?;
    task.content = Some(resized);
    task.advance(TaskState::Transformed)?;
    Ok(task)
}

/// Upload the resized image under the sharded output key.
pub fn publish_image(ctx: &ProcessorContext, mut task: PipelineTask) -> Result<PipelineTask> {
    let dest = shard_key(&task.key)?;
    ctx.output
        .put(&dest, task.content()?)
        .with_context(|| format!("error posting image: {}", task.key))?;
    task.advance(TaskState::Published)?;
    Ok(task)
}

/// Extract the palette of the resized image as `rrggbb` strings.
pub fn analyze_palette(ctx: &ProcessorContext, mut task: PipelineTask) -> Result<PipelineTask> {
    let img = image::load_from_memory(task.content()?)
        .with_context(|| format!("error reading image for palette: {}", task.key))?;
    let palette = extract_palette(&img, ctx.num_colors, ctx.max_iterations)
        .with_context(|| format!("error generating palette: {}", task.key))?;
    task.colors = palette.iter().map(|c| to_hex(c.rgb)).collect();
    task.advance(TaskState::Analyzed)?;
    Ok(task)
}

/// Upload the metadata document next to the resized image.
pub fn publish_metadata(ctx: &ProcessorContext, mut task: PipelineTask) -> Result<PipelineTask> {
    let doc = ImageMetadata {
        key: task.key.clone(),
        item_identifier: task.message_id.clone(),
        hexcolors: task.colors.clone(),
    };
    let body = serde_json::to_vec(&doc)
        .with_context(|| format!("error encoding metadata for image: {}", task.key))?;
    let dest = metadata_key(&task.key)?;
    ctx.output
        .put(&dest, &body)
        .with_context(|| format!("error uploading metadata for image: {}", task.key))?;
    task.advance(TaskState::MetadataPublished)?;
    Ok(task)
}

/// Fetch workers for a batch of `records`: one per record, capped at
/// [`WorkerThreadLimits::MAX_FETCH_WORKERS`].
pub fn fetch_pool_size(records: usize) -> usize {
    records.clamp(1, WorkerThreadLimits::MAX_FETCH_WORKERS)
}

/// Wire the five stages. Fetch gets `fetch_workers`; the rest get `num_workers` each.
pub fn build_image_pipeline(
    ctx: &Arc<ProcessorContext>,
    input: Receiver<Tracked<QueueRecord>>,
    err_tx: Sender<FailureRecord>,
    fetch_workers: usize,
    num_workers: usize,
) -> ComposedPipeline<PipelineTask> {
    let c1 = Arc::clone(ctx);
    let c2 = Arc::clone(ctx);
    let c3 = Arc::clone(ctx);
    let c4 = Arc::clone(ctx);
    let c5 = Arc::clone(ctx);
    PipelineBuilder::new(input, err_tx)
        .stage(FETCH_STAGE, fetch_workers, move |r| fetch_image(&c1, r))
        .stage(RESIZE_STAGE, num_workers, move |t| resize_task(&c2, t))
        .stage(PUBLISH_IMAGE_STAGE, num_workers, move |t| publish_image(&c3, t))
        .stage(PALETTE_STAGE, num_workers, move |t| analyze_palette(&c4, t))
        .stage(PUBLISH_METADATA_STAGE, num_workers, move |t| {
            publish_metadata(&c5, t)
        })
        .finish()
}

/// Process one inbound batch end to end and return the report of records to redeliver.
///
/// Setup problems return `Err` before any thread starts. Item failures never do: they land in
/// `BatchSummary::report`, and `succeeded + report.len() == records`.
pub fn run_processor(
    records: Vec<QueueRecord>,
    source: Arc<dyn ObjectStore>,
    output: Arc<dyn ObjectStore>,
    opts: &Opts,
    observer: Arc<dyn RunObserver>,
) -> Result<BatchSummary> {
    opts.check_processor()?;
    let total = records.len();
    info!("numWorkers: {}", opts.num_workers);
    info!("numRecords: {total}");

    let ctx = Arc::new(ProcessorContext::new(source, output, opts));
    let (err_tx, err_rx) = bounded::<FailureRecord>(STAGE_CHANNEL_CAP);
    let (key_tx, key_rx) = bounded::<Tracked<QueueRecord>>(STAGE_CHANNEL_CAP);

    let errors = spawn_error_aggregator(err_rx, Arc::clone(&observer));
    let fetch_workers = fetch_pool_size(total);
    debug!("fetch workers: {fetch_workers}");
    let pipeline = build_image_pipeline(&ctx, key_rx, err_tx, fetch_workers, opts.num_workers);

    // Each record is tracked by its message id from here on. Dropping key_tx at the end of the
    // feed closes the fetch stage's input.
    let feeder = thread::spawn(move || {
        for record in records {
            if key_tx.send(Tracked::new(record)).is_err() {
                break;
            }
        }
    });

    let mut succeeded = 0_usize;
    let drained = pipeline.drain(|task| {
        succeeded += 1;
        debug!("{} done ({:?})", task.key, task.state);
    });
    let fed = feeder
        .join()
        .map_err(|_| anyhow!("batch feeder panicked"));
    let report = errors.finish()?;
    let stats = drained?;
    fed?;

    for s in &stats {
        observer.stage_finished(s);
    }
    info!(
        "batch done: {succeeded} succeeded, {} to redeliver",
        report.len()
    );
    Ok(BatchSummary {
        records: total,
        succeeded,
        report,
    })
}
