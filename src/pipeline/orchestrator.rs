use anyhow::Result;
use crossbeam_channel::bounded;
use log::{debug, info};
use std::sync::Arc;

use crate::engine::queue::MessageQueue;
use crate::engine::store::ObjectStore;
use crate::types::{EnumerationPage, FailureRecord, Opts, RunSummary};
use crate::utils::config::STAGE_CHANNEL_CAP;

use super::count::spawn_count_aggregator;
use super::dispatch::spawn_dispatch_workers;
use super::errors::spawn_error_aggregator;
use super::observer::RunObserver;
use super::shard::{make_shards, spawn_enumerators};

/// Orchestrator path: enumerate every shard of `opts.split` in `store` and publish each key to `queue`.
///
/// Shards → page stream → dispatch pool (one worker per shard) → count stream → total.
/// Shutdown runs strictly in dependency order: enumeration barrier (closes pages), dispatch
/// barrier (closes counts and errors), then the count and error aggregators.
pub fn run_orchestrator(
    store: Arc<dyn ObjectStore>,
    queue: Arc<dyn MessageQueue>,
    opts: &Opts,
    observer: Arc<dyn RunObserver>,
) -> Result<RunSummary> {
    opts.check_orchestrator()?;
    let shards = make_shards(&opts.split, opts.shard_width);
    let shard_count = shards.len();
    debug!("{shard_count} shards under {:?}", opts.split);

    let (page_tx, page_rx) = bounded::<EnumerationPage>(STAGE_CHANNEL_CAP);
    let (count_tx, count_rx) = bounded::<()>(STAGE_CHANNEL_CAP);
    let (err_tx, err_rx) = bounded::<FailureRecord>(STAGE_CHANNEL_CAP);

    info!("Starting...");
    let counter = spawn_count_aggregator(count_rx, opts.progress_every, Arc::clone(&observer));
    let errors = spawn_error_aggregator(err_rx, Arc::clone(&observer));
    let dispatch = spawn_dispatch_workers(shard_count, page_rx, count_tx, err_tx, queue);
    let enumeration = spawn_enumerators(store, shards, page_tx, observer);

    // Join everything before propagating, so nothing outlives the run.
    let enumerated = enumeration.wait();
    let dispatched = dispatch.wait();
    let total = counter.wait();
    let failures = errors.finish();
    info!("Ending...");

    let enumerated = enumerated?;
    let dispatched = dispatched?;
    let total = total?;
    let failures = failures?;
    info!("Total objects processed: {total}");

    Ok(RunSummary {
        shards: enumerated.shards,
        failed_shards: enumerated.failed_shards,
        pages: dispatched.pages,
        items_seen: dispatched.seen,
        dispatched: total,
        failures,
    })
}
