//! Generic worker-pool stage: `pool_size` threads drain one input stream, apply a fallible
//! transform, and route each result to the output stream or the shared error stream.
//!
//! The output stream is closed exactly once, by the stage supervisor, after every worker has
//! returned from its pull loop. Downstream can therefore read until the channel disconnects
//! without sentinels.

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::types::{FailureRecord, QueueRecord};
use crate::utils::config::STAGE_CHANNEL_CAP;

/// Anything that can enter a pipeline knows the identifier reported when it fails.
pub trait Identified {
    /// Identifier reported for redelivery.
    fn item_id(&self) -> &str;

    /// Key used in log lines. Defaults to the identifier.
    fn item_key(&self) -> &str {
        self.item_id()
    }
}

impl Identified for String {
    fn item_id(&self) -> &str {
        self
    }
}

impl Identified for QueueRecord {
    fn item_id(&self) -> &str {
        &self.message_id
    }

    fn item_key(&self) -> &str {
        &self.body
    }
}

/// An item in flight, next to the identity it had when it entered the pipeline.
///
/// Stages only ever transform `item`; `item_id` and `key` are captured once by [`Tracked::new`]
/// and reported unchanged by whichever stage fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tracked<T> {
    pub item_id: String,
    pub key: String,
    pub item: T,
}

impl<T: Identified> Tracked<T> {
    pub fn new(item: T) -> Self {
        Tracked {
            item_id: item.item_id().to_string(),
            key: item.item_key().to_string(),
            item,
        }
    }
}

impl<T> Tracked<T> {
    pub fn into_inner(self) -> T {
        self.item
    }
}

/// Counters for one stage, returned by its completion barrier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StageStats {
    pub name: String,
    pub workers: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Default)]
struct WorkerTally {
    succeeded: usize,
    failed: usize,
}

/// Completion barrier of one stage. Fires once every worker has exited and the output sender is gone.
pub struct StageBarrier {
    name: String,
    handle: JoinHandle<Result<StageStats>>,
}

impl StageBarrier {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block until the stage has fully shut down.
    pub fn wait(self) -> Result<StageStats> {
        self.handle
            .join()
            .map_err(|_| anyhow!("{} supervisor panicked", self.name))?
    }
}

/// Running stage: its output stream plus the barrier that closes it.
pub struct StageHandle<B> {
    pub out_rx: Receiver<Tracked<B>>,
    pub barrier: StageBarrier,
}

/// Spawn one stage of `pool_size` workers (at least one) over `in_rx`.
///
/// A failing (or panicking) `f` produces one [`FailureRecord`] on `err_tx`, carrying the tracked
/// entry identity, and the worker moves on to the next item. The stage never stops early because
/// of a bad item.
pub fn spawn_stage<A, B, F>(
    name: &str,
    pool_size: usize,
    in_rx: Receiver<Tracked<A>>,
    err_tx: &Sender<FailureRecord>,
    f: F,
) -> StageHandle<B>
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A) -> Result<B> + Send + Sync + 'static,
{
    let pool_size = pool_size.max(1);
    let (out_tx, out_rx) = bounded::<Tracked<B>>(STAGE_CHANNEL_CAP);
    let err_tx = err_tx.clone();
    let f = Arc::new(f);
    let stage = name.to_string();

    let handle = thread::spawn(move || {
        let workers: Vec<JoinHandle<WorkerTally>> = (0..pool_size)
            .map(|_| {
                let in_rx = in_rx.clone();
                let out_tx = out_tx.clone();
                let err_tx = err_tx.clone();
                let f = Arc::clone(&f);
                let stage = stage.clone();
                thread::spawn(move || stage_worker_loop(&stage, in_rx, out_tx, err_tx, &*f))
            })
            .collect();
        drop(in_rx);
        drop(err_tx);

        let mut stats = StageStats {
            name: stage.clone(),
            workers: pool_size,
            ..StageStats::default()
        };
        let mut panicked = 0_usize;
        for w in workers {
            match w.join() {
                Ok(tally) => {
                    stats.succeeded += tally.succeeded;
                    stats.failed += tally.failed;
                }
                Err(_) => panicked += 1,
            }
        }
        // All workers are gone; this is the last sender, so the output stream closes here.
        drop(out_tx);
        debug!(
            "stage {}: drained ({} ok, {} failed, {} workers)",
            stats.name, stats.succeeded, stats.failed, stats.workers
        );
        if panicked > 0 {
            return Err(anyhow!("{}: {} worker(s) panicked", stats.name, panicked));
        }
        Ok(stats)
    });

    StageHandle {
        out_rx,
        barrier: StageBarrier {
            name: name.to_string(),
            handle,
        },
    }
}

/// Single stage worker: pull until the input is closed and empty.
fn stage_worker_loop<A, B, F>(
    stage: &str,
    in_rx: Receiver<Tracked<A>>,
    out_tx: Sender<Tracked<B>>,
    err_tx: Sender<FailureRecord>,
    f: &F,
) -> WorkerTally
where
    F: Fn(A) -> Result<B>,
{
    let mut tally = WorkerTally::default();
    while let Ok(tracked) = in_rx.recv() {
        let Tracked { item_id, key, item } = tracked;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(item))).unwrap_or_else(|payload| {
            Err(anyhow!("panicked: {}", panic_message(payload.as_ref())))
        });
        match outcome {
            Ok(out) => {
                let next = Tracked { item_id, key, item: out };
                if let Err(e) = out_tx.send(next) {
                    warn!("stage {stage}: downstream closed, dropping {}", e.into_inner().key);
                    break;
                }
                tally.succeeded += 1;
            }
            Err(cause) => {
                tally.failed += 1;
                let record = FailureRecord::new(item_id, key, stage, cause);
                if let Err(e) = err_tx.send(record) {
                    warn!("stage {stage}: error stream closed, lost {}", e.into_inner());
                    break;
                }
            }
        }
    }
    tally
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
