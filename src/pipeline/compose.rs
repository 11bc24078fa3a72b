//! Pipeline composition: chain worker-pool stages so each stage's output stream is the next
//! stage's input, and shut the whole chain down in dependency order.

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};

use crate::types::FailureRecord;

use super::stage::{StageBarrier, StageStats, Tracked, spawn_stage};

/// Transformation for a homogeneous chain (every stage maps `T -> T`).
pub type StageFn<T> = Box<dyn Fn(T) -> Result<T> + Send + Sync>;

/// Builder holding the tail stream of the chain so far, the shared error sender and every
/// barrier spawned. Holds no business logic.
pub struct PipelineBuilder<T> {
    tail: Receiver<Tracked<T>>,
    err_tx: Sender<FailureRecord>,
    barriers: Vec<StageBarrier>,
}

impl<T: Send + 'static> PipelineBuilder<T> {
    /// Start a chain reading `input`. Items are tracked by the producer ([`Tracked::new`]), so a
    /// failure anywhere in the chain reports the identity the item entered with.
    ///
    /// `err_tx` is the only long-lived error sender; it is released by [`ComposedPipeline::drain`]
    /// after the last barrier fires.
    pub fn new(input: Receiver<Tracked<T>>, err_tx: Sender<FailureRecord>) -> Self {
        PipelineBuilder {
            tail: input,
            err_tx,
            barriers: Vec::new(),
        }
    }

    pub fn finish(self) -> ComposedPipeline<T> {
        ComposedPipeline {
            out_rx: self.tail,
            barriers: self.barriers,
            err_tx: self.err_tx,
        }
    }

    /// Append a stage of `pool_size` workers applying `f`.
    pub fn stage<B, F>(mut self, name: &str, pool_size: usize, f: F) -> PipelineBuilder<B>
    where
        B: Send + 'static,
        F: Fn(T) -> Result<B> + Send + Sync + 'static,
    {
        let handle = spawn_stage(name, pool_size, self.tail, &self.err_tx, f);
        self.barriers.push(handle.barrier);
        PipelineBuilder {
            tail: handle.out_rx,
            err_tx: self.err_tx,
            barriers: self.barriers,
        }
    }

    /// Append an ordered list of same-typed stages, all with the same pool size.
    pub fn stages(self, pool_size: usize, fns: Vec<(&str, StageFn<T>)>) -> PipelineBuilder<T> {
        fns.into_iter()
            .fold(self, |builder, (name, f)| builder.stage(name, pool_size, f))
    }
}

/// Chain `fns` over `input` with `pool_size` workers per stage.
pub fn compose<T: Send + 'static>(
    input: Receiver<Tracked<T>>,
    err_tx: Sender<FailureRecord>,
    pool_size: usize,
    fns: Vec<(&str, StageFn<T>)>,
) -> ComposedPipeline<T> {
    PipelineBuilder::new(input, err_tx)
        .stages(pool_size, fns)
        .finish()
}

/// A running chain: the final output stream, one barrier per stage, and the shared error sender.
pub struct ComposedPipeline<T> {
    pub out_rx: Receiver<Tracked<T>>,
    barriers: Vec<StageBarrier>,
    err_tx: Sender<FailureRecord>,
}

impl<T> ComposedPipeline<T> {
    pub fn stage_names(&self) -> Vec<&str> {
        self.barriers.iter().map(|b| b.name()).collect()
    }

    /// Read the final stream to exhaustion, wait for every stage barrier in chain order, then
    /// release the error sender so the error stream can close. Returns per-stage stats.
    ///
    /// The error sender is released even when a barrier reports a panic, so an error aggregator
    /// reading the other end always terminates.
    pub fn drain<F: FnMut(T)>(self, mut on_output: F) -> Result<Vec<StageStats>> {
        let ComposedPipeline {
            out_rx,
            barriers,
            err_tx,
        } = self;
        for tracked in out_rx.iter() {
            on_output(tracked.into_inner());
        }

        let mut stats = Vec::with_capacity(barriers.len());
        let mut first_error = None;
        for barrier in barriers {
            match barrier.wait() {
                Ok(s) => stats.push(s),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        drop(err_tx);

        match first_error {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }
}
