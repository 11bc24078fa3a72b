//! Dispatch sink: drain enumeration pages and publish each key to the queue.

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, Sender};
use log::debug;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::engine::queue::MessageQueue;
use crate::types::{EnumerationPage, FailureRecord};

/// Stage name used in dispatch failure records.
pub const DISPATCH_STAGE: &str = "dispatch";

/// Totals over every dispatch worker.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub workers: usize,
    pub pages: usize,
    pub seen: u64,
    pub sent: u64,
    pub failed: u64,
}

impl DispatchStats {
    fn absorb(&mut self, other: DispatchStats) {
        self.pages += other.pages;
        self.seen += other.seen;
        self.sent += other.sent;
        self.failed += other.failed;
    }
}

/// Completion barrier over the dispatch pool. The count and error senders it owns are dropped
/// when it fires.
pub struct DispatchBarrier {
    handle: JoinHandle<Result<DispatchStats>>,
}

impl DispatchBarrier {
    pub fn wait(self) -> Result<DispatchStats> {
        self.handle
            .join()
            .map_err(|_| anyhow!("dispatch supervisor panicked"))?
    }
}

/// Spawn `pool_size` dispatch workers over `page_rx`. Each published key sends one unit signal on
/// `count_tx`; each failed publish sends a [`FailureRecord`] keyed by object key on `err_tx`.
pub fn spawn_dispatch_workers(
    pool_size: usize,
    page_rx: Receiver<EnumerationPage>,
    count_tx: Sender<()>,
    err_tx: Sender<FailureRecord>,
    queue: Arc<dyn MessageQueue>,
) -> DispatchBarrier {
    let pool_size = pool_size.max(1);
    let handle = thread::spawn(move || {
        let workers: Vec<JoinHandle<DispatchStats>> = (0..pool_size)
            .map(|_| {
                let page_rx = page_rx.clone();
                let count_tx = count_tx.clone();
                let err_tx = err_tx.clone();
                let queue = Arc::clone(&queue);
                thread::spawn(move || dispatch_loop(page_rx, count_tx, err_tx, queue.as_ref()))
            })
            .collect();
        drop(page_rx);

        let mut stats = DispatchStats {
            workers: pool_size,
            ..DispatchStats::default()
        };
        let mut panicked = 0_usize;
        for w in workers {
            match w.join() {
                Ok(s) => stats.absorb(s),
                Err(_) => panicked += 1,
            }
        }
        drop(count_tx);
        drop(err_tx);
        debug!(
            "dispatch done: {} pages, {} keys, {} sent, {} failed",
            stats.pages, stats.seen, stats.sent, stats.failed
        );
        if panicked > 0 {
            return Err(anyhow!("{panicked} dispatch worker(s) panicked"));
        }
        Ok(stats)
    });
    DispatchBarrier { handle }
}

fn dispatch_loop(
    page_rx: Receiver<EnumerationPage>,
    count_tx: Sender<()>,
    err_tx: Sender<FailureRecord>,
    queue: &dyn MessageQueue,
) -> DispatchStats {
    let mut stats = DispatchStats::default();
    while let Ok(page) = page_rx.recv() {
        stats.pages += 1;
        for key in page.keys {
            stats.seen += 1;
            match queue.send(&key) {
                Ok(()) => {
                    stats.sent += 1;
                    let _ = count_tx.send(());
                }
                Err(e) => {
                    stats.failed += 1;
                    let cause = e.context(format!("failed to publish {key}"));
                    let _ = err_tx.send(FailureRecord::new(
                        key.clone(),
                        key,
                        DISPATCH_STAGE,
                        cause,
                    ));
                }
            }
        }
    }
    stats
}
