//! Count aggregation: a single thread owns the running total of successful dispatches.

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, bounded};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::observer::RunObserver;

/// Handle to the running aggregator: the completion stream carrying the final total, and the thread.
pub struct CountHandle {
    final_rx: Receiver<u64>,
    handle: JoinHandle<()>,
}

impl CountHandle {
    /// Wait for the input stream to close and return the final total.
    pub fn wait(self) -> Result<u64> {
        let total = self.final_rx.recv();
        self.handle
            .join()
            .map_err(|_| anyhow!("count aggregator panicked"))?;
        total.map_err(|_| anyhow!("count aggregator exited without a total"))
    }
}

/// Start the aggregator over unit success signals from any number of producers.
/// Every `progress_every` items (0 = never) the running total goes to the observer.
pub fn spawn_count_aggregator(
    count_rx: Receiver<()>,
    progress_every: u64,
    observer: Arc<dyn RunObserver>,
) -> CountHandle {
    let (final_tx, final_rx) = bounded::<u64>(1);
    let handle = thread::spawn(move || {
        let mut count = 0_u64;
        for _signal in count_rx.iter() {
            count += 1;
            if progress_every > 0 && count.is_multiple_of(progress_every) {
                observer.progress(count);
            }
        }
        // Capacity 1: never blocks, even if nobody ever waits.
        let _ = final_tx.send(count);
    });
    CountHandle { final_rx, handle }
}
